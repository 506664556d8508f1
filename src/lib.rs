//! Ngram frequency time series over a text corpus
//!
//! A corpus is a set of records with a text field, from which ngrams are
//! extracted, and a sequence field, whose value decides which bucket of the
//! time (or numeric) axis each observation lands in. Background generation
//! jobs fill the fact tables, and this crate takes care of the rest:
//!
//! - Describing how each [`SequenceType`] validates ranges and densifies axes
//! - Answering frequency and count queries for an ngram ([`query`])
//! - Making sure that at most one generation run is active at any time, and
//!   recovering from runs that crashed or errored out ([`process`])
//! - Writing a run's results atomically ([`generation`]) and removing them
//!   again ([`lifecycle`])

pub mod config;
pub mod corpus;
pub mod error;
pub mod generation;
pub mod lifecycle;
pub mod process;
pub mod query;
pub mod sequence;
pub mod store;

pub use crate::{
    config::StoreConfig,
    corpus::{Corpus, CorpusDraft, ProcessSlots, Slot},
    error::{Error, Result},
    process::{JobRunner, ProcessStatus},
    sequence::{AxisType, GraphConfig, SequenceRange, SequenceType},
    store::Store,
};

/// Database identifier of a corpus
pub type CorpusId = i64;

/// Database identifier of a background process run
pub type ProcessId = i64;

/// Integer-encoded position along a corpus' sequence axis
///
/// The encoding depends on the sequence type (YYYY, YYYYMM, YYYYMMDD or a raw
/// number), and is always such that buckets sort and compare as integers.
pub type SequenceMember = i64;

/// Number of occurences of an ngram (or of all ngrams of some length)
pub type MatchCount = u64;
