//! Error types

use crate::{sequence::RangeError, CorpusId, ProcessId, SequenceMember};
use thiserror::Error;

/// Result type used throughout the library
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Things that can go wrong while configuring, querying or generating corpora
///
/// Empty results (an ngram that was never observed, a range without any
/// rows...) are not errors and are reported as empty/zero values instead.
#[derive(Debug, Error)]
pub enum Error {
    /// Sequence type key that is not part of the registry
    #[error("unknown sequence type {0:?}")]
    UnknownSequenceType(Box<str>),

    /// Sequence range that does not pass its sequence type's validator
    #[error("invalid {sequence_type} sequence range {raw:?}: {cause}")]
    InvalidSequenceRange {
        /// Key of the sequence type the range was validated against
        sequence_type: &'static str,

        /// Range, as provided by the caller
        raw: Box<str>,

        /// Field-level reason for the rejection
        cause: RangeError,
    },

    /// Corpus was edited or queried without existing
    #[error("corpus #{0} does not exist")]
    CorpusNotFound(CorpusId),

    /// Corpus name is empty
    #[error("corpus name must not be empty")]
    EmptyCorpusName,

    /// Another generation run is active somewhere, so a new one cannot start
    #[error("ngram generation is not available now: another run is in progress")]
    GenerationUnavailable,

    /// Corpus bucketing cannot change while one of its runs is active
    #[error("corpus #{0} has an active generation run")]
    CorpusBusy(CorpusId),

    /// Sequence member that doesn't decode under its sequence type
    #[error("{member} is not a valid {sequence_type} sequence member")]
    InvalidSequenceMember {
        /// Key of the sequence type used for decoding
        sequence_type: &'static str,

        /// Offending member
        member: SequenceMember,
    },

    /// Densified sequence axis would be unreasonably long
    #[error("filled sequence would have more than {max} members")]
    SequenceTooLong {
        /// Configured maximum
        max: usize,
    },

    /// Generation run lost its process slot before it could commit
    ///
    /// This happens when a run that looked hung was reset and told to stop.
    #[error("generation process #{0} was cancelled")]
    GenerationCancelled(ProcessId),

    /// Ngram that doesn't fit the generation run it was recorded into
    #[error("ngram {ngram:?} is not a {n}-gram")]
    InvalidNgram {
        /// Offending ngram
        ngram: Box<str>,

        /// Ngram length expected by the generation run
        n: u32,
    },

    /// Count too large to be stored
    #[error("count {0} does not fit in the database")]
    CountOverflow(u64),

    /// Process status text that we don't know about
    #[error("process #{id} has unknown status {status:?}")]
    InvalidProcessStatus {
        /// Process whose status was read
        id: ProcessId,

        /// Status, as stored
        status: Box<str>,
    },

    /// Job runner failed to deliver a stop signal
    #[error("failed to stop process #{id}: {message}")]
    JobRunner {
        /// Process that should have been stopped
        id: ProcessId,

        /// Runner-specific failure description
        message: Box<str>,
    },

    /// Database was created by an incompatible version of this crate
    #[error("unsupported database schema version {0}")]
    SchemaVersion(i64),

    /// Underlying database failure
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}
