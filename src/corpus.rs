//! Corpora and their generation process slots

use crate::{
    sequence::{SequenceRange, SequenceType},
    CorpusId, Error, ProcessId, Result,
};
use serde::Serialize;

/// Corpus, as stored
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Corpus {
    /// Database identifier
    pub id: CorpusId,

    /// Human-readable name
    pub name: Box<str>,

    /// Record element from which ngrams are extracted
    pub text_element_id: i64,

    /// Record element whose value decides the sequence bucket of a record
    pub sequence_element_id: i64,

    /// Bucketing strategy
    pub sequence_type: SequenceType,

    /// Configured sequence range, which may be unbounded
    pub sequence_range: SequenceRange,

    /// Current or last generation process of each phase
    pub slots: ProcessSlots,
}

/// User input for creating or editing a corpus
///
/// Nothing is checked until [`validate()`](Self::validate) is called, which
/// happens automatically when the draft is handed to the store.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CorpusDraft {
    /// Human-readable name
    pub name: String,

    /// Record element from which ngrams are extracted
    pub text_element_id: i64,

    /// Record element whose value decides the sequence bucket of a record
    pub sequence_element_id: i64,

    /// Registry key of the sequence type
    pub sequence_type: String,

    /// Raw sequence range, empty for "unbounded"
    pub sequence_range: String,
}
//
impl CorpusDraft {
    /// Check the draft, resolving its sequence type and normalizing its range
    pub fn validate(&self) -> Result<ValidCorpusDraft> {
        // Check the name
        let name = self.name.trim();
        if name.is_empty() {
            return Err(Error::EmptyCorpusName);
        }

        // Resolve the sequence type, then check the range against it
        let sequence_type = self.sequence_type.trim().parse::<SequenceType>()?;
        let sequence_range = sequence_type
            .validator()
            .validate(&self.sequence_range)
            .map_err(|cause| Error::InvalidSequenceRange {
                sequence_type: sequence_type.key(),
                raw: self.sequence_range.as_str().into(),
                cause,
            })?;
        Ok(ValidCorpusDraft {
            name: name.into(),
            text_element_id: self.text_element_id,
            sequence_element_id: self.sequence_element_id,
            sequence_type,
            sequence_range,
        })
    }
}

/// Corpus draft that went through [`CorpusDraft::validate()`]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ValidCorpusDraft {
    pub(crate) name: Box<str>,
    pub(crate) text_element_id: i64,
    pub(crate) sequence_element_id: i64,
    pub(crate) sequence_type: SequenceType,
    pub(crate) sequence_range: SequenceRange,
}

/// Phase of ngram generation
///
/// Each corpus has one process slot per phase. Phase 1 generates unigrams and
/// phase 2 generates bigrams.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Slot {
    /// First phase, producing unigrams
    N1,

    /// Second phase, producing bigrams
    N2,
}
//
impl Slot {
    /// Every slot of a corpus
    pub const ALL: [Slot; 2] = [Self::N1, Self::N2];

    /// Length of the ngrams generated by this phase
    pub fn n(self) -> u32 {
        match self {
            Self::N1 => 1,
            Self::N2 => 2,
        }
    }

    /// Corpus table column holding this slot's process reference
    pub(crate) fn column(self) -> &'static str {
        match self {
            Self::N1 => "n1_process_id",
            Self::N2 => "n2_process_id",
        }
    }
}

/// Process references of a corpus, one per generation phase
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Serialize)]
pub struct ProcessSlots {
    /// First phase process
    pub n1: Option<ProcessId>,

    /// Second phase process
    pub n2: Option<ProcessId>,
}
//
impl ProcessSlots {
    /// Process referenced by a slot
    pub fn get(&self, slot: Slot) -> Option<ProcessId> {
        match slot {
            Slot::N1 => self.n1,
            Slot::N2 => self.n2,
        }
    }

    /// Occupied slots and their processes
    pub fn occupied(&self) -> impl Iterator<Item = (Slot, ProcessId)> + '_ {
        Slot::ALL
            .into_iter()
            .filter_map(|slot| self.get(slot).map(|process| (slot, process)))
    }
}
