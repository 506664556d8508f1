//! Write side of an ngram generation run
//!
//! Generation jobs extract ngram counts from corpus text, which is none of
//! our business. What happens here is the bookkeeping around them: claiming
//! the single generation slot, then writing the results of the run in one
//! transaction, so that a run which crashes or errors out leaves no partial
//! rows behind. This is what allows [`reset_stuck_processes()`] to forget
//! about failed runs without cleaning anything up.
//!
//! [`reset_stuck_processes()`]: crate::process::reset_stuck_processes

use crate::{
    corpus::Slot,
    lifecycle,
    process::{self, ProcessStatus},
    query::canonical_ngram,
    sequence::SequenceType,
    store::{self, Store},
    CorpusId, Error, MatchCount, ProcessId, Result, SequenceMember,
};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::{btree_map, BTreeMap};

/// Ongoing generation run for one phase of one corpus
///
/// Counts are accumulated in memory and only hit the database on
/// [`commit()`](Self::commit). Dropping a run without committing or aborting
/// it leaves its process "in progress", just like a crashed worker would,
/// until [`reset_stuck_processes()`](process::reset_stuck_processes) is called.
#[derive(Debug)]
pub struct Generation<'store> {
    /// Database connection
    store: &'store mut Store,

    /// Corpus being generated
    corpus: CorpusId,

    /// Sequence type of that corpus
    sequence_type: SequenceType,

    /// Generation phase
    slot: Slot,

    /// Process representing this run
    process: ProcessId,

    /// Matches of each ngram in each sequence bucket
    ngram_counts: BTreeMap<(Box<str>, SequenceMember), MatchCount>,

    /// Explicitly recorded total number of ngrams in each sequence bucket
    totals: BTreeMap<SequenceMember, MatchCount>,
}
//
impl<'store> Generation<'store> {
    /// Start a generation run, if no other run is active
    ///
    /// Fails with [`Error::GenerationUnavailable`] when another run is active
    /// anywhere, not just in this corpus.
    pub fn begin(store: &'store mut Store, corpus: CorpusId, slot: Slot) -> Result<Self> {
        let (process, sequence_type) = process::claim_generation(store, corpus, slot)?;
        store.set_process_status(process, ProcessStatus::InProgress)?;
        Ok(Self {
            store,
            corpus,
            sequence_type,
            slot,
            process,
            ngram_counts: BTreeMap::new(),
            totals: BTreeMap::new(),
        })
    }

    /// Process representing this run
    pub fn process(&self) -> ProcessId {
        self.process
    }

    /// Record matches of an ngram in a sequence bucket
    ///
    /// Matches of the same ngram in the same bucket add up. The ngram must
    /// have as many words as this phase generates.
    pub fn record_ngram(&mut self, ngram: &str, member: SequenceMember, count: MatchCount) -> Result<()> {
        let (ngram, n) = canonical_ngram(ngram);
        if n != self.slot.n() as usize {
            return Err(Error::InvalidNgram {
                ngram: ngram.into(),
                n: self.slot.n(),
            });
        }
        self.check_member(member)?;
        match self.ngram_counts.entry((ngram.into(), member)) {
            btree_map::Entry::Occupied(o) => {
                let o = o.into_mut();
                *o = o.checked_add(count).ok_or(Error::CountOverflow(*o))?;
            }
            btree_map::Entry::Vacant(v) => {
                v.insert(count);
            }
        }
        Ok(())
    }

    /// Record ngrams of this phase's length in a sequence bucket
    ///
    /// Buckets without an explicit total use the sum of the matches recorded
    /// with [`record_ngram()`](Self::record_ngram) as their total.
    pub fn record_total(&mut self, member: SequenceMember, count: MatchCount) -> Result<()> {
        self.check_member(member)?;
        let total = self.totals.entry(member).or_insert(0);
        *total = total.checked_add(count).ok_or(Error::CountOverflow(*total))?;
        Ok(())
    }

    /// Atomically replace the corpus' data for this phase with the recorded
    /// data, and mark the run as completed
    ///
    /// If anything goes wrong, nothing is written and the run is marked as
    /// errored.
    pub fn commit(mut self) -> Result<()> {
        match self.write() {
            Ok(()) => {
                log::info!(
                    "Committed {} ngram facts for {:?} generation of corpus #{} (process #{})",
                    self.ngram_counts.len(),
                    self.slot,
                    self.corpus,
                    self.process
                );
                Ok(())
            }
            Err(e) => {
                log::warn!("Generation process #{} failed to commit: {e}", self.process);
                self.fail();
                Err(e)
            }
        }
    }

    /// Give up on this run, without writing anything
    pub fn abort(self) {
        log::info!("Aborted generation process #{}", self.process);
        self.fail();
    }

    /// Check that a member belongs to the corpus' sequence type
    fn check_member(&self, member: SequenceMember) -> Result<()> {
        if self.sequence_type.encoding().contains(member) {
            Ok(())
        } else {
            Err(Error::InvalidSequenceMember {
                sequence_type: self.sequence_type.key(),
                member,
            })
        }
    }

    /// Mark the run as errored
    ///
    /// Unless the run was cancelled, in which case its status belongs to
    /// whoever cancelled it.
    fn fail(&self) {
        let result = store::process_status(self.store.connection(), self.process).and_then(|status| {
            if status.is_some_and(ProcessStatus::is_running) {
                self.store.set_process_status(self.process, ProcessStatus::Error)
            } else {
                Ok(())
            }
        });
        if let Err(e) = result {
            log::warn!("Failed to flag generation process #{} as errored: {e}", self.process);
        }
    }

    /// Write the recorded data in a single transaction
    fn write(&mut self) -> Result<()> {
        let n = self.slot.n();
        let totals = self.bucket_totals();
        let tx = self.store.write_transaction()?;

        // Make sure that this run wasn't reset in the meantime
        let slot_process: Option<ProcessId> = tx
            .query_row(
                &format!("SELECT {} FROM ngram_corpus WHERE id = ?1", self.slot.column()),
                params![self.corpus],
                |row| row.get::<_, Option<ProcessId>>(0),
            )
            .optional()?
            .flatten();
        let status = store::process_status(&tx, self.process)?;
        if slot_process != Some(self.process) || status != Some(ProcessStatus::InProgress) {
            return Err(Error::GenerationCancelled(self.process));
        }

        // Replace the previous data of this phase
        lifecycle::delete_ngram_facts_in(&tx, self.corpus, Some(n))?;
        lifecycle::delete_total_counts_in(&tx, self.corpus, Some(n))?;
        for (&member, &count) in &totals {
            tx.execute(
                "INSERT INTO ngram_corpus_total_count (corpus_id, n, sequence_member, count)
                 VALUES (?1, ?2, ?3, ?4)",
                params![self.corpus, n, member, to_stored(count)?],
            )?;
        }
        for ((ngram, member), &count) in &self.ngram_counts {
            let ngram_id = ngram_id(&tx, ngram, n)?;
            let total = totals.get(member).copied().unwrap_or(0);
            let relative_frequency = if total == 0 {
                0.0
            } else {
                count as f64 / total as f64
            };
            log::trace!("Recording {ngram:?} at {member}: {count}/{total}");
            tx.execute(
                "INSERT INTO ngram_corpus_ngram
                    (corpus_id, ngram_id, sequence_member, match_count, relative_frequency)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![self.corpus, ngram_id, member, to_stored(count)?, relative_frequency],
            )?;
        }

        // Publish the results
        store::set_process_status(&tx, self.process, ProcessStatus::Completed)?;
        tx.commit()?;
        Ok(())
    }

    /// Total number of ngrams in each bucket, explicit or derived
    fn bucket_totals(&self) -> BTreeMap<SequenceMember, MatchCount> {
        let mut totals = BTreeMap::new();
        for ((_ngram, member), &count) in &self.ngram_counts {
            let total: &mut MatchCount = totals.entry(*member).or_default();
            *total = total.saturating_add(count);
        }
        totals.extend(self.totals.iter().map(|(&member, &count)| (member, count)));
        totals
    }
}

/// Identifier of an ngram, which is created if needed
fn ngram_id(connection: &Connection, ngram: &str, n: u32) -> Result<i64> {
    connection.execute(
        "INSERT OR IGNORE INTO ngram (ngram, n) VALUES (?1, ?2)",
        params![ngram, n],
    )?;
    Ok(connection.query_row(
        "SELECT id FROM ngram WHERE ngram = ?1",
        params![ngram],
        |row| row.get(0),
    )?)
}

/// Convert a count to its stored form
fn to_stored(count: MatchCount) -> Result<i64> {
    i64::try_from(count).map_err(|_| Error::CountOverflow(count))
}
