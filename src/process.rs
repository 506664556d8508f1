//! Single-flight coordination of ngram generation runs
//!
//! Generation jobs share intermediate storage, so at most one of them may be
//! running at any given time across *all* corpora. The state that enforces
//! this lives entirely in the database: each corpus has one process slot per
//! generation phase, and a new run may only start when every slot of every
//! corpus is either empty or references a completed process.

use crate::{
    corpus::{ProcessSlots, Slot},
    sequence::SequenceType,
    store::{self, Store},
    CorpusId, Error, ProcessId, Result,
};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::fmt;

/// Lifecycle status of a background process
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    /// Process was dispatched, but hasn't started working yet
    Starting,

    /// Process is working
    #[serde(rename = "in progress")]
    InProgress,

    /// Process finished successfully
    Completed,

    /// Process failed, without leaving any partial results behind
    Error,
}
//
impl ProcessStatus {
    /// Stored form
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::InProgress => "in progress",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    /// Decode the stored form of a process' status
    pub(crate) fn from_stored(id: ProcessId, status: &str) -> Result<Self> {
        [
            Self::Starting,
            Self::InProgress,
            Self::Completed,
            Self::Error,
        ]
        .into_iter()
        .find(|candidate| candidate.as_str() == status)
        .ok_or_else(|| Error::InvalidProcessStatus {
            id,
            status: status.into(),
        })
    }

    /// Truth that a process with this status may still be running
    ///
    /// If it isn't actually running anymore, it has hung.
    pub fn is_running(self) -> bool {
        matches!(self, Self::Starting | Self::InProgress)
    }
}
//
impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// External job runner that executes generation processes
pub trait JobRunner {
    /// Ask a process to stop
    ///
    /// This is a best-effort signal, which may take effect at any later time.
    fn stop(&self, process: ProcessId) -> Result<()>;
}

/// Job runner whose workers watch their own process status
///
/// Stopping a process flags it as errored in the database. A
/// [`Generation`](crate::generation::Generation) notices this when it tries to
/// commit and gives up without writing anything.
#[derive(Debug)]
pub struct DatabaseJobRunner {
    /// Dedicated connection to the database
    store: Store,
}
//
impl DatabaseJobRunner {
    /// Set up a job runner that uses its own database connection
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}
//
impl JobRunner for DatabaseJobRunner {
    fn stop(&self, process: ProcessId) -> Result<()> {
        self.store.set_process_status(process, ProcessStatus::Error)
    }
}

/// Truth that a new generation run may start
///
/// This is a system-wide check: a single corpus with a non-completed process
/// in either slot makes generation unavailable for every corpus.
pub fn is_generation_available(store: &Store) -> Result<bool> {
    generation_available(store.connection())
}

/// Availability check on some connection or transaction
///
/// Slots that reference a process which doesn't exist are ignored.
fn generation_available(connection: &Connection) -> Result<bool> {
    let blocked: bool = connection.query_row(
        "SELECT EXISTS (
            SELECT 1
            FROM ngram_corpus nc
            LEFT JOIN process p1 ON nc.n1_process_id = p1.id
            LEFT JOIN process p2 ON nc.n2_process_id = p2.id
            WHERE p1.status != ?1 OR p2.status != ?1
        )",
        params![ProcessStatus::Completed.as_str()],
        |row| row.get(0),
    )?;
    Ok(!blocked)
}

/// Truth that one of a corpus' slots references a running (or hung) process
pub(crate) fn corpus_is_busy(connection: &Connection, slots: &ProcessSlots) -> Result<bool> {
    for (_slot, process) in slots.occupied() {
        if store::process_status(connection, process)?.is_some_and(ProcessStatus::is_running) {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Claim a corpus' process slot for a new generation run
///
/// The availability check and the slot assignment happen in one write
/// transaction, so two concurrent launches cannot both succeed. On success,
/// the new process is recorded as [`ProcessStatus::Starting`] and returned.
pub fn start_generation(store: &mut Store, corpus: CorpusId, slot: Slot) -> Result<ProcessId> {
    claim_generation(store, corpus, slot).map(|(process, _sequence_type)| process)
}

/// [`start_generation()`], which also tells the corpus' sequence type as seen
/// by the claiming transaction
///
/// The sequence type cannot change after that since the corpus is then busy.
pub(crate) fn claim_generation(
    store: &mut Store,
    corpus: CorpusId,
    slot: Slot,
) -> Result<(ProcessId, SequenceType)> {
    let tx = store.write_transaction()?;
    if !generation_available(&tx)? {
        log::info!("Refused to start {slot:?} generation of corpus #{corpus}: another run is active");
        return Err(Error::GenerationUnavailable);
    }
    let sequence_type = tx
        .query_row(
            "SELECT sequence_type FROM ngram_corpus WHERE id = ?1",
            params![corpus],
            |row| row.get::<_, String>(0),
        )
        .optional()?
        .ok_or(Error::CorpusNotFound(corpus))?
        .parse::<SequenceType>()?;
    let process = store::create_process(&tx, ProcessStatus::Starting)?;
    tx.execute(
        &format!("UPDATE ngram_corpus SET {} = ?2 WHERE id = ?1", slot.column()),
        params![corpus, process],
    )?;
    tx.commit()?;
    log::info!("Started {slot:?} generation of corpus #{corpus} as process #{process}");
    Ok((process, sequence_type))
}

/// Process slot that was freed by [`reset_stuck_processes()`]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct ClearedSlot {
    /// Corpus that owned the slot
    pub corpus: CorpusId,

    /// Slot that was cleared
    pub slot: Slot,

    /// Process that the slot used to reference
    pub process: ProcessId,

    /// Status of that process when the slot was cleared
    ///
    /// Statuses that couldn't be decoded are reported as errors.
    pub status: ProcessStatus,

    /// Truth that the job runner was asked to stop the process
    pub stop_requested: bool,
}

/// Free the slots of errored and hung generation processes
///
/// Errored runs are simply forgotten: generation writes are transactional, so
/// they left no rows behind. Hung runs (still starting or in progress) are
/// also told to stop through the job runner, on a best-effort basis: the slot
/// is freed whether the signal gets through or not. Processes whose status
/// can't be decoded are handled like errored ones.
///
/// Slots are cleared with a compare-and-set, so this may run concurrently
/// with itself or with new launches, and running it again is a no-op.
pub fn reset_stuck_processes(store: &mut Store, runner: &dyn JobRunner) -> Result<Vec<ClearedSlot>> {
    // Take a snapshot of every corpus' slots
    let snapshot = {
        let mut statement = store
            .connection()
            .prepare("SELECT id, n1_process_id, n2_process_id FROM ngram_corpus ORDER BY id")?;
        let slots = statement
            .query_map([], |row| {
                Ok((
                    row.get::<_, CorpusId>(0)?,
                    ProcessSlots {
                        n1: row.get(1)?,
                        n2: row.get(2)?,
                    },
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        slots
    };

    // Reset problematic slots, one corpus at a time
    let mut cleared = Vec::new();
    for (corpus, slots) in snapshot {
        let mut corpus_cleared = Vec::new();
        let tx = store.write_transaction()?;
        for (slot, process) in slots.occupied() {
            // Determine what should be done about this process
            let status = match store::process_status(&tx, process) {
                Ok(Some(status)) => status,
                Err(Error::InvalidProcessStatus { status, .. }) => {
                    log::warn!("Process #{process} has unknown status {status:?}, treating it as errored");
                    ProcessStatus::Error
                }
                Ok(None) => {
                    log::warn!("Corpus #{corpus} {slot:?} slot references missing process #{process}, leaving it alone");
                    continue;
                }
                Err(e) => {
                    log::warn!("Skipping corpus #{corpus} {slot:?} slot: {e}");
                    continue;
                }
            };
            if status == ProcessStatus::Completed {
                continue;
            }

            // Free the slot, unless someone else got there first
            let freed = tx.execute(
                &format!(
                    "UPDATE ngram_corpus SET {column} = NULL WHERE id = ?1 AND {column} = ?2",
                    column = slot.column()
                ),
                params![corpus, process],
            )?;
            if freed == 0 {
                log::debug!("Corpus #{corpus} {slot:?} slot was already reset concurrently");
                continue;
            }
            corpus_cleared.push(ClearedSlot {
                corpus,
                slot,
                process,
                status,
                stop_requested: status.is_running(),
            });
        }
        tx.commit()?;

        // Tell hung processes to stop once their slots are durably freed
        for cleared_slot in &corpus_cleared {
            log::info!(
                "Reset corpus #{} {:?} slot, which referenced {} process #{}",
                cleared_slot.corpus,
                cleared_slot.slot,
                cleared_slot.status,
                cleared_slot.process
            );
            if cleared_slot.stop_requested {
                if let Err(e) = runner.stop(cleared_slot.process) {
                    log::warn!("Failed to stop hung process #{}: {e}", cleared_slot.process);
                }
            }
        }
        cleared.extend(corpus_cleared);
    }
    Ok(cleared)
}
