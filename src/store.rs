//! SQLite storage of corpora, processes and ngram facts

use crate::{
    config::StoreConfig,
    corpus::{Corpus, CorpusDraft, ProcessSlots, ValidCorpusDraft},
    lifecycle,
    process::{self, ProcessStatus},
    sequence::{SequenceRange, SequenceType},
    CorpusId, Error, ProcessId, Result,
};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row, TransactionBehavior};

/// Version of the database schema created by [`Store::open()`]
const SCHEMA_VERSION: i64 = 1;

/// Columns of the corpus table, in the order expected by [`CorpusRow::map`]
const CORPUS_COLUMNS: &str = "id, name, text_element_id, sequence_element_id, sequence_type, \
                              sequence_range, n1_process_id, n2_process_id";

/// Connection to the relational store that backs the engine
///
/// Every check made through a store is a fresh read of committed state, so
/// several stores may be opened on the same database file by concurrent
/// requests and generation workers.
#[derive(Debug)]
pub struct Store {
    /// Underlying SQLite connection
    connection: Connection,
}
//
impl Store {
    /// Open (and if needed initialize) the database
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let connection = match &config.path {
            Some(path) => {
                let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_CREATE
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX;
                let connection = Connection::open_with_flags(path, flags)?;
                connection.execute_batch("PRAGMA journal_mode = WAL;")?;
                log::debug!("Opened ngram database at {}", path.display());
                connection
            }
            None => Connection::open_in_memory()?,
        };
        connection.execute_batch("PRAGMA foreign_keys = ON;")?;
        connection.busy_timeout(config.busy_timeout())?;
        let mut store = Self { connection };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Self::open(&StoreConfig::in_memory())
    }

    /// Underlying connection
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Start a transaction that takes the database write lock right away
    ///
    /// Use this for check-then-write sequences that must not interleave with
    /// other writers.
    pub(crate) fn write_transaction(&mut self) -> Result<rusqlite::Transaction<'_>> {
        Ok(self
            .connection
            .transaction_with_behavior(TransactionBehavior::Immediate)?)
    }

    /// Create the schema, or check that the existing one is compatible
    fn initialize_schema(&mut self) -> Result<()> {
        let tx = self.write_transaction()?;
        tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")?;
        let version: Option<i64> = tx
            .query_row("SELECT version FROM store_meta LIMIT 1", [], |row| row.get(0))
            .optional()?;
        match version {
            None => {
                log::info!("Initializing ngram database schema v{SCHEMA_VERSION}");
                tx.execute(
                    "INSERT INTO store_meta (version) VALUES (?1)",
                    params![SCHEMA_VERSION],
                )?;
                tx.execute_batch(
                    "CREATE TABLE IF NOT EXISTS process (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        status TEXT NOT NULL
                    );
                    CREATE TABLE IF NOT EXISTS ngram_corpus (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        name TEXT NOT NULL,
                        text_element_id INTEGER NOT NULL,
                        sequence_element_id INTEGER NOT NULL,
                        sequence_type TEXT NOT NULL,
                        sequence_range TEXT,
                        n1_process_id INTEGER,
                        n2_process_id INTEGER
                    );
                    CREATE TABLE IF NOT EXISTS ngram (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        ngram TEXT NOT NULL UNIQUE,
                        n INTEGER NOT NULL
                    );
                    CREATE TABLE IF NOT EXISTS ngram_corpus_ngram (
                        corpus_id INTEGER NOT NULL,
                        ngram_id INTEGER NOT NULL REFERENCES ngram (id),
                        sequence_member INTEGER NOT NULL,
                        match_count INTEGER NOT NULL,
                        relative_frequency REAL NOT NULL,
                        PRIMARY KEY (corpus_id, ngram_id, sequence_member)
                    );
                    CREATE INDEX IF NOT EXISTS idx_ngram_corpus_ngram_ngram
                        ON ngram_corpus_ngram (ngram_id);
                    CREATE TABLE IF NOT EXISTS ngram_corpus_total_count (
                        corpus_id INTEGER NOT NULL,
                        n INTEGER NOT NULL,
                        sequence_member INTEGER NOT NULL,
                        count INTEGER NOT NULL,
                        PRIMARY KEY (corpus_id, n, sequence_member)
                    );",
                )?;
            }
            Some(SCHEMA_VERSION) => {}
            Some(other) => return Err(Error::SchemaVersion(other)),
        }
        tx.commit()?;
        Ok(())
    }

    /// Create a corpus from a user draft
    pub fn create_corpus(&self, draft: &CorpusDraft) -> Result<CorpusId> {
        let ValidCorpusDraft {
            name,
            text_element_id,
            sequence_element_id,
            sequence_type,
            sequence_range,
        } = draft.validate()?;
        self.connection.execute(
            "INSERT INTO ngram_corpus
                (name, text_element_id, sequence_element_id, sequence_type, sequence_range)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                &*name,
                text_element_id,
                sequence_element_id,
                sequence_type.key(),
                range_to_column(sequence_type, &sequence_range),
            ],
        )?;
        let id = self.connection.last_insert_rowid();
        log::info!("Created {sequence_type} corpus #{id} {name:?}");
        Ok(id)
    }

    /// Edit a corpus from a user draft
    ///
    /// Only the name may change while a generation run of this corpus is
    /// active, since anything else would alter how the run buckets its data.
    pub fn update_corpus(&mut self, id: CorpusId, draft: &CorpusDraft) -> Result<()> {
        let draft = draft.validate()?;
        let tx = self.write_transaction()?;
        let current = load_corpus(&tx, id)?;
        let changes_bucketing = current.text_element_id != draft.text_element_id
            || current.sequence_element_id != draft.sequence_element_id
            || current.sequence_type != draft.sequence_type
            || current.sequence_range != draft.sequence_range;
        if changes_bucketing && process::corpus_is_busy(&tx, &current.slots)? {
            return Err(Error::CorpusBusy(id));
        }
        tx.execute(
            "UPDATE ngram_corpus
             SET name = ?2, text_element_id = ?3, sequence_element_id = ?4,
                 sequence_type = ?5, sequence_range = ?6
             WHERE id = ?1",
            params![
                id,
                &*draft.name,
                draft.text_element_id,
                draft.sequence_element_id,
                draft.sequence_type.key(),
                range_to_column(draft.sequence_type, &draft.sequence_range),
            ],
        )?;
        tx.commit()?;
        log::info!("Updated corpus #{id}");
        Ok(())
    }

    /// Look up a corpus
    pub fn corpus(&self, id: CorpusId) -> Result<Corpus> {
        load_corpus(&self.connection, id)
    }

    /// List every corpus, by increasing identifier
    pub fn corpora(&self) -> Result<Vec<Corpus>> {
        let mut statement = self
            .connection
            .prepare(&format!("SELECT {CORPUS_COLUMNS} FROM ngram_corpus ORDER BY id"))?;
        let corpora = statement
            .query_map([], CorpusRow::map)?
            .map(|row| row?.into_corpus())
            .collect::<Result<Vec<_>>>()?;
        Ok(corpora)
    }

    /// Delete a corpus, along with all of its ngram facts and total counts
    pub fn delete_corpus(&mut self, id: CorpusId) -> Result<()> {
        let tx = self.write_transaction()?;
        let corpus = load_corpus(&tx, id)?;
        if process::corpus_is_busy(&tx, &corpus.slots)? {
            return Err(Error::CorpusBusy(id));
        }
        lifecycle::delete_ngram_facts_in(&tx, id, None)?;
        lifecycle::delete_total_counts_in(&tx, id, None)?;
        tx.execute("DELETE FROM ngram_corpus WHERE id = ?1", params![id])?;
        tx.commit()?;
        log::info!("Deleted corpus #{id} {:?}", corpus.name);
        Ok(())
    }

    /// Record a new background process
    pub fn create_process(&self, status: ProcessStatus) -> Result<ProcessId> {
        create_process(&self.connection, status)
    }

    /// Current status of a process, if it exists
    pub fn process_status(&self, id: ProcessId) -> Result<Option<ProcessStatus>> {
        process_status(&self.connection, id)
    }

    /// Change the status of a process
    pub fn set_process_status(&self, id: ProcessId, status: ProcessStatus) -> Result<()> {
        set_process_status(&self.connection, id, status)
    }
}

/// Look up a corpus on some connection or transaction
pub(crate) fn load_corpus(connection: &Connection, id: CorpusId) -> Result<Corpus> {
    connection
        .query_row(
            &format!("SELECT {CORPUS_COLUMNS} FROM ngram_corpus WHERE id = ?1"),
            params![id],
            CorpusRow::map,
        )
        .optional()?
        .ok_or(Error::CorpusNotFound(id))?
        .into_corpus()
}

/// Record a new background process on some connection or transaction
pub(crate) fn create_process(connection: &Connection, status: ProcessStatus) -> Result<ProcessId> {
    connection.execute(
        "INSERT INTO process (status) VALUES (?1)",
        params![status.as_str()],
    )?;
    Ok(connection.last_insert_rowid())
}

/// Status of a process on some connection or transaction
pub(crate) fn process_status(
    connection: &Connection,
    id: ProcessId,
) -> Result<Option<ProcessStatus>> {
    let status: Option<String> = connection
        .query_row("SELECT status FROM process WHERE id = ?1", params![id], |row| {
            row.get(0)
        })
        .optional()?;
    status
        .map(|status| ProcessStatus::from_stored(id, &status))
        .transpose()
}

/// Change the status of a process on some connection or transaction
pub(crate) fn set_process_status(
    connection: &Connection,
    id: ProcessId,
    status: ProcessStatus,
) -> Result<()> {
    connection.execute(
        "UPDATE process SET status = ?2 WHERE id = ?1",
        params![id, status.as_str()],
    )?;
    log::debug!("Process #{id} is now {status}");
    Ok(())
}

/// Stored form of a sequence range
fn range_to_column(sequence_type: SequenceType, range: &SequenceRange) -> Option<String> {
    (!range.is_unbounded()).then(|| sequence_type.format_range(range))
}

/// Raw corpus row, before sequence type and range decoding
struct CorpusRow {
    id: CorpusId,
    name: String,
    text_element_id: i64,
    sequence_element_id: i64,
    sequence_type: String,
    sequence_range: Option<String>,
    n1_process_id: Option<ProcessId>,
    n2_process_id: Option<ProcessId>,
}
//
impl CorpusRow {
    /// Extract a row selected with [`CORPUS_COLUMNS`]
    fn map(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            text_element_id: row.get(2)?,
            sequence_element_id: row.get(3)?,
            sequence_type: row.get(4)?,
            sequence_range: row.get(5)?,
            n1_process_id: row.get(6)?,
            n2_process_id: row.get(7)?,
        })
    }

    /// Decode the sequence configuration
    ///
    /// Stored ranges are re-validated, so that a corrupted configuration is
    /// reported instead of being silently treated as unbounded.
    fn into_corpus(self) -> Result<Corpus> {
        let sequence_type = self.sequence_type.parse::<SequenceType>()?;
        let raw_range = self.sequence_range.unwrap_or_default();
        let sequence_range = sequence_type
            .validator()
            .validate(&raw_range)
            .map_err(|cause| Error::InvalidSequenceRange {
                sequence_type: sequence_type.key(),
                raw: raw_range.into(),
                cause,
            })?;
        Ok(Corpus {
            id: self.id,
            name: self.name.into(),
            text_element_id: self.text_element_id,
            sequence_element_id: self.sequence_element_id,
            sequence_type,
            sequence_range,
            slots: ProcessSlots {
                n1: self.n1_process_id,
                n2: self.n2_process_id,
            },
        })
    }
}
