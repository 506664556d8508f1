//! Bulk removal of a corpus' generated data
//!
//! Used before a corpus is regenerated from scratch, and when it is deleted.
//! Deleting data that isn't there is not an error.

use crate::{store::Store, CorpusId, Result};
use rusqlite::{params, Connection};

/// Remove every ngram fact row of a corpus
pub fn delete_ngram_facts(store: &Store, corpus: CorpusId) -> Result<()> {
    let deleted = delete_ngram_facts_in(store.connection(), corpus, None)?;
    log::info!("Deleted {deleted} ngram facts of corpus #{corpus}");
    Ok(())
}

/// Remove every total count row of a corpus
pub fn delete_total_counts(store: &Store, corpus: CorpusId) -> Result<()> {
    let deleted = delete_total_counts_in(store.connection(), corpus, None)?;
    log::info!("Deleted {deleted} total counts of corpus #{corpus}");
    Ok(())
}

/// Remove a corpus' ngram facts, optionally only for ngrams of length `n`
///
/// Returns the number of deleted rows.
pub(crate) fn delete_ngram_facts_in(
    connection: &Connection,
    corpus: CorpusId,
    n: Option<u32>,
) -> Result<usize> {
    Ok(connection.execute(
        "DELETE FROM ngram_corpus_ngram
         WHERE corpus_id = ?1
         AND (?2 IS NULL OR ngram_id IN (SELECT id FROM ngram WHERE n = ?2))",
        params![corpus, n],
    )?)
}

/// Remove a corpus' total counts, optionally only for ngrams of length `n`
///
/// Returns the number of deleted rows.
pub(crate) fn delete_total_counts_in(
    connection: &Connection,
    corpus: CorpusId,
    n: Option<u32>,
) -> Result<usize> {
    Ok(connection.execute(
        "DELETE FROM ngram_corpus_total_count
         WHERE corpus_id = ?1 AND (?2 IS NULL OR n = ?2)",
        params![corpus, n],
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_rows(store: &Store, table: &str, corpus: CorpusId) -> i64 {
        store
            .connection()
            .query_row(
                &format!("SELECT COUNT(*) FROM {table} WHERE corpus_id = ?1"),
                params![corpus],
                |row| row.get(0),
            )
            .unwrap()
    }

    fn seed(store: &Store) {
        store
            .connection()
            .execute_batch(
                "INSERT INTO ngram (id, ngram, n) VALUES (1, 'the', 1), (2, 'the cat', 2);
                 INSERT INTO ngram_corpus_ngram VALUES
                    (1, 1, 2019, 5, 0.005), (1, 2, 2019, 1, 0.002), (2, 1, 2019, 3, 0.3);
                 INSERT INTO ngram_corpus_total_count VALUES
                    (1, 1, 2019, 1000), (1, 2, 2019, 500), (2, 1, 2019, 10);",
            )
            .unwrap();
    }

    #[test]
    fn deletions_are_scoped_and_idempotent() {
        let store = Store::open_in_memory().unwrap();
        seed(&store);

        delete_ngram_facts(&store, 1).unwrap();
        assert_eq!(count_rows(&store, "ngram_corpus_ngram", 1), 0);
        assert_eq!(count_rows(&store, "ngram_corpus_ngram", 2), 1);
        delete_ngram_facts(&store, 1).unwrap();
        assert_eq!(count_rows(&store, "ngram_corpus_ngram", 1), 0);

        delete_total_counts(&store, 1).unwrap();
        delete_total_counts(&store, 1).unwrap();
        assert_eq!(count_rows(&store, "ngram_corpus_total_count", 1), 0);
        assert_eq!(count_rows(&store, "ngram_corpus_total_count", 2), 1);
    }

    #[test]
    fn deletions_by_ngram_length() {
        let store = Store::open_in_memory().unwrap();
        seed(&store);
        assert_eq!(delete_ngram_facts_in(store.connection(), 1, Some(2)).unwrap(), 1);
        assert_eq!(delete_total_counts_in(store.connection(), 1, Some(2)).unwrap(), 1);
        assert_eq!(count_rows(&store, "ngram_corpus_ngram", 1), 1);
        assert_eq!(count_rows(&store, "ngram_corpus_total_count", 1), 1);
        assert_eq!(delete_ngram_facts_in(store.connection(), 1, Some(2)).unwrap(), 0);
    }
}
