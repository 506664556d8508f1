//! Read side: ngram frequency time series and counts
//!
//! Queries only ever see committed rows, so they need no locking and may run
//! while a generation is in progress (they will see pre-generation data until
//! the generation commits). Ngrams that were never observed and ranges without
//! data yield empty or zero results, not errors.

use crate::{
    corpus::Corpus,
    sequence::SequenceRange,
    store::Store,
    CorpusId, MatchCount, Result, SequenceMember,
};
use rusqlite::params;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Relative frequency of an ngram in one sequence bucket
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct FrequencyPoint {
    /// Sequence bucket
    pub member: SequenceMember,

    /// Matches of the ngram in this bucket, divided by the total number of
    /// ngrams of the same length in this bucket
    pub relative_frequency: f64,
}

/// Accumulated matches of an ngram over some range
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct NgramCount {
    /// Total number of matches
    pub count: MatchCount,

    /// Length of the ngram, or `None` if nothing matched
    pub n: Option<u32>,
}

/// Canonical form of an ngram: its words separated by single spaces
///
/// Also returns the number of words, which is the ngram's `n`.
pub fn canonical_ngram(text: &str) -> (String, usize) {
    let words = text.split_whitespace().collect::<Vec<_>>();
    (words.join(" "), words.len())
}

/// Frequency time series of an ngram within a corpus
///
/// Points are sorted by increasing bucket, with at most one point per bucket.
pub fn frequencies(
    store: &Store,
    corpus: CorpusId,
    ngram: &str,
    bounds: &SequenceRange,
) -> Result<Vec<FrequencyPoint>> {
    let (ngram, _n) = canonical_ngram(ngram);
    let mut statement = store.connection().prepare_cached(
        "SELECT cn.sequence_member, cn.relative_frequency
         FROM ngram_corpus_ngram cn
         JOIN ngram n ON cn.ngram_id = n.id
         WHERE cn.corpus_id = ?1
         AND n.ngram = ?2
         AND (?3 IS NULL OR cn.sequence_member >= ?3)
         AND (?4 IS NULL OR cn.sequence_member <= ?4)
         ORDER BY cn.sequence_member",
    )?;
    let points = statement
        .query_map(params![corpus, ngram, bounds.start, bounds.end], |row| {
            Ok(FrequencyPoint {
                member: row.get(0)?,
                relative_frequency: row.get(1)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    log::trace!("Found {} {ngram:?} data points in corpus #{corpus}", points.len());
    Ok(points)
}

/// Number of matches of an ngram within a corpus
pub fn ngram_count(
    store: &Store,
    corpus: CorpusId,
    ngram: &str,
    bounds: &SequenceRange,
) -> Result<NgramCount> {
    let (ngram, _n) = canonical_ngram(ngram);
    let (count, n) = store.connection().query_row(
        "SELECT SUM(cn.match_count), MAX(n.n)
         FROM ngram_corpus_ngram cn
         JOIN ngram n ON cn.ngram_id = n.id
         WHERE cn.corpus_id = ?1
         AND n.ngram = ?2
         AND (?3 IS NULL OR cn.sequence_member >= ?3)
         AND (?4 IS NULL OR cn.sequence_member <= ?4)",
        params![corpus, ngram, bounds.start, bounds.end],
        |row| Ok((row.get::<_, Option<i64>>(0)?, row.get::<_, Option<u32>>(1)?)),
    )?;
    Ok(NgramCount {
        count: count.map_or(0, to_match_count),
        n,
    })
}

/// Total number of ngrams of length `n` observed within a corpus
pub fn total_ngram_count(
    store: &Store,
    corpus: CorpusId,
    n: u32,
    bounds: &SequenceRange,
) -> Result<MatchCount> {
    let total: Option<i64> = store.connection().query_row(
        "SELECT SUM(count)
         FROM ngram_corpus_total_count
         WHERE corpus_id = ?1
         AND n = ?2
         AND (?3 IS NULL OR sequence_member >= ?3)
         AND (?4 IS NULL OR sequence_member <= ?4)",
        params![corpus, n, bounds.start, bounds.end],
        |row| row.get(0),
    )?;
    Ok(total.map_or(0, to_match_count))
}

/// Frequency time series of an ngram on a dense sequence axis
///
/// Like [`frequencies()`], but every bucket between the extremes of the data,
/// the corpus' configured range and the query bounds gets a point, with a
/// relative frequency of zero where the ngram wasn't observed. Query bounds
/// that are not valid members of the corpus' sequence type only clip the
/// axis, they don't extend it.
pub fn filled_frequencies(
    store: &Store,
    corpus: &Corpus,
    ngram: &str,
    bounds: &SequenceRange,
    max_len: usize,
) -> Result<Vec<FrequencyPoint>> {
    // Collect the observed data
    let observed = frequencies(store, corpus.id, ngram, bounds)?
        .into_iter()
        .map(|point| (point.member, point.relative_frequency))
        .collect::<BTreeMap<_, _>>();

    // Query bounds take precedence over the configured range
    let encoding = corpus.sequence_type.encoding();
    let valid_bound = |bound: Option<SequenceMember>| bound.filter(|&member| encoding.contains(member));
    let extent = SequenceRange::new(
        valid_bound(bounds.start).or(corpus.sequence_range.start),
        valid_bound(bounds.end).or(corpus.sequence_range.end),
    );

    // Fill in the gaps
    let members = observed.keys().copied().collect::<BTreeSet<_>>();
    let axis = corpus
        .sequence_type
        .filler()
        .fill(&members, &extent, max_len)?;
    Ok(axis
        .into_iter()
        .filter(|&member| bounds.contains(member))
        .map(|member| FrequencyPoint {
            member,
            relative_frequency: observed.get(&member).copied().unwrap_or(0.0),
        })
        .collect())
}

/// Convert a stored count, which is never negative
fn to_match_count(count: i64) -> MatchCount {
    MatchCount::try_from(count).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CorpusDraft, SequenceType};

    /// Corpus with "the" observed in 2019 and 2021, and "the cat" in 2019
    fn fixture(sequence_range: &str) -> (Store, Corpus) {
        let store = Store::open_in_memory().unwrap();
        let id = store
            .create_corpus(&CorpusDraft {
                name: "Letters".into(),
                text_element_id: 1,
                sequence_element_id: 2,
                sequence_type: "year".into(),
                sequence_range: sequence_range.into(),
            })
            .unwrap();
        store
            .connection()
            .execute_batch(&format!(
                "INSERT INTO ngram (id, ngram, n) VALUES (1, 'the', 1), (2, 'the cat', 2);
                 INSERT INTO ngram_corpus_ngram VALUES
                    ({id}, 1, 2021, 3, 0.0015),
                    ({id}, 1, 2019, 5, 0.005),
                    ({id}, 2, 2019, 2, 0.004),
                    ({other}, 1, 2020, 9, 0.9);
                 INSERT INTO ngram_corpus_total_count VALUES
                    ({id}, 1, 2019, 1000), ({id}, 1, 2021, 2000), ({id}, 2, 2019, 500);",
                other = id + 1
            ))
            .unwrap();
        let corpus = store.corpus(id).unwrap();
        (store, corpus)
    }

    fn point(member: SequenceMember, relative_frequency: f64) -> FrequencyPoint {
        FrequencyPoint {
            member,
            relative_frequency,
        }
    }

    #[test]
    fn frequencies_are_sorted_and_bounded() {
        let (store, corpus) = fixture("");
        let all = frequencies(&store, corpus.id, "the", &SequenceRange::UNBOUNDED).unwrap();
        assert_eq!(all, [point(2019, 0.005), point(2021, 0.0015)]);

        let late = frequencies(&store, corpus.id, "the", &SequenceRange::lenient(Some("2020"), None))
            .unwrap();
        assert_eq!(late, [point(2021, 0.0015)]);

        let malformed_bound = SequenceRange::lenient(Some("soon"), Some("2019"));
        let early = frequencies(&store, corpus.id, "the", &malformed_bound).unwrap();
        assert_eq!(early, [point(2019, 0.005)]);

        let spaced = frequencies(&store, corpus.id, "  the   cat ", &SequenceRange::UNBOUNDED).unwrap();
        assert_eq!(spaced, [point(2019, 0.004)]);
    }

    #[test]
    fn unknown_ngrams_are_empty() {
        let (store, corpus) = fixture("");
        assert!(frequencies(&store, corpus.id, "dog", &SequenceRange::UNBOUNDED)
            .unwrap()
            .is_empty());
        assert_eq!(
            ngram_count(&store, corpus.id, "dog", &SequenceRange::UNBOUNDED).unwrap(),
            NgramCount { count: 0, n: None }
        );
        assert_eq!(
            total_ngram_count(&store, corpus.id, 3, &SequenceRange::UNBOUNDED).unwrap(),
            0
        );
    }

    #[test]
    fn counts() {
        let (store, corpus) = fixture("");
        assert_eq!(
            ngram_count(&store, corpus.id, "the", &SequenceRange::UNBOUNDED).unwrap(),
            NgramCount { count: 8, n: Some(1) }
        );
        assert_eq!(
            ngram_count(&store, corpus.id, "the", &SequenceRange::new(Some(2020), None)).unwrap(),
            NgramCount { count: 3, n: Some(1) }
        );
        assert_eq!(
            ngram_count(&store, corpus.id, "the cat", &SequenceRange::UNBOUNDED).unwrap(),
            NgramCount { count: 2, n: Some(2) }
        );
        assert_eq!(
            total_ngram_count(&store, corpus.id, 1, &SequenceRange::UNBOUNDED).unwrap(),
            3000
        );
        assert_eq!(
            total_ngram_count(&store, corpus.id, 1, &SequenceRange::new(None, Some(2020))).unwrap(),
            1000
        );
    }

    #[test]
    fn filled_series_is_zero_backed() {
        let (store, corpus) = fixture("");
        assert_eq!(corpus.sequence_type, SequenceType::Year);
        let filled =
            filled_frequencies(&store, &corpus, "the", &SequenceRange::UNBOUNDED, 100).unwrap();
        assert_eq!(filled, [point(2019, 0.005), point(2020, 0.0), point(2021, 0.0015)]);

        let clipped =
            filled_frequencies(&store, &corpus, "the", &SequenceRange::new(Some(2020), Some(2022)), 100)
                .unwrap();
        assert_eq!(clipped, [point(2020, 0.0), point(2021, 0.0015), point(2022, 0.0)]);

        let unseen =
            filled_frequencies(&store, &corpus, "dog", &SequenceRange::UNBOUNDED, 100).unwrap();
        assert!(unseen.is_empty());
    }

    #[test]
    fn filled_series_spans_configured_range() {
        let (store, corpus) = fixture("2017-2022");
        let filled =
            filled_frequencies(&store, &corpus, "the", &SequenceRange::UNBOUNDED, 100).unwrap();
        assert_eq!(
            filled.iter().map(|p| p.member).collect::<Vec<_>>(),
            [2017, 2018, 2019, 2020, 2021, 2022]
        );

        // Bounds that aren't years clip without extending
        let filled = filled_frequencies(
            &store,
            &corpus,
            "the",
            &SequenceRange::new(Some(201_901), None),
            100,
        )
        .unwrap();
        assert!(filled.is_empty());
    }
}
