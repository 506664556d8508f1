//! Property-based tests using proptest

use corpus_ngrams::{
    generation::Generation, query, sequence::RangeError, CorpusDraft, MatchCount, SequenceRange,
    SequenceType, Slot, Store,
};
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

/// Sequence types, for use as a strategy
fn sequence_type() -> impl Strategy<Value = SequenceType> {
    prop::sample::select(SequenceType::ALL.to_vec())
}

/// Valid month member (YYYYMM)
fn month() -> impl Strategy<Value = i64> {
    (1000i64..3000, 1i64..=12).prop_map(|(year, month)| year * 100 + month)
}

/// Observations of unigrams in a numeric corpus, as (word, member) -> count
fn observations() -> impl Strategy<Value = BTreeMap<(String, i64), MatchCount>> {
    prop::collection::btree_map(
        (prop::sample::select(vec!["the", "cat", "sat"]), 0i64..40)
            .prop_map(|(word, member)| (word.to_owned(), member)),
        1u64..1000,
        0..40,
    )
}

/// Numeric corpus holding the specified unigram observations
fn populated_store(observations: &BTreeMap<(String, i64), MatchCount>) -> (Store, i64) {
    let mut store = Store::open_in_memory().unwrap();
    let id = store
        .create_corpus(&CorpusDraft {
            name: "Measurements".into(),
            text_element_id: 1,
            sequence_element_id: 2,
            sequence_type: "numeric".into(),
            sequence_range: String::new(),
        })
        .unwrap();
    let mut run = Generation::begin(&mut store, id, Slot::N1).unwrap();
    for ((word, member), &count) in observations {
        run.record_ngram(word, *member, count).unwrap();
    }
    run.commit().unwrap();
    (store, id)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_year_ranges_validate_iff_ordered(a in 0i64..=9999, b in 0i64..=9999) {
        let raw = format!("{a:04}-{b:04}");
        let outcome = SequenceType::Year.validator().validate(&raw);
        if a <= b {
            prop_assert_eq!(outcome, Ok(SequenceRange::new(Some(a), Some(b))));
        } else {
            prop_assert_eq!(outcome, Err(RangeError::Inverted { start: a, end: b }));
        }
    }

    #[test]
    fn test_normalized_ranges_are_stable(ty in sequence_type(), start in 0i64..=9999, open_end in any::<bool>()) {
        // Build a valid raw range for this type from a year
        let member = match ty {
            SequenceType::Year => start,
            SequenceType::Month => start * 100 + 1,
            SequenceType::Day => start * 10_000 + 101,
            SequenceType::Numeric => start,
        };
        let range = SequenceRange::new(Some(member), (!open_end).then_some(member));
        let raw = ty.format_range(&range);
        let validated = ty.validator().validate(&raw).unwrap();
        prop_assert_eq!(validated, range);
        prop_assert_eq!(ty.format_range(&validated), raw);
    }

    #[test]
    fn test_signed_numeric_ranges_are_stable(
        a in any::<i64>(),
        b in any::<i64>(),
        open_start in any::<bool>(),
        open_end in any::<bool>(),
    ) {
        let (low, high) = (a.min(b), a.max(b));
        let range = SequenceRange::new((!open_start).then_some(low), (!open_end).then_some(high));
        let raw = SequenceType::Numeric.format_range(&range);
        let validated = SequenceType::Numeric.validator().validate(&raw);
        prop_assert_eq!(validated, Ok(range), "raw range {:?}", raw);
        if !open_start && !open_end && low < high {
            let inverted = format!("{high}-{low}");
            prop_assert_eq!(
                SequenceType::Numeric.validator().validate(&inverted),
                Err(RangeError::Inverted { start: high, end: low })
            );
        }
    }

    #[test]
    fn test_numeric_fill_is_dense(observed in prop::collection::btree_set(-500i64..500, 0..20)) {
        let filled = SequenceType::Numeric
            .filler()
            .fill(&observed, &SequenceRange::UNBOUNDED, 10_000)
            .unwrap();
        match (observed.first(), observed.last()) {
            (Some(&first), Some(&last)) => {
                prop_assert_eq!(filled, (first..=last).collect::<Vec<_>>());
            }
            _ => prop_assert!(filled.is_empty()),
        }
    }

    #[test]
    fn test_month_fill_is_dense(observed in prop::collection::btree_set(month(), 1..6)) {
        let encoding = SequenceType::Month.encoding();
        let filled = SequenceType::Month
            .filler()
            .fill(&observed, &SequenceRange::UNBOUNDED, 1_000_000)
            .unwrap();
        prop_assert!(observed.iter().all(|member| filled.binary_search(member).is_ok()));
        prop_assert_eq!(filled.first(), observed.first());
        prop_assert_eq!(filled.last(), observed.last());
        for pair in filled.windows(2) {
            prop_assert_eq!(encoding.next(pair[0]), Some(pair[1]));
        }
    }

    #[test]
    fn test_bounded_queries_are_subsequences(
        observations in observations(),
        start in prop::option::of(0i64..40),
        end in prop::option::of(0i64..40),
    ) {
        let (store, id) = populated_store(&observations);
        let bounds = SequenceRange::new(start, end);
        for word in ["the", "cat", "sat", "dog"] {
            let all = query::frequencies(&store, id, word, &SequenceRange::UNBOUNDED).unwrap();
            let bounded = query::frequencies(&store, id, word, &bounds).unwrap();
            let expected = all
                .into_iter()
                .filter(|point| bounds.contains(point.member))
                .collect::<Vec<_>>();
            prop_assert_eq!(bounded, expected);
        }
    }

    #[test]
    fn test_counts_aggregate_observations(
        observations in observations(),
        start in prop::option::of(0i64..40),
        end in prop::option::of(0i64..40),
    ) {
        let (store, id) = populated_store(&observations);
        let bounds = SequenceRange::new(start, end);
        let in_bounds = || {
            observations
                .iter()
                .filter(|((_word, member), _count)| bounds.contains(*member))
        };

        // Per-ngram counts
        for word in ["the", "cat", "sat"] {
            let expected = in_bounds()
                .filter(|((other, _member), _count)| other == word)
                .map(|(_key, count)| count)
                .sum::<MatchCount>();
            let actual = query::ngram_count(&store, id, word, &bounds).unwrap();
            prop_assert_eq!(actual.count, expected);
            prop_assert_eq!(actual.n, (expected > 0).then_some(1));
        }

        // Totals were derived from the observations
        let expected_total = in_bounds().map(|(_key, count)| count).sum::<MatchCount>();
        prop_assert_eq!(
            query::total_ngram_count(&store, id, 1, &bounds).unwrap(),
            expected_total
        );

        // Frequencies within a bucket add up to 1
        let members = observations.keys().map(|(_word, member)| *member).collect::<BTreeSet<_>>();
        for member in members {
            let bucket = SequenceRange::new(Some(member), Some(member));
            let sum = ["the", "cat", "sat"]
                .iter()
                .flat_map(|word| query::frequencies(&store, id, word, &bucket).unwrap())
                .map(|point| point.relative_frequency)
                .sum::<f64>();
            prop_assert!((sum - 1.0).abs() < 1e-9, "bucket {} sums to {}", member, sum);
        }
    }
}
