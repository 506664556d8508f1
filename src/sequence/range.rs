//! Sequence ranges and their validation

use super::MemberEncoding;
use crate::SequenceMember;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Separator between the two bounds of a textual range
pub const SEPARATOR: char = '-';

/// Checks that a corpus' configured sequence range is well-formed
pub trait CorpusValidator: Sync {
    /// Validate a raw range string, producing its normalized form
    ///
    /// The accepted syntax is `START-END`, where either side may be left empty
    /// to get an open-ended range, and an empty string means "unbounded".
    /// Bounds use the member encoding of the sequence type (e.g. `YYYYMM` for
    /// months), and `START` must not come after `END`.
    fn validate(&self, raw: &str) -> Result<SequenceRange, RangeError>;
}
//
impl<E: MemberEncoding> CorpusValidator for E {
    fn validate(&self, raw: &str) -> Result<SequenceRange, RangeError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(SequenceRange::UNBOUNDED);
        }
        let Some((start, end)) = split_bounds(raw, self.signed()) else {
            return Err(RangeError::Malformed);
        };
        let end_digits = if self.signed() {
            end.trim_start().strip_prefix(SEPARATOR).unwrap_or(end)
        } else {
            end
        };
        if end_digits.contains(SEPARATOR) {
            return Err(RangeError::Malformed);
        }
        let parse_bound = |side, text: &str| {
            let text = text.trim();
            if text.is_empty() {
                return Ok(None);
            }
            self.parse(text)
                .map(Some)
                .ok_or_else(|| RangeError::Unparseable {
                    side,
                    value: text.into(),
                })
        };
        let range = SequenceRange {
            start: parse_bound(Side::Start, start)?,
            end: parse_bound(Side::End, end)?,
        };
        if let (Some(start), Some(end)) = (range.start, range.end) {
            if start > end {
                return Err(RangeError::Inverted { start, end });
            }
        }
        log::trace!("Validated {} range {raw:?} into {range:?}", self.key());
        Ok(range)
    }
}

/// Why a raw sequence range was rejected
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum RangeError {
    /// Not of the form `START-END`
    #[error("expected START-END, where either side may be left empty")]
    Malformed,

    /// One of the bounds doesn't decode under the sequence type
    #[error("{side} bound {value:?} is not a valid sequence member")]
    Unparseable {
        /// Which bound is faulty
        side: Side,

        /// Faulty bound, as provided
        value: Box<str>,
    },

    /// Range ends before it starts
    #[error("start {start} comes after end {end}")]
    Inverted {
        /// Start bound
        start: SequenceMember,

        /// End bound
        end: SequenceMember,
    },
}

/// Side of a sequence range
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Side {
    /// Lower bound
    Start,

    /// Upper bound
    End,
}
//
impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Start => "start",
            Self::End => "end",
        })
    }
}

/// Inclusive range of sequence members, possibly open on either side
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Serialize)]
pub struct SequenceRange {
    /// Lower bound, if any
    pub start: Option<SequenceMember>,

    /// Upper bound, if any
    pub end: Option<SequenceMember>,
}
//
impl SequenceRange {
    /// Range that includes every sequence member
    pub const UNBOUNDED: Self = Self {
        start: None,
        end: None,
    };

    /// Range with the specified bounds
    pub fn new(start: Option<SequenceMember>, end: Option<SequenceMember>) -> Self {
        Self { start, end }
    }

    /// Range from loosely specified query bounds
    ///
    /// Query callers don't know which sequence type they are dealing with, so
    /// any bound that reads as a number is applied (fractional parts are
    /// truncated) and anything else is ignored, leaving that side open.
    pub fn lenient(start: Option<&str>, end: Option<&str>) -> Self {
        Self {
            start: start.and_then(lenient_bound),
            end: end.and_then(lenient_bound),
        }
    }

    /// Truth that this range doesn't constrain anything
    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// Truth that a member lies within this range
    pub fn contains(&self, member: SequenceMember) -> bool {
        self.start.map_or(true, |start| member >= start) && self.end.map_or(true, |end| member <= end)
    }
}

/// Split a trimmed range into its start and end
///
/// With signed bounds, a leading `-` followed by a digit is the sign of the
/// start bound if another separator follows, so that `-10-5` is `[-10, 5]`
/// while `-10` still means "up to 10".
fn split_bounds(raw: &str, signed: bool) -> Option<(&str, &str)> {
    let signed_start = signed
        && raw
            .strip_prefix(SEPARATOR)
            .is_some_and(|rest| rest.starts_with(|c: char| c.is_ascii_digit()));
    let separator = if signed_start {
        raw[1..].find(SEPARATOR).map_or(0, |idx| idx + 1)
    } else {
        raw.find(SEPARATOR)?
    };
    Some((&raw[..separator], &raw[separator + 1..]))
}

/// Decode a query bound that looks like a number
fn lenient_bound(text: &str) -> Option<SequenceMember> {
    let text = text.trim();
    if let Ok(integer) = text.parse::<SequenceMember>() {
        return Some(integer);
    }
    text.parse::<f64>()
        .ok()
        .filter(|float| float.is_finite())
        .map(|float| float.trunc() as SequenceMember)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SequenceType;

    fn validate(ty: SequenceType, raw: &str) -> Result<SequenceRange, RangeError> {
        ty.validator().validate(raw)
    }

    #[test]
    fn empty_and_one_sided_ranges_are_valid() {
        for ty in SequenceType::ALL {
            assert_eq!(validate(ty, ""), Ok(SequenceRange::UNBOUNDED));
            assert_eq!(validate(ty, "   "), Ok(SequenceRange::UNBOUNDED));
            assert_eq!(validate(ty, "-"), Ok(SequenceRange::UNBOUNDED));
        }
        assert_eq!(
            validate(SequenceType::Year, "1900-"),
            Ok(SequenceRange::new(Some(1900), None))
        );
        assert_eq!(
            validate(SequenceType::Month, "-195006"),
            Ok(SequenceRange::new(None, Some(1950_06)))
        );
    }

    #[test]
    fn two_sided_ranges_must_be_ordered() {
        assert_eq!(
            validate(SequenceType::Year, "2010-2020"),
            Ok(SequenceRange::new(Some(2010), Some(2020)))
        );
        assert_eq!(
            validate(SequenceType::Year, "2020-2020"),
            Ok(SequenceRange::new(Some(2020), Some(2020)))
        );
        assert_eq!(
            validate(SequenceType::Year, "2020-2010"),
            Err(RangeError::Inverted {
                start: 2020,
                end: 2010
            })
        );
        assert_eq!(
            validate(SequenceType::Day, "20200301-20200229"),
            Err(RangeError::Inverted {
                start: 2020_03_01,
                end: 2020_02_29
            })
        );
        assert_eq!(
            validate(SequenceType::Numeric, " 5 - 17 "),
            Ok(SequenceRange::new(Some(5), Some(17)))
        );
    }

    #[test]
    fn bounds_must_use_the_type_encoding() {
        let unparseable = |side, value: &str| RangeError::Unparseable {
            side,
            value: value.into(),
        };
        assert_eq!(
            validate(SequenceType::Year, "19-2000"),
            Err(unparseable(Side::Start, "19"))
        );
        assert_eq!(
            validate(SequenceType::Month, "200001-200013"),
            Err(unparseable(Side::End, "200013"))
        );
        assert_eq!(
            validate(SequenceType::Day, "20190229-"),
            Err(unparseable(Side::Start, "20190229"))
        );
        assert_eq!(
            validate(SequenceType::Numeric, "abc-3"),
            Err(unparseable(Side::Start, "abc"))
        );
        assert_eq!(validate(SequenceType::Year, "2000"), Err(RangeError::Malformed));
        assert_eq!(
            validate(SequenceType::Numeric, "1-2-3"),
            Err(RangeError::Malformed)
        );
    }

    #[test]
    fn numeric_bounds_may_be_negative() {
        let numeric = |raw| validate(SequenceType::Numeric, raw);
        assert_eq!(numeric("-10-5"), Ok(SequenceRange::new(Some(-10), Some(5))));
        assert_eq!(numeric("-10--5"), Ok(SequenceRange::new(Some(-10), Some(-5))));
        assert_eq!(numeric(" -10 - -5 "), Ok(SequenceRange::new(Some(-10), Some(-5))));
        assert_eq!(numeric("--5"), Ok(SequenceRange::new(None, Some(-5))));
        assert_eq!(numeric("-5-"), Ok(SequenceRange::new(Some(-5), None)));
        assert_eq!(numeric("-10"), Ok(SequenceRange::new(None, Some(10))));
        assert_eq!(
            numeric("-5--10"),
            Err(RangeError::Inverted { start: -5, end: -10 })
        );
        assert_eq!(numeric("-10---5"), Err(RangeError::Malformed));

        // Dates have no sign
        assert_eq!(
            validate(SequenceType::Year, "-1900-1950"),
            Err(RangeError::Malformed)
        );
    }

    #[test]
    fn normalized_form_round_trips() {
        for (ty, raw, normalized) in [
            (SequenceType::Numeric, "-10 - -5", "-10--5"),
            (SequenceType::Numeric, "--5", "--5"),
            (SequenceType::Numeric, "-3-", "-3-"),
            (SequenceType::Year, " 1900 - 1950 ", "1900-1950"),
            (SequenceType::Month, "190001-", "190001-"),
            (SequenceType::Day, "-20001231", "-20001231"),
            (SequenceType::Year, "0042-0100", "0042-0100"),
            (SequenceType::Month, "000112-000201", "000112-000201"),
            (SequenceType::Numeric, "", ""),
        ] {
            let range = validate(ty, raw).unwrap();
            assert_eq!(ty.format_range(&range), normalized);
            assert_eq!(validate(ty, normalized), Ok(range));
        }
    }

    #[test]
    fn lenient_bounds() {
        assert_eq!(
            SequenceRange::lenient(Some("2019"), Some(" 2021 ")),
            SequenceRange::new(Some(2019), Some(2021))
        );
        assert_eq!(
            SequenceRange::lenient(Some("2019.7"), Some("abc")),
            SequenceRange::new(Some(2019), None)
        );
        assert_eq!(
            SequenceRange::lenient(Some(""), Some("NaN")),
            SequenceRange::UNBOUNDED
        );
        assert_eq!(SequenceRange::lenient(None, Some("-3")).end, Some(-3));
    }

    #[test]
    fn containment() {
        let range = SequenceRange::new(Some(10), None);
        assert!(range.contains(10));
        assert!(range.contains(i64::MAX));
        assert!(!range.contains(9));
        assert!(SequenceRange::UNBOUNDED.contains(i64::MIN));
    }
}
