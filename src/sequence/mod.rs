//! Supported sequence types
//!
//! A sequence type decides how a corpus' sequence field is bucketed along the
//! x axis of frequency graphs. The set of types is closed and known at compile
//! time: each [`SequenceType`] comes with a range validator, a gap filler and
//! a graph axis configuration.

pub mod fill;
pub mod range;

pub use self::{
    fill::SequenceFiller,
    range::{CorpusValidator, RangeError, SequenceRange, Side},
};
use self::range::SEPARATOR;
use crate::{Error, Result, SequenceMember};
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::{fmt, str::FromStr};

/// Label of the placeholder entry at the top of [`for_select()`]
pub const UNSELECTED_LABEL: &str = "Select Below";

/// Truth that a sequence type key is registered
pub fn exists(key: &str) -> bool {
    SequenceType::from_str(key).is_ok()
}

/// Human-readable label of a sequence type
pub fn label(key: &str) -> Result<&'static str> {
    Ok(key.parse::<SequenceType>()?.label())
}

/// Graph axis configuration of a sequence type
pub fn graph_config(key: &str) -> Result<GraphConfig> {
    Ok(key.parse::<SequenceType>()?.graph_config())
}

/// Range validator of a sequence type, if the key is registered
pub fn validator(key: &str) -> Option<&'static dyn CorpusValidator> {
    key.parse::<SequenceType>().ok().map(SequenceType::validator)
}

/// Gap filler of a sequence type, if the key is registered
pub fn filler(key: &str) -> Option<&'static dyn SequenceFiller> {
    key.parse::<SequenceType>().ok().map(SequenceType::filler)
}

/// Sequence types as (key, label) pairs for a selection widget
///
/// Starts with a placeholder entry with an empty key, then lists every
/// registered sequence type in registration order.
pub fn for_select() -> Vec<(&'static str, &'static str)> {
    std::iter::once(("", UNSELECTED_LABEL))
        .chain(SequenceType::ALL.iter().map(|ty| (ty.key(), ty.label())))
        .collect()
}

/// Bucketing strategy of a corpus
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SequenceType {
    /// Dates bucketed by year, encoded as YYYY
    Year,

    /// Dates bucketed by month, encoded as YYYYMM
    Month,

    /// Dates bucketed by day, encoded as YYYYMMDD
    Day,

    /// Arbitrary integers
    Numeric,
}
//
impl SequenceType {
    /// Every registered sequence type, in registration order
    pub const ALL: [SequenceType; 4] = [Self::Year, Self::Month, Self::Day, Self::Numeric];

    /// Registry key, as stored in the corpus table
    pub fn key(self) -> &'static str {
        self.encoding().key()
    }

    /// Human-readable label
    pub fn label(self) -> &'static str {
        match self {
            Self::Year => "Date by year",
            Self::Month => "Date by month",
            Self::Day => "Date by day",
            Self::Numeric => "Numerical",
        }
    }

    /// Graph axis configuration for the charting layer
    pub fn graph_config(self) -> GraphConfig {
        let timeseries = |data_x_format, axis_x_tick_format| GraphConfig {
            data_x_format: Some(data_x_format),
            axis_x_type: AxisType::Timeseries,
            axis_x_tick_count: Some(8),
            axis_x_tick_format: Some(axis_x_tick_format),
        };
        match self {
            Self::Year => timeseries("%Y", "%Y"),
            Self::Month => timeseries("%Y%m", "%Y-%m"),
            Self::Day => timeseries("%Y%m%d", "%Y-%m-%d"),
            Self::Numeric => GraphConfig {
                data_x_format: None,
                axis_x_type: AxisType::Category,
                axis_x_tick_count: None,
                axis_x_tick_format: None,
            },
        }
    }

    /// Range validator
    pub fn validator(self) -> &'static dyn CorpusValidator {
        match self {
            Self::Year => &YearEncoding,
            Self::Month => &MonthEncoding,
            Self::Day => &DayEncoding,
            Self::Numeric => &NumericEncoding,
        }
    }

    /// Gap filler
    pub fn filler(self) -> &'static dyn SequenceFiller {
        match self {
            Self::Year => &YearEncoding,
            Self::Month => &MonthEncoding,
            Self::Day => &DayEncoding,
            Self::Numeric => &NumericEncoding,
        }
    }

    /// Textual form of a range, as accepted by [`validator()`](Self::validator)
    ///
    /// Unbounded ranges are rendered as an empty string.
    pub fn format_range(self, range: &SequenceRange) -> String {
        if range.is_unbounded() {
            return String::new();
        }
        let encoding = self.encoding();
        let bound = |member: Option<SequenceMember>| {
            member.map(|member| encoding.format(member)).unwrap_or_default()
        };
        format!("{}{SEPARATOR}{}", bound(range.start), bound(range.end))
    }

    /// Integer encoding of sequence members
    pub fn encoding(self) -> &'static dyn MemberEncoding {
        match self {
            Self::Year => &YearEncoding,
            Self::Month => &MonthEncoding,
            Self::Day => &DayEncoding,
            Self::Numeric => &NumericEncoding,
        }
    }
}
//
impl FromStr for SequenceType {
    type Err = Error;

    fn from_str(key: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|ty| ty.key() == key)
            .ok_or_else(|| Error::UnknownSequenceType(key.into()))
    }
}
//
impl fmt::Display for SequenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// What a charting layer needs to know to draw a sequence axis
///
/// Field names follow the conventions of C3-style charting libraries.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphConfig {
    /// strftime-style format of the x values, if they are dates
    pub data_x_format: Option<&'static str>,

    /// Kind of x axis
    pub axis_x_type: AxisType,

    /// Number of ticks on the x axis, if it should be constrained
    pub axis_x_tick_count: Option<u32>,

    /// strftime-style format of the x axis ticks
    pub axis_x_tick_format: Option<&'static str>,
}

/// Kind of x axis
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AxisType {
    /// Continuous time axis
    Timeseries,

    /// Discrete axis with one tick per value
    Category,
}

/// How sequence members of one sequence type are encoded as integers
///
/// Validators and fillers are derived from this for every sequence type.
pub trait MemberEncoding: Sync {
    /// Registry key of the sequence type
    fn key(&self) -> &'static str;

    /// Decode a textual range bound, which uses the member encoding
    fn parse(&self, text: &str) -> Option<SequenceMember>;

    /// Truth that an integer is a valid member
    fn contains(&self, member: SequenceMember) -> bool;

    /// Next member in natural order, assuming that `member` is valid
    fn next(&self, member: SequenceMember) -> Option<SequenceMember>;

    /// Truth that range bounds may carry a leading `-` sign
    fn signed(&self) -> bool {
        false
    }

    /// Encode a member as a range bound, so that [`parse()`](Self::parse)
    /// accepts it back
    fn format(&self, member: SequenceMember) -> String {
        member.to_string()
    }
}

/// Decode a fixed-width string of ASCII digits
fn parse_digits(text: &str, width: usize) -> Option<SequenceMember> {
    (text.len() == width && text.bytes().all(|b| b.is_ascii_digit()))
        .then(|| text.parse().ok())
        .flatten()
}

/// Dates bucketed by year
struct YearEncoding;
//
impl MemberEncoding for YearEncoding {
    fn key(&self) -> &'static str {
        "year"
    }

    fn parse(&self, text: &str) -> Option<SequenceMember> {
        parse_digits(text, 4)
    }

    fn contains(&self, member: SequenceMember) -> bool {
        (0..=9999).contains(&member)
    }

    fn next(&self, member: SequenceMember) -> Option<SequenceMember> {
        Some(member + 1).filter(|&next| self.contains(next))
    }

    fn format(&self, member: SequenceMember) -> String {
        format!("{member:04}")
    }
}

/// Dates bucketed by month
struct MonthEncoding;
//
impl MemberEncoding for MonthEncoding {
    fn key(&self) -> &'static str {
        "month"
    }

    fn parse(&self, text: &str) -> Option<SequenceMember> {
        parse_digits(text, 6).filter(|&member| self.contains(member))
    }

    fn contains(&self, member: SequenceMember) -> bool {
        (0..=9999_12).contains(&member) && (1..=12).contains(&(member % 100))
    }

    fn next(&self, member: SequenceMember) -> Option<SequenceMember> {
        let (year, month) = (member / 100, member % 100);
        let next = if month == 12 {
            (year + 1) * 100 + 1
        } else {
            member + 1
        };
        Some(next).filter(|&next| self.contains(next))
    }

    fn format(&self, member: SequenceMember) -> String {
        format!("{member:06}")
    }
}

/// Dates bucketed by day
struct DayEncoding;
//
impl DayEncoding {
    /// Decode a YYYYMMDD member into a calendar date
    fn date(member: SequenceMember) -> Option<NaiveDate> {
        if !(0..=9999_12_31).contains(&member) {
            return None;
        }
        let year = i32::try_from(member / 10_000).ok()?;
        let month = u32::try_from(member / 100 % 100).ok()?;
        let day = u32::try_from(member % 100).ok()?;
        NaiveDate::from_ymd_opt(year, month, day)
    }
}
//
impl MemberEncoding for DayEncoding {
    fn key(&self) -> &'static str {
        "day"
    }

    fn parse(&self, text: &str) -> Option<SequenceMember> {
        parse_digits(text, 8).filter(|&member| self.contains(member))
    }

    fn contains(&self, member: SequenceMember) -> bool {
        Self::date(member).is_some()
    }

    fn next(&self, member: SequenceMember) -> Option<SequenceMember> {
        let next = Self::date(member)?.succ_opt()?;
        let member = SequenceMember::from(next.year()) * 10_000
            + SequenceMember::from(next.month()) * 100
            + SequenceMember::from(next.day());
        Some(member).filter(|&member| self.contains(member))
    }

    fn format(&self, member: SequenceMember) -> String {
        format!("{member:08}")
    }
}

/// Arbitrary integers
///
/// Range bounds may be negative, e.g. `-10--5`.
struct NumericEncoding;
//
impl MemberEncoding for NumericEncoding {
    fn key(&self) -> &'static str {
        "numeric"
    }

    fn parse(&self, text: &str) -> Option<SequenceMember> {
        let digits = text.strip_prefix('-').unwrap_or(text);
        (!digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
            .then(|| text.parse().ok())
            .flatten()
    }

    fn signed(&self) -> bool {
        true
    }

    fn contains(&self, _member: SequenceMember) -> bool {
        true
    }

    fn next(&self, member: SequenceMember) -> Option<SequenceMember> {
        member.checked_add(1)
    }
}
