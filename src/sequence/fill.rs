//! Densification of sparse sequence axes
//!
//! Frequency data only exists for buckets where an ngram was observed. If a
//! chart linearly interpolated between those, it would hide runs of zeroes, so
//! we generate every bucket between the extremes and let the missing ones be
//! zero-backed downstream.

use super::{MemberEncoding, SequenceRange};
use crate::{Error, Result, SequenceMember};
use std::collections::BTreeSet;

/// Produces the complete, ordered sequence axis from sparse observations
pub trait SequenceFiller: Sync {
    /// Every member between the smallest and largest of the observed members
    /// and configured range bounds, inclusive, in natural order
    ///
    /// Calendar types step by calendar unit, numeric types by 1. An empty
    /// result means that there was nothing to fill. Fails if any input is not
    /// a valid member, or if the output would exceed `max_len` members.
    fn fill(
        &self,
        observed: &BTreeSet<SequenceMember>,
        range: &SequenceRange,
        max_len: usize,
    ) -> Result<Vec<SequenceMember>>;
}
//
impl<E: MemberEncoding> SequenceFiller for E {
    fn fill(
        &self,
        observed: &BTreeSet<SequenceMember>,
        range: &SequenceRange,
        max_len: usize,
    ) -> Result<Vec<SequenceMember>> {
        // Every input must decode under this sequence type
        let inputs = || observed.iter().copied().chain(range.start).chain(range.end);
        if let Some(member) = inputs().find(|&member| !self.contains(member)) {
            return Err(Error::InvalidSequenceMember {
                sequence_type: self.key(),
                member,
            });
        }

        // Determine the extent of the axis
        let (Some(first), Some(last)) = (inputs().min(), inputs().max()) else {
            return Ok(Vec::new());
        };

        // Walk the axis in natural order
        let mut members = Vec::new();
        let mut current = Some(first);
        while let Some(member) = current.filter(|&member| member <= last) {
            if members.len() >= max_len {
                return Err(Error::SequenceTooLong { max: max_len });
            }
            members.push(member);
            current = self.next(member);
        }
        log::trace!(
            "Filled {} {} sequence members from {} observations",
            members.len(),
            self.key(),
            observed.len()
        );
        Ok(members)
    }
}
