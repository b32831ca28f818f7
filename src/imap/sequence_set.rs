use std::fmt::{Display, Formatter, Result};

use crate::session::Uid;

/// Most uids sent in a single command.
pub const CHUNK_SIZE: usize = 1000;

#[derive(Debug, PartialEq)]
struct SequenceRange {
    start: Uid,
    end: Uid,
}

impl Display for SequenceRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}:{}", self.start, self.end)
        }
    }
}

/// Uids compressed into ranges, like `1:3,7`.
#[derive(Debug, PartialEq)]
pub struct SequenceSet {
    ranges: Vec<SequenceRange>,
}

impl SequenceSet {
    /// Splits `uids` into sets of at most [`CHUNK_SIZE`] distinct uids each.
    pub fn chunked(uids: &[Uid]) -> Vec<Self> {
        let mut sorted = uids.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        sorted.chunks(CHUNK_SIZE).map(Self::from_sorted).collect()
    }

    fn from_sorted(uids: &[Uid]) -> Self {
        let mut ranges: Vec<SequenceRange> = Vec::new();
        for &uid in uids {
            match ranges.last_mut() {
                Some(range) if range.end.next() == Some(uid) => range.end = uid,
                _ => ranges.push(SequenceRange {
                    start: uid,
                    end: uid,
                }),
            }
        }
        Self { ranges }
    }
}

impl Display for SequenceSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        let mut ranges = self.ranges.iter();
        if let Some(first) = ranges.next() {
            write!(f, "{first}")?;
        }
        for range in ranges {
            write!(f, ",{range}")?;
        }
        Ok(())
    }
}
