//! Half-open index ranges and their complement.
//!
//! Every range here is `[start, end)`. Gaps produced by [`RangeSet::invert`]
//! follow the same convention, so a range set and its inverse never share an
//! index and together tile the universe (up to a dropped tail fragment).

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub start: u64,
    pub end: u64,
}

impl Range {
    pub const fn new(start: u64, end: u64) -> Self {
        Range { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, position: u64) -> bool {
        self.start <= position && position < self.end
    }
}

/// Ascending, pairwise non-overlapping ranges. Touching ranges (`a.end == b.start`)
/// are allowed; nothing is merged or reordered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeSet {
    ranges: Vec<Range>,
}

impl RangeSet {
    pub fn new(ranges: Vec<Range>) -> Result<Self> {
        let mut previous_end = 0;
        for (index, range) in ranges.iter().enumerate() {
            if range.start > range.end {
                return Err(Error::InvalidRange {
                    index,
                    reason: format!("start {} is after end {}", range.start, range.end),
                });
            }
            if index > 0 && range.start < previous_end {
                return Err(Error::InvalidRange {
                    index,
                    reason: format!(
                        "[{}, {}) overlaps or precedes the previous range ending at {}",
                        range.start, range.end, previous_end
                    ),
                });
            }
            previous_end = range.end;
        }
        Ok(RangeSet { ranges })
    }

    pub fn from_pairs(pairs: &[[u64; 2]]) -> Result<Self> {
        Self::new(pairs.iter().map(|&[s, e]| Range::new(s, e)).collect())
    }

    pub fn ranges(&self) -> &[Range] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Number of positions covered.
    pub fn span(&self) -> u64 {
        self.ranges.iter().map(Range::len).sum()
    }

    pub fn max_end(&self) -> u64 {
        self.ranges.last().map_or(0, |r| r.end)
    }

    pub fn contains(&self, position: u64) -> bool {
        self.ranges.iter().any(|r| r.contains(position))
    }

    /// Positions in range order, then ascending within each range. The iterator
    /// can be cloned to restart from the same point.
    pub fn positions(&self) -> Positions<'_> {
        Positions {
            ranges: self.ranges.iter(),
            current: 0..0,
        }
    }

    /// Cuts every range at `len`, dropping ranges that start past it.
    pub fn clamp(&self, len: u64) -> RangeSet {
        let ranges = self
            .ranges
            .iter()
            .filter(|r| r.start < len)
            .map(|r| Range::new(r.start, r.end.min(len)))
            .collect();
        RangeSet { ranges }
    }

    /// Complement of this set within `[0, total_length)`.
    ///
    /// Leading and inner gaps are always kept. The trailing gap after the last
    /// range is dropped when it is shorter than `min_gap`. An empty set inverts
    /// to the whole universe regardless of `min_gap`.
    pub fn invert(&self, total_length: u64, min_gap: u64) -> RangeSet {
        if self.ranges.is_empty() {
            let ranges = if total_length > 0 {
                vec![Range::new(0, total_length)]
            } else {
                Vec::new()
            };
            return RangeSet { ranges };
        }

        let mut gaps = Vec::new();
        let mut cursor = 0;
        for range in &self.ranges {
            let stop = range.start.min(total_length);
            if cursor < stop {
                gaps.push(Range::new(cursor, stop));
            }
            cursor = cursor.max(range.end);
        }

        if total_length > cursor {
            let tail = Range::new(cursor, total_length);
            if tail.len() >= min_gap {
                gaps.push(tail);
            } else {
                log::debug!(
                    "dropping trailing fragment [{}, {}) shorter than {}",
                    tail.start,
                    tail.end,
                    min_gap
                );
            }
        }
        RangeSet { ranges: gaps }
    }
}

#[derive(Debug, Clone)]
pub struct Positions<'a> {
    ranges: std::slice::Iter<'a, Range>,
    current: std::ops::Range<u64>,
}

impl Iterator for Positions<'_> {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        loop {
            if let Some(position) = self.current.next() {
                return Some(position);
            }
            let range = self.ranges.next()?;
            self.current = range.start..range.end;
        }
    }
}

/// Builds a range set from configured `[start, end]` pairs.
///
/// With a `rate`, each bound is multiplied by it and truncated toward zero, which
/// can lose up to one position per boundary. Without one, bounds must already be
/// whole, non-negative indices.
pub fn scale(pairs: &[[f64; 2]], rate: Option<f64>) -> Result<RangeSet> {
    if let Some(rate) = rate {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(Error::Config(format!("rate must be positive, got {rate}")));
        }
    }
    let mut ranges = Vec::with_capacity(pairs.len());
    for (index, &[start, end]) in pairs.iter().enumerate() {
        let bound = |value: f64| -> Result<u64> {
            let scaled = match rate {
                Some(rate) => (value * rate).trunc(),
                None if value.fract() != 0.0 => {
                    return Err(Error::InvalidRange {
                        index,
                        reason: format!("{value} is not a whole index and no rate is set"),
                    })
                }
                None => value,
            };
            if !scaled.is_finite() || scaled < 0.0 {
                return Err(Error::InvalidRange {
                    index,
                    reason: format!("{value} is not a valid non-negative bound"),
                });
            }
            Ok(scaled as u64)
        };
        ranges.push(Range::new(bound(start)?, bound(end)?));
    }
    RangeSet::new(ranges)
}
