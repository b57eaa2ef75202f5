use core::fmt;

use serde::{Deserialize, Serialize};

use crate::MemoryError;

/// A half-open address interval `[base, base + size)`.
///
/// Ranges are always constructed so that `base + size` fits in a `u64`; see [`Range::new`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Range {
    pub base: u64,
    pub size: u64,
}

impl Range {
    /// Builds a range, rejecting intervals whose end does not fit in a `u64`.
    pub fn new(base: u64, size: u64) -> Result<Self, MemoryError> {
        base.checked_add(size)
            .ok_or(MemoryError::AddressOverflow { base, size })?;
        Ok(Self { base, size })
    }

    /// The range from `base` up to the highest representable address. Being half-open, it
    /// never includes the byte at `u64::MAX`.
    pub const fn until_end(base: u64) -> Self {
        Self {
            base,
            size: u64::MAX - base,
        }
    }

    pub const fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// One past the last address in the range.
    pub const fn end(&self) -> u64 {
        self.base + self.size
    }

    /// The last address in the range, or `None` when the range is empty.
    pub const fn last(&self) -> Option<u64> {
        if self.size == 0 {
            None
        } else {
            Some(self.base + self.size - 1)
        }
    }

    pub const fn contains(&self, addr: u64) -> bool {
        addr >= self.base && addr < self.end()
    }

    pub const fn overlaps(&self, other: &Range) -> bool {
        self.base < other.end() && other.base < self.end()
    }

    /// The overlapping part of two ranges. Disjoint ranges intersect to an empty range at
    /// whichever base is larger.
    pub fn intersect(&self, other: &Range) -> Range {
        let base = self.base.max(other.base);
        let end = self.end().min(other.end());
        Range {
            base,
            size: end.saturating_sub(base),
        }
    }

    /// Returns `sub` (relative to this range) as an absolute range, checking it stays inside.
    pub fn window(&self, sub: Range) -> Result<Range, MemoryError> {
        let sub = Range::new(sub.base, sub.size)?;
        if sub.end() > self.size {
            return Err(MemoryError::OutOfBounds {
                range: sub,
                size: self.size,
            });
        }
        Ok(Range {
            base: self.base + sub.base,
            size: sub.size,
        })
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[0x{:x}, 0x{:x})", self.base, self.end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_overflowing_end() {
        assert!(Range::new(u64::MAX, 1).is_err());
        assert_eq!(Range::new(u64::MAX, 0).unwrap().end(), u64::MAX);
    }

    #[test]
    fn last_and_intersect() {
        let r = Range::new(10, 4).unwrap();
        assert_eq!(r.last(), Some(13));
        assert_eq!(Range::default().last(), None);

        let o = Range::new(12, 10).unwrap();
        assert_eq!(r.intersect(&o), Range { base: 12, size: 2 });
        assert!(r.intersect(&Range { base: 100, size: 1 }).is_empty());
        assert!(!r.overlaps(&Range { base: 14, size: 1 }));
    }

    #[test]
    fn until_end_covers_top_of_address_space() {
        let r = Range::until_end(0x1000);
        assert_eq!(r.end(), u64::MAX);
        assert!(r.contains(u64::MAX - 1));
        assert!(!r.contains(u64::MAX));
    }
}
