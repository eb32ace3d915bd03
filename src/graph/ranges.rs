//! Ordered directory of live allocations.
//!
//! Ranges are kept sorted by `begin` and pairwise disjoint, which
//! makes point-to-range lookup a binary search.

/// Byte interval occupied by one managed allocation.
///
/// Storage is half-open, `[begin, end)`; the containment test used by
/// lookup closes the upper bound (see [`MemoryRange::admits`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MemoryRange {
    /// First byte of the allocation.
    pub(crate) begin: usize,
    /// One past the last byte of the allocation.
    pub(crate) end: usize,
}

impl MemoryRange {
    /// Containment test used by point lookup.
    ///
    /// The upper bound is closed: a handle may legally store an
    /// address one past the end of an allocation (an end sentinel for
    /// size-delimited iteration), and such an address must still be
    /// attributable to that allocation.
    #[inline]
    fn admits(&self, addr: usize) -> bool {
        self.begin <= addr && addr <= self.end
    }
}

/// Sorted, pairwise-disjoint set of allocation ranges.
pub(crate) struct RangeSet {
    ranges: Vec<MemoryRange>,
}

impl RangeSet {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            ranges: Vec::with_capacity(capacity),
        }
    }

    /// Insert the range `[base, base + size)`.
    ///
    /// Precondition: no registered range overlaps it.
    pub(crate) fn add(&mut self, base: usize, size: usize) {
        let end = base + size;
        let at = self.ranges.partition_point(|r| r.begin <= base);
        debug_assert!(
            at == 0 || self.ranges[at - 1].end <= base,
            "range {base:#x}..{end:#x} overlaps a registered range"
        );
        debug_assert!(
            at == self.ranges.len() || end <= self.ranges[at].begin,
            "range {base:#x}..{end:#x} overlaps a registered range"
        );
        self.ranges.insert(at, MemoryRange { begin: base, end });
    }

    /// Remove the range containing `addr`.
    ///
    /// Precondition: such a range exists. A miss is a programmer
    /// error; it asserts in debug builds and is ignored in release.
    pub(crate) fn remove(&mut self, addr: usize) {
        match self.find(addr) {
            Some(index) => {
                self.ranges.remove(index);
            }
            None => debug_assert!(false, "no registered range contains {addr:#x}"),
        }
    }

    /// Index of the unique range containing `addr`, or `None`.
    ///
    /// Containment is closed on both ends. O(log N).
    pub(crate) fn find(&self, addr: usize) -> Option<usize> {
        let (first, last) = match (self.ranges.first(), self.ranges.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return None,
        };
        if addr < first.begin || addr > last.end {
            return None;
        }

        // First range with begin > addr, then step back one.
        let after = self.ranges.partition_point(|r| r.begin <= addr);
        let index = after.checked_sub(1)?;
        self.ranges[index].admits(addr).then_some(index)
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.ranges.len()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &MemoryRange> {
        self.ranges.iter()
    }

    /// Sum of the sizes of all registered ranges.
    pub(crate) fn total_bytes(&self) -> usize {
        self.ranges.iter().map(|r| r.end - r.begin).sum()
    }
}
