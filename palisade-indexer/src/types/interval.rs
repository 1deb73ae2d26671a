//! Interval algebra over inclusive block ranges.
//!
//! The sync scheduler reasons about block coverage as sets of inclusive
//! `[lo, hi]` ranges. [`IntervalSet`] keeps those ranges in canonical form:
//! sorted, pairwise-disjoint, and non-touching (two ranges that touch or
//! overlap are coalesced into one). Every operation preserves that form.
//!
//! All operations are total; they never fail. The empty set is valid input
//! and output everywhere.

use std::fmt;

// ═══════════════════════════════════════════════════════════════════════════════
// INTERVAL
// ═══════════════════════════════════════════════════════════════════════════════

/// An inclusive block range `[lo, hi]`.
///
/// Invariant: `lo <= hi`. A single block `n` is `[n, n]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Interval {
    /// First block of the range (inclusive).
    pub lo: u64,
    /// Last block of the range (inclusive).
    pub hi: u64,
}

impl Interval {
    /// Create a new interval.
    ///
    /// Callers must uphold `lo <= hi`; this is checked in debug builds.
    #[must_use]
    pub const fn new(lo: u64, hi: u64) -> Self {
        debug_assert!(lo <= hi, "interval lo must not exceed hi");
        Self { lo, hi }
    }

    /// A single-block interval `[n, n]`.
    #[must_use]
    pub const fn point(n: u64) -> Self {
        Self { lo: n, hi: n }
    }

    /// Number of blocks covered, `hi - lo + 1`.
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.hi - self.lo + 1
    }

    /// Whether `n` lies inside the range.
    #[must_use]
    pub const fn contains(&self, n: u64) -> bool {
        self.lo <= n && n <= self.hi
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.lo, self.hi)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// INTERVAL SET
// ═══════════════════════════════════════════════════════════════════════════════

/// A canonical union of inclusive block ranges.
///
/// Canonical form: ranges are sorted ascending, pairwise-disjoint, and
/// non-touching (`a.hi + 1 < b.lo` for consecutive `a`, `b`). Constructors
/// and set operations all produce canonical sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntervalSet(Vec<Interval>);

impl IntervalSet {
    /// The empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// A set covering a single range.
    #[must_use]
    pub fn of(lo: u64, hi: u64) -> Self {
        Self(vec![Interval::new(lo, hi)])
    }

    /// Canonicalize an arbitrary collection of intervals.
    ///
    /// Sorts the input and coalesces any ranges that touch or overlap.
    /// Used when loading persisted interval rows, which arrive unordered.
    #[must_use]
    pub fn from_unsorted(mut intervals: Vec<Interval>) -> Self {
        intervals.sort_unstable();

        let mut merged: Vec<Interval> = Vec::with_capacity(intervals.len());
        for iv in intervals {
            match merged.last_mut() {
                // Touching counts as mergeable: [0,2] and [3,5] become [0,5].
                Some(last) if last.hi.saturating_add(1) >= iv.lo => {
                    last.hi = last.hi.max(iv.hi);
                }
                _ => merged.push(iv),
            }
        }
        Self(merged)
    }

    /// The ranges in canonical order.
    #[must_use]
    pub fn intervals(&self) -> &[Interval] {
        &self.0
    }

    /// Whether the set covers no blocks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Smallest covered block, if any.
    #[must_use]
    pub fn min(&self) -> Option<u64> {
        self.0.first().map(|iv| iv.lo)
    }

    /// Largest covered block, if any.
    #[must_use]
    pub fn max(&self) -> Option<u64> {
        self.0.last().map(|iv| iv.hi)
    }

    /// Whether `n` is covered by any range.
    #[must_use]
    pub fn contains(&self, n: u64) -> bool {
        self.0
            .binary_search_by(|iv| {
                if iv.hi < n {
                    std::cmp::Ordering::Less
                } else if iv.lo > n {
                    std::cmp::Ordering::Greater
                } else {
                    std::cmp::Ordering::Equal
                }
            })
            .is_ok()
    }

    /// Total number of blocks covered.
    #[must_use]
    pub fn sum(&self) -> u64 {
        self.0.iter().map(Interval::len).sum()
    }

    /// Set union, coalescing touching ranges.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        let mut all = Vec::with_capacity(self.0.len() + other.0.len());
        all.extend_from_slice(&self.0);
        all.extend_from_slice(&other.0);
        Self::from_unsorted(all)
    }

    /// Pointwise set difference `self − other`.
    #[must_use]
    pub fn difference(&self, other: &Self) -> Self {
        let mut out = Vec::new();

        for iv in &self.0 {
            let mut cursor = iv.lo;
            let mut exhausted = false;

            for cut in &other.0 {
                if cut.hi < cursor {
                    continue;
                }
                if cut.lo > iv.hi {
                    break;
                }
                if cut.lo > cursor {
                    out.push(Interval::new(cursor, cut.lo - 1));
                }
                if cut.hi >= iv.hi {
                    exhausted = true;
                    break;
                }
                cursor = cut.hi + 1;
            }

            if !exhausted && cursor <= iv.hi {
                out.push(Interval::new(cursor, iv.hi));
            }
        }

        // Pieces are produced in order and already disjoint.
        Self(out)
    }

    /// Pointwise intersection.
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Self {
        let mut out = Vec::new();
        let (mut i, mut j) = (0, 0);

        while i < self.0.len() && j < other.0.len() {
            let a = self.0[i];
            let b = other.0[j];
            let lo = a.lo.max(b.lo);
            let hi = a.hi.min(b.hi);
            if lo <= hi {
                out.push(Interval::new(lo, hi));
            }
            if a.hi < b.hi {
                i += 1;
            } else {
                j += 1;
            }
        }

        Self(out)
    }

    /// Split each range into consecutive pieces of at most `max` blocks.
    ///
    /// Original ordering is preserved. `max` must be non-zero; that is
    /// enforced at settings validation, and checked here in debug builds.
    #[must_use]
    pub fn chunks(&self, max: u64) -> Vec<Interval> {
        debug_assert!(max > 0, "chunk size must be non-zero");
        let max = max.max(1);

        let mut out = Vec::new();
        for iv in &self.0 {
            let mut lo = iv.lo;
            while lo <= iv.hi {
                let hi = iv.hi.min(lo.saturating_add(max - 1));
                out.push(Interval::new(lo, hi));
                if hi == u64::MAX {
                    break;
                }
                lo = hi + 1;
            }
        }
        out
    }
}

impl From<Vec<Interval>> for IntervalSet {
    fn from(intervals: Vec<Interval>) -> Self {
        Self::from_unsorted(intervals)
    }
}

impl FromIterator<Interval> for IntervalSet {
    fn from_iter<T: IntoIterator<Item = Interval>>(iter: T) -> Self {
        Self::from_unsorted(iter.into_iter().collect())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn set(ranges: &[(u64, u64)]) -> IntervalSet {
        ranges
            .iter()
            .map(|&(lo, hi)| Interval::new(lo, hi))
            .collect()
    }

    #[test]
    fn from_unsorted_canonicalizes() {
        let s = IntervalSet::from_unsorted(vec![
            Interval::new(8, 10),
            Interval::new(0, 2),
            Interval::new(3, 5),
        ]);
        // [0,2] touches [3,5]
        assert_eq!(s.intervals(), &[Interval::new(0, 5), Interval::new(8, 10)]);
    }

    #[test]
    fn union_merges_touching() {
        let a = set(&[(0, 4), (10, 12)]);
        let b = set(&[(5, 9)]);
        assert_eq!(a.union(&b), set(&[(0, 12)]));
    }

    #[test]
    fn union_merges_overlapping() {
        let a = set(&[(0, 10)]);
        let b = set(&[(5, 20), (30, 40)]);
        assert_eq!(a.union(&b), set(&[(0, 20), (30, 40)]));
    }

    #[test]
    fn difference_splits_ranges() {
        let a = set(&[(0, 1000)]);
        let b = set(&[(0, 400), (600, 800)]);
        assert_eq!(a.difference(&b), set(&[(401, 599), (801, 1000)]));
    }

    #[test]
    fn difference_with_empty_is_identity() {
        let a = set(&[(3, 7)]);
        assert_eq!(a.difference(&IntervalSet::new()), a);
        assert_eq!(IntervalSet::new().difference(&a), IntervalSet::new());
    }

    #[test]
    fn difference_removes_everything() {
        let a = set(&[(5, 10)]);
        let b = set(&[(0, 100)]);
        assert!(a.difference(&b).is_empty());
    }

    #[test]
    fn intersection_basic() {
        let a = set(&[(0, 10), (20, 30)]);
        let b = set(&[(5, 25)]);
        assert_eq!(a.intersection(&b), set(&[(5, 10), (20, 25)]));
    }

    #[test]
    fn intersection_disjoint_is_empty() {
        let a = set(&[(0, 4)]);
        let b = set(&[(6, 9)]);
        assert!(a.intersection(&b).is_empty());
    }

    #[test]
    fn sum_counts_inclusive() {
        assert_eq!(set(&[(0, 0)]).sum(), 1);
        assert_eq!(set(&[(0, 9), (20, 29)]).sum(), 20);
        assert_eq!(IntervalSet::new().sum(), 0);
    }

    #[test]
    fn chunks_splits_evenly() {
        let a = set(&[(0, 9)]);
        assert_eq!(
            a.chunks(4),
            vec![
                Interval::new(0, 3),
                Interval::new(4, 7),
                Interval::new(8, 9)
            ]
        );
    }

    #[test]
    fn chunks_preserves_ordering_across_ranges() {
        let a = set(&[(0, 1), (10, 14)]);
        assert_eq!(
            a.chunks(3),
            vec![
                Interval::new(0, 1),
                Interval::new(10, 12),
                Interval::new(13, 14)
            ]
        );
    }

    #[test]
    fn contains_uses_binary_search() {
        let a = set(&[(0, 4), (10, 14), (100, 200)]);
        assert!(a.contains(0));
        assert!(a.contains(12));
        assert!(a.contains(200));
        assert!(!a.contains(5));
        assert!(!a.contains(99));
        assert!(!a.contains(201));
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // PROPERTY TESTS
    // ═══════════════════════════════════════════════════════════════════════════

    fn arb_interval_set() -> impl Strategy<Value = IntervalSet> {
        prop::collection::vec((0u64..5_000, 0u64..50), 0..12).prop_map(|pairs| {
            pairs
                .into_iter()
                .map(|(lo, len)| Interval::new(lo, lo + len))
                .collect()
        })
    }

    fn is_canonical(s: &IntervalSet) -> bool {
        s.intervals()
            .windows(2)
            .all(|w| w[0].hi + 1 < w[1].lo && w[0].lo <= w[0].hi)
            && s.intervals().iter().all(|iv| iv.lo <= iv.hi)
    }

    proptest! {
        #[test]
        fn union_is_canonical(a in arb_interval_set(), b in arb_interval_set()) {
            prop_assert!(is_canonical(&a.union(&b)));
        }

        #[test]
        fn difference_is_canonical(a in arb_interval_set(), b in arb_interval_set()) {
            prop_assert!(is_canonical(&a.difference(&b)));
        }

        #[test]
        fn intersection_is_canonical(a in arb_interval_set(), b in arb_interval_set()) {
            prop_assert!(is_canonical(&a.intersection(&b)));
        }

        #[test]
        fn difference_then_union_restores(a in arb_interval_set(), b in arb_interval_set()) {
            // (a − b) ∪ (a ∩ b) == a
            let rebuilt = a.difference(&b).union(&a.intersection(&b));
            prop_assert_eq!(rebuilt, a);
        }

        #[test]
        fn sums_are_consistent(a in arb_interval_set(), b in arb_interval_set()) {
            // |a| + |b| == |a ∪ b| + |a ∩ b|
            prop_assert_eq!(
                a.sum() + b.sum(),
                a.union(&b).sum() + a.intersection(&b).sum()
            );
        }

        #[test]
        fn chunks_cover_exactly(a in arb_interval_set(), max in 1u64..64) {
            let chunks = a.chunks(max);
            prop_assert!(chunks.iter().all(|c| c.len() <= max));
            let rebuilt: IntervalSet = chunks.into_iter().collect();
            prop_assert_eq!(rebuilt, a);
        }
    }
}
