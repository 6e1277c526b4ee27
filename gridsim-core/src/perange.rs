//! Ordered disjoint integer ranges over processor ids (PEs).
//!
//! A [PeRangeList] is the currency every availability-profile and
//! scheduling-policy operation trades in: a sorted, non-overlapping,
//! non-touching sequence of [PeRange]s. All combinators here allocate a
//! fresh list rather than mutate their operands.
use std::fmt;

use itertools::Itertools;

/// Identifier of a single processing element.
pub type PeId = u32;

/// A closed interval `[from, to]` of processing element ids, optionally
/// tagged with the id of the partition that currently owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeRange {
    pub from: PeId,
    pub to: PeId,
    pub queue_id: Option<u32>,
}

impl PeRange {
    /// Creates a new range. Panics if `from > to`, mirroring the
    /// invariant that a [PeRange] is never empty or inverted.
    pub fn new(from: PeId, to: PeId) -> Self {
        assert!(from <= to, "PeRange::new: from ({from}) > to ({to})");
        Self {
            from,
            to,
            queue_id: None,
        }
    }

    pub fn tagged(from: PeId, to: PeId, queue_id: u32) -> Self {
        Self {
            from,
            to,
            queue_id: Some(queue_id),
        }
    }

    pub fn count(&self) -> u32 {
        self.to - self.from + 1
    }

    fn touches_or_overlaps(&self, other: &PeRange) -> bool {
        self.from <= other.to.saturating_add(1) && other.from <= self.to.saturating_add(1)
    }

    fn overlaps(&self, other: &PeRange) -> bool {
        self.from <= other.to && other.from <= self.to
    }
}

/// An ordered, disjoint sequence of [PeRange]s, sorted ascending by `from`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PeRangeList(Vec<PeRange>);

/// A request to [PeRangeList::select] more PEs than the list holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("requested {requested} PEs but only {available} are available")]
pub struct SelectError {
    pub requested: u32,
    pub available: u32,
}

impl PeRangeList {
    /// Builds a list from a set of ranges, normalizing order, overlaps and
    /// adjacency exactly as [PeRangeList::merge] would.
    pub fn new(ranges: impl IntoIterator<Item = PeRange>) -> Self {
        let empty = Self(Vec::new());
        ranges
            .into_iter()
            .fold(empty, |acc, r| acc.merge(&Self(vec![r])))
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn single(from: PeId, to: PeId) -> Self {
        Self(vec![PeRange::new(from, to)])
    }

    pub fn ranges(&self) -> &[PeRange] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total number of PEs held across all ranges (`numPE`).
    pub fn count(&self) -> u32 {
        self.0.iter().map(PeRange::count).sum()
    }

    /// Returns the list formed by taking the lowest-numbered `k` PEs.
    /// Fails with [SelectError] if `self.count() < k`.
    pub fn select(&self, k: u32) -> Result<PeRangeList, SelectError> {
        let available = self.count();
        if available < k {
            return Err(SelectError {
                requested: k,
                available,
            });
        }

        let mut out = Vec::new();
        let mut remaining = k;
        for r in &self.0 {
            if remaining == 0 {
                break;
            }
            let take = remaining.min(r.count());
            out.push(PeRange {
                from: r.from,
                to: r.from + take - 1,
                queue_id: r.queue_id,
            });
            remaining -= take;
        }
        Ok(PeRangeList(out))
    }

    /// Set union, coalescing adjacent and overlapping intervals.
    pub fn merge(&self, other: &PeRangeList) -> PeRangeList {
        let mut all: Vec<PeRange> = self.0.iter().chain(other.0.iter()).copied().collect();
        all.sort_by_key(|r| r.from);

        let mut out: Vec<PeRange> = Vec::with_capacity(all.len());
        for r in all.drain(..) {
            match out.last_mut() {
                Some(last) if last.touches_or_overlaps(&r) => {
                    last.to = last.to.max(r.to);
                    if last.queue_id != r.queue_id {
                        last.queue_id = None;
                    }
                }
                _ => out.push(r),
            }
        }
        PeRangeList(out)
    }

    /// Set difference `self \ other`.
    pub fn remove(&self, other: &PeRangeList) -> PeRangeList {
        let mut out = Vec::new();
        for r in &self.0 {
            let mut pieces = vec![*r];
            for o in &other.0 {
                pieces = pieces
                    .into_iter()
                    .flat_map(|p| subtract_one(&p, o))
                    .collect();
            }
            out.extend(pieces);
        }
        out.sort_by_key(|r| r.from);
        PeRangeList(out)
    }

    /// Set intersection.
    pub fn intersect(&self, other: &PeRangeList) -> PeRangeList {
        let mut out = Vec::new();
        for r in &self.0 {
            for o in &other.0 {
                if r.overlaps(o) {
                    let from = r.from.max(o.from);
                    let to = r.to.min(o.to);
                    if from <= to {
                        out.push(PeRange {
                            from,
                            to,
                            queue_id: r.queue_id,
                        });
                    }
                }
            }
        }
        out.sort_by_key(|r| r.from);
        PeRangeList(out)
    }

    /// Debug-only invariant check: sorted, disjoint, non-touching.
    #[cfg(debug_assertions)]
    pub fn check_invariants(&self) {
        for (a, b) in self.0.iter().tuple_windows() {
            debug_assert!(a.from <= a.to && b.from <= b.to, "inverted range");
            debug_assert!(a.to < b.from, "ranges {a:?} and {b:?} overlap or touch");
            debug_assert!(a.from < b.from, "ranges not strictly ascending by from");
        }
    }

    #[cfg(not(debug_assertions))]
    pub fn check_invariants(&self) {}
}

fn subtract_one(p: &PeRange, o: &PeRange) -> Vec<PeRange> {
    if !p.overlaps(o) {
        return vec![*p];
    }
    let mut out = Vec::new();
    if p.from < o.from {
        out.push(PeRange {
            from: p.from,
            to: o.from - 1,
            queue_id: p.queue_id,
        });
    }
    if p.to > o.to {
        out.push(PeRange {
            from: o.to + 1,
            to: p.to,
            queue_id: p.queue_id,
        });
    }
    out
}

impl fmt::Display for PeRangeList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}]",
            self.0
                .iter()
                .map(|r| format!("{}..{}", r.from, r.to))
                .join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(pairs: &[(PeId, PeId)]) -> PeRangeList {
        PeRangeList::new(pairs.iter().map(|&(a, b)| PeRange::new(a, b)))
    }

    #[test]
    fn merge_coalesces_adjacent_ranges() {
        let l = list(&[(0, 9), (10, 19)]);
        assert_eq!(l.ranges(), &[PeRange::new(0, 19)]);
    }

    #[test]
    fn merge_coalesces_overlapping_ranges() {
        let l = list(&[(0, 10), (5, 19)]);
        assert_eq!(l.ranges(), &[PeRange::new(0, 19)]);
    }

    #[test]
    fn merge_keeps_disjoint_ranges_separate() {
        let l = list(&[(0, 9), (20, 29)]);
        assert_eq!(l.ranges(), &[PeRange::new(0, 9), PeRange::new(20, 29)]);
    }

    #[test]
    fn select_takes_lowest_ids_first() {
        let l = list(&[(10, 19), (30, 39)]);
        let picked = l.select(15).unwrap();
        assert_eq!(picked.count(), 15);
        assert_eq!(
            picked.ranges(),
            &[PeRange::new(10, 19), PeRange::new(30, 34)]
        );
    }

    #[test]
    fn select_is_deterministic_across_runs() {
        let l = list(&[(0, 99)]);
        let a = l.select(37).unwrap();
        let b = l.select(37).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn select_fails_when_not_enough_pes() {
        let l = list(&[(0, 4)]);
        let err = l.select(10).unwrap_err();
        assert_eq!(
            err,
            SelectError {
                requested: 10,
                available: 5
            }
        );
    }

    #[test]
    fn remove_splits_a_range_in_the_middle() {
        let l = list(&[(0, 99)]);
        let removed = l.remove(&list(&[(40, 59)]));
        assert_eq!(
            removed.ranges(),
            &[PeRange::new(0, 39), PeRange::new(60, 99)]
        );
    }

    #[test]
    fn remove_then_merge_roundtrips_to_original() {
        let l = list(&[(0, 499)]);
        let taken = list(&[(0, 99)]);
        let remainder = l.remove(&taken);
        let restored = remainder.merge(&taken);
        assert_eq!(restored, l);
    }

    #[test]
    fn intersect_keeps_only_common_pes() {
        let a = list(&[(0, 49)]);
        let b = list(&[(30, 99)]);
        assert_eq!(a.intersect(&b).ranges(), &[PeRange::new(30, 49)]);
    }

    #[test]
    fn intersect_of_disjoint_ranges_is_empty() {
        let a = list(&[(0, 9)]);
        let b = list(&[(10, 19)]);
        assert!(a.intersect(&b).is_empty());
    }
}
