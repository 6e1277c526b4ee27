//! Time-sorted availability profile: the data structure every scheduling
//! policy reads and mutates to know which PEs are free, and when.
use std::collections::BTreeMap;

use crate::perange::PeRangeList;
use crate::types::SimTime;

/// A snapshot of which PEs are free, valid from `time` onward until the
/// next later entry in the profile changes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileEntry {
    pub time: SimTime,
    pub avail: PeRangeList,
    pub num_refs: u32,
}

/// One maximal half-open window with a constant free-range set, as
/// returned by [AvailabilityProfile::get_time_slots] for use as an
/// alternative offer to a reservation requester.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeSlot {
    pub start: SimTime,
    pub end: SimTime,
    pub avail: PeRangeList,
}

/// Time-sorted map from time to [ProfileEntry].
///
/// Entries are strictly increasing in time. The leftmost entry always
/// represents "right now": the PEs free at the profile's current time.
#[derive(Debug, Clone)]
pub struct AvailabilityProfile {
    capacity: PeRangeList,
    entries: BTreeMap<SimTime, ProfileEntry>,
}

impl AvailabilityProfile {
    /// Creates a profile with the full `capacity` free starting at `now`.
    pub fn new(capacity: PeRangeList, now: SimTime) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(
            now,
            ProfileEntry {
                time: now,
                avail: capacity.clone(),
                num_refs: 0,
            },
        );
        Self { capacity, entries }
    }

    pub fn capacity(&self) -> &PeRangeList {
        &self.capacity
    }

    /// The profile's current time (the leftmost entry).
    pub fn now(&self) -> SimTime {
        *self
            .entries
            .keys()
            .next()
            .expect("profile always has a leftmost entry")
    }

    /// The PEs free right now.
    pub fn current_free(&self) -> &PeRangeList {
        &self
            .entries
            .values()
            .next()
            .expect("profile always has a leftmost entry")
            .avail
    }

    fn state_at_or_before(&self, t: SimTime) -> PeRangeList {
        self.entries
            .range(..=t)
            .next_back()
            .map(|(_, e)| e.avail.clone())
            .unwrap_or_else(|| self.capacity.clone())
    }

    /// Public form of [Self::state_at_or_before], for composing multiple
    /// profiles into an aggregate view (used by [crate::partitioned]).
    pub fn free_at(&self, t: SimTime) -> PeRangeList {
        self.state_at_or_before(t)
    }

    /// The entry times known to fall in `[from, to)`.
    pub fn boundary_times(&self, from: SimTime, to: SimTime) -> Vec<SimTime> {
        self.entries.range(from..to).map(|(t, _)| *t).collect()
    }

    /// Returns a virtual entry whose `avail` is the intersection of all
    /// stored entries' ranges over `[start, start+duration)`. `None` if
    /// that intersection holds fewer than `num_pe` PEs.
    pub fn check_availability(
        &self,
        num_pe: u32,
        start: SimTime,
        duration: SimTime,
    ) -> Option<ProfileEntry> {
        let end = start.saturating_add(duration);
        let mut avail = self.state_at_or_before(start);
        for entry in self.entries.range(start..end).map(|(_, e)| e) {
            avail = avail.intersect(&entry.avail);
        }
        if avail.count() < num_pe {
            return None;
        }
        Some(ProfileEntry {
            time: start,
            avail,
            num_refs: 0,
        })
    }

    /// Returns the earliest time `t >= now` such that `>= num_pe` PEs are
    /// continuously free over `[t, t+duration)`.
    ///
    /// Always succeeds (given `num_pe <= capacity.count()`): beyond the
    /// last entry the profile is known to change, the free set stops
    /// changing, so the search is bounded by the number of entries.
    pub fn find_start_time(&self, num_pe: u32, duration: SimTime) -> SimTime {
        let now = self.now();
        let mut candidates: Vec<SimTime> = self.entries.range(now..).map(|(t, _)| *t).collect();
        if candidates.first() != Some(&now) {
            candidates.insert(0, now);
        }
        for t in &candidates {
            if self.check_availability(num_pe, *t, duration).is_some() {
                return *t;
            }
        }
        // Every known future change has been tried; the last one's state
        // persists forever afterward, so it must satisfy the request.
        *candidates.last().unwrap_or(&now)
    }

    /// Ensures an entry exists at exactly time `t`, cloning the state that
    /// would be active at `t` if none exists yet. Returns whether an entry
    /// was freshly inserted.
    fn ensure_entry_at(&mut self, t: SimTime) -> bool {
        if self.entries.contains_key(&t) {
            return false;
        }
        let avail = self.state_at_or_before(t);
        self.entries.insert(
            t,
            ProfileEntry {
                time: t,
                avail,
                num_refs: 0,
            },
        );
        true
    }

    /// Removes `ranges` from every entry's `avail` in `[start, finish)`,
    /// re-adding them at `finish` so the ranges become free again from
    /// that instant on.
    pub fn allocate(&mut self, ranges: &PeRangeList, start: SimTime, finish: SimTime) {
        assert!(start <= finish, "allocate: start must precede finish");
        self.ensure_entry_at(start);
        self.ensure_entry_at(finish);

        for (_, entry) in self.entries.range_mut(start..finish) {
            entry.avail = entry.avail.remove(ranges);
            entry.num_refs += 1;
        }
        if let Some(entry) = self.entries.get_mut(&finish) {
            entry.avail = entry.avail.merge(ranges);
            entry.num_refs += 1;
        }
        self.coalesce();
    }

    /// Inverse of [Self::allocate]: re-adds `ranges` to every entry's
    /// `avail` in `[start, finish)`, removing them again at `finish`.
    pub fn add_time_slot(&mut self, start: SimTime, finish: SimTime, ranges: &PeRangeList) {
        assert!(start <= finish, "add_time_slot: start must precede finish");
        self.ensure_entry_at(start);
        self.ensure_entry_at(finish);

        for (_, entry) in self.entries.range_mut(start..finish) {
            entry.avail = entry.avail.merge(ranges);
            entry.num_refs += 1;
        }
        if let Some(entry) = self.entries.get_mut(&finish) {
            entry.avail = entry.avail.remove(ranges);
            entry.num_refs += 1;
        }
        self.coalesce();
    }

    /// Drops entries with time `< t`, keeping one entry at `t` holding the
    /// PE ranges free at `t`.
    pub fn remove_past_entries(&mut self, t: SimTime) {
        self.ensure_entry_at(t);
        let tail = self.entries.split_off(&t);
        self.entries = tail;
    }

    /// Enumerates maximal half-open windows during `[start, start+duration)`
    /// each with their free-range set.
    pub fn get_time_slots(&self, start: SimTime, duration: SimTime) -> Vec<TimeSlot> {
        let end = start.saturating_add(duration);
        let mut bounds: Vec<SimTime> = self
            .entries
            .range(start..end)
            .map(|(t, _)| *t)
            .collect();
        if bounds.first() != Some(&start) {
            bounds.insert(0, start);
        }
        bounds.push(end);

        bounds
            .windows(2)
            .map(|w| {
                let (s, e) = (w[0], w[1]);
                TimeSlot {
                    start: s,
                    end: e,
                    avail: self.state_at_or_before(s),
                }
            })
            .collect()
    }

    /// Merges consecutive entries that carry identical free ranges,
    /// keeping the earlier entry's time and summing `num_refs`.
    fn coalesce(&mut self) {
        let keys: Vec<SimTime> = self.entries.keys().copied().collect();
        for pair in keys.windows(2) {
            let (k1, k2) = (pair[0], pair[1]);
            let equal = match (self.entries.get(&k1), self.entries.get(&k2)) {
                (Some(a), Some(b)) => a.avail == b.avail,
                _ => false,
            };
            if equal {
                if let Some(removed) = self.entries.remove(&k2) {
                    if let Some(kept) = self.entries.get_mut(&k1) {
                        kept.num_refs += removed.num_refs;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perange::PeRange;

    fn full(n: u32) -> PeRangeList {
        PeRangeList::single(0, n - 1)
    }

    #[test]
    fn s1_profile_roundtrip() {
        // 500 PEs, allocate two jobs, then check at t=250 and find_start_time.
        let mut p = AvailabilityProfile::new(full(500), 0);
        p.allocate(&PeRangeList::single(0, 99), 100, 600);
        p.allocate(&PeRangeList::single(100, 499), 200, 700);

        let entry = p.check_availability(500, 700, 1).unwrap();
        assert_eq!(entry.avail, full(500));

        p.remove_past_entries(250);
        assert_eq!(p.find_start_time(500, 100), 700);
    }

    #[test]
    fn profile_soundness_balanced_allocate_and_add_time_slot() {
        let total = full(64);
        let mut p = AvailabilityProfile::new(total.clone(), 0);
        let r1 = PeRangeList::single(0, 15);
        let r2 = PeRangeList::single(16, 31);

        p.allocate(&r1, 10, 50);
        p.allocate(&r2, 20, 40);
        p.add_time_slot(10, 50, &r1);
        p.add_time_slot(20, 40, &r2);

        let entry = p.check_availability(64, 0, u64::MAX / 2).unwrap();
        assert_eq!(entry.avail, total);
    }

    #[test]
    fn check_availability_fails_when_not_enough_pes_throughout() {
        let mut p = AvailabilityProfile::new(full(10), 0);
        p.allocate(&PeRangeList::single(0, 4), 0, 100);
        assert!(p.check_availability(10, 0, 50).is_none());
        assert!(p.check_availability(5, 0, 50).is_some());
    }

    #[test]
    fn remove_past_entries_keeps_current_free_set() {
        let mut p = AvailabilityProfile::new(full(10), 0);
        p.allocate(&PeRangeList::single(0, 4), 0, 100);
        p.remove_past_entries(50);
        assert_eq!(p.now(), 50);
        assert_eq!(p.current_free(), &PeRangeList::single(5, 9));
    }

    #[test]
    fn get_time_slots_splits_on_boundaries() {
        let mut p = AvailabilityProfile::new(full(10), 0);
        p.allocate(&PeRangeList::single(0, 4), 20, 40);
        let slots = p.get_time_slots(0, 60);
        assert_eq!(slots.len(), 3);
        assert_eq!(slots[0].avail, full(10));
        assert_eq!(slots[1].avail, PeRangeList::single(5, 9));
        assert_eq!(slots[2].avail, full(10));
    }

    #[test]
    fn coalesce_merges_identical_adjacent_entries() {
        let mut p = AvailabilityProfile::new(full(10), 0);
        p.allocate(&PeRangeList::single(0, 4), 10, 20);
        p.allocate(&PeRangeList::single(0, 4), 20, 30);
        // Both windows free the same ranges at t=20 and t=30: the entry at
        // t=20 (mid-reallocation) should not linger once coalesced with an
        // identical neighbor.
        assert!(p.check_availability(10, 30, 1).is_some());
    }

    #[test]
    fn tagged_ranges_do_not_confuse_counting() {
        let capacity = PeRangeList::new(vec![PeRange::tagged(0, 9, 1)]);
        let p = AvailabilityProfile::new(capacity, 0);
        assert_eq!(p.current_free().count(), 10);
    }
}
