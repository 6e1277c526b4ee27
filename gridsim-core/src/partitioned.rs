//! A profile split into per-partition views, with an aggregate view for
//! policies that support borrowing PEs across partition boundaries.
use std::collections::{BTreeSet, HashMap};

use crate::job::JobRequest;
use crate::perange::PeRangeList;
use crate::profile::{AvailabilityProfile, ProfileEntry};
use crate::types::{PartitionId, SimTime};

/// A predicate used by [PartitionedProfile::match_partition] to decide
/// which partition a job belongs to.
pub type PartitionPredicate = Box<dyn Fn(&JobRequest) -> bool + Send + Sync>;

/// Same as [AvailabilityProfile], but split per partition. The sum of the
/// per-partition free ranges at any time equals the aggregate free ranges
/// at that time, as long as no borrowing has been recorded.
pub struct PartitionedProfile {
    partitions: HashMap<PartitionId, AvailabilityProfile>,
}

impl PartitionedProfile {
    pub fn new(capacities: impl IntoIterator<Item = (PartitionId, PeRangeList)>, now: SimTime) -> Self {
        let partitions = capacities
            .into_iter()
            .map(|(id, cap)| (id, AvailabilityProfile::new(cap, now)))
            .collect();
        Self { partitions }
    }

    pub fn partition(&self, id: PartitionId) -> Option<&AvailabilityProfile> {
        self.partitions.get(&id)
    }

    pub fn partition_mut(&mut self, id: PartitionId) -> Option<&mut AvailabilityProfile> {
        self.partitions.get_mut(&id)
    }

    pub fn partition_ids(&self) -> impl Iterator<Item = PartitionId> + '_ {
        self.partitions.keys().copied()
    }

    /// Restricted to the partition's own availability profile.
    pub fn check_part_availability(
        &self,
        part: PartitionId,
        num_pe: u32,
        start: SimTime,
        duration: SimTime,
    ) -> Option<ProfileEntry> {
        self.partitions
            .get(&part)?
            .check_availability(num_pe, start, duration)
    }

    fn merged_free_at(&self, t: SimTime) -> PeRangeList {
        self.partitions
            .values()
            .fold(PeRangeList::empty(), |acc, p| acc.merge(&p.free_at(t)))
    }

    /// As [AvailabilityProfile::check_availability], but over the union of
    /// free ranges across every partition (used when borrowing is enabled).
    pub fn check_aggregate_availability(
        &self,
        num_pe: u32,
        start: SimTime,
        duration: SimTime,
    ) -> Option<ProfileEntry> {
        let end = start.saturating_add(duration);
        let mut times: BTreeSet<SimTime> = self
            .partitions
            .values()
            .flat_map(|p| p.boundary_times(start, end))
            .collect();
        times.insert(start);

        let mut avail = self.merged_free_at(start);
        for t in times.into_iter().filter(|&t| t > start) {
            avail = avail.intersect(&self.merged_free_at(t));
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

    /// As [AvailabilityProfile::find_start_time], but over the aggregate
    /// (cross-partition) view.
    pub fn find_start_time_aggregate(&self, num_pe: u32, duration: SimTime) -> SimTime {
        let now = self
            .partitions
            .values()
            .map(|p| p.now())
            .min()
            .unwrap_or(0);
        let mut candidates: BTreeSet<SimTime> = self
            .partitions
            .values()
            .flat_map(|p| p.boundary_times(now, SimTime::MAX))
            .collect();
        candidates.insert(now);

        for t in &candidates {
            if self.check_aggregate_availability(num_pe, *t, duration).is_some() {
                return *t;
            }
        }
        candidates.into_iter().next_back().unwrap_or(now)
    }

    /// Picks the first partition whose predicate matches `req`, or `None`
    /// if no partition claims it (the caller rejects such jobs).
    pub fn match_partition(
        predicates: &[(PartitionId, PartitionPredicate)],
        req: &JobRequest,
    ) -> Option<PartitionId> {
        predicates
            .iter()
            .find(|(_, pred)| pred(req))
            .map(|(id, _)| *id)
    }
}
