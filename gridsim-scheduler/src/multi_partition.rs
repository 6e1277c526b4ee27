//! Aggressive multi-partition backfilling (spec §4.4.3): one EASY-style
//! pivot per partition over a [PartitionedProfile], with optional
//! cross-partition borrowing and priority-based pivot displacement.
use std::collections::HashMap;

use gridsim_core::job::forecast_execution_time;
use gridsim_core::partitioned::{PartitionPredicate, PartitionedProfile};
use gridsim_core::perange::PeRangeList;
use gridsim_core::types::{JobId, PartitionId, SimTime};
use gridsim_core::{Job, JobRequest, JobStatus, SystemError, TypedResult};

use crate::policy::SchedulingPolicy;

/// Assigns a priority to a job at submission time. Lower values sort
/// first and are displaced last — i.e. lower is "more important",
/// matching the waiting list's `(priority asc, submissionTime asc)` order.
pub type PrioritySelector = Box<dyn Fn(&JobRequest) -> i64 + Send + Sync>;

#[derive(Debug, Clone, Copy)]
pub struct MultiPartitionConfig {
    /// Whether a job may start using PEs borrowed from another partition
    /// when its own partition alone cannot fit it. Default `true`.
    pub allow_borrowing: bool,
    /// When borrowing is disabled and a job could never fit even its own
    /// partition's total capacity, reject it at submission instead of
    /// leaving it waiting forever. Default `true`.
    pub return_job_if_no_fit: bool,
}

impl Default for MultiPartitionConfig {
    fn default() -> Self {
        Self {
            allow_borrowing: true,
            return_job_if_no_fit: true,
        }
    }
}

struct Pivot {
    job_id: JobId,
    priority: i64,
}

pub struct MultiPartitionBackfill {
    profile: PartitionedProfile,
    pe_rating: u32,
    predicates: Vec<(PartitionId, PartitionPredicate)>,
    priority_selector: Option<PrioritySelector>,
    config: MultiPartitionConfig,
    waiting: Vec<Job>,
    running: Vec<Job>,
    pivots: HashMap<PartitionId, Pivot>,
    next_job_id: u64,
}

impl MultiPartitionBackfill {
    pub fn new(
        capacities: impl IntoIterator<Item = (PartitionId, PeRangeList)>,
        predicates: Vec<(PartitionId, PartitionPredicate)>,
        pe_rating: u32,
        now: SimTime,
        config: MultiPartitionConfig,
    ) -> Self {
        Self {
            profile: PartitionedProfile::new(capacities, now),
            pe_rating,
            predicates,
            priority_selector: None,
            config,
            waiting: Vec::new(),
            running: Vec::new(),
            pivots: HashMap::new(),
            next_job_id: 1,
        }
    }

    pub fn with_priority_selector(mut self, selector: PrioritySelector) -> Self {
        self.priority_selector = Some(selector);
        self
    }

    pub fn profile(&self) -> &PartitionedProfile {
        &self.profile
    }

    pub fn pivot_of(&self, part: PartitionId) -> Option<JobId> {
        self.pivots.get(&part).map(|p| p.job_id)
    }

    fn runtime_of(&self, length_mi: u64) -> SimTime {
        forecast_execution_time(self.pe_rating, length_mi)
    }

    fn next_id(&mut self) -> JobId {
        let id = JobId(self.next_job_id);
        self.next_job_id += 1;
        id
    }

    /// Allocates `ranges` at `[start, finish)`, splitting the allocation
    /// across whichever partitions' static capacities the ranges fall in
    /// (relevant only when borrowing selected PEs from more than one
    /// partition).
    fn allocate_across_partitions(&mut self, ranges: &PeRangeList, start: SimTime, finish: SimTime) {
        let ids: Vec<PartitionId> = self.profile.partition_ids().collect();
        for id in ids {
            let cap = self
                .profile
                .partition(id)
                .expect("id came from partition_ids")
                .capacity()
                .clone();
            let local = ranges.intersect(&cap);
            if !local.is_empty() {
                self.profile
                    .partition_mut(id)
                    .expect("id came from partition_ids")
                    .allocate(&local, start, finish);
            }
        }
    }

    fn release_across_partitions(&mut self, ranges: &PeRangeList, start: SimTime, finish: SimTime) {
        let ids: Vec<PartitionId> = self.profile.partition_ids().collect();
        for id in ids {
            let cap = self
                .profile
                .partition(id)
                .expect("id came from partition_ids")
                .capacity()
                .clone();
            let local = ranges.intersect(&cap);
            if !local.is_empty() {
                self.profile
                    .partition_mut(id)
                    .expect("id came from partition_ids")
                    .add_time_slot(start, finish, &local);
            }
        }
    }

    /// Tries to start `job` right now, either within its own partition or,
    /// if borrowing is enabled, across the aggregate view.
    fn try_start_now(&mut self, idx: usize, now: SimTime) -> bool {
        let (part, num_pe, runtime) = {
            let job = &self.waiting[idx];
            (
                job.partition_id.expect("waiting job always has a partition"),
                job.num_pe,
                self.runtime_of(job.length_mi),
            )
        };
        let local_ok = self
            .profile
            .check_part_availability(part, num_pe, now, runtime)
            .is_some();
        let ranges = if local_ok {
            self.profile
                .check_part_availability(part, num_pe, now, runtime)
                .and_then(|e| e.avail.select(num_pe).ok())
        } else if self.config.allow_borrowing {
            self.profile
                .check_aggregate_availability(num_pe, now, runtime)
                .and_then(|e| e.avail.select(num_pe).ok())
        } else {
            None
        };
        let Some(ranges) = ranges else {
            return false;
        };
        self.allocate_across_partitions(&ranges, now, now + runtime);
        let job = &mut self.waiting[idx];
        job.allocated = ranges;
        job.start_time = Some(now);
        true
    }

    /// Books the earlier of the partition-local and (if borrowing is on)
    /// aggregate earliest start times, and records it as `part`'s pivot.
    fn schedule_pivot(&mut self, idx: usize) {
        let (part, num_pe, runtime, priority, job_id) = {
            let job = &self.waiting[idx];
            (
                job.partition_id.expect("waiting job always has a partition"),
                job.num_pe,
                self.runtime_of(job.length_mi),
                job.priority,
                job.id,
            )
        };
        let t_local = self
            .profile
            .partition(part)
            .expect("partition exists")
            .find_start_time(num_pe, runtime);
        let start = if self.config.allow_borrowing {
            let t_agg = self.profile.find_start_time_aggregate(num_pe, runtime);
            t_local.min(t_agg)
        } else {
            t_local
        };

        let ranges = self
            .profile
            .check_part_availability(part, num_pe, start, runtime)
            .and_then(|e| e.avail.select(num_pe).ok())
            .or_else(|| {
                self.profile
                    .check_aggregate_availability(num_pe, start, runtime)
                    .and_then(|e| e.avail.select(num_pe).ok())
            })
            .expect("start time was chosen to satisfy either view");

        self.allocate_across_partitions(&ranges, start, start + runtime);
        let job = &mut self.waiting[idx];
        job.allocated = ranges;
        job.start_time = Some(start);
        let _ = job.transition(JobStatus::Queued);
        self.pivots.insert(part, Pivot { job_id, priority });
    }

    /// Releases `part`'s current pivot back to an ordinary, unbooked
    /// waiting job (used both on displacement and on cancellation).
    fn unbook_pivot(&mut self, part: PartitionId) {
        let Some(pivot) = self.pivots.remove(&part) else {
            return;
        };
        if let Some(idx) = self.waiting.iter().position(|j| j.id == pivot.job_id) {
            let (start, runtime, ranges) = {
                let job = &self.waiting[idx];
                (
                    job.start_time.expect("pivot always has a start_time"),
                    self.runtime_of(job.length_mi),
                    job.allocated.clone(),
                )
            };
            self.release_across_partitions(&ranges, start, start + runtime);
            let job = &mut self.waiting[idx];
            job.start_time = None;
            job.allocated = PeRangeList::empty();
        }
    }

    /// Runs one backfill pass: promotes due pivots, then walks the
    /// waiting list in `(priority, submission_time)` order trying to
    /// start or, failing that, book/displace a pivot.
    pub fn backfill_pass(&mut self, now: SimTime) {
        let due: Vec<PartitionId> = self
            .pivots
            .iter()
            .filter(|(_, p)| {
                self.waiting
                    .iter()
                    .find(|j| j.id == p.job_id)
                    .and_then(|j| j.start_time)
                    .is_some_and(|s| s <= now)
            })
            .map(|(part, _)| *part)
            .collect();
        for part in due {
            if let Some(pivot) = self.pivots.remove(&part) {
                if let Some(idx) = self.waiting.iter().position(|j| j.id == pivot.job_id) {
                    let mut job = self.waiting.remove(idx);
                    if job.transition(JobStatus::InExec).is_ok() {
                        self.running.push(job);
                    }
                }
            }
        }

        self.waiting
            .sort_by(|a, b| (a.priority, a.submission_time).cmp(&(b.priority, b.submission_time)));

        let pivot_ids: std::collections::HashSet<JobId> =
            self.pivots.values().map(|p| p.job_id).collect();
        let ids: Vec<JobId> = self
            .waiting
            .iter()
            .map(|j| j.id)
            .filter(|id| !pivot_ids.contains(id))
            .collect();

        for id in ids {
            let Some(idx) = self.waiting.iter().position(|j| j.id == id) else {
                continue;
            };
            if self.try_start_now(idx, now) {
                let mut job = self.waiting.remove(idx);
                if job.transition(JobStatus::InExec).is_ok() {
                    self.running.push(job);
                }
                continue;
            }
            let part = self.waiting[idx]
                .partition_id
                .expect("waiting job always has a partition");
            let priority = self.waiting[idx].priority;
            match self.pivots.get(&part) {
                None => self.schedule_pivot(idx),
                Some(existing) if priority < existing.priority => {
                    self.unbook_pivot(part);
                    self.schedule_pivot(idx);
                }
                Some(_) => {}
            }
        }
    }
}

impl SchedulingPolicy for MultiPartitionBackfill {
    fn on_submit(&mut self, req: JobRequest, now: SimTime) -> TypedResult<JobId> {
        let Some(part) = PartitionedProfile::match_partition(&self.predicates, &req) else {
            return Err(anyhow::anyhow!("no partition claims this job"))
                .map_err(|e| gridsim_core::TypedError::new(SystemError::InvalidArgument, e));
        };
        let capacity = self
            .profile
            .partition(part)
            .expect("matched partition exists")
            .capacity()
            .count();
        if !self.config.allow_borrowing && req.num_pe > capacity && self.config.return_job_if_no_fit {
            return Err(anyhow::anyhow!(
                "job requests {} PEs, partition {} has {} and borrowing is disabled",
                req.num_pe,
                part.0,
                capacity
            ))
            .map_err(|e| gridsim_core::TypedError::new(SystemError::CapacityExhausted, e));
        }

        let id = self.next_id();
        let mut job = Job::new(id, now, &req);
        job.partition_id = Some(part);
        job.priority = self
            .priority_selector
            .as_ref()
            .map(|f| f(&req))
            .unwrap_or(0);
        self.waiting.push(job);
        self.backfill_pass(now);
        Ok(id)
    }

    fn on_cancel(&mut self, job_id: JobId, now: SimTime) -> TypedResult<()> {
        if let Some(idx) = self.running.iter().position(|j| j.id == job_id) {
            let mut job = self.running.remove(idx);
            let start = job.start_time.unwrap_or(now);
            let runtime = self.runtime_of(job.length_mi);
            let ranges = job.allocated.clone();
            self.release_across_partitions(&ranges, now.max(start), start + runtime);
            job.transition(JobStatus::Cancelled)?;
            self.backfill_pass(now);
            return Ok(());
        }
        if let Some(idx) = self.waiting.iter().position(|j| j.id == job_id) {
            let job = self.waiting.remove(idx);
            if let Some(part) = job.partition_id {
                if self.pivots.get(&part).is_some_and(|p| p.job_id == job_id) {
                    self.pivots.remove(&part);
                    if job.start_time.is_some() {
                        let runtime = self.runtime_of(job.length_mi);
                        self.release_across_partitions(
                            &job.allocated,
                            job.start_time.unwrap(),
                            job.start_time.unwrap() + runtime,
                        );
                    }
                }
            }
            self.backfill_pass(now);
            return Ok(());
        }
        Err(anyhow::anyhow!("no such job {job_id}"))
            .map_err(|e| gridsim_core::TypedError::new(SystemError::NotFound, e))
    }

    fn on_job_finish(&mut self, job_id: JobId, now: SimTime) -> TypedResult<()> {
        let idx = self
            .running
            .iter()
            .position(|j| j.id == job_id)
            .ok_or_else(|| anyhow::anyhow!("no such running job {job_id}"))
            .map_err(|e| gridsim_core::TypedError::new(SystemError::NotFound, e))?;
        let mut job = self.running.remove(idx);
        self.release_across_partitions(
            &job.allocated.clone(),
            job.start_time.unwrap_or(now),
            now,
        );
        job.actual_finish_time = Some(now);
        job.transition(JobStatus::Success)?;
        self.backfill_pass(now);
        Ok(())
    }

    fn on_update_schedule(&mut self, now: SimTime) {
        self.backfill_pass(now);
    }

    fn job(&self, job_id: JobId) -> Option<&Job> {
        self.waiting
            .iter()
            .find(|j| j.id == job_id)
            .or_else(|| self.running.iter().find(|j| j.id == job_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridsim_core::types::UserId;

    fn req(num_pe: u32, length_mi: u64) -> JobRequest {
        JobRequest {
            user_id: UserId(1),
            length_mi,
            num_pe,
            required_files: vec![],
            reservation_id: None,
        }
    }

    fn two_partitions() -> Vec<(PartitionId, PeRangeList)> {
        vec![
            (PartitionId(0), PeRangeList::single(0, 99)),
            (PartitionId(1), PeRangeList::single(100, 199)),
        ]
    }

    fn predicates() -> Vec<(PartitionId, PartitionPredicate)> {
        vec![
            (PartitionId(0), Box::new(|r: &JobRequest| r.num_pe <= 100) as PartitionPredicate),
            (PartitionId(1), Box::new(|_: &JobRequest| true) as PartitionPredicate),
        ]
    }

    #[test]
    fn jobs_route_to_the_matching_partition() {
        let mut p = MultiPartitionBackfill::new(
            two_partitions(),
            predicates(),
            1,
            0,
            MultiPartitionConfig::default(),
        );
        let a = p.on_submit(req(50, 10), 0).unwrap();
        assert_eq!(p.job(a).unwrap().partition_id, Some(PartitionId(0)));
        assert_eq!(p.job(a).unwrap().status, JobStatus::InExec);
    }

    #[test]
    fn unmatched_job_is_rejected() {
        let mut p = MultiPartitionBackfill::new(
            two_partitions(),
            vec![(PartitionId(0), Box::new(|r: &JobRequest| r.num_pe > 1000) as PartitionPredicate)],
            1,
            0,
            MultiPartitionConfig::default(),
        );
        assert!(p.on_submit(req(10, 10), 0).is_err());
    }

    #[test]
    fn borrowing_lets_a_job_exceed_its_own_partitions_free_pes() {
        let mut p = MultiPartitionBackfill::new(
            two_partitions(),
            vec![(PartitionId(0), Box::new(|_: &JobRequest| true) as PartitionPredicate)],
            1,
            0,
            MultiPartitionConfig {
                allow_borrowing: true,
                return_job_if_no_fit: true,
            },
        );
        // Partition 0 alone only has 100 PEs; request 150, borrowing from partition 1.
        let a = p.on_submit(req(150, 10), 0).unwrap();
        assert_eq!(p.job(a).unwrap().status, JobStatus::InExec);
        assert_eq!(p.job(a).unwrap().num_pe, 150);
    }

    #[test]
    fn higher_priority_job_displaces_a_lower_priority_pivot() {
        let mut p = MultiPartitionBackfill::new(
            vec![(PartitionId(0), PeRangeList::single(0, 9))],
            vec![(PartitionId(0), Box::new(|_: &JobRequest| true) as PartitionPredicate)],
            1,
            0,
            MultiPartitionConfig {
                allow_borrowing: false,
                return_job_if_no_fit: false,
            },
        )
        .with_priority_selector(Box::new(|r: &JobRequest| r.num_pe as i64));
        // first job occupies everything
        p.on_submit(req(10, 1000), 0).unwrap();
        // second job (priority 5) becomes pivot since partition is full
        let low = p.on_submit(req(5, 100), 0).unwrap();
        assert_eq!(p.pivot_of(PartitionId(0)), Some(low));
        // third job has lower priority value (more important) -> displaces
        let high = p.on_submit(req(1, 100), 0).unwrap();
        assert_eq!(p.pivot_of(PartitionId(0)), Some(high));
        assert!(p.job(low).unwrap().start_time.is_none());
    }
}
