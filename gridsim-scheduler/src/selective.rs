//! Selective backfilling (spec §4.4.4): no eager reservations. A waiting
//! job is only granted a reservation once its starvation ratio (xFactor)
//! exceeds its category's running-average threshold.
use std::collections::HashMap;

use gridsim_core::perange::PeRangeList;
use gridsim_core::profile::AvailabilityProfile;
use gridsim_core::types::{JobId, SimTime};
use gridsim_core::{Job, JobRequest, JobStatus, SystemError, TypedResult};

use crate::policy::{BackfillCore, SchedulingPolicy};

/// Assigns each job to a starvation-tracking category. The source this
/// toolkit generalizes from tracks one set of statistics process-wide;
/// gridsim exposes a selector so callers can split it per job class
/// (e.g. by size bucket) while defaulting to a single category (`0`).
pub type CategorySelector = Box<dyn Fn(&JobRequest) -> u32 + Send + Sync>;

#[derive(Debug, Clone, Copy, Default)]
struct SlowdownStats {
    sum_slowdown: f64,
    num_completed: u64,
}

impl SlowdownStats {
    /// `max(1.0, sum(slowdowns) / numCompleted)`, `1.0` before any job in
    /// this category has completed.
    fn threshold(&self) -> f64 {
        if self.num_completed == 0 {
            1.0
        } else {
            (self.sum_slowdown / self.num_completed as f64).max(1.0)
        }
    }
}

pub struct SelectiveBackfill {
    core: BackfillCore,
    category_selector: Option<CategorySelector>,
    categories: HashMap<u32, SlowdownStats>,
    category_by_job: HashMap<JobId, u32>,
}

impl SelectiveBackfill {
    pub fn new(capacity: PeRangeList, pe_rating: u32, now: SimTime) -> Self {
        Self {
            core: BackfillCore::new(capacity, pe_rating, now),
            category_selector: None,
            categories: HashMap::new(),
            category_by_job: HashMap::new(),
        }
    }

    pub fn with_category_selector(mut self, selector: CategorySelector) -> Self {
        self.category_selector = Some(selector);
        self
    }

    pub fn profile(&self) -> &AvailabilityProfile {
        &self.core.profile
    }

    fn category_of(&self, req: &JobRequest) -> u32 {
        self.category_selector.as_ref().map(|f| f(req)).unwrap_or(0)
    }

    /// The xFactor a still-waiting, unreserved job would have right now:
    /// `(waitTime + runTime) / runTime`.
    fn xfactor(&self, job: &Job, now: SimTime) -> f64 {
        let runtime = self.core.runtime_of(job.length_mi);
        let wait_time = now.saturating_sub(job.submission_time);
        (wait_time + runtime) as f64 / runtime as f64
    }

    /// Promotes any reserved waiting job whose booked start has arrived,
    /// then re-evaluates every unreserved waiting job: starts it
    /// immediately if it fits, otherwise grants it a reservation once its
    /// xFactor exceeds its category's threshold.
    pub fn update(&mut self, now: SimTime) {
        let due: Vec<JobId> = self
            .core
            .waiting
            .iter()
            .filter(|j| j.start_time.is_some_and(|s| s <= now))
            .map(|j| j.id)
            .collect();
        for id in due {
            if let Some(idx) = self.core.waiting_position(id) {
                let _ = self.core.promote_to_running(idx);
            }
        }

        let unreserved: Vec<JobId> = self
            .core
            .waiting
            .iter()
            .filter(|j| j.start_time.is_none())
            .map(|j| j.id)
            .collect();
        for id in unreserved {
            let Some(idx) = self.core.waiting_position(id) else {
                continue;
            };
            if self.core.try_start_now(idx, now) {
                let _ = self.core.promote_to_running(idx);
                continue;
            }
            let xfactor = self.xfactor(&self.core.waiting[idx], now);
            let category = *self.category_by_job.get(&id).unwrap_or(&0);
            let threshold = self.categories.entry(category).or_default().threshold();
            if xfactor > threshold {
                let num_pe = self.core.waiting[idx].num_pe;
                let runtime = self.core.runtime_of(self.core.waiting[idx].length_mi);
                let (start, ranges) = self.core.book_slot(num_pe, runtime);
                let job = &mut self.core.waiting[idx];
                job.start_time = Some(start);
                job.allocated = ranges;
            }
        }
    }
}

impl SchedulingPolicy for SelectiveBackfill {
    fn on_submit(&mut self, req: JobRequest, now: SimTime) -> TypedResult<JobId> {
        if req.num_pe == 0 || req.num_pe > self.core.profile.capacity().count() {
            return Err(anyhow::anyhow!(
                "job requests {} PEs, resource has {}",
                req.num_pe,
                self.core.profile.capacity().count()
            ))
            .map_err(|e| gridsim_core::TypedError::new(SystemError::InvalidArgument, e));
        }
        let category = self.category_of(&req);
        let mut job = self.core.new_job(&req, now);
        let id = job.id;
        job.transition(JobStatus::Queued)?;
        self.core.waiting.push(job);
        self.category_by_job.insert(id, category);
        self.update(now);
        Ok(id)
    }

    fn on_cancel(&mut self, job_id: JobId, now: SimTime) -> TypedResult<()> {
        self.category_by_job.remove(&job_id);
        if let Some(idx) = self.core.running_position(job_id) {
            let mut job = self.core.running.remove(idx);
            let start = job.start_time.unwrap_or(now);
            let runtime = self.core.runtime_of(job.length_mi);
            self.core
                .profile
                .add_time_slot(now.max(start), start + runtime, &job.allocated.clone());
            job.transition(JobStatus::Cancelled)?;
            self.update(now);
            return Ok(());
        }
        if let Some(idx) = self.core.waiting_position(job_id) {
            let job = self.core.waiting.remove(idx);
            if let Some(start) = job.start_time {
                let runtime = self.core.runtime_of(job.length_mi);
                self.core
                    .profile
                    .add_time_slot(start, start + runtime, &job.allocated);
            }
            self.update(now);
            return Ok(());
        }
        Err(anyhow::anyhow!("no such job {job_id}"))
            .map_err(|e| gridsim_core::TypedError::new(SystemError::NotFound, e))
    }

    fn on_job_finish(&mut self, job_id: JobId, now: SimTime) -> TypedResult<()> {
        let idx = self
            .core
            .running_position(job_id)
            .ok_or_else(|| anyhow::anyhow!("no such running job {job_id}"))
            .map_err(|e| gridsim_core::TypedError::new(SystemError::NotFound, e))?;
        let category = *self.category_by_job.get(&job_id).unwrap_or(&0);
        let job = self.core.finish_running(idx, now)?;

        let start = job.start_time.unwrap_or(now);
        let actual_runtime = now.saturating_sub(start).max(1);
        let wall_clock = now.saturating_sub(job.submission_time);
        let slowdown = (wall_clock as f64 / actual_runtime as f64).max(1.0);
        let stats = self.categories.entry(category).or_default();
        stats.sum_slowdown += slowdown;
        stats.num_completed += 1;
        self.category_by_job.remove(&job_id);

        self.update(now);
        Ok(())
    }

    fn on_update_schedule(&mut self, now: SimTime) {
        self.update(now);
    }

    fn job(&self, job_id: JobId) -> Option<&Job> {
        self.core.job(job_id)
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

    #[test]
    fn job_that_fits_starts_immediately_without_a_reservation() {
        let mut p = SelectiveBackfill::new(PeRangeList::single(0, 9), 1, 0);
        let a = p.on_submit(req(4, 50), 0).unwrap();
        assert_eq!(p.job(a).unwrap().status, JobStatus::InExec);
    }

    #[test]
    fn starved_job_eventually_earns_a_reservation() {
        let mut p = SelectiveBackfill::new(PeRangeList::single(0, 9), 1, 0);
        // Occupy all PEs with a long job.
        p.on_submit(req(10, 1000), 0).unwrap();
        let waiter = p.on_submit(req(10, 10), 0).unwrap();
        assert!(p.job(waiter).unwrap().start_time.is_none());

        // runtime=10, threshold=1.0 initially: xfactor = (wait+10)/10 > 1
        // as soon as wait > 0, so the next update should grant a reservation.
        p.on_update_schedule(1);
        assert!(p.job(waiter).unwrap().start_time.is_some());
    }

    #[test]
    fn completed_job_updates_its_categorys_threshold() {
        let mut p = SelectiveBackfill::new(PeRangeList::single(0, 9), 1, 0);
        let a = p.on_submit(req(10, 100), 0).unwrap();
        assert_eq!(p.job(a).unwrap().status, JobStatus::InExec);
        p.on_job_finish(a, 200).unwrap();
        assert_eq!(p.job(a).unwrap().status, gridsim_core::JobStatus::Success);
        assert_eq!(p.categories.get(&0).unwrap().num_completed, 1);
    }
}
