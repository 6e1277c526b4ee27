//! Aggressive (EASY) backfilling (spec §4.4.1): only the head of the
//! waiting list — the pivot — has a reservation booked in the profile.
//! Any other waiting job may start immediately if doing so does not
//! delay the pivot, which reduces to a plain `check_availability` call
//! since the pivot's slot is already recorded in the shared profile.
use std::cmp::Ordering;

use gridsim_core::perange::PeRangeList;
use gridsim_core::profile::AvailabilityProfile;
use gridsim_core::types::{JobId, SimTime};
use gridsim_core::{Job, JobRequest, JobStatus, SystemError, TypedResult};

use crate::policy::{BackfillCore, SchedulingPolicy};

/// Orders waiting jobs before each backfill pass. Defaults to arrival
/// order (FIFO, i.e. no reordering).
pub type Comparator = Box<dyn Fn(&Job, &Job) -> Ordering + Send + Sync>;

#[derive(Debug)]
pub struct AggressiveBackfill {
    core: BackfillCore,
    /// The id of the single waiting job (if any) with a booked future
    /// start time. Testable Property 3: at most one waiting job is ever
    /// booked at a time.
    pivot: Option<JobId>,
    comparator: Option<Comparator>,
}

impl AggressiveBackfill {
    pub fn new(capacity: PeRangeList, pe_rating: u32, now: SimTime) -> Self {
        Self {
            core: BackfillCore::new(capacity, pe_rating, now),
            pivot: None,
            comparator: None,
        }
    }

    /// Overrides the default arrival-order comparator used to sort the
    /// waiting list before each backfill pass.
    pub fn with_comparator(mut self, cmp: Comparator) -> Self {
        self.comparator = Some(cmp);
        self
    }

    pub fn profile(&self) -> &AvailabilityProfile {
        &self.core.profile
    }

    pub fn pivot(&self) -> Option<JobId> {
        self.pivot
    }

    pub fn waiting_count(&self) -> usize {
        self.core.waiting.len()
    }

    /// Runs one backfill pass (spec §4.4.1, steps 1-3).
    pub fn backfill_pass(&mut self, now: SimTime) {
        // 1. Promote the pivot if its booked start time has arrived.
        if let Some(pivot_id) = self.pivot {
            match self.core.waiting_position(pivot_id) {
                Some(idx) if self.core.waiting[idx].start_time.is_some_and(|s| s <= now) => {
                    let _ = self.core.promote_to_running(idx);
                    self.pivot = None;
                }
                Some(_) => {}
                None => self.pivot = None,
            }
        }

        // 2. Sort waiting jobs (pivot, if still waiting, always sorts
        // first: its reservation is fixed and must not be reconsidered).
        let pivot = self.pivot;
        if let Some(cmp) = self.comparator.as_ref() {
            self.core.waiting.sort_by(|a, b| match (Some(a.id) == pivot, Some(b.id) == pivot) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                (false, false) => cmp(a, b),
            });
        }

        // 3. Try to start every non-pivot waiting job; the first one that
        // can't start becomes the new pivot, if there isn't one already.
        let ids: Vec<JobId> = self
            .core
            .waiting
            .iter()
            .map(|j| j.id)
            .filter(|&id| Some(id) != pivot)
            .collect();
        for id in ids {
            let Some(idx) = self.core.waiting_position(id) else {
                continue;
            };
            if self.core.try_start_now(idx, now) {
                let _ = self.core.promote_to_running(idx);
            } else if self.pivot.is_none() {
                let (num_pe, runtime) = {
                    let job = &self.core.waiting[idx];
                    (job.num_pe, self.core.runtime_of(job.length_mi))
                };
                let (start, ranges) = self.core.book_slot(num_pe, runtime);
                let job = &mut self.core.waiting[idx];
                job.allocated = ranges;
                job.start_time = Some(start);
                let _ = job.transition(JobStatus::Queued);
                self.pivot = Some(id);
            }
        }
    }
}

impl SchedulingPolicy for AggressiveBackfill {
    fn on_submit(&mut self, req: JobRequest, now: SimTime) -> TypedResult<JobId> {
        if req.num_pe == 0 || req.num_pe > self.core.profile.capacity().count() {
            return Err(anyhow::anyhow!(
                "job requests {} PEs, resource has {}",
                req.num_pe,
                self.core.profile.capacity().count()
            ))
            .map_err(|e| gridsim_core::TypedError::new(SystemError::InvalidArgument, e));
        }
        let job = self.core.new_job(&req, now);
        let id = job.id;
        self.core.waiting.push(job);
        self.backfill_pass(now);
        Ok(id)
    }

    fn on_cancel(&mut self, job_id: JobId, now: SimTime) -> TypedResult<()> {
        if let Some(idx) = self.core.running_position(job_id) {
            let mut job = self.core.running.remove(idx);
            let start = job.start_time.unwrap_or(now);
            let runtime = self.core.runtime_of(job.length_mi);
            self.core
                .profile
                .add_time_slot(now.max(start), start + runtime, &job.allocated.clone());
            job.transition(JobStatus::Cancelled)?;
            self.backfill_pass(now);
            return Ok(());
        }
        if let Some(idx) = self.core.waiting_position(job_id) {
            let job = self.core.waiting.remove(idx);
            if Some(job_id) == self.pivot {
                let start = job.start_time.expect("pivot always has a booked start_time");
                let runtime = self.core.runtime_of(job.length_mi);
                self.core
                    .profile
                    .add_time_slot(start, start + runtime, &job.allocated);
                self.pivot = None;
            }
            self.backfill_pass(now);
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
        self.core.finish_running(idx, now)?;
        self.backfill_pass(now);
        Ok(())
    }

    fn on_update_schedule(&mut self, now: SimTime) {
        self.backfill_pass(now);
    }

    fn job(&self, job_id: JobId) -> Option<&Job> {
        self.core.job(job_id)
    }
}
