//! Conservative backfilling (spec §4.4.2): every waiting job carries a
//! confirmed future start time booked in the profile. Cancellation
//! compresses the schedule so no waiting job's start time ever regresses.
use gridsim_core::perange::PeRangeList;
use gridsim_core::profile::AvailabilityProfile;
use gridsim_core::types::{JobId, SimTime};
use gridsim_core::{JobRequest, JobStatus, SystemError, TypedResult};

use crate::policy::{BackfillCore, SchedulingPolicy};

#[derive(Debug)]
pub struct ConservativeBackfill {
    core: BackfillCore,
}

impl ConservativeBackfill {
    pub fn new(capacity: PeRangeList, pe_rating: u32, now: SimTime) -> Self {
        Self {
            core: BackfillCore::new(capacity, pe_rating, now),
        }
    }

    pub fn profile(&self) -> &AvailabilityProfile {
        &self.core.profile
    }

    pub fn waiting_count(&self) -> usize {
        self.core.waiting.len()
    }

    pub fn running_count(&self) -> usize {
        self.core.running.len()
    }

    /// Returns every waiting job's id in submission order, for tests that
    /// want to assert on the schedule shape.
    pub fn waiting_ids(&self) -> Vec<JobId> {
        self.core.waiting.iter().map(|j| j.id).collect()
    }

    /// Releases every still-waiting job whose booked `start_time > ref_time`
    /// and re-books it via `find_start_time`, in waiting-list order. No
    /// job's new start time may exceed the one it had before compression
    /// (Testable Property 2).
    pub fn compress(&mut self, ref_time: SimTime) {
        let ids: Vec<JobId> = self.core.waiting.iter().map(|j| j.id).collect();
        for id in ids {
            let Some(idx) = self.core.waiting_position(id) else {
                continue;
            };
            let (prev_start, runtime, ranges, num_pe) = {
                let job = &self.core.waiting[idx];
                let prev_start = job.start_time.expect("waiting job always has a start_time");
                if prev_start <= ref_time {
                    continue;
                }
                (
                    prev_start,
                    self.core.runtime_of(job.length_mi),
                    job.allocated.clone(),
                    job.num_pe,
                )
            };
            self.core
                .profile
                .add_time_slot(prev_start, prev_start + runtime, &ranges);
            let (new_start, new_ranges) = self.core.book_slot(num_pe, runtime);
            debug_assert!(
                new_start <= prev_start,
                "compression must never delay a waiting job"
            );
            let job = &mut self.core.waiting[idx];
            job.start_time = Some(new_start);
            job.allocated = new_ranges;
        }
    }
}

impl SchedulingPolicy for ConservativeBackfill {
    fn on_submit(&mut self, req: JobRequest, now: SimTime) -> TypedResult<JobId> {
        if req.num_pe == 0 || req.num_pe > self.core.profile.capacity().count() {
            return Err(anyhow::anyhow!(
                "job requests {} PEs, resource has {}",
                req.num_pe,
                self.core.profile.capacity().count()
            ))
            .map_err(|e| gridsim_core::TypedError::new(SystemError::InvalidArgument, e));
        }

        let runtime = self.core.runtime_of(req.length_mi);
        let mut job = self.core.new_job(&req, now);
        let (start, ranges) = self.core.book_slot(job.num_pe, runtime);
        job.allocated = ranges;
        job.start_time = Some(start);

        job.transition(JobStatus::Queued)?;
        let id = job.id;
        if start <= now {
            job.transition(JobStatus::InExec)?;
            self.core.running.push(job);
        } else {
            self.core.waiting.push(job);
        }
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
            self.compress(now);
            return Ok(());
        }
        if let Some(idx) = self.core.waiting_position(job_id) {
            let job = self.core.waiting.remove(idx);
            let start = job.start_time.expect("waiting job has a start_time");
            let runtime = self.core.runtime_of(job.length_mi);
            self.core
                .profile
                .add_time_slot(start, start + runtime, &job.allocated);
            self.compress(now);
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
        self.on_update_schedule(now);
        Ok(())
    }

    fn on_update_schedule(&mut self, now: SimTime) {
        let ready: Vec<JobId> = self
            .core
            .waiting
            .iter()
            .filter(|j| j.start_time.is_some_and(|s| s <= now))
            .map(|j| j.id)
            .collect();
        for id in ready {
            if let Some(idx) = self.core.waiting_position(id) {
                let _ = self.core.promote_to_running(idx);
            }
        }
    }

    fn job(&self, job_id: JobId) -> Option<&gridsim_core::Job> {
        self.core.job(job_id)
    }
}
