//! The capability every scheduling policy implements, plus the waiting-
//! list / running-list / profile bookkeeping shared by all five of them.
//!
//! The five policies (conservative, aggressive/EASY, multi-partition,
//! selective, AR-conservative) share structure only around the profile,
//! job lists and self-event scheduling — composition over a common base
//! struct, not a deep inheritance tree.
use log::warn;

use gridsim_core::job::forecast_execution_time;
use gridsim_core::perange::PeRangeList;
use gridsim_core::profile::AvailabilityProfile;
use gridsim_core::types::{JobId, SimTime};
use gridsim_core::{Job, JobRequest, JobStatus};

/// A capability every scheduling policy implements. `on_move`/`on_pause`/
/// `on_resume` default to a logged warning and no state change, matching
/// spec's "all policies respond ... with a recorded warning and no state
/// change" (none of the five policies override these).
pub trait SchedulingPolicy {
    /// Submits a new job request, returning its assigned id.
    fn on_submit(&mut self, req: JobRequest, now: SimTime) -> gridsim_core::TypedResult<JobId>;

    /// Cancels a waiting or running job.
    fn on_cancel(&mut self, job_id: JobId, now: SimTime) -> gridsim_core::TypedResult<()>;

    /// Called when a running job's `actual_finish_time` self-event fires.
    fn on_job_finish(&mut self, job_id: JobId, now: SimTime) -> gridsim_core::TypedResult<()>;

    /// Re-enters the scheduling loop; called on the `UPT_SCHEDULE`
    /// self-event (job start/finish boundaries).
    fn on_update_schedule(&mut self, now: SimTime);

    /// Looks up a job by id, in either the waiting or running list.
    fn job(&self, job_id: JobId) -> Option<&Job>;

    fn on_move(&mut self, job_id: JobId) {
        warn!("gridletMove is not supported by this policy (job {job_id})");
    }

    fn on_pause(&mut self, job_id: JobId) {
        warn!("gridletPause is not supported by this policy (job {job_id})");
    }

    fn on_resume(&mut self, job_id: JobId) {
        warn!("gridletResume is not supported by this policy (job {job_id})");
    }
}

/// Shared waiting-list / running-list / profile bookkeeping used by every
/// backfilling policy. Each concrete policy embeds one of these rather
/// than inheriting from a common base type.
#[derive(Debug)]
pub struct BackfillCore {
    pub profile: AvailabilityProfile,
    pub pe_rating: u32,
    pub waiting: Vec<Job>,
    pub running: Vec<Job>,
    next_job_id: u64,
}

impl BackfillCore {
    pub fn new(capacity: PeRangeList, pe_rating: u32, now: SimTime) -> Self {
        assert!(pe_rating > 0, "PE rating must be positive");
        Self {
            profile: AvailabilityProfile::new(capacity, now),
            pe_rating,
            waiting: Vec::new(),
            running: Vec::new(),
            next_job_id: 1,
        }
    }

    /// Forecast runtime of a job request under this resource's PE rating.
    pub fn runtime_of(&self, length_mi: u64) -> SimTime {
        forecast_execution_time(self.pe_rating, length_mi)
    }

    /// Builds a fresh [Job] record with a freshly allocated id.
    pub fn new_job(&mut self, req: &JobRequest, now: SimTime) -> Job {
        let id = JobId(self.next_job_id);
        self.next_job_id += 1;
        Job::new(id, now, req)
    }

    pub fn job(&self, id: JobId) -> Option<&Job> {
        self.waiting
            .iter()
            .find(|j| j.id == id)
            .or_else(|| self.running.iter().find(|j| j.id == id))
    }

    pub fn waiting_position(&self, id: JobId) -> Option<usize> {
        self.waiting.iter().position(|j| j.id == id)
    }

    pub fn running_position(&self, id: JobId) -> Option<usize> {
        self.running.iter().position(|j| j.id == id)
    }

    /// Moves a waiting job into the running list, transitioning it to
    /// `InExec`.
    pub fn promote_to_running(&mut self, idx: usize) -> gridsim_core::TypedResult<()> {
        let mut job = self.waiting.remove(idx);
        job.transition(JobStatus::InExec)?;
        self.running.push(job);
        Ok(())
    }

    /// Finishes a running job, releasing its profile allocation. Returns
    /// the now-finished job's record.
    pub fn finish_running(&mut self, idx: usize, now: SimTime) -> gridsim_core::TypedResult<Job> {
        let mut job = self.running.remove(idx);
        self.profile.add_time_slot(
            job.start_time.unwrap_or(now),
            now,
            &job.allocated.clone(),
        );
        job.actual_finish_time = Some(now);
        job.transition(JobStatus::Success)?;
        Ok(job)
    }

    /// Books the earliest future slot satisfying `(num_pe, runtime)` in the
    /// profile, returning its `(start_time, ranges)`. Used by both
    /// conservative backfilling (every waiting job) and EASY backfilling
    /// (the pivot only).
    pub fn book_slot(&mut self, num_pe: u32, runtime: SimTime) -> (SimTime, PeRangeList) {
        let start = self.profile.find_start_time(num_pe, runtime);
        let entry = self
            .profile
            .check_availability(num_pe, start, runtime)
            .expect("find_start_time must return a time satisfying availability");
        let ranges = entry
            .avail
            .select(num_pe)
            .expect("find_start_time guarantees enough PEs");
        self.profile.allocate(&ranges, start, start + runtime);
        (start, ranges)
    }

    /// Attempts to start the waiting job at `idx` right now, i.e. without
    /// delaying anything already booked in the profile (a pivot's
    /// reservation, if any, is already recorded there). On success the
    /// job's `allocated`/`start_time` are set and `true` is returned; the
    /// caller is responsible for promoting it to `running`.
    pub fn try_start_now(&mut self, idx: usize, now: SimTime) -> bool {
        let (num_pe, runtime) = {
            let job = &self.waiting[idx];
            (job.num_pe, self.runtime_of(job.length_mi))
        };
        let Some(entry) = self.profile.check_availability(num_pe, now, runtime) else {
            return false;
        };
        if entry.avail.count() < num_pe {
            return false;
        }
        let ranges = entry
            .avail
            .select(num_pe)
            .expect("checked above that enough PEs are available");
        self.profile.allocate(&ranges, now, now + runtime);
        let job = &mut self.waiting[idx];
        job.allocated = ranges;
        job.start_time = Some(now);
        true
    }
}
