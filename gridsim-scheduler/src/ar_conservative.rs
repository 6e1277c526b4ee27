//! Advance-reservation-aware conservative backfilling (spec §4.4.5):
//! ordinary jobs behave exactly like [crate::ConservativeBackfill]; jobs
//! that carry a `reservation_id` instead draw PEs from that reservation's
//! slab via the [ReservationManager] and are excluded from compression
//! (a reservation fixes a slot boundary).
use gridsim_core::perange::PeRangeList;
use gridsim_core::profile::AvailabilityProfile;
use gridsim_core::types::{JobId, ReservationId, SimTime};
use gridsim_core::{Job, JobRequest, JobStatus, SystemError, TypedResult};

use crate::policy::{BackfillCore, SchedulingPolicy};
use crate::reservation::{ReservationManager, ReservationStatus};

pub struct ArConservativeBackfill {
    core: BackfillCore,
    reservations: ReservationManager,
}

impl ArConservativeBackfill {
    pub fn new(capacity: PeRangeList, pe_rating: u32, now: SimTime, commit_period: SimTime) -> Self {
        Self {
            core: BackfillCore::new(capacity, pe_rating, now),
            reservations: ReservationManager::new(commit_period),
        }
    }

    pub fn profile(&self) -> &AvailabilityProfile {
        &self.core.profile
    }

    pub fn reservations(&self) -> &ReservationManager {
        &self.reservations
    }

    pub fn reservations_mut(&mut self) -> &mut ReservationManager {
        &mut self.reservations
    }

    /// Runs the periodic reservation-expiry sweep, compressing the
    /// ordinary-job schedule afterward (spec §4.5 "Expiry timer").
    pub fn expire_sweep(&mut self, now: SimTime) {
        let expired = self.reservations.expire_sweep(&mut self.core.profile, now);
        if !expired.is_empty() {
            self.compress(now);
        }
    }

    /// Releases every still-waiting, non-reservation-bound job whose
    /// booked `start_time > ref_time` and re-books it, identically to
    /// [crate::ConservativeBackfill::compress]. Reservation-bound jobs are
    /// skipped: their slot boundary is fixed by the reservation.
    pub fn compress(&mut self, ref_time: SimTime) {
        let ids: Vec<JobId> = self
            .core
            .waiting
            .iter()
            .filter(|j| j.reservation_id.is_none())
            .map(|j| j.id)
            .collect();
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
            debug_assert!(new_start <= prev_start, "compression must never delay a job");
            let job = &mut self.core.waiting[idx];
            job.start_time = Some(new_start);
            job.allocated = new_ranges;
        }
    }

    fn submit_reservation_bound(
        &mut self,
        req: JobRequest,
        rid: ReservationId,
        now: SimTime,
    ) -> TypedResult<JobId> {
        let runtime = self.core.runtime_of(req.length_mi);
        let reservation = self
            .reservations
            .get(rid)
            .ok_or_else(|| anyhow::anyhow!("no such reservation {rid}"))
            .map_err(|e| gridsim_core::TypedError::new(SystemError::NotFound, e))?;
        if !matches!(
            reservation.status,
            ReservationStatus::Committed | ReservationStatus::InProgress
        ) {
            return Err(anyhow::anyhow!(
                "reservation {rid} is not committed or in progress"
            ))
            .map_err(|e| gridsim_core::TypedError::new(SystemError::InvalidArgument, e));
        }
        let reservation_start = reservation.start_time;
        let ranges = self.reservations.consume(rid, req.num_pe, runtime)?;

        let mut job = self.core.new_job(&req, now);
        job.allocated = ranges;
        let start = reservation_start.max(now);
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
}

impl SchedulingPolicy for ArConservativeBackfill {
    fn on_submit(&mut self, req: JobRequest, now: SimTime) -> TypedResult<JobId> {
        if let Some(rid) = req.reservation_id {
            return self.submit_reservation_bound(req, rid, now);
        }
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
            if let Some(rid) = job.reservation_id {
                self.reservations.release(rid, &job.allocated.clone());
                job.transition(JobStatus::Cancelled)?;
                return Ok(());
            }
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
            if let Some(rid) = job.reservation_id {
                self.reservations.release(rid, &job.allocated);
                return Ok(());
            }
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
        let mut job = self.core.running.remove(idx);
        if let Some(rid) = job.reservation_id {
            self.reservations.release(rid, &job.allocated.clone());
        } else {
            self.core.profile.add_time_slot(
                job.start_time.unwrap_or(now),
                now,
                &job.allocated.clone(),
            );
        }
        job.actual_finish_time = Some(now);
        job.transition(JobStatus::Success)?;
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

    fn job(&self, job_id: JobId) -> Option<&Job> {
        self.core.job(job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reservation::CreateOutcome;
    use gridsim_core::types::UserId;

    fn req(num_pe: u32, length_mi: u64, rid: Option<ReservationId>) -> JobRequest {
        JobRequest {
            user_id: UserId(1),
            length_mi,
            num_pe,
            required_files: vec![],
            reservation_id: rid,
        }
    }

    #[test]
    fn reservation_bound_job_consumes_the_slab_and_starts_immediately() {
        let mut p = ArConservativeBackfill::new(PeRangeList::single(0, 9), 1, 0, 1800);
        let CreateOutcome::Booked(rid) =
            p.reservations.create(&mut p.core.profile, UserId(1), 0, 500, 10, 0)
        else {
            panic!("expected the reservation to book")
        };

        let job = p.on_submit(req(5, 100, Some(rid)), 0).unwrap();
        assert_eq!(p.job(job).unwrap().status, JobStatus::InExec);
        assert_eq!(p.reservations.get(rid).unwrap().remaining_pe, 5);
    }

    #[test]
    fn cancelling_a_reservation_bound_job_does_not_compress_ordinary_jobs() {
        let mut p = ArConservativeBackfill::new(PeRangeList::single(0, 9), 1, 0, 1800);
        let CreateOutcome::Booked(rid) =
            p.reservations.create(&mut p.core.profile, UserId(1), 0, 500, 10, 0)
        else {
            panic!("expected the reservation to book")
        };

        // All 10 PEs are reserved until t=500, so this ordinary job can't
        // start until then.
        let ordinary = p.on_submit(req(5, 100, None), 0).unwrap();
        assert_eq!(p.job(ordinary).unwrap().start_time, Some(500));

        let bound = p.on_submit(req(5, 100, Some(rid)), 0).unwrap();
        assert_eq!(p.job(bound).unwrap().status, JobStatus::InExec);

        p.on_cancel(bound, 10).unwrap();
        assert_eq!(p.job(ordinary).unwrap().start_time, Some(500));
        assert_eq!(p.reservations.get(rid).unwrap().remaining_pe, 10);
    }

    #[test]
    fn submit_against_a_not_committed_reservation_is_rejected() {
        let mut p = ArConservativeBackfill::new(PeRangeList::single(0, 9), 1, 0, 1800);
        let CreateOutcome::Booked(rid) =
            p.reservations.create(&mut p.core.profile, UserId(1), 1000, 500, 10, 0)
        else {
            panic!("expected the reservation to book")
        };
        assert!(p.on_submit(req(5, 100, Some(rid)), 0).is_err());
    }

    #[test]
    fn submit_against_an_unknown_reservation_is_rejected() {
        let mut p = ArConservativeBackfill::new(PeRangeList::single(0, 9), 1, 0, 1800);
        assert!(p.on_submit(req(5, 100, Some(ReservationId(999))), 0).is_err());
    }
}
