//! The advance-reservation state machine (spec §4.5): create, commit,
//! expire, start, finish and cancel a slab of PEs booked in an
//! [AvailabilityProfile], plus read-only queries.
use std::collections::HashMap;

use gridsim_core::perange::PeRangeList;
use gridsim_core::profile::{AvailabilityProfile, ProfileEntry, TimeSlot};
use gridsim_core::types::{ReservationId, SimTime, UserId};
use gridsim_core::{ResultExt, SystemError, TypedResult};

/// `REQUESTED -> NOT_COMMITTED -> COMMITTED -> IN_PROGRESS -> FINISHED`,
/// with failure transitions to `FAILED`/`CANCELLED`/`EXPIRED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationStatus {
    NotCommitted,
    Committed,
    InProgress,
    Finished,
    Cancelled,
    Expired,
}

#[derive(Debug, Clone)]
pub struct Reservation {
    pub id: ReservationId,
    pub user_id: UserId,
    pub start_time: SimTime,
    pub duration: SimTime,
    pub num_pe: u32,
    pub status: ReservationStatus,
    pub expiry_time: SimTime,
    /// The full slab booked in the profile for `[start_time, start_time+duration)`.
    pub allocated: PeRangeList,
    pub remaining_pe: u32,
    pub remaining_time: SimTime,
    /// The currently-unconsumed subset of `allocated`; jobs bound to this
    /// reservation draw PEs from here rather than from `allocated` itself,
    /// which must stay intact for profile release on cancel/expiry.
    free_within: PeRangeList,
}

/// On a failed [ReservationManager::create], the caller-offered
/// alternative time windows (spec: "attach alternative time slots").
pub enum CreateOutcome {
    Booked(ReservationId),
    Rejected { alternatives: Vec<TimeSlot> },
}

pub struct ReservationManager {
    reservations: HashMap<ReservationId, Reservation>,
    next_id: u64,
    commit_period: SimTime,
}

impl ReservationManager {
    /// `commit_period`: the default reservation commit window (spec §6
    /// default 1800s).
    pub fn new(commit_period: SimTime) -> Self {
        Self {
            reservations: HashMap::new(),
            next_id: 1,
            commit_period,
        }
    }

    pub fn get(&self, id: ReservationId) -> Option<&Reservation> {
        self.reservations.get(&id)
    }

    /// Books `(num_pe, start_time, duration)` in `profile` if possible.
    /// `NOT_COMMITTED` with an expiry at `min(start_time, now + commitPeriod)`,
    /// or straight to `COMMITTED` if `start_time == now`.
    pub fn create(
        &mut self,
        profile: &mut AvailabilityProfile,
        user_id: UserId,
        start_time: SimTime,
        duration: SimTime,
        num_pe: u32,
        now: SimTime,
    ) -> CreateOutcome {
        match profile.check_availability(num_pe, start_time, duration) {
            Some(entry) if entry.avail.count() >= num_pe => {
                let ranges = entry
                    .avail
                    .select(num_pe)
                    .expect("checked above that enough PEs are available");
                profile.allocate(&ranges, start_time, start_time + duration);

                let id = ReservationId(self.next_id);
                self.next_id += 1;
                let status = if start_time == now {
                    ReservationStatus::Committed
                } else {
                    ReservationStatus::NotCommitted
                };
                let reservation = Reservation {
                    id,
                    user_id,
                    start_time,
                    duration,
                    num_pe,
                    status,
                    expiry_time: start_time.min(now.saturating_add(self.commit_period)),
                    allocated: ranges.clone(),
                    remaining_pe: num_pe,
                    remaining_time: duration,
                    free_within: ranges,
                };
                self.reservations.insert(id, reservation);
                CreateOutcome::Booked(id)
            }
            _ => CreateOutcome::Rejected {
                alternatives: profile.get_time_slots(start_time, SimTime::MAX / 2),
            },
        }
    }

    /// `NOT_COMMITTED -> COMMITTED`.
    pub fn commit(&mut self, id: ReservationId) -> TypedResult<()> {
        let r = self
            .reservations
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("no such reservation {id}"))
            .typ(SystemError::NotFound)?;
        if r.status != ReservationStatus::NotCommitted {
            return Err(anyhow::anyhow!(
                "reservation {id} is not NOT_COMMITTED (is {:?})",
                r.status
            ))
            .typ(SystemError::InvalidArgument);
        }
        r.status = ReservationStatus::Committed;
        Ok(())
    }

    /// The periodic expiry self-event: cancels every `NOT_COMMITTED`
    /// reservation whose `expiry_time <= now`, returning its slab to
    /// `profile`. Returns the ids that expired, for the caller to
    /// compress the waiting-job schedule against (Testable Property 8).
    pub fn expire_sweep(&mut self, profile: &mut AvailabilityProfile, now: SimTime) -> Vec<ReservationId> {
        let mut expired = Vec::new();
        for (id, r) in self.reservations.iter_mut() {
            if r.status == ReservationStatus::NotCommitted && r.expiry_time <= now {
                profile.add_time_slot(r.start_time, r.start_time + r.duration, &r.allocated);
                r.status = ReservationStatus::Cancelled;
                expired.push(*id);
            }
        }
        expired
    }

    /// `COMMITTED -> IN_PROGRESS`, called when the reservation's
    /// `start_time` event fires.
    pub fn start(&mut self, id: ReservationId) -> TypedResult<()> {
        let r = self
            .reservations
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("no such reservation {id}"))
            .typ(SystemError::NotFound)?;
        if r.status != ReservationStatus::Committed {
            return Err(anyhow::anyhow!(
                "reservation {id} is not COMMITTED (is {:?})",
                r.status
            ))
            .typ(SystemError::InvalidArgument);
        }
        r.status = ReservationStatus::InProgress;
        Ok(())
    }

    /// `IN_PROGRESS -> FINISHED`. Bound jobs still queued against this
    /// reservation are the caller's (`ArConservativeBackfill`'s)
    /// responsibility to cancel.
    pub fn finish(&mut self, id: ReservationId) -> TypedResult<()> {
        let r = self
            .reservations
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("no such reservation {id}"))
            .typ(SystemError::NotFound)?;
        r.status = ReservationStatus::Finished;
        Ok(())
    }

    /// User-initiated cancel, permitted in any non-terminal state.
    /// Returns the slab to `profile`.
    pub fn cancel(&mut self, profile: &mut AvailabilityProfile, id: ReservationId) -> TypedResult<()> {
        let r = self
            .reservations
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("no such reservation {id}"))
            .typ(SystemError::NotFound)?;
        if matches!(
            r.status,
            ReservationStatus::Finished | ReservationStatus::Cancelled | ReservationStatus::Expired
        ) {
            return Err(anyhow::anyhow!("reservation {id} is already terminal"))
                .typ(SystemError::InvalidArgument);
        }
        profile.add_time_slot(r.start_time, r.start_time + r.duration, &r.allocated);
        r.status = ReservationStatus::Cancelled;
        Ok(())
    }

    /// Consumes `num_pe` PEs from reservation `id`'s slab for `duration`,
    /// validating it exists, is committed or in progress, and has enough
    /// PEs and time remaining.
    pub fn consume(&mut self, id: ReservationId, num_pe: u32, duration: SimTime) -> TypedResult<PeRangeList> {
        let r = self
            .reservations
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("no such reservation {id}"))
            .typ(SystemError::NotFound)?;
        if !matches!(r.status, ReservationStatus::Committed | ReservationStatus::InProgress) {
            return Err(anyhow::anyhow!(
                "reservation {id} is not committed or in progress (is {:?})",
                r.status
            ))
            .typ(SystemError::InvalidArgument);
        }
        if duration > r.remaining_time {
            return Err(anyhow::anyhow!(
                "reservation {id} has {} ticks remaining, job needs {duration}",
                r.remaining_time
            ))
            .typ(SystemError::CapacityExhausted);
        }
        let ranges = r
            .free_within
            .select(num_pe)
            .map_err(|e| anyhow::anyhow!("{e}"))
            .typ(SystemError::CapacityExhausted)?;
        r.free_within = r.free_within.remove(&ranges);
        r.remaining_pe = r.free_within.count();
        Ok(ranges)
    }

    /// Returns `ranges` to reservation `id`'s available slab (e.g. on job
    /// completion or cancellation).
    pub fn release(&mut self, id: ReservationId, ranges: &PeRangeList) {
        if let Some(r) = self.reservations.get_mut(&id) {
            r.free_within = r.free_within.merge(ranges);
            r.remaining_pe = r.free_within.count();
        }
    }

    pub fn query_availability(
        &self,
        profile: &AvailabilityProfile,
        num_pe: u32,
        start: SimTime,
        duration: SimTime,
    ) -> Option<ProfileEntry> {
        profile.check_availability(num_pe, start, duration)
    }

    pub fn query_reservation(&self, id: ReservationId) -> Option<&Reservation> {
        self.reservations.get(&id)
    }

    /// Unsupported (spec §4.5: "modify... is unsupported").
    pub fn modify_reservation(&mut self, _id: ReservationId) -> TypedResult<()> {
        Err(anyhow::anyhow!("reservation modification is not supported"))
            .typ(SystemError::PolicyUnsupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridsim_core::perange::PeId;

    fn full(n: PeId) -> PeRangeList {
        PeRangeList::single(0, n - 1)
    }

    #[test]
    fn create_books_a_slab_and_starts_not_committed() {
        let mut profile = AvailabilityProfile::new(full(100), 0);
        let mut mgr = ReservationManager::new(1800);
        let outcome = mgr.create(&mut profile, UserId(1), 1000, 500, 200, 0);
        let CreateOutcome::Booked(id) = outcome else {
            panic!("expected booking to succeed")
        };
        assert_eq!(mgr.get(id).unwrap().status, ReservationStatus::NotCommitted);
        assert!(profile.check_availability(200, 1000, 500).is_none());
    }

    #[test]
    fn create_at_now_commits_immediately() {
        let mut profile = AvailabilityProfile::new(full(100), 0);
        let mut mgr = ReservationManager::new(1800);
        let CreateOutcome::Booked(id) = mgr.create(&mut profile, UserId(1), 0, 500, 50, 0) else {
            panic!()
        };
        assert_eq!(mgr.get(id).unwrap().status, ReservationStatus::Committed);
    }

    #[test]
    fn failed_create_offers_alternative_slots() {
        let mut profile = AvailabilityProfile::new(full(10), 0);
        let mut mgr = ReservationManager::new(1800);
        let CreateOutcome::Rejected { alternatives } = mgr.create(&mut profile, UserId(1), 0, 100, 20, 0)
        else {
            panic!("expected rejection")
        };
        assert!(!alternatives.is_empty());
    }

    #[test]
    fn s8_expiry_cancels_and_returns_the_slab() {
        let mut profile = AvailabilityProfile::new(full(100), 0);
        let mut mgr = ReservationManager::new(100);
        let CreateOutcome::Booked(id) = mgr.create(&mut profile, UserId(1), 1000, 500, 50, 0) else {
            panic!()
        };
        assert_eq!(mgr.get(id).unwrap().expiry_time, 100);

        let expired = mgr.expire_sweep(&mut profile, 100);
        assert_eq!(expired, vec![id]);
        assert_eq!(mgr.get(id).unwrap().status, ReservationStatus::Cancelled);
        assert!(profile.check_availability(100, 1000, 500).is_some());

        // Idempotent: a second sweep does not re-expire it.
        assert!(mgr.expire_sweep(&mut profile, 200).is_empty());
    }

    #[test]
    fn consume_draws_from_the_slab_and_tracks_remaining_pe() {
        let mut profile = AvailabilityProfile::new(full(100), 0);
        let mut mgr = ReservationManager::new(1800);
        let CreateOutcome::Booked(id) = mgr.create(&mut profile, UserId(1), 0, 500, 50, 0) else {
            panic!()
        };
        let ranges = mgr.consume(id, 20, 100).unwrap();
        assert_eq!(ranges.count(), 20);
        assert_eq!(mgr.get(id).unwrap().remaining_pe, 30);

        mgr.release(id, &ranges);
        assert_eq!(mgr.get(id).unwrap().remaining_pe, 50);
    }

    #[test]
    fn consume_rejects_when_not_enough_pes_remain() {
        let mut profile = AvailabilityProfile::new(full(10), 0);
        let mut mgr = ReservationManager::new(1800);
        let CreateOutcome::Booked(id) = mgr.create(&mut profile, UserId(1), 0, 500, 5, 0) else {
            panic!()
        };
        assert!(mgr.consume(id, 10, 100).is_err());
    }

    #[test]
    fn modify_is_unsupported() {
        let mut mgr = ReservationManager::new(1800);
        assert_eq!(
            mgr.modify_reservation(ReservationId(1)).unwrap_err().err(),
            SystemError::PolicyUnsupported
        );
    }
}
