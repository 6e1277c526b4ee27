//! Server-side job records and their lifecycle.
use crate::error::{SystemError, TypedResult};
use crate::perange::PeRangeList;
use crate::types::{JobId, PartitionId, ReservationId, SimTime, UserId};

/// Status lifecycle of a job: `Ready -> Queued -> InExec -> (Success |
/// Failed | Cancelled)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Ready,
    Queued,
    InExec,
    Success,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Whether `next` is a legal successor of `self`.
    ///
    /// The system this is modeled after leaves transition validity
    /// unchecked, which lets a caller e.g. "finish" an already-cancelled
    /// job. gridsim makes every transition an explicit, checked operation
    /// instead.
    fn allows(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Ready, Queued)
                | (Ready, InExec)
                | (Ready, Failed)
                | (Queued, InExec)
                | (Queued, Cancelled)
                | (InExec, Success)
                | (InExec, Failed)
                | (InExec, Cancelled)
        )
    }
}

/// A request to submit a job, as carried by a `GRIDLET_SUBMIT` event.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub user_id: UserId,
    pub length_mi: u64,
    pub num_pe: u32,
    pub required_files: Vec<String>,
    pub reservation_id: Option<ReservationId>,
}

/// A job as tracked by the resource it was submitted to.
///
/// `allocated` is only non-empty while `status` is `Queued` (a reserved
/// slot) or `InExec` (a running allocation).
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub user_id: UserId,
    pub length_mi: u64,
    pub num_pe: u32,
    pub status: JobStatus,
    pub submission_time: SimTime,
    pub start_time: Option<SimTime>,
    pub actual_finish_time: Option<SimTime>,
    pub allocated: PeRangeList,
    pub partition_id: Option<PartitionId>,
    pub priority: i64,
    pub reservation_id: Option<ReservationId>,
}

impl Job {
    pub fn new(id: JobId, submission_time: SimTime, req: &JobRequest) -> Self {
        Self {
            id,
            user_id: req.user_id,
            length_mi: req.length_mi,
            num_pe: req.num_pe,
            status: JobStatus::Ready,
            submission_time,
            start_time: None,
            actual_finish_time: None,
            allocated: PeRangeList::empty(),
            partition_id: None,
            priority: 0,
            reservation_id: req.reservation_id,
        }
    }

    /// Applies a status transition, rejecting illegal ones.
    pub fn transition(&mut self, next: JobStatus) -> TypedResult<()> {
        if !self.status.allows(next) {
            return Err(anyhow::anyhow!(
                "illegal job transition {:?} -> {:?} for job {}",
                self.status,
                next,
                self.id
            ))
            .map_err(|e| crate::error::TypedError::new(SystemError::InvalidArgument, e));
        }
        self.status = next;
        if !matches!(next, JobStatus::Queued | JobStatus::InExec) {
            self.allocated = PeRangeList::empty();
        }
        Ok(())
    }
}

/// Forecast execution time in simulated-time ticks.
///
/// `runTime = max(1, ceil(length / rating))`. Callers must not assume any
/// relationship between this forecast and the job's actual run time: users
/// may deliberately overestimate `length_mi`.
pub fn forecast_execution_time(rating_mips: u32, length_mi: u64) -> SimTime {
    assert!(rating_mips > 0, "PE rating must be positive");
    let rating = rating_mips as u64;
    let runtime = (length_mi + rating - 1) / rating; // ceil div
    runtime.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forecast_is_always_at_least_one_tick() {
        assert_eq!(forecast_execution_time(100, 0), 1);
    }

    #[test]
    fn forecast_rounds_up() {
        assert_eq!(forecast_execution_time(100, 1), 1);
        assert_eq!(forecast_execution_time(100, 101), 2);
    }

    #[test]
    fn doubling_length_at_most_doubles_forecast_plus_one() {
        for rating in [1u32, 7, 100] {
            for length in [0u64, 1, 50, 999, 10_000] {
                let a = forecast_execution_time(rating, length);
                let b = forecast_execution_time(rating, length * 2);
                assert!(b <= 2 * a + 1, "rating={rating} length={length} a={a} b={b}");
            }
        }
    }

    #[test]
    fn job_transitions_through_lifecycle() {
        let req = JobRequest {
            user_id: UserId(1),
            length_mi: 100,
            num_pe: 4,
            required_files: vec![],
            reservation_id: None,
        };
        let mut job = Job::new(JobId(1), 0, &req);
        job.transition(JobStatus::Queued).unwrap();
        job.transition(JobStatus::InExec).unwrap();
        job.transition(JobStatus::Success).unwrap();
        assert_eq!(job.status, JobStatus::Success);
    }

    #[test]
    fn illegal_transition_is_rejected() {
        let req = JobRequest {
            user_id: UserId(1),
            length_mi: 100,
            num_pe: 4,
            required_files: vec![],
            reservation_id: None,
        };
        let mut job = Job::new(JobId(1), 0, &req);
        assert!(job.transition(JobStatus::Success).is_err());
    }

    #[test]
    fn allocated_ranges_clear_on_terminal_transition() {
        let req = JobRequest {
            user_id: UserId(1),
            length_mi: 100,
            num_pe: 4,
            required_files: vec![],
            reservation_id: None,
        };
        let mut job = Job::new(JobId(1), 0, &req);
        job.allocated = PeRangeList::single(0, 3);
        job.transition(JobStatus::Queued).unwrap();
        job.transition(JobStatus::Cancelled).unwrap();
        assert!(job.allocated.is_empty());
    }
}
