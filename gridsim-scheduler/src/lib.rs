//! Parallel job allocation policies and the advance-reservation state
//! machine: conservative backfilling, aggressive (EASY) backfilling,
//! aggressive multi-partition backfilling, selective backfilling, and an
//! advance-reservation-aware conservative backfiller, all driven by the
//! availability profile in `gridsim-core`.
pub mod aggressive;
pub mod ar_conservative;
pub mod conservative;
pub mod multi_partition;
pub mod policy;
pub mod reservation;
pub mod selective;

pub use aggressive::AggressiveBackfill;
pub use ar_conservative::ArConservativeBackfill;
pub use conservative::ConservativeBackfill;
pub use multi_partition::{MultiPartitionBackfill, MultiPartitionConfig, PrioritySelector};
pub use policy::{BackfillCore, SchedulingPolicy};
pub use reservation::{Reservation, ReservationManager, ReservationStatus};
pub use selective::SelectiveBackfill;
