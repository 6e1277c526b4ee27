//! Identifiers and the simulated-time type shared across gridsim crates.
use std::fmt;

/// Simulated time, in integer ticks.
///
/// The source this toolkit is modeled after compares simulated-time floats
/// with `==` in several places, which is fragile once delays compound
/// through arithmetic. gridsim sidesteps the question entirely by using
/// integer ticks for time instead of floating point, so exact equality is
/// always well defined.
pub type SimTime = u64;

macro_rules! newtype_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(v: u64) -> Self {
                Self(v)
            }
        }
    };
}

newtype_id!(JobId);
newtype_id!(UserId);
newtype_id!(ReservationId);
newtype_id!(PartitionId);
newtype_id!(EntityId);
newtype_id!(LinkId);
/// Identifies one logical message (a job's packets, a file transfer's
/// packets) across fragmentation/reassembly and drop-notification dedup.
newtype_id!(ObjectId);
