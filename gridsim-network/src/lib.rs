//! FNB packet scheduling, distance-vector routing, and fragmentation/
//! reassembly ports for the gridsim toolkit (spec §4.7-§4.9).
pub mod drop_discipline;
pub mod packet;
pub mod port;
pub mod router;
pub mod scfq;
pub mod scheduler;

pub use drop_discipline::{Admit, Ared, AredConfig, AredThresholds, DropDiscipline, DropStatsSnapshot, FifoThreshold, LinkParams, Red};
pub use packet::{EndToEndRecord, Packet};
pub use port::{InboundMessage, InputPort, OutboundMessage, OutputPort};
pub use router::{RouteEntry, Router, RouterAd, RoutingTable, ScheduledSend, MAX_HOP_COUNT};
pub use scfq::ScfqQueue;
pub use scheduler::{BufferStatsRow, DroppedPktsRow, EnqueueOutcome, MaxBufferSizeRow, PacketDroppedNotice, PacketScheduler, StatsSink};
