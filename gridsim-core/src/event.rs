//! The event tag taxonomy: the stable wire format carried by every event
//! the external discrete-event kernel schedules between entities.
//!
//! This enum is copied verbatim from the toolkit's interface contract and
//! must not be reordered or renamed — it is consumed by [crate::context]'s
//! dispatch glue and by every downstream crate's handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventTag {
    // Lifecycle
    EndOfSimulation,
    Insignificant,

    // Job
    GridletSubmit,
    GridletSubmitAck,
    GridletCancel,
    GridletReturn,
    GridletStatus,
    GridletMove,
    GridletPause,
    GridletResume,

    // Reservation
    ResCreate,
    ResCommit,
    ResCancel,
    ResQuery,
    ResStatus,
    ResModify,

    // Data grid
    FileAddMaster,
    FileAddMasterResult,
    FileAddReplica,
    FileAddReplicaResult,
    FileDeleteMaster,
    FileDeleteReplica,
    FileRequest,
    FileDelivery,
    CtlgAddMaster,
    CtlgAddReplica,
    CtlgGetReplica,
    CtlgReplicaDelivery,
    CtlgDeleteMaster,
    CtlgDeleteReplica,
    CtlgFileAttrDelivery,
    CtlgFilter,

    // Network
    PktForward,
    EmptyPkt,
    JunkPkt,
    SendPacket,
    RouterAd,
    PacketDropped,
    GridletFailedBecausePacketDropped,
    FileFailedBecausePacketDropped,

    // Index / grid information service
    InquiryRegionalGis,
    InquiryLocalResourceList,
    InquiryLocalResourceArList,
    InquiryGlobalResourceList,
    InquiryGlobalResourceArList,
    InquiryLocalRcList,
    InquiryGlobalRcList,
}

/// Sentinel delay for self-events that must run after all currently
/// pending events at the same simulated time (`SCHEDULE_NOW`).
pub const SCHEDULE_NOW: crate::types::SimTime = 0;

/// The interface of the external discrete-event kernel. gridsim never
/// implements this trait, only consumes it: the kernel itself (and
/// `waitNext`/`clock` suspension points) are out of scope collaborators.
pub trait EventKernel {
    fn schedule(&self, dest: crate::types::EntityId, delay: crate::types::SimTime, tag: EventTag, data: EventData);
    fn clock(&self) -> crate::types::SimTime;
}

/// Opaque event payload. Concrete event data types live in the crate that
/// owns the handler (job requests in `gridsim-scheduler`, packets in
/// `gridsim-network`, file events in `gridsim-datagrid`); this indirection
/// lets [EventKernel] stay generic over all of them.
pub enum EventData {
    None,
    Boxed(Box<dyn std::any::Any + Send>),
}

impl EventData {
    pub fn boxed<T: std::any::Any + Send>(value: T) -> Self {
        EventData::Boxed(Box::new(value))
    }

    pub fn downcast<T: std::any::Any>(self) -> Option<Box<T>> {
        match self {
            EventData::Boxed(b) => b.downcast::<T>().ok(),
            EventData::None => None,
        }
    }
}
