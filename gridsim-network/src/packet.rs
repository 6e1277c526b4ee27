//! Wire packets and the end-to-end record shared by every fragment of one
//! logical message (spec §3 "Packet").
use gridsim_core::event::EventTag;
use gridsim_core::types::{EntityId, ObjectId, UserId};

/// Carried once per logical message and copied onto every packet split
/// from it, so a router or drop discipline can act on the whole message's
/// identity without reassembling it first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndToEndRecord {
    pub src: EntityId,
    pub dest: EntityId,
    pub class_type: u8,
    pub total_pkts: u32,
    pub object_id: ObjectId,
    pub is_file: bool,
    /// The user to notify on an unrecoverable drop (spec §4.7 "the source
    /// user receives exactly one drop notification").
    pub owner: UserId,
}

/// One network-carried fragment (spec §3 "Packet"). `payload` is non-empty
/// only on the last fragment of a message (spec §4.9); earlier fragments
/// are "empty packets" carrying only the shared [EndToEndRecord].
#[derive(Debug, Clone)]
pub struct Packet {
    pub payload: Vec<u8>,
    pub size_bytes: u32,
    pub tag: EventTag,
    pub src: EntityId,
    pub dest: EntityId,
    pub last_hop: EntityId,
    pub pkt_id: u64,
    pub pkt_index: u32,
    pub total_pkts: u32,
    pub end_to_end: EndToEndRecord,
}

impl Packet {
    pub fn is_last_fragment(&self) -> bool {
        self.pkt_index + 1 == self.total_pkts
    }

    /// Junk/background-traffic packets are exempt from drop notification
    /// (spec §4.7: "On every drop (except for junk/background-traffic
    /// packets)...").
    pub fn is_junk(&self) -> bool {
        matches!(self.tag, EventTag::JunkPkt)
    }
}
