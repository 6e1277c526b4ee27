//! Output/input ports (spec §4.9): fragment outbound messages into
//! MTU-sized packets; reassemble inbound ones and deliver only if every
//! fragment arrived.
use std::collections::{HashMap, HashSet};

use gridsim_core::event::{EventData, EventKernel, EventTag};
use gridsim_core::types::{EntityId, ObjectId, SimTime, UserId};

use crate::packet::{EndToEndRecord, Packet};

/// An application-level message an entity wants to send, before
/// fragmentation.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub dest: EntityId,
    pub payload: Vec<u8>,
    pub size_bytes: u32,
    pub tag: EventTag,
    pub class_type: u8,
    pub object_id: ObjectId,
    pub is_file: bool,
    pub owner: UserId,
}

/// A reassembled message delivered to the owning entity.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub src: EntityId,
    pub payload: Vec<u8>,
    pub tag: EventTag,
    pub object_id: ObjectId,
    pub is_file: bool,
}

pub struct OutputPort {
    pub id: EntityId,
    pub self_id: EntityId,
    mtu_bytes: u32,
    next_pkt_id: u64,
    /// `(objectId, userId) -> notified`, Testable Property 6: at most one
    /// `GRIDLET_FAILED_BECAUSE_PACKET_DROPPED` / `FILE_FAILED_BECAUSE_...`
    /// per logical message reaches the user.
    notified: HashSet<(ObjectId, UserId)>,
}

impl OutputPort {
    pub fn new(id: EntityId, self_id: EntityId, mtu_bytes: u32) -> Self {
        Self {
            id,
            self_id,
            mtu_bytes,
            next_pkt_id: 1,
            notified: HashSet::new(),
        }
    }

    /// Fragments `msg` into `ceil(size/MTU)` packets: `numPkts - 1` empty
    /// packets plus one final packet carrying the payload, all sharing
    /// one [EndToEndRecord].
    pub fn send(&mut self, msg: OutboundMessage) -> Vec<Packet> {
        let num_pkts = msg.size_bytes.div_ceil(self.mtu_bytes).max(1);
        let end_to_end = EndToEndRecord {
            src: self.self_id,
            dest: msg.dest,
            class_type: msg.class_type,
            total_pkts: num_pkts,
            object_id: msg.object_id,
            is_file: msg.is_file,
            owner: msg.owner,
        };

        (0..num_pkts)
            .map(|i| {
                let is_last = i + 1 == num_pkts;
                Packet {
                    payload: if is_last { msg.payload.clone() } else { Vec::new() },
                    size_bytes: self.mtu_bytes.min(msg.size_bytes - i * self.mtu_bytes),
                    tag: msg.tag,
                    src: self.self_id,
                    dest: msg.dest,
                    last_hop: self.self_id,
                    pkt_id: self.fresh_pkt_id(),
                    pkt_index: i,
                    total_pkts: num_pkts,
                    end_to_end,
                }
            })
            .collect()
    }

    fn fresh_pkt_id(&mut self) -> u64 {
        let id = self.next_pkt_id;
        self.next_pkt_id += 1;
        id
    }

    /// Handles a `PACKET_DROPPED` side-channel event, translating it into
    /// a user-facing failure event the first time it's seen for this
    /// `(objectId, userId)` pair; subsequent drops of the same message
    /// are silently absorbed.
    pub fn on_packet_dropped(
        &mut self,
        object_id: ObjectId,
        is_file: bool,
        owner: UserId,
        kernel: &dyn EventKernel,
    ) {
        if !self.notified.insert((object_id, owner)) {
            return;
        }
        let tag = if is_file {
            EventTag::FileFailedBecausePacketDropped
        } else {
            EventTag::GridletFailedBecausePacketDropped
        };
        kernel.schedule(
            self.self_id,
            gridsim_core::event::SCHEDULE_NOW,
            tag,
            EventData::boxed(object_id),
        );
    }
}

#[derive(Debug, Default)]
struct ReassemblyState {
    expected_total: u32,
    arrived: u32,
    payload: Option<Vec<u8>>,
    tag: Option<EventTag>,
    is_file: bool,
}

/// Per-message reassembly, keyed by `(src, objectId)` (spec §4.9).
pub struct InputPort {
    pub self_id: EntityId,
    table: HashMap<(EntityId, ObjectId), ReassemblyState>,
}

impl InputPort {
    pub fn new(self_id: EntityId) -> Self {
        Self {
            self_id,
            table: HashMap::new(),
        }
    }

    /// Folds `pkt` into its message's reassembly state. Delivers the
    /// message only when the payload-carrying (last) fragment has arrived
    /// and every fragment has been accounted for; a corrupted (partial)
    /// message is silently discarded (Testable Property 7).
    pub fn receive(&mut self, pkt: Packet, now: SimTime) -> Option<InboundMessage> {
        let _ = now;
        let key = (pkt.src, pkt.end_to_end.object_id);
        let state = self.table.entry(key).or_insert_with(|| ReassemblyState {
            expected_total: pkt.end_to_end.total_pkts,
            ..Default::default()
        });
        state.arrived += 1;
        if pkt.is_last_fragment() {
            state.payload = Some(pkt.payload);
            state.tag = Some(pkt.tag);
            state.is_file = pkt.end_to_end.is_file;
        }

        if state.arrived < state.expected_total {
            return None;
        }

        let state = self.table.remove(&key).expect("just inserted above");
        let payload = state.payload?;
        Some(InboundMessage {
            src: pkt.src,
            payload,
            tag: state.tag.expect("last fragment sets tag before delivery"),
            object_id: key.1,
            is_file: state.is_file,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridsim_core::types::{EntityId, UserId};

    fn sender(mtu: u32) -> OutputPort {
        OutputPort::new(EntityId(1), EntityId(1), mtu)
    }

    #[test]
    fn send_fragments_into_mtu_sized_chunks_with_payload_last() {
        let mut port = sender(100);
        let pkts = port.send(OutboundMessage {
            dest: EntityId(2),
            payload: vec![7; 50],
            size_bytes: 250,
            tag: EventTag::SendPacket,
            class_type: 0,
            object_id: ObjectId(1),
            is_file: false,
            owner: UserId(1),
        });
        assert_eq!(pkts.len(), 3);
        assert!(pkts[0].payload.is_empty());
        assert!(pkts[1].payload.is_empty());
        assert_eq!(pkts[2].payload, vec![7; 50]);
        assert!(pkts.iter().all(|p| p.total_pkts == 3));
    }

    #[test]
    fn s7_reassembly_delivers_only_once_all_fragments_arrive() {
        let mut port = InputPort::new(EntityId(2));
        let mut sender = sender(100);
        let pkts = sender.send(OutboundMessage {
            dest: EntityId(2),
            payload: vec![1, 2, 3],
            size_bytes: 250,
            tag: EventTag::SendPacket,
            class_type: 0,
            object_id: ObjectId(5),
            is_file: false,
            owner: UserId(1),
        });
        assert!(port.receive(pkts[0].clone(), 0).is_none());
        assert!(port.receive(pkts[1].clone(), 0).is_none());
        let msg = port.receive(pkts[2].clone(), 0).unwrap();
        assert_eq!(msg.payload, vec![1, 2, 3]);
    }

    #[test]
    fn a_message_missing_a_fragment_is_silently_discarded() {
        let mut port = InputPort::new(EntityId(2));
        let mut sender = sender(100);
        let pkts = sender.send(OutboundMessage {
            dest: EntityId(2),
            payload: vec![1, 2, 3],
            size_bytes: 250,
            tag: EventTag::SendPacket,
            class_type: 0,
            object_id: ObjectId(5),
            is_file: false,
            owner: UserId(1),
        });
        // Fragment 1 (index 1) is dropped in transit; only 0 and 2 arrive.
        assert!(port.receive(pkts[0].clone(), 0).is_none());
        assert!(port.receive(pkts[2].clone(), 0).is_none());
        assert!(port.table.is_empty() || port.table.values().all(|s| s.arrived < s.expected_total));
    }

    #[test]
    fn drop_notice_is_deduplicated_per_object_and_user() {
        struct NullKernel;
        impl EventKernel for NullKernel {
            fn schedule(&self, _: EntityId, _: SimTime, _: EventTag, _: EventData) {}
            fn clock(&self) -> SimTime {
                0
            }
        }
        let mut port = sender(100);
        let kernel = NullKernel;
        port.on_packet_dropped(ObjectId(9), false, UserId(1), &kernel);
        assert!(port.notified.contains(&(ObjectId(9), UserId(1))));
        port.on_packet_dropped(ObjectId(9), false, UserId(1), &kernel);
        assert_eq!(port.notified.len(), 1);
    }
}
