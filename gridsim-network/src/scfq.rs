//! Self-clocked fair queueing (spec §4.7): one flow per `(src, dest,
//! classType)` triple, each weighted by `class_weights[classType]`.
use std::collections::HashMap;

use gridsim_core::types::EntityId;

use crate::packet::Packet;

type FlowKey = (EntityId, EntityId, u8);

#[derive(Debug)]
pub struct ScfqQueue {
    /// Kept sorted ascending by finish tag; the head is the next packet
    /// SCFQ would dequeue.
    entries: Vec<(f64, Packet)>,
    flow_last_finish: HashMap<FlowKey, f64>,
    class_weights: Vec<f64>,
    /// The finish tag of the most recently dequeued packet (`CF`).
    cf: f64,
}

impl ScfqQueue {
    pub fn new(class_weights: Vec<f64>) -> Self {
        Self {
            entries: Vec::new(),
            flow_last_finish: HashMap::new(),
            class_weights,
            cf: 0.0,
        }
    }

    fn weight_of(&self, class_type: u8) -> f64 {
        self.class_weights
            .get(class_type as usize)
            .copied()
            .unwrap_or(1.0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `pktTime = (prevFlowTime >= CF ? prevFlowTime : CF) + size/weight`.
    /// Returns the packet's finish tag.
    pub fn enqueue(&mut self, pkt: Packet) -> f64 {
        let key = (pkt.src, pkt.dest, pkt.end_to_end.class_type);
        let weight = self.weight_of(pkt.end_to_end.class_type);
        let prev_flow_time = self.flow_last_finish.get(&key).copied().unwrap_or(0.0);
        let start = if prev_flow_time >= self.cf {
            prev_flow_time
        } else {
            self.cf
        };
        let pkt_time = start + pkt.size_bytes as f64 / weight;
        self.flow_last_finish.insert(key, pkt_time);

        let pos = self.entries.partition_point(|(tag, _)| *tag <= pkt_time);
        self.entries.insert(pos, (pkt_time, pkt));
        pkt_time
    }

    /// Pops the head (lowest finish tag) and sets `CF` to its tag.
    pub fn dequeue(&mut self) -> Option<Packet> {
        if self.entries.is_empty() {
            return None;
        }
        let (tag, pkt) = self.entries.remove(0);
        self.cf = tag;
        Some(pkt)
    }

    /// Used by the whitelist rescue path: removes and returns the
    /// earliest-tagged entry for which `pred` holds.
    pub fn evict_first_matching(&mut self, pred: impl Fn(&Packet) -> bool) -> Option<Packet> {
        let idx = self.entries.iter().position(|(_, p)| pred(p))?;
        Some(self.entries.remove(idx).1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridsim_core::event::EventTag;
    use gridsim_core::types::ObjectId;

    fn pkt(src: u64, dest: u64, size: u32) -> Packet {
        Packet {
            payload: vec![],
            size_bytes: size,
            tag: EventTag::SendPacket,
            src: EntityId(src),
            dest: EntityId(dest),
            last_hop: EntityId(src),
            pkt_id: 0,
            pkt_index: 0,
            total_pkts: 1,
            end_to_end: crate::packet::EndToEndRecord {
                src: EntityId(src),
                dest: EntityId(dest),
                class_type: 0,
                total_pkts: 1,
                object_id: ObjectId(1),
                is_file: false,
                owner: gridsim_core::types::UserId(1),
            },
        }
    }

    #[test]
    fn fifo_order_within_a_single_flow() {
        let mut q = ScfqQueue::new(vec![1.0]);
        q.enqueue(pkt(1, 2, 100));
        q.enqueue(pkt(1, 2, 100));
        q.enqueue(pkt(1, 2, 100));
        let a = q.dequeue().unwrap();
        let b = q.dequeue().unwrap();
        assert!(a.src == b.src);
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn dequeue_returns_none_when_empty() {
        let mut q = ScfqQueue::new(vec![1.0]);
        assert!(q.dequeue().is_none());
    }

    #[test]
    fn eviction_skips_whitelisted_packets() {
        let mut q = ScfqQueue::new(vec![1.0]);
        q.enqueue(pkt(1, 2, 100));
        q.enqueue(pkt(3, 4, 100));
        let evicted = q.evict_first_matching(|p| p.src == EntityId(3)).unwrap();
        assert_eq!(evicted.src, EntityId(3));
        assert_eq!(q.len(), 1);
    }
}
