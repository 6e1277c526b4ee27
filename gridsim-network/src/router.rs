//! The FNB router (spec §4.8): distance-vector routing plus per-link
//! packet schedulers and fragmentation/forwarding.
use std::collections::{HashMap, HashSet};

use gridsim_core::context::SimContext;
use gridsim_core::event::{EventData, EventKernel, EventTag, SCHEDULE_NOW};
use gridsim_core::types::{EntityId, LinkId, SimTime};
use gridsim_core::TypedResult;

use crate::packet::Packet;
use crate::scheduler::{EnqueueOutcome, PacketScheduler};

/// The greatest hop count a route is allowed to accumulate before it is
/// considered unreachable (spec §4.8: "routes whose hop count would
/// exceed `MAX_HOP_COUNT` are rejected, not wrapped").
pub const MAX_HOP_COUNT: u32 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteEntry {
    pub link: LinkId,
    pub hop_count: u32,
    pub next_router: Option<EntityId>,
}

pub type RoutingTable = HashMap<EntityId, RouteEntry>;

/// A distance-vector advertisement: destination, hop-count pairs this
/// router is willing to vouch for.
#[derive(Debug, Clone)]
pub struct RouterAd {
    pub entries: Vec<(EntityId, u32)>,
}

/// What the caller must do in response to a [Router::forward] call: a
/// self-event request to dequeue from `link` after `delay_ticks`, raised
/// only on the idle -> busy transition (spec §4.8).
#[derive(Debug, Clone, Copy)]
pub struct ScheduledSend {
    pub link: LinkId,
    pub delay_ticks: SimTime,
}

/// Tracks one packet's link-local MTU fragments until every one of them
/// has been dequeued (or dropped), so [Router::on_link_tick] can hand the
/// original, unfragmented packet onward rather than leaking the per-hop
/// split into the rest of the path.
struct PendingReassembly {
    template: Packet,
    total: u32,
    dequeued: u32,
    lost: bool,
}

pub struct Router {
    pub self_id: EntityId,
    /// Which link reaches each directly-attached neighbour.
    link_table: HashMap<EntityId, LinkId>,
    schedulers: HashMap<LinkId, PacketScheduler>,
    routing: RoutingTable,
    /// Hosts directly attached to this router (distance 0, no next hop).
    hosts: HashSet<EntityId>,
    baud_rate_bps: HashMap<LinkId, f64>,
    mtu_bytes: HashMap<LinkId, u32>,
    /// Keyed by `(link, pkt_id)`: one entry per packet currently being
    /// re-fragmented for transmission over that link.
    pending_fragments: HashMap<(LinkId, u64), PendingReassembly>,
}

impl Router {
    pub fn new(self_id: EntityId) -> Self {
        Self {
            self_id,
            link_table: HashMap::new(),
            schedulers: HashMap::new(),
            routing: HashMap::new(),
            hosts: HashSet::new(),
            baud_rate_bps: HashMap::new(),
            mtu_bytes: HashMap::new(),
            pending_fragments: HashMap::new(),
        }
    }

    /// Attaches a neighbour router or host reachable over `link`, whose
    /// MTU bounds how large a packet `forward` may hand to this link's
    /// scheduler unfragmented (spec §4.8 "per-hop MTU fragmentation").
    pub fn attach_link(
        &mut self,
        neighbour: EntityId,
        link: LinkId,
        scheduler: PacketScheduler,
        baud_rate_bps: f64,
        mtu_bytes: u32,
    ) {
        self.link_table.insert(neighbour, link);
        self.schedulers.insert(link, scheduler);
        self.baud_rate_bps.insert(link, baud_rate_bps);
        self.mtu_bytes.insert(link, mtu_bytes);
    }

    /// Registers `host` as directly reachable over `link` at distance 0.
    pub fn add_host(&mut self, host: EntityId, link: LinkId) {
        self.hosts.insert(host);
        self.routing.insert(
            host,
            RouteEntry {
                link,
                hop_count: 0,
                next_router: None,
            },
        );
    }

    pub fn routing_table(&self) -> &RoutingTable {
        &self.routing
    }

    pub fn scheduler_mut(&mut self, link: LinkId) -> Option<&mut PacketScheduler> {
        self.schedulers.get_mut(&link)
    }

    /// Builds the advertisement this router sends to its neighbours: every
    /// destination it currently believes it can reach, with its own hop
    /// count (split-horizon is applied by the caller per-neighbour via
    /// [Router::on_advertisement]'s return value, not here).
    pub fn advertise(&self) -> RouterAd {
        RouterAd {
            entries: self
                .routing
                .iter()
                .map(|(dest, entry)| (*dest, entry.hop_count))
                .collect(),
        }
    }

    /// Folds a neighbour's advertisement into the routing table
    /// (Bellman-Ford relaxation). Returns the subset of entries that
    /// changed, paired with the link reaching `from` — not for
    /// re-advertisement to `from` itself (standard split-horizon), but the
    /// caller is expected to forward these to every *other* neighbour.
    pub fn on_advertisement(&mut self, from: EntityId, ad: RouterAd) -> Vec<(EntityId, u32)> {
        let Some(&link) = self.link_table.get(&from) else {
            return Vec::new();
        };

        let mut changed = Vec::new();
        for (dest, hop_count) in ad.entries {
            if dest == self.self_id {
                continue;
            }
            let candidate_hops = hop_count + 1;
            if candidate_hops > MAX_HOP_COUNT {
                continue;
            }
            let improves = match self.routing.get(&dest) {
                None => true,
                Some(existing) => {
                    candidate_hops < existing.hop_count
                        || (existing.next_router == Some(from) && candidate_hops != existing.hop_count)
                }
            };
            if !improves {
                continue;
            }
            self.routing.insert(
                dest,
                RouteEntry {
                    link,
                    hop_count: candidate_hops,
                    next_router: Some(from),
                },
            );
            changed.push((dest, candidate_hops));
        }
        changed
    }

    /// Looks up the outgoing link for `dest` and enqueues `pkt` on that
    /// link's scheduler. If `pkt` is larger than the link's MTU it is
    /// split into `⌈size/MTU⌉` chunks the same way [crate::port::OutputPort::send]
    /// fragments an outbound message, each chunk queued (and subject to
    /// the drop discipline) individually; the original packet is handed
    /// to the next hop only once every chunk has cleared this link (see
    /// [Router::on_link_tick]), so the per-hop split never leaks past this
    /// one link. Returns a [ScheduledSend] the caller must turn into a
    /// self-event — on the idle -> busy transition only (spec §4.8:
    /// "schedule its own dequeue event after `size*8/baudRate` ticks, but
    /// only when the link was previously idle").
    pub fn forward(
        &mut self,
        pkt: Packet,
        now: SimTime,
        ctx: &SimContext,
        kernel: &dyn EventKernel,
    ) -> TypedResult<Option<ScheduledSend>> {
        let Some(route) = self.routing.get(&pkt.dest) else {
            return Ok(None);
        };
        let link = route.link;
        let baud_rate = self.baud_rate_bps.get(&link).copied().unwrap_or(1.0);
        let mtu = self.mtu_bytes.get(&link).copied().unwrap_or(u32::MAX).max(1);
        let Some(scheduler) = self.schedulers.get_mut(&link) else {
            return Ok(None);
        };

        let was_idle = scheduler.is_idle();
        let pkt_id = pkt.pkt_id;
        let num_chunks = pkt.size_bytes.div_ceil(mtu).max(1);
        let first_chunk_size = mtu.min(pkt.size_bytes.max(1));

        if num_chunks <= 1 {
            scheduler.enqueue(pkt, now, ctx, kernel)?;
        } else {
            let template = pkt.clone();
            let mut lost = false;
            let mut settled = 0u32;
            for i in 0..num_chunks {
                let consumed = i * mtu;
                let mut chunk = pkt.clone();
                chunk.size_bytes = mtu.min(pkt.size_bytes - consumed);
                chunk.payload = Vec::new();
                if scheduler.enqueue(chunk, now, ctx, kernel)? == EnqueueOutcome::Dropped {
                    lost = true;
                    settled += 1;
                }
            }
            if settled < num_chunks {
                self.pending_fragments.insert(
                    (link, pkt_id),
                    PendingReassembly { template, total: num_chunks, dequeued: settled, lost },
                );
            }
        }

        if was_idle && scheduler.queue_len() > 0 {
            scheduler.set_busy(true);
            let delay_ticks = ((first_chunk_size as f64 * 8.0) / baud_rate).ceil() as SimTime;
            return Ok(Some(ScheduledSend { link, delay_ticks }));
        }
        Ok(None)
    }

    /// The self-event handler for a link's dequeue tick: pops the next
    /// chunk, and once every chunk of its packet has cleared this link
    /// (trivially true for an unfragmented packet), forwards the
    /// `SendPacket`/`PktForward` event toward its next hop (or delivers it
    /// locally if this router owns the destination host). Re-arms another
    /// dequeue if the link still has work, leaving it idle otherwise.
    pub fn on_link_tick(&mut self, link: LinkId, now: SimTime, kernel: &dyn EventKernel) -> Option<ScheduledSend> {
        let baud_rate = self.baud_rate_bps.get(&link).copied().unwrap_or(1.0);
        let scheduler = self.schedulers.get_mut(&link)?;
        let pkt = scheduler.dequeue()?;
        let size_bytes = pkt.size_bytes;

        let to_forward = match self.pending_fragments.get_mut(&(link, pkt.pkt_id)) {
            Some(pending) => {
                pending.dequeued += 1;
                if pending.dequeued < pending.total {
                    None
                } else {
                    let pending = self
                        .pending_fragments
                        .remove(&(link, pkt.pkt_id))
                        .expect("just looked up above");
                    if pending.lost { None } else { Some(pending.template) }
                }
            }
            None => Some(pkt),
        };

        if let Some(full_pkt) = to_forward {
            let next_hop = self
                .routing
                .get(&full_pkt.dest)
                .and_then(|r| r.next_router)
                .unwrap_or(full_pkt.dest);
            let tag = if self.hosts.contains(&full_pkt.dest) {
                EventTag::EmptyPkt
            } else {
                EventTag::PktForward
            };
            kernel.schedule(next_hop, SCHEDULE_NOW, tag, EventData::boxed(full_pkt));
        }

        let scheduler = self.schedulers.get_mut(&link)?;
        if scheduler.queue_len() > 0 {
            let delay_ticks = ((size_bytes as f64 * 8.0) / baud_rate).ceil() as SimTime;
            Some(ScheduledSend { link, delay_ticks })
        } else {
            scheduler.set_busy(false);
            let _ = now;
            None
        }
    }

    /// Periodic ARED adaptation across every link this router owns (spec
    /// §4.7's adaptation self-event, fanned out per-router).
    pub fn adapt_all(&mut self, now: SimTime) {
        for scheduler in self.schedulers.values_mut() {
            scheduler.adapt(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::drop_discipline::FifoThreshold;
    use gridsim_core::types::ObjectId;

    fn scheduler(name: &str) -> PacketScheduler {
        PacketScheduler::new(name, vec![1.0], Box::new(FifoThreshold { max_buffer_packets: 64 }))
    }

    fn pkt(dest: u64) -> Packet {
        Packet {
            payload: vec![],
            size_bytes: 100,
            tag: EventTag::SendPacket,
            src: EntityId(1),
            dest: EntityId(dest),
            last_hop: EntityId(1),
            pkt_id: 1,
            pkt_index: 0,
            total_pkts: 1,
            end_to_end: crate::packet::EndToEndRecord {
                src: EntityId(1),
                dest: EntityId(dest),
                class_type: 0,
                total_pkts: 1,
                object_id: ObjectId(1),
                is_file: false,
                owner: gridsim_core::types::UserId(1),
            },
        }
    }

    struct NullKernel;
    impl EventKernel for NullKernel {
        fn schedule(&self, _: EntityId, _: SimTime, _: EventTag, _: EventData) {}
        fn clock(&self) -> SimTime {
            0
        }
    }

    #[test]
    fn advertisement_from_a_neighbour_learns_a_new_route() {
        let mut r = Router::new(EntityId(1));
        r.attach_link(EntityId(2), LinkId(1), scheduler("r1-r2"), 1_000_000.0, 1500);

        let changed = r.on_advertisement(
            EntityId(2),
            RouterAd { entries: vec![(EntityId(9), 0)] },
        );
        assert_eq!(changed, vec![(EntityId(9), 1)]);
        assert_eq!(r.routing_table().get(&EntityId(9)).unwrap().hop_count, 1);
    }

    #[test]
    fn an_unreachable_hop_count_is_rejected() {
        let mut r = Router::new(EntityId(1));
        r.attach_link(EntityId(2), LinkId(1), scheduler("r1-r2"), 1_000_000.0, 1500);
        let changed = r.on_advertisement(
            EntityId(2),
            RouterAd { entries: vec![(EntityId(9), MAX_HOP_COUNT)] },
        );
        assert!(changed.is_empty());
    }

    #[test]
    fn forward_on_an_idle_link_requests_one_scheduled_send() {
        let mut r = Router::new(EntityId(1));
        r.attach_link(EntityId(2), LinkId(1), scheduler("r1-r2"), 800.0, 1500);
        r.add_host(EntityId(2), LinkId(1));

        let ctx = SimContext::new();
        let kernel = NullKernel;
        let sent = r.forward(pkt(2), 0, &ctx, &kernel).unwrap();
        assert!(sent.is_some());
        let sent2 = r.forward(pkt(2), 0, &ctx, &kernel).unwrap();
        assert!(sent2.is_none(), "link already busy, no second self-event");
    }

    #[test]
    fn unroutable_destination_is_silently_dropped_by_forward() {
        let mut r = Router::new(EntityId(1));
        let ctx = SimContext::new();
        let kernel = NullKernel;
        let sent = r.forward(pkt(42), 0, &ctx, &kernel).unwrap();
        assert!(sent.is_none());
    }

    struct RecordingKernel {
        scheduled: RefCell<Vec<(EntityId, EventTag, Packet)>>,
    }

    impl EventKernel for RecordingKernel {
        fn schedule(&self, dest: EntityId, _delay: SimTime, tag: EventTag, data: EventData) {
            let pkt = data.downcast::<Packet>().expect("router schedules Packet payloads");
            self.scheduled.borrow_mut().push((dest, tag, *pkt));
        }
        fn clock(&self) -> SimTime {
            0
        }
    }

    #[test]
    fn a_packet_over_the_link_mtu_is_fragmented_and_reassembled_before_the_next_hop() {
        let mut r = Router::new(EntityId(1));
        r.attach_link(EntityId(2), LinkId(1), scheduler("r1-r2"), 8_000.0, 40);
        r.add_host(EntityId(2), LinkId(1));

        let ctx = SimContext::new();
        let kernel = RecordingKernel { scheduled: RefCell::new(vec![]) };

        let mut big = pkt(2);
        big.size_bytes = 100;
        r.forward(big, 0, &ctx, &kernel).unwrap();
        assert_eq!(r.scheduler_mut(LinkId(1)).unwrap().queue_len(), 3, "100 bytes over a 40-byte MTU splits into 3 chunks");

        while r.on_link_tick(LinkId(1), 0, &kernel).is_some() {}
        let delivered = kernel.scheduled.borrow();
        assert_eq!(delivered.len(), 1, "the three chunks collapse back into one delivery");
        assert_eq!(delivered[0].2.size_bytes, 100, "the original packet is forwarded, not a chunk");
    }
}
