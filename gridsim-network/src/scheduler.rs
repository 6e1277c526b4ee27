//! The FNB packet scheduler (spec §4.7): SCFQ queueing plus a pluggable
//! drop discipline, whitelist rescue, and drop-notification plumbing.
use std::fmt;

use gridsim_core::context::SimContext;
use gridsim_core::event::{EventData, EventKernel, EventTag, SCHEDULE_NOW};
use gridsim_core::types::SimTime;
use gridsim_core::{ResultExt, SystemError, TypedResult};

use crate::drop_discipline::{Admit, DropDiscipline, DropStatsSnapshot};
use crate::packet::Packet;
use crate::scfq::ScfqQueue;

/// Emitted to a packet's source output port on an unrecoverable drop
/// (spec §4.7: "emit a side-channel event `PACKET_DROPPED`..."). The
/// output port owns the `(objectId, userId)` dedup set (Testable
/// Property 6) and translates this into a user-facing failure event.
#[derive(Debug, Clone, Copy)]
pub struct PacketDroppedNotice {
    pub object_id: gridsim_core::types::ObjectId,
    pub is_file: bool,
    pub owner: gridsim_core::types::UserId,
}

/// One outcome of [PacketScheduler::enqueue].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued,
    /// The packet was dropped but was not whitelisted; no rescue was
    /// attempted.
    Dropped,
    /// A whitelisted packet displaced an evicted data packet.
    RescuedByEviction,
}

pub struct PacketScheduler {
    pub name: String,
    queue: ScfqQueue,
    drop_discipline: Box<dyn DropDiscipline>,
    /// Whether the link this scheduler feeds is currently transmitting;
    /// used by the router to detect the idle -> busy edge that needs a
    /// dequeue self-event scheduled (spec §4.8).
    busy: bool,
    dropped_count: u64,
    next_pkt_id: u64,
}

impl fmt::Debug for PacketScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketScheduler")
            .field("name", &self.name)
            .field("queue_len", &self.queue.len())
            .field("busy", &self.busy)
            .finish()
    }
}

impl PacketScheduler {
    pub fn new(name: impl Into<String>, class_weights: Vec<f64>, drop_discipline: Box<dyn DropDiscipline>) -> Self {
        Self {
            name: name.into(),
            queue: ScfqQueue::new(class_weights),
            drop_discipline,
            busy: false,
            dropped_count: 0,
            next_pkt_id: 1,
        }
    }

    pub fn queue_len(&self) -> u32 {
        self.queue.len() as u32
    }

    pub fn is_idle(&self) -> bool {
        !self.busy
    }

    pub fn set_busy(&mut self, busy: bool) {
        self.busy = busy;
    }

    pub fn next_pkt_id(&mut self) -> u64 {
        let id = self.next_pkt_id;
        self.next_pkt_id += 1;
        id
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped_count
    }

    /// Admits `pkt` into the queue, applying the configured drop
    /// discipline and whitelist rescue (spec §4.7).
    pub fn enqueue(
        &mut self,
        pkt: Packet,
        now: SimTime,
        ctx: &SimContext,
        kernel: &dyn EventKernel,
    ) -> TypedResult<EnqueueOutcome> {
        let queue_len = self.queue_len();
        match self.drop_discipline.admit(&pkt, queue_len, now) {
            Admit::Accept => {
                self.queue.enqueue(pkt);
                Ok(EnqueueOutcome::Enqueued)
            }
            Admit::Drop => self.handle_drop(pkt, ctx, kernel),
        }
    }

    fn handle_drop(
        &mut self,
        pkt: Packet,
        ctx: &SimContext,
        kernel: &dyn EventKernel,
    ) -> TypedResult<EnqueueOutcome> {
        let whitelisted = ctx.whitelist.contains(pkt.src) || ctx.whitelist.contains(pkt.dest);
        if !whitelisted {
            self.dropped_count += 1;
            if !pkt.is_junk() {
                self.notify_drop(kernel, &pkt);
            }
            return Ok(EnqueueOutcome::Dropped);
        }

        let whitelist = &ctx.whitelist;
        match self
            .queue
            .evict_first_matching(|p| !whitelist.contains(p.src) && !whitelist.contains(p.dest))
        {
            Some(evicted) => {
                self.dropped_count += 1;
                if !evicted.is_junk() {
                    self.notify_drop(kernel, &evicted);
                }
                self.queue.enqueue(pkt);
                Ok(EnqueueOutcome::RescuedByEviction)
            }
            None => Err(anyhow::anyhow!(
                "whitelisted packet {} could not be rescued: no evictable data packet in queue {}",
                pkt.pkt_id,
                self.name
            ))
            .typ(SystemError::ControlPlaneLost),
        }
    }

    fn notify_drop(&self, kernel: &dyn EventKernel, pkt: &Packet) {
        let notice = PacketDroppedNotice {
            object_id: pkt.end_to_end.object_id,
            is_file: pkt.end_to_end.is_file,
            owner: pkt.end_to_end.owner,
        };
        kernel.schedule(
            pkt.src,
            SCHEDULE_NOW,
            EventTag::PacketDropped,
            EventData::boxed(notice),
        );
    }

    pub fn dequeue(&mut self) -> Option<Packet> {
        self.queue.dequeue()
    }

    pub fn adapt(&mut self, now: SimTime) {
        self.drop_discipline.adapt(now);
    }

    pub fn stats_snapshot(&self) -> DropStatsSnapshot {
        self.drop_discipline.snapshot()
    }
}

/// A single row of `<name>_Buffers.csv` (spec §6 "Persisted outputs").
/// FIFO schedulers leave `max_p`/`min_th`/`max_th` blank.
#[derive(Debug, Clone, Copy)]
pub struct BufferStatsRow {
    pub clock: SimTime,
    pub max_p: Option<f64>,
    pub min_th: Option<f64>,
    pub max_th: Option<f64>,
    pub avg: Option<f64>,
    pub queue_size: u32,
}

impl BufferStatsRow {
    pub const HEADER: &'static str = "Clock, MAX_P, MIN_TH, MAX_TH, AVG, QUEUE_SIZE";

    pub fn to_csv_row(&self) -> String {
        let field = |v: Option<f64>| v.map(|v| v.to_string()).unwrap_or_default();
        format!(
            "{}, {}, {}, {}, {}, {}",
            self.clock,
            field(self.max_p),
            field(self.min_th),
            field(self.max_th),
            field(self.avg),
            self.queue_size
        )
    }
}

/// A single row of `<name>_DroppedPkts.csv`.
#[derive(Debug, Clone, Copy)]
pub struct DroppedPktsRow {
    pub interval: SimTime,
    pub dropped_packets: u64,
}

impl DroppedPktsRow {
    pub const HEADER: &'static str = "Interval, DroppedPackets";

    pub fn to_csv_row(&self) -> String {
        format!("{}, {}", self.interval, self.dropped_packets)
    }
}

/// A single row of `<name>_MaxBufferSize.csv`.
#[derive(Debug, Clone, Copy)]
pub struct MaxBufferSizeRow {
    pub interval: SimTime,
    pub buffer_size: u32,
    pub avg_buffer_size: f64,
    pub max_buffer_size: u32,
}

impl MaxBufferSizeRow {
    pub const HEADER: &'static str = "Interval, BufferSize, AvgBufferSize, MaxBufferSize";

    pub fn to_csv_row(&self) -> String {
        format!(
            "{}, {}, {}, {}",
            self.interval, self.buffer_size, self.avg_buffer_size, self.max_buffer_size
        )
    }
}

/// Tick-boundary stats recipient. The actual CSV file writing is
/// explicitly out of scope (spec.md §1); this trait is the hook a caller
/// supplies, matching the teacher's pattern of leaving log *sinks*
/// pluggable while owning the log *content*.
pub trait StatsSink {
    fn buffer_stats(&mut self, scheduler_name: &str, row: BufferStatsRow);
    fn dropped_pkts(&mut self, scheduler_name: &str, row: DroppedPktsRow);
    fn max_buffer_size(&mut self, scheduler_name: &str, row: MaxBufferSizeRow);
}
