//! Pluggable drop disciplines (spec §4.7): FIFO threshold, RED and ARED.
use gridsim_core::types::SimTime;
use serde::{Deserialize, Serialize};

use crate::packet::Packet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admit {
    Accept,
    Drop,
}

/// Snapshot of a drop discipline's internal state for the per-tick stats
/// row (spec §6 "Persisted outputs"). `None` fields are left blank in the
/// CSV row, matching FIFO leaving `MAX_P, MIN_TH, MAX_TH` blank.
#[derive(Debug, Clone, Copy, Default)]
pub struct DropStatsSnapshot {
    pub max_p: Option<f64>,
    pub min_th: Option<f64>,
    pub max_th: Option<f64>,
    pub avg: Option<f64>,
}

/// Capability shared by every drop discipline. `adapt` is the ARED
/// periodic self-event hook (spec §4.7/§4.8); disciplines that don't adapt
/// leave it a no-op.
pub trait DropDiscipline: std::fmt::Debug + Send {
    fn admit(&mut self, pkt: &Packet, queue_len: u32, now: SimTime) -> Admit;

    fn adapt(&mut self, _now: SimTime) {}

    fn snapshot(&self) -> DropStatsSnapshot {
        DropStatsSnapshot::default()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FifoThreshold {
    pub max_buffer_packets: u32,
}

impl DropDiscipline for FifoThreshold {
    fn admit(&mut self, _pkt: &Packet, queue_len: u32, _now: SimTime) -> Admit {
        if queue_len >= self.max_buffer_packets {
            Admit::Drop
        } else {
            Admit::Accept
        }
    }
}

/// Random Early Detection (spec §4.7 "RED").
#[derive(Debug, Clone, Copy)]
pub struct Red {
    pub min_th: f64,
    pub max_th: f64,
    pub max_p: f64,
    pub queue_weight: f64,
    /// Typical single-packet transmission time, used by the empty-queue
    /// decay formula's `(t - qTime) / S` term. Spec leaves `S` implicit;
    /// gridsim derives it from the link's MTU and baud rate at
    /// construction (see [crate::drop_discipline::Red::for_link]).
    pub typical_pkt_time: f64,
    avg: f64,
    count: u32,
    q_time: SimTime,
}

impl Red {
    pub fn new(min_th: f64, max_th: f64, max_p: f64, queue_weight: f64, typical_pkt_time: f64) -> Self {
        Self {
            min_th,
            max_th,
            max_p,
            queue_weight,
            typical_pkt_time,
            avg: 0.0,
            count: 0,
            q_time: 0,
        }
    }

    /// Thresholds derived from the link's bandwidth-delay product (spec
    /// §4.7 ARED paragraph): `C = baudRate / (MTU*8)`, `w = 1 -
    /// exp(-1/C)`, `minTh = max(5, delayTarget*C/2)`, `maxTh = 3*minTh`.
    pub fn for_link(mtu_bytes: u32, baud_rate_bps: f64, delay_target_s: f64, max_p: f64) -> Self {
        let c = baud_rate_bps / (mtu_bytes as f64 * 8.0);
        let w = 1.0 - (-1.0 / c).exp();
        let min_th = 5.0f64.max(delay_target_s * c / 2.0);
        let max_th = 3.0 * min_th;
        Self::new(min_th, max_th, max_p, w, 1.0 / c)
    }

    fn update_avg(&mut self, queue_len: u32, now: SimTime) {
        if queue_len > 0 {
            self.avg = (1.0 - self.queue_weight) * self.avg + self.queue_weight * queue_len as f64;
        } else {
            let idle_time = now.saturating_sub(self.q_time) as f64;
            let m = (idle_time / self.typical_pkt_time.max(f64::EPSILON)).max(0.0);
            self.avg = (1.0 - self.queue_weight).powf(m) * self.avg;
            self.q_time = now;
        }
    }

    pub fn avg(&self) -> f64 {
        self.avg
    }
}

impl DropDiscipline for Red {
    fn admit(&mut self, _pkt: &Packet, queue_len: u32, now: SimTime) -> Admit {
        self.update_avg(queue_len, now);

        if self.avg >= self.max_th {
            self.count = 0;
            return Admit::Drop;
        }
        if self.avg < self.min_th {
            self.count = 0;
            return Admit::Accept;
        }

        let c1 = self.max_p / (self.max_th - self.min_th);
        let c2 = self.max_p * self.min_th / (self.max_th - self.min_th);
        let pb = (c1 * self.avg - c2).clamp(0.0, 1.0);
        self.count += 1;
        if pb <= 0.0 {
            return Admit::Accept;
        }
        let threshold = (1.0 / pb).ceil() as u32;
        if self.count >= threshold {
            self.count = 0;
            Admit::Drop
        } else {
            Admit::Accept
        }
    }

    fn snapshot(&self) -> DropStatsSnapshot {
        DropStatsSnapshot {
            max_p: Some(self.max_p),
            min_th: Some(self.min_th),
            max_th: Some(self.max_th),
            avg: Some(self.avg),
        }
    }
}

/// ARED's target `AVG` band, needed to adapt `maxP`. Open Question
/// (spec.md "Open questions"): the reference behaviour when left unset is
/// unclear, so gridsim exposes both an explicit override and a value
/// derived from the link's delay target, resolved in DESIGN.md.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AredThresholds {
    pub target_low: f64,
    pub target_high: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct LinkParams {
    pub mtu_bytes: u32,
    pub baud_rate_bps: f64,
    pub delay_target_s: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AredConfig {
    pub explicit: Option<AredThresholds>,
}

impl AredConfig {
    pub fn resolve(&self, derived_from: LinkParams) -> AredThresholds {
        self.explicit.unwrap_or(AredThresholds {
            target_low: derived_from.delay_target_s * 0.6,
            target_high: derived_from.delay_target_s * 1.4,
        })
    }
}

/// Adaptive RED (spec §4.7 "ARED"): periodically nudges `maxP` to keep
/// `AVG` inside `[targetLow, targetHigh]`.
#[derive(Debug, Clone, Copy)]
pub struct Ared {
    pub red: Red,
    pub target_low: f64,
    pub target_high: f64,
}

impl Ared {
    pub fn new(red: Red, thresholds: AredThresholds) -> Self {
        Self {
            red,
            target_low: thresholds.target_low,
            target_high: thresholds.target_high,
        }
    }
}

impl DropDiscipline for Ared {
    fn admit(&mut self, pkt: &Packet, queue_len: u32, now: SimTime) -> Admit {
        self.red.admit(pkt, queue_len, now)
    }

    fn adapt(&mut self, _now: SimTime) {
        let avg = self.red.avg();
        if avg > self.target_high {
            let alpha = 0.01f64.min(self.red.max_p / 4.0);
            self.red.max_p = (self.red.max_p + alpha).min(0.5);
        } else if avg < self.target_low {
            self.red.max_p *= 0.9;
        }
    }

    fn snapshot(&self) -> DropStatsSnapshot {
        self.red.snapshot()
    }
}
