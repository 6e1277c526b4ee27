//! Human-authored scenario configuration (spec §6 "Configuration"),
//! mirroring the teacher's `hypervisor::config::Config`: every field is
//! optional with a documented default, supplied via `#[serde(default =
//! "...")]` the same way the teacher defaults `Config::channel`/
//! `Config::hm_init_table`.
use serde::{Deserialize, Serialize};

use gridsim_network::{AredConfig, LinkParams};

fn default_commit_period() -> u64 {
    1800
}

fn default_true() -> bool {
    true
}

fn default_max_buffer_packets() -> u32 {
    64
}

/// RED's four knobs (spec §6). Left entirely to the caller to supply —
/// unlike ARED, RED has no BDP-derived fallback in the spec, so there is
/// no `Default` impl here; a missing `red` section means FIFO is used.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RedConfig {
    pub min_th: f64,
    pub max_th: f64,
    pub max_p: f64,
    pub queue_weight: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LinkConfig {
    pub mtu_bytes: u32,
    pub baud_rate_bps: f64,
    #[serde(with = "humantime_serde")]
    pub propagation_delay: std::time::Duration,
}

impl LinkConfig {
    pub fn params(&self) -> LinkParams {
        LinkParams {
            mtu_bytes: self.mtu_bytes,
            baud_rate_bps: self.baud_rate_bps,
            delay_target_s: self.propagation_delay.as_secs_f64(),
        }
    }
}

/// Top-level scenario configuration. Every field is optional in the YAML
/// source; omitted fields fall back to the documented defaults (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridSimConfig {
    #[serde(default = "default_commit_period")]
    pub commit_period_s: u64,

    #[serde(default = "default_true")]
    pub allow_borrowing: bool,

    #[serde(default = "default_true")]
    pub return_job: bool,

    #[serde(default = "default_max_buffer_packets")]
    pub max_buffer_packets: u32,

    #[serde(default)]
    pub red: Option<RedConfig>,

    #[serde(default)]
    pub ared: AredConfig,

    #[serde(default)]
    pub links: Vec<LinkConfig>,
}

impl Default for GridSimConfig {
    fn default() -> Self {
        Self {
            commit_period_s: default_commit_period(),
            allow_borrowing: default_true(),
            return_job: default_true(),
            max_buffer_packets: default_max_buffer_packets(),
            red: None,
            ared: AredConfig::default(),
            links: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let cfg = GridSimConfig::default();
        assert_eq!(cfg.commit_period_s, 1800);
        assert!(cfg.allow_borrowing);
        assert!(cfg.return_job);
    }

    #[test]
    fn an_empty_yaml_document_resolves_to_the_same_defaults() {
        let cfg: GridSimConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(cfg.commit_period_s, 1800);
        assert!(cfg.allow_borrowing);
        assert_eq!(cfg.max_buffer_packets, 64);
        assert!(cfg.links.is_empty());
    }
}
