//! Event dispatch glue and scenario configuration binding gridsim's
//! scheduler, network and data-grid crates to an external discrete-event
//! kernel (spec §4.10, §6 "Configuration").
pub mod config;
pub mod dispatch;

pub use config::{GridSimConfig, LinkConfig, RedConfig};
pub use dispatch::{Dispatcher, Handler};

pub use gridsim_core::context::SimContext;
pub use gridsim_core::event::{EventData, EventKernel, EventTag, SCHEDULE_NOW};
