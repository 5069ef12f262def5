//! Turns a packet capture into per-flow summary rows.
//!
//! Packets are grouped by an order-independent key (both endpoints, VLAN,
//! transport), accumulated into forward, reverse and bidirectional records,
//! and written out when a flow hits its active or idle timeout or the capture
//! ends.

pub mod capture;
pub mod config;
pub mod error;
pub mod processor;
pub mod types;

pub use config::{ConfigFile, MeterConfig};
pub use error::{ConfigError, MeterError};
pub use processor::{run_capture, FlowMeter};
pub use types::RunSummary;
