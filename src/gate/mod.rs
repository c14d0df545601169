//! Gate Module
//!
//! Metrics, thresholds and the hysteresis state machine that decides when
//! irreversible actions must wait.

pub mod admission;
pub mod config;
mod metrics;

pub use admission::{AdmissionGate, GateSnapshot, GateTransition};
pub use config::{ConfigError, GateConfig};
pub use metrics::MetricsSample;
