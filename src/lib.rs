//! Commit Gate
//!
//! Hysteresis-gated admission control for irreversible side effects:
//! - Admission gate with minimum dwell and cooldown
//! - FIFO deferred commit buffer with per-item failure isolation
//! - Structured audit trail (memory, JSON lines, broadcast, tracing)
//! - Lock-sharing controller and async control loop

pub mod audit;
pub mod buffer;
pub mod clock;
pub mod controller;
pub mod driver;
pub mod gate;
pub mod scenario;
pub mod utils;

// Re-exports for convenience
pub use audit::{AuditEvent, AuditRecord, AuditSink};
pub use buffer::{DeferredCommitBuffer, FlushResult, FlushStatus, IrreversibleAction, SubmitOutcome};
pub use clock::{Clock, ManualClock, SystemClock, Timestamp};
pub use controller::SharedController;
pub use gate::{AdmissionGate, GateConfig, GateTransition, MetricsSample};
