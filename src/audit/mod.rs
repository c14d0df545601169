//! Audit Trail
//!
//! Append-only structured events for gate transitions and commit lifecycle.
//! The gate and the buffer only ever append; where records end up is the
//! sink's business.

mod sinks;

pub use sinks::{
    BroadcastAuditSink, FanoutAuditSink, JsonlAuditSink, MemoryAuditSink, NullAuditSink,
    TracingAuditSink,
};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use crate::gate::MetricsSample;

/// Events emitted by the gate and the deferred commit buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    /// The gate opened; irreversible actions are now deferred.
    WindowOpened { metrics: MetricsSample },
    /// The gate closed after `open_for_s` seconds.
    WindowClosed { open_for_s: f64, metrics: MetricsSample },
    /// An action ran immediately because the gate was closed.
    CommitExecuted { kind: String, ok: bool },
    /// An action was queued behind an open gate.
    CommitDeferred { kind: String, commit_id: String },
    /// A queued action ran during a flush.
    CommitFlushed {
        commit_id: String,
        kind: String,
        status: FlushState,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Queued actions were discarded unexecuted.
    CommitDropped { count: usize },
}

impl AuditEvent {
    /// Wire name of the event, the `type` field.
    pub fn kind(&self) -> &'static str {
        match self {
            AuditEvent::WindowOpened { .. } => "window_opened",
            AuditEvent::WindowClosed { .. } => "window_closed",
            AuditEvent::CommitExecuted { .. } => "commit_executed",
            AuditEvent::CommitDeferred { .. } => "commit_deferred",
            AuditEvent::CommitFlushed { .. } => "commit_flushed",
            AuditEvent::CommitDropped { .. } => "commit_dropped",
        }
    }
}

/// Outcome tag carried by `commit_flushed` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushState {
    Executed,
    Failed,
}

/// A timestamped audit event, serialized flat: `{"type": ..., ...fields, "ts": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    #[serde(flatten)]
    pub event: AuditEvent,
    pub ts: f64,
}

/// Append-only event log consumed by the gate and the buffer.
pub trait AuditSink: Send + Sync {
    fn append(&self, record: &AuditRecord) -> Result<()>;
}

/// Append an event, logging (never propagating) sink failures.
pub(crate) fn emit(sink: &Arc<dyn AuditSink>, event: AuditEvent, ts: f64) {
    let record = AuditRecord { event, ts };
    if let Err(e) = sink.append(&record) {
        warn!("Audit sink rejected {} event: {:#}", record.event.kind(), e);
    }
}
