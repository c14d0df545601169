//! Deferred Commit Buffer
//!
//! Strict FIFO of irreversible actions held back while the admission gate is
//! open. Entries leave the queue exactly once: executed (ok or failed) by a
//! flush, or discarded by a drop.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::IrreversibleAction;
use crate::audit::{emit, AuditEvent, AuditSink, FlushState};
use crate::clock::{Clock, Timestamp};

/// What `submit` did with an action.
#[derive(Debug)]
pub enum SubmitOutcome {
    /// Gate was closed: the action ran synchronously. Its error, if any, is the caller's.
    Executed { kind: String, result: Result<Value> },
    /// Gate was open: the action was queued and has not run.
    Deferred { commit_id: String, kind: String },
}

impl SubmitOutcome {
    pub fn is_deferred(&self) -> bool {
        matches!(self, SubmitOutcome::Deferred { .. })
    }

    pub fn commit_id(&self) -> Option<&str> {
        match self {
            SubmitOutcome::Deferred { commit_id, .. } => Some(commit_id),
            SubmitOutcome::Executed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FlushStatus {
    Executed { result: Value },
    Failed { error: String },
}

/// Per-entry outcome of a flush.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlushResult {
    pub commit_id: String,
    pub kind: String,
    #[serde(flatten)]
    pub status: FlushStatus,
}

impl FlushResult {
    pub fn is_executed(&self) -> bool {
        matches!(self.status, FlushStatus::Executed { .. })
    }
}

/// Read-only view of a queued commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingCommit {
    pub commit_id: String,
    pub seq: u64,
    pub kind: String,
    pub created_at: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Value>,
}

/// A queued action with its identity.
pub struct DeferredEntry {
    pub commit_id: String,
    pub seq: u64,
    pub kind: String,
    pub created_at: Timestamp,
    action: Box<dyn IrreversibleAction>,
}

impl DeferredEntry {
    /// Run the action, consuming the entry. No audit side effects.
    ///
    /// A panicking action is reported as failed, like one returning an error.
    pub fn execute(self) -> FlushResult {
        let action = self.action;
        let status = match catch_unwind(AssertUnwindSafe(move || action.execute())) {
            Ok(Ok(result)) => FlushStatus::Executed { result },
            Ok(Err(e)) => FlushStatus::Failed { error: format!("{:#}", e) },
            Err(payload) => FlushStatus::Failed {
                error: format!("action panicked: {}", panic_message(payload.as_ref())),
            },
        };
        FlushResult {
            commit_id: self.commit_id,
            kind: self.kind,
            status,
        }
    }
}

impl std::fmt::Debug for DeferredEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredEntry")
            .field("commit_id", &self.commit_id)
            .field("kind", &self.kind)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg
    } else {
        "non-string panic payload"
    }
}

pub fn format_commit_id(seq: u64) -> String {
    format!("commit-{:06}", seq)
}

pub struct DeferredCommitBuffer {
    queue: VecDeque<DeferredEntry>,
    /// Last sequence number handed out. Never decremented.
    next_seq: u64,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
}

impl DeferredCommitBuffer {
    pub fn new(audit: Arc<dyn AuditSink>, clock: Arc<dyn Clock>) -> Self {
        Self {
            queue: VecDeque::new(),
            next_seq: 0,
            audit,
            clock,
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    /// Queued commits, oldest first.
    pub fn pending(&self) -> Vec<PendingCommit> {
        self.queue
            .iter()
            .map(|e| PendingCommit {
                commit_id: e.commit_id.clone(),
                seq: e.seq,
                kind: e.kind.clone(),
                created_at: e.created_at,
                description: e.action.describe(),
            })
            .collect()
    }

    /// Run `action` now if the window is closed, otherwise queue it.
    pub fn submit<A>(
        &mut self,
        kind: impl Into<String>,
        action: A,
        window_open: bool,
    ) -> SubmitOutcome
    where
        A: IrreversibleAction + 'static,
    {
        let kind = kind.into();
        if window_open {
            return self.defer(kind, Box::new(action));
        }
        let result = Box::new(action).execute();
        self.record_executed(&kind, &result);
        SubmitOutcome::Executed { kind, result }
    }

    /// Queue an action unconditionally.
    pub fn defer(&mut self, kind: String, action: Box<dyn IrreversibleAction>) -> SubmitOutcome {
        self.next_seq += 1;
        let seq = self.next_seq;
        let commit_id = format_commit_id(seq);
        let created_at = self.clock.now();

        debug!("Deferring {} commit {}", kind, commit_id);
        self.queue.push_back(DeferredEntry {
            commit_id: commit_id.clone(),
            seq,
            kind: kind.clone(),
            created_at,
            action,
        });
        emit(
            &self.audit,
            AuditEvent::CommitDeferred { kind: kind.clone(), commit_id: commit_id.clone() },
            created_at,
        );
        SubmitOutcome::Deferred { commit_id, kind }
    }

    /// Execute every queued action, oldest first. One failure never stops the rest.
    pub fn flush(&mut self) -> Vec<FlushResult> {
        let entries = self.drain();
        let mut results = Vec::with_capacity(entries.len());
        for entry in entries {
            let result = entry.execute();
            self.record_flushed(&result);
            results.push(result);
        }
        if !results.is_empty() {
            let failed = results.iter().filter(|r| !r.is_executed()).count();
            info!("Flushed {} deferred commits ({} failed)", results.len(), failed);
        }
        results
    }

    /// Discard every queued action without running it. Returns how many were discarded.
    pub fn drop_all(&mut self) -> usize {
        let count = self.queue.len();
        if count == 0 {
            return 0;
        }
        self.queue.clear();
        warn!("Dropped {} deferred commits unexecuted", count);
        emit(&self.audit, AuditEvent::CommitDropped { count }, self.clock.now());
        count
    }

    /// Take the whole queue, leaving it empty.
    pub(crate) fn drain(&mut self) -> Vec<DeferredEntry> {
        self.queue.drain(..).collect()
    }

    pub(crate) fn record_executed(&self, kind: &str, result: &Result<Value>) {
        match result {
            Ok(_) => debug!("Executed {} immediately", kind),
            Err(e) => warn!("Immediate {} commit failed: {:#}", kind, e),
        }
        emit(
            &self.audit,
            AuditEvent::CommitExecuted { kind: kind.to_string(), ok: result.is_ok() },
            self.clock.now(),
        );
    }

    pub(crate) fn record_flushed(&self, result: &FlushResult) {
        let (status, error) = match &result.status {
            FlushStatus::Executed { .. } => (FlushState::Executed, None),
            FlushStatus::Failed { error } => {
                warn!("Deferred commit {} ({}) failed: {}", result.commit_id, result.kind, error);
                (FlushState::Failed, Some(error.clone()))
            }
        };
        emit(
            &self.audit,
            AuditEvent::CommitFlushed {
                commit_id: result.commit_id.clone(),
                kind: result.kind.clone(),
                status,
                error,
            },
            self.clock.now(),
        );
    }
}
