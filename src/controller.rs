//! Shared Controller
//!
//! One admission gate and one deferred buffer behind a single lock, for
//! deployments where producers submit from several threads while a control
//! loop ticks the gate. Gate transitions, submissions, drains and drops all
//! happen under that lock. Immediate actions run while it is held; deferred
//! actions run during a flush with the lock released.
//!
//! Gate ticks and buffer events share the buffer's clock when stamped through
//! [`SharedController::tick_now`], so one audit stream has one time base.

use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

use crate::audit::AuditSink;
use crate::buffer::{
    DeferredCommitBuffer, FlushResult, IrreversibleAction, PendingCommit, SubmitOutcome,
};
use crate::clock::{Clock, Timestamp};
use crate::gate::{AdmissionGate, GateConfig, GateSnapshot, GateTransition, MetricsSample};

struct ControlState {
    gate: AdmissionGate,
    buffer: DeferredCommitBuffer,
}

#[derive(Clone)]
pub struct SharedController {
    state: Arc<Mutex<ControlState>>,
}

impl SharedController {
    pub fn new(config: GateConfig, audit: Arc<dyn AuditSink>, clock: Arc<dyn Clock>) -> Self {
        let gate = AdmissionGate::new(config, audit.clone());
        let buffer = DeferredCommitBuffer::new(audit, clock);
        Self::from_parts(gate, buffer)
    }

    pub fn from_parts(gate: AdmissionGate, buffer: DeferredCommitBuffer) -> Self {
        Self {
            state: Arc::new(Mutex::new(ControlState { gate, buffer })),
        }
    }

    // An immediate action may panic under the lock. It touches neither the gate
    // nor the queue, so the state behind a poisoned lock is still consistent.
    fn lock(&self) -> MutexGuard<'_, ControlState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The clock the buffer stamps its audit events with.
    pub fn clock(&self) -> Arc<dyn Clock> {
        self.lock().buffer.clock()
    }

    pub fn now(&self) -> Timestamp {
        self.lock().buffer.clock().now()
    }

    /// Feed one metrics sample to the gate at a caller-supplied time.
    pub fn tick(&self, metrics: &MetricsSample, now: Timestamp) -> GateTransition {
        self.lock().gate.step(metrics, now)
    }

    /// Feed one metrics sample, stamped with the shared clock.
    pub fn tick_now(&self, metrics: &MetricsSample) -> GateTransition {
        let mut state = self.lock();
        let now = state.buffer.clock().now();
        state.gate.step(metrics, now)
    }

    /// Like [`SharedController::tick`], but overwrites the sample's queue
    /// length with the buffer length read under the same lock.
    pub fn tick_with_queue(&self, metrics: &MetricsSample, now: Timestamp) -> GateTransition {
        let mut state = self.lock();
        let metrics = metrics.with_queue_len(state.buffer.len());
        state.gate.step(&metrics, now)
    }

    /// Defer `action` if the gate is open, otherwise run it on the calling thread.
    ///
    /// The whole submission holds the lock, so no `tick` can open the gate
    /// while an immediate action is in flight. An immediate action must not
    /// call back into this controller.
    pub fn submit<A>(&self, kind: impl Into<String>, action: A) -> SubmitOutcome
    where
        A: IrreversibleAction + 'static,
    {
        let mut state = self.lock();
        let window_open = state.gate.is_open();
        state.buffer.submit(kind, action, window_open)
    }

    /// Drain the queue under the lock, then run each action with the lock released.
    pub fn flush(&self) -> Vec<FlushResult> {
        let entries = self.lock().buffer.drain();
        if entries.is_empty() {
            return Vec::new();
        }

        let mut results = Vec::with_capacity(entries.len());
        for entry in entries {
            let result = entry.execute();
            self.lock().buffer.record_flushed(&result);
            results.push(result);
        }
        let failed = results.iter().filter(|r| !r.is_executed()).count();
        info!("Flushed {} deferred commits ({} failed)", results.len(), failed);
        results
    }

    pub fn drop_all(&self) -> usize {
        self.lock().buffer.drop_all()
    }

    pub fn len(&self) -> usize {
        self.lock().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_open(&self) -> bool {
        self.lock().gate.is_open()
    }

    pub fn snapshot(&self) -> GateSnapshot {
        self.lock().gate.snapshot()
    }

    pub fn pending(&self) -> Vec<PendingCommit> {
        self.lock().buffer.pending()
    }
}
