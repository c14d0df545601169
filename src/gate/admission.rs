//! Admission Gate
//!
//! Two-state hysteresis gate deciding whether irreversible actions run now or
//! get deferred. Opening needs all trigger thresholds met at once; once open,
//! the gate holds for `min_open_s`; once closed, triggers are ignored for
//! `cooldown_s`.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use super::{ConfigError, GateConfig, MetricsSample};
use crate::audit::{emit, AuditEvent, AuditSink};
use crate::clock::Timestamp;

/// Edge produced by a single [`AdmissionGate::step`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "transition", rename_all = "snake_case")]
pub enum GateTransition {
    Opened,
    Closed { open_for_s: f64 },
    Unchanged,
}

/// Serializable view of the gate state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GateSnapshot {
    pub is_open: bool,
    pub open_since: Option<Timestamp>,
    pub last_closed: Option<Timestamp>,
}

pub struct AdmissionGate {
    config: GateConfig,
    /// `Some` exactly while the gate is open.
    open_since: Option<Timestamp>,
    last_closed: Option<Timestamp>,
    audit: Arc<dyn AuditSink>,
}

impl AdmissionGate {
    /// Build a closed gate. The configuration is taken as-is, degenerate
    /// values included; use [`AdmissionGate::try_new`] to validate first.
    pub fn new(config: GateConfig, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            config,
            open_since: None,
            last_closed: None,
            audit,
        }
    }

    pub fn try_new(config: GateConfig, audit: Arc<dyn AuditSink>) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(config, audit))
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.open_since.is_some()
    }

    pub fn open_since(&self) -> Option<Timestamp> {
        self.open_since
    }

    pub fn last_closed(&self) -> Option<Timestamp> {
        self.last_closed
    }

    pub fn snapshot(&self) -> GateSnapshot {
        GateSnapshot {
            is_open: self.is_open(),
            open_since: self.open_since,
            last_closed: self.last_closed,
        }
    }

    /// Trigger predicate: tempo mismatch, self-gate strength and queue length
    /// must all reach their thresholds.
    pub fn should_open(&self, metrics: &MetricsSample) -> bool {
        metrics.correction_latency_ratio() >= self.config.theta_m
            && metrics.self_gate_strength >= self.config.eps
            && metrics.irreversible_queue_len >= self.config.min_queue_len
    }

    /// Advance the state machine and return the resulting openness.
    pub fn update(&mut self, metrics: &MetricsSample, now: Timestamp) -> bool {
        self.step(metrics, now);
        self.is_open()
    }

    /// Advance the state machine and report which edge, if any, was taken.
    ///
    /// `now` is trusted; an out-of-order clock only shifts the dwell and
    /// cooldown arithmetic.
    pub fn step(&mut self, metrics: &MetricsSample, now: Timestamp) -> GateTransition {
        match self.open_since {
            Some(since) => {
                let open_for_s = now - since;
                if open_for_s < self.config.min_open_s {
                    return GateTransition::Unchanged;
                }
                if self.should_open(metrics) {
                    // Persistent risk holds the gate open
                    return GateTransition::Unchanged;
                }

                self.open_since = None;
                self.last_closed = Some(now);
                info!("Admission gate closed after {:.3}s", open_for_s);
                emit(
                    &self.audit,
                    AuditEvent::WindowClosed { open_for_s, metrics: *metrics },
                    now,
                );
                GateTransition::Closed { open_for_s }
            }
            None => {
                if let Some(closed_at) = self.last_closed {
                    if now - closed_at < self.config.cooldown_s {
                        debug!("Admission gate cooling down ({:.3}s since close)", now - closed_at);
                        return GateTransition::Unchanged;
                    }
                }
                if !self.should_open(metrics) {
                    return GateTransition::Unchanged;
                }

                self.open_since = Some(now);
                info!(
                    "Admission gate opened: ratio={:.3} self_gate={:.3} queue={}",
                    metrics.correction_latency_ratio(),
                    metrics.self_gate_strength,
                    metrics.irreversible_queue_len
                );
                emit(&self.audit, AuditEvent::WindowOpened { metrics: *metrics }, now);
                GateTransition::Opened
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;

    fn gate() -> (AdmissionGate, Arc<MemoryAuditSink>) {
        let sink = Arc::new(MemoryAuditSink::new());
        (AdmissionGate::new(GateConfig::default(), sink.clone()), sink)
    }

    fn triggering() -> MetricsSample {
        MetricsSample::new(1.0, 1.0, 0.9, 3)
    }

    fn calm() -> MetricsSample {
        MetricsSample::new(1.0, 0.1, 0.1, 0)
    }

    #[test]
    fn test_trigger_truth_table() {
        let (gate, _) = gate();
        for ratio_ok in [false, true] {
            for strength_ok in [false, true] {
                for queue_ok in [false, true] {
                    let m = MetricsSample::new(
                        1.0,
                        if ratio_ok { 0.8 } else { 0.79 },
                        if strength_ok { 0.6 } else { 0.59 },
                        if queue_ok { 1 } else { 0 },
                    );
                    assert_eq!(
                        gate.should_open(&m),
                        ratio_ok && strength_ok && queue_ok,
                        "ratio_ok={} strength_ok={} queue_ok={}",
                        ratio_ok,
                        strength_ok,
                        queue_ok
                    );
                }
            }
        }
    }

    #[test]
    fn test_degenerate_cycle_counts_as_mismatch() {
        let (gate, _) = gate();
        assert!(gate.should_open(&MetricsSample::new(0.0, 0.0, 0.9, 1)));
        assert!(gate.should_open(&MetricsSample::new(-1.0, 0.0, 0.9, 1)));
    }

    #[test]
    fn test_minimum_dwell() {
        let (mut gate, sink) = gate();
        assert!(gate.update(&triggering(), 100.0));
        assert_eq!(gate.open_since(), Some(100.0));
        assert_eq!(sink.of_type("window_opened").len(), 1);

        assert!(gate.update(&calm(), 104.9));
        assert!(sink.of_type("window_closed").is_empty());
    }

    #[test]
    fn test_close_after_dwell() {
        let (mut gate, sink) = gate();
        gate.update(&triggering(), 100.0);

        assert!(!gate.update(&calm(), 105.1));
        assert_eq!(gate.open_since(), None);
        assert_eq!(gate.last_closed(), Some(105.1));

        let closed = sink.of_type("window_closed");
        assert_eq!(closed.len(), 1);
        match &closed[0].event {
            AuditEvent::WindowClosed { open_for_s, metrics } => {
                assert!((open_for_s - 5.1).abs() < 1e-9);
                assert_eq!(*metrics, calm());
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(closed[0].ts, 105.1);
    }

    #[test]
    fn test_cooldown_ignores_trigger() {
        let (mut gate, sink) = gate();
        gate.update(&triggering(), 0.0);
        gate.update(&calm(), 5.0);
        assert!(!gate.is_open());

        assert!(!gate.update(&triggering(), 9.9));
        assert!(gate.update(&triggering(), 10.1));
        assert_eq!(sink.of_type("window_opened").len(), 2);
    }

    #[test]
    fn test_stays_open_while_triggered() {
        let (mut gate, sink) = gate();
        gate.update(&triggering(), 0.0);
        for t in 1..1000 {
            assert!(gate.update(&triggering(), t as f64));
        }
        assert!(sink.of_type("window_closed").is_empty());
    }

    #[test]
    fn test_step_reports_edges() {
        let (mut gate, _) = gate();
        assert_eq!(gate.step(&calm(), 0.0), GateTransition::Unchanged);
        assert_eq!(gate.step(&triggering(), 1.0), GateTransition::Opened);
        assert_eq!(gate.step(&triggering(), 2.0), GateTransition::Unchanged);
        match gate.step(&calm(), 7.0) {
            GateTransition::Closed { open_for_s } => assert_eq!(open_for_s, 6.0),
            other => panic!("expected close, got {:?}", other),
        }
    }

    #[test]
    fn test_snapshot_invariant() {
        let (mut gate, _) = gate();
        let s = gate.snapshot();
        assert!(!s.is_open && s.open_since.is_none() && s.last_closed.is_none());

        gate.update(&triggering(), 3.0);
        let s = gate.snapshot();
        assert!(s.is_open);
        assert_eq!(s.open_since, Some(3.0));
    }

    #[test]
    fn test_nonsense_inputs_do_not_panic() {
        let (mut gate, _) = gate();
        let weird = MetricsSample::new(f64::NAN, f64::INFINITY, -5.0, -10);
        assert!(!gate.update(&weird, f64::NAN));
        gate.update(&triggering(), 1.0);
        // Backwards clock: negative dwell keeps it open
        assert!(gate.update(&calm(), -50.0));
    }

    #[test]
    fn test_try_new_validates() {
        let bad = GateConfig { cooldown_s: -1.0, ..Default::default() };
        assert!(AdmissionGate::try_new(bad.clone(), Arc::new(MemoryAuditSink::new())).is_err());
        // The infallible constructor accepts it
        let gate = AdmissionGate::new(bad, Arc::new(MemoryAuditSink::new()));
        assert_eq!(gate.config().cooldown_s, -1.0);
    }
}
