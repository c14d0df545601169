//! Reference Scenario
//!
//! Deterministic single-threaded run of the gate and buffer: self-gate
//! strength ramps up every tick while the tempo-mismatch ratio spikes for a
//! few ticks. One action is submitted per tick; the gate holds them back
//! while open and the loop flushes on close.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::ops::RangeInclusive;
use std::sync::Arc;
use tracing::info;

use crate::audit::AuditSink;
use crate::buffer::{DeferredCommitBuffer, FlushResult, SubmitOutcome};
use crate::clock::ManualClock;
use crate::gate::{AdmissionGate, GateConfig, GateTransition, MetricsSample};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub ticks: usize,
    pub tick_s: f64,
    pub decision_cycle_s: f64,
    pub baseline_latency_s: f64,
    pub spike_latency_s: f64,
    pub spike_ticks: RangeInclusive<usize>,
    pub self_gate_start: f64,
    pub self_gate_step: f64,
    /// Ticks whose submitted action fails.
    pub failing_ticks: Vec<usize>,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            ticks: 40,
            tick_s: 0.05,
            decision_cycle_s: 1.0,
            baseline_latency_s: 0.3,
            spike_latency_s: 1.2,
            spike_ticks: 15..=20,
            self_gate_start: 0.25,
            self_gate_step: 0.03,
            failing_ticks: vec![17],
        }
    }
}

impl Scenario {
    /// Thresholds the scenario is tuned for.
    pub fn reference_config() -> GateConfig {
        GateConfig {
            theta_m: 0.8,
            eps: 0.45,
            min_queue_len: 0,
            min_open_s: 0.3,
            cooldown_s: 0.2,
        }
    }

    pub fn sample(&self, tick: usize, queue_len: usize) -> MetricsSample {
        let latency = if self.spike_ticks.contains(&tick) {
            self.spike_latency_s
        } else {
            self.baseline_latency_s
        };
        MetricsSample::new(
            self.decision_cycle_s,
            latency,
            self.self_gate_start + self.self_gate_step * tick as f64,
            0,
        )
        .with_queue_len(queue_len)
    }

    pub fn run(&self, config: &GateConfig, audit: Arc<dyn AuditSink>) -> ScenarioReport {
        let clock = ManualClock::new(0.0);
        let mut gate = AdmissionGate::new(config.clone(), audit.clone());
        let mut buffer = DeferredCommitBuffer::new(audit, Arc::new(clock.clone()));
        let mut report = ScenarioReport::default();

        for tick in 0..self.ticks {
            let now = tick as f64 * self.tick_s;
            clock.set(now);

            let metrics = self.sample(tick, buffer.len());
            match gate.step(&metrics, now) {
                GateTransition::Opened => report.opened_at.push(tick),
                GateTransition::Closed { .. } => {
                    report.closed_at.push(tick);
                    report.flushed.extend(buffer.flush());
                }
                GateTransition::Unchanged => {}
            }

            let kind = if tick % 2 == 0 { "deploy" } else { "delete_file" };
            let fails = self.failing_ticks.contains(&tick);
            let action = move || -> Result<Value> {
                if fails {
                    anyhow::bail!("{} at tick {} rejected by target", kind, tick);
                }
                Ok(json!({ "tick": tick, "kind": kind }))
            };
            match buffer.submit(kind, action, gate.is_open()) {
                SubmitOutcome::Executed { result, .. } => {
                    report.executed_immediately += 1;
                    if result.is_err() {
                        report.immediate_failures += 1;
                    }
                }
                SubmitOutcome::Deferred { .. } => report.deferred += 1,
            }
        }

        report.remaining = buffer.len();
        report.final_open = gate.is_open();
        info!(
            "Scenario finished: opened at {:?}, closed at {:?}, {} deferred, {} immediate",
            report.opened_at, report.closed_at, report.deferred, report.executed_immediately
        );
        report
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub opened_at: Vec<usize>,
    pub closed_at: Vec<usize>,
    pub executed_immediately: usize,
    pub immediate_failures: usize,
    pub deferred: usize,
    pub flushed: Vec<FlushResult>,
    pub remaining: usize,
    pub final_open: bool,
}
