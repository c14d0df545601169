//! Metrics Sample
//!
//! One immutable snapshot of the decision process health, taken once per tick.

use serde::{Deserialize, Serialize};

/// Health metrics observed for a single control tick.
///
/// Values are taken as-is. Out-of-range inputs (negative queue lengths, a
/// self-gate strength outside `[0, 1]`) are not rejected here.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricsSample {
    /// Seconds per irreversible-decision cycle.
    pub decision_cycle_s: f64,
    /// Seconds for an external corrective signal to take effect.
    pub correction_latency_s: f64,
    /// Internal self-restraint pressure, nominally in `[0, 1]`.
    pub self_gate_strength: f64,
    /// Pending irreversible commits, usually the buffer's own length.
    pub irreversible_queue_len: i64,
}

impl MetricsSample {
    pub fn new(
        decision_cycle_s: f64,
        correction_latency_s: f64,
        self_gate_strength: f64,
        irreversible_queue_len: i64,
    ) -> Self {
        Self {
            decision_cycle_s,
            correction_latency_s,
            self_gate_strength,
            irreversible_queue_len,
        }
    }

    /// Tempo mismatch: correction latency over decision cadence.
    ///
    /// A zero or negative cycle is a degenerate, instantaneous cadence and
    /// yields `+inf` (maximal mismatch) rather than an error.
    pub fn correction_latency_ratio(&self) -> f64 {
        if self.decision_cycle_s <= 0.0 {
            f64::INFINITY
        } else {
            self.correction_latency_s / self.decision_cycle_s
        }
    }

    /// Same sample with the queue length replaced.
    pub fn with_queue_len(mut self, len: usize) -> Self {
        self.irreversible_queue_len = i64::try_from(len).unwrap_or(i64::MAX);
        self
    }
}
