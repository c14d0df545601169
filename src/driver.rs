//! Control Loop
//!
//! Drives a [`SharedController`] from a stream of metrics: one sample per
//! tick, and on every close transition either flush or drop whatever the
//! gate held back.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::controller::SharedController;
use crate::gate::{GateTransition, MetricsSample};

/// Where the loop gets its per-tick metrics.
#[async_trait]
pub trait MetricsSource: Send {
    /// Next sample, given the current buffer length. `None` ends the loop.
    async fn next_sample(&mut self, queue_len: usize) -> Option<MetricsSample>;
}

/// Replays a fixed list of samples, substituting the live queue length.
pub struct ReplaySource {
    samples: VecDeque<MetricsSample>,
}

impl ReplaySource {
    pub fn new(samples: impl IntoIterator<Item = MetricsSample>) -> Self {
        Self {
            samples: samples.into_iter().collect(),
        }
    }
}

#[async_trait]
impl MetricsSource for ReplaySource {
    async fn next_sample(&mut self, queue_len: usize) -> Option<MetricsSample> {
        self.samples.pop_front().map(|m| m.with_queue_len(queue_len))
    }
}

/// What to do with held-back actions when the gate closes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClosePolicy {
    #[default]
    Flush,
    Drop,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoopReport {
    pub ticks: u64,
    pub opened: u64,
    pub closed: u64,
    pub flushed: usize,
    pub failed: usize,
    pub dropped: usize,
}

pub struct ControlLoop<S: MetricsSource> {
    controller: SharedController,
    source: S,
    tick: Duration,
    policy: ClosePolicy,
}

impl<S: MetricsSource> ControlLoop<S> {
    /// Ticks are stamped with the controller's clock, the same one the buffer uses.
    pub fn new(controller: SharedController, source: S) -> Self {
        Self {
            controller,
            source,
            tick: Duration::from_millis(50),
            policy: ClosePolicy::default(),
        }
    }

    /// Tick period. Zero runs samples back to back.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn with_policy(mut self, policy: ClosePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn controller(&self) -> &SharedController {
        &self.controller
    }

    /// Run until the source is exhausted.
    pub async fn run(mut self) -> LoopReport {
        let mut ticker: Option<Interval> = (!self.tick.is_zero()).then(|| {
            let mut t = interval(self.tick);
            t.set_missed_tick_behavior(MissedTickBehavior::Delay);
            t
        });
        let mut report = LoopReport::default();
        info!("Control loop started (tick={:?}, on close: {:?})", self.tick, self.policy);

        loop {
            match ticker.as_mut() {
                Some(t) => {
                    t.tick().await;
                }
                None => tokio::task::yield_now().await,
            }

            let queue_len = self.controller.len();
            let Some(sample) = self.source.next_sample(queue_len).await else {
                break;
            };
            report.ticks += 1;

            match self.controller.tick_now(&sample) {
                GateTransition::Opened => report.opened += 1,
                GateTransition::Closed { open_for_s } => {
                    report.closed += 1;
                    debug!("Gate closed after {:.3}s, applying {:?}", open_for_s, self.policy);
                    self.on_close(&mut report).await;
                }
                GateTransition::Unchanged => {}
            }
        }

        info!(
            "Control loop finished: {} ticks, {} opened, {} closed, {} flushed, {} dropped",
            report.ticks, report.opened, report.closed, report.flushed, report.dropped
        );
        report
    }

    async fn on_close(&self, report: &mut LoopReport) {
        match self.policy {
            ClosePolicy::Drop => report.dropped += self.controller.drop_all(),
            ClosePolicy::Flush => {
                // Actions may block; keep them off the async workers
                let controller = self.controller.clone();
                match tokio::task::spawn_blocking(move || controller.flush()).await {
                    Ok(results) => {
                        report.failed += results.iter().filter(|r| !r.is_executed()).count();
                        report.flushed += results.len();
                    }
                    Err(e) => error!("Flush task aborted: {}", e),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::clock::ManualClock;
    use crate::gate::GateConfig;
    use anyhow::Result;
    use serde_json::Value;
    use std::sync::Arc;

    /// Advances a manual clock by a fixed step per sample.
    struct SteppedSource {
        inner: ReplaySource,
        clock: ManualClock,
        step: f64,
    }

    #[async_trait]
    impl MetricsSource for SteppedSource {
        async fn next_sample(&mut self, queue_len: usize) -> Option<MetricsSample> {
            let sample = self.inner.next_sample(queue_len).await?;
            self.clock.advance(self.step);
            Some(sample)
        }
    }

    fn setup(policy: ClosePolicy) -> (ControlLoop<SteppedSource>, Arc<MemoryAuditSink>) {
        let sink = Arc::new(MemoryAuditSink::new());
        let clock = ManualClock::new(0.0);
        let config = GateConfig {
            min_queue_len: 0,
            min_open_s: 1.0,
            cooldown_s: 1.0,
            ..Default::default()
        };
        let controller = SharedController::new(config, sink.clone(), Arc::new(clock.clone()));

        let hot = MetricsSample::new(1.0, 1.0, 0.9, 0);
        let calm = MetricsSample::new(1.0, 0.1, 0.1, 0);
        let samples = [vec![hot; 3], vec![calm; 5]].concat();
        let source = SteppedSource {
            inner: ReplaySource::new(samples),
            clock: clock.clone(),
            step: 0.5,
        };

        let ctl = controller.clone();
        ctl.tick(&hot, 0.0);
        ctl.submit("deploy", || -> Result<Value> { Ok(Value::Null) });
        ctl.submit("delete_file", || -> Result<Value> { anyhow::bail!("locked") });

        (
            ControlLoop::new(controller, source)
                .with_tick(Duration::ZERO)
                .with_policy(policy),
            sink,
        )
    }

    #[tokio::test]
    async fn test_loop_flushes_on_close() {
        let (control, sink) = setup(ClosePolicy::Flush);
        let controller = control.controller().clone();
        let report = control.run().await;

        assert_eq!(report.ticks, 8);
        assert_eq!(report.closed, 1);
        assert_eq!(report.flushed, 2);
        assert_eq!(report.failed, 1);
        assert!(controller.is_empty());
        assert_eq!(sink.of_type("commit_flushed").len(), 2);
    }

    #[tokio::test]
    async fn test_loop_drops_on_close() {
        let (control, sink) = setup(ClosePolicy::Drop);
        let report = control.run().await;

        assert_eq!(report.dropped, 2);
        assert_eq!(report.flushed, 0);
        assert!(sink.of_type("commit_flushed").is_empty());
        assert_eq!(sink.of_type("commit_dropped").len(), 1);
    }

    #[test]
    fn test_replay_source_injects_queue_len() {
        let mut source = ReplaySource::new([MetricsSample::new(1.0, 1.0, 0.5, -1)]);
        let first = tokio_test::block_on(source.next_sample(4)).unwrap();
        assert_eq!(first.irreversible_queue_len, 4);
        assert!(tokio_test::block_on(source.next_sample(0)).is_none());
    }

    #[tokio::test]
    async fn test_loop_with_real_interval() {
        let sink = Arc::new(MemoryAuditSink::new());
        let clock = Arc::new(ManualClock::new(0.0));
        let controller = SharedController::new(GateConfig::default(), sink, clock);
        let source = ReplaySource::new(vec![MetricsSample::new(1.0, 0.0, 0.0, 0); 3]);
        let report = ControlLoop::new(controller, source)
            .with_tick(Duration::from_millis(1))
            .run()
            .await;
        assert_eq!(report.ticks, 3);
        assert_eq!(report.opened, 0);
    }
}
