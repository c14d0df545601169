use std::sync::Arc;

use commit_gate::audit::{AuditEvent, MemoryAuditSink};
use commit_gate::gate::{AdmissionGate, GateConfig, MetricsSample};

fn hot() -> MetricsSample {
    MetricsSample::new(1.0, 2.0, 0.95, 4)
}

fn cold() -> MetricsSample {
    MetricsSample::new(1.0, 0.2, 0.95, 4)
}

fn gate() -> (AdmissionGate, Arc<MemoryAuditSink>) {
    let sink = Arc::new(MemoryAuditSink::new());
    let config = GateConfig {
        min_open_s: 5.0,
        cooldown_s: 5.0,
        ..Default::default()
    };
    (AdmissionGate::new(config, sink.clone()), sink)
}

#[test]
fn test_flipping_any_clause_blocks_opening() {
    let (gate, _) = gate();
    let base = hot();
    assert!(gate.should_open(&base));

    let no_ratio = MetricsSample { correction_latency_s: 0.1, ..base };
    let no_strength = MetricsSample { self_gate_strength: 0.1, ..base };
    let no_queue = MetricsSample { irreversible_queue_len: 0, ..base };
    for m in [no_ratio, no_strength, no_queue] {
        assert!(!gate.should_open(&m), "{:?} should not trigger", m);
    }
}

#[test]
fn test_out_of_range_strength_is_an_ordinary_float() {
    let (gate, _) = gate();
    assert!(gate.should_open(&MetricsSample { self_gate_strength: 7.0, ..hot() }));
}

#[test]
fn test_dwell_then_close_then_cooldown() {
    let (mut gate, sink) = gate();
    let t0 = 1_000.0;

    assert!(gate.update(&hot(), t0));
    assert!(gate.update(&cold(), t0 + 4.9), "minimum dwell must hold the gate open");
    assert!(!gate.update(&cold(), t0 + 5.1), "gate must close once dwell elapsed");

    let t1 = t0 + 5.1;
    assert!(!gate.update(&hot(), t1 + 4.9), "cooldown must ignore the trigger");
    assert!(gate.update(&hot(), t1 + 5.1), "gate must reopen after cooldown");

    let kinds: Vec<&str> = sink.records().iter().map(|r| r.event.kind()).collect();
    assert_eq!(kinds, vec!["window_opened", "window_closed", "window_opened"]);

    match &sink.of_type("window_closed")[0].event {
        AuditEvent::WindowClosed { open_for_s, .. } => assert!((open_for_s - 5.1).abs() < 1e-6),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_opened_event_carries_metrics() {
    let (mut gate, sink) = gate();
    gate.update(&hot(), 0.0);
    let opened = sink.of_type("window_opened");
    assert_eq!(opened[0].event, AuditEvent::WindowOpened { metrics: hot() });
    assert_eq!(opened[0].ts, 0.0);
}

#[test]
fn test_first_open_needs_no_cooldown() {
    let (mut gate, _) = gate();
    assert!(gate.last_closed().is_none());
    assert!(gate.update(&hot(), 0.0));
}

#[test]
fn test_zero_windows_track_trigger_directly() {
    let sink = Arc::new(MemoryAuditSink::new());
    let config = GateConfig {
        min_open_s: 0.0,
        cooldown_s: 0.0,
        ..Default::default()
    };
    let mut gate = AdmissionGate::new(config, sink);
    assert!(gate.update(&hot(), 0.0));
    assert!(!gate.update(&cold(), 0.0));
    assert!(gate.update(&hot(), 0.0));
}
