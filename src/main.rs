//! Commit Gate demo
//!
//! Runs the reference scenario: self-gate strength ramps up while the
//! tempo-mismatch ratio spikes, and irreversible actions are held back while
//! the gate is open. Audit events go to a JSON-lines file and the log.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use commit_gate::audit::{FanoutAuditSink, JsonlAuditSink, MemoryAuditSink, TracingAuditSink};
use commit_gate::gate::GateConfig;
use commit_gate::scenario::Scenario;
use commit_gate::utils::init_logging;

// ──────────────────────────────────────────────────────────────────────────────
// CONFIGURATION
// ──────────────────────────────────────────────────────────────────────────────

/// Runtime settings for the demo
struct DemoConfig {
    /// Optional YAML/JSON gate config file
    config_file: Option<String>,
    /// JSON-lines audit output
    audit_path: String,
}

impl DemoConfig {
    fn from_env() -> Self {
        Self {
            config_file: std::env::var("COMMIT_GATE_CONFIG").ok(),
            audit_path: std::env::var("COMMIT_GATE_AUDIT_PATH")
                .unwrap_or_else(|_| "commit_gate_audit.jsonl".to_string()),
        }
    }

    fn gate_config(&self) -> Result<GateConfig> {
        match &self.config_file {
            Some(path) => GateConfig::from_file(path).with_context(|| format!("loading {}", path)),
            None if has_gate_env() => Ok(GateConfig::from_env()?),
            None => Ok(Scenario::reference_config()),
        }
    }
}

fn has_gate_env() -> bool {
    std::env::vars().any(|(k, _)| k.starts_with("COMMIT_GATE_") && k != "COMMIT_GATE_AUDIT_PATH")
}

// ──────────────────────────────────────────────────────────────────────────────
// MAIN ENTRY POINT
// ──────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_logging()?;

    let demo = DemoConfig::from_env();
    let config = demo.gate_config()?;
    info!("Gate config: {:?}", config);

    let memory = Arc::new(MemoryAuditSink::new());
    let audit = Arc::new(
        FanoutAuditSink::new()
            .with_sink(Arc::new(JsonlAuditSink::open(&demo.audit_path)?))
            .with_sink(Arc::new(TracingAuditSink))
            .with_sink(memory.clone()),
    );

    println!("\n{}", "═".repeat(60));
    println!("Commit Gate v{}", env!("CARGO_PKG_VERSION"));
    println!("{}", "═".repeat(60));

    let scenario = Scenario::default();
    let report = tokio::task::spawn_blocking(move || scenario.run(&config, audit)).await?;

    println!("Window opened at ticks: {:?}", report.opened_at);
    println!("Window closed at ticks: {:?}", report.closed_at);
    println!(
        "Commits: {} immediate ({} failed), {} deferred, {} still queued",
        report.executed_immediately, report.immediate_failures, report.deferred, report.remaining
    );
    for result in &report.flushed {
        println!("  {}", serde_json::to_string(result)?);
    }
    println!("Audit events: {} written to {}", memory.len(), demo.audit_path);
    println!("{}\n", "═".repeat(60));

    Ok(())
}
