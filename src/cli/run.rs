//! `cdchain run` - Run delivery chains
//!
//! Wires the broker and stages, triggers `chains` simulated pushes
//! concurrently and prints the resulting event history.
//!
//! ```bash
//! cdchain run
//! cdchain run --scan-outcome fail --format json
//! cdchain run --chains 3 --config cdchain.yaml
//! ```

use anyhow::{Context, Result};
use cdchain::{CdEvent, ChainReport, Config, PipelineOrchestrator};
use std::fmt::Write;
use std::sync::Arc;

/// Repository used when none is given
pub const DEFAULT_REPO_URL: &str = "https://git.example.com/my-org/my-app";

/// Commit used when none is given
pub const DEFAULT_COMMIT_SHA: &str = "abc123def456";

/// How the history is printed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Numbered listing plus a per-chain summary
    Text,
    /// JSON array of envelopes
    Json,
}

/// Options for a run
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub repo_url: String,
    pub commit_sha: String,
    pub chains: usize,
    pub format: OutputFormat,
}

/// Runs the chains and renders the history
pub async fn run_chains(config: Config, options: &RunOptions) -> Result<String> {
    if options.chains == 0 {
        anyhow::bail!("--chains must be at least 1");
    }

    let orchestrator = PipelineOrchestrator::new(config);
    let pushes: Vec<(String, String)> = (0..options.chains)
        .map(|_| (options.repo_url.clone(), options.commit_sha.clone()))
        .collect();

    for result in orchestrator.run_chains(&pushes).await {
        result.context("Chain failed")?;
    }

    let history = orchestrator.history().snapshot();
    match options.format {
        OutputFormat::Text => Ok(format_history(&history, &orchestrator.chain_reports())),
        OutputFormat::Json => format_json(&history),
    }
}

/// Numbered event listing followed by one line per chain
pub fn format_history(events: &[Arc<CdEvent>], reports: &[ChainReport]) -> String {
    let mut output = String::from("--- Event History ---\n");

    for (i, event) in events.iter().enumerate() {
        let context = event.context();
        let _ = writeln!(output, "{}. {}", i + 1, context.event_type());
        let _ = writeln!(output, "   Subject: {}", event.subject().id());
        let _ = writeln!(output, "   Chain ID: {}", context.chain_id());
        let _ = writeln!(output, "   Timestamp: {}", context.timestamp());
        output.push('\n');
    }

    output.push_str("--- Chains ---\n");
    for report in reports {
        let state = report
            .state
            .map_or_else(|| "unknown".to_string(), |s| s.to_string());
        let _ = writeln!(
            output,
            "{}: {} ({} events)",
            report.chain_id,
            state,
            report.events.len()
        );
    }

    output
}

/// Pretty JSON array of envelopes
pub fn format_json(events: &[Arc<CdEvent>]) -> Result<String> {
    let values = events
        .iter()
        .map(|e| e.to_value())
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to encode event history")?;
    serde_json::to_string_pretty(&values).context("Failed to encode event history")
}
