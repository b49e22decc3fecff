//! `cdchain ingest` - Publish envelopes from a file
//!
//! The stages are wired before ingesting, so envelopes that start or
//! continue a chain drive the remaining stages.
//!
//! ```bash
//! cdchain ingest events.json
//! cdchain ingest events.ndjson --config cdchain.yaml
//! ```

use anyhow::{Context, Result};
use cdchain::{Config, IngestResult, IngestStatus, PipelineOrchestrator};
use std::fmt::Write;
use std::fs;
use std::path::Path;

/// Ingests every envelope in `file` and renders per-item results
pub async fn ingest_file(config: Config, file: &Path) -> Result<String> {
    let text = fs::read_to_string(file)
        .with_context(|| format!("Failed to read envelopes: {}", file.display()))?;

    let orchestrator = PipelineOrchestrator::new(config);
    let results = orchestrator.ingestor().ingest_batch(&text).await;
    Ok(format_results(&results))
}

/// One line per item and a `Published x/y` summary
pub fn format_results(results: &[IngestResult]) -> String {
    let mut output = String::new();
    for result in results {
        let _ = writeln!(
            output,
            "{}: {} - {}",
            result.id.as_deref().unwrap_or("<unknown>"),
            result.status,
            result.message
        );
    }

    let published = results
        .iter()
        .filter(|r| r.status == IngestStatus::Published)
        .count();
    let _ = write!(output, "Published {}/{}", published, results.len());
    output
}
