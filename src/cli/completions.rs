//! `cdchain completions` - Generate shell completions
//!
//! Completes the `run`/`ingest` subcommands and their flags, including the
//! `--scan-outcome` and `--format` values. Supports bash, zsh, fish, and
//! PowerShell.
//!
//! ```bash
//! cdchain completions zsh -o ~/.zsh/completion/_cdchain
//! ```

use anyhow::{Context, Result};
use clap_complete::Shell;
use std::fs;
use std::path::Path;

/// Renders the completion script for `shell` from the derived CLI
pub fn generate_completions(shell: Shell) -> Result<String> {
    use clap_complete::generate;

    let mut cmd = super::build_cli();
    let mut buf = Vec::new();
    generate(shell, &mut cmd, "cdchain", &mut buf);

    String::from_utf8(buf).context("Failed to generate completions")
}

/// Writes a rendered script to `output_path`
pub fn save_completions(completions: &str, output_path: &Path) -> Result<()> {
    fs::write(output_path, completions)
        .with_context(|| format!("Failed to write completions to: {}", output_path.display()))?;
    Ok(())
}
