//! CLI tools for cdchain
//!
//! - `run`: Run delivery chains and print the event history
//! - `ingest`: Publish envelopes from a file into the pipeline
//! - `completions`: Generate shell completions

pub mod completions;
pub mod ingest;
pub mod run;

use anyhow::{Context, Result};
use cdchain::{Config, ScanOutcome};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

/// CLI arguments for cdchain
#[derive(Parser, Debug)]
#[command(name = "cdchain")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one or more delivery chains and print the event history
    Run {
        /// Repository the simulated push targets
        #[arg(long, default_value = run::DEFAULT_REPO_URL)]
        repo_url: String,
        /// Commit of the simulated push
        #[arg(long, default_value = run::DEFAULT_COMMIT_SHA)]
        commit_sha: String,
        /// Force the security scan outcome
        #[arg(long, value_enum)]
        scan_outcome: Option<ScanOutcomeArg>,
        /// Number of concurrent chains
        #[arg(long, default_value_t = 1)]
        chains: usize,
        /// Configuration file (YAML)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Output format
        #[arg(short, long, value_enum, default_value_t = FormatArg::Text)]
        format: FormatArg,
    },

    /// Publish envelopes from a JSON array or NDJSON file
    Ingest {
        /// Envelope file
        file: PathBuf,
        /// Configuration file (YAML)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Generate shell completions
    Completions {
        /// Shell type
        #[arg(value_enum)]
        shell: ShellArg,
        /// Output file (stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum ScanOutcomeArg {
    Pass,
    Fail,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum ShellArg {
    Bash,
    Zsh,
    Fish,
    PowerShell,
}

/// Build the CLI command for completion generation
pub fn build_cli() -> clap::Command {
    Args::command()
}

/// Loads the configuration file if given, then applies the env override
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => Config::default(),
    };
    Ok(config.apply_env())
}

/// Parse and execute CLI arguments
pub fn run() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Run {
            repo_url,
            commit_sha,
            scan_outcome,
            chains,
            config,
            format,
        } => {
            let mut config = load_config(config.as_deref())?;
            cdchain::init_logging(&config.log_level);
            if let Some(outcome) = scan_outcome {
                config = config.with_scan_outcome(match outcome {
                    ScanOutcomeArg::Pass => ScanOutcome::Pass,
                    ScanOutcomeArg::Fail => ScanOutcome::Fail,
                });
            }

            let options = run::RunOptions {
                repo_url,
                commit_sha,
                chains,
                format: match format {
                    FormatArg::Text => run::OutputFormat::Text,
                    FormatArg::Json => run::OutputFormat::Json,
                },
            };
            let output = runtime()?.block_on(run::run_chains(config, &options))?;
            println!("{}", output);
        }
        Command::Ingest { file, config } => {
            let config = load_config(config.as_deref())?;
            cdchain::init_logging(&config.log_level);

            let output = runtime()?.block_on(ingest::ingest_file(config, &file))?;
            println!("{}", output);
        }
        Command::Completions { shell, output } => {
            use clap_complete::Shell;

            let shell_enum = match shell {
                ShellArg::Bash => Shell::Bash,
                ShellArg::Zsh => Shell::Zsh,
                ShellArg::Fish => Shell::Fish,
                ShellArg::PowerShell => Shell::PowerShell,
            };

            let completions = completions::generate_completions(shell_enum)?;

            if let Some(output_path) = output {
                completions::save_completions(&completions, &output_path)?;
            } else {
                println!("{}", completions);
            }
        }
    }

    Ok(())
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")
}
