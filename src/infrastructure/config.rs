//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::broker::DispatchPolicy;
use crate::errors::{PipelineError, PipelineResult};
use crate::services::{ScanOutcome, SimulatedWork};

/// Environment variable overriding [`Config::log_level`]
pub const LOG_ENV: &str = "CDCHAIN_LOG";

/// Simulated latency of each stage, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageDelays {
    /// Build latency
    pub build_ms: u64,
    /// Scan latency
    pub scan_ms: u64,
    /// Deploy latency
    pub deploy_ms: u64,
}

impl Default for StageDelays {
    fn default() -> Self {
        Self {
            build_ms: 2000,
            scan_ms: 1000,
            deploy_ms: 1000,
        }
    }
}

impl StageDelays {
    /// No simulated latency at all
    #[must_use]
    pub fn none() -> Self {
        Self {
            build_ms: 0,
            scan_ms: 0,
            deploy_ms: 0,
        }
    }

    /// Build work
    pub fn build(&self) -> SimulatedWork {
        SimulatedWork::new(Duration::from_millis(self.build_ms))
    }

    /// Scan work
    pub fn scan(&self) -> SimulatedWork {
        SimulatedWork::new(Duration::from_millis(self.scan_ms))
    }

    /// Deploy work
    pub fn deploy(&self) -> SimulatedWork {
        SimulatedWork::new(Duration::from_millis(self.deploy_ms))
    }
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level
    pub log_level: String,
    /// Simulated stage latency
    pub delays: StageDelays,
    /// Outcome every security scan reports
    pub scan_outcome: ScanOutcome,
    /// Environment id deployments target
    pub deploy_environment: String,
    /// Upper bound on waiting for a chain to settle
    pub settle_timeout_secs: u64,
    /// Behaviour when a subscriber fails
    pub dispatch_policy: DispatchPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            delays: StageDelays::default(),
            scan_outcome: ScanOutcome::Pass,
            deploy_environment: "staging".to_string(),
            settle_timeout_secs: 30,
            dispatch_policy: DispatchPolicy::FailFast,
        }
    }
}

impl Config {
    /// Loads a YAML file; missing keys keep their defaults
    pub fn from_file(path: &Path) -> PipelineResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    /// Parses YAML text
    pub fn from_yaml(text: &str) -> PipelineResult<Self> {
        let config: Self =
            serde_yaml::from_str(text).map_err(|e| PipelineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Applies the `CDCHAIN_LOG` override from the process environment
    #[must_use]
    pub fn apply_env(self) -> Self {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Applies overrides read through `lookup`; blank values are ignored
    #[must_use]
    pub fn apply_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(level) = lookup(LOG_ENV).filter(|l| !l.trim().is_empty()) {
            self.log_level = level;
        }
        self
    }

    /// Rejects settings no chain can run with
    pub fn validate(&self) -> PipelineResult<()> {
        if self.deploy_environment.trim().is_empty() {
            return Err(PipelineError::Config(
                "deploy_environment cannot be empty".to_string(),
            ));
        }
        if self.settle_timeout_secs == 0 {
            return Err(PipelineError::Config(
                "settle_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Settle timeout as a duration
    pub fn settle_timeout(&self) -> Duration {
        Duration::from_secs(self.settle_timeout_secs)
    }

    /// Same configuration without simulated latency
    #[must_use]
    pub fn without_delays(mut self) -> Self {
        self.delays = StageDelays::none();
        self
    }

    /// Same configuration with a forced scan outcome
    #[must_use]
    pub fn with_scan_outcome(mut self, outcome: ScanOutcome) -> Self {
        self.scan_outcome = outcome;
        self
    }
}
