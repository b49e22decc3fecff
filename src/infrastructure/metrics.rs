//! Metrics collection
//!
//! Provides per-chain metrics recorded when a chain settles.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;

use crate::orchestrator::ChainState;

/// Metrics for one chain
#[derive(Debug, Clone, PartialEq)]
pub struct ChainMetrics {
    /// Chain id
    pub chain_id: String,

    /// Time from the first observed event to the terminal one
    pub duration: Duration,

    /// Number of events observed for the chain
    pub event_count: usize,

    /// Terminal state reached
    pub state: ChainState,
}

/// Metrics collector for chains
#[derive(Debug, Default)]
pub struct MetricsCollector {
    metrics: RwLock<HashMap<String, ChainMetrics>>,
}

impl MetricsCollector {
    /// Creates a new metrics collector
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records metrics for a chain, replacing earlier ones
    pub fn record(&self, metrics: ChainMetrics) {
        self.metrics
            .write()
            .insert(metrics.chain_id.clone(), metrics);
    }

    /// Gets metrics for a specific chain
    #[must_use]
    pub fn get(&self, chain_id: &str) -> Option<ChainMetrics> {
        self.metrics.read().get(chain_id).cloned()
    }

    /// Gets all recorded metrics
    #[must_use]
    pub fn get_all(&self) -> Vec<ChainMetrics> {
        self.metrics.read().values().cloned().collect()
    }

    /// Number of chains that reached `Deployed`
    #[must_use]
    pub fn deployed_count(&self) -> usize {
        self.metrics
            .read()
            .values()
            .filter(|m| m.state == ChainState::Deployed)
            .count()
    }
}
