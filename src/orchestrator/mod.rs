//! Pipeline orchestration
//!
//! [`PipelineOrchestrator`] owns the broker, wires every stage and the
//! wildcard [`ChainMonitor`], triggers chains and exposes the history for
//! auditing.

pub mod chain;
pub mod monitor;

pub use chain::{ChainReport, ChainState, TransitionError};
pub use monitor::ChainMonitor;

use futures::future::join_all;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, instrument, warn};

use crate::broker::{EventBroker, EventHandler, EventHistory, InMemoryEventBroker};
use crate::errors::{PipelineError, PipelineResult};
use crate::events::{IdGenerator, UuidGenerator, WILDCARD};
use crate::infrastructure::{Config, EnvelopeIngestor, MetricsCollector};
use crate::services::{
    BuildService, DeploymentService, PipelineStage, RepositoryService, SecurityScanService,
    StageDeps,
};

/// Assembles the broker, the four stages and the monitor
#[derive(Debug)]
pub struct PipelineOrchestrator {
    config: Config,
    broker: Arc<InMemoryEventBroker>,
    ids: Arc<dyn IdGenerator>,
    repository: RepositoryService,
    build: Arc<BuildService>,
    security: Arc<SecurityScanService>,
    deployment: Arc<DeploymentService>,
    monitor: Arc<ChainMonitor>,
    metrics: Arc<MetricsCollector>,
    initialized: AtomicBool,
}

impl PipelineOrchestrator {
    /// Creates an orchestrator generating UUID identifiers
    pub fn new(config: Config) -> Self {
        Self::with_id_generator(config, Arc::new(UuidGenerator))
    }

    /// Creates an orchestrator with a custom id source
    pub fn with_id_generator(config: Config, ids: Arc<dyn IdGenerator>) -> Self {
        let broker = Arc::new(InMemoryEventBroker::with_policy(config.dispatch_policy));
        let deps = StageDeps::new(
            Arc::clone(&broker) as Arc<dyn EventBroker>,
            Arc::clone(&ids),
        );
        let metrics = Arc::new(MetricsCollector::new());

        Self {
            repository: RepositoryService::new(deps.clone()),
            build: Arc::new(BuildService::new(deps.clone(), config.delays.build())),
            security: Arc::new(SecurityScanService::new(
                deps.clone(),
                config.delays.scan(),
                config.scan_outcome,
            )),
            deployment: Arc::new(DeploymentService::new(
                deps,
                config.delays.deploy(),
                config.deploy_environment.clone(),
            )),
            monitor: Arc::new(ChainMonitor::new(Arc::clone(&metrics))),
            metrics,
            broker,
            ids,
            config,
            initialized: AtomicBool::new(false),
        }
    }

    /// Registers every subscription. Idempotent; runs before the first
    /// publish so no stage misses the start of a chain.
    pub fn initialize(&self) {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return;
        }

        // The monitor goes first so it sees nested publishes in publish order
        self.broker.subscribe(
            &[WILDCARD],
            Arc::clone(&self.monitor) as Arc<dyn EventHandler>,
        );
        Arc::clone(&self.build).initialize();
        Arc::clone(&self.security).initialize();
        Arc::clone(&self.deployment).initialize();

        info!(
            policy = ?self.broker.policy(),
            scan_outcome = %self.config.scan_outcome,
            environment = %self.config.deploy_environment,
            "Pipeline initialized"
        );
    }

    /// Simulates a push and returns the new chain id
    pub async fn trigger(&self, repo_url: &str, commit_sha: &str) -> PipelineResult<String> {
        self.initialize();
        self.repository.simulate_code_push(repo_url, commit_sha).await
    }

    /// Waits for `chain_id` to settle, bounded by the configured timeout
    pub async fn wait_for_terminal(&self, chain_id: &str) -> PipelineResult<ChainState> {
        self.monitor
            .wait_for_terminal(chain_id, self.config.settle_timeout())
            .await
    }

    /// Triggers one chain, waits for it to settle and reports on it
    #[instrument(skip(self))]
    pub async fn run_pipeline(&self, repo_url: &str, commit_sha: &str) -> PipelineResult<ChainReport> {
        let chain_id = self.trigger(repo_url, commit_sha).await?;

        match self.wait_for_terminal(&chain_id).await {
            Ok(state) => info!(chain_id = %chain_id, state = %state, "Pipeline finished"),
            Err(PipelineError::Timeout { waited, .. }) => {
                warn!(chain_id = %chain_id, ?waited, "Chain did not settle");
            }
            Err(err) => return Err(err),
        }
        Ok(self.chain_report(&chain_id))
    }

    /// Runs several chains concurrently; results keep the input order
    pub async fn run_chains(&self, pushes: &[(String, String)]) -> Vec<PipelineResult<ChainReport>> {
        self.initialize();
        join_all(
            pushes
                .iter()
                .map(|(url, sha)| self.run_pipeline(url, sha)),
        )
        .await
    }

    /// Audit view of one chain
    pub fn chain_report(&self, chain_id: &str) -> ChainReport {
        ChainReport::new(chain_id, self.broker.history().for_chain(chain_id))
    }

    /// Reports for every chain in the history, in first-seen order
    pub fn chain_reports(&self) -> Vec<ChainReport> {
        self.broker
            .history()
            .chain_ids()
            .iter()
            .map(|id| self.chain_report(id))
            .collect()
    }

    /// Publishes externally produced envelopes into this pipeline
    pub fn ingestor(&self) -> EnvelopeIngestor {
        self.initialize();
        EnvelopeIngestor::new(Arc::clone(&self.broker) as Arc<dyn EventBroker>)
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The broker
    pub fn broker(&self) -> &Arc<InMemoryEventBroker> {
        &self.broker
    }

    /// Every published event, in publish order
    pub fn history(&self) -> &EventHistory {
        self.broker.history()
    }

    /// The wildcard monitor
    pub fn monitor(&self) -> &Arc<ChainMonitor> {
        &self.monitor
    }

    /// Per-chain metrics
    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    /// Id source shared by every stage
    pub fn id_generator(&self) -> &Arc<dyn IdGenerator> {
        &self.ids
    }
}

impl Drop for PipelineOrchestrator {
    fn drop(&mut self) {
        // Stages hold the broker and the broker holds the stages
        self.broker.clear_subscriptions();
    }
}
