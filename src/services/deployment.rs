//! Deployment stage: `testsuiterun.finished` -> `service.deployed`.
//!
//! A scan with outcome `fail` ends the chain here without emitting anything.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use super::{PipelineStage, ScanOutcome, SimulatedWork, StageDeps, SubjectFields};
use crate::broker::{EventBroker, EventHandler, HandlerError};
use crate::events::{CdEvent, Content, SERVICE_DEPLOYED, SubjectType, TESTSUITERUN_FINISHED};

/// Source written into deployment events
pub const DEPLOYMENT_SOURCE: &str = "/event/source/deployment";

/// Container deployment service
#[derive(Debug, Clone)]
pub struct DeploymentService {
    deps: StageDeps,
    work: SimulatedWork,
    environment: String,
}

impl DeploymentService {
    /// Creates a service deploying into `environment`
    pub fn new(deps: StageDeps, work: SimulatedWork, environment: impl Into<String>) -> Self {
        Self {
            deps,
            work,
            environment: environment.into(),
        }
    }

    /// Target environment id
    pub fn environment(&self) -> &str {
        &self.environment
    }

    async fn deploy_container(&self, artifact_id: &str, chain_id: &str) -> Result<(), HandlerError> {
        let deployment_id = self.deps.next_id();
        info!(artifact = %artifact_id, environment = %self.environment, "Deploying");
        self.work.perform("deploy").await;

        let mut content = Content::new();
        content.insert("environment".to_string(), json!({"id": self.environment}));
        content.insert("artifactId".to_string(), json!(artifact_id));

        let event = self.deps.event(
            DEPLOYMENT_SOURCE,
            SERVICE_DEPLOYED,
            Some(chain_id),
            SubjectFields {
                id: format!("deployment/{deployment_id}"),
                subject_type: SubjectType::Service,
                content,
            },
        )?;
        self.deps.broker().publish(event).await?;
        info!(artifact = %artifact_id, environment = %self.environment, "Deployment completed");
        Ok(())
    }
}

#[async_trait]
impl EventHandler for DeploymentService {
    fn name(&self) -> &str {
        "deployment"
    }

    async fn handle(&self, event: Arc<CdEvent>) -> Result<(), HandlerError> {
        let subject = event.subject();
        info!(scan = %subject.id(), "Deployment service handling test finished");

        let outcome: ScanOutcome = subject.require_str("outcome")?.parse()?;
        if !outcome.is_pass() {
            info!(chain_id = %event.chain_id(), "Chain halted: scan outcome fail");
            return Ok(());
        }

        let artifact_id = subject.require_str("artifactId")?;
        self.deploy_container(artifact_id, event.chain_id()).await
    }
}

impl PipelineStage for DeploymentService {
    fn upstream(&self) -> &'static str {
        TESTSUITERUN_FINISHED
    }

    fn broker(&self) -> &Arc<dyn EventBroker> {
        self.deps.broker()
    }
}
