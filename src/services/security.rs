//! Security scan stage: `build.finished` -> `testsuiterun.finished`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

use super::{PipelineStage, SimulatedWork, StageDeps, SubjectFields};
use crate::broker::{EventBroker, EventHandler, HandlerError};
use crate::events::{
    BUILD_FINISHED, CdEvent, Content, EnvelopeError, SubjectType, TESTSUITERUN_FINISHED,
};

/// Source written into scan events
pub const SECURITY_SOURCE: &str = "/event/source/security";

/// Test suite name reported for scans
pub const SCAN_SUITE_NAME: &str = "security-scan";

/// Result of a security scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanOutcome {
    /// Artifact may be deployed
    #[default]
    Pass,
    /// Chain halts here
    Fail,
}

impl ScanOutcome {
    /// Wire value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
        }
    }

    /// True for [`ScanOutcome::Pass`]
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }
}

impl fmt::Display for ScanOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanOutcome {
    type Err = EnvelopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pass" => Ok(Self::Pass),
            "fail" => Ok(Self::Fail),
            other => Err(EnvelopeError::InvalidContent {
                key: "outcome".to_string(),
                reason: format!("expected 'pass' or 'fail', got '{other}'"),
            }),
        }
    }
}

/// Container security scanning service
#[derive(Debug, Clone)]
pub struct SecurityScanService {
    deps: StageDeps,
    work: SimulatedWork,
    outcome: ScanOutcome,
}

impl SecurityScanService {
    /// Creates a service that reports `outcome` for every scan
    pub fn new(deps: StageDeps, work: SimulatedWork, outcome: ScanOutcome) -> Self {
        Self {
            deps,
            work,
            outcome,
        }
    }

    /// Outcome this service reports
    pub fn outcome(&self) -> ScanOutcome {
        self.outcome
    }

    async fn scan_container(&self, artifact_id: &str, chain_id: &str) -> Result<(), HandlerError> {
        let scan_id = self.deps.next_id();
        info!(artifact = %artifact_id, "Starting security scan");
        self.work.perform("scan").await;

        let mut content = Content::new();
        content.insert(
            "testSuite".to_string(),
            json!({"id": scan_id, "name": SCAN_SUITE_NAME}),
        );
        content.insert("outcome".to_string(), json!(self.outcome.as_str()));
        content.insert("artifactId".to_string(), json!(artifact_id));

        let event = self.deps.event(
            SECURITY_SOURCE,
            TESTSUITERUN_FINISHED,
            Some(chain_id),
            SubjectFields {
                id: format!("scan/{scan_id}"),
                subject_type: SubjectType::TestSuiteRun,
                content,
            },
        )?;
        self.deps.broker().publish(event).await?;
        info!(artifact = %artifact_id, outcome = %self.outcome, "Security scan completed");
        Ok(())
    }
}

#[async_trait]
impl EventHandler for SecurityScanService {
    fn name(&self) -> &str {
        "security"
    }

    async fn handle(&self, event: Arc<CdEvent>) -> Result<(), HandlerError> {
        info!(build = %event.subject().id(), "Security service handling build finished");
        let artifact_id = event.subject().require_str("artifactId")?;
        self.scan_container(artifact_id, event.chain_id()).await
    }
}

impl PipelineStage for SecurityScanService {
    fn upstream(&self) -> &'static str {
        BUILD_FINISHED
    }

    fn broker(&self) -> &Arc<dyn EventBroker> {
        self.deps.broker()
    }
}
