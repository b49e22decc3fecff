//! Build stage: `repository.modified` -> `build.finished`.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use super::{PipelineStage, SimulatedWork, StageDeps, SubjectFields, repository_name};
use crate::broker::{EventBroker, EventHandler, HandlerError};
use crate::events::{BUILD_FINISHED, CdEvent, Content, REPOSITORY_MODIFIED, SubjectType};

/// Source written into build events
pub const BUILD_SOURCE: &str = "/event/source/build";

/// Container build service
#[derive(Debug, Clone)]
pub struct BuildService {
    deps: StageDeps,
    work: SimulatedWork,
}

impl BuildService {
    /// Creates the service
    pub fn new(deps: StageDeps, work: SimulatedWork) -> Self {
        Self { deps, work }
    }

    /// Simulated OCI artifact id for an image named `name`
    pub fn artifact_id(name: &str) -> String {
        format!("pkg:oci/{name}@sha256:{}", "a".repeat(64))
    }

    async fn start_build(
        &self,
        repo_url: &str,
        repo_name: &str,
        repo_id: &str,
        chain_id: &str,
    ) -> Result<(), HandlerError> {
        let build_id = self.deps.next_id();
        info!(repository = %repo_id, url = %repo_url, "Building container");
        self.work.perform("build").await;

        let artifact_id = Self::artifact_id(repo_name);
        let mut content = Content::new();
        content.insert("artifactId".to_string(), json!(artifact_id));

        let event = self.deps.event(
            BUILD_SOURCE,
            BUILD_FINISHED,
            Some(chain_id),
            SubjectFields {
                id: format!("build/{build_id}"),
                subject_type: SubjectType::Build,
                content,
            },
        )?;
        self.deps.broker().publish(event).await?;
        info!(artifact = %artifact_id, "Build finished");
        Ok(())
    }
}

#[async_trait]
impl EventHandler for BuildService {
    fn name(&self) -> &str {
        "build"
    }

    async fn handle(&self, event: Arc<CdEvent>) -> Result<(), HandlerError> {
        let subject = event.subject();
        info!(repository = %subject.id(), "Build service handling repository change");

        let url = subject.require_str("url")?;
        let name = match subject.get("name").and_then(|v| v.as_str()) {
            Some(name) => name.to_string(),
            None => repository_name(url).ok_or_else(|| {
                HandlerError::Failed(format!("cannot derive an image name from '{url}'"))
            })?,
        };

        self.start_build(url, &name, subject.id(), event.chain_id())
            .await
    }
}

impl PipelineStage for BuildService {
    fn upstream(&self) -> &'static str {
        REPOSITORY_MODIFIED
    }

    fn broker(&self) -> &Arc<dyn EventBroker> {
        self.deps.broker()
    }
}
