//! Repository stage: the origin of every chain.

use serde_json::json;
use tracing::info;
use url::Url;

use super::{StageDeps, SubjectFields};
use crate::errors::{PipelineError, PipelineResult};
use crate::events::{CdEvent, Content, REPOSITORY_MODIFIED, SubjectType};

/// Source written into repository events
pub const REPOSITORY_SOURCE: &str = "/event/source/git";

/// Owner and name parsed from a repository URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryRef {
    /// Organisation or user, second to last path segment
    pub owner: String,
    /// Repository name, last path segment without `.git`
    pub name: String,
    /// The URL as given
    pub url: String,
}

impl RepositoryRef {
    /// Parses `https://host/<owner>/<name>[.git]`
    pub fn parse(raw: &str) -> PipelineResult<Self> {
        let invalid = |reason: &str| PipelineError::InvalidRepository {
            url: raw.to_string(),
            reason: reason.to_string(),
        };

        let url = Url::parse(raw).map_err(|e| invalid(&e.to_string()))?;
        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|p| !p.is_empty()).collect())
            .unwrap_or_default();

        match segments.as_slice() {
            [.., owner, name] => Ok(Self {
                owner: (*owner).to_string(),
                name: name.trim_end_matches(".git").to_string(),
                url: raw.to_string(),
            }),
            _ => Err(invalid("expected an owner and a repository name in the path")),
        }
    }
}

/// Simulates a Git host reporting pushes
#[derive(Debug, Clone)]
pub struct RepositoryService {
    deps: StageDeps,
}

impl RepositoryService {
    /// Creates the service
    pub fn new(deps: StageDeps) -> Self {
        Self { deps }
    }

    /// Builds the `repository.modified` event that starts a new chain
    pub fn push_event(&self, repo_url: &str, commit_sha: &str) -> PipelineResult<CdEvent> {
        if commit_sha.trim().is_empty() {
            return Err(PipelineError::InvalidRepository {
                url: repo_url.to_string(),
                reason: "commit sha is empty".to_string(),
            });
        }
        let repo = RepositoryRef::parse(repo_url)?;

        let mut content = Content::new();
        content.insert("name".to_string(), json!(repo.name));
        content.insert("owner".to_string(), json!(repo.owner));
        content.insert("url".to_string(), json!(repo.url));
        content.insert("viewUrl".to_string(), json!(repo.url));

        let subject = SubjectFields {
            id: format!("repo/{commit_sha}"),
            subject_type: SubjectType::Repository,
            content,
        };
        Ok(self
            .deps
            .event(REPOSITORY_SOURCE, REPOSITORY_MODIFIED, None, subject)?)
    }

    /// Publishes a push and drives the chain it starts. Returns the new
    /// chain id once the synchronous fan-out has finished.
    pub async fn simulate_code_push(
        &self,
        repo_url: &str,
        commit_sha: &str,
    ) -> PipelineResult<String> {
        let event = self.push_event(repo_url, commit_sha)?;
        let chain_id = event.chain_id().to_string();

        self.deps
            .broker()
            .publish(event)
            .await
            .map_err(|source| PipelineError::ChainFailed {
                chain_id: chain_id.clone(),
                source,
            })?;

        info!(repo = %repo_url, commit = %commit_sha, chain_id = %chain_id, "Code pushed");
        Ok(chain_id)
    }
}
