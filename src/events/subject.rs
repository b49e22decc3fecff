//! Event subject: the domain object an event is about.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use super::EnvelopeError;

/// Type-specific subject payload
pub type Content = Map<String, Value>;

/// Closed set of CDEvents subject types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SubjectType {
    /// Source repository
    Repository,
    /// Repository branch
    Branch,
    /// Change / pull request
    Change,
    /// Build run
    Build,
    /// Built artifact
    Artifact,
    /// Single test case execution
    TestCaseRun,
    /// Test suite execution, also used for security scans
    TestSuiteRun,
    /// Pipeline run
    PipelineRun,
    /// Task run
    TaskRun,
    /// Deployment environment
    Environment,
    /// Deployed service
    Service,
    /// Operational incident
    Incident,
}

impl SubjectType {
    /// Wire name, e.g. `testSuiteRun`
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Repository => "repository",
            Self::Branch => "branch",
            Self::Change => "change",
            Self::Build => "build",
            Self::Artifact => "artifact",
            Self::TestCaseRun => "testCaseRun",
            Self::TestSuiteRun => "testSuiteRun",
            Self::PipelineRun => "pipelineRun",
            Self::TaskRun => "taskRun",
            Self::Environment => "environment",
            Self::Service => "service",
            Self::Incident => "incident",
        }
    }

    /// Looks up a subject type by the lowercase form used in event type names
    pub fn from_lowercase(name: &str) -> Option<Self> {
        [
            Self::Repository,
            Self::Branch,
            Self::Change,
            Self::Build,
            Self::Artifact,
            Self::TestCaseRun,
            Self::TestSuiteRun,
            Self::PipelineRun,
            Self::TaskRun,
            Self::Environment,
            Self::Service,
            Self::Incident,
        ]
        .into_iter()
        .find(|t| t.as_str().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for SubjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The domain object of an event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    id: String,
    #[serde(default)]
    source: String,
    #[serde(rename = "type")]
    subject_type: SubjectType,
    #[serde(default)]
    content: Content,
}

impl Subject {
    /// Creates a subject
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        subject_type: SubjectType,
        content: Content,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            subject_type,
            content,
        }
    }

    /// Subject id, unique within its type, e.g. `build/<uuid>`
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Producer of the subject
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Subject type
    pub fn subject_type(&self) -> SubjectType {
        self.subject_type
    }

    /// Full content payload
    pub fn content(&self) -> &Content {
        &self.content
    }

    /// Content value for `key`
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.content.get(key)
    }

    /// Content value for `key`, failing when absent
    pub fn require(&self, key: &str) -> Result<&Value, EnvelopeError> {
        self.content
            .get(key)
            .ok_or_else(|| EnvelopeError::MissingContent {
                subject: self.id.clone(),
                key: key.to_string(),
            })
    }

    /// String content value for `key`, failing when absent or not a string
    pub fn require_str(&self, key: &str) -> Result<&str, EnvelopeError> {
        self.require(key)?
            .as_str()
            .ok_or_else(|| EnvelopeError::InvalidContent {
                key: key.to_string(),
                reason: "expected a string".to_string(),
            })
    }
}
