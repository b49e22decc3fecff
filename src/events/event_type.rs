//! CDEvents type names.
//!
//! Event types are dotted strings of the form
//! `dev.cdevents.<subject>.<predicate>.<major>.<minor>.<patch>`.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::str::FromStr;

use super::{EnvelopeError, SubjectType};

/// Subscription topic that receives every published event
pub const WILDCARD: &str = "*";

/// Emitted by the repository stage when code is pushed
pub const REPOSITORY_MODIFIED: &str = "dev.cdevents.repository.modified.0.2.0";

/// Emitted by the build stage once an artifact exists
pub const BUILD_FINISHED: &str = "dev.cdevents.build.finished.0.2.0";

/// Emitted by the security stage with the scan outcome
pub const TESTSUITERUN_FINISHED: &str = "dev.cdevents.testsuiterun.finished.0.2.0";

/// Emitted by the deployment stage, terminal for a chain
pub const SERVICE_DEPLOYED: &str = "dev.cdevents.service.deployed.0.2.0";

const PREFIX: &str = "dev.cdevents";

static EVENT_TYPE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^dev\.cdevents\.([a-z]+)\.([a-z]+)\.(\d+)\.(\d+)\.(\d+)$").unwrap()
});

/// A parsed CDEvents type name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventType {
    subject: String,
    predicate: String,
    version: (u32, u32, u32),
}

impl EventType {
    /// Creates an event type at version 0.2.0
    #[must_use]
    pub fn new(subject: impl Into<String>, predicate: impl Into<String>) -> Self {
        Self {
            subject: subject.into().to_lowercase(),
            predicate: predicate.into().to_lowercase(),
            version: (0, 2, 0),
        }
    }

    /// Sets the version triple
    #[must_use]
    pub fn with_version(mut self, major: u32, minor: u32, patch: u32) -> Self {
        self.version = (major, minor, patch);
        self
    }

    /// Lowercase subject segment, e.g. `testsuiterun`
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Predicate segment, e.g. `finished`
    pub fn predicate(&self) -> &str {
        &self.predicate
    }

    /// Version triple
    pub fn version(&self) -> (u32, u32, u32) {
        self.version
    }

    /// `<subject>.<predicate>`, e.g. `build.finished`
    pub fn short_name(&self) -> String {
        format!("{}.{}", self.subject, self.predicate)
    }

    /// The subject type this event is about, if it is a known one
    pub fn subject_type(&self) -> Option<SubjectType> {
        SubjectType::from_lowercase(&self.subject)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (major, minor, patch) = self.version;
        write!(
            f,
            "{PREFIX}.{}.{}.{major}.{minor}.{patch}",
            self.subject, self.predicate
        )
    }
}

impl FromStr for EventType {
    type Err = EnvelopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || EnvelopeError::InvalidEventType {
            value: s.to_string(),
        };
        let caps = EVENT_TYPE_PATTERN.captures(s).ok_or_else(invalid)?;
        let number = |i: usize| caps[i].parse::<u32>().map_err(|_| invalid());

        Ok(Self {
            subject: caps[1].to_string(),
            predicate: caps[2].to_string(),
            version: (number(3)?, number(4)?, number(5)?),
        })
    }
}

/// Short display name for a raw type string, falling back to the raw value
pub fn short_name(event_type: &str) -> String {
    event_type
        .parse::<EventType>()
        .map(|t| t.short_name())
        .unwrap_or_else(|_| event_type.to_string())
}
