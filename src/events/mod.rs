//! CDEvents envelope model
//!
//! An event is an immutable pair of [`Context`] (metadata) and [`Subject`]
//! (domain payload). On the wire it is a JSON object with exactly two
//! top-level keys, `context` and `subject`.

pub mod context;
pub mod event_type;
pub mod ids;
pub mod subject;

pub use context::{CDEVENTS_VERSION, Context, ContextBuilder, Link, now_timestamp};
pub use event_type::{
    BUILD_FINISHED, EventType, REPOSITORY_MODIFIED, SERVICE_DEPLOYED, TESTSUITERUN_FINISHED,
    WILDCARD, short_name,
};
pub use ids::{IdGenerator, SequentialIdGenerator, UuidGenerator};
pub use subject::{Content, Subject, SubjectType};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while constructing or decoding events
#[derive(Error, Debug)]
pub enum EnvelopeError {
    /// A required context field is empty
    #[error("required field '{field}' is empty")]
    MissingField {
        /// Wire name of the field.
        field: &'static str,
    },

    /// Type name does not follow the CDEvents pattern
    #[error("invalid event type '{value}'")]
    InvalidEventType {
        /// The rejected type name.
        value: String,
    },

    /// A content key a consumer depends on is absent
    #[error("subject '{subject}' is missing content key '{key}'")]
    MissingContent {
        /// Subject id.
        subject: String,
        /// Missing key.
        key: String,
    },

    /// A content value has the wrong shape
    #[error("invalid content '{key}': {reason}")]
    InvalidContent {
        /// Offending key.
        key: String,
        /// What was wrong with it.
        reason: String,
    },

    /// JSON encoding or decoding failed
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// A multi-envelope document stopped parsing part way through
    #[error("malformed document at byte {offset}: {source}")]
    Document {
        /// Byte offset just past the last value read.
        offset: usize,
        /// Parser error.
        source: serde_json::Error,
    },
}

/// One event occurrence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CdEvent {
    context: Context,
    subject: Subject,
}

impl CdEvent {
    /// Pairs a context with a subject, rejecting an empty type or source
    pub fn new(context: Context, subject: Subject) -> Result<Self, EnvelopeError> {
        let event = Self { context, subject };
        event.validate()?;
        Ok(event)
    }

    /// Event metadata
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Event subject
    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    /// Shorthand for `context().event_type()`
    pub fn event_type(&self) -> &str {
        self.context.event_type()
    }

    /// Shorthand for `context().id()`
    pub fn id(&self) -> &str {
        self.context.id()
    }

    /// Shorthand for `context().chain_id()`
    pub fn chain_id(&self) -> &str {
        self.context.chain_id()
    }

    /// Checks the fields every published event must carry
    pub fn validate(&self) -> Result<(), EnvelopeError> {
        self.context.validate()?;
        if self.subject.id().trim().is_empty() {
            return Err(EnvelopeError::MissingField { field: "subject.id" });
        }
        Ok(())
    }

    /// Nested `{context, subject}` mapping
    pub fn to_value(&self) -> Result<serde_json::Value, EnvelopeError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Pretty-printed JSON
    pub fn to_json(&self) -> Result<String, EnvelopeError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Decodes and validates an envelope
    pub fn from_json(text: &str) -> Result<Self, EnvelopeError> {
        let event: Self = serde_json::from_str(text)?;
        event.validate()?;
        Ok(event)
    }

    /// Decodes and validates an envelope from an already-parsed value
    pub fn from_value(value: serde_json::Value) -> Result<Self, EnvelopeError> {
        let event: Self = serde_json::from_value(value)?;
        event.validate()?;
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde_json::json;

    fn sample_event() -> CdEvent {
        let ids = SequentialIdGenerator::new("t");
        let context = Context::builder("/event/source/build", BUILD_FINISHED)
            .chain_id("chain-1")
            .build(&ids)
            .unwrap();
        let mut content = Content::new();
        content.insert("artifactId".to_string(), json!("pkg:oci/my-app@sha256:aa"));
        let subject = Subject::new("build/1", "/event/source/build", SubjectType::Build, content);
        CdEvent::new(context, subject).unwrap()
    }

    #[test]
    fn test_top_level_keys() {
        let value = sample_event().to_value().unwrap();
        let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["context", "subject"]);
    }

    #[test]
    fn test_json_round_trip() {
        let event = sample_event();
        let decoded = CdEvent::from_json(&event.to_json().unwrap()).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_decode_generator_shape() {
        // Shape produced by the external HTTP generators: no schemaUri, links
        // or subject source.
        let text = r#"{
            "context": {
                "version": "0.4.1",
                "id": "01HX",
                "chainId": "01HC",
                "source": "urn:generator:foo",
                "type": "dev.cdevents.service.deployed.0.2.0",
                "timestamp": "2024-05-01T10:00:00Z"
            },
            "subject": {
                "id": "foo-1234",
                "type": "service",
                "content": {"environment": {"id": "cluster/01"}, "artifactId": "pkg:oci/foo@sha256:1"}
            }
        }"#;

        let event = CdEvent::from_json(text).unwrap();
        assert_eq!(event.event_type(), SERVICE_DEPLOYED);
        assert_eq!(event.chain_id(), "01HC");
        assert_eq!(event.subject().subject_type(), SubjectType::Service);
        assert!(event.context().links().is_none());
    }

    #[test]
    fn test_decode_rejects_empty_source() {
        let text = r#"{
            "context": {"version": "0.4.1", "id": "1", "chainId": "c", "source": "",
                        "type": "dev.cdevents.build.finished.0.2.0", "timestamp": "t"},
            "subject": {"id": "b", "source": "", "type": "build", "content": {}}
        }"#;

        assert!(matches!(
            CdEvent::from_json(text),
            Err(EnvelopeError::MissingField { field: "source" })
        ));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            CdEvent::from_json("{not json"),
            Err(EnvelopeError::Json(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_encoding_is_idempotent(
            source in "/[a-z]{1,12}",
            chain in "[a-f0-9]{1,16}",
            key in "[a-zA-Z]{1,8}",
            text in ".{0,24}",
            number in any::<i64>(),
        ) {
            let ids = UuidGenerator;
            let context = Context::builder(source.clone(), SERVICE_DEPLOYED)
                .chain_id(chain)
                .build(&ids)
                .unwrap();
            let mut content = Content::new();
            content.insert(key, json!({"text": text, "n": number}));
            let subject = Subject::new("service/x", source, SubjectType::Service, content);
            let event = CdEvent::new(context, subject).unwrap();

            let encoded = event.to_json().unwrap();
            let reencoded = CdEvent::from_json(&encoded).unwrap().to_json().unwrap();
            prop_assert_eq!(encoded, reencoded);
        }
    }
}
