//! Event context: the envelope metadata of one event occurrence.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{EnvelopeError, IdGenerator};

/// Envelope version written when the caller does not choose one
pub const CDEVENTS_VERSION: &str = "0.4.1";

/// Reference to a related event
pub type Link = Map<String, Value>;

/// Current UTC time as ISO-8601 with a `Z` suffix
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Event metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Context {
    version: String,
    id: String,
    chain_id: String,
    source: String,
    #[serde(rename = "type")]
    event_type: String,
    timestamp: String,
    #[serde(default)]
    schema_uri: Option<String>,
    #[serde(default)]
    links: Option<Vec<Link>>,
}

impl Context {
    /// Starts a context for an event of `event_type` produced by `source`
    pub fn builder(source: impl Into<String>, event_type: impl Into<String>) -> ContextBuilder {
        ContextBuilder {
            version: None,
            id: None,
            chain_id: None,
            source: source.into(),
            event_type: event_type.into(),
            timestamp: None,
            schema_uri: None,
            links: None,
        }
    }

    /// Envelope version
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Unique event id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Id shared by every event of one pipeline run
    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    /// Producer identity
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Dotted event type name
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// ISO-8601 UTC timestamp
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// Optional schema reference
    pub fn schema_uri(&self) -> Option<&str> {
        self.schema_uri.as_deref()
    }

    /// Related-event references
    pub fn links(&self) -> Option<&[Link]> {
        self.links.as_deref()
    }

    pub(crate) fn validate(&self) -> Result<(), EnvelopeError> {
        for (field, value) in [
            ("type", &self.event_type),
            ("source", &self.source),
            ("id", &self.id),
            ("chainId", &self.chain_id),
        ] {
            if value.trim().is_empty() {
                return Err(EnvelopeError::MissingField { field });
            }
        }
        Ok(())
    }
}

/// Builder for [`Context`]; omitted ids and timestamp are generated by `build`
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    version: Option<String>,
    id: Option<String>,
    chain_id: Option<String>,
    source: String,
    event_type: String,
    timestamp: Option<String>,
    schema_uri: Option<String>,
    links: Option<Vec<Link>>,
}

impl ContextBuilder {
    /// Continues an existing chain instead of starting a new one
    pub fn chain_id(mut self, chain_id: impl Into<String>) -> Self {
        self.chain_id = Some(chain_id.into());
        self
    }

    /// Uses an explicit event id
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Uses an explicit timestamp
    pub fn timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    /// Overrides the envelope version
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Sets the schema reference
    pub fn schema_uri(mut self, schema_uri: impl Into<String>) -> Self {
        self.schema_uri = Some(schema_uri.into());
        self
    }

    /// Appends a related-event reference
    pub fn link(mut self, link: Link) -> Self {
        self.links.get_or_insert_with(Vec::new).push(link);
        self
    }

    /// Builds the context, generating `id`, `chainId` and `timestamp` when
    /// absent or empty
    pub fn build(self, ids: &dyn IdGenerator) -> Result<Context, EnvelopeError> {
        let or_generate = |value: Option<String>| {
            value
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| ids.generate())
        };

        let context = Context {
            version: self
                .version
                .unwrap_or_else(|| CDEVENTS_VERSION.to_string()),
            id: or_generate(self.id),
            chain_id: or_generate(self.chain_id),
            source: self.source,
            event_type: self.event_type,
            timestamp: self
                .timestamp
                .filter(|t| !t.is_empty())
                .unwrap_or_else(now_timestamp),
            schema_uri: self.schema_uri,
            links: self.links,
        };
        context.validate()?;
        Ok(context)
    }
}
