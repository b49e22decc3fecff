//! Envelope ingestion
//!
//! Adapts envelope JSON produced outside the process (a queue consumer, an
//! HTTP generator, a file on disk) into published [`CdEvent`]s. Every item
//! gets its own [`IngestResult`]; one bad item never stops a batch.

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::broker::{BrokerError, EventBroker};
use crate::events::{CdEvent, EnvelopeError, EventType};

/// What happened to one ingested item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    /// Published and delivered
    Published,
    /// Never published: not a valid envelope
    Rejected,
    /// Published, but a subscriber failed during fan-out
    Failed,
}

impl fmt::Display for IngestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Published => f.write_str("published"),
            Self::Rejected => f.write_str("rejected"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

/// Per-item outcome: event id (when readable), status and a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestResult {
    /// `context.id` of the item, if it could be read
    pub id: Option<String>,
    /// Outcome
    pub status: IngestStatus,
    /// Human readable detail
    pub message: String,
}

impl IngestResult {
    fn rejected(id: Option<String>, err: &impl fmt::Display) -> Self {
        Self {
            id,
            status: IngestStatus::Rejected,
            message: err.to_string(),
        }
    }
}

/// Splits a document into envelope values. Accepts a JSON array of
/// objects, newline-delimited JSON, or objects simply concatenated (pretty
/// printed or not). Parsing stops at the first unreadable value, which is
/// reported once with its byte offset.
pub fn parse_document(text: &str) -> Vec<Result<Value, EnvelopeError>> {
    let mut items = Vec::new();
    let mut stream = serde_json::Deserializer::from_str(text).into_iter::<Value>();

    loop {
        let offset = stream.byte_offset();
        match stream.next() {
            Some(Ok(Value::Array(values))) => items.extend(values.into_iter().map(Ok)),
            Some(Ok(value)) => items.push(Ok(value)),
            Some(Err(source)) => {
                items.push(Err(EnvelopeError::Document { offset, source }));
                break;
            }
            None => break,
        }
    }
    items
}

/// Publishes decoded envelopes into a broker
#[derive(Clone)]
pub struct EnvelopeIngestor {
    broker: Arc<dyn EventBroker>,
}

impl fmt::Debug for EnvelopeIngestor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvelopeIngestor").finish_non_exhaustive()
    }
}

impl EnvelopeIngestor {
    /// Creates an ingestor publishing into `broker`
    pub fn new(broker: Arc<dyn EventBroker>) -> Self {
        Self { broker }
    }

    /// Decodes and publishes one envelope text
    pub async fn ingest_str(&self, text: &str) -> IngestResult {
        match serde_json::from_str::<Value>(text) {
            Ok(value) => self.ingest_value(value).await,
            Err(err) => IngestResult::rejected(None, &EnvelopeError::from(err)),
        }
    }

    /// Validates and publishes one decoded envelope
    pub async fn ingest_value(&self, value: Value) -> IngestResult {
        let id = value
            .pointer("/context/id")
            .and_then(Value::as_str)
            .map(str::to_string);

        let event = match decode(value) {
            Ok(event) => event,
            Err(err) => {
                warn!(id = ?id, error = %err, "Rejected envelope");
                return IngestResult::rejected(id, &err);
            }
        };

        match self.broker.publish(event).await {
            Ok(delivered) => {
                debug!(id = ?id, delivered, "Ingested envelope");
                IngestResult {
                    id,
                    status: IngestStatus::Published,
                    message: format!("delivered to {delivered} subscriber(s)"),
                }
            }
            Err(BrokerError::InvalidEvent(err)) => IngestResult::rejected(id, &err),
            Err(err) => {
                warn!(id = ?id, error = %err, "Envelope fan-out failed");
                IngestResult {
                    id,
                    status: IngestStatus::Failed,
                    message: err.to_string(),
                }
            }
        }
    }

    /// Ingests every item of a document, in order
    pub async fn ingest_batch(&self, text: &str) -> Vec<IngestResult> {
        let mut results = Vec::new();
        for item in parse_document(text) {
            let result = match item {
                Ok(value) => self.ingest_value(value).await,
                Err(err) => IngestResult::rejected(None, &err),
            };
            results.push(result);
        }

        let published = results
            .iter()
            .filter(|r| r.status == IngestStatus::Published)
            .count();
        info!(published, total = results.len(), "Batch ingested");
        results
    }
}

fn decode(value: Value) -> Result<CdEvent, EnvelopeError> {
    let event = CdEvent::from_value(value)?;
    event.event_type().parse::<EventType>()?;
    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{HandlerError, InMemoryEventBroker, handler_fn};
    use crate::events::{BUILD_FINISHED, WILDCARD};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn envelope(id: &str, event_type: &str) -> Value {
        json!({
            "context": {
                "version": "0.4.1",
                "id": id,
                "chainId": "chain-1",
                "source": "/external",
                "type": event_type,
                "timestamp": "2024-01-01T00:00:00Z",
                "schemaUri": null,
                "links": null
            },
            "subject": {
                "id": "build/1",
                "source": "/external",
                "type": "build",
                "content": {"artifactId": "pkg:oci/app@sha256:1"}
            }
        })
    }

    #[test]
    fn test_parse_document_shapes() {
        let single = envelope("a", BUILD_FINISHED).to_string();
        assert_eq!(parse_document(&single).len(), 1);

        let array = json!([envelope("a", BUILD_FINISHED), envelope("b", BUILD_FINISHED)]);
        assert_eq!(parse_document(&array.to_string()).len(), 2);

        let ndjson = format!(
            "{}\n\n{}\nnot json\n{}\n",
            envelope("a", BUILD_FINISHED),
            envelope("b", BUILD_FINISHED),
            envelope("c", BUILD_FINISHED)
        );
        let items = parse_document(&ndjson);
        assert_eq!(items.len(), 3);
        assert!(matches!(
            items[2],
            Err(EnvelopeError::Document { offset, .. }) if offset > 0
        ));

        assert!(parse_document("  ").is_empty());
    }

    #[test]
    fn test_parse_document_concatenated_pretty() {
        let document = format!(
            "{}\n{}\n",
            serde_json::to_string_pretty(&envelope("a", BUILD_FINISHED)).unwrap(),
            serde_json::to_string_pretty(&envelope("b", BUILD_FINISHED)).unwrap()
        );

        let items = parse_document(&document);
        assert_eq!(items.len(), 2);
        assert_eq!(
            items[1].as_ref().unwrap().pointer("/context/id"),
            Some(&json!("b"))
        );
    }

    #[tokio::test]
    async fn test_batch_of_pretty_envelopes_publishes_each() {
        let broker = Arc::new(InMemoryEventBroker::new());
        let ingestor = EnvelopeIngestor::new(Arc::clone(&broker) as Arc<dyn EventBroker>);
        let document = [envelope("a", BUILD_FINISHED), envelope("b", BUILD_FINISHED)]
            .iter()
            .map(|e| serde_json::to_string_pretty(e).unwrap())
            .collect::<Vec<_>>()
            .join("\n");

        let results = ingestor.ingest_batch(&document).await;

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.status == IngestStatus::Published));
        assert_eq!(broker.history().len(), 2);
    }

    #[tokio::test]
    async fn test_ingest_publishes_valid_envelope() {
        let broker = Arc::new(InMemoryEventBroker::new());
        let ingestor = EnvelopeIngestor::new(Arc::clone(&broker) as Arc<dyn EventBroker>);

        let result = ingestor
            .ingest_str(&envelope("evt-1", BUILD_FINISHED).to_string())
            .await;

        assert_eq!(result.status, IngestStatus::Published);
        assert_eq!(result.id.as_deref(), Some("evt-1"));
        assert_eq!(broker.history().len(), 1);
    }

    #[tokio::test]
    async fn test_ingest_rejects_bad_type() {
        let broker = Arc::new(InMemoryEventBroker::new());
        let ingestor = EnvelopeIngestor::new(Arc::clone(&broker) as Arc<dyn EventBroker>);

        let result = ingestor
            .ingest_value(envelope("evt-1", "build.finished"))
            .await;

        assert_eq!(result.status, IngestStatus::Rejected);
        assert_eq!(result.id.as_deref(), Some("evt-1"));
        assert!(broker.history().is_empty());
    }

    #[tokio::test]
    async fn test_batch_continues_after_failures() {
        let broker = Arc::new(InMemoryEventBroker::new());
        broker.subscribe(
            &[WILDCARD],
            handler_fn("picky", |event| {
                Box::pin(async move {
                    if event.id() == "bad" {
                        Err(HandlerError::Failed("refused".to_string()))
                    } else {
                        Ok::<(), HandlerError>(())
                    }
                })
            }),
        );
        let ingestor = EnvelopeIngestor::new(Arc::clone(&broker) as Arc<dyn EventBroker>);

        let document = json!([
            envelope("ok-1", BUILD_FINISHED),
            envelope("bad", BUILD_FINISHED),
            {"context": {}},
            envelope("ok-2", BUILD_FINISHED),
        ])
        .to_string();
        let results = ingestor.ingest_batch(&document).await;

        let statuses: Vec<IngestStatus> = results.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                IngestStatus::Published,
                IngestStatus::Failed,
                IngestStatus::Rejected,
                IngestStatus::Published
            ]
        );
        assert_eq!(broker.history().len(), 3);
    }
}
