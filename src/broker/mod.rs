//! Event broker.
//!
//! Publishers and subscribers only know the [`EventBroker`] capability.
//! [`InMemoryEventBroker`] is the single in-process implementation: it keeps
//! an append-only history and fans each event out, in registration order, to
//! every handler subscribed to the event's exact type or to [`WILDCARD`].
//!
//! Fan-out is synchronous: `publish` returns only after every matching
//! handler has run to completion, including any downstream publishes those
//! handlers perform.
//!
//! Because a handler's own publish completes inside its dispatch, a wildcard
//! handler sees events in publish order only if it is registered ahead of
//! the handlers that publish. One registered after them receives the deepest
//! nested event first. The orchestrator registers its monitor before the
//! stages for this reason.

pub mod history;

pub use history::EventHistory;

use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::events::{CdEvent, EnvelopeError, WILDCARD};

/// Errors raised by a subscriber while handling an event
#[derive(Error, Debug)]
pub enum HandlerError {
    /// The incoming event lacks data the handler needs, or the outgoing
    /// event could not be built
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    /// Publishing the continuation event failed downstream
    #[error("downstream publish failed: {0}")]
    Publish(#[from] BrokerError),

    /// Any other handler failure
    #[error("{0}")]
    Failed(String),
}

/// Errors surfaced by [`EventBroker::publish`]
#[derive(Error, Debug)]
pub enum BrokerError {
    /// The event was rejected before being recorded
    #[error("invalid event: {0}")]
    InvalidEvent(#[from] EnvelopeError),

    /// A subscriber failed and the fan-out was aborted
    #[error("handler '{handler}' failed on {event_type}: {source}")]
    Handler {
        /// Name of the failing handler.
        handler: String,
        /// Type of the event being dispatched.
        event_type: String,
        /// The handler's error.
        source: Box<HandlerError>,
    },
}

/// Result type for broker operations
pub type BrokerResult<T = usize> = Result<T, BrokerError>;

/// What the broker does when a subscriber fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchPolicy {
    /// Stop the fan-out and return the error to the publisher
    #[default]
    FailFast,
    /// Log the failure and keep delivering to the remaining subscribers
    Isolate,
}

/// A subscriber callback
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Name used in logs and errors
    fn name(&self) -> &str;

    /// Handles one event; the event is shared and never mutated
    async fn handle(&self, event: Arc<CdEvent>) -> Result<(), HandlerError>;
}

/// Publish/subscribe capability shared by every stage
#[async_trait]
pub trait EventBroker: Send + Sync {
    /// Records `event` and delivers it to every matching subscriber.
    /// Returns how many handlers completed successfully.
    async fn publish(&self, event: CdEvent) -> BrokerResult;

    /// Registers `handler` under each of `event_types`; [`WILDCARD`] matches
    /// every event. Registering twice delivers twice.
    fn subscribe(&self, event_types: &[&str], handler: Arc<dyn EventHandler>);
}

type HandlerFn = dyn Fn(Arc<CdEvent>) -> BoxFuture<'static, Result<(), HandlerError>> + Send + Sync;

/// Handler backed by a closure
pub struct FnHandler {
    name: String,
    f: Box<HandlerFn>,
}

impl fmt::Debug for FnHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler").field("name", &self.name).finish()
    }
}

#[async_trait]
impl EventHandler for FnHandler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, event: Arc<CdEvent>) -> Result<(), HandlerError> {
        (self.f)(event).await
    }
}

/// Wraps an async closure as an [`EventHandler`]
pub fn handler_fn<F>(name: impl Into<String>, f: F) -> Arc<dyn EventHandler>
where
    F: Fn(Arc<CdEvent>) -> BoxFuture<'static, Result<(), HandlerError>> + Send + Sync + 'static,
{
    Arc::new(FnHandler {
        name: name.into(),
        f: Box::new(f),
    })
}

struct Subscription {
    topic: String,
    handler: Arc<dyn EventHandler>,
}

/// In-process broker
pub struct InMemoryEventBroker {
    subscriptions: RwLock<Vec<Subscription>>,
    history: EventHistory,
    policy: DispatchPolicy,
}

impl fmt::Debug for InMemoryEventBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryEventBroker")
            .field("subscriptions", &self.subscriptions.read().len())
            .field("history", &self.history.len())
            .field("policy", &self.policy)
            .finish()
    }
}

impl Default for InMemoryEventBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEventBroker {
    /// Creates a fail-fast broker
    #[must_use]
    pub fn new() -> Self {
        Self::with_policy(DispatchPolicy::default())
    }

    /// Creates a broker with the given failure policy
    #[must_use]
    pub fn with_policy(policy: DispatchPolicy) -> Self {
        Self {
            subscriptions: RwLock::new(Vec::new()),
            history: EventHistory::new(),
            policy,
        }
    }

    /// Failure policy in effect
    pub fn policy(&self) -> DispatchPolicy {
        self.policy
    }

    /// Recorded events
    pub fn history(&self) -> &EventHistory {
        &self.history
    }

    /// Number of registrations under exactly `topic`
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.subscriptions
            .read()
            .iter()
            .filter(|s| s.topic == topic)
            .count()
    }

    /// Drops every registration. Handlers that hold the broker keep it alive
    /// until this runs.
    pub fn clear_subscriptions(&self) {
        self.subscriptions.write().clear();
    }

    fn matching(&self, event_type: &str) -> Vec<Arc<dyn EventHandler>> {
        self.subscriptions
            .read()
            .iter()
            .filter(|s| s.topic == event_type || s.topic == WILDCARD)
            .map(|s| Arc::clone(&s.handler))
            .collect()
    }
}

#[async_trait]
impl EventBroker for InMemoryEventBroker {
    async fn publish(&self, event: CdEvent) -> BrokerResult {
        event.validate()?;
        let event = Arc::new(event);
        info!(
            event_type = %event.event_type(),
            chain_id = %event.chain_id(),
            "Publishing event"
        );
        self.history.append(Arc::clone(&event));

        let mut delivered = 0;
        for handler in self.matching(event.event_type()) {
            debug!(handler = handler.name(), event_id = %event.id(), "Dispatching");
            match handler.handle(Arc::clone(&event)).await {
                Ok(()) => delivered += 1,
                Err(err) => match self.policy {
                    DispatchPolicy::FailFast => {
                        return Err(BrokerError::Handler {
                            handler: handler.name().to_string(),
                            event_type: event.event_type().to_string(),
                            source: Box::new(err),
                        });
                    }
                    DispatchPolicy::Isolate => {
                        warn!(
                            handler = handler.name(),
                            event_type = %event.event_type(),
                            error = %err,
                            "Handler failed, continuing fan-out"
                        );
                    }
                },
            }
        }
        Ok(delivered)
    }

    fn subscribe(&self, event_types: &[&str], handler: Arc<dyn EventHandler>) {
        let mut subscriptions = self.subscriptions.write();
        for topic in event_types {
            debug!(topic = %topic, handler = handler.name(), "Subscribing");
            subscriptions.push(Subscription {
                topic: (*topic).to_string(),
                handler: Arc::clone(&handler),
            });
        }
    }
}
