//! Pipeline stage services
//!
//! Each stage consumes one upstream event type, performs a simulated unit of
//! work and publishes exactly one downstream event carrying the chain id it
//! received. Stages hold no per-chain state; everything a continuation needs
//! travels inside the event.
//!
//! ```text
//! repository.modified -> Build -> build.finished -> Security
//!   -> testsuiterun.finished -> Deployment -> service.deployed
//! ```

pub mod build;
pub mod deployment;
pub mod repository;
pub mod security;

pub use build::BuildService;
pub use deployment::DeploymentService;
pub use repository::RepositoryService;
pub use security::{ScanOutcome, SecurityScanService};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::broker::{EventBroker, EventHandler};
use crate::events::{CdEvent, Content, Context, EnvelopeError, IdGenerator, Subject, SubjectType};

/// A stage that reacts to a single upstream event type
pub trait PipelineStage: EventHandler {
    /// Event type this stage consumes
    fn upstream(&self) -> &'static str;

    /// Broker the stage subscribes and publishes through
    fn broker(&self) -> &Arc<dyn EventBroker>;

    /// Registers the stage under its upstream type. Must run before the
    /// first event of a chain is published.
    fn initialize(self: Arc<Self>)
    where
        Self: Sized + 'static,
    {
        let broker = Arc::clone(self.broker());
        let upstream = self.upstream();
        broker.subscribe(&[upstream], self);
    }
}

/// Stand-in for real build/scan/deploy latency
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimulatedWork {
    delay: Duration,
}

impl SimulatedWork {
    /// Work that takes `delay`
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Work that completes immediately
    #[must_use]
    pub fn instant() -> Self {
        Self::default()
    }

    /// Configured delay
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Suspends for the configured delay
    pub async fn perform(&self, what: &str) {
        debug!(work = what, delay = ?self.delay, "Simulating work");
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

/// Pieces every stage needs to emit events
#[derive(Clone)]
pub struct StageDeps {
    broker: Arc<dyn EventBroker>,
    ids: Arc<dyn IdGenerator>,
}

impl fmt::Debug for StageDeps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageDeps").field("ids", &self.ids).finish()
    }
}

impl StageDeps {
    /// Bundles a broker with an id generator
    pub fn new(broker: Arc<dyn EventBroker>, ids: Arc<dyn IdGenerator>) -> Self {
        Self { broker, ids }
    }

    /// Broker handle
    pub fn broker(&self) -> &Arc<dyn EventBroker> {
        &self.broker
    }

    /// Fresh identifier
    pub fn next_id(&self) -> String {
        self.ids.generate()
    }

    /// Builds an event; `chain_id` is `None` only for the first event of a
    /// chain, every continuation passes the id it received.
    pub fn event(
        &self,
        source: &str,
        event_type: &str,
        chain_id: Option<&str>,
        subject: SubjectFields,
    ) -> Result<CdEvent, EnvelopeError> {
        let mut builder = Context::builder(source, event_type);
        if let Some(chain_id) = chain_id {
            builder = builder.chain_id(chain_id);
        }
        let context = builder.build(self.ids.as_ref())?;
        let subject = Subject::new(subject.id, source, subject.subject_type, subject.content);
        CdEvent::new(context, subject)
    }
}

/// Subject fields a stage decides on
#[derive(Debug, Clone)]
pub struct SubjectFields {
    /// Subject id
    pub id: String,
    /// Subject type
    pub subject_type: SubjectType,
    /// Payload
    pub content: Content,
}

/// Repository name from the last path segment of `url`, without `.git`
pub(crate) fn repository_name(url: &str) -> Option<String> {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .map(|s| s.trim_end_matches(".git"))
        .filter(|s| !s.is_empty() && !s.contains(':'))
        .map(str::to_string)
}
