//! Prelude module for common imports

// Envelope
pub use crate::events::{
    BUILD_FINISHED, CdEvent, Content, Context, EnvelopeError, EventType, IdGenerator,
    REPOSITORY_MODIFIED, SERVICE_DEPLOYED, SequentialIdGenerator, Subject, SubjectType,
    TESTSUITERUN_FINISHED, UuidGenerator, WILDCARD,
};

// Broker
pub use crate::broker::{
    BrokerError, DispatchPolicy, EventBroker, EventHandler, HandlerError, InMemoryEventBroker,
    handler_fn,
};

// Stages and orchestration
pub use crate::errors::{PipelineError, PipelineResult};
pub use crate::infrastructure::Config;
pub use crate::orchestrator::{ChainReport, ChainState, PipelineOrchestrator};
pub use crate::services::{PipelineStage, ScanOutcome};
