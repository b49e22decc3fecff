//! # cdchain - CDEvents delivery chains in Rust
//!
//! A continuous-delivery pipeline modelled as independent stages that talk
//! only through CDEvents envelopes on an in-process broker:
//!
//! ```text
//! Repository -> repository.modified -> Build -> build.finished
//!   -> Security -> testsuiterun.finished -> Deployment -> service.deployed
//! ```
//!
//! Every event of one run carries the same `chainId`. A failed security scan
//! halts the chain without an error.
//!
//! ## Quick Start
//!
//! ```no_run
//! use cdchain::{Config, PipelineOrchestrator};
//!
//! # async fn demo() -> cdchain::PipelineResult<()> {
//! let orchestrator = PipelineOrchestrator::new(Config::default());
//! let report = orchestrator
//!     .run_pipeline("https://git.example.com/my-org/my-app", "abc123def456")
//!     .await?;
//! assert!(report.is_deployed());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod broker;
pub mod errors;
pub mod events;
pub mod infrastructure;
pub mod orchestrator;
pub mod services;

// Prelude module for common imports
pub mod prelude;

// Re-export commonly used types
pub use broker::{
    BrokerError, BrokerResult, DispatchPolicy, EventBroker, EventHandler, EventHistory,
    HandlerError, InMemoryEventBroker, handler_fn,
};
pub use errors::{PipelineError, PipelineResult};
pub use events::{
    CdEvent, Content, Context, EnvelopeError, EventType, IdGenerator, SequentialIdGenerator,
    Subject, SubjectType, UuidGenerator,
};
pub use infrastructure::{
    ChainMetrics, Config, EnvelopeIngestor, IngestResult, IngestStatus, MetricsCollector,
    StageDelays, init_logging,
};
pub use orchestrator::{ChainMonitor, ChainReport, ChainState, PipelineOrchestrator};
pub use services::{
    BuildService, DeploymentService, PipelineStage, RepositoryService, ScanOutcome,
    SecurityScanService, SimulatedWork,
};

/// Version of the cdchain crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
