//! Infrastructure layer
//!
//! Configuration, logging, metrics and the envelope ingestion adapter.

mod config;
pub mod ingest;
mod logging;
mod metrics;

pub use config::{Config, LOG_ENV, StageDelays};
pub use ingest::{EnvelopeIngestor, IngestResult, IngestStatus, parse_document};
pub use logging::init_logging;
pub use metrics::{ChainMetrics, MetricsCollector};
