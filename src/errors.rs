//! Error types for chain orchestration

use std::time::Duration;
use thiserror::Error;

use crate::broker::BrokerError;
use crate::events::EnvelopeError;

/// Errors that can occur while running a delivery chain
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Publishing failed outside of any chain
    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),

    /// An event could not be built or decoded
    #[error("envelope error: {0}")]
    Envelope(#[from] EnvelopeError),

    /// The chain's first publish surfaced a subscriber failure
    #[error("chain {chain_id} failed: {source}")]
    ChainFailed {
        /// Chain that was started.
        chain_id: String,
        /// Underlying broker failure.
        source: BrokerError,
    },

    /// Repository URL or commit cannot start a chain
    #[error("invalid repository '{url}': {reason}")]
    InvalidRepository {
        /// The rejected URL.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A chain did not reach a terminal state in time
    #[error("chain {chain_id} did not settle within {waited:?}")]
    Timeout {
        /// Chain being waited on.
        chain_id: String,
        /// How long we waited.
        waited: Duration,
    },

    /// Configuration could not be loaded or is inconsistent
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error occurred
    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Result type for orchestration
pub type PipelineResult<T> = Result<T, PipelineError>;
