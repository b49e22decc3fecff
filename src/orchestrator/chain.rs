//! Progress of one chain through `Pushed -> Built -> Scanned -> Deployed`.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::events::{
    BUILD_FINISHED, CdEvent, EnvelopeError, REPOSITORY_MODIFIED, SERVICE_DEPLOYED,
    TESTSUITERUN_FINISHED,
};
use crate::services::ScanOutcome;

/// Where a chain currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainState {
    /// Code was pushed
    Pushed,
    /// An artifact was built
    Built,
    /// The artifact was scanned
    Scanned(ScanOutcome),
    /// The artifact was deployed
    Deployed,
}

/// An event that does not fit the chain's current state
#[derive(Error, Debug)]
pub enum TransitionError {
    /// Event type not valid from the current state
    #[error("unexpected {event_type} while {from}")]
    Unexpected {
        /// State before the event.
        from: ChainState,
        /// Offending event type.
        event_type: String,
    },

    /// Scan event without a readable outcome
    #[error(transparent)]
    Outcome(#[from] EnvelopeError),
}

impl ChainState {
    /// State a chain is in right after `event`, for a chain seen for the
    /// first time. `None` for event types outside the chain.
    pub fn entered_by(event: &CdEvent) -> Result<Option<Self>, TransitionError> {
        Ok(match event.event_type() {
            REPOSITORY_MODIFIED => Some(Self::Pushed),
            BUILD_FINISHED => Some(Self::Built),
            TESTSUITERUN_FINISHED => Some(Self::Scanned(scan_outcome(event)?)),
            SERVICE_DEPLOYED => Some(Self::Deployed),
            _ => None,
        })
    }

    /// Applies `event` to this state
    pub fn advance(self, event: &CdEvent) -> Result<Self, TransitionError> {
        match (self, event.event_type()) {
            (Self::Pushed, BUILD_FINISHED) => Ok(Self::Built),
            (Self::Built, TESTSUITERUN_FINISHED) => Ok(Self::Scanned(scan_outcome(event)?)),
            (Self::Scanned(ScanOutcome::Pass), SERVICE_DEPLOYED) => Ok(Self::Deployed),
            (from, event_type) => Err(TransitionError::Unexpected {
                from,
                event_type: event_type.to_string(),
            }),
        }
    }

    /// Folds a chain's events in order. Events outside the chain are
    /// skipped; the first out-of-order event stops the fold.
    pub fn from_events<'a, I>(events: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a Arc<CdEvent>>,
    {
        let mut state: Option<Self> = None;
        for event in events {
            let next = match state {
                None => Self::entered_by(event).ok().flatten(),
                Some(current) => match current.advance(event) {
                    Ok(next) => Some(next),
                    Err(_) => break,
                },
            };
            if next.is_some() {
                state = next;
            }
        }
        state
    }

    /// `Deployed`, or `Scanned` with outcome `fail`
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Deployed | Self::Scanned(ScanOutcome::Fail))
    }
}

impl fmt::Display for ChainState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pushed => f.write_str("pushed"),
            Self::Built => f.write_str("built"),
            Self::Scanned(outcome) => write!(f, "scanned({outcome})"),
            Self::Deployed => f.write_str("deployed"),
        }
    }
}

fn scan_outcome(event: &CdEvent) -> Result<ScanOutcome, EnvelopeError> {
    event.subject().require_str("outcome")?.parse()
}

/// Audit view of one chain, built from the broker history
#[derive(Debug, Clone, Serialize)]
pub struct ChainReport {
    /// Chain id
    pub chain_id: String,
    /// Last state reached, `None` when no chain event was seen
    pub state: Option<ChainState>,
    /// Event types in publish order
    pub event_types: Vec<String>,
    /// The events themselves
    #[serde(skip)]
    pub events: Vec<Arc<CdEvent>>,
}

impl ChainReport {
    /// Builds a report from the events of one chain
    pub fn new(chain_id: impl Into<String>, events: Vec<Arc<CdEvent>>) -> Self {
        Self {
            chain_id: chain_id.into(),
            state: ChainState::from_events(&events),
            event_types: events.iter().map(|e| e.event_type().to_string()).collect(),
            events,
        }
    }

    /// True when the artifact reached its environment
    pub fn is_deployed(&self) -> bool {
        self.state == Some(ChainState::Deployed)
    }

    /// True when the scan failed and the chain stopped
    pub fn is_halted_at_scan(&self) -> bool {
        self.state == Some(ChainState::Scanned(ScanOutcome::Fail))
    }

    /// True when either terminal state was reached
    pub fn is_terminal(&self) -> bool {
        self.state.is_some_and(|s| s.is_terminal())
    }

    /// Content value `key` of the last event of `event_type`
    pub fn content_of(&self, event_type: &str, key: &str) -> Option<&serde_json::Value> {
        self.events
            .iter()
            .rev()
            .find(|e| e.event_type() == event_type)
            .and_then(|e| e.subject().get(key))
    }
}
