//! Append-only event history.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::events::CdEvent;

/// Every event a broker has accepted, in publish order
#[derive(Debug, Default)]
pub struct EventHistory {
    events: Mutex<Vec<Arc<CdEvent>>>,
}

impl EventHistory {
    /// Creates an empty history
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one event
    pub fn append(&self, event: Arc<CdEvent>) {
        self.events.lock().push(event);
    }

    /// Number of recorded events
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// True when nothing was published yet
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Copy of the full history
    pub fn snapshot(&self) -> Vec<Arc<CdEvent>> {
        self.events.lock().clone()
    }

    /// Events of one chain, in publish order
    pub fn for_chain(&self, chain_id: &str) -> Vec<Arc<CdEvent>> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.chain_id() == chain_id)
            .cloned()
            .collect()
    }

    /// Distinct chain ids, in order of first appearance
    pub fn chain_ids(&self) -> Vec<String> {
        let events = self.events.lock();
        let mut seen: Vec<String> = Vec::new();
        for event in events.iter() {
            if !seen.iter().any(|c| c == event.chain_id()) {
                seen.push(event.chain_id().to_string());
            }
        }
        seen
    }
}
