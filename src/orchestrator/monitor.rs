//! Wildcard monitor tracking every chain's state.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use super::ChainState;
use crate::broker::{EventHandler, HandlerError};
use crate::errors::{PipelineError, PipelineResult};
use crate::events::CdEvent;
use crate::infrastructure::{ChainMetrics, MetricsCollector};

#[derive(Debug, Clone, Copy)]
struct ChainTracker {
    state: ChainState,
    started: Instant,
    events: usize,
}

/// Observes every published event and records chain progress
#[derive(Debug)]
pub struct ChainMonitor {
    chains: DashMap<String, ChainTracker>,
    settled: Notify,
    metrics: Arc<MetricsCollector>,
}

impl ChainMonitor {
    /// Creates a monitor reporting settled chains to `metrics`
    pub fn new(metrics: Arc<MetricsCollector>) -> Self {
        Self {
            chains: DashMap::new(),
            settled: Notify::new(),
            metrics,
        }
    }

    /// Current state of a chain, if any of its events was seen
    pub fn state(&self, chain_id: &str) -> Option<ChainState> {
        self.chains.get(chain_id).map(|t| t.state)
    }

    /// Ids of every chain seen so far
    pub fn chain_ids(&self) -> Vec<String> {
        self.chains.iter().map(|e| e.key().clone()).collect()
    }

    /// Waits until `chain_id` reaches a terminal state
    pub async fn wait_for_terminal(
        &self,
        chain_id: &str,
        timeout: Duration,
    ) -> PipelineResult<ChainState> {
        let wait = async {
            loop {
                let notified = self.settled.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                if let Some(state) = self.state(chain_id).filter(ChainState::is_terminal) {
                    return state;
                }
                notified.await;
            }
        };

        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| PipelineError::Timeout {
                chain_id: chain_id.to_string(),
                waited: timeout,
            })
    }

    fn observe(&self, event: &CdEvent) -> Option<ChainTracker> {
        let chain_id = event.chain_id();
        match self.chains.entry(chain_id.to_string()) {
            Entry::Occupied(mut entry) => {
                let tracker = entry.get_mut();
                match tracker.state.advance(event) {
                    Ok(next) => {
                        tracker.state = next;
                        tracker.events += 1;
                        Some(*tracker)
                    }
                    Err(err) => {
                        warn!(chain_id = %chain_id, error = %err, "Ignoring out-of-order event");
                        None
                    }
                }
            }
            Entry::Vacant(entry) => match ChainState::entered_by(event) {
                Ok(Some(state)) => {
                    let tracker = ChainTracker {
                        state,
                        started: Instant::now(),
                        events: 1,
                    };
                    entry.insert(tracker);
                    Some(tracker)
                }
                Ok(None) => None,
                Err(err) => {
                    warn!(chain_id = %chain_id, error = %err, "Unreadable chain event");
                    None
                }
            },
        }
    }
}

#[async_trait]
impl EventHandler for ChainMonitor {
    fn name(&self) -> &str {
        "monitor"
    }

    async fn handle(&self, event: Arc<CdEvent>) -> Result<(), HandlerError> {
        info!(
            event_type = %event.event_type(),
            subject = %event.subject().id(),
            chain_id = %event.chain_id(),
            "Pipeline event"
        );

        let Some(tracker) = self.observe(&event) else {
            return Ok(());
        };
        debug!(chain_id = %event.chain_id(), state = %tracker.state, "Chain advanced");

        if tracker.state.is_terminal() {
            self.metrics.record(ChainMetrics {
                chain_id: event.chain_id().to_string(),
                duration: tracker.started.elapsed(),
                event_count: tracker.events,
                state: tracker.state,
            });
            info!(chain_id = %event.chain_id(), state = %tracker.state, "Chain settled");
            self.settled.notify_waiters();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{
        BUILD_FINISHED, Content, Context, REPOSITORY_MODIFIED, SERVICE_DEPLOYED,
        SequentialIdGenerator, Subject, SubjectType, TESTSUITERUN_FINISHED,
    };
    use crate::services::ScanOutcome;
    use serde_json::json;

    fn event(
        ids: &SequentialIdGenerator,
        chain: &str,
        event_type: &str,
        outcome: Option<&str>,
    ) -> Arc<CdEvent> {
        let context = Context::builder("/test", event_type)
            .chain_id(chain)
            .build(ids)
            .unwrap();
        let mut content = Content::new();
        if let Some(outcome) = outcome {
            content.insert("outcome".to_string(), json!(outcome));
        }
        let subject = Subject::new("s/1", "/test", SubjectType::Build, content);
        Arc::new(CdEvent::new(context, subject).unwrap())
    }

    #[tokio::test]
    async fn test_monitor_tracks_and_records_metrics() {
        let ids = SequentialIdGenerator::new("e");
        let metrics = Arc::new(MetricsCollector::new());
        let monitor = ChainMonitor::new(Arc::clone(&metrics));

        for (event_type, outcome) in [
            (REPOSITORY_MODIFIED, None),
            (BUILD_FINISHED, None),
            (TESTSUITERUN_FINISHED, Some("pass")),
            (SERVICE_DEPLOYED, None),
        ] {
            monitor.handle(event(&ids, "c1", event_type, outcome)).await.unwrap();
        }

        assert_eq!(monitor.state("c1"), Some(ChainState::Deployed));
        let recorded = metrics.get("c1").unwrap();
        assert_eq!(recorded.event_count, 4);
        assert_eq!(recorded.state, ChainState::Deployed);
    }

    #[tokio::test]
    async fn test_monitor_ignores_out_of_order() {
        let ids = SequentialIdGenerator::new("e");
        let monitor = ChainMonitor::new(Arc::new(MetricsCollector::new()));

        monitor.handle(event(&ids, "c1", REPOSITORY_MODIFIED, None)).await.unwrap();
        monitor.handle(event(&ids, "c1", SERVICE_DEPLOYED, None)).await.unwrap();

        assert_eq!(monitor.state("c1"), Some(ChainState::Pushed));
    }

    #[tokio::test]
    async fn test_monitor_ignores_foreign_types() {
        let ids = SequentialIdGenerator::new("e");
        let monitor = ChainMonitor::new(Arc::new(MetricsCollector::new()));

        monitor
            .handle(event(&ids, "c1", "dev.cdevents.pipelinerun.queued.0.2.0", None))
            .await
            .unwrap();

        assert_eq!(monitor.state("c1"), None);
        assert!(monitor.chain_ids().is_empty());
    }

    #[tokio::test]
    async fn test_wait_for_terminal_wakes_on_settle() {
        let ids = Arc::new(SequentialIdGenerator::new("e"));
        let monitor = Arc::new(ChainMonitor::new(Arc::new(MetricsCollector::new())));
        monitor.handle(event(&ids, "c1", REPOSITORY_MODIFIED, None)).await.unwrap();
        monitor.handle(event(&ids, "c1", BUILD_FINISHED, None)).await.unwrap();

        let waiter = {
            let monitor = Arc::clone(&monitor);
            tokio::spawn(async move {
                monitor
                    .wait_for_terminal("c1", Duration::from_secs(5))
                    .await
            })
        };
        tokio::task::yield_now().await;
        monitor
            .handle(event(&ids, "c1", TESTSUITERUN_FINISHED, Some("fail")))
            .await
            .unwrap();

        let state = waiter.await.unwrap().unwrap();
        assert_eq!(state, ChainState::Scanned(ScanOutcome::Fail));
    }

    #[tokio::test]
    async fn test_wait_for_terminal_times_out() {
        let ids = SequentialIdGenerator::new("e");
        let monitor = ChainMonitor::new(Arc::new(MetricsCollector::new()));
        monitor.handle(event(&ids, "c1", REPOSITORY_MODIFIED, None)).await.unwrap();

        let err = monitor
            .wait_for_terminal("c1", Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Timeout { .. }));
    }
}
