use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use arqon_protocol::Envelope;
use tokio::sync::{Mutex, Notify, RwLock};
use tracing::{debug, warn};

/// Picks the winning response out of however many a competing dispatch
/// collected. Implementations see the full set gathered so far (in arrival
/// order) and must tolerate any ordering, per the broker's
/// first-come-first-serve collection guarantee.
pub trait WinnerSelector: Send + Sync {
    fn select<'a>(&self, responses: &'a [Envelope]) -> Option<&'a Envelope>;
}

/// Default selector: whoever answered first wins.
pub struct FirstResponseWins;

impl WinnerSelector for FirstResponseWins {
    fn select<'a>(&self, responses: &'a [Envelope]) -> Option<&'a Envelope> {
        responses.first()
    }
}

struct PendingTask {
    responses: Mutex<Vec<(String, Envelope)>>,
    notify: Notify,
}

/// Per-task result collection for competing dispatch. One operator's
/// response per task is kept (duplicates from the same operator are
/// dropped); once a response arrives, or the per-task timeout expires,
/// [`ResultCollector::await_winner`] resolves.
pub struct ResultCollector {
    pending: RwLock<HashMap<String, Arc<PendingTask>>>,
    selector: Arc<dyn WinnerSelector>,
}

impl ResultCollector {
    pub fn new(selector: Arc<dyn WinnerSelector>) -> Self {
        Self { pending: RwLock::new(HashMap::new()), selector }
    }

    pub fn with_default_selector() -> Self {
        Self::new(Arc::new(FirstResponseWins))
    }

    /// Opens a slot for `request_id`. Must be called before any
    /// [`Self::add_result`] for that id can be recorded.
    pub async fn register(&self, request_id: &str) {
        self.pending.write().await.insert(
            request_id.to_string(),
            Arc::new(PendingTask { responses: Mutex::new(Vec::new()), notify: Notify::new() }),
        );
    }

    /// Records a response for `request_id` from `operator_id`. Returns
    /// `false` if the task is unknown (already resolved and cleaned up, or
    /// never registered) or if this operator already responded.
    pub async fn add_result(&self, request_id: &str, operator_id: &str, envelope: Envelope) -> bool {
        let task = {
            let pending = self.pending.read().await;
            match pending.get(request_id) {
                Some(task) => task.clone(),
                None => {
                    debug!(request_id, "result received for unknown or already-resolved task");
                    return false;
                }
            }
        };

        let mut responses = task.responses.lock().await;
        if responses.iter().any(|(id, _)| id == operator_id) {
            warn!(request_id, operator_id, "duplicate response ignored");
            return false;
        }
        responses.push((operator_id.to_string(), envelope));
        drop(responses);
        task.notify.notify_waiters();
        true
    }

    /// Waits until the selector can pick a winner or `timeout` elapses,
    /// whichever comes first, then removes the task's bookkeeping.
    pub async fn await_winner(&self, request_id: &str, timeout: Duration) -> Option<Envelope> {
        let task = self.pending.read().await.get(request_id).cloned()?;

        let result = tokio::time::timeout(timeout, async {
            loop {
                {
                    let responses = task.responses.lock().await;
                    if !responses.is_empty() {
                        let envelopes: Vec<Envelope> = responses.iter().map(|(_, e)| e.clone()).collect();
                        if let Some(winner) = self.selector.select(&envelopes) {
                            return winner.clone();
                        }
                    }
                }
                task.notify.notified().await;
            }
        })
        .await;

        self.pending.write().await.remove(request_id);
        result.ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arqon_protocol::EnvelopeType;

    fn response(request_id: &str) -> Envelope {
        Envelope::build(EnvelopeType::Response)
            .with_response(request_id, arqon_protocol::ResponseStatus::Success)
    }

    #[tokio::test]
    async fn first_response_wins_by_default() {
        let collector = ResultCollector::with_default_selector();
        collector.register("task-1").await;

        collector.add_result("task-1", "op-a", response("task-1")).await;
        collector.add_result("task-1", "op-b", response("task-1")).await;

        let winner = collector.await_winner("task-1", Duration::from_secs(1)).await;
        assert!(winner.is_some());
    }

    #[tokio::test]
    async fn duplicate_response_from_same_operator_is_ignored() {
        let collector = ResultCollector::with_default_selector();
        collector.register("task-1").await;

        assert!(collector.add_result("task-1", "op-a", response("task-1")).await);
        assert!(!collector.add_result("task-1", "op-a", response("task-1")).await);
    }

    #[tokio::test]
    async fn timeout_yields_no_winner() {
        let collector = ResultCollector::with_default_selector();
        collector.register("task-1").await;

        let winner = collector.await_winner("task-1", Duration::from_millis(20)).await;
        assert!(winner.is_none());
    }

    #[tokio::test]
    async fn unregistered_task_rejects_results() {
        let collector = ResultCollector::with_default_selector();
        assert!(!collector.add_result("ghost", "op-a", response("ghost")).await);
    }
}
