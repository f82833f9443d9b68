//! Mutations with an optimistic local patch and a reconciling refresh.

use std::sync::Arc;

use habitkit_core::{
    derive_status, ActionRequest, ApiError, Payload, ScoreDirection, Snapshot, TaskType,
};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::outcome::RefreshOutcome;
use crate::store::DataStore;

/// Why an action was not applied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    /// A refresh is running; the action was not sent.
    #[error("a refresh is in progress; try again shortly")]
    Busy,
    /// The upstream call failed; passed through unchanged.
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// A completed action.
#[derive(Debug)]
pub struct ActionOutcome {
    pub request: ActionRequest,
    pub payload: Payload,
    /// Whether a snapshot was patched locally.
    pub patched: bool,
    /// Background refresh that replaces the patched snapshot.
    pub reconcile: JoinHandle<RefreshOutcome>,
}

impl ActionOutcome {
    /// Waits for the reconciling refresh. `None` if the task panicked or was
    /// aborted.
    pub async fn reconciled(self) -> Option<RefreshOutcome> {
        match self.reconcile.await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!(error = %e, "reconcile refresh did not complete");
                None
            }
        }
    }
}

/// Runs mutating actions against the store's upstream.
#[derive(Clone)]
pub struct ActionExecutor {
    store: Arc<DataStore>,
}

impl ActionExecutor {
    pub fn new(store: Arc<DataStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<DataStore> {
        &self.store
    }

    /// Sends `request`; on success patches the published snapshot and
    /// schedules a full refresh that runs after any refresh already in
    /// flight. No retries.
    pub async fn perform_action(&self, request: ActionRequest) -> Result<ActionOutcome, ActionError> {
        if self.store.is_refreshing() {
            debug!(action = request.name(), "rejected: refresh in progress");
            return Err(ActionError::Busy);
        }

        let payload = self.store.api().perform(&request).await?;

        let patched = self
            .store
            .patch_snapshot(|snapshot| apply_patch(snapshot, &request, &payload));
        info!(action = request.name(), patched, "action applied");

        let store = Arc::clone(&self.store);
        let reconcile = tokio::spawn(async move { store.refresh_after_current().await });

        Ok(ActionOutcome {
            request,
            payload,
            patched,
            reconcile,
        })
    }
}

/// Narrow local effect of a successful action. Anything not expressible
/// here (stat deltas, drops, level-ups) waits for the reconcile refresh.
pub fn apply_patch(snapshot: &mut Snapshot, request: &ActionRequest, payload: &Payload) {
    match request {
        ActionRequest::ScoreTask { task_id, direction } => {
            let now = snapshot.fetched_at;
            if let Some(task) = snapshot.tasks.get_mut(task_id) {
                if matches!(task.kind, TaskType::Daily | TaskType::Todo) {
                    task.completed = *direction == ScoreDirection::Up;
                    if task.kind == TaskType::Daily {
                        task.status =
                            derive_status(task.kind, task.due_date, task.is_due, task.completed, now);
                    }
                }
            }
        }
        ActionRequest::ScoreChecklistItem { task_id, item_id } => {
            if let Some(item) = snapshot
                .tasks
                .get_mut(task_id)
                .and_then(|t| t.checklist.iter_mut().find(|i| &i.id == item_id))
            {
                item.completed = !item.completed;
            }
        }
        ActionRequest::ToggleSleep => {
            // The upstream answers with the new sleep state.
            snapshot.user.sleeping = payload
                .value()
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(!snapshot.user.sleeping);
        }
        ActionRequest::LeaveChallenge { challenge_id, .. } => {
            snapshot.challenges.retain(|c| &c.id != challenge_id);
        }
        ActionRequest::DeleteTag { tag_id } => {
            snapshot.tags.retain(|t| &t.id != tag_id);
        }
        ActionRequest::UnlinkTask { task_id, .. } => {
            if let Some(task) = snapshot.tasks.get_mut(task_id) {
                task.challenge = None;
            }
        }
        ActionRequest::CastSkill { .. } | ActionRequest::BuyHealthPotion => {}
    }
}
