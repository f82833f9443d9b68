//! Refresh and action behavior against an in-process upstream stub.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use habitkit_client::HabitApi;
use habitkit_core::{
    ActionRequest, ApiError, Challenge, KeepTasks, Party, Payload, RawTask, ScoreDirection, Tag,
    TaskStatus, TaskType, User,
};
use habitkit_store::{
    ActionError, ActionExecutor, DataStore, RefreshStatus, Resource,
};
use serde_json::{json, Value};
use tokio::sync::Notify;

/// Parks a stub call until released, signalling when it is entered.
#[derive(Default)]
struct Latch {
    entered: Notify,
    release: Notify,
}

#[derive(Default)]
struct StubApi {
    calls: Mutex<HashMap<&'static str, usize>>,
    failing: Mutex<HashSet<&'static str>>,
    /// Page index at which challenge pagination fails.
    challenges_fail_at: Mutex<Option<u32>>,
    server_sleeping: Mutex<bool>,
    user_hp: Mutex<f64>,
    hold_tasks: Option<Arc<Latch>>,
    hold_perform: Option<Arc<Latch>>,
}

impl StubApi {
    fn holding(latch: Arc<Latch>) -> Self {
        Self {
            hold_tasks: Some(latch),
            ..Self::default()
        }
    }

    fn fail(&self, name: &'static str) {
        self.failing.lock().unwrap().insert(name);
    }

    fn heal(&self, name: &'static str) {
        self.failing.lock().unwrap().remove(name);
    }

    fn calls(&self, name: &str) -> usize {
        self.calls.lock().unwrap().get(name).copied().unwrap_or(0)
    }

    fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    fn enter(&self, name: &'static str) -> Result<(), ApiError> {
        *self.calls.lock().unwrap().entry(name).or_default() += 1;
        if self.failing.lock().unwrap().contains(name) {
            return Err(ApiError::HttpStatus {
                status: 500,
                code: None,
                message: format!("{name} exploded"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl HabitApi for StubApi {
    async fn user(&self) -> Result<User, ApiError> {
        self.enter("user")?;
        let sleeping = *self.server_sleeping.lock().unwrap();
        let hp = *self.user_hp.lock().unwrap();
        Ok(serde_json::from_value(json!({
            "_id": "u1",
            "preferences": {"sleep": sleeping},
            "stats": {"hp": hp, "lvl": 3}
        }))
        .unwrap())
    }

    async fn content(&self) -> Result<Value, ApiError> {
        self.enter("content")?;
        Ok(json!({"spells": {}}))
    }

    async fn tags(&self) -> Result<Vec<Tag>, ApiError> {
        self.enter("tags")?;
        Ok(vec![
            Tag { id: "T1".into(), name: "one".into(), challenge: false },
            Tag { id: "T2".into(), name: "two".into(), challenge: false },
        ])
    }

    async fn party(&self) -> Result<Option<Party>, ApiError> {
        self.enter("party")?;
        Ok(None)
    }

    async fn challenges_page(&self, page: u32) -> Result<Vec<Challenge>, ApiError> {
        self.enter("challenges")?;
        if *self.challenges_fail_at.lock().unwrap() == Some(page) {
            return Err(ApiError::network("connection reset"));
        }
        Ok(match page {
            0 => serde_json::from_value(json!([{"_id": "c1", "name": "first"}])).unwrap(),
            _ => vec![],
        })
    }

    async fn tasks(&self) -> Result<Vec<RawTask>, ApiError> {
        if let Some(latch) = &self.hold_tasks {
            latch.entered.notify_one();
            latch.release.notified().await;
        }
        self.enter("tasks")?;
        Ok(serde_json::from_value(json!([
            {"_id": "d1", "type": "daily", "isDue": true, "completed": false, "tags": ["T1"]},
            {"_id": "h1", "type": "habit"},
            {"_id": "t1", "type": "todo", "date": "2000-01-01"}
        ]))
        .unwrap())
    }

    async fn perform(&self, action: &ActionRequest) -> Result<Payload, ApiError> {
        if let Some(latch) = &self.hold_perform {
            latch.entered.notify_one();
            latch.release.notified().await;
        }
        self.enter("perform")?;
        Ok(match action {
            ActionRequest::ToggleSleep => Payload::Wrapped(json!(true)),
            _ => Payload::Wrapped(json!({})),
        })
    }
}

fn store_with(api: Arc<StubApi>) -> Arc<DataStore> {
    Arc::new(DataStore::new(api))
}

#[tokio::test]
async fn test_refresh_publishes_complete_snapshot() {
    let api = Arc::new(StubApi::default());
    let store = store_with(Arc::clone(&api));
    assert!(store.get_snapshot().is_none());

    let outcome = store.refresh().await;
    assert_eq!(outcome.status, RefreshStatus::Published);
    assert!(outcome.is_clean());

    let snap = store.get_snapshot().unwrap();
    assert_eq!(snap.tasks.len(), 3);
    assert_eq!(snap.tags.len(), 2);
    assert_eq!(snap.challenges.len(), 1);
    assert!(snap.party.is_none());
    assert_eq!(
        snap.category_index.count(TaskType::Todo, Some(TaskStatus::Red)),
        1
    );
    let unused: Vec<&str> = snap.unused_tags().iter().map(|t| t.id.as_str()).collect();
    assert_eq!(unused, vec!["T2"]);
    // Two challenge pages: one with data, one empty.
    assert_eq!(api.calls("challenges"), 2);
    assert!(!store.is_refreshing());
}

#[tokio::test]
async fn test_critical_failure_keeps_previous_snapshot() {
    let api = Arc::new(StubApi::default());
    let store = store_with(Arc::clone(&api));
    assert!(store.refresh().await.is_published());
    let before = store.get_snapshot().unwrap();

    *api.user_hp.lock().unwrap() = 1.0;
    api.fail("tasks");
    let outcome = store.refresh().await;

    assert_eq!(outcome.status, RefreshStatus::Failed);
    assert!(outcome.is_stale());
    let failure = outcome.failure.unwrap();
    assert_eq!(failure.resource, Resource::Tasks);
    assert_eq!(failure.error.status_code(), Some(500));

    let after = store.get_snapshot().unwrap();
    assert!(Arc::ptr_eq(&before, &after));
    assert_eq!(store.last_error().unwrap().resource, Resource::Tasks);

    api.heal("tasks");
    assert!(store.refresh().await.is_published());
    assert!(store.last_error().is_none());
    assert_eq!(store.get_snapshot().unwrap().stats.hp, 1.0);
}

#[tokio::test]
async fn test_failed_first_refresh_publishes_nothing() {
    let api = Arc::new(StubApi::default());
    api.fail("user");
    api.fail("content");
    let store = store_with(Arc::clone(&api));

    let outcome = store.refresh().await;
    assert_eq!(outcome.status, RefreshStatus::Failed);
    assert_eq!(outcome.failure.unwrap().resource, Resource::User);
    assert!(store.get_snapshot().is_none());
    // Every resource was still fetched once.
    assert_eq!(api.calls("tasks"), 1);
    assert_eq!(api.calls("tags"), 1);
}

#[tokio::test]
async fn test_tags_failure_publishes_with_warning() {
    let api = Arc::new(StubApi::default());
    api.fail("tags");
    let store = store_with(Arc::clone(&api));

    let outcome = store.refresh().await;
    assert_eq!(outcome.status, RefreshStatus::Published);
    assert!(!outcome.is_clean());
    assert_eq!(outcome.warnings.len(), 1);
    assert_eq!(outcome.warnings[0].resource, Resource::Tags);

    let snap = store.get_snapshot().unwrap();
    assert!(snap.tags.is_empty());
    // Tag ids stay on the task even though no name resolved.
    assert_eq!(snap.tasks["d1"].tag_ids, vec!["T1".to_string()]);
    assert!(snap.tasks["d1"].tag_names.is_empty());
}

#[tokio::test]
async fn test_partial_challenge_pages_degrade_to_empty() {
    let api = Arc::new(StubApi::default());
    *api.challenges_fail_at.lock().unwrap() = Some(1);
    let store = store_with(Arc::clone(&api));

    let outcome = store.refresh().await;
    assert!(outcome.is_published());
    assert_eq!(outcome.warnings.len(), 1);
    assert_eq!(outcome.warnings[0].resource, Resource::Challenges);
    assert!(store.get_snapshot().unwrap().challenges.is_empty());
}

#[tokio::test]
async fn test_concurrent_refresh_is_rejected_without_fetching() {
    let latch = Arc::new(Latch::default());
    let api = Arc::new(StubApi::holding(Arc::clone(&latch)));
    let store = store_with(Arc::clone(&api));

    let first = {
        let store = Arc::clone(&store);
        tokio::spawn(async move { store.refresh().await })
    };
    latch.entered.notified().await;
    assert!(store.is_refreshing());

    // Every other resource was fetched while tasks is still pending.
    assert_eq!(api.calls("user"), 1);
    assert_eq!(api.calls("content"), 1);
    assert_eq!(api.calls("tags"), 1);
    assert_eq!(api.calls("party"), 1);

    let calls_before = api.total_calls();
    let second = store.refresh().await;
    assert_eq!(second.status, RefreshStatus::AlreadyInProgress);
    assert_eq!(api.total_calls(), calls_before);

    latch.release.notify_one();
    let first = first.await.unwrap();
    assert_eq!(first.status, RefreshStatus::Published);
    assert!(!store.is_refreshing());
    assert_eq!(api.calls("user"), 1);
}

#[tokio::test]
async fn test_action_rejected_while_refreshing() {
    let latch = Arc::new(Latch::default());
    let api = Arc::new(StubApi::holding(Arc::clone(&latch)));
    let store = store_with(Arc::clone(&api));
    let executor = ActionExecutor::new(Arc::clone(&store));

    let refresh = {
        let store = Arc::clone(&store);
        tokio::spawn(async move { store.refresh().await })
    };
    latch.entered.notified().await;

    let err = executor
        .perform_action(ActionRequest::ToggleSleep)
        .await
        .unwrap_err();
    assert_eq!(err, ActionError::Busy);
    assert_eq!(api.calls("perform"), 0);

    latch.release.notify_one();
    assert!(refresh.await.unwrap().is_published());
}

#[tokio::test]
async fn test_action_patches_then_refresh_replaces_wholesale() {
    let api = Arc::new(StubApi::default());
    let store = store_with(Arc::clone(&api));
    assert!(store.refresh().await.is_published());
    let mut events = store.subscribe();

    let executor = ActionExecutor::new(Arc::clone(&store));
    let outcome = executor
        .perform_action(ActionRequest::ToggleSleep)
        .await
        .unwrap();
    assert!(outcome.patched);
    assert_eq!(outcome.payload, Payload::Wrapped(json!(true)));
    assert_eq!(api.calls("perform"), 1);

    // The upstream still reports awake; the reconcile result wins.
    let reconciled = outcome.reconciled().await.unwrap();
    assert!(reconciled.is_published());
    assert!(!store.get_snapshot().unwrap().user.sleeping);

    let event = events.recv().await.unwrap();
    assert_eq!(event, reconciled);
}

#[tokio::test]
async fn test_patch_is_visible_before_reconcile() {
    let latch = Arc::new(Latch::default());
    let api = Arc::new(StubApi::holding(Arc::clone(&latch)));
    let store = store_with(Arc::clone(&api));

    let initial = {
        let store = Arc::clone(&store);
        tokio::spawn(async move { store.refresh().await })
    };
    latch.entered.notified().await;
    latch.release.notify_one();
    assert!(initial.await.unwrap().is_published());

    let executor = ActionExecutor::new(Arc::clone(&store));
    let outcome = executor
        .perform_action(ActionRequest::ScoreTask {
            task_id: "d1".into(),
            direction: ScoreDirection::Up,
        })
        .await
        .unwrap();

    // The reconcile refresh is parked in tasks(); the patch is already out.
    latch.entered.notified().await;
    let patched = store.get_snapshot().unwrap();
    assert!(patched.tasks["d1"].completed);
    assert_eq!(patched.tasks["d1"].status, Some(TaskStatus::Done));

    latch.release.notify_one();
    assert!(outcome.reconciled().await.unwrap().is_published());
    let refreshed = store.get_snapshot().unwrap();
    assert!(!refreshed.tasks["d1"].completed);
    assert_eq!(refreshed.tasks["d1"].status, Some(TaskStatus::Due));
}

#[tokio::test]
async fn test_reconcile_waits_for_overlapping_refresh() {
    let tasks_latch = Arc::new(Latch::default());
    let perform_latch = Arc::new(Latch::default());
    let api = Arc::new(StubApi {
        hold_tasks: Some(Arc::clone(&tasks_latch)),
        hold_perform: Some(Arc::clone(&perform_latch)),
        ..StubApi::default()
    });
    let store = store_with(Arc::clone(&api));
    let executor = ActionExecutor::new(Arc::clone(&store));

    // The action is admitted, then stalls inside the upstream call.
    let action = {
        let executor = executor.clone();
        tokio::spawn(async move { executor.perform_action(ActionRequest::ToggleSleep).await })
    };
    perform_latch.entered.notified().await;

    // A refresh starts meanwhile and reads the pre-mutation user.
    let overlapping = {
        let store = Arc::clone(&store);
        tokio::spawn(async move { store.refresh().await })
    };
    tasks_latch.entered.notified().await;
    assert_eq!(api.calls("user"), 1);

    *api.server_sleeping.lock().unwrap() = true;
    perform_latch.release.notify_one();
    let outcome = action.await.unwrap().unwrap();
    assert!(store.is_refreshing());

    // The reconcile is queued, so a plain refresh is still rejected.
    assert_eq!(
        store.refresh().await.status,
        RefreshStatus::AlreadyInProgress
    );

    tasks_latch.release.notify_one();
    assert!(overlapping.await.unwrap().is_published());
    assert!(!store.get_snapshot().unwrap().user.sleeping);

    // The reconcile runs its own fetch after the overlapping one.
    tasks_latch.entered.notified().await;
    assert!(store.is_refreshing());
    let err = executor
        .perform_action(ActionRequest::BuyHealthPotion)
        .await
        .unwrap_err();
    assert_eq!(err, ActionError::Busy);
    tasks_latch.release.notify_one();

    let reconciled = outcome.reconciled().await.unwrap();
    assert_eq!(reconciled.status, RefreshStatus::Published);
    assert_eq!(api.calls("user"), 2);
    assert!(store.get_snapshot().unwrap().user.sleeping);
    assert!(!store.is_refreshing());
}

#[tokio::test]
async fn test_action_failure_is_returned_unchanged() {
    let api = Arc::new(StubApi::default());
    let store = store_with(Arc::clone(&api));
    assert!(store.refresh().await.is_published());
    let before = store.get_snapshot().unwrap();

    api.fail("perform");
    let err = ActionExecutor::new(Arc::clone(&store))
        .perform_action(ActionRequest::LeaveChallenge {
            challenge_id: "c1".into(),
            keep: KeepTasks::Keep,
        })
        .await
        .unwrap_err();

    assert_eq!(
        err,
        ActionError::Api(ApiError::HttpStatus {
            status: 500,
            code: None,
            message: "perform exploded".into(),
        })
    );
    assert_eq!(api.calls("perform"), 1);
    assert!(Arc::ptr_eq(&before, &store.get_snapshot().unwrap()));
    // No reconcile refresh was started.
    assert_eq!(api.calls("user"), 1);
}

#[tokio::test]
async fn test_action_without_snapshot_still_reconciles() {
    let api = Arc::new(StubApi::default());
    let store = store_with(Arc::clone(&api));

    let outcome = ActionExecutor::new(Arc::clone(&store))
        .perform_action(ActionRequest::BuyHealthPotion)
        .await
        .unwrap();
    assert!(!outcome.patched);
    assert!(outcome.reconciled().await.unwrap().is_published());
    assert!(store.get_snapshot().is_some());
}

#[tokio::test]
async fn test_on_refresh_callback_sees_each_attempt() {
    let api = Arc::new(StubApi::default());
    let store = store_with(Arc::clone(&api));
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let _listener = store.on_refresh(move |outcome| {
        let _ = tx.send(outcome.status);
    });

    store.refresh().await;
    api.fail("content");
    store.refresh().await;

    assert_eq!(rx.recv().await, Some(RefreshStatus::Published));
    assert_eq!(rx.recv().await, Some(RefreshStatus::Failed));
}
