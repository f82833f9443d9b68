//! Refresh orchestration and snapshot publication.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::Utc;
use habitkit_client::{paginate, HabitApi};
use habitkit_core::{ApiError, Snapshot, SnapshotParts};
use tokio::sync::{broadcast, Mutex as AsyncMutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::outcome::{RefreshFailure, RefreshOutcome, RefreshWarning, Resource};

const EVENT_CAPACITY: usize = 16;

/// Holds the published [`Snapshot`] and refreshes it from the upstream.
///
/// Readers get an `Arc` to a complete snapshot; a refresh builds a new one
/// off to the side and swaps it in only after every critical resource
/// arrived. At most one refresh runs at a time; reconcile refreshes queue
/// behind a running one instead of being dropped.
pub struct DataStore {
    api: Arc<dyn HabitApi>,
    published: RwLock<Option<Arc<Snapshot>>>,
    gate: AsyncMutex<()>,
    /// Running plus queued refreshes. Claimed before the gate is taken.
    active: AtomicUsize,
    last_failure: Mutex<Option<RefreshFailure>>,
    events: broadcast::Sender<RefreshOutcome>,
}

/// One claim on `active`, released on drop so a cancelled refresh future
/// does not leave the store busy.
struct ActiveClaim<'a>(&'a AtomicUsize);

impl Drop for ActiveClaim<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl DataStore {
    /// Empty store; nothing is fetched until the first refresh.
    pub fn new(api: Arc<dyn HabitApi>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            api,
            published: RwLock::new(None),
            gate: AsyncMutex::new(()),
            active: AtomicUsize::new(0),
            last_failure: Mutex::new(None),
            events,
        }
    }

    pub fn api(&self) -> &Arc<dyn HabitApi> {
        &self.api
    }

    /// Current snapshot; `None` until the first successful refresh.
    pub fn get_snapshot(&self) -> Option<Arc<Snapshot>> {
        self.published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// True from the moment a refresh is claimed until its outcome is
    /// broadcast, including reconcile refreshes waiting for their turn.
    pub fn is_refreshing(&self) -> bool {
        self.active.load(Ordering::SeqCst) > 0
    }

    /// Failure of the most recent failed refresh, cleared by a publish.
    pub fn last_error(&self) -> Option<RefreshFailure> {
        self.last_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Receives one outcome per refresh attempt that ran.
    pub fn subscribe(&self) -> broadcast::Receiver<RefreshOutcome> {
        self.events.subscribe()
    }

    /// Calls `callback` for every completed refresh until the store is
    /// dropped.
    pub fn on_refresh<F>(&self, mut callback: F) -> JoinHandle<()>
    where
        F: FnMut(RefreshOutcome) + Send + 'static,
    {
        let mut rx = self.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(outcome) => callback(outcome),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "refresh subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Fetches every resource and publishes a new snapshot.
    ///
    /// Returns [`RefreshStatus::AlreadyInProgress`](crate::RefreshStatus)
    /// immediately, without fetching, when another refresh is running or
    /// queued.
    pub async fn refresh(&self) -> RefreshOutcome {
        if self
            .active
            .compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("refresh already in progress");
            return RefreshOutcome::already_in_progress();
        }
        let claim = ActiveClaim(&self.active);
        let gate = self.gate.lock().await;
        self.run(claim, gate).await
    }

    /// Waits for any running refresh to finish, then runs a new one.
    ///
    /// Used after a mutation: a refresh that overlapped the mutating call
    /// may have read pre-mutation data, so it cannot stand in for this one.
    pub async fn refresh_after_current(&self) -> RefreshOutcome {
        self.active.fetch_add(1, Ordering::SeqCst);
        let claim = ActiveClaim(&self.active);
        let gate = self.gate.lock().await;
        self.run(claim, gate).await
    }

    async fn run(&self, claim: ActiveClaim<'_>, gate: MutexGuard<'_, ()>) -> RefreshOutcome {
        let outcome = self.fetch_and_publish().await;

        drop(gate);
        drop(claim);
        // Err only means nobody is subscribed.
        let _ = self.events.send(outcome.clone());
        outcome
    }

    async fn fetch_and_publish(&self) -> RefreshOutcome {
        let api = &self.api;
        let (user, content, tags, party, challenges, tasks) = tokio::join!(
            api.user(),
            api.content(),
            api.tags(),
            api.party(),
            paginate(|page| api.challenges_page(page)),
            api.tasks(),
        );

        let mut warnings = Vec::new();
        let tags = degrade(Resource::Tags, tags, &mut warnings);
        let party = degrade(Resource::Party, party, &mut warnings).flatten();
        let challenges = degrade(Resource::Challenges, challenges.into_result(), &mut warnings);

        for (resource, err) in [
            (Resource::User, user.as_ref().err()),
            (Resource::Content, content.as_ref().err()),
            (Resource::Tasks, tasks.as_ref().err()),
        ] {
            if let Some(err) = err {
                warn!(%resource, error = %err, "critical fetch failed");
            }
        }

        let (user, content, tasks) = match (user, content, tasks) {
            (Ok(user), Ok(content), Ok(tasks)) => (user, content, tasks),
            (Err(error), _, _) => return self.fail(Resource::User, error, warnings),
            (_, Err(error), _) => return self.fail(Resource::Content, error, warnings),
            (_, _, Err(error)) => return self.fail(Resource::Tasks, error, warnings),
        };

        let snapshot = Snapshot::assemble(
            SnapshotParts {
                user,
                content,
                tags: tags.unwrap_or_default(),
                party,
                challenges: challenges.unwrap_or_default(),
                tasks,
            },
            Utc::now(),
        );
        let task_count = snapshot.tasks.len();
        self.publish(snapshot);
        *self
            .last_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;

        info!(tasks = task_count, warnings = warnings.len(), "snapshot published");
        RefreshOutcome::published(warnings)
    }

    fn fail(
        &self,
        resource: Resource,
        error: ApiError,
        warnings: Vec<RefreshWarning>,
    ) -> RefreshOutcome {
        warn!(%resource, "refresh failed; keeping previous snapshot");
        let failure = RefreshFailure { resource, error };
        *self
            .last_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(failure.clone());
        RefreshOutcome::failed(failure, warnings)
    }

    fn publish(&self, snapshot: Snapshot) {
        *self
            .published
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(snapshot));
    }

    /// Applies `f` to a copy of the current snapshot and publishes the copy.
    /// Returns `false` when nothing is published yet.
    pub(crate) fn patch_snapshot<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut Snapshot),
    {
        let mut slot = self
            .published
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(current) = slot.as_ref() else {
            return false;
        };
        let mut next = Snapshot::clone(current);
        f(&mut next);
        *slot = Some(Arc::new(next));
        true
    }
}

/// Keeps a non-critical result, or records a warning and yields `None`.
fn degrade<T>(
    resource: Resource,
    result: Result<T, ApiError>,
    warnings: &mut Vec<RefreshWarning>,
) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(error) => {
            warn!(%resource, error = %error, "using default for unavailable resource");
            warnings.push(RefreshWarning { resource, error });
            None
        }
    }
}
