//! Offline-resilient profile sync.
//!
//! A profile edit is written straight to the backend while the device is
//! reachable. When it is not, or the write fails or exceeds the write
//! timeout, the edit is put in the durable pending queue instead (one entry
//! per user, the newest edit wins) and replayed once connectivity returns.
//!
//! Local storage is best effort. If the queue cannot be written the edit is
//! kept in memory and replayed from there.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use agrilink_net::{ConnectivityMonitor, DocumentStore};
use agrilink_shared::constants::{
    COLLECTION_FARMERS, STORAGE_KEY_CACHED_PROFILE, STORAGE_KEY_FORM_DRAFT,
};
use agrilink_shared::error::{AgrilinkError, Result};
use agrilink_shared::types::{Reachability, UserId};
use agrilink_shared::{FarmerProfile, ProfileDraft, ProfileUpdate};
use agrilink_store::{Database, PendingProfileEdit, StoreError};

use crate::events::{ClientEvent, EventBus};

const SYNC_IN_PROGRESS: &str = "Profile sync in progress";

/// Where the sync machinery currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    SavingRemote,
    QueuedLocal,
    SyncingQueue,
}

/// Result of submitting one edit.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    Saved,
    Queued { reason: String },
}

impl SaveOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, Self::Saved)
    }
}

/// Result of one queue replay.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    pub succeeded: Vec<UserId>,
    pub failed: Vec<UserId>,
    /// Another replay was already running; nothing was done.
    pub coalesced: bool,
}

impl SyncReport {
    pub fn coalesced() -> Self {
        Self {
            coalesced: true,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.succeeded.is_empty() && self.failed.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Remote write
// ---------------------------------------------------------------------------

/// The remote half of a profile save.
#[async_trait]
pub trait ProfileRemote: Send + Sync {
    async fn write_profile(&self, user_id: &UserId, update: &ProfileUpdate)
        -> Result<FarmerProfile>;
}

/// Writes profiles into the backend `farmers` collection.
pub struct DocumentProfileRemote {
    store: Arc<dyn DocumentStore>,
}

impl DocumentProfileRemote {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ProfileRemote for DocumentProfileRemote {
    async fn write_profile(
        &self,
        user_id: &UserId,
        update: &ProfileUpdate,
    ) -> Result<FarmerProfile> {
        merge_profile(self.store.as_ref(), user_id, update).await
    }
}

/// Read `farmers/{uid}`, merge `update` over it (or create it from the
/// update when absent) and write the result back.
pub async fn merge_profile(
    store: &dyn DocumentStore,
    user_id: &UserId,
    update: &ProfileUpdate,
) -> Result<FarmerProfile> {
    let existing = store
        .get_document(COLLECTION_FARMERS, user_id.as_str())
        .await?;

    let profile = match existing {
        Some(doc) => {
            let mut profile: FarmerProfile = doc.decode()?;
            profile.apply(update);
            profile
        }
        None => FarmerProfile::from_update(user_id.clone(), update)?,
    };

    store
        .set_document(
            COLLECTION_FARMERS,
            user_id.as_str(),
            serde_json::to_value(&profile)?,
        )
        .await?;

    Ok(profile)
}

// ---------------------------------------------------------------------------
// ProfileSync
// ---------------------------------------------------------------------------

struct ReplayEntry {
    user_id: UserId,
    update: ProfileUpdate,
    /// Revision of the durable row this entry came from.
    revision: Option<i64>,
    /// Whether the update came from the in-memory fallback.
    volatile: bool,
}

pub struct ProfileSync {
    db: Arc<Mutex<Database>>,
    remote: Arc<dyn ProfileRemote>,
    connectivity: ConnectivityMonitor,
    events: EventBus,
    timeout: Duration,
    state: watch::Sender<SyncState>,
    replay: tokio::sync::Mutex<()>,
    unsaved: Mutex<HashMap<UserId, ProfileUpdate>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ProfileSync {
    pub fn new(
        db: Arc<Mutex<Database>>,
        remote: Arc<dyn ProfileRemote>,
        connectivity: ConnectivityMonitor,
        events: EventBus,
        timeout: Duration,
    ) -> Self {
        let (state, _rx) = watch::channel(SyncState::Idle);
        let sync = Self {
            db,
            remote,
            connectivity,
            events,
            timeout,
            state,
            replay: tokio::sync::Mutex::new(()),
            unsaved: Mutex::new(HashMap::new()),
        };
        sync.refresh_state(false);
        sync
    }

    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    /// Durable queue contents, first-queued first.
    pub fn pending(&self) -> Vec<PendingProfileEdit> {
        self.with_db("read pending edits", |db| db.pending_edits())
            .unwrap_or_default()
    }

    /// Number of users with an edit waiting, durable or in memory.
    pub fn queued_count(&self) -> usize {
        let unsaved: Vec<UserId> = lock(&self.unsaved).keys().cloned().collect();
        if unsaved.is_empty() {
            return self
                .with_db("count pending edits", |db| db.pending_count())
                .unwrap_or_default();
        }

        let durable = self.pending();
        durable.len()
            + unsaved
                .iter()
                .filter(|u| !durable.iter().any(|e| &e.user_id == *u))
                .count()
    }

    // ------------------------------------------------------------------
    // Submit
    // ------------------------------------------------------------------

    /// Save `update` for `user_id`, queuing it when the write cannot happen now.
    ///
    /// While a replay is running the edit is queued rather than written, so
    /// an older queued edit for the same user can never land after it.
    pub async fn submit(&self, user_id: &UserId, update: ProfileUpdate) -> SaveOutcome {
        if !self.connectivity.is_online() {
            return self.enqueue(user_id, update, AgrilinkError::NetworkUnavailable.to_string());
        }

        let Ok(_replay) = self.replay.try_lock() else {
            debug!(user = %user_id, "Queue replay running, queuing edit behind it");
            return self.enqueue(user_id, update, SYNC_IN_PROGRESS.to_string());
        };

        self.transition(SyncState::SavingRemote, false);
        debug!(user = %user_id, "Saving profile edit");

        match self.write_remote(user_id, &update).await {
            Ok(profile) => {
                self.cache_profile(&profile);
                self.with_db("drop superseded edit", |db| db.remove_edit(user_id));
                lock(&self.unsaved).remove(user_id);
                self.refresh_state(false);
                info!(user = %user_id, "Profile saved");
                self.events.emit(ClientEvent::ProfileSaved {
                    user_id: user_id.clone(),
                });
                SaveOutcome::Saved
            }
            Err(e) => {
                warn!(user = %user_id, error = %e, "Remote profile write failed, queuing");
                self.enqueue(user_id, update, e.to_string())
            }
        }
    }

    /// Validate the setup form and submit it.
    ///
    /// The draft is kept locally while its edit is queued and cleared once
    /// the profile is saved.
    pub async fn submit_draft(&self, user_id: &UserId, draft: &ProfileDraft) -> Result<SaveOutcome> {
        let update = draft.validate()?;
        let outcome = self.submit(user_id, update).await;

        match &outcome {
            SaveOutcome::Saved => {
                self.with_db("clear form draft", |db| db.remove_value(STORAGE_KEY_FORM_DRAFT));
            }
            SaveOutcome::Queued { .. } => {
                self.with_db("store form draft", |db| {
                    db.set_json(STORAGE_KEY_FORM_DRAFT, draft)
                });
            }
        }
        Ok(outcome)
    }

    fn enqueue(&self, user_id: &UserId, update: ProfileUpdate, reason: String) -> SaveOutcome {
        let persisted = self
            .with_db("queue profile edit", |db| db.enqueue_edit(user_id, &update))
            .is_some();

        {
            let mut unsaved = lock(&self.unsaved);
            if persisted {
                unsaved.remove(user_id);
            } else {
                warn!(user = %user_id, "Keeping profile edit in memory only");
                unsaved.insert(user_id.clone(), update);
            }
        }

        self.transition(SyncState::QueuedLocal, false);
        info!(user = %user_id, reason = %reason, "Profile edit queued");
        self.events.emit(ClientEvent::ProfileQueued {
            user_id: user_id.clone(),
            reason: reason.clone(),
        });
        SaveOutcome::Queued { reason }
    }

    // ------------------------------------------------------------------
    // Replay
    // ------------------------------------------------------------------

    /// Replay every queued edit. Only one replay runs at a time; a call made
    /// while one is in flight returns [`SyncReport::coalesced`] at once.
    ///
    /// Edits replaced while a pass was in flight are replayed by a further
    /// pass as long as the device stays reachable.
    pub async fn sync_pending(&self) -> SyncReport {
        let Ok(_replay) = self.replay.try_lock() else {
            debug!("Queue replay already running, coalescing");
            return SyncReport::coalesced();
        };

        let mut report = SyncReport::default();
        loop {
            let entries = self.snapshot();
            if entries.is_empty() {
                break;
            }

            self.transition(SyncState::SyncingQueue, true);
            info!(count = entries.len(), "Replaying queued profile edits");

            let superseded = self.replay_pass(entries, &mut report).await;
            if superseded == 0 || !self.connectivity.is_online() {
                break;
            }
            debug!(superseded, "Edits replaced during replay, replaying again");
        }

        self.refresh_state(true);
        if report.is_empty() {
            return report;
        }

        info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "Queue replay finished"
        );
        self.events.emit(ClientEvent::SyncCompleted {
            succeeded: report.succeeded.len(),
            failed: report.failed.len(),
        });
        report
    }

    // One concurrent write per entry. Returns how many successfully written
    // entries had already been replaced by a newer edit.
    async fn replay_pass(&self, entries: Vec<ReplayEntry>, report: &mut SyncReport) -> usize {
        let results = join_all(
            entries
                .iter()
                .map(|e| self.write_remote(&e.user_id, &e.update)),
        )
        .await;

        let mut settled = Vec::new();
        let mut superseded = 0;

        for (entry, result) in entries.into_iter().zip(results) {
            report.succeeded.retain(|u| u != &entry.user_id);
            report.failed.retain(|u| u != &entry.user_id);

            match result {
                Ok(profile) => {
                    self.cache_profile(&profile);
                    if let Some(revision) = entry.revision {
                        settled.push((entry.user_id.clone(), revision));
                    }
                    if entry.volatile {
                        let mut unsaved = lock(&self.unsaved);
                        match unsaved.get(&entry.user_id) {
                            Some(current) if current == &entry.update => {
                                unsaved.remove(&entry.user_id);
                            }
                            Some(_) => superseded += 1,
                            None => {}
                        }
                    }
                    report.succeeded.push(entry.user_id);
                }
                Err(e) => {
                    warn!(user = %entry.user_id, error = %e, "Replay failed, edit stays queued");
                    if entry.volatile {
                        self.persist_unsaved(&entry);
                    }
                    report.failed.push(entry.user_id);
                }
            }
        }

        if !settled.is_empty() {
            if let Some(removed) =
                self.with_db("settle replayed edits", |db| db.settle_replay(&settled))
            {
                debug!(removed, replayed = settled.len(), "Settled replayed edits");
                superseded += settled.len().saturating_sub(removed);
            }
        }
        superseded
    }

    fn snapshot(&self) -> Vec<ReplayEntry> {
        let durable = self.pending();
        let unsaved = lock(&self.unsaved);

        let mut entries: Vec<ReplayEntry> = durable
            .into_iter()
            .map(|edit| {
                // An in-memory edit is always newer than the durable row.
                let newer = unsaved.get(&edit.user_id).cloned();
                ReplayEntry {
                    volatile: newer.is_some(),
                    update: newer.unwrap_or(edit.update),
                    revision: Some(edit.revision),
                    user_id: edit.user_id,
                }
            })
            .collect();

        for (user_id, update) in unsaved.iter() {
            if !entries.iter().any(|e| &e.user_id == user_id) {
                entries.push(ReplayEntry {
                    user_id: user_id.clone(),
                    update: update.clone(),
                    revision: None,
                    volatile: true,
                });
            }
        }
        entries
    }

    // Retry writing a memory-only edit to the queue, unless a newer edit
    // replaced it in the meantime.
    fn persist_unsaved(&self, entry: &ReplayEntry) {
        let mut unsaved = lock(&self.unsaved);
        if unsaved.get(&entry.user_id) != Some(&entry.update) {
            return;
        }
        if self
            .with_db("queue profile edit", |db| {
                db.enqueue_edit(&entry.user_id, &entry.update)
            })
            .is_some()
        {
            unsaved.remove(&entry.user_id);
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    async fn write_remote(&self, user_id: &UserId, update: &ProfileUpdate) -> Result<FarmerProfile> {
        match tokio::time::timeout(self.timeout, self.remote.write_profile(user_id, update)).await {
            Ok(result) => result,
            Err(_) => Err(AgrilinkError::Timeout),
        }
    }

    fn cache_profile(&self, profile: &FarmerProfile) {
        self.with_db("cache profile", |db| {
            db.set_json(STORAGE_KEY_CACHED_PROFILE, profile)
        });
    }

    fn with_db<T>(
        &self,
        op: &'static str,
        f: impl FnOnce(&mut Database) -> std::result::Result<T, StoreError>,
    ) -> Option<T> {
        let mut db = lock(&self.db);
        match f(&mut db) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(op, error = %e, "Local store operation failed");
                None
            }
        }
    }

    /// Move to `next`. Only the replay itself may leave `SyncingQueue`.
    fn transition(&self, next: SyncState, from_replay: bool) {
        self.state.send_if_modified(|current| {
            if *current == next || (*current == SyncState::SyncingQueue && !from_replay) {
                return false;
            }
            debug!(from = ?*current, to = ?next, "Sync state");
            *current = next;
            true
        });
    }

    fn refresh_state(&self, from_replay: bool) {
        let next = if self.queued_count() > 0 {
            SyncState::QueuedLocal
        } else {
            SyncState::Idle
        };
        self.transition(next, from_replay);
    }
}

/// Replay the queue every time the device becomes reachable.
pub fn spawn_connectivity_listener(
    sync: Arc<ProfileSync>,
    mut rx: watch::Receiver<Reachability>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let reachability = *rx.borrow_and_update();
            sync.events.emit(ClientEvent::ConnectivityChanged {
                online: reachability.is_online(),
            });

            if !reachability.is_online() {
                continue;
            }

            let report = sync.sync_pending().await;
            debug!(
                succeeded = report.succeeded.len(),
                failed = report.failed.len(),
                coalesced = report.coalesced,
                "Reconnect sync done"
            );
        }
        debug!("Connectivity channel closed, sync listener exiting");
    })
}
