//! In-process backend.
//!
//! [`MemoryBackend`] implements [`DocumentStore`], [`AuthProvider`] and
//! [`ObjectStorage`] over plain collections. It backs the CLI's offline
//! demo mode and every client test. Availability can be toggled to
//! simulate losing the network, and individual documents can be marked as
//! rejected to inject permanent write failures.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

use agrilink_shared::types::UserId;

use crate::backend::{
    AuthProvider, AuthUser, Document, DocumentStore, ObjectStorage, Query, SnapshotCallback,
    Subscription,
};
use crate::error::{NetError, Result};

type Collections = HashMap<String, BTreeMap<String, Value>>;

struct Listener {
    query: Query,
    callback: Arc<SnapshotCallback>,
}

struct Inner {
    collections: Mutex<Collections>,
    listeners: Mutex<HashMap<u64, Listener>>,
    next_listener: AtomicU64,
    rejected: Mutex<HashSet<(String, String)>>,
    objects: Mutex<HashMap<String, Bytes>>,
    available: AtomicBool,
    writes: AtomicU64,
    auth: watch::Sender<Option<AuthUser>>,
    tokens: Mutex<HashMap<String, AuthUser>>,
}

/// Shared-state backend; clones see the same data.
#[derive(Clone)]
pub struct MemoryBackend {
    inner: Arc<Inner>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryBackend {
    pub fn new() -> Self {
        let (auth, _rx) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                collections: Mutex::new(HashMap::new()),
                listeners: Mutex::new(HashMap::new()),
                next_listener: AtomicU64::new(0),
                rejected: Mutex::new(HashSet::new()),
                objects: Mutex::new(HashMap::new()),
                available: AtomicBool::new(true),
                writes: AtomicU64::new(0),
                auth,
                tokens: Mutex::new(HashMap::new()),
            }),
        }
    }

    // ------------------------------------------------------------------
    // Failure injection
    // ------------------------------------------------------------------

    /// While unavailable every operation fails with [`NetError::Unavailable`].
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
        debug!(available, "Memory backend availability changed");
    }

    pub fn is_available(&self) -> bool {
        self.inner.available.load(Ordering::SeqCst)
    }

    /// Refuse every write to `collection/id` until [`Self::accept_document`].
    pub fn reject_document(&self, collection: &str, id: &str) {
        lock(&self.inner.rejected).insert((collection.into(), id.into()));
    }

    pub fn accept_document(&self, collection: &str, id: &str) {
        lock(&self.inner.rejected).remove(&(collection.to_string(), id.to_string()));
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> u64 {
        self.inner.writes.load(Ordering::SeqCst)
    }

    // ------------------------------------------------------------------
    // Auth helpers
    // ------------------------------------------------------------------

    /// Make `token` exchangeable for `user` via `sign_in_with_token`.
    pub fn register_token(&self, token: &str, user: AuthUser) {
        lock(&self.inner.tokens).insert(token.into(), user);
    }

    /// Set the signed-in user directly.
    pub fn sign_in_as(&self, user: AuthUser) {
        self.inner.auth.send_replace(Some(user));
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.inner.listeners).len()
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn ensure_available(&self) -> Result<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(NetError::Unavailable)
        }
    }

    fn ensure_writable(&self, collection: &str, id: &str) -> Result<()> {
        self.ensure_available()?;
        if lock(&self.inner.rejected).contains(&(collection.to_string(), id.to_string())) {
            return Err(NetError::Rejected(format!(
                "permission denied on {collection}/{id}"
            )));
        }
        Ok(())
    }

    fn snapshot(&self, query: &Query) -> Vec<Document> {
        let collections = lock(&self.inner.collections);
        let docs = collections
            .get(&query.collection)
            .into_iter()
            .flat_map(|c| c.iter())
            .map(|(id, data)| Document {
                id: id.clone(),
                data: data.clone(),
            });
        query.apply(docs)
    }

    /// Re-run every live query on `collection`. Callbacks run with no
    /// internal lock held so they may call back into the backend.
    fn notify(&self, collection: &str) {
        self.inner.writes.fetch_add(1, Ordering::SeqCst);

        let targets: Vec<(Query, Arc<SnapshotCallback>)> = lock(&self.inner.listeners)
            .values()
            .filter(|l| l.query.collection == collection)
            .map(|l| (l.query.clone(), l.callback.clone()))
            .collect();

        for (query, callback) in targets {
            let docs = self.snapshot(&query);
            callback(docs);
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// DocumentStore
// ---------------------------------------------------------------------------

#[async_trait]
impl DocumentStore for MemoryBackend {
    async fn get_document(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        self.ensure_available()?;
        let collections = lock(&self.inner.collections);
        Ok(collections
            .get(collection)
            .and_then(|c| c.get(id))
            .map(|data| Document {
                id: id.to_string(),
                data: data.clone(),
            }))
    }

    async fn set_document(&self, collection: &str, id: &str, data: Value) -> Result<()> {
        self.ensure_writable(collection, id)?;
        lock(&self.inner.collections)
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), data);
        self.notify(collection);
        Ok(())
    }

    async fn update_document(&self, collection: &str, id: &str, patch: Value) -> Result<()> {
        self.ensure_writable(collection, id)?;
        {
            let mut collections = lock(&self.inner.collections);
            let existing = collections
                .get_mut(collection)
                .and_then(|c| c.get_mut(id))
                .ok_or_else(|| NetError::NotFound {
                    collection: collection.into(),
                    id: id.into(),
                })?;

            match (existing, patch) {
                (Value::Object(target), Value::Object(fields)) => {
                    for (k, v) in fields {
                        target.insert(k, v);
                    }
                }
                (target, other) => *target = other,
            }
        }
        self.notify(collection);
        Ok(())
    }

    async fn add_document(&self, collection: &str, data: Value) -> Result<String> {
        let id = Uuid::new_v4().simple().to_string();
        self.set_document(collection, &id, data).await?;
        Ok(id)
    }

    async fn delete_document(&self, collection: &str, id: &str) -> Result<()> {
        self.ensure_writable(collection, id)?;
        let removed = lock(&self.inner.collections)
            .get_mut(collection)
            .and_then(|c| c.remove(id))
            .is_some();
        if removed {
            self.notify(collection);
        }
        Ok(())
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>> {
        self.ensure_available()?;
        Ok(self.snapshot(query))
    }

    fn subscribe(&self, query: Query, callback: SnapshotCallback) -> Subscription {
        let callback = Arc::new(callback);
        let id = self.inner.next_listener.fetch_add(1, Ordering::SeqCst);

        let initial = self.snapshot(&query);
        lock(&self.inner.listeners).insert(
            id,
            Listener {
                query,
                callback: callback.clone(),
            },
        );
        callback(initial);

        let inner = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = inner.upgrade() {
                lock(&inner.listeners).remove(&id);
            }
        })
    }
}

// ---------------------------------------------------------------------------
// AuthProvider
// ---------------------------------------------------------------------------

#[async_trait]
impl AuthProvider for MemoryBackend {
    fn current_user(&self) -> Option<AuthUser> {
        self.inner.auth.borrow().clone()
    }

    async fn sign_in_anonymously(&self) -> Result<AuthUser> {
        self.ensure_available()?;
        let user = AuthUser {
            uid: UserId::new(Uuid::new_v4().simple().to_string()),
            email: None,
            display_name: None,
            is_anonymous: true,
        };
        self.inner.auth.send_replace(Some(user.clone()));
        Ok(user)
    }

    async fn sign_in_with_token(&self, id_token: &str) -> Result<AuthUser> {
        self.ensure_available()?;
        let user = lock(&self.inner.tokens)
            .get(id_token)
            .cloned()
            .ok_or_else(|| NetError::Rejected("invalid credential".into()))?;
        self.inner.auth.send_replace(Some(user.clone()));
        Ok(user)
    }

    async fn sign_out(&self) -> Result<()> {
        self.inner.auth.send_replace(None);
        Ok(())
    }

    fn watch(&self) -> watch::Receiver<Option<AuthUser>> {
        self.inner.auth.subscribe()
    }
}

// ---------------------------------------------------------------------------
// ObjectStorage
// ---------------------------------------------------------------------------

#[async_trait]
impl ObjectStorage for MemoryBackend {
    async fn upload(&self, path: &str, bytes: Bytes) -> Result<String> {
        self.ensure_available()?;
        lock(&self.inner.objects).insert(path.to_string(), bytes);
        Ok(format!("memory://{path}"))
    }

    async fn download_url(&self, path: &str) -> Result<String> {
        self.ensure_available()?;
        if lock(&self.inner.objects).contains_key(path) {
            Ok(format!("memory://{path}"))
        } else {
            Err(NetError::NotFound {
                collection: "objects".into(),
                id: path.into(),
            })
        }
    }
}
