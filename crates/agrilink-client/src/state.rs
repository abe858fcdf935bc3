//! Application context shared by every command.
//!
//! [`AppContext`] owns the local database, the backend collaborators, the
//! connectivity monitor and the profile sync engine. It is built once by
//! [`AppContext::start`], handed around as `Arc<AppContext>`, and torn down
//! with [`AppContext::shutdown`].

use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use agrilink_net::{
    AuthProvider, AuthUser, ConnectivityMonitor, DocumentStore, MemoryBackend, ObjectStorage,
    PlantDiagnosisClient, PlantSpeciesClient,
};
use agrilink_shared::constants::STORAGE_KEY_SIGNED_IN_USER;
use agrilink_shared::error::{AgrilinkError, Result};
use agrilink_store::Database;

use crate::config::ClientConfig;
use crate::device::LocationProvider;
use crate::events::{ClientEvent, EventBus};
use crate::sync::{spawn_connectivity_listener, DocumentProfileRemote, ProfileSync};

/// The remote services the client talks to.
#[derive(Clone)]
pub struct Backends {
    pub documents: Arc<dyn DocumentStore>,
    pub auth: Arc<dyn AuthProvider>,
    pub storage: Arc<dyn ObjectStorage>,
}

impl Backends {
    /// Route every service to one in-process backend.
    pub fn memory(backend: &MemoryBackend) -> Self {
        Self {
            documents: Arc::new(backend.clone()),
            auth: Arc::new(backend.clone()),
            storage: Arc::new(backend.clone()),
        }
    }
}

/// Central application state.
pub struct AppContext {
    pub config: ClientConfig,

    /// Local SQLite store: key/value cache and the pending edit queue.
    pub db: Arc<Mutex<Database>>,

    pub documents: Arc<dyn DocumentStore>,
    pub auth: Arc<dyn AuthProvider>,
    pub storage: Arc<dyn ObjectStorage>,

    pub connectivity: ConnectivityMonitor,
    pub location: Arc<dyn LocationProvider>,

    pub diagnosis: PlantDiagnosisClient,
    pub species: PlantSpeciesClient,

    pub events: EventBus,
    pub sync: Arc<ProfileSync>,

    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl AppContext {
    /// Open the database named by `config` (or the platform default).
    pub fn open_database(config: &ClientConfig) -> Result<Database> {
        let db = match &config.data_dir {
            Some(dir) => Database::open_in_dir(dir)?,
            None => Database::new()?,
        };
        Ok(db)
    }

    /// Wire everything together and start the background tasks: queue
    /// replay on reconnect and signed-in user caching.
    pub async fn start(
        config: ClientConfig,
        database: Database,
        backends: Backends,
        connectivity: ConnectivityMonitor,
        location: Arc<dyn LocationProvider>,
    ) -> Arc<Self> {
        let db = Arc::new(Mutex::new(database));
        let events = EventBus::new();

        let sync = Arc::new(ProfileSync::new(
            db.clone(),
            Arc::new(DocumentProfileRemote::new(backends.documents.clone())),
            connectivity.clone(),
            events.clone(),
            config.remote_write_timeout,
        ));

        let diagnosis =
            PlantDiagnosisClient::with_endpoint(config.plant_id_api_key.clone(), &config.plant_id_endpoint);
        let species =
            PlantSpeciesClient::with_endpoint(config.perenual_api_key.clone(), &config.perenual_endpoint);

        let ctx = Arc::new(Self {
            config,
            db,
            documents: backends.documents,
            auth: backends.auth,
            storage: backends.storage,
            connectivity,
            location,
            diagnosis,
            species,
            events,
            sync,
            tasks: Mutex::new(Vec::new()),
        });

        let listener = spawn_connectivity_listener(ctx.sync.clone(), ctx.connectivity.subscribe());
        let auth_watch = spawn_auth_watch(ctx.clone());
        ctx.track(listener);
        ctx.track(auth_watch);

        if ctx.connectivity.is_online() && ctx.sync.queued_count() > 0 {
            let sync = ctx.sync.clone();
            ctx.track(tokio::spawn(async move {
                sync.sync_pending().await;
            }));
        }

        info!(config = ?ctx.config, "AgriLink client started");
        ctx
    }

    /// Stop every background task. Queued edits stay in the database.
    pub fn shutdown(&self) {
        let tasks: Vec<_> = self.lock_tasks().drain(..).collect();
        for task in &tasks {
            task.abort();
        }
        info!(tasks = tasks.len(), "AgriLink client stopped");
    }

    /// The signed-in user, or `NotSignedIn`.
    pub fn current_user(&self) -> Result<AuthUser> {
        self.auth.current_user().ok_or(AgrilinkError::NotSignedIn)
    }

    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    /// Run `f` against the local database, mapping store errors.
    pub fn with_db<T>(
        &self,
        f: impl FnOnce(&mut Database) -> std::result::Result<T, agrilink_store::StoreError>,
    ) -> Result<T> {
        let mut db = self.db.lock().unwrap_or_else(|p| p.into_inner());
        Ok(f(&mut db)?)
    }

    fn track(&self, handle: JoinHandle<()>) {
        self.lock_tasks().push(handle);
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Mirror auth state into the local store and onto the event bus.
fn spawn_auth_watch(ctx: Arc<AppContext>) -> JoinHandle<()> {
    let mut rx = ctx.auth.watch();
    tokio::spawn(async move {
        loop {
            let user = rx.borrow_and_update().clone();
            let stored = match &user {
                Some(user) => ctx.with_db(|db| db.set_json(STORAGE_KEY_SIGNED_IN_USER, user)),
                None => ctx
                    .with_db(|db| db.remove_value(STORAGE_KEY_SIGNED_IN_USER))
                    .map(|_| ()),
            };
            if let Err(e) = stored {
                warn!(error = %e, "Failed to cache signed-in user");
            }

            debug!(user = ?user.as_ref().map(|u| u.uid.short()), "Auth state");
            ctx.events.emit(ClientEvent::AuthChanged {
                user_id: user.map(|u| u.uid),
            });

            if rx.changed().await.is_err() {
                break;
            }
        }
    })
}
