pub mod client;
pub mod identity;
pub mod mirror;
pub mod phase;
pub mod placement;
mod sse;

use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard, RwLock, watch};
use tracing::warn;

use crate::{config::AppConfig, dao::session_store::SessionStore};

pub use self::sse::SseHub;
use self::{
    client::ClientSession,
    identity::{IdentityStore, LocalIdentity},
};

pub type SharedState = Arc<AppState>;

const SSE_CAPACITY: usize = 32;

/// Central application state: the participant's client session and the
/// collaborators it talks to.
pub struct AppState {
    store: Arc<dyn SessionStore>,
    identity: Arc<dyn IdentityStore>,
    config: AppConfig,
    client: RwLock<ClientSession>,
    sse: SseHub,
    degraded: watch::Sender<bool>,
    command_gate: Mutex<()>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The cached identity is restored immediately; the state stays degraded
    /// until the sync loop completes its first fetch.
    pub fn new(
        store: Arc<dyn SessionStore>,
        identity: Arc<dyn IdentityStore>,
        config: AppConfig,
    ) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        let client = ClientSession::restore(identity.load());
        Arc::new(Self {
            store,
            identity,
            config,
            client: RwLock::new(client),
            sse: SseHub::new(SSE_CAPACITY),
            degraded: degraded_tx,
            command_gate: Mutex::new(()),
        })
    }

    /// Remote session store.
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Durable cache of the participant identity.
    pub fn identity_store(&self) -> &Arc<dyn IdentityStore> {
        &self.identity
    }

    /// Marker palette and quadrant colors.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Broadcast hub used for the view SSE stream.
    pub fn sse(&self) -> &SseHub {
        &self.sse
    }

    /// Run `f` against a read-only view of the client session.
    pub async fn read_client<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&ClientSession) -> T,
    {
        let guard = self.client.read().await;
        f(&guard)
    }

    /// Run `f` against the client session with write access.
    pub async fn with_client_mut<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&mut ClientSession) -> T,
    {
        let mut guard = self.client.write().await;
        f(&mut guard)
    }

    /// Serialise commands that write to the store.
    ///
    /// The client lock is never held across a store round-trip; this gate
    /// keeps two commands from interleaving their local folds instead.
    pub async fn lock_commands(&self) -> MutexGuard<'_, ()> {
        self.command_gate.lock().await
    }

    /// Write the identity to the cache; failures are logged, not returned.
    pub fn persist_identity(&self, identity: &LocalIdentity) {
        if let Err(err) = self.identity.save(identity) {
            warn!(error = %err, "failed to persist participant identity");
        }
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Update the degraded flag, returning whether it changed.
    pub fn update_degraded(&self, value: bool) -> bool {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        })
    }
}
