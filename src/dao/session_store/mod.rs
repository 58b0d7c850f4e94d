#[cfg(feature = "couch-store")]
pub mod couchdb;
pub mod memory;

use futures::{StreamExt, future::BoxFuture, stream::BoxStream};
use tracing::debug;
use uuid::Uuid;

use crate::dao::models::{
    ChangeEvent, PlacementDraft, PlacementEntity, SessionEntity, SessionPatch, Table,
};
use crate::dao::storage::StorageResult;

/// Stream of change notifications for one table.
pub type ChangeStream = BoxStream<'static, StorageResult<ChangeEvent>>;

/// Abstraction over the shared placements table and session singleton.
pub trait SessionStore: Send + Sync {
    /// Read every placement row.
    fn fetch_placements(&self) -> BoxFuture<'static, StorageResult<Vec<PlacementEntity>>>;
    /// Read the session singleton, `None` when it has not been provisioned.
    fn fetch_session(&self) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>>;
    /// Insert a placement or overwrite the coordinates of the row holding the same name.
    fn upsert_placement(
        &self,
        draft: PlacementDraft,
    ) -> BoxFuture<'static, StorageResult<PlacementEntity>>;
    /// Patch the session singleton, `None` when the row does not exist.
    fn update_session(
        &self,
        patch: SessionPatch,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>>;
    /// Remove every placement row, returning the rows that were removed.
    fn delete_all_placements(&self) -> BoxFuture<'static, StorageResult<Vec<PlacementEntity>>>;
    /// Open a change notification subscription on `table`.
    fn subscribe(&self, table: Table) -> BoxFuture<'static, StorageResult<Subscription>>;
    /// Cheap connectivity probe.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Re-establish backend prerequisites before a fresh synchronisation.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}

type ReleaseFn = Box<dyn FnOnce() + Send>;

/// Handle on a live change subscription.
///
/// The backend-side registration is released exactly once, either through
/// [`Subscription::unsubscribe`] or when the handle is dropped.
pub struct Subscription {
    id: Uuid,
    table: Table,
    events: ChangeStream,
    release: Option<ReleaseFn>,
}

impl Subscription {
    /// Wrap a change stream together with the callback that unregisters it.
    pub fn new(table: Table, events: ChangeStream, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            id: Uuid::new_v4(),
            table,
            events,
            release: Some(Box::new(release)),
        }
    }

    /// Identifier of this subscription.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Wait for the next notification. `None` means the stream has ended.
    pub async fn next_change(&mut self) -> Option<StorageResult<ChangeEvent>> {
        self.events.next().await
    }

    /// Release the subscription explicitly.
    pub fn unsubscribe(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            debug!(id = %self.id, table = ?self.table, "releasing change subscription");
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("table", &self.table)
            .field("released", &self.release.is_none())
            .finish()
    }
}
