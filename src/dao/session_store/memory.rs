//! In-process session store sharing one table between every client of the process.

use std::{
    io,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::SystemTime,
};

use dashmap::{DashMap, mapref::entry::Entry};
use futures::{
    StreamExt,
    future::{self, BoxFuture},
};
use tokio::sync::{broadcast, oneshot};
use tokio_stream::wrappers::{BroadcastStream, errors::BroadcastStreamRecvError};
use tracing::debug;
use uuid::Uuid;

use crate::dao::{
    models::{
        ChangeEvent, PlacementChange, PlacementDraft, PlacementEntity, SESSION_ID, SessionEntity,
        SessionPatch, Table,
    },
    session_store::{SessionStore, Subscription},
    storage::{StorageError, StorageResult},
};

pub(crate) const CHANGE_CAPACITY: usize = 256;

/// Session store kept entirely in memory, with broadcast change notifications.
///
/// Cloning is cheap and every clone observes the same table.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

struct MemoryInner {
    placements: DashMap<String, PlacementEntity>,
    session: Mutex<Option<SessionEntity>>,
    changes: broadcast::Sender<ChangeEvent>,
    subscriptions: DashMap<Uuid, (Table, oneshot::Sender<()>)>,
    offline: AtomicBool,
    reject_writes: AtomicBool,
    reject_deletes: AtomicBool,
}

impl MemoryStore {
    /// Create a store with the session singleton provisioned and not revealed.
    pub fn new() -> Self {
        Self::with_session(Some(SessionEntity::hidden()))
    }

    /// Create a store whose session singleton was never provisioned.
    pub fn without_session() -> Self {
        Self::with_session(None)
    }

    fn with_session(session: Option<SessionEntity>) -> Self {
        let (changes, _receiver) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            inner: Arc::new(MemoryInner {
                placements: DashMap::new(),
                session: Mutex::new(session),
                changes,
                subscriptions: DashMap::new(),
                offline: AtomicBool::new(false),
                reject_writes: AtomicBool::new(false),
                reject_deletes: AtomicBool::new(false),
            }),
        }
    }

    /// Make every operation fail as if the backend were unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    /// Make every write fail with a rejection while reads keep working.
    pub fn set_reject_writes(&self, reject: bool) {
        self.inner.reject_writes.store(reject, Ordering::SeqCst);
    }

    /// Make only `delete_all_placements` fail with a rejection.
    pub fn set_reject_deletes(&self, reject: bool) {
        self.inner.reject_deletes.store(reject, Ordering::SeqCst);
    }

    /// Number of subscriptions that have not been released yet.
    pub fn active_subscriptions(&self) -> usize {
        self.inner.subscriptions.len()
    }

    /// End every open change stream, as a dropped notification channel would.
    pub fn disconnect_subscribers(&self) {
        let keys: Vec<Uuid> = self
            .inner
            .subscriptions
            .iter()
            .map(|entry| *entry.key())
            .collect();
        for key in keys {
            if let Some((_, (_, stop))) = self.inner.subscriptions.remove(&key) {
                let _ = stop.send(());
            }
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryInner {
    fn check_online(&self) -> StorageResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StorageError::unavailable(
                "memory store is offline".into(),
                io::Error::new(io::ErrorKind::NotConnected, "offline"),
            ));
        }
        Ok(())
    }

    fn check_writable(&self) -> StorageResult<()> {
        self.check_online()?;
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(StorageError::rejected("writes are disabled"));
        }
        Ok(())
    }

    fn publish(&self, event: ChangeEvent) {
        // No receivers simply means nobody is listening yet.
        let _ = self.changes.send(event);
    }
}

impl SessionStore for MemoryStore {
    fn fetch_placements(&self) -> BoxFuture<'static, StorageResult<Vec<PlacementEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.check_online()?;
            let mut rows: Vec<PlacementEntity> = inner
                .placements
                .iter()
                .map(|entry| entry.value().clone())
                .collect();
            rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
            Ok(rows)
        })
    }

    fn fetch_session(&self) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.check_online()?;
            let guard = inner.session.lock().unwrap_or_else(PoisonError::into_inner);
            Ok(*guard)
        })
    }

    fn upsert_placement(
        &self,
        draft: PlacementDraft,
    ) -> BoxFuture<'static, StorageResult<PlacementEntity>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.check_writable()?;
            let (row, change) = match inner.placements.entry(draft.name.clone()) {
                Entry::Occupied(mut occupied) => {
                    let row = occupied.get_mut();
                    row.x = draft.x;
                    row.y = draft.y;
                    let row = row.clone();
                    (row.clone(), PlacementChange::Updated(row))
                }
                Entry::Vacant(vacant) => {
                    let row = PlacementEntity {
                        id: Uuid::new_v4(),
                        name: draft.name,
                        x: draft.x,
                        y: draft.y,
                        created_at: SystemTime::now(),
                    };
                    vacant.insert(row.clone());
                    (row.clone(), PlacementChange::Inserted(row))
                }
            };
            inner.publish(ChangeEvent::Placement(change));
            Ok(row)
        })
    }

    fn update_session(
        &self,
        patch: SessionPatch,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.check_writable()?;
            let updated = {
                let mut guard = inner.session.lock().unwrap_or_else(PoisonError::into_inner);
                guard.as_mut().map(|session| {
                    session.revealed = patch.revealed;
                    *session
                })
            };
            if let Some(session) = updated {
                inner.publish(ChangeEvent::Session(session));
            } else {
                debug!(id = SESSION_ID, "session row missing; update matched nothing");
            }
            Ok(updated)
        })
    }

    fn delete_all_placements(&self) -> BoxFuture<'static, StorageResult<Vec<PlacementEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.check_writable()?;
            if inner.reject_deletes.load(Ordering::SeqCst) {
                return Err(StorageError::rejected("deletes are disabled"));
            }
            let names: Vec<String> = inner
                .placements
                .iter()
                .map(|entry| entry.key().clone())
                .collect();
            let removed: Vec<PlacementEntity> = names
                .iter()
                .filter_map(|name| inner.placements.remove(name).map(|(_, row)| row))
                .collect();
            for row in &removed {
                inner.publish(ChangeEvent::Placement(PlacementChange::Deleted(row.clone())));
            }
            Ok(removed)
        })
    }

    fn subscribe(&self, table: Table) -> BoxFuture<'static, StorageResult<Subscription>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.check_online()?;
            let key = Uuid::new_v4();
            let (stop_tx, stop_rx) = oneshot::channel::<()>();
            let receiver = inner.changes.subscribe();
            inner.subscriptions.insert(key, (table, stop_tx));

            let events = BroadcastStream::new(receiver)
                .filter_map(move |item| {
                    future::ready(match item {
                        Ok(event) if event.table() == table => Some(Ok(event)),
                        Ok(_) => None,
                        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                            Some(Err(StorageError::Lagged { skipped }))
                        }
                    })
                })
                .take_until(stop_rx)
                .boxed();

            let registry = inner.clone();
            Ok(Subscription::new(table, events, move || {
                registry.subscriptions.remove(&key);
            }))
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.check_online() })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.health_check()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(name: &str, x: f64, y: f64) -> PlacementDraft {
        PlacementDraft {
            name: name.into(),
            x,
            y,
        }
    }

    #[tokio::test]
    async fn upsert_keeps_row_identity_for_same_name() {
        let store = MemoryStore::new();
        let first = store.upsert_placement(draft("Alice", 0.1, 0.1)).await.unwrap();
        let second = store.upsert_placement(draft("Alice", 0.7, 0.3)).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.x, 0.7);
        let rows = store.fetch_placements().await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn subscription_receives_only_its_table() {
        let store = MemoryStore::new();
        let mut placements = store.subscribe(Table::Placements).await.unwrap();

        store
            .update_session(SessionPatch { revealed: true })
            .await
            .unwrap();
        store.upsert_placement(draft("Bob", 0.5, 0.5)).await.unwrap();

        match placements.next_change().await {
            Some(Ok(ChangeEvent::Placement(PlacementChange::Inserted(row)))) => {
                assert_eq!(row.name, "Bob")
            }
            other => panic!("unexpected change: {other:?}"),
        }
    }

    #[tokio::test]
    async fn delete_all_emits_before_rows() {
        let store = MemoryStore::new();
        store.upsert_placement(draft("Alice", 0.2, 0.8)).await.unwrap();
        let mut placements = store.subscribe(Table::Placements).await.unwrap();

        let removed = store.delete_all_placements().await.unwrap();
        assert_eq!(removed.len(), 1);

        match placements.next_change().await {
            Some(Ok(ChangeEvent::Placement(PlacementChange::Deleted(row)))) => {
                assert_eq!(row.name, "Alice");
                assert_eq!(row.id, removed[0].id);
            }
            other => panic!("unexpected change: {other:?}"),
        }
    }

    #[tokio::test]
    async fn dropping_subscription_releases_it() {
        let store = MemoryStore::new();
        let subscription = store.subscribe(Table::Session).await.unwrap();
        let other = store.subscribe(Table::Placements).await.unwrap();
        assert_eq!(store.active_subscriptions(), 2);

        drop(subscription);
        assert_eq!(store.active_subscriptions(), 1);

        other.unsubscribe();
        assert_eq!(store.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn disconnect_ends_streams() {
        let store = MemoryStore::new();
        let mut subscription = store.subscribe(Table::Placements).await.unwrap();

        store.disconnect_subscribers();

        assert!(subscription.next_change().await.is_none());
        assert_eq!(store.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn missing_session_update_matches_nothing() {
        let store = MemoryStore::without_session();
        let updated = store
            .update_session(SessionPatch { revealed: true })
            .await
            .unwrap();
        assert!(updated.is_none());
        assert!(store.fetch_session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rejected_writes_leave_table_untouched() {
        let store = MemoryStore::new();
        store.set_reject_writes(true);

        let err = store
            .upsert_placement(draft("Alice", 0.2, 0.2))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Rejected { .. }));
        assert!(store.fetch_placements().await.unwrap().is_empty());
    }
}
