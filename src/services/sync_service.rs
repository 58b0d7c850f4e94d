use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::{
    dao::{
        models::{ChangeEvent, Table},
        session_store::Subscription,
        storage::StorageError,
    },
    services::sse_events,
    state::{SharedState, client::ChangeOutcome},
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);

/// Live change subscriptions on both tables.
///
/// Dropping the feeds releases both subscriptions.
pub struct LiveFeeds {
    placements: Subscription,
    session: Subscription,
}

/// Why following the live feeds stopped.
#[derive(Debug)]
pub enum FeedEnd {
    /// The stream for the table ended.
    Closed(Table),
    /// The stream for the table yielded an error.
    Failed(Table, StorageError),
}

/// Keep the client session synchronised with the store forever.
///
/// Each round subscribes, bulk-fetches and then follows the live feeds; when
/// either feed stops, both subscriptions are released and the loop backs off
/// before resynchronising from scratch.
pub async fn run(state: SharedState) {
    let mut delay = INITIAL_DELAY;

    loop {
        match sync_once(&state).await {
            Ok(mut feeds) => {
                set_degraded(&state, false).await;
                info!("session store synchronised; following live changes");
                delay = INITIAL_DELAY;

                let end = follow(&state, &mut feeds).await;
                drop(feeds);
                match end {
                    FeedEnd::Closed(table) => {
                        warn!(?table, "change stream closed; resynchronising")
                    }
                    FeedEnd::Failed(table, err) => {
                        warn!(?table, error = %err, "change stream failed; resynchronising")
                    }
                }
                set_degraded(&state, true).await;
            }
            Err(err) => {
                warn!(error = %err, "session store synchronisation failed");
                set_degraded(&state, true).await;
            }
        }

        sleep(delay).await;
        delay = (delay * 2).min(MAX_DELAY);
    }
}

/// Subscribe to both tables, then replace local remote facts with a bulk fetch.
///
/// Subscribing first means any change committed while fetching is buffered in
/// the returned feeds; folding it afterwards is harmless.
pub async fn sync_once(state: &SharedState) -> Result<LiveFeeds, StorageError> {
    let store = state.store().clone();
    store.try_reconnect().await?;

    let placements = store.subscribe(Table::Placements).await?;
    let session = store.subscribe(Table::Session).await?;
    debug!(
        placements = %placements.id(),
        session = %session.id(),
        "change subscriptions opened"
    );

    let rows = store.fetch_placements().await?;
    let session_row = store.fetch_session().await?;
    if session_row.is_none() {
        warn!("session row is missing; treating it as not revealed");
    }

    let count = rows.len();
    let (outcome, identity) = state
        .with_client_mut(|client| (client.bootstrap(rows, session_row), client.identity()))
        .await;
    if outcome.self_reset || outcome.phase_before != outcome.phase_after {
        state.persist_identity(&identity);
    }
    info!(placements = count, phase = ?outcome.phase_after, "bulk fetch applied");
    sse_events::broadcast_view(state).await;

    Ok(LiveFeeds {
        placements,
        session,
    })
}

/// Fold live notifications until one of the feeds stops.
pub async fn follow(state: &SharedState, feeds: &mut LiveFeeds) -> FeedEnd {
    loop {
        let (table, next) = tokio::select! {
            next = feeds.placements.next_change() => (Table::Placements, next),
            next = feeds.session.next_change() => (Table::Session, next),
        };

        match next {
            Some(Ok(change)) => {
                apply_change(state, change).await;
            }
            Some(Err(err)) => return FeedEnd::Failed(table, err),
            None => return FeedEnd::Closed(table),
        }
    }
}

/// Fold one notification into the client session and publish the result.
pub async fn apply_change(state: &SharedState, change: ChangeEvent) -> ChangeOutcome {
    let (outcome, identity) = state
        .with_client_mut(|client| (client.apply(change), client.identity()))
        .await;

    if outcome.self_reset {
        info!("own submission cleared by a remote change");
        state.persist_identity(&identity);
    }
    if outcome.is_visible() {
        sse_events::broadcast_view(state).await;
    }
    outcome
}

async fn set_degraded(state: &SharedState, degraded: bool) {
    if state.update_degraded(degraded) {
        sse_events::broadcast_system_status(state, degraded);
        sse_events::broadcast_view(state).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            models::PlacementDraft,
            session_store::{
                SessionStore,
                memory::{CHANGE_CAPACITY, MemoryStore},
            },
        },
        state::{
            AppState,
            identity::{LocalIdentity, MemoryIdentityStore},
            phase::Phase,
        },
    };

    fn app(store: &MemoryStore, identity: LocalIdentity) -> SharedState {
        AppState::new(
            Arc::new(store.clone()),
            Arc::new(MemoryIdentityStore::new(identity)),
            AppConfig::default(),
        )
    }

    #[tokio::test]
    async fn bootstrap_overrides_cached_submission() {
        let store = MemoryStore::new();
        let state = app(
            &store,
            LocalIdentity {
                participant_name: Some("Ana".into()),
                has_submitted: true,
            },
        );
        assert_eq!(state.read_client(|c| c.phase()).await, Phase::Submitted);

        let _feeds = sync_once(&state).await.expect("sync");

        assert_eq!(state.read_client(|c| c.phase()).await, Phase::Placement);
        assert!(!state.identity_store().load().has_submitted);
    }

    #[tokio::test]
    async fn buffered_changes_are_folded_after_fetch() {
        let store = MemoryStore::new();
        let state = app(&store, LocalIdentity::default());
        let mut feeds = sync_once(&state).await.expect("sync");

        store
            .upsert_placement(PlacementDraft {
                name: "Bo".into(),
                x: 0.5,
                y: 0.5,
            })
            .await
            .expect("upsert");
        let change = feeds
            .placements
            .next_change()
            .await
            .expect("buffered change")
            .expect("change ok");
        let outcome = apply_change(&state, change).await;

        assert!(outcome.mirror_changed);
        let mirrored = state.read_client(|c| c.mirror().contains("Bo")).await;
        assert!(mirrored);
    }

    #[tokio::test]
    async fn follow_stops_when_the_store_drops_subscribers() {
        let store = MemoryStore::new();
        let state = app(&store, LocalIdentity::default());
        let mut feeds = sync_once(&state).await.expect("sync");

        store.disconnect_subscribers();
        let end = follow(&state, &mut feeds).await;

        assert!(matches!(end, FeedEnd::Closed(_)));
    }

    #[tokio::test]
    async fn lagging_feed_fails_and_a_fresh_fetch_catches_up() {
        let store = MemoryStore::new();
        let state = app(&store, LocalIdentity::default());
        let mut feeds = sync_once(&state).await.expect("sync");

        let burst = CHANGE_CAPACITY + 10;
        for i in 0..burst {
            store
                .upsert_placement(PlacementDraft {
                    name: format!("P{i}"),
                    x: 0.5,
                    y: 0.5,
                })
                .await
                .expect("upsert");
        }
        let end = follow(&state, &mut feeds).await;

        assert!(matches!(
            end,
            FeedEnd::Failed(_, StorageError::Lagged { .. })
        ));
        drop(feeds);
        let _feeds = sync_once(&state).await.expect("resync");
        assert_eq!(state.read_client(|c| c.mirror().len()).await, burst);
    }

    #[tokio::test]
    async fn dropping_feeds_releases_subscriptions() {
        let store = MemoryStore::new();
        let state = app(&store, LocalIdentity::default());

        let feeds = sync_once(&state).await.expect("sync");
        assert_eq!(store.active_subscriptions(), 2);

        drop(feeds);
        assert_eq!(store.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn offline_store_fails_the_sync() {
        let store = MemoryStore::new();
        store.set_offline(true);
        let state = app(&store, LocalIdentity::default());

        assert!(sync_once(&state).await.is_err());
        assert_eq!(store.active_subscriptions(), 0);
    }
}
