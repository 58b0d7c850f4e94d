use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use coaching_matrix::{
    config::AppConfig,
    dao::{
        models::PlacementDraft,
        session_store::{SessionStore, memory::MemoryStore},
    },
    dto::phase::VisiblePhase,
    services::{participant_service, session_service, sync_service, view_service},
    state::{
        AppState, SharedState,
        client::ClientSession,
        identity::{LocalIdentity, MemoryIdentityStore},
        phase::Phase,
    },
};
use tokio::{task::JoinHandle, time::sleep};

const WAIT_LIMIT: Duration = Duration::from_secs(5);

/// A participant client running its own sync loop against `store`.
struct Client {
    state: SharedState,
    sync: JoinHandle<()>,
}

impl Client {
    async fn start(store: &MemoryStore) -> Self {
        Self::start_with(store, LocalIdentity::default()).await
    }

    async fn start_with(store: &MemoryStore, identity: LocalIdentity) -> Self {
        let state = AppState::new(
            Arc::new(store.clone()),
            Arc::new(MemoryIdentityStore::new(identity)),
            AppConfig::default(),
        );
        let sync = tokio::spawn(sync_service::run(state.clone()));
        let client = Self { state, sync };
        client.wait_live().await;
        client
    }

    async fn wait_live(&self) {
        let deadline = Instant::now() + WAIT_LIMIT;
        while self.state.is_degraded() {
            assert!(Instant::now() < deadline, "timed out waiting for live sync");
            sleep(Duration::from_millis(10)).await;
        }
    }

    async fn eventually<F>(&self, what: &str, check: F)
    where
        F: Fn(&ClientSession) -> bool,
    {
        let deadline = Instant::now() + WAIT_LIMIT;
        loop {
            if self.state.read_client(|client| check(client)).await {
                return;
            }
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            sleep(Duration::from_millis(10)).await;
        }
    }

    async fn join_as(&self, name: &str, x: f64, y: f64) {
        participant_service::choose_name(&self.state, name)
            .await
            .expect("choose name");
        participant_service::place_preview(&self.state, x, y)
            .await
            .expect("place preview");
        participant_service::submit(&self.state)
            .await
            .expect("submit");
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.sync.abort();
    }
}

#[tokio::test]
async fn reveal_shows_every_marker_with_distinct_colors() {
    let store = MemoryStore::new();
    let alice = Client::start(&store).await;
    let bob = Client::start(&store).await;

    alice.join_as("Alice", 0.2, 0.8).await;
    bob.join_as("Bob", 0.9, 0.1).await;
    alice
        .eventually("Bob's placement", |c| c.mirror().contains("Bob"))
        .await;

    let hidden = view_service::current_view(&alice.state).await;
    assert_eq!(hidden.phase, VisiblePhase::Submitted);
    let own = hidden.own_marker.expect("own marker");
    assert_eq!((own.name.as_str(), own.x, own.y), ("Alice", 0.2, 0.8));
    assert!(hidden.others.is_empty());

    session_service::reveal(&bob.state).await.expect("reveal");
    alice.eventually("reveal", |c| c.revealed()).await;

    let revealed = view_service::current_view(&alice.state).await;
    assert_eq!(revealed.phase, VisiblePhase::Revealed);
    assert_eq!(revealed.participant_count, 2);
    let own = revealed.own_marker.expect("own marker");
    let other = revealed.others.first().expect("Bob's marker");
    assert_eq!(revealed.others.len(), 1);
    assert_eq!((other.name.as_str(), other.x, other.y), ("Bob", 0.9, 0.1));
    assert_ne!(own.color, other.color);
}

#[tokio::test]
async fn submit_clamps_coordinates_for_everyone() {
    let store = MemoryStore::new();
    let alice = Client::start(&store).await;
    let bob = Client::start(&store).await;

    participant_service::submit_at(&alice.state, "Alice", 1.5, -0.3)
        .await
        .expect("submit");

    bob.eventually("Alice's placement", |c| c.mirror().contains("Alice"))
        .await;
    let point = bob
        .state
        .read_client(|c| c.mirror().get("Alice").map(|p| p.point))
        .await
        .expect("mirrored");
    assert_eq!((point.x, point.y), (1.0, 0.0));
}

#[tokio::test]
async fn reset_clears_every_client() {
    let store = MemoryStore::new();
    let alice = Client::start(&store).await;
    let bob = Client::start(&store).await;
    alice.join_as("Alice", 0.3, 0.3).await;
    bob.join_as("Bob", 0.6, 0.6).await;
    session_service::reveal(&alice.state).await.expect("reveal");
    bob.eventually("reveal", |c| c.revealed() && c.mirror().len() == 2)
        .await;

    let response = session_service::reset(&alice.state).await.expect("reset");
    assert_eq!(response.cleared, 2);

    for client in [&alice, &bob] {
        client
            .eventually("empty mirror", |c| c.mirror().is_empty() && !c.revealed())
            .await;
        assert_eq!(
            client.state.read_client(|c| c.phase()).await,
            Phase::Placement
        );
    }
    assert!(!bob.state.identity_store().load().has_submitted);
}

#[tokio::test]
async fn reveal_twice_keeps_results_visible() {
    let store = MemoryStore::new();
    let alice = Client::start(&store).await;
    alice.join_as("Alice", 0.5, 0.5).await;

    session_service::reveal(&alice.state).await.expect("first");
    let second = session_service::reveal(&alice.state).await.expect("second");

    assert!(second.revealed);
    assert_eq!(second.phase, VisiblePhase::Revealed);
    let session = store.fetch_session().await.expect("fetch");
    assert_eq!(session.map(|s| s.revealed), Some(true));
}

#[tokio::test]
async fn remote_delete_of_own_placement_reopens_placement() {
    let store = MemoryStore::new();
    let alice = Client::start(&store).await;
    alice.join_as("Alice", 0.4, 0.4).await;
    assert_eq!(
        alice.state.read_client(|c| c.phase()).await,
        Phase::Submitted
    );

    store.delete_all_placements().await.expect("delete");

    alice
        .eventually("self reset", |c| !c.submitted() && c.preview().is_none())
        .await;
    assert_eq!(
        alice.state.read_client(|c| c.phase()).await,
        Phase::Placement
    );
}

#[tokio::test]
async fn rejected_submit_keeps_the_preview() {
    let store = MemoryStore::new();
    let alice = Client::start(&store).await;
    participant_service::choose_name(&alice.state, "Alice")
        .await
        .expect("name");
    participant_service::place_preview(&alice.state, 0.7, 0.2)
        .await
        .expect("preview");
    store.set_reject_writes(true);

    assert!(participant_service::submit(&alice.state).await.is_err());

    let (phase, preview) = alice
        .state
        .read_client(|c| (c.phase(), c.preview()))
        .await;
    assert_eq!(phase, Phase::Placement);
    assert!(preview.is_some());
    assert!(store.fetch_placements().await.expect("fetch").is_empty());
}

#[tokio::test]
async fn lost_subscriptions_are_resynchronised() {
    let store = MemoryStore::new();
    let alice = Client::start(&store).await;

    store.disconnect_subscribers();
    store
        .upsert_placement(PlacementDraft {
            name: "Bob".into(),
            x: 0.1,
            y: 0.1,
        })
        .await
        .expect("upsert while disconnected");

    alice
        .eventually("resync after disconnect", |c| c.mirror().contains("Bob"))
        .await;
    alice.wait_live().await;
    assert_eq!(store.active_subscriptions(), 2);
}

#[tokio::test]
async fn cached_submission_yields_to_the_store() {
    let store = MemoryStore::new();
    let alice = Client::start_with(
        &store,
        LocalIdentity {
            participant_name: Some("Alice".into()),
            has_submitted: true,
        },
    )
    .await;

    assert_eq!(
        alice.state.read_client(|c| c.phase()).await,
        Phase::Placement
    );
}

#[tokio::test]
async fn stopping_a_client_releases_its_subscriptions() {
    let store = MemoryStore::new();
    let alice = Client::start(&store).await;
    assert_eq!(store.active_subscriptions(), 2);

    drop(alice);

    let deadline = Instant::now() + WAIT_LIMIT;
    while store.active_subscriptions() != 0 {
        assert!(Instant::now() < deadline, "subscriptions were not released");
        sleep(Duration::from_millis(10)).await;
    }
}
