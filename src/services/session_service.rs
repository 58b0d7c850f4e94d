use tracing::{info, warn};

use crate::{
    dao::models::{ChangeEvent, PlacementChange, SessionEntity, SessionPatch},
    dto::session::{ResetResponse, SessionStatusResponse},
    error::ServiceError,
    services::sse_events,
    state::{SharedState, client::ChangeOutcome},
};

/// Make every placement visible to every participant. Idempotent.
pub async fn reveal(state: &SharedState) -> Result<SessionStatusResponse, ServiceError> {
    let _gate = state.lock_commands().await;

    let session = state
        .store()
        .update_session(SessionPatch { revealed: true })
        .await
        .inspect_err(|err| warn!(error = %err, "reveal failed"))?;
    match session {
        Some(row) => {
            fold(state, std::iter::once(ChangeEvent::Session(row))).await;
            info!("session revealed");
        }
        None => warn!("session row is missing; reveal had no effect"),
    }

    sse_events::broadcast_view(state).await;
    let (revealed, phase) = state
        .read_client(|client| (client.revealed(), client.phase()))
        .await;
    Ok(SessionStatusResponse {
        revealed,
        phase: phase.into(),
    })
}

/// Hide the results and delete every placement.
///
/// The reveal flag is cleared first so that a failure between the two writes
/// never leaves stale placements revealed. When the flag update fails nothing
/// else runs; when the delete fails after it, [`ServiceError::PartialReset`]
/// is returned.
pub async fn reset(state: &SharedState) -> Result<ResetResponse, ServiceError> {
    let _gate = state.lock_commands().await;

    let session = state
        .store()
        .update_session(SessionPatch { revealed: false })
        .await
        .inspect_err(|err| warn!(error = %err, "reset failed while hiding results"))?;
    let session = session.unwrap_or_else(|| {
        warn!("session row is missing; treating it as not revealed");
        SessionEntity::hidden()
    });
    fold(state, std::iter::once(ChangeEvent::Session(session))).await;

    let deleted = match state.store().delete_all_placements().await {
        Ok(rows) => rows,
        Err(err) => {
            warn!(error = %err, "reset left placements behind after hiding results");
            sse_events::broadcast_view(state).await;
            return Err(ServiceError::PartialReset(err));
        }
    };
    let cleared = deleted.len();
    fold(
        state,
        deleted
            .into_iter()
            .map(|row| ChangeEvent::Placement(PlacementChange::Deleted(row))),
    )
    .await;
    info!(cleared, "session reset");

    sse_events::broadcast_view(state).await;
    let (revealed, phase) = state
        .read_client(|client| (client.revealed(), client.phase()))
        .await;
    Ok(ResetResponse {
        cleared,
        revealed,
        phase: phase.into(),
    })
}

/// Apply command results locally, persisting the identity when the own
/// submission gate was cleared.
async fn fold<I>(state: &SharedState, changes: I)
where
    I: IntoIterator<Item = ChangeEvent>,
{
    let (self_reset, identity) = state
        .with_client_mut(|client| {
            let self_reset = changes
                .into_iter()
                .map(|change| client.apply(change))
                .fold(false, |acc, outcome: ChangeOutcome| acc || outcome.self_reset);
            (self_reset, client.identity())
        })
        .await;
    if self_reset {
        state.persist_identity(&identity);
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
            session_store::{SessionStore, memory::MemoryStore},
        },
        services::participant_service,
        state::{AppState, identity::MemoryIdentityStore, phase::Phase},
    };

    fn app(store: &MemoryStore) -> SharedState {
        AppState::new(
            Arc::new(store.clone()),
            Arc::new(MemoryIdentityStore::default()),
            AppConfig::default(),
        )
    }

    #[tokio::test]
    async fn reveal_is_idempotent() {
        let store = MemoryStore::new();
        let state = app(&store);

        let first = reveal(&state).await.expect("first reveal");
        let second = reveal(&state).await.expect("second reveal");

        assert!(first.revealed && second.revealed);
        let session = store.fetch_session().await.expect("fetch");
        assert_eq!(session.map(|s| s.revealed), Some(true));
    }

    #[tokio::test]
    async fn reveal_without_session_row_reports_hidden() {
        let store = MemoryStore::without_session();
        let state = app(&store);

        let status = reveal(&state).await.expect("reveal");

        assert!(!status.revealed);
    }

    #[tokio::test]
    async fn reset_clears_placements_and_own_gate() {
        let store = MemoryStore::new();
        let state = app(&store);
        participant_service::choose_name(&state, "Ana")
            .await
            .expect("name");
        participant_service::submit_at(&state, "Ana", 0.3, 0.3)
            .await
            .expect("submit");
        store
            .upsert_placement(PlacementDraft {
                name: "Bo".into(),
                x: 0.6,
                y: 0.6,
            })
            .await
            .expect("other submit");
        reveal(&state).await.expect("reveal");

        let response = reset(&state).await.expect("reset");

        assert_eq!(response.cleared, 2);
        assert!(!response.revealed);
        assert_eq!(
            response.phase,
            crate::dto::phase::VisiblePhase::Placement
        );
        assert!(store.fetch_placements().await.expect("fetch").is_empty());
        assert!(!state.identity_store().load().has_submitted);
        let (phase, mirrored) = state
            .read_client(|c| (c.phase(), c.mirror().len()))
            .await;
        assert_eq!(phase, Phase::Placement);
        assert_eq!(mirrored, 0);
    }

    #[tokio::test]
    async fn failed_flag_update_skips_the_delete() {
        let store = MemoryStore::new();
        let state = app(&store);
        participant_service::submit_at(&state, "Ana", 0.3, 0.3)
            .await
            .expect("submit");
        store.set_reject_writes(true);

        let err = reset(&state).await.expect_err("rejected");

        assert!(matches!(err, ServiceError::Rejected(_)));
        store.set_reject_writes(false);
        assert_eq!(store.fetch_placements().await.expect("fetch").len(), 1);
    }

    #[tokio::test]
    async fn failed_delete_after_hiding_reports_partial_reset() {
        let store = MemoryStore::new();
        let state = app(&store);
        participant_service::choose_name(&state, "Ana")
            .await
            .expect("name");
        participant_service::submit_at(&state, "Ana", 0.3, 0.3)
            .await
            .expect("submit");
        reveal(&state).await.expect("reveal");
        store.set_reject_deletes(true);

        let err = reset(&state).await.expect_err("delete rejected");

        assert!(matches!(err, ServiceError::PartialReset(_)));
        let session = store.fetch_session().await.expect("fetch session");
        assert_eq!(session.map(|s| s.revealed), Some(false));
        assert_eq!(store.fetch_placements().await.expect("fetch").len(), 1);
        let (revealed, submitted, mirrored) = state
            .read_client(|c| (c.revealed(), c.submitted(), c.mirror().contains("Ana")))
            .await;
        assert!(!revealed);
        assert!(!submitted);
        assert!(mirrored);
        assert!(!state.identity_store().load().has_submitted);
    }
}
