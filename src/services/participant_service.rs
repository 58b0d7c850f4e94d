use tracing::{info, warn};

use crate::{
    dao::models::{ChangeEvent, PlacementChange, PlacementDraft},
    dto::{
        participant::ParticipantResponse,
        validation::{validate_coordinate, validate_participant_name},
    },
    error::ServiceError,
    services::sse_events,
    state::{
        SharedState,
        phase::Phase,
        placement::{Placement, Point},
    },
};

/// Identity, phase and own marker of the local participant.
pub async fn get_participant(state: &SharedState) -> ParticipantResponse {
    state
        .read_client(|client| ParticipantResponse::from(client))
        .await
}

/// Adopt a display name, clearing any in-progress placement.
pub async fn choose_name(
    state: &SharedState,
    raw_name: &str,
) -> Result<ParticipantResponse, ServiceError> {
    let name = normalize_name(raw_name)?;
    let _gate = state.lock_commands().await;

    let (identity, response) = state
        .with_client_mut(|client| {
            client.choose_name(name.clone());
            (client.identity(), ParticipantResponse::from(&*client))
        })
        .await;
    state.persist_identity(&identity);
    info!(name = %name, "participant name chosen");

    sse_events::broadcast_view(state).await;
    Ok(response)
}

/// Move the unsubmitted marker; only allowed while placing.
pub async fn place_preview(
    state: &SharedState,
    x: f64,
    y: f64,
) -> Result<ParticipantResponse, ServiceError> {
    let point = checked_point(x, y)?;

    let response = state
        .with_client_mut(|client| {
            if client.place_preview(point) {
                Ok(ParticipantResponse::from(&*client))
            } else {
                Err(ServiceError::InvalidState(format!(
                    "markers cannot be moved in phase {:?}",
                    client.phase()
                )))
            }
        })
        .await?;

    sse_events::broadcast_view(state).await;
    Ok(response)
}

/// Submit the preview marker under the participant's name.
pub async fn submit(state: &SharedState) -> Result<ParticipantResponse, ServiceError> {
    let _gate = state.lock_commands().await;

    let (name, preview) = state
        .read_client(|client| match (client.phase(), client.name(), client.preview()) {
            (Phase::Placement, Some(name), Some(preview)) => Ok((name.to_string(), preview)),
            (Phase::Placement, _, None) => Err(ServiceError::InvalidState(
                "place a marker before submitting".into(),
            )),
            (phase, _, _) => Err(ServiceError::InvalidState(format!(
                "cannot submit in phase {phase:?}"
            ))),
        })
        .await?;

    submit_locked(state, &name, preview).await?;
    Ok(get_participant(state).await)
}

/// Upsert a placement for `name` at `(x, y)`, clamping the coordinates.
///
/// When `name` is the local participant's, the submission gate is set.
pub async fn submit_at(
    state: &SharedState,
    name: &str,
    x: f64,
    y: f64,
) -> Result<Placement, ServiceError> {
    let name = normalize_name(name)?;
    let point = checked_point(x, y)?;
    let _gate = state.lock_commands().await;
    submit_locked(state, &name, point).await
}

async fn submit_locked(
    state: &SharedState,
    name: &str,
    point: Point,
) -> Result<Placement, ServiceError> {
    let point = Point::clamped(point.x, point.y);
    let draft = PlacementDraft {
        name: name.to_string(),
        x: point.x,
        y: point.y,
    };

    let row = match state.store().upsert_placement(draft).await {
        Ok(row) => row,
        Err(err) => {
            warn!(name, error = %err, "placement submit failed");
            return Err(err.into());
        }
    };

    let (own, identity) = state
        .with_client_mut(|client| {
            let known = client.mirror().get(&row.name).map(|p| p.id);
            let change = if known == Some(row.id) {
                PlacementChange::Updated(row.clone())
            } else {
                PlacementChange::Inserted(row.clone())
            };
            client.apply(ChangeEvent::Placement(change));

            let own = client.name() == Some(row.name.as_str());
            if own {
                client.mark_submitted();
            }
            (own, client.identity())
        })
        .await;
    if own {
        state.persist_identity(&identity);
    }
    info!(name, x = row.x, y = row.y, "placement submitted");

    sse_events::broadcast_view(state).await;
    Ok(Placement::from(row))
}

fn normalize_name(raw: &str) -> Result<String, ServiceError> {
    validate_participant_name(raw).map_err(|err| {
        ServiceError::InvalidInput(
            err.message
                .map(|m| m.to_string())
                .unwrap_or_else(|| err.code.to_string()),
        )
    })?;
    Ok(raw.trim().to_string())
}

fn checked_point(x: f64, y: f64) -> Result<Point, ServiceError> {
    for value in [x, y] {
        validate_coordinate(value)
            .map_err(|_| ServiceError::InvalidInput("coordinates must be finite".into()))?;
    }
    Ok(Point::clamped(x, y))
}
