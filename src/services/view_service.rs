use crate::{
    config::AppConfig,
    dto::view::{LegendEntry, MarkerDto, MatrixView},
    state::{
        SharedState,
        client::ClientSession,
        phase::Phase,
        placement::{Placement, Point},
    },
};

/// Longest label drawn next to a marker before truncation.
const LABEL_CHARS: usize = 12;

/// Current view of the shared state.
pub async fn current_view(state: &SharedState) -> MatrixView {
    let degraded = state.is_degraded();
    state
        .read_client(|client| project(client, state.config(), degraded))
        .await
}

/// Project the client session into what the participant should see.
pub fn project(client: &ClientSession, config: &AppConfig, degraded: bool) -> MatrixView {
    let phase = client.phase();
    let name = client.name();
    let revealed = phase == Phase::Revealed;

    let own_point = match phase {
        Phase::NameEntry => None,
        Phase::Placement => client.preview(),
        Phase::Submitted | Phase::Revealed => client.own_placement().map(|p| p.point),
    };
    let own_marker = name
        .zip(own_point)
        .map(|(name, point)| marker(name, point, config.own_color()));

    let mut others = Vec::new();
    let mut legend = Vec::new();
    if revealed {
        let mut other_index = 0;
        for placement in client.mirror().iter() {
            let is_self = Some(placement.name.as_str()) == name;
            let color = if is_self {
                config.own_color()
            } else {
                let color = config.marker_color(other_index);
                other_index += 1;
                others.push(placed_marker(placement, color));
                color
            };
            legend.push(LegendEntry {
                name: placement.name.clone(),
                label: truncate_label(&placement.name),
                color: color.to_string(),
                is_self,
            });
        }
    }

    MatrixView {
        phase: phase.into(),
        participant_name: name.map(str::to_string),
        own_marker,
        others,
        participant_count: client.mirror().len(),
        legend,
        can_place: phase.accepts_placement(),
        can_submit: phase == Phase::Placement && client.preview().is_some(),
        hint: hint(phase, client.preview().is_some()).to_string(),
        quadrants: config.quadrants().to_vec(),
        degraded,
    }
}

fn hint(phase: Phase, has_preview: bool) -> &'static str {
    match phase {
        Phase::NameEntry => "Enter your name to place yourself on the matrix.",
        Phase::Placement if has_preview => "Click to move your dot · then Submit",
        Phase::Placement => "Click anywhere on the matrix to place your dot",
        Phase::Submitted => "Waiting for reveal…",
        Phase::Revealed => "Results revealed!",
    }
}

fn marker(name: &str, point: Point, color: &str) -> MarkerDto {
    MarkerDto {
        name: name.to_string(),
        label: truncate_label(name),
        x: point.x,
        y: point.y,
        color: color.to_string(),
    }
}

fn placed_marker(placement: &Placement, color: &str) -> MarkerDto {
    marker(&placement.name, placement.point, color)
}

/// Shorten a name for display, appending `…` when characters were dropped.
pub fn truncate_label(name: &str) -> String {
    if name.chars().count() > LABEL_CHARS {
        let mut label: String = name.chars().take(LABEL_CHARS).collect();
        label.push('…');
        label
    } else {
        name.to_string()
    }
}
