//! Per-participant session state: local identity, remote reveal flag and the
//! placement mirror, from which the phase is derived on demand.

use crate::dao::models::{ChangeEvent, PlacementChange, PlacementEntity, SessionEntity};

use super::{
    identity::LocalIdentity,
    mirror::{MirrorOutcome, PlacementMirror},
    phase::{Phase, derive_phase},
    placement::{Placement, Point},
};

/// What changed after folding one notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeOutcome {
    /// The mirrored placements changed.
    pub mirror_changed: bool,
    /// The participant's own submission gate was cleared by a remote change.
    pub self_reset: bool,
    /// Phase before the change was applied.
    pub phase_before: Phase,
    /// Phase after the change was applied.
    pub phase_after: Phase,
}

impl ChangeOutcome {
    /// Whether anything visible to the participant changed.
    pub fn is_visible(&self) -> bool {
        self.mirror_changed || self.self_reset || self.phase_before != self.phase_after
    }
}

/// State owned by one participant's client.
#[derive(Debug, Clone, Default)]
pub struct ClientSession {
    name: Option<String>,
    submitted: bool,
    preview: Option<Point>,
    revealed: bool,
    synced: bool,
    mirror: PlacementMirror,
}

impl ClientSession {
    /// Fresh session with no identity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Session restored from a cached identity.
    ///
    /// The cached submission flag is trusted only until the first bootstrap.
    pub fn restore(identity: LocalIdentity) -> Self {
        Self {
            name: identity.participant_name,
            submitted: identity.has_submitted,
            ..Self::default()
        }
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        derive_phase(self.name.is_some(), self.revealed, self.submitted)
    }

    /// Participant name, if chosen.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Whether the participant's placement is stored remotely.
    pub fn submitted(&self) -> bool {
        self.submitted
    }

    /// Unsubmitted marker position, if any.
    pub fn preview(&self) -> Option<Point> {
        self.preview
    }

    /// Last known reveal flag.
    pub fn revealed(&self) -> bool {
        self.revealed
    }

    /// Whether at least one bulk fetch has completed.
    pub fn is_synced(&self) -> bool {
        self.synced
    }

    /// Mirrored placements table.
    pub fn mirror(&self) -> &PlacementMirror {
        &self.mirror
    }

    /// Identity snapshot suitable for the identity store.
    pub fn identity(&self) -> LocalIdentity {
        LocalIdentity {
            participant_name: self.name.clone(),
            has_submitted: self.submitted,
        }
    }

    /// The participant's own stored placement, if mirrored.
    pub fn own_placement(&self) -> Option<&Placement> {
        self.name.as_deref().and_then(|name| self.mirror.get(name))
    }

    /// Adopt a (validated) name; clears any in-progress placement.
    ///
    /// When the mirror already holds a row for the name, the participant is
    /// considered to have submitted.
    pub fn choose_name(&mut self, name: String) {
        self.submitted = self.synced && self.mirror.contains(&name);
        self.preview = None;
        self.name = Some(name);
    }

    /// Move the preview marker. Returns `false` when the phase does not accept
    /// clicks.
    pub fn place_preview(&mut self, point: Point) -> bool {
        if !self.phase().accepts_placement() {
            return false;
        }
        self.preview = Some(Point::clamped(point.x, point.y));
        true
    }

    /// Record a successful submit.
    pub fn mark_submitted(&mut self) {
        self.submitted = true;
    }

    /// Replace remote facts with a fresh bulk fetch.
    ///
    /// A missing session row is read as "not revealed".
    pub fn bootstrap(
        &mut self,
        placements: Vec<PlacementEntity>,
        session: Option<SessionEntity>,
    ) -> ChangeOutcome {
        let phase_before = self.phase();
        let was_submitted = self.submitted;

        self.mirror.replace_all(placements);
        self.revealed = session.is_some_and(|row| row.revealed);
        self.synced = true;

        self.submitted = self
            .name
            .as_deref()
            .is_some_and(|name| self.mirror.contains(name));
        let self_reset = was_submitted && !self.submitted;
        if self_reset || self.submitted {
            self.preview = None;
        }

        ChangeOutcome {
            mirror_changed: true,
            self_reset,
            phase_before,
            phase_after: self.phase(),
        }
    }

    /// Fold one change notification.
    pub fn apply(&mut self, change: ChangeEvent) -> ChangeOutcome {
        let phase_before = self.phase();
        let (mirror_changed, self_reset) = match change {
            ChangeEvent::Placement(change) => self.apply_placement(change),
            ChangeEvent::Session(row) => (false, self.apply_session(row)),
        };

        ChangeOutcome {
            mirror_changed,
            self_reset,
            phase_before,
            phase_after: self.phase(),
        }
    }

    fn apply_placement(&mut self, change: PlacementChange) -> (bool, bool) {
        let deleted_name = match &change {
            PlacementChange::Deleted(before) => Some(before.name.clone()),
            _ => None,
        };
        let outcome = self.mirror.apply(change);

        let own_delete =
            deleted_name.is_some_and(|deleted| self.name.as_deref() == Some(deleted.as_str()));
        let self_reset = own_delete && !matches!(outcome, MirrorOutcome::Superseded);
        if self_reset {
            self.clear_submission();
        }
        (outcome.changed(), self_reset)
    }

    fn apply_session(&mut self, row: SessionEntity) -> bool {
        self.revealed = row.revealed;
        if row.revealed {
            return false;
        }
        let had_submission = self.submitted || self.preview.is_some();
        self.clear_submission();
        had_submission
    }

    fn clear_submission(&mut self) {
        self.submitted = false;
        self.preview = None;
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use uuid::Uuid;

    use super::*;

    fn row(name: &str) -> PlacementEntity {
        PlacementEntity {
            id: Uuid::new_v4(),
            name: name.into(),
            x: 0.5,
            y: 0.5,
            created_at: SystemTime::UNIX_EPOCH,
        }
    }

    fn named(name: &str) -> ClientSession {
        let mut session = ClientSession::new();
        session.bootstrap(Vec::new(), Some(SessionEntity::hidden()));
        session.choose_name(name.into());
        session
    }

    #[test]
    fn starts_in_name_entry() {
        assert_eq!(ClientSession::new().phase(), Phase::NameEntry);
    }

    #[test]
    fn preview_only_moves_in_placement() {
        let mut session = named("Ana");
        assert!(session.place_preview(Point { x: 1.4, y: 0.2 }));
        assert_eq!(session.preview(), Some(Point { x: 1.0, y: 0.2 }));

        session.mark_submitted();
        assert!(!session.place_preview(Point { x: 0.1, y: 0.1 }));
        assert_eq!(session.preview(), Some(Point { x: 1.0, y: 0.2 }));
    }

    #[test]
    fn own_delete_clears_the_submission_gate() {
        let mut session = named("Ana");
        let ana = row("Ana");
        session.apply(ChangeEvent::Placement(PlacementChange::Inserted(ana.clone())));
        session.mark_submitted();
        assert_eq!(session.phase(), Phase::Submitted);

        let outcome = session.apply(ChangeEvent::Placement(PlacementChange::Deleted(ana)));

        assert!(outcome.self_reset);
        assert!(!session.submitted());
        assert_eq!(session.preview(), None);
        assert_eq!(outcome.phase_after, Phase::Placement);
    }

    #[test]
    fn stale_own_delete_is_ignored() {
        let mut session = named("Ana");
        let old = row("Ana");
        let fresh = row("Ana");
        session.apply(ChangeEvent::Placement(PlacementChange::Inserted(fresh)));
        session.mark_submitted();

        let outcome = session.apply(ChangeEvent::Placement(PlacementChange::Deleted(old)));

        assert!(!outcome.self_reset);
        assert!(session.submitted());
    }

    #[test]
    fn foreign_delete_keeps_own_submission() {
        let mut session = named("Ana");
        let bo = row("Bo");
        session.apply(ChangeEvent::Placement(PlacementChange::Inserted(bo.clone())));
        session.mark_submitted();

        let outcome = session.apply(ChangeEvent::Placement(PlacementChange::Deleted(bo)));

        assert!(outcome.mirror_changed);
        assert!(!outcome.self_reset);
        assert!(session.submitted());
    }

    #[test]
    fn hiding_the_reveal_clears_submission() {
        let mut session = named("Ana");
        session.mark_submitted();
        session.apply(ChangeEvent::Session(SessionEntity {
            id: 1,
            revealed: true,
        }));
        assert_eq!(session.phase(), Phase::Revealed);

        let outcome = session.apply(ChangeEvent::Session(SessionEntity::hidden()));

        assert!(outcome.self_reset);
        assert_eq!(outcome.phase_after, Phase::Placement);
    }

    #[test]
    fn bootstrap_prefers_remote_rows_over_cached_flag() {
        let mut session = ClientSession::restore(LocalIdentity {
            participant_name: Some("Ana".into()),
            has_submitted: true,
        });
        assert_eq!(session.phase(), Phase::Submitted);

        let outcome = session.bootstrap(vec![row("Bo")], None);

        assert!(outcome.self_reset);
        assert!(!session.revealed());
        assert_eq!(session.phase(), Phase::Placement);

        session.bootstrap(vec![row("Ana")], Some(SessionEntity::hidden()));
        assert_eq!(session.phase(), Phase::Submitted);
    }

    #[test]
    fn choosing_a_taken_name_adopts_its_submission() {
        let mut session = ClientSession::new();
        session.bootstrap(vec![row("Ana")], Some(SessionEntity::hidden()));

        session.choose_name("Ana".into());

        assert_eq!(session.phase(), Phase::Submitted);
        assert!(session.own_placement().is_some());
    }
}
