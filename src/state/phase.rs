//! Derivation of the participant's UI phase.
//!
//! The phase is never stored: callers recompute it from the facts it depends
//! on every time one of them changes.

/// Mutually exclusive UI modes of a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// No display name chosen yet.
    NameEntry,
    /// Name chosen; the participant may place and submit a marker.
    Placement,
    /// Marker submitted; waiting for the facilitator to reveal.
    Submitted,
    /// Every marker is visible to everyone.
    Revealed,
}

impl Phase {
    /// Whether clicks on the matrix move the participant's preview marker.
    pub fn accepts_placement(self) -> bool {
        matches!(self, Phase::Placement)
    }
}

/// Compute the phase from its three inputs.
///
/// Precedence is `NameEntry` > `Revealed` > `Submitted` > `Placement`.
pub fn derive_phase(has_name: bool, revealed: bool, submitted: bool) -> Phase {
    if !has_name {
        Phase::NameEntry
    } else if revealed {
        Phase::Revealed
    } else if submitted {
        Phase::Submitted
    } else {
        Phase::Placement
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_the_full_truth_table() {
        let cases = [
            ((false, false, false), Phase::NameEntry),
            ((false, false, true), Phase::NameEntry),
            ((false, true, false), Phase::NameEntry),
            ((false, true, true), Phase::NameEntry),
            ((true, false, false), Phase::Placement),
            ((true, false, true), Phase::Submitted),
            ((true, true, false), Phase::Revealed),
            ((true, true, true), Phase::Revealed),
        ];

        for ((has_name, revealed, submitted), expected) in cases {
            assert_eq!(
                derive_phase(has_name, revealed, submitted),
                expected,
                "has_name={has_name} revealed={revealed} submitted={submitted}"
            );
        }
    }

    #[test]
    fn only_placement_accepts_clicks() {
        assert!(Phase::Placement.accepts_placement());
        assert!(!Phase::Submitted.accepts_placement());
        assert!(!Phase::Revealed.accepts_placement());
        assert!(!Phase::NameEntry.accepts_placement());
    }
}
