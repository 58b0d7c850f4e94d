//! Local mirror of the placements table.
//!
//! Entries are keyed by participant name and kept in the order their latest
//! version arrived: an update moves the participant to the end, which is what
//! drives colour assignment in the rendered view.

use indexmap::IndexMap;
use uuid::Uuid;

use crate::dao::models::{PlacementChange, PlacementEntity};

use super::placement::Placement;

/// Effect of folding one placement notification into the mirror.
#[derive(Debug, Clone, PartialEq)]
pub enum MirrorOutcome {
    /// The row was inserted or replaced; `previous` holds the replaced entry.
    Upserted {
        /// Entry stored under the same name before the change, if any.
        previous: Option<Placement>,
    },
    /// The entry matching the deleted row was removed.
    Removed(Placement),
    /// The deleted row was not mirrored; nothing changed.
    Absent,
    /// The delete targeted an older row for a name that now maps to another
    /// row; the current entry was kept.
    Superseded,
}

impl MirrorOutcome {
    /// Whether the mirror content changed.
    pub fn changed(&self) -> bool {
        matches!(self, Self::Upserted { .. } | Self::Removed(_))
    }
}

/// Arrival-ordered, name-keyed collection of placements.
#[derive(Debug, Clone, Default)]
pub struct PlacementMirror {
    entries: IndexMap<String, Placement>,
}

impl PlacementMirror {
    /// Empty mirror.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole content with a fetched table.
    ///
    /// Rows are taken in the order supplied; a name seen twice keeps its last row.
    pub fn replace_all<I>(&mut self, rows: I)
    where
        I: IntoIterator<Item = PlacementEntity>,
    {
        self.entries.clear();
        for row in rows {
            self.upsert(Placement::from(row));
        }
    }

    /// Fold one change notification into the mirror.
    pub fn apply(&mut self, change: PlacementChange) -> MirrorOutcome {
        match change {
            PlacementChange::Inserted(row) | PlacementChange::Updated(row) => {
                let previous = self.upsert(Placement::from(row));
                MirrorOutcome::Upserted { previous }
            }
            PlacementChange::Deleted(before) => self.remove(before.id, &before.name),
        }
    }

    fn upsert(&mut self, placement: Placement) -> Option<Placement> {
        let previous = self.entries.shift_remove(&placement.name);
        self.entries.insert(placement.name.clone(), placement);
        previous
    }

    fn remove(&mut self, id: Uuid, name: &str) -> MirrorOutcome {
        match self.entries.get(name) {
            Some(current) if current.id == id => self
                .entries
                .shift_remove(name)
                .map_or(MirrorOutcome::Absent, MirrorOutcome::Removed),
            Some(_) => MirrorOutcome::Superseded,
            None => match self.position_of(id) {
                // The row was renamed out from under us; drop it by identity.
                Some(index) => self
                    .entries
                    .shift_remove_index(index)
                    .map_or(MirrorOutcome::Absent, |(_, placement)| {
                        MirrorOutcome::Removed(placement)
                    }),
                None => MirrorOutcome::Absent,
            },
        }
    }

    fn position_of(&self, id: Uuid) -> Option<usize> {
        self.entries.values().position(|placement| placement.id == id)
    }

    /// Entry for `name`, if mirrored.
    pub fn get(&self, name: &str) -> Option<&Placement> {
        self.entries.get(name)
    }

    /// Whether a placement exists for `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Number of mirrored placements.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the mirror holds no placement.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Placements in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = &Placement> {
        self.entries.values()
    }
}
