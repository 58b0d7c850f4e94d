use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

/// Identifier of the single shared session row.
pub const SESSION_ID: u32 = 1;

/// A participant's stored marker, one row per participant name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlacementEntity {
    /// Opaque row identifier assigned by the store when the row is first created.
    pub id: Uuid,
    /// Participant display name, unique across live rows.
    pub name: String,
    /// Horizontal position in `[0, 1]`, 0 being the left edge.
    pub x: f64,
    /// Vertical position in `[0, 1]`, 0 being the top edge.
    pub y: f64,
    /// Creation timestamp of the row.
    pub created_at: SystemTime,
}

/// Write payload for an upsert keyed by participant name.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacementDraft {
    /// Conflict key of the upsert.
    pub name: String,
    /// Horizontal position, already clamped by the caller.
    pub x: f64,
    /// Vertical position, already clamped by the caller.
    pub y: f64,
}

/// The shared session singleton.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionEntity {
    /// Always [`SESSION_ID`].
    pub id: u32,
    /// Whether every placement is visible to every participant.
    pub revealed: bool,
}

impl SessionEntity {
    /// A session row that has not been revealed yet.
    pub fn hidden() -> Self {
        Self {
            id: SESSION_ID,
            revealed: false,
        }
    }
}

/// Partial update applied to the session singleton.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPatch {
    /// New value of the reveal flag.
    pub revealed: bool,
}

/// Tables exposed by the remote session store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    /// One row per participant placement.
    Placements,
    /// The session singleton.
    Session,
}

/// Change notification for the placements table.
///
/// Each variant carries only the row the notification guarantees: the new row
/// for inserts and updates, the old row for deletes.
#[derive(Debug, Clone, PartialEq)]
pub enum PlacementChange {
    /// A row was created.
    Inserted(PlacementEntity),
    /// An existing row was overwritten.
    Updated(PlacementEntity),
    /// A row was removed; carries the row as it was before deletion.
    Deleted(PlacementEntity),
}

/// Change notification delivered by a store subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    /// A placements table change.
    Placement(PlacementChange),
    /// The session singleton was updated; carries the new row.
    Session(SessionEntity),
}

impl ChangeEvent {
    /// Table this change belongs to.
    pub fn table(&self) -> Table {
        match self {
            ChangeEvent::Placement(_) => Table::Placements,
            ChangeEvent::Session(_) => Table::Session,
        }
    }
}
