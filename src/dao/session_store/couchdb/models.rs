use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::dao::{
    models::{ChangeEvent, PlacementChange, PlacementEntity, SESSION_ID, SessionEntity},
    session_store::couchdb::error::CouchDaoError,
};

pub const PLACEMENT_PREFIX: &str = "placement::";
pub const SESSION_PREFIX: &str = "session::";
pub const END_SUFFIX: &str = "\u{ffff}";

#[derive(Debug, Deserialize)]
pub struct AllDocsResponse {
    pub rows: Vec<AllDocsRow>,
}

#[derive(Debug, Deserialize)]
pub struct AllDocsRow {
    pub id: String,
    #[serde(default)]
    pub doc: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct DatabaseInfo {
    pub update_seq: Value,
}

#[derive(Debug, Deserialize)]
pub struct ChangesResponse {
    pub results: Vec<ChangeRow>,
    pub last_seq: Value,
}

#[derive(Debug, Deserialize)]
pub struct ChangeRow {
    pub id: String,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub doc: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct BulkDocsRequest<T> {
    pub docs: Vec<T>,
}

#[derive(Debug, Deserialize)]
pub struct BulkDocsResult {
    pub id: String,
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchPlacementDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    /// Tombstones keep their body so the changes feed can report the old row.
    #[serde(rename = "_deleted", default, skip_serializing_if = "std::ops::Not::not")]
    pub deleted: bool,
    #[serde(flatten)]
    pub placement: PlacementBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacementBody {
    pub row_id: Uuid,
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

impl CouchPlacementDocument {
    /// Build a fresh document for a row that does not exist yet.
    pub fn create(name: String, x: f64, y: f64) -> Self {
        let now = SystemTime::now();
        Self {
            id: placement_doc_id(&name),
            rev: None,
            deleted: false,
            placement: PlacementBody {
                row_id: Uuid::new_v4(),
                name,
                x,
                y,
                created_at: now,
                updated_at: now,
            },
        }
    }

    /// Overwrite the coordinates while keeping row identity and creation time.
    pub fn overwrite(mut self, x: f64, y: f64) -> Self {
        self.placement.x = x;
        self.placement.y = y;
        self.placement.updated_at = SystemTime::now();
        self
    }

    /// Turn a live document into its tombstone.
    pub fn into_tombstone(mut self) -> Self {
        self.deleted = true;
        self
    }

    /// A document is a first write while it has never been overwritten.
    pub fn is_fresh(&self) -> bool {
        self.placement.created_at == self.placement.updated_at
    }
}

impl From<CouchPlacementDocument> for PlacementEntity {
    fn from(doc: CouchPlacementDocument) -> Self {
        Self {
            id: doc.placement.row_id,
            name: doc.placement.name,
            x: doc.placement.x,
            y: doc.placement.y,
            created_at: doc.placement.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchSessionDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub session: SessionBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionBody {
    pub session_id: u32,
    #[serde(default)]
    pub revealed: bool,
}

impl CouchSessionDocument {
    pub fn new(revealed: bool) -> Self {
        Self {
            id: session_doc_id(),
            rev: None,
            session: SessionBody {
                session_id: SESSION_ID,
                revealed,
            },
        }
    }
}

impl From<CouchSessionDocument> for SessionEntity {
    fn from(doc: CouchSessionDocument) -> Self {
        Self {
            id: doc.session.session_id,
            revealed: doc.session.revealed,
        }
    }
}

pub fn placement_doc_id(name: &str) -> String {
    format!("{}{}", PLACEMENT_PREFIX, name)
}

pub fn session_doc_id() -> String {
    format!("{}{}", SESSION_PREFIX, SESSION_ID)
}

/// Classify one `_changes` row into a change notification.
///
/// Rows outside the two known prefixes (design documents, foreign data) and
/// session tombstones yield `None`.
pub fn classify_change(row: ChangeRow) -> Result<Option<ChangeEvent>, CouchDaoError> {
    let Some(doc) = row.doc else {
        return Ok(None);
    };

    if row.id.starts_with(PLACEMENT_PREFIX) {
        let doc: CouchPlacementDocument =
            serde_json::from_value(doc).map_err(|source| CouchDaoError::DeserializeValue {
                path: row.id.clone(),
                source,
            })?;
        let change = if row.deleted || doc.deleted {
            PlacementChange::Deleted(doc.into())
        } else if doc.is_fresh() {
            PlacementChange::Inserted(doc.into())
        } else {
            PlacementChange::Updated(doc.into())
        };
        return Ok(Some(ChangeEvent::Placement(change)));
    }

    if row.id.starts_with(SESSION_PREFIX) && !row.deleted {
        let doc: CouchSessionDocument =
            serde_json::from_value(doc).map_err(|source| CouchDaoError::DeserializeValue {
                path: row.id.clone(),
                source,
            })?;
        return Ok(Some(ChangeEvent::Session(doc.into())));
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str, deleted: bool, doc: Value) -> ChangeRow {
        ChangeRow {
            id: id.into(),
            deleted,
            doc: Some(doc),
        }
    }

    #[test]
    fn fresh_placement_is_an_insert() {
        let doc = CouchPlacementDocument::create("Alice".into(), 0.2, 0.8);
        let value = serde_json::to_value(&doc).unwrap();

        let change = classify_change(row(&doc.id, false, value)).unwrap();
        match change {
            Some(ChangeEvent::Placement(PlacementChange::Inserted(entity))) => {
                assert_eq!(entity.name, "Alice");
                assert_eq!(entity.id, doc.placement.row_id);
            }
            other => panic!("unexpected change: {other:?}"),
        }
    }

    #[test]
    fn overwritten_placement_is_an_update() {
        let doc = CouchPlacementDocument::create("Alice".into(), 0.2, 0.8);
        std::thread::sleep(std::time::Duration::from_millis(2));
        let doc = doc.overwrite(0.4, 0.4);
        let value = serde_json::to_value(&doc).unwrap();

        let change = classify_change(row(&doc.id, false, value)).unwrap();
        assert!(matches!(
            change,
            Some(ChangeEvent::Placement(PlacementChange::Updated(_)))
        ));
    }

    #[test]
    fn tombstone_keeps_the_before_row() {
        let doc = CouchPlacementDocument::create("Bob".into(), 0.9, 0.1).into_tombstone();
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["_deleted"], Value::Bool(true));

        let change = classify_change(row(&doc.id, true, value)).unwrap();
        match change {
            Some(ChangeEvent::Placement(PlacementChange::Deleted(entity))) => {
                assert_eq!(entity.name, "Bob");
                assert_eq!(entity.x, 0.9);
            }
            other => panic!("unexpected change: {other:?}"),
        }
    }

    #[test]
    fn session_document_maps_to_session_change() {
        let value = serde_json::to_value(CouchSessionDocument::new(true)).unwrap();
        let change = classify_change(row(&session_doc_id(), false, value)).unwrap();
        assert_eq!(
            change,
            Some(ChangeEvent::Session(SessionEntity {
                id: SESSION_ID,
                revealed: true
            }))
        );
    }

    #[test]
    fn unrelated_documents_are_ignored() {
        let change = classify_change(row("_design/views", false, Value::Null)).unwrap();
        assert!(change.is_none());
    }
}
