//! Long-polling consumer of the CouchDB `_changes` feed.

use async_stream::try_stream;
use futures::Stream;
use serde_json::Value;
use tracing::trace;

use crate::dao::{
    models::{ChangeEvent, Table},
    storage::{StorageError, StorageResult},
};

use super::{models::classify_change, store::CouchSessionStore};

/// Turn the changes feed into a stream of notifications for `table`, starting
/// after sequence `since`.
///
/// The stream ends with an error as soon as one poll fails; the caller is
/// expected to resubscribe and resynchronise.
pub fn feed(
    store: CouchSessionStore,
    table: Table,
    since: Value,
) -> impl Stream<Item = StorageResult<ChangeEvent>> + Send + 'static {
    try_stream! {
        let mut since = since;
        loop {
            let response = store
                .changes_since(&since)
                .await
                .map_err(StorageError::from)?;
            trace!(count = response.results.len(), "changes feed poll returned");
            since = response.last_seq;

            for row in response.results {
                if let Some(event) = classify_change(row).map_err(StorageError::from)? {
                    if event.table() == table {
                        yield event;
                    }
                }
            }
        }
    }
}
