use std::{collections::HashMap, sync::Arc, time::Duration};

use futures::{StreamExt, future::BoxFuture};
use reqwest::{Client, Method, StatusCode, Url};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Value, from_value};
use tracing::{debug, warn};

use crate::dao::{
    models::{PlacementDraft, PlacementEntity, SessionEntity, SessionPatch, Table},
    session_store::{SessionStore, Subscription},
    storage::StorageResult,
};

use super::{
    changes,
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{
        AllDocsResponse, BulkDocsRequest, BulkDocsResult, ChangesResponse, CouchPlacementDocument,
        CouchSessionDocument, DatabaseInfo, END_SUFFIX, PLACEMENT_PREFIX, placement_doc_id,
        session_doc_id,
    },
};

const MAX_WRITE_ATTEMPTS: u32 = 3;

/// CouchDB-backed session store.
#[derive(Clone)]
pub struct CouchSessionStore {
    client: Client,
    base_url: Url,
    database: Arc<str>,
    auth: Option<(Arc<str>, Arc<str>)>,
    poll_timeout: Duration,
}

impl CouchSessionStore {
    /// Build the HTTP client without touching the network.
    ///
    /// The database and the session document are provisioned by
    /// [`SessionStore::try_reconnect`].
    pub fn new(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let base_url = Url::parse(config.base_url.trim_end_matches('/'))
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| CouchDaoError::InvalidBaseUrl {
                url: config.base_url.clone(),
            })?;
        let database = Arc::<str>::from(config.database);
        let auth = config
            .username
            .zip(config.password)
            .map(|(u, p)| (Arc::<str>::from(u), Arc::<str>::from(p)));

        Ok(Self {
            client,
            base_url,
            database,
            auth,
            poll_timeout: config.poll_timeout,
        })
    }

    fn url(&self, segments: &[&str]) -> CouchResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| CouchDaoError::InvalidBaseUrl {
                url: self.base_url.to_string(),
            })?
            .pop_if_empty()
            .push(&self.database)
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> CouchResult<reqwest::RequestBuilder> {
        let builder = self.client.request(method, self.url(segments)?);
        Ok(if let Some((ref user, ref pass)) = self.auth {
            builder.basic_auth(user.as_ref(), Some(pass.as_ref()))
        } else {
            builder
        })
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let database = self.database.to_string();
        let response = self
            .request(Method::GET, &[])?
            .send()
            .await
            .map_err(|source| CouchDaoError::DatabaseQuery {
                database: database.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                let create = self
                    .request(Method::PUT, &[])?
                    .send()
                    .await
                    .map_err(|source| CouchDaoError::DatabaseCreate {
                        database: database.clone(),
                        source,
                    })?;
                // 412 means another client created it first.
                if create.status().is_success() || create.status() == StatusCode::PRECONDITION_FAILED
                {
                    Ok(())
                } else {
                    Err(CouchDaoError::DatabaseStatus {
                        database,
                        status: create.status(),
                    })
                }
            }
            other => Err(CouchDaoError::DatabaseStatus {
                database,
                status: other,
            }),
        }
    }

    async fn ensure_session_document(&self) -> CouchResult<()> {
        let doc_id = session_doc_id();
        if self
            .get_document::<CouchSessionDocument>(&doc_id)
            .await?
            .is_some()
        {
            return Ok(());
        }

        match self
            .put_document(&doc_id, &CouchSessionDocument::new(false))
            .await
        {
            Ok(()) => {
                debug!(doc_id = %doc_id, "provisioned session document");
                Ok(())
            }
            Err(err) if is_conflict(&err) => Ok(()),
            Err(err) => Err(err),
        }
    }

    async fn get_document<T>(&self, doc_id: &str) -> CouchResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::GET, &[doc_id])?
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                response.json::<T>().await.map(Some).map_err(|source| {
                    CouchDaoError::DecodeResponse {
                        path: doc_id.to_string(),
                        source,
                    }
                })
            }
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    async fn put_document<T>(&self, doc_id: &str, document: &T) -> CouchResult<()>
    where
        T: ?Sized + Serialize,
    {
        let response = self
            .request(Method::PUT, &[doc_id])?
            .json(document)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: response.status(),
            })
        }
    }

    async fn list_documents<T>(&self, prefix: &str) -> CouchResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        const ALL_DOCS: &str = "_all_docs";
        let query = [
            ("include_docs", "true".to_string()),
            ("startkey", format!("\"{}\"", prefix)),
            ("endkey", format!("\"{}{}\"", prefix, END_SUFFIX)),
        ];

        let response = self
            .request(Method::GET, &[ALL_DOCS])?
            .query(&query)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: ALL_DOCS.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(CouchDaoError::RequestStatus {
                path: ALL_DOCS.to_string(),
                status: response.status(),
            });
        }

        let payload = response.json::<AllDocsResponse>().await.map_err(|source| {
            CouchDaoError::DecodeResponse {
                path: ALL_DOCS.to_string(),
                source,
            }
        })?;

        let mut documents = Vec::new();
        for row in payload.rows {
            if let Some(doc) = row.doc {
                let parsed = from_value(doc).map_err(|source| CouchDaoError::DeserializeValue {
                    path: row.id.clone(),
                    source,
                })?;
                documents.push(parsed);
            }
        }

        Ok(documents)
    }

    async fn bulk_write<T>(&self, docs: Vec<T>) -> CouchResult<Vec<BulkDocsResult>>
    where
        T: Serialize,
    {
        const BULK_DOCS: &str = "_bulk_docs";
        let response = self
            .request(Method::POST, &[BULK_DOCS])?
            .json(&BulkDocsRequest { docs })
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: BULK_DOCS.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(CouchDaoError::RequestStatus {
                path: BULK_DOCS.to_string(),
                status: response.status(),
            });
        }

        response
            .json::<Vec<BulkDocsResult>>()
            .await
            .map_err(|source| CouchDaoError::DecodeResponse {
                path: BULK_DOCS.to_string(),
                source,
            })
    }

    async fn current_sequence(&self) -> CouchResult<Value> {
        let database = self.database.to_string();
        let response = self
            .request(Method::GET, &[])?
            .send()
            .await
            .map_err(|source| CouchDaoError::DatabaseQuery {
                database: database.clone(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(CouchDaoError::DatabaseStatus {
                database,
                status: response.status(),
            });
        }

        let info = response
            .json::<DatabaseInfo>()
            .await
            .map_err(|source| CouchDaoError::DecodeResponse {
                path: database,
                source,
            })?;
        Ok(info.update_seq)
    }

    /// Long-poll the changes feed for everything committed after `since`.
    pub(super) async fn changes_since(&self, since: &Value) -> CouchResult<ChangesResponse> {
        const CHANGES: &str = "_changes";
        let since = match since {
            Value::String(seq) => seq.clone(),
            other => other.to_string(),
        };
        let query = [
            ("feed", "longpoll".to_string()),
            ("include_docs", "true".to_string()),
            ("since", since),
            ("timeout", self.poll_timeout.as_millis().to_string()),
        ];

        let response = self
            .request(Method::GET, &[CHANGES])?
            .query(&query)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: CHANGES.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(CouchDaoError::RequestStatus {
                path: CHANGES.to_string(),
                status: response.status(),
            });
        }

        response
            .json::<ChangesResponse>()
            .await
            .map_err(|source| CouchDaoError::DecodeResponse {
                path: CHANGES.to_string(),
                source,
            })
    }
}

fn is_conflict(err: &CouchDaoError) -> bool {
    matches!(err, CouchDaoError::RequestStatus { status, .. } if *status == StatusCode::CONFLICT)
}

impl SessionStore for CouchSessionStore {
    fn fetch_placements(&self) -> BoxFuture<'static, StorageResult<Vec<PlacementEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let docs = store
                .list_documents::<CouchPlacementDocument>(PLACEMENT_PREFIX)
                .await?;
            Ok(docs.into_iter().map(Into::into).collect())
        })
    }

    fn fetch_session(&self) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let doc = store
                .get_document::<CouchSessionDocument>(&session_doc_id())
                .await?;
            Ok(doc.map(Into::into))
        })
    }

    fn upsert_placement(
        &self,
        draft: PlacementDraft,
    ) -> BoxFuture<'static, StorageResult<PlacementEntity>> {
        let store = self.clone();
        Box::pin(async move {
            let doc_id = placement_doc_id(&draft.name);
            for attempt in 1..=MAX_WRITE_ATTEMPTS {
                let doc = match store
                    .get_document::<CouchPlacementDocument>(&doc_id)
                    .await?
                {
                    Some(existing) => existing.overwrite(draft.x, draft.y),
                    None => CouchPlacementDocument::create(draft.name.clone(), draft.x, draft.y),
                };

                match store.put_document(&doc_id, &doc).await {
                    Ok(()) => return Ok(doc.into()),
                    Err(err) if is_conflict(&err) => {
                        debug!(doc_id = %doc_id, attempt, "placement write conflicted; retrying");
                    }
                    Err(err) => return Err(err.into()),
                }
            }

            Err(CouchDaoError::Conflict {
                doc_id,
                attempts: MAX_WRITE_ATTEMPTS,
            }
            .into())
        })
    }

    fn update_session(
        &self,
        patch: SessionPatch,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let doc_id = session_doc_id();
            for attempt in 1..=MAX_WRITE_ATTEMPTS {
                let Some(mut doc) = store
                    .get_document::<CouchSessionDocument>(&doc_id)
                    .await?
                else {
                    debug!(doc_id = %doc_id, "session document missing; update matched nothing");
                    return Ok(None);
                };
                doc.session.revealed = patch.revealed;

                match store.put_document(&doc_id, &doc).await {
                    Ok(()) => return Ok(Some(doc.into())),
                    Err(err) if is_conflict(&err) => {
                        debug!(doc_id = %doc_id, attempt, "session write conflicted; retrying");
                    }
                    Err(err) => return Err(err.into()),
                }
            }

            Err(CouchDaoError::Conflict {
                doc_id,
                attempts: MAX_WRITE_ATTEMPTS,
            }
            .into())
        })
    }

    fn delete_all_placements(&self) -> BoxFuture<'static, StorageResult<Vec<PlacementEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let docs = store
                .list_documents::<CouchPlacementDocument>(PLACEMENT_PREFIX)
                .await?;
            if docs.is_empty() {
                return Ok(Vec::new());
            }

            let tombstones: Vec<CouchPlacementDocument> =
                docs.into_iter().map(|doc| doc.into_tombstone()).collect();
            let mut by_id: HashMap<String, CouchPlacementDocument> = tombstones
                .iter()
                .cloned()
                .map(|doc| (doc.id.clone(), doc))
                .collect();

            let results = store.bulk_write(tombstones).await?;
            let mut removed = Vec::with_capacity(results.len());
            for result in results {
                if result.ok {
                    if let Some(doc) = by_id.remove(&result.id) {
                        removed.push(doc.into());
                    }
                } else {
                    // A concurrent resubmission won the race; that row survives the reset.
                    warn!(
                        doc_id = %result.id,
                        error = result.error.as_deref().unwrap_or("unknown"),
                        "placement survived delete-all"
                    );
                }
            }
            Ok(removed)
        })
    }

    fn subscribe(&self, table: Table) -> BoxFuture<'static, StorageResult<Subscription>> {
        let store = self.clone();
        Box::pin(async move {
            let since = store.current_sequence().await?;
            let events = changes::feed(store, table, since).boxed();
            Ok(Subscription::new(table, events, move || {
                debug!(table = ?table, "closed CouchDB changes feed");
            }))
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.current_sequence().await?;
            Ok(())
        })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_database().await?;
            store.ensure_session_document().await?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_urls_escape_participant_names() {
        let store = CouchSessionStore::new(CouchConfig::new("http://couch:5984/", "matrix")).unwrap();
        let url = store.url(&[&placement_doc_id("Ana/Bo?")]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://couch:5984/matrix/placement::Ana%2FBo%3F"
        );
    }

    #[test]
    fn rejects_unusable_base_url() {
        let err = CouchSessionStore::new(CouchConfig::new("mailto:nobody", "matrix"))
            .err()
            .unwrap();
        assert!(matches!(err, CouchDaoError::InvalidBaseUrl { .. }));
    }
}
