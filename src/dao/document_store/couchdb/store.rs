use std::sync::Arc;

use futures::{future::BoxFuture, stream::BoxStream};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::dao::{
    document_store::{DocumentChange, DocumentStore},
    models::{LeagueDocument, TeamEntity},
    storage::{StorageError, StorageResult},
};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{ChangesResponse, CouchLeagueDocument, DatabaseInfo, RevisionOnly, sequence_token},
};

const CHANGES_PATH: &str = "_changes";
/// Server-side wait of one long-poll request.
const LONGPOLL_TIMEOUT_MS: u64 = 60_000;
const MAX_WRITE_ATTEMPTS: u32 = 3;

/// League document stored in a CouchDB database.
#[derive(Clone)]
pub struct CouchDocumentStore {
    client: Client,
    base_url: Arc<str>,
    database: Arc<str>,
    auth: Option<(Arc<str>, Arc<str>)>,
}

impl CouchDocumentStore {
    /// Establish a connection to CouchDB and ensure the database exists.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let base_url = Arc::<str>::from(config.base_url.trim_end_matches('/'));
        let database = Arc::<str>::from(config.database);
        let auth = config
            .username
            .zip(config.password)
            .map(|(u, p)| (Arc::<str>::from(u), Arc::<str>::from(p)));

        let store = Self {
            client,
            base_url,
            database,
            auth,
        };

        store.ensure_database().await?;
        Ok(store)
    }

    fn database_url(&self) -> String {
        format!("{}/{}", self.base_url, self.database)
    }

    fn with_auth(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.auth {
            Some((ref user, ref pass)) => builder.basic_auth(user.as_ref(), Some(pass.as_ref())),
            None => builder,
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.database_url(), path);
        self.with_auth(self.client.request(method, url))
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let database = self.database.to_string();
        let url = self.database_url();

        let response = self
            .with_auth(self.client.get(&url))
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
                    .with_auth(self.client.put(&url))
                    .send()
                    .await
                    .map_err(|source| CouchDaoError::DatabaseCreate {
                        database: database.clone(),
                        source,
                    })?;
                // 412: another client created it first.
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

    async fn get_document<T>(&self, doc_id: &str) -> CouchResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::GET, doc_id)
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

    /// PUT a document. Returns `false` when CouchDB reports a revision conflict.
    async fn put_document<T>(&self, doc_id: &str, document: &T) -> CouchResult<bool>
    where
        T: ?Sized + Serialize,
    {
        let response = self
            .request(Method::PUT, doc_id)
            .json(document)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::CONFLICT => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status,
            }),
        }
    }

    async fn overwrite(&self, doc_id: &str, league: LeagueDocument) -> StorageResult<()> {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let rev = self
                .get_document::<RevisionOnly>(doc_id)
                .await?
                .map(|current| current.rev);
            let document = CouchLeagueDocument::new(doc_id, rev, league.clone());
            if self.put_document(doc_id, &document).await? {
                return Ok(());
            }
            debug!(doc_id, attempt, "CouchDB revision conflict on create, retrying");
        }

        Err(CouchDaoError::Conflict {
            path: doc_id.to_string(),
            attempts: MAX_WRITE_ATTEMPTS,
        }
        .into())
    }

    /// Swap the `teams` field, keeping whatever else the document holds.
    async fn replace_teams(&self, doc_id: &str, teams: Vec<TeamEntity>) -> StorageResult<()> {
        let teams = serde_json::to_value(teams).map_err(|source| CouchDaoError::EncodeValue {
            path: doc_id.to_string(),
            source,
        })?;
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let Some(mut current) = self.get_document::<Value>(doc_id).await? else {
                return Err(StorageError::missing_document(doc_id));
            };
            if let Some(fields) = current.as_object_mut() {
                fields.insert("teams".to_owned(), teams.clone());
            }
            if self.put_document(doc_id, &current).await? {
                return Ok(());
            }
            debug!(doc_id, attempt, "CouchDB revision conflict on update, retrying");
        }

        Err(CouchDaoError::Conflict {
            path: doc_id.to_string(),
            attempts: MAX_WRITE_ATTEMPTS,
        }
        .into())
    }

    /// Latest update sequence of the database.
    async fn current_sequence(&self) -> CouchResult<String> {
        let url = self.database_url();
        let response = self
            .with_auth(self.client.get(&url))
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: url.clone(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(CouchDaoError::RequestStatus {
                path: url,
                status: response.status(),
            });
        }

        let info = response
            .json::<DatabaseInfo>()
            .await
            .map_err(|source| CouchDaoError::DecodeResponse { path: url, source })?;
        Ok(sequence_token(&info.update_seq))
    }

    async fn poll_changes(&self, doc_id: &str, since: &str) -> CouchResult<ChangesResponse> {
        let doc_ids = json!([doc_id]).to_string();
        let timeout = LONGPOLL_TIMEOUT_MS.to_string();
        let query = [
            ("feed", "longpoll"),
            ("include_docs", "true"),
            ("filter", "_doc_ids"),
            ("doc_ids", doc_ids.as_str()),
            ("since", since),
            ("timeout", timeout.as_str()),
        ];

        let response = self
            .request(Method::GET, CHANGES_PATH)
            .query(&query)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: CHANGES_PATH.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(CouchDaoError::RequestStatus {
                path: CHANGES_PATH.to_string(),
                status: response.status(),
            });
        }

        response
            .json::<ChangesResponse>()
            .await
            .map_err(|source| CouchDaoError::DecodeResponse {
                path: CHANGES_PATH.to_string(),
                source,
            })
    }
}

fn decode_league(doc_id: &str, doc: Value) -> Option<LeagueDocument> {
    match serde_json::from_value::<CouchLeagueDocument>(doc) {
        Ok(doc) => Some(doc.league),
        Err(err) => {
            warn!(doc_id, error = %err, "skipping undecodable CouchDB document");
            None
        }
    }
}

impl DocumentStore for CouchDocumentStore {
    fn fetch(&self, key: &str) -> BoxFuture<'static, StorageResult<Option<LeagueDocument>>> {
        let store = self.clone();
        let doc_id = key.to_owned();
        Box::pin(async move {
            let maybe_doc = store
                .get_document::<CouchLeagueDocument>(&doc_id)
                .await?;
            Ok(maybe_doc.map(|doc| doc.league))
        })
    }

    fn create(&self, key: &str, document: LeagueDocument) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        let doc_id = key.to_owned();
        Box::pin(async move { store.overwrite(&doc_id, document).await })
    }

    fn update_teams(
        &self,
        key: &str,
        teams: Vec<TeamEntity>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        let doc_id = key.to_owned();
        Box::pin(async move { store.replace_teams(&doc_id, teams).await })
    }

    fn subscribe(&self, key: &str) -> BoxStream<'static, DocumentChange> {
        let store = self.clone();
        let doc_id = key.to_owned();
        Box::pin(async_stream::stream! {
            // The sequence is taken before the read so no change falls in between.
            let opened = match store.current_sequence().await {
                Ok(since) => store
                    .get_document::<Value>(&doc_id)
                    .await
                    .map(|current| (since, current)),
                Err(err) => Err(err),
            };
            let mut since = match opened {
                Ok((since, current)) => {
                    match current {
                        None => yield Ok(None),
                        Some(doc) => {
                            if let Some(league) = decode_league(&doc_id, doc) {
                                yield Ok(Some(league));
                            }
                        }
                    }
                    Some(since)
                }
                Err(err) => {
                    yield Err(err.into());
                    None
                }
            };

            while let Some(cursor) = since.take() {
                let changes = match store.poll_changes(&doc_id, &cursor).await {
                    Ok(changes) => changes,
                    Err(err) => {
                        yield Err(err.into());
                        break;
                    }
                };
                since = Some(sequence_token(&changes.last_seq));

                for row in changes.results.into_iter().filter(|row| row.id == doc_id) {
                    if row.deleted {
                        yield Ok(None);
                        continue;
                    }
                    let Some(doc) = row.doc else {
                        continue;
                    };
                    if let Some(league) = decode_league(&doc_id, doc) {
                        yield Ok(Some(league));
                    }
                }
            }
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let url = store.database_url();
            let response = store
                .with_auth(store.client.get(&url))
                .send()
                .await
                .map_err(|source| CouchDaoError::RequestSend {
                    path: url.clone(),
                    source,
                })?;

            if response.status().is_success() {
                Ok(())
            } else {
                Err(CouchDaoError::RequestStatus {
                    path: url,
                    status: response.status(),
                }
                .into())
            }
        })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_database().await.map_err(Into::into) })
    }
}
