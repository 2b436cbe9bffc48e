use std::sync::Arc;

use futures::{StreamExt, future::BoxFuture, stream::BoxStream};
use mongodb::{
    Collection, Database,
    bson::doc,
    change_stream::{
        ChangeStream,
        event::{ChangeStreamEvent, OperationType},
    },
    options::FullDocumentType,
};
use tokio::sync::RwLock;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::MongoLeagueDocument,
};
use crate::dao::{
    document_store::{DocumentChange, DocumentStore},
    models::{LeagueDocument, TeamEntity},
    storage::{StorageError, StorageResult},
};

const COLLECTION_NAME: &str = "fantasyGolf";

type LeagueChangeStream = ChangeStream<ChangeStreamEvent<MongoLeagueDocument>>;

/// League document stored in a MongoDB collection.
#[derive(Clone)]
pub struct MongoDocumentStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    database: RwLock<Database>,
    config: MongoConfig,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = self.database.read().await.clone();
        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (_client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        *self.database.write().await = database;
        Ok(())
    }
}

impl MongoDocumentStore {
    /// Connect to MongoDB, retrying the initial ping.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (_client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        Ok(Self {
            inner: Arc::new(MongoInner {
                database: RwLock::new(database),
                config,
            }),
        })
    }

    async fn collection(&self) -> Collection<MongoLeagueDocument> {
        let database = self.inner.database.read().await;
        database.collection::<MongoLeagueDocument>(COLLECTION_NAME)
    }

    async fn find(&self, key: &str) -> MongoResult<Option<LeagueDocument>> {
        let found = self
            .collection()
            .await
            .find_one(doc! { "_id": key })
            .await
            .map_err(|source| MongoDaoError::LoadDocument {
                key: key.to_owned(),
                source,
            })?;
        Ok(found.map(Into::into))
    }

    async fn replace(&self, key: &str, document: LeagueDocument, upsert: bool) -> StorageResult<()> {
        let document = MongoLeagueDocument::new(key, document);
        let result = self
            .collection()
            .await
            .replace_one(doc! { "_id": key }, &document)
            .upsert(upsert)
            .await
            .map_err(|source| MongoDaoError::SaveDocument {
                key: key.to_owned(),
                source,
            })?;

        if !upsert && result.matched_count == 0 {
            return Err(StorageError::missing_document(key));
        }
        Ok(())
    }

    async fn open_change_stream(&self, key: &str) -> MongoResult<LeagueChangeStream> {
        self.collection()
            .await
            .watch()
            .pipeline([doc! { "$match": { "documentKey._id": key } }])
            .full_document(FullDocumentType::UpdateLookup)
            .await
            .map_err(|source| MongoDaoError::OpenChangeStream {
                key: key.to_owned(),
                source,
            })
    }
}

/// Translate one change-stream event into a document notification.
fn to_change(
    key: &str,
    event: mongodb::error::Result<ChangeStreamEvent<MongoLeagueDocument>>,
) -> Option<DocumentChange> {
    let event = match event {
        Ok(event) => event,
        Err(source) => {
            return Some(Err(MongoDaoError::ChangeStream {
                key: key.to_owned(),
                source,
            }
            .into()));
        }
    };

    match event.operation_type {
        OperationType::Insert | OperationType::Update | OperationType::Replace => {
            // An update whose lookup raced a delete carries no document.
            Some(Ok(event.full_document.map(Into::into)))
        }
        OperationType::Delete | OperationType::Drop | OperationType::DropDatabase => Some(Ok(None)),
        _ => None,
    }
}

fn failed_subscription(err: MongoDaoError) -> BoxStream<'static, DocumentChange> {
    futures::stream::once(futures::future::ready(Err(err.into()))).boxed()
}

impl DocumentStore for MongoDocumentStore {
    fn fetch(&self, key: &str) -> BoxFuture<'static, StorageResult<Option<LeagueDocument>>> {
        let store = self.clone();
        let key = key.to_owned();
        Box::pin(async move { store.find(&key).await.map_err(Into::into) })
    }

    fn create(&self, key: &str, document: LeagueDocument) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        let key = key.to_owned();
        Box::pin(async move { store.replace(&key, document, true).await })
    }

    fn update_teams(
        &self,
        key: &str,
        teams: Vec<TeamEntity>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        let key = key.to_owned();
        Box::pin(async move {
            store
                .replace(&key, LeagueDocument { teams }, false)
                .await
        })
    }

    fn subscribe(&self, key: &str) -> BoxStream<'static, DocumentChange> {
        let store = self.clone();
        let key = key.to_owned();
        futures::stream::once(async move {
            let changes = match store.open_change_stream(&key).await {
                Ok(changes) => changes,
                Err(err) => return failed_subscription(err),
            };
            // Read the document only once the change stream is open.
            let current = match store.find(&key).await {
                Ok(current) => current,
                Err(err) => return failed_subscription(err),
            };
            futures::stream::once(futures::future::ready(Ok(current)))
                .chain(changes.filter_map(move |event| {
                    futures::future::ready(to_change(&key, event))
                }))
                .boxed()
        })
        .flatten()
        .boxed()
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.reconnect().await.map_err(Into::into) })
    }
}
