//! In-process document store. Clones share the same documents, so several
//! sync controllers pointed at one instance behave like separate clients of a
//! remote store.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};

use futures::{StreamExt, future::BoxFuture, stream::BoxStream};
use thiserror::Error;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use super::{DocumentChange, DocumentStore};
use crate::dao::{
    models::{LeagueDocument, TeamEntity},
    storage::{StorageError, StorageResult},
};

/// Failures simulated by the in-memory store.
#[derive(Debug, Error)]
pub enum MemoryStoreError {
    /// The store was switched offline.
    #[error("in-memory store is offline")]
    Offline,
}

impl From<MemoryStoreError> for StorageError {
    fn from(err: MemoryStoreError) -> Self {
        StorageError::unavailable(err.to_string(), err)
    }
}

type Slot = watch::Sender<Option<LeagueDocument>>;

/// Documents held in process memory.
#[derive(Clone, Default)]
pub struct MemoryDocumentStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    documents: Mutex<HashMap<String, Slot>>,
    offline: AtomicBool,
}

impl MemoryDocumentStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail (`true`) or succeed again (`false`).
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    /// Remove a document and notify subscribers that it is gone.
    pub fn delete(&self, key: &str) {
        self.with_slot(key, |slot| {
            slot.send_replace(None);
        });
    }

    /// Current content of a document, bypassing the offline switch.
    pub fn peek(&self, key: &str) -> Option<LeagueDocument> {
        self.with_slot(key, |slot| slot.borrow().clone())
    }

    fn ensure_online(&self) -> Result<(), MemoryStoreError> {
        if self.inner.offline.load(Ordering::SeqCst) {
            Err(MemoryStoreError::Offline)
        } else {
            Ok(())
        }
    }

    fn with_slot<T>(&self, key: &str, f: impl FnOnce(&Slot) -> T) -> T {
        let mut documents = self
            .inner
            .documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let slot = documents
            .entry(key.to_owned())
            .or_insert_with(|| watch::channel(None).0);
        f(slot)
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn fetch(&self, key: &str) -> BoxFuture<'static, StorageResult<Option<LeagueDocument>>> {
        let result = self
            .ensure_online()
            .map(|_| self.peek(key))
            .map_err(Into::into);
        Box::pin(async move { result })
    }

    fn create(&self, key: &str, document: LeagueDocument) -> BoxFuture<'static, StorageResult<()>> {
        let result = self.ensure_online().map(|_| {
            self.with_slot(key, |slot| {
                slot.send_replace(Some(document));
            })
        });
        Box::pin(async move { result.map_err(Into::into) })
    }

    fn update_teams(
        &self,
        key: &str,
        teams: Vec<TeamEntity>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let result = match self.ensure_online() {
            Err(err) => Err(err.into()),
            Ok(()) => self.with_slot(key, |slot| {
                let mut teams = Some(teams);
                let updated = slot.send_if_modified(|current| match current {
                    Some(document) => {
                        document.teams = teams.take().unwrap_or_default();
                        true
                    }
                    None => false,
                });
                if updated {
                    Ok(())
                } else {
                    Err(StorageError::missing_document(key))
                }
            }),
        };
        Box::pin(async move { result })
    }

    fn subscribe(&self, key: &str) -> BoxStream<'static, DocumentChange> {
        if let Err(err) = self.ensure_online() {
            return futures::stream::once(async move { Err(err.into()) }).boxed();
        }

        let receiver = self.with_slot(key, |slot| slot.subscribe());
        WatchStream::new(receiver).map(Ok).boxed()
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let result = self.ensure_online().map_err(Into::into);
        Box::pin(async move { result })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.health_check()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::league::tests::league;

    fn document() -> LeagueDocument {
        LeagueDocument::from(&league())
    }

    #[tokio::test]
    async fn create_then_fetch() {
        let store = MemoryDocumentStore::new();
        assert_eq!(store.fetch("league").await.unwrap(), None);

        store.create("league", document()).await.unwrap();
        assert_eq!(store.fetch("league").await.unwrap(), Some(document()));
    }

    #[tokio::test]
    async fn update_requires_existing_document() {
        let store = MemoryDocumentStore::new();
        let err = store
            .update_teams("league", document().teams)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::MissingDocument { .. }));
    }

    #[tokio::test]
    async fn subscribers_see_updates_and_deletes() {
        let store = MemoryDocumentStore::new();
        store.create("league", document()).await.unwrap();
        let mut changes = store.subscribe("league");
        let current = changes.next().await.unwrap().unwrap();
        assert_eq!(current, Some(document()));

        let mut teams = document().teams;
        teams[0].adjustments = 3;
        store.update_teams("league", teams).await.unwrap();
        let change = changes.next().await.unwrap().unwrap().unwrap();
        assert_eq!(change.teams[0].adjustments, 3);

        store.delete("league");
        assert_eq!(changes.next().await.unwrap().unwrap(), None);
    }

    #[tokio::test]
    async fn offline_store_fails_every_call() {
        let store = MemoryDocumentStore::new();
        store.set_offline(true);

        assert!(store.fetch("league").await.is_err());
        assert!(store.create("league", document()).await.is_err());
        assert!(store.health_check().await.is_err());
        assert!(store.subscribe("league").next().await.unwrap().is_err());

        store.set_offline(false);
        assert!(store.try_reconnect().await.is_ok());
    }
}
