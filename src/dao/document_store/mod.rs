/// CouchDB backend.
#[cfg(feature = "couch-store")]
pub mod couchdb;
pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use futures::{future::BoxFuture, stream::BoxStream};

use crate::dao::{
    models::{LeagueDocument, TeamEntity},
    storage::StorageResult,
};

/// Change notification for the watched document: `Some` carries the full
/// content after the change, `None` means the document no longer exists.
pub type DocumentChange = StorageResult<Option<LeagueDocument>>;

/// Abstraction over the single shared document holding the league.
///
/// Every method addresses one named document. Dropping the stream returned by
/// [`DocumentStore::subscribe`] releases the subscription.
pub trait DocumentStore: Send + Sync {
    /// Read the document, `None` when it does not exist.
    fn fetch(&self, key: &str) -> BoxFuture<'static, StorageResult<Option<LeagueDocument>>>;
    /// Create the document, overwriting any existing content.
    fn create(&self, key: &str, document: LeagueDocument) -> BoxFuture<'static, StorageResult<()>>;
    /// Replace the `teams` field of an existing document.
    fn update_teams(
        &self,
        key: &str,
        teams: Vec<TeamEntity>,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Watch the document. The first item is its current content, then one
    /// item follows every later change.
    fn subscribe(&self, key: &str) -> BoxStream<'static, DocumentChange>;
    /// Cheap round trip proving the backend answers.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Re-establish the connection after a failed health check.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
