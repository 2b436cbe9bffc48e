/// Shared league document storage and change subscriptions.
pub mod document_store;
/// Database model definitions.
pub mod models;
/// Storage abstraction layer for database operations.
pub mod storage;
