//! Error kinds surfaced by the catalog store and the sync engine.

use thiserror::Error;

pub type CatalogResult<T> = std::result::Result<T, CatalogError>;

#[derive(Debug, Error)]
pub enum CatalogError {
    /// The database could not be opened or brought up to date. Nothing can
    /// proceed until the store is reopened successfully.
    #[error("Store unavailable: {0:#}")]
    StoreUnavailable(anyhow::Error),

    #[error("A record with id {0} already exists")]
    DuplicateKey(String),

    /// Malformed import payload. The import is aborted before touching the store.
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Unknown index: {0}")]
    UnknownIndex(String),

    #[error("Storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for CatalogError {
    fn from(err: rusqlite::Error) -> Self {
        CatalogError::Storage(err.into())
    }
}

impl From<tokio::task::JoinError> for CatalogError {
    fn from(err: tokio::task::JoinError) -> Self {
        CatalogError::Storage(anyhow::anyhow!("Storage task failed: {}", err))
    }
}
