use thiserror::Error;
use tokio::task::JoinError;

use crate::{CatalogDigest, MountPoint};

/// Errors surfaced by the engine and by object fetchers.
#[derive(Debug, Error, PartialEq)]
pub enum Error {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("catalog {digest} not found at '{mountpoint}'")]
    MissingCatalog {
        digest: CatalogDigest,
        mountpoint: MountPoint,
    },

    #[error("internal storage error: {0}")]
    StorageError(String),
}

impl From<crate::digests::Error> for Error {
    fn from(e: crate::digests::Error) -> Self {
        Error::InvalidRequest(e.to_string())
    }
}

impl From<crate::mountpoint::MountPointError> for Error {
    fn from(e: crate::mountpoint::MountPointError) -> Self {
        Error::InvalidRequest(e.to_string())
    }
}

impl From<JoinError> for Error {
    fn from(value: JoinError) -> Self {
        Error::StorageError(value.to_string())
    }
}
