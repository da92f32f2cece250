use thiserror::Error;

use super::persistence::PersistenceError;
use crate::document::OperationError;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Operation(#[from] OperationError),

    #[error("Reentrant call to '{operation}' while subscribers are being notified")]
    Reentrant { operation: &'static str },

    #[error("Document is not ready for transmission: {errors} validation error(s)")]
    NotReady { errors: usize },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("Input is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
}
