//! Error taxonomy shared by the registry, the store and the wire layer.

use thiserror::Error;

/// Failures of the durable store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("store document is corrupt: {0}")]
    Json(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Outcome of a rejected room or practice operation
#[derive(Debug, Error)]
pub enum RoomError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    PermissionDenied(String),

    #[error("{0}")]
    InvalidState(String),

    #[error("room is full")]
    Full,

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl RoomError {
    /// Wire code for the `ERROR|CODE|message` reply
    pub fn code(&self) -> &'static str {
        match self {
            RoomError::NotFound(_) => "NOT_FOUND",
            RoomError::PermissionDenied(_) => "PERMISSION_DENIED",
            RoomError::InvalidState(_) => "INVALID_STATE",
            RoomError::Full => "FULL",
            RoomError::Conflict(_) => "CONFLICT",
            RoomError::InvalidInput(_) => "INVALID_INPUT",
            RoomError::Storage(_) => "STORAGE",
        }
    }

    /// Message safe to send to a client; storage details stay in the logs
    pub fn client_message(&self) -> String {
        match self {
            RoomError::Storage(_) => "storage failure".to_string(),
            other => other.to_string(),
        }
    }
}

pub type RoomResult<T> = Result<T, RoomError>;
