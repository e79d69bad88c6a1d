//! Dispenser error types with categorical error codes.

use thiserror::Error;

/// Errors raised by the lifecycle store, the mailbox client and local storage.
#[derive(Debug, Error)]
pub enum DispenserError {
    /// Remote mailbox call failed or returned an unexpected shape (DISP001)
    #[error("Mailbox API error: {0}")]
    Api(String),

    /// Expiration policy rejected (DISP002)
    #[error("Invalid expiration policy: {0}")]
    InvalidPolicy(String),

    /// Persisted entries could not be decoded (DISP003)
    #[error("Stored entries are corrupt: {0}")]
    StorageCorrupt(String),

    /// Local storage backend failure (DISP004)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Address already tracked (DISP005)
    #[error("Address already tracked: {0}")]
    DuplicateAddress(String),

    /// Desktop notification could not be shown (DISP006)
    #[error("Notification error: {0}")]
    Notification(String),
}

impl DispenserError {
    /// Returns the categorical error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Api(_) => "DISP001",
            Self::InvalidPolicy(_) => "DISP002",
            Self::StorageCorrupt(_) => "DISP003",
            Self::Storage(_) => "DISP004",
            Self::DuplicateAddress(_) => "DISP005",
            Self::Notification(_) => "DISP006",
        }
    }
}

impl From<rusqlite::Error> for DispenserError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for DispenserError {
    fn from(err: serde_json::Error) -> Self {
        Self::StorageCorrupt(err.to_string())
    }
}

impl From<reqwest::Error> for DispenserError {
    fn from(err: reqwest::Error) -> Self {
        Self::Api(err.to_string())
    }
}

/// Result type alias for dispenser operations.
pub type Result<T> = std::result::Result<T, DispenserError>;
