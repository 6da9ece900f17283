//! Error types for the subscriber state core

use thiserror::Error;

/// Result type alias for subscriber operations
pub type Result<T> = std::result::Result<T, SubscriberError>;

/// Main error type for subscriber operations
#[derive(Error, Debug)]
pub enum SubscriberError {
    /// No AoR document (or no HSS registration) for this identity
    #[error("Subscriber not found: {0}")]
    NotFound(String),

    /// The request cannot be acted on as supplied
    #[error("Invalid request: {0}")]
    InvalidInput(String),

    /// The backing store failed or timed out
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Data contention persisted through every retry of the write cycle
    #[error("Version conflict after {0} attempts")]
    VersionConflict(usize),

    /// The HSS has no record of this public identity
    #[error("Unknown to HSS: {0}")]
    HssNotFound(String),

    /// The HSS failed or timed out
    #[error("HSS unavailable: {0}")]
    HssUnavailable(String),

    /// A NOTIFY could not be constructed
    #[error("NOTIFY build failed: {0}")]
    NotifyBuildFailed(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SubscriberError {
    /// HTTP-style status code reported back to the SIP layer.
    pub fn status_code(&self) -> u16 {
        match self {
            SubscriberError::NotFound(_) => 404,
            SubscriberError::InvalidInput(_) => 400,
            SubscriberError::StoreUnavailable(_) => 500,
            SubscriberError::VersionConflict(_) => 503,
            SubscriberError::HssNotFound(_) => 404,
            SubscriberError::HssUnavailable(_) => 502,
            SubscriberError::NotifyBuildFailed(_) => 500,
            SubscriberError::Internal(_) => 500,
        }
    }
}

impl From<serde_json::Error> for SubscriberError {
    fn from(err: serde_json::Error) -> Self {
        SubscriberError::Internal(format!("JSON error: {}", err))
    }
}

impl From<quick_xml::Error> for SubscriberError {
    fn from(err: quick_xml::Error) -> Self {
        SubscriberError::NotifyBuildFailed(err.to_string())
    }
}
