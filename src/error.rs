//! Error types for the playback core and its collaborators.

use thiserror::Error;

/// Faults raised inside the playback core.
///
/// None of these escape a tick: the session turns them into a skip.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("no story collection has any item to show")]
    NothingToShow,
    #[error("unusable playback duration of {duration_ms} ms")]
    InvalidDuration { duration_ms: u64 },
}

/// Faults reported by the external story service.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("not authorized to {action} item {item_id}")]
    Unauthorized { action: &'static str, item_id: String },
    #[error("item {0} not found")]
    NotFound(String),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ServiceError {
    /// Rejections the host should show to the user.
    pub fn is_rejection(&self) -> bool {
        matches!(self, ServiceError::Unauthorized { .. } | ServiceError::NotFound(_))
    }
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;
