use narrative_common::FetchError;
use thiserror::Error;

/// Read-path failures. Writes never surface errors; see
/// [`UpsertOutcome`](crate::UpsertOutcome).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store request failed: {0}")]
    Request(#[from] FetchError),

    #[error("Failed to decode store response: {0}")]
    Decode(String),

    #[error("Missing or malformed Content-Range header: {0}")]
    Count(String),
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        StoreError::Request(FetchError::from(err))
    }
}
