use thiserror::Error;

/// Failure talking to an upstream API or command.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Non-retryable HTTP status.
    #[error("Upstream error (status {status}): {body}")]
    Upstream { status: u16, body: String },

    /// Rate limits, 5xx or timeouts that outlasted the retry budget.
    #[error("Transient upstream failure after {attempts} attempts: {reason}")]
    Transient { attempts: u32, reason: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Command failed: {0}")]
    Command(String),

    /// The client itself cannot work (binary missing, credentials rejected).
    #[error("Upstream client unavailable: {0}")]
    Unavailable(String),
}

impl FetchError {
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Errors that make every further call with the same client pointless.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FetchError::Unavailable(_) | FetchError::Upstream { status: 401, .. }
        )
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            FetchError::Decode(err.to_string())
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::Decode(err.to_string())
    }
}

/// Fatal configuration problems. These abort the run before any phase starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(String),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },

    #[error("Failed to load rosters from {path}: {reason}")]
    Rosters { path: String, reason: String },
}
