use std::io::ErrorKind;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use narrative_common::{truncate_chars, FetchError};

use crate::Result;

/// Thin wrapper around the `bird` CLI, which searches X using the session
/// cookies in `AUTH_TOKEN` / `CT0`.
#[derive(Debug, Clone)]
pub struct BirdCli {
    bin: String,
    count: u32,
    timeout: Duration,
}

impl BirdCli {
    pub fn new(bin: impl Into<String>) -> Self {
        Self {
            bin: bin.into(),
            count: 10,
            timeout: Duration::from_secs(45),
        }
    }

    pub fn with_count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Recent posts authored by `handle`, as the CLI's raw text output.
    pub async fn search_from(&self, handle: &str) -> Result<String> {
        let query = format!("from:{handle}");
        let count = self.count.to_string();
        debug!(handle, bin = self.bin.as_str(), "Running bird search");

        let output = tokio::time::timeout(
            self.timeout,
            Command::new(&self.bin)
                .args(["search", query.as_str(), "--count", count.as_str()])
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| {
            FetchError::Command(format!(
                "{} timed out after {}s for @{handle}",
                self.bin,
                self.timeout.as_secs()
            ))
        })?
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound | ErrorKind::PermissionDenied => {
                FetchError::Unavailable(format!("cannot run {}: {e}", self.bin))
            }
            _ => FetchError::Command(format!("failed to run {}: {e}", self.bin)),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FetchError::Command(format!(
                "{} exited with {}: {}",
                self.bin,
                output.status,
                truncate_chars(stderr.trim(), 200)
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
