//! Shared retry policy for every outbound HTTP call: bounded by a timeout,
//! retried on 429/5xx/transport failures with linear backoff.

use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode};
use tracing::warn;

use crate::error::FetchError;
use crate::util::truncate_chars;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Backoff before attempt `n + 1` is `base_delay * n`.
    pub base_delay: Duration,
    /// Per-attempt timeout.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            timeout: Duration::from_secs(15),
        }
    }
}

impl RetryPolicy {
    /// Same attempt budget, no waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            ..Self::default()
        }
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }

    /// A reqwest client whose requests carry this policy's timeout.
    pub fn http_client(&self, user_agent: &str) -> Result<reqwest::Client, FetchError> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(user_agent)
            .build()
            .map_err(FetchError::from)
    }
}

pub fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_transient(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

/// Send the request built by `build`, retrying transient failures.
///
/// Returns the first 2xx response. A non-retryable status fails immediately
/// with [`FetchError::Upstream`]; an exhausted budget fails with
/// [`FetchError::Transient`].
pub async fn send_with_retry<F>(
    policy: &RetryPolicy,
    label: &str,
    build: F,
) -> Result<Response, FetchError>
where
    F: Fn() -> RequestBuilder,
{
    let attempts = policy.max_attempts.max(1);
    let mut last_reason = String::new();

    for attempt in 1..=attempts {
        let reason = match tokio::time::timeout(policy.timeout, build().send()).await {
            Ok(Ok(resp)) => {
                let status = resp.status();
                if status.is_success() {
                    return Ok(resp);
                }
                let body = resp.text().await.unwrap_or_default();
                if !is_retryable(status) {
                    return Err(FetchError::Upstream {
                        status: status.as_u16(),
                        body,
                    });
                }
                format!("status {}: {}", status.as_u16(), truncate_chars(&body, 200))
            }
            Ok(Err(e)) if is_transient(&e) => e.to_string(),
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => format!("timed out after {}ms", policy.timeout.as_millis()),
        };

        if attempt < attempts {
            let backoff = policy.backoff(attempt);
            warn!(
                label,
                attempt,
                backoff_ms = backoff.as_millis() as u64,
                reason = %reason,
                "Transient failure, retrying after backoff"
            );
            tokio::time::sleep(backoff).await;
        }
        last_reason = reason;
    }

    Err(FetchError::Transient {
        attempts,
        reason: last_reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn backoff_is_linear() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_secs(1));
        assert_eq!(policy.backoff(3), Duration::from_secs(3));
    }

    #[test]
    fn retryable_statuses() {
        assert!(is_retryable(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable(StatusCode::BAD_GATEWAY));
        assert!(!is_retryable(StatusCode::FORBIDDEN));
        assert!(!is_retryable(StatusCode::NOT_FOUND));
    }

    #[tokio::test]
    async fn retries_server_errors_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let url = format!("{}/flaky", server.uri());
        let resp = send_with_retry(&RetryPolicy::immediate(3), "flaky", || client.get(&url))
            .await
            .unwrap();
        assert_eq!(resp.text().await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn exhausted_budget_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .expect(2)
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let url = format!("{}/limited", server.uri());
        let err = send_with_retry(&RetryPolicy::immediate(2), "limited", || client.get(&url))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Transient { attempts: 2, .. }));
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("missing"))
            .expect(1)
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let url = format!("{}/gone", server.uri());
        let err = send_with_retry(&RetryPolicy::immediate(3), "gone", || client.get(&url))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(404));
    }

    #[tokio::test]
    async fn slow_responses_time_out_and_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let policy = RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::ZERO,
            timeout: Duration::from_millis(50),
        };
        let client = reqwest::Client::new();
        let url = format!("{}/slow", server.uri());
        let err = send_with_retry(&policy, "slow", || client.get(&url))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Transient { attempts: 2, .. }));
    }
}
