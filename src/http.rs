//! Shared HTTP plumbing for the provider clients.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors, including client timeouts → retry
//! - Backoff: base, 2×base, 4×base, … capped at 32×base
//!
//! `max_retries = 0` means a single attempt.

use anyhow::{bail, Context, Result};
use std::time::Duration;

use crate::logging::truncate_chars;

/// Longest upstream error body kept in an error message.
const ERROR_BODY_LIMIT: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff_base_ms: u64) -> Self {
        Self {
            max_retries,
            backoff_base: Duration::from_millis(backoff_base_ms),
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(5);
        self.backoff_base * (1u32 << exp)
    }
}

/// Builds a client with a whole-request timeout.
pub fn build_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .context("Failed to build HTTP client")
}

/// Sends the request produced by `make_request`, retrying per `policy`,
/// and decodes a successful response body as JSON.
///
/// `service` names the upstream in error messages (e.g. `"OpenAI"`).
pub async fn send_json<F>(
    service: &str,
    policy: RetryPolicy,
    make_request: F,
) -> Result<serde_json::Value>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut last_err = None;

    for attempt in 0..=policy.max_retries {
        if attempt > 0 {
            let delay = policy.delay_for(attempt);
            tracing::warn!(
                service,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "retrying upstream request"
            );
            tokio::time::sleep(delay).await;
        }

        match make_request().send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return response
                        .json()
                        .await
                        .with_context(|| format!("{} returned a non-JSON body", service));
                }

                let body_text = response.text().await.unwrap_or_default();
                let err = anyhow::anyhow!(
                    "{} API error {}: {}",
                    service,
                    status,
                    truncate_chars(&body_text, ERROR_BODY_LIMIT)
                );

                // Rate limited or server error: retry
                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(err);
                    continue;
                }

                return Err(err);
            }
            Err(e) => {
                let what = if e.is_timeout() {
                    "request timed out"
                } else {
                    "request failed"
                };
                last_err = Some(anyhow::Error::new(e).context(format!("{} {}", service, what)));
                continue;
            }
        }
    }

    match last_err {
        Some(e) if policy.max_retries > 0 => {
            Err(e.context(format!("giving up after {} attempts", policy.max_retries + 1)))
        }
        Some(e) => Err(e),
        None => bail!("{} request was never attempted", service),
    }
}

/// Joins a base URL and a path without doubling or dropping the slash.
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
