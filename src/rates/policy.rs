//! Retry and classification policy for upstream HTTP calls.
//!
//! One call to [`RequestPolicy::execute`] performs up to `max_attempts` GETs.
//! Status handling:
//!
//! | outcome                       | kind          | next step                        |
//! |-------------------------------|---------------|----------------------------------|
//! | 2xx                           | -             | return the response              |
//! | 401 / 403                     | `Permanent`   | fail now                         |
//! | 429                           | `RateLimited` | wait `rate_limit_cooldown`       |
//! | timeout, connect, other non-2xx | `Transient` | wait `retry_delay * 2^(n-1)`     |
//!
//! There is no wait after the final attempt. Every wait is cut short by the
//! [`CancelToken`] of the update run that issued the request.

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::CancelToken;
use crate::duration::format_duration;
use crate::error::{FailureKind, SourceError};

const USER_AGENT: &str = concat!("ratekeep/", env!("CARGO_PKG_VERSION"));

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);
pub const DEFAULT_RATE_LIMIT_COOLDOWN: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct RequestPolicy {
    client: Client,
    timeout: Duration,
    max_attempts: u32,
    retry_delay: Duration,
    rate_limit_cooldown: Duration,
}

impl RequestPolicy {
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            timeout: DEFAULT_TIMEOUT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            rate_limit_cooldown: DEFAULT_RATE_LIMIT_COOLDOWN,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Values below 1 are clamped to 1.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_rate_limit_cooldown(mut self, cooldown: Duration) -> Self {
        self.rate_limit_cooldown = cooldown;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before attempt `attempt + 1` after a transient failure.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.retry_delay.saturating_mul(1 << exponent)
    }

    pub async fn execute(
        &self,
        source: &str,
        url: &str,
        params: &[(&str, &str)],
        cancel: &CancelToken,
    ) -> Result<Response, SourceError> {
        let mut last: Option<(String, FailureKind)> = None;

        for attempt in 1..=self.max_attempts {
            debug!(source, attempt, "Sending upstream request");

            let result = self
                .client
                .get(url)
                .query(params)
                .header("Accept", "application/json")
                .header("User-Agent", USER_AGENT)
                .timeout(self.timeout)
                .send()
                .await;

            let (reason, kind) = match result {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status();
                    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
                        warn!(source, status = status.as_u16(), "Upstream rejected credentials");
                        return Err(SourceError::permanent(format!(
                            "access denied ({})",
                            status.as_u16()
                        ))
                        .with_attempts(attempt));
                    }
                    if status == StatusCode::TOO_MANY_REQUESTS {
                        ("rate limited (429)".to_string(), FailureKind::RateLimited)
                    } else {
                        (format!("HTTP {}", status.as_u16()), FailureKind::Transient)
                    }
                }
                // Some providers carry the API key in the path; keep URLs out
                // of reasons and logs.
                Err(e) => {
                    let e = e.without_url();
                    let reason = if e.is_timeout() {
                        format!("timeout after {}", format_duration(self.timeout))
                    } else if e.is_connect() {
                        format!("connection error: {e}")
                    } else {
                        format!("request error: {e}")
                    };
                    (reason, FailureKind::Transient)
                }
            };

            warn!(
                source,
                attempt,
                max_attempts = self.max_attempts,
                reason = %reason,
                "Upstream request failed"
            );

            if attempt < self.max_attempts {
                let wait = match kind {
                    FailureKind::RateLimited => self.rate_limit_cooldown,
                    _ => self.backoff(attempt),
                };
                debug!(source, wait = %format_duration(wait), "Waiting before retry");
                if !cancel.sleep(wait).await {
                    return Err(SourceError {
                        reason: "request cancelled".to_string(),
                        kind,
                        attempts: attempt,
                    });
                }
            }

            last = Some((reason, kind));
        }

        let (reason, kind) =
            last.unwrap_or_else(|| ("no attempt made".to_string(), FailureKind::Transient));
        Err(SourceError {
            reason: format!(
                "request failed after {} attempts: {reason}",
                self.max_attempts
            ),
            kind,
            attempts: self.max_attempts,
        })
    }
}

impl Default for RequestPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode a successful response body. A body that doesn't match the expected
/// shape won't improve on retry, so it is a permanent failure.
pub async fn decode_json<T: DeserializeOwned>(response: Response) -> Result<T, SourceError> {
    response
        .json::<T>()
        .await
        .map_err(|e| SourceError::permanent(format!("invalid response body: {}", e.without_url())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RequestPolicy::new().with_retry_delay(Duration::from_secs(2));
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
        assert_eq!(policy.backoff(3), Duration::from_secs(8));
    }

    #[test]
    fn max_attempts_is_at_least_one() {
        let policy = RequestPolicy::new().with_max_attempts(0);
        assert_eq!(policy.max_attempts(), 1);
    }
}
