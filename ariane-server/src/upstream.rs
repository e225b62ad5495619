//! Outbound HTTP: shared client and retry classification.

use std::time::Duration;

use backoff::ExponentialBackoff;
use reqwest::{Client, StatusCode};

use ariane_core::ArianeError;

/// Sent on every outbound request; GitHub rejects requests without one
pub const USER_AGENT: &str = "ariane-app";

/// Outbound request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub fn http_client(timeout: Duration) -> Result<Client, ArianeError> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| ArianeError::MissingConfiguration(format!("Failed to create HTTP client: {e}")))
}

/// Retry schedule for idempotent upstream calls
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    /// Give up once this much time has passed
    pub max_elapsed: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(200),
            max_interval: Duration::from_secs(2),
            max_elapsed: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// A single attempt, for tests
    pub fn none() -> Self {
        Self {
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(1),
            max_elapsed: Duration::ZERO,
        }
    }

    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_interval,
            max_interval: self.max_interval,
            max_elapsed_time: Some(self.max_elapsed),
            ..Default::default()
        }
    }
}

/// Check if a reqwest error is transient and should be retried.
pub fn is_transient_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}

/// Check if an HTTP status code indicates a transient error.
pub fn is_transient_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
            | StatusCode::BAD_GATEWAY
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_status_codes() {
        assert!(is_transient_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_transient_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_transient_status(StatusCode::UNAUTHORIZED));
        assert!(!is_transient_status(StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[test]
    fn test_backoff_respects_policy() {
        let policy = RetryPolicy::default();
        let backoff = policy.backoff();
        assert_eq!(backoff.initial_interval, Duration::from_millis(200));
        assert_eq!(backoff.max_elapsed_time, Some(Duration::from_secs(8)));
    }

    #[test]
    fn test_client_builds() {
        assert!(http_client(DEFAULT_TIMEOUT).is_ok());
    }
}
