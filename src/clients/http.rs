//! Retry and header helpers shared by the blocking HTTP clients.

use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use tracing::warn;

/// Which failures may be resent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RetryMode {
    /// Safe to repeat: rate limits, server errors and any transient transport failure.
    Idempotent,
    /// Non-idempotent write: only failures the server never acted on
    /// (429 and connection errors).
    Write,
}

/// What went wrong with one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Failure {
    Status(StatusCode),
    Connect,
    Timeout,
    Transport,
    Other,
}

impl Failure {
    fn of(err: &reqwest::Error) -> Self {
        if err.is_connect() {
            Self::Connect
        } else if err.is_timeout() {
            Self::Timeout
        } else if err.is_request() || err.is_body() {
            Self::Transport
        } else {
            Self::Other
        }
    }
}

impl RetryMode {
    fn retries(self, failure: Failure) -> bool {
        match (self, failure) {
            (_, Failure::Status(status)) if status == StatusCode::TOO_MANY_REQUESTS => true,
            (_, Failure::Connect) => true,
            (Self::Idempotent, Failure::Status(status)) => status.is_server_error(),
            (Self::Idempotent, Failure::Timeout | Failure::Transport) => true,
            _ => false,
        }
    }
}

/// Builds a JSON client with the given extra headers and timeout.
pub(crate) fn json_client(
    mut headers: HeaderMap,
    timeout: Duration,
    service: &str,
) -> Result<Client> {
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    Client::builder()
        .timeout(timeout)
        .default_headers(headers)
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .with_context(|| format!("failed to build {service} HTTP client"))
}

/// Sends the request built by `build`, resending up to `max_retries` times
/// after the first attempt when `mode` allows it.
///
/// Non-retryable statuses are returned to the caller untouched.
pub(crate) fn send_with_retry<F>(
    max_retries: usize,
    mode: RetryMode,
    service: &str,
    build: F,
) -> Result<Response>
where
    F: Fn() -> RequestBuilder,
{
    let mut retries = 0usize;
    loop {
        match build().send() {
            Ok(resp) => {
                let status = resp.status();
                if !status.is_success()
                    && should_resend(mode, Failure::Status(status), retries, max_retries)
                {
                    retries += 1;
                    warn!(service, %status, retries, "retrying request");
                    thread::sleep(retry_backoff(retries));
                    continue;
                }
                return Ok(resp);
            }
            Err(err) => {
                if should_resend(mode, Failure::of(&err), retries, max_retries) {
                    retries += 1;
                    warn!(service, error = %err, retries, "retrying request");
                    thread::sleep(retry_backoff(retries));
                    continue;
                }
                return Err(err).with_context(|| format!("{service} request failed"));
            }
        }
    }
}

/// Consumes a response and returns its body for error messages.
pub(crate) fn body_text(resp: Response) -> String {
    resp.text()
        .unwrap_or_else(|_| "<body unavailable>".to_string())
}

fn should_resend(mode: RetryMode, failure: Failure, retries: usize, max_retries: usize) -> bool {
    retries < max_retries && mode.retries(failure)
}

fn retry_backoff(retry: usize) -> Duration {
    let capped = retry.min(5) as u32;
    Duration::from_millis(500 * (1 << capped))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: StatusCode) -> Failure {
        Failure::Status(code)
    }

    #[test]
    fn reads_retry_rate_limits_server_errors_and_transport() {
        let mode = RetryMode::Idempotent;
        assert!(mode.retries(status(StatusCode::TOO_MANY_REQUESTS)));
        assert!(mode.retries(status(StatusCode::BAD_GATEWAY)));
        assert!(mode.retries(Failure::Timeout));
        assert!(mode.retries(Failure::Connect));
        assert!(mode.retries(Failure::Transport));
        assert!(!mode.retries(status(StatusCode::BAD_REQUEST)));
        assert!(!mode.retries(status(StatusCode::FORBIDDEN)));
        assert!(!mode.retries(status(StatusCode::NOT_FOUND)));
        assert!(!mode.retries(Failure::Other));
    }

    #[test]
    fn writes_only_retry_when_nothing_reached_the_server() {
        let mode = RetryMode::Write;
        assert!(mode.retries(status(StatusCode::TOO_MANY_REQUESTS)));
        assert!(mode.retries(Failure::Connect));
        assert!(!mode.retries(status(StatusCode::INTERNAL_SERVER_ERROR)));
        assert!(!mode.retries(status(StatusCode::GATEWAY_TIMEOUT)));
        assert!(!mode.retries(Failure::Timeout));
        assert!(!mode.retries(Failure::Transport));
        assert!(!mode.retries(status(StatusCode::BAD_REQUEST)));
    }

    #[test]
    fn max_retries_counts_resends_after_first_attempt() {
        let failure = Failure::Connect;
        assert!(!should_resend(RetryMode::Idempotent, failure, 0, 0));
        assert!(should_resend(RetryMode::Idempotent, failure, 0, 1));
        assert!(!should_resend(RetryMode::Idempotent, failure, 1, 1));
        assert!(should_resend(RetryMode::Write, failure, 2, 3));
        assert!(!should_resend(RetryMode::Write, failure, 3, 3));
    }

    #[test]
    fn backoff_is_capped() {
        assert_eq!(retry_backoff(1), Duration::from_millis(1000));
        assert_eq!(retry_backoff(5), Duration::from_millis(16_000));
        assert_eq!(retry_backoff(9), retry_backoff(5));
    }
}
