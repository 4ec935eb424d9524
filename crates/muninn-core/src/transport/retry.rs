//! Transient-error retry policy.
//!
//! Retried: HTTP 503/429, or a TLS/connection-level failure from the HTTP
//! client. Backoff schedule is fixed at 1s, 2s, 4s — three attempts total,
//! cumulative backoff bounded at 7s. Only the transport retries; higher
//! layers never do, to avoid duplicate writes.

use std::time::Duration;

/// Maximum number of attempts for one logical request.
pub const MAX_ATTEMPTS: u32 = 3;

/// Backoff delay before attempt `attempt` (1-indexed: the delay taken after
/// attempt 1 fails, before attempt 2 starts).
pub fn backoff_delay(attempt: u32) -> Duration {
    match attempt {
        1 => Duration::from_secs(1),
        2 => Duration::from_secs(2),
        _ => Duration::from_secs(4),
    }
}

/// Whether an HTTP status code should be retried.
pub fn is_transient_status(status: u16) -> bool {
    matches!(status, 503 | 429)
}

/// Whether a `reqwest::Error` represents a transient transport failure
/// (connection refused, timeout, TLS handshake) as opposed to a structural
/// problem (bad URL, body serialization).
pub fn is_transient_client_error(err: &reqwest::Error) -> bool {
    err.is_connect() || err.is_timeout()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_schedule_matches_spec() {
        assert_eq!(backoff_delay(1), Duration::from_secs(1));
        assert_eq!(backoff_delay(2), Duration::from_secs(2));
        assert_eq!(backoff_delay(3), Duration::from_secs(4));
        let cumulative: Duration = (1..MAX_ATTEMPTS).map(backoff_delay).sum();
        assert!(cumulative <= Duration::from_secs(7));
    }

    #[test]
    fn transient_statuses() {
        assert!(is_transient_status(503));
        assert!(is_transient_status(429));
        assert!(!is_transient_status(500));
        assert!(!is_transient_status(404));
    }
}
