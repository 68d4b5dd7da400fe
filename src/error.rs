// src/error.rs
//! Typed failures for the three adapter boundaries (sources, delivery, store).
//!
//! Only [`StoreError::Unavailable`] is fatal for a run; everything else is
//! recorded in the run summary and the pipeline keeps going.

use reqwest::StatusCode;

/// A source could not produce candidates for this run.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("rate limited by upstream")]
    RateLimited,

    #[error("API quota exceeded")]
    QuotaExceeded,

    #[error("response parse error: {0}")]
    Parse(String),
}

impl FetchError {
    /// Transport failures and 5xx responses are worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            FetchError::Status { status, .. } => status.is_server_error(),
            FetchError::RateLimited | FetchError::QuotaExceeded | FetchError::Parse(_) => false,
        }
    }
}

/// Delivery of one item to one destination failed.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("chat API returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("missing permissions for {0}")]
    Forbidden(String),

    #[error("rate limited by chat API")]
    RateLimited,

    #[error("no destinations resolved")]
    NoDestinations,

    #[error("malformed chat API response: {0}")]
    Parse(String),
}

impl DeliveryError {
    pub fn is_transient(&self) -> bool {
        match self {
            DeliveryError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            DeliveryError::Status { status, .. } => status.is_server_error(),
            _ => false,
        }
    }
}

/// Dedup store failures, split by how the engine must react to them.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store could not be opened; novelty cannot be decided.
    #[error("dedup store unavailable: {0}")]
    Unavailable(#[source] sqlx::Error),

    /// A commit did not durably succeed.
    #[error("dedup store write failed: {0}")]
    Write(#[source] sqlx::Error),

    #[error("dedup store query failed: {0}")]
    Query(#[source] sqlx::Error),

    #[error("dedup store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_transient_client_errors_are_not() {
        let e5 = FetchError::Status {
            status: StatusCode::BAD_GATEWAY,
            body: String::new(),
        };
        let e4 = FetchError::Status {
            status: StatusCode::NOT_FOUND,
            body: String::new(),
        };
        assert!(e5.is_transient());
        assert!(!e4.is_transient());
        assert!(!FetchError::RateLimited.is_transient());
        assert!(!DeliveryError::Forbidden("g#c".into()).is_transient());
    }
}
