//! Error taxonomy for the memory engine.
//!
//! A single `#[non_exhaustive]` enum per concern, `#[error("...")]` messages,
//! and `#[from]` conversions for wrapped causes. Only validation, contract,
//! and non-transient transport errors are meant to cross the library
//! boundary; retries and fallbacks are handled internally and never appear
//! here.

use thiserror::Error;

/// Transport-level failures (see `transport` module).
///
/// Transient failures (503/429/TLS/connection errors) are retried inside
/// the transport and only surface here once the retry budget is exhausted.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum TransportError {
    /// The retry budget (3 attempts, 1/2/4s backoff) was exhausted on a
    /// transient error.
    #[error("backend unreachable after retrying")]
    Unavailable,

    /// HTTP 401/403: bad or missing credentials.
    #[error("backend authentication failed: {0}")]
    Auth(String),

    /// HTTP 404, or a per-statement "not found" error in a pipeline response.
    #[error("backend resource not found: {0}")]
    NotFound(String),

    /// A malformed request/response, or an unrecognized backend error code.
    /// Unknown codes are treated as fatal, not transient.
    #[error("backend protocol error: {0}")]
    Protocol(String),

    /// A non-transient 5xx (anything other than 503).
    #[error("backend server error: {0}")]
    Server(String),

    /// Underlying HTTP client failure that is not classified as transient
    /// (e.g. a malformed URL).
    #[error("http client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("failed to serialize request body: {0}")]
    Encode(#[from] serde_json::Error),
}

/// The engine's top-level error type.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum MuninnError {
    /// The backend could not be reached (credentials missing/offline, or the
    /// transport's retries were exhausted). Synchronous writes raise this;
    /// reads degrade silently unless `strict` is set.
    #[error("backend unavailable")]
    TransportUnavailable,

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// `type` is not one of the declared memory types.
    #[error("unknown memory type: {0}")]
    UnknownType(String),

    /// `confidence` is outside `[0, 1]`.
    #[error("invalid confidence value: {0}")]
    InvalidConfidence(f64),

    /// A record id referenced by an operation does not exist (or is
    /// soft-deleted, for operations that require a live record).
    #[error("record not found: {0}")]
    NotFound(String),

    /// `refs` would introduce a self-reference.
    #[error("a record cannot reference itself: {0}")]
    RefCycleAttempt(String),

    /// A numeric argument (priority, depth, limit, ...) is out of its
    /// declared range.
    #[error("argument out of range: {0}")]
    ArgumentOutOfRange(String),

    /// A search argument is structurally invalid (e.g. the bare wildcard
    /// `"*"` query).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Write attempted against a `read_only` config key.
    #[error("config key is read-only: {0}")]
    ConfigReadOnly(String),

    /// Write would exceed a config key's `char_limit`.
    #[error("value exceeds char_limit for key {key}: {len} > {limit}")]
    CharLimitExceeded { key: String, len: usize, limit: usize },

    /// `category` is not one of the declared config categories.
    #[error("invalid config category: {0}")]
    InvalidCategory(String),

    #[error("field not found: {field} (did you mean `{suggestion}`?)")]
    UnknownField { field: String, suggestion: String },

    #[error("field not found: {0}")]
    UnknownFieldNoSuggestion(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MuninnError>;
