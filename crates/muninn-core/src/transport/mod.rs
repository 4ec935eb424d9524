//! HTTP transport to the remote SQL pipeline API.
//!
//! `Transport` is the one seam the rest of the engine talks through; every
//! other component depends on `Arc<dyn Transport>` rather than on `reqwest`
//! directly.

mod http;
pub mod retry;
pub mod types;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use http::{HttpTransport, DEFAULT_REQUEST_TIMEOUT};
pub use types::{Row, Rows, Statement, Value};

use crate::error::TransportError;

/// Executes parameterized SQL against the remote backend.
///
/// Safe for concurrent use: implementations share one connection pool and
/// treat requests as independent.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Execute a single parameterized statement.
    async fn exec_one(&self, stmt: Statement) -> Result<Rows, TransportError>;

    /// Execute N statements in one HTTP pipeline, preserving order. Each
    /// statement may individually fail; a failure is reported at its
    /// position rather than aborting the whole batch.
    async fn exec_batch(&self, stmts: Vec<Statement>) -> Result<Vec<Result<Rows, TransportError>>, TransportError>;
}
