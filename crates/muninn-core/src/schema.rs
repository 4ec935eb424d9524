//! Schema & Bootstrap.
//!
//! Declares the two logical tables, the FTS5 index, and the triggers that
//! mirror inserts/updates/soft-deletes into it, plus the secondary indices.
//! Creation is idempotent (`IF NOT EXISTS` throughout); migration is
//! additive only, this module never drops or rewrites a column.

use std::sync::Arc;

use tracing::info;

use crate::error::TransportError;
use crate::sql;
use crate::transport::{Statement, Transport};

/// Runs the bootstrap DDL against `transport`. Safe to call on every
/// process start: every statement is `IF NOT EXISTS`.
pub async fn bootstrap(transport: &Arc<dyn Transport>) -> Result<(), TransportError> {
    let statements = vec![
        Statement::bare(sql::CREATE_MEMORIES_TABLE),
        Statement::bare(sql::CREATE_CONFIG_TABLE),
        Statement::bare(sql::CREATE_MEMORIES_FTS),
        Statement::bare(sql::CREATE_TRIGGER_MEMORIES_AI),
        Statement::bare(sql::CREATE_TRIGGER_MEMORIES_AU),
        Statement::bare(sql::CREATE_TRIGGER_MEMORIES_AD),
        Statement::bare(sql::CREATE_INDEX_MEMORIES_T),
        Statement::bare(sql::CREATE_INDEX_MEMORIES_PRIORITY_T),
        Statement::bare(sql::CREATE_INDEX_MEMORIES_SESSION),
        Statement::bare(sql::CREATE_INDEX_CONFIG_CATEGORY),
    ];

    let results = transport.exec_batch(statements).await?;
    for result in results {
        result?;
    }
    info!("schema bootstrap complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::test_support::MockTransport;

    #[tokio::test]
    async fn bootstrap_runs_every_ddl_statement() {
        let transport: Arc<dyn Transport> = Arc::new(MockTransport::new());
        bootstrap(&transport).await.unwrap();
    }
}
