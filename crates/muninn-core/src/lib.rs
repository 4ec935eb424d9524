//! # Muninn Core
//!
//! A durable, agent-facing memory engine: a library an AI assistant embeds
//! to load bootstrap context, record observations/decisions/anomalies, and
//! retrieve them by full-text rank, tags, time, type, priority and
//! reference chains.
//!
//! The engine owns its data model, search/ranking, ingest pipeline (sync +
//! write-behind), reference/supersede/consolidate graph, boot composition,
//! and the retry/failover transport to a remote SQL-over-HTTP backend (a
//! Turso/libSQL-shaped `/v2/pipeline` HTTP API). It does not own a CLI
//! surface, the remote database's own implementation, or embedding/vector
//! search.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use muninn_core::{EngineConfig, Muninn, MemoryType, RememberOptions, RecallOptions};
//!
//! # async fn run() -> muninn_core::Result<()> {
//! let engine = Muninn::connect(EngineConfig::default()).await?;
//!
//! let mut opts = RememberOptions::new();
//! opts.tags = vec!["deploy".into()];
//! let id = engine.remember("rolled back to v1.4.2", MemoryType::Decision, opts).await?;
//!
//! let results = engine.recall(Some("rollback"), RecallOptions::new()).await?;
//! assert!(results.iter().any(|r| r.id() == id));
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature flags
//!
//! - `test-support`: exposes `transport::test_support::MockTransport`
//!   outside test builds, for downstream crates that want to exercise the
//!   engine without a live backend.

#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod boot;
pub mod config;
pub mod consolidation;
pub mod credentials;
pub mod engine;
pub mod error;
pub mod handoff;
pub mod journal;
pub mod memory;
pub mod result;
pub mod schema;
pub mod search;
pub mod session;
pub mod sql;
pub mod time;
pub mod transport;
pub mod write;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

pub use engine::{EngineConfig, Muninn};

pub use error::{MuninnError, Result, TransportError};

pub use time::{Clock, FixedClock, SharedClock, SystemClock};

pub use transport::{HttpTransport, Row, Rows, Statement, Transport, Value};

pub use credentials::{Credentials, CredentialsResolver, ConfigurationSource};

pub use config::{ConfigCategory, ConfigEntry, ConfigStore, SetOptions};

pub use memory::{
    CurationReport, ExportData, ExportRecord, Memory, MemoryStore, MemoryType, RefEntry, RememberOptions,
};

pub use search::{HintStub, RecallOptions, SearchEngine, TagMode};

pub use result::{MemoryResult, MemoryResultList};

pub use write::WritePipeline;

pub use boot::{BootComposer, BootDocument, Capabilities};

pub use journal::Journal;

pub use session::{Session, SessionRecord, SessionSummary};

pub use handoff::Handoff;

pub use consolidation::{Consolidation, ConsolidationGroup, ConsolidationOptions, ConsolidationReport};

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient glob import for common usage: `use muninn_core::prelude::*;`.
pub mod prelude {
    pub use crate::{
        BootDocument, ConfigCategory, EngineConfig, Memory, MemoryResult, MemoryResultList,
        MemoryType, Muninn, RecallOptions, RefEntry, RememberOptions, Result, SearchEngine,
    };
}
