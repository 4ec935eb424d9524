//! Top-level engine facade.
//!
//! `Muninn` wires the Credentials Resolver, Transport, and every other
//! component into the one entry point an embedding agent constructs once
//! per process, rather than wiring each subsystem by hand.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::boot::{BootComposer, BootDocument};
use crate::config::{ConfigCategory, ConfigEntry, ConfigStore, SetOptions};
use crate::consolidation::{Consolidation, ConsolidationOptions, ConsolidationReport};
use crate::credentials::CredentialsResolver;
use crate::error::{MuninnError, Result};
use crate::handoff::Handoff;
use crate::journal::Journal;
use crate::memory::{CurationReport, ExportData, Memory, MemoryStore, MemoryType, RememberOptions};
use crate::result::MemoryResultList;
use crate::schema;
use crate::search::{HintStub, RecallOptions, SearchEngine};
use crate::session::{Session, SessionRecord, SessionSummary};
use crate::time::{SharedClock, SystemClock};
use crate::transport::{HttpTransport, Transport, DEFAULT_REQUEST_TIMEOUT};
use crate::write::{WritePipeline, DEFAULT_FLUSH_TIMEOUT};

/// Tunables for one [`Muninn`] instance.
///
/// `request_timeout`, `default_journal_count`, `flush_timeout`, and
/// `materialize_dir` are plumbed straight into the components that accept
/// them. The write-behind batch size (8) and retry backoff schedule
/// (1s/2s/4s) are fixed engine constants, not reconfigurable here.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub request_timeout: Duration,
    pub default_journal_count: usize,
    pub flush_timeout: Duration,
    pub materialize_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            default_journal_count: 10,
            flush_timeout: DEFAULT_FLUSH_TIMEOUT,
            materialize_dir: None,
        }
    }
}

/// The assembled memory engine. Cheap to clone-by-reference (every field is
/// an `Arc` or an owning wrapper around one); construct once per process.
pub struct Muninn {
    transport: Arc<dyn Transport>,
    clock: SharedClock,
    credentials: Arc<CredentialsResolver>,
    config: Arc<ConfigStore>,
    store: Arc<MemoryStore>,
    write: WritePipeline,
    boot: BootComposer,
    journal: Journal,
    session: Session,
    handoff: Handoff,
    consolidation: Consolidation,
    flush_timeout: Duration,
}

impl Muninn {
    /// Resolves credentials via the default source order,
    /// opens an [`HttpTransport`] against them, and bootstraps the schema.
    pub async fn connect(config: EngineConfig) -> Result<Self> {
        Self::connect_with_credentials(CredentialsResolver::new(), config).await
    }

    /// Same as [`Muninn::connect`], but with a caller-supplied
    /// `CredentialsResolver` (e.g. one configured with
    /// `with_configuration_source` or a non-default well-known file list).
    pub async fn connect_with_credentials(credentials: CredentialsResolver, config: EngineConfig) -> Result<Self> {
        let credentials = Arc::new(credentials);
        let creds = credentials.resolve();
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::with_timeout(
            creds.url.clone(),
            creds.token.clone(),
            config.request_timeout,
        )?);
        Self::with_transport(transport, credentials, config).await
    }

    /// Assembles the engine atop a caller-supplied transport (tests and
    /// embedders that already hold a `MockTransport` or a pre-built
    /// `HttpTransport` use this directly).
    pub async fn with_transport(
        transport: Arc<dyn Transport>,
        credentials: Arc<CredentialsResolver>,
        config: EngineConfig,
    ) -> Result<Self> {
        // An offline-resolved backend has nothing to bootstrap against; skip
        // rather than fail construction on a network round-trip the engine
        // already knows has no credentials to succeed with (spec §7, S5).
        if !credentials.resolve().offline {
            schema::bootstrap(&transport).await?;
        }

        let clock: SharedClock = Arc::new(SystemClock);
        let cfg_store = Arc::new(ConfigStore::new(transport.clone(), clock.clone()));
        let store = Arc::new(MemoryStore::new(transport.clone(), clock.clone(), cfg_store.clone()));
        let write = WritePipeline::new(store.clone());

        let mut boot = BootComposer::new(transport.clone(), clock.clone(), cfg_store.clone(), credentials.clone())
            .with_journal_count(config.default_journal_count);
        if let Some(dir) = config.materialize_dir.clone() {
            boot = boot.with_materialize_dir(dir);
        }

        let journal = Journal::new(transport.clone(), clock.clone(), cfg_store.clone());
        let session = Session::new(store.clone(), transport.clone(), clock.clone());
        let handoff = Handoff::new(store.clone(), transport.clone(), clock.clone());
        let consolidation = Consolidation::new(store.clone(), transport.clone(), clock.clone());
        let flush_timeout = config.flush_timeout;

        Ok(Self {
            transport,
            clock,
            credentials,
            config: cfg_store,
            store,
            write,
            boot,
            journal,
            session,
            handoff,
            consolidation,
            flush_timeout,
        })
    }

    fn search(&self) -> SearchEngine {
        SearchEngine::new(self.transport.clone(), self.clock.clone())
    }

    // ---- Memory Store ----------------------------------------

    /// `sync=true` (the `RememberOptions` default) writes through and
    /// returns once acknowledged; `sync=false` enqueues on the write-behind
    /// pipeline. A synchronous write against an offline resolver fails fast
    /// rather than attempting a network round-trip.
    pub async fn remember(&self, what: &str, ty: MemoryType, opts: RememberOptions) -> Result<String> {
        if opts.sync && self.credentials.resolve().offline {
            return Err(MuninnError::TransportUnavailable);
        }
        self.write.remember(what, ty, opts).await
    }

    pub async fn forget(&self, id: &str) -> Result<()> {
        self.store.forget(id).await
    }

    pub async fn get(&self, id: &str) -> Result<Option<Memory>> {
        self.store.get(id).await
    }

    pub async fn supersede(&self, id: &str, what: &str, ty: MemoryType, opts: RememberOptions) -> Result<String> {
        self.store.supersede(id, what, ty, opts).await
    }

    pub async fn reprioritize(&self, id: &str, priority: i64) -> Result<()> {
        self.store.reprioritize(id, priority).await
    }

    pub async fn strengthen(&self, id: &str, boost: i64) -> Result<()> {
        self.store.strengthen(id, boost).await
    }

    pub async fn weaken(&self, id: &str, drop: i64) -> Result<()> {
        self.store.weaken(id, drop).await
    }

    pub async fn get_chain(&self, id: &str, max_depth: usize) -> Result<Vec<(Memory, usize)>> {
        self.store.get_chain(id, max_depth).await
    }

    pub async fn get_alternatives(&self, id: &str) -> Result<Vec<(String, Option<String>)>> {
        self.store.get_alternatives(id).await
    }

    pub async fn curate(&self, session_id: Option<&str>, min_priority: i64) -> Result<CurationReport> {
        self.store.curate(session_id, min_priority).await
    }

    pub async fn decision_trace(&self, id: &str, depth: usize) -> Result<Vec<(Memory, usize)>> {
        self.store.decision_trace(id, depth).await
    }

    /// Snapshots the entire memory store (spec property 8).
    pub async fn export(&self) -> Result<ExportData> {
        self.store.export().await
    }

    /// Restores a snapshot produced by [`Self::export`]. `merge=false`
    /// replaces the whole store; `merge=true` upserts by id only.
    pub async fn import(&self, data: &ExportData, merge: bool) -> Result<usize> {
        self.store.import(data, merge).await
    }

    // ---- Search & Ranking ------------------------------------

    pub async fn recall(&self, search: Option<&str>, opts: RecallOptions) -> Result<MemoryResultList> {
        self.search().recall(search, opts).await
    }

    pub async fn recall_since(&self, search: Option<&str>, since: DateTime<Utc>, opts: RecallOptions) -> Result<MemoryResultList> {
        self.search().recall_since(search, since, opts).await
    }

    pub async fn recall_between(
        &self,
        search: Option<&str>,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
        opts: RecallOptions,
    ) -> Result<MemoryResultList> {
        self.search().recall_between(search, since, until, opts).await
    }

    pub async fn recall_hints(
        &self,
        context: Option<&str>,
        terms: &[String],
        include_tags: bool,
        include_summaries: bool,
        min_matches: usize,
    ) -> Result<Vec<HintStub>> {
        self.search()
            .recall_hints(context, terms, include_tags, include_summaries, min_matches)
            .await
    }

    // ---- Config Store ----------------------------------------

    pub async fn config_get(&self, key: &str) -> Result<Option<String>> {
        self.config.get(key).await
    }

    pub async fn config_get_entry(&self, key: &str) -> Result<Option<ConfigEntry>> {
        self.config.get_entry(key).await
    }

    pub async fn config_set(&self, key: &str, value: &str, category: ConfigCategory, opts: SetOptions) -> Result<()> {
        self.config.set(key, value, category, opts).await
    }

    /// Administrative escape hatch bypassing `read_only`.
    pub async fn config_force_set(&self, key: &str, value: &str, category: ConfigCategory, opts: SetOptions) -> Result<()> {
        self.config.force_set(key, value, category, opts).await
    }

    pub async fn config_delete(&self, key: &str) -> Result<()> {
        self.config.delete(key).await
    }

    pub async fn config_list(&self, category: Option<ConfigCategory>) -> Result<Vec<ConfigEntry>> {
        self.config.list(category).await
    }

    // ---- Boot Composer ---------------------------------------

    pub async fn boot(&self) -> Result<BootDocument> {
        self.boot.boot().await
    }

    // ---- Journal ----------------------------------------------

    pub async fn journal(&self, topics: &[String], user_stated: Option<&str>, my_intent: Option<&str>) -> Result<String> {
        self.journal.journal(topics, user_stated, my_intent).await
    }

    pub async fn journal_recent(&self, n: usize) -> Result<Vec<ConfigEntry>> {
        self.journal.journal_recent(n).await
    }

    pub async fn journal_prune(&self, keep: usize) -> Result<usize> {
        self.journal.journal_prune(keep).await
    }

    // ---- Session, Handoff, Consolidation ----------------------

    pub async fn session_save(&self, session_id: &str, summary: &str, context: Option<&str>) -> Result<String> {
        self.session.session_save(session_id, summary, context).await
    }

    pub async fn session_resume(&self, session_id: Option<&str>) -> Result<Option<SessionRecord>> {
        self.session.session_resume(session_id).await
    }

    pub async fn sessions(&self) -> Result<Vec<SessionSummary>> {
        self.session.sessions().await
    }

    /// Records created after the most recent `therapy`-tagged record.
    pub async fn therapy_scope(&self) -> Result<Option<(DateTime<Utc>, Vec<Memory>)>> {
        self.session.therapy_scope().await
    }

    pub async fn therapy_session_count(&self) -> Result<usize> {
        self.session.therapy_session_count().await
    }

    pub async fn handoff_pending(&self) -> Result<Vec<Memory>> {
        self.handoff.handoff_pending().await
    }

    pub async fn handoff_complete(&self, id: &str, notes: &str, version: Option<&str>) -> Result<String> {
        self.handoff.handoff_complete(id, notes, version).await
    }

    pub async fn consolidate(&self, opts: ConsolidationOptions) -> Result<ConsolidationReport> {
        self.consolidation.consolidate(opts).await
    }

    // ---- Write Pipeline lifecycle -------------------------

    /// Blocks until the background write queue drains or the configured
    /// flush timeout elapses.
    pub async fn flush(&self) -> bool {
        self.write.flush(self.flush_timeout).await
    }

    /// Drains outstanding background writes (bounded by the configured
    /// flush timeout) and stops the write-behind worker. No implicit
    /// process-exit hook is registered; callers own calling this.
    pub async fn shutdown(self) {
        self.write.shutdown(self.flush_timeout).await;
    }

    pub fn credentials(&self) -> &CredentialsResolver {
        &self.credentials
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::test_support::MockTransport;

    async fn engine() -> Muninn {
        let transport: Arc<dyn Transport> = Arc::new(MockTransport::new());
        let credentials = Arc::new(CredentialsResolver::fixed("mock://transport", Some("mock-token".into())));
        Muninn::with_transport(transport, credentials, EngineConfig::default()).await.unwrap()
    }

    #[tokio::test]
    async fn remember_then_recall_round_trips_through_the_facade() {
        let engine = engine().await;
        let mut opts = RememberOptions::new();
        opts.tags = vec!["onboarding".into()];
        let id = engine.remember("wrote the facade", MemoryType::Decision, opts).await.unwrap();

        let found = engine.get(&id).await.unwrap().unwrap();
        assert_eq!(found.summary, "wrote the facade");

        let results = engine.recall(Some("facade"), RecallOptions::new()).await.unwrap();
        assert!(results.iter().any(|r| r.id() == id));
    }

    #[tokio::test]
    async fn boot_and_journal_are_reachable_from_the_facade() {
        let engine = engine().await;
        engine.journal(&["startup".to_string()], None, None).await.unwrap();
        let doc = engine.boot().await.unwrap();
        assert!(doc.to_string().contains("# IDENTITY"));
    }

    #[tokio::test]
    async fn flush_returns_true_with_nothing_outstanding() {
        let engine = engine().await;
        assert!(engine.flush().await);
    }

    #[tokio::test]
    async fn offline_connect_skips_bootstrap_and_boots_degraded() {
        use crate::transport::test_support::FailingTransport;

        let transport: Arc<dyn Transport> = Arc::new(FailingTransport);
        let credentials = Arc::new(CredentialsResolver::fixed(crate::credentials::DEFAULT_URL, None));
        let engine = Muninn::with_transport(transport, credentials, EngineConfig::default())
            .await
            .expect("construction must succeed even when the backend is unreachable");

        let doc = engine.boot().await.unwrap();
        assert!(doc.to_string().contains("backend unreachable"));

        let err = engine
            .remember("offline write", MemoryType::World, RememberOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MuninnError::TransportUnavailable));
    }

    #[tokio::test]
    async fn offline_credentials_fail_synchronous_writes_fast() {
        let transport: Arc<dyn Transport> = Arc::new(MockTransport::new());
        let credentials = Arc::new(CredentialsResolver::fixed(crate::credentials::DEFAULT_URL, None));
        let engine = Muninn::with_transport(transport, credentials, EngineConfig::default()).await.unwrap();

        let err = engine
            .remember("should not reach the transport", MemoryType::World, RememberOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MuninnError::TransportUnavailable));
    }

    #[tokio::test]
    async fn export_then_import_round_trips_through_the_facade() {
        let source = engine().await;
        let mut opts = RememberOptions::new();
        opts.tags = vec!["handoff".into()];
        let id = source.remember("exported via the facade", MemoryType::World, opts).await.unwrap();
        let snapshot = source.export().await.unwrap();

        let target = engine().await;
        let restored = target.import(&snapshot, false).await.unwrap();
        assert_eq!(restored, 1);
        assert_eq!(target.get(&id).await.unwrap().unwrap().summary, "exported via the facade");
    }
}
