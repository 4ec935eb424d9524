//! Search & Ranking.

pub mod hints;
pub mod ranking;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{instrument, warn};

use crate::error::{MuninnError, Result};
use crate::memory::{Memory, MemoryType};
use crate::result::{MemoryResult, MemoryResultList};
use crate::sql;
use crate::time::SharedClock;
use crate::transport::{Statement, Transport, Value};

pub use hints::HintStub;

/// How multiple tags in a filter combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagMode {
    Any,
    All,
}

impl Default for TagMode {
    fn default() -> Self {
        TagMode::Any
    }
}

/// All optional arguments to [`SearchEngine::recall`].
#[derive(Debug, Clone, Default)]
pub struct RecallOptions {
    pub n: Option<usize>,
    pub tags: Vec<String>,
    pub r#type: Option<MemoryType>,
    pub conf_min: Option<f64>,
    pub tag_mode: TagMode,
    pub tags_all: Vec<String>,
    pub tags_any: Vec<String>,
    pub strict: bool,
    pub session_id: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub auto_strengthen: bool,
    pub raw: bool,
    pub expansion_threshold: usize,
    pub limit: Option<usize>,
    pub fetch_all: bool,
    /// Opts into the `access_boost` composite-score factor (spec §4.6:
    /// "only applied when the caller opts into episodic boosting"). Off by
    /// default so a fresh, never-accessed record isn't penalized relative
    /// to one with the same relevance that happens to have been recalled
    /// before.
    pub episodic: bool,
}

impl RecallOptions {
    pub fn new() -> Self {
        Self {
            n: Some(10),
            expansion_threshold: 3,
            ..Default::default()
        }
    }

    fn effective_n(&self) -> usize {
        self.limit.or(self.n).unwrap_or(10)
    }

    fn all_tags_all(&self) -> Vec<String> {
        let mut tags = self.tags_all.clone();
        if self.tag_mode == TagMode::All {
            tags.extend(self.tags.iter().cloned());
        }
        tags
    }

    fn all_tags_any(&self) -> Vec<String> {
        let mut tags = self.tags_any.clone();
        if self.tag_mode == TagMode::Any {
            tags.extend(self.tags.iter().cloned());
        }
        tags
    }
}

pub struct SearchEngine {
    transport: Arc<dyn Transport>,
    clock: SharedClock,
}

impl SearchEngine {
    pub fn new(transport: Arc<dyn Transport>, clock: SharedClock) -> Self {
        Self { transport, clock }
    }

    #[instrument(skip(self, search, opts))]
    pub async fn recall(&self, search: Option<&str>, opts: RecallOptions) -> Result<MemoryResultList> {
        let search = search.filter(|s| !s.is_empty());

        if search.is_some() && search == Some("*") {
            return Err(MuninnError::InvalidArgument(
                "the bare wildcard query `*` is not allowed".into(),
            ));
        }

        let memories = if opts.fetch_all || search.is_none() {
            self.recall_no_search(&opts).await
        } else {
            self.recall_search(search.unwrap(), &opts).await
        };

        let memories = match memories {
            Ok(m) => m,
            Err(err) if opts.strict => return Err(err),
            Err(_) => return Ok(MemoryResultList::empty()),
        };

        self.bookkeep(&memories, opts.auto_strengthen);

        // `raw=true` still returns a MemoryResultList; `MemoryResult::to_dict`
        // already gives callers the plain-map view that flag asks for.
        Ok(memories.into_iter().map(MemoryResult::new).collect())
    }

    pub async fn recall_since(&self, search: Option<&str>, since: DateTime<Utc>, mut opts: RecallOptions) -> Result<MemoryResultList> {
        opts.since = Some(since);
        self.recall(search, opts).await
    }

    pub async fn recall_between(
        &self,
        search: Option<&str>,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
        mut opts: RecallOptions,
    ) -> Result<MemoryResultList> {
        opts.since = Some(since);
        opts.until = Some(until);
        self.recall(search, opts).await
    }

    async fn recall_no_search(&self, opts: &RecallOptions) -> Result<Vec<Memory>> {
        let n = opts.effective_n();
        let limit = Value::Integer(n as i64);

        let rows = if let Some(session_id) = &opts.session_id {
            self.transport
                .exec_one(Statement::new(
                    sql::MEMORY_LIST_BY_SESSION,
                    vec![session_id.clone().into(), limit],
                ))
                .await?
        } else {
            match (opts.since, opts.until) {
                (Some(since), Some(until)) => {
                    self.transport
                        .exec_one(Statement::new(
                            sql::MEMORY_LIST_BETWEEN,
                            vec![since.to_rfc3339().into(), until.to_rfc3339().into(), limit],
                        ))
                        .await?
                }
                (Some(since), None) => {
                    self.transport
                        .exec_one(Statement::new(
                            sql::MEMORY_LIST_SINCE,
                            vec![since.to_rfc3339().into(), limit],
                        ))
                        .await?
                }
                _ => {
                    self.transport
                        .exec_one(Statement::new(sql::MEMORY_LIST_RECENT, vec![limit]))
                        .await?
                }
            }
        };

        let memories: Vec<Memory> = rows.iter().map(Memory::from_row).collect::<Result<_>>()?;
        Ok(apply_filters(memories, opts))
    }

    async fn recall_search(&self, search: &str, opts: &RecallOptions) -> Result<Vec<Memory>> {
        let n = opts.effective_n();
        let safe_query = sanitize_fts_query(search);

        let fts_rows = self
            .transport
            .exec_one(Statement::new(
                sql::MEMORY_FTS_SEARCH,
                vec![safe_query.into(), Value::Integer(n.max(32) as i64)],
            ))
            .await;

        let (mut scored, used_fallback) = match fts_rows {
            Ok(rows) => (self.score_fts_rows(&rows, opts.episodic)?, false),
            Err(err) => {
                warn!(%err, "FTS search failed, falling back to LIKE");
                let like_rows = self.like_fallback(search, n).await?;
                let memories: Vec<Memory> = like_rows.iter().map(Memory::from_row).collect::<Result<_>>()?;
                (memories.into_iter().map(|m| (0.0, m)).collect(), true)
            }
        };

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        // Query expansion: below-threshold result counts get a secondary
        // tag-based fetch merged in, deduped by id, primary order preserved.
        if !used_fallback && scored.len() < opts.expansion_threshold {
            let extracted_tags: Vec<String> = scored
                .iter()
                .flat_map(|(_, m)| m.tags.iter().cloned())
                .collect();
            if !extracted_tags.is_empty() {
                let mut expand_opts = opts.clone();
                expand_opts.tags_any = extracted_tags;
                expand_opts.tag_mode = TagMode::Any;
                expand_opts.tags.clear();
                expand_opts.tags_all.clear();
                let expanded = self.recall_no_search(&expand_opts).await.unwrap_or_default();
                let mut seen: std::collections::HashSet<String> =
                    scored.iter().map(|(_, m)| m.id.clone()).collect();
                for memory in expanded {
                    if seen.insert(memory.id.clone()) {
                        scored.push((0.0, memory));
                    }
                }
            }
        }

        let memories: Vec<Memory> = scored.into_iter().map(|(_, m)| m).collect();
        Ok(apply_filters(memories, opts))
    }

    async fn like_fallback(&self, search: &str, n: usize) -> Result<crate::transport::Rows> {
        let pattern = format!("%{}%", search.replace('%', ""));
        Ok(self
            .transport
            .exec_one(Statement::new(
                sql::MEMORY_LIKE_FALLBACK,
                vec![pattern.clone().into(), pattern.into(), Value::Integer(n as i64)],
            ))
            .await?)
    }

    fn score_fts_rows(&self, rows: &crate::transport::Rows, episodic: bool) -> Result<Vec<(f64, Memory)>> {
        let now = self.clock.now();
        rows.iter()
            .map(|row| {
                let memory = Memory::from_row(row)?;
                let rank = row.real_opt("rank").unwrap_or(0.0);
                let reference = memory.last_accessed.unwrap_or(memory.t);
                let age = ranking::age_days(now, reference);
                let access_count = episodic.then_some(memory.access_count);
                let score = ranking::composite_score(-rank, memory.priority, age, access_count);
                Ok((score, memory))
            })
            .collect()
    }

    /// Proactive surfacing from free-form context.
    pub async fn recall_hints(
        &self,
        context: Option<&str>,
        terms: &[String],
        include_tags: bool,
        include_summaries: bool,
        min_matches: usize,
    ) -> Result<Vec<HintStub>> {
        let candidates = hints::candidate_terms(context, terms);
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let query = candidates.join(" OR ");
        let rows = self
            .transport
            .exec_one(Statement::new(
                sql::MEMORY_FTS_SEARCH,
                vec![query.into(), Value::Integer(64)],
            ))
            .await?;

        let mut scored: Vec<(usize, Memory)> = rows
            .iter()
            .map(Memory::from_row)
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .map(|m| (hints::score_stub(&m, &candidates, include_tags, include_summaries), m))
            .filter(|(score, _)| *score >= min_matches)
            .collect();

        scored.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.t.cmp(&a.1.t)));
        Ok(scored.iter().map(|(_, m)| hints::to_stub(m)).collect())
    }

    /// Posts access bookkeeping asynchronously; failures never affect the
    /// already-returned result.
    fn bookkeep(&self, memories: &[Memory], auto_strengthen: bool) {
        if memories.is_empty() {
            return;
        }
        let transport = self.transport.clone();
        let clock = self.clock.clone();
        let ids: Vec<String> = memories.iter().map(|m| m.id.clone()).collect();
        tokio::spawn(async move {
            let now = clock.now();
            for id in ids {
                let _ = transport
                    .exec_one(Statement::new(
                        sql::MEMORY_RECORD_ACCESS,
                        vec![now.to_rfc3339().into(), id.clone().into()],
                    ))
                    .await;
                if auto_strengthen {
                    // Priority bump is read-modify-write; a lost race here
                    // only under- or over-counts a strengthen, never
                    // corrupts the record (best-effort).
                    if let Ok(rows) = transport
                        .exec_one(Statement::new(sql::MEMORY_GET_BY_ID, vec![id.clone().into()]))
                        .await
                    {
                        if let Some(row) = rows.iter().next() {
                            if let Ok(priority) = row.integer("priority") {
                                let bumped = (priority + 1).clamp(-1, 2);
                                let _ = transport
                                    .exec_one(Statement::new(
                                        sql::MEMORY_SET_PRIORITY,
                                        vec![bumped.into(), now.to_rfc3339().into(), id.into()],
                                    ))
                                    .await;
                            }
                        }
                    }
                }
            }
        });
    }
}

fn apply_filters(memories: Vec<Memory>, opts: &RecallOptions) -> Vec<Memory> {
    let tags_all = opts.all_tags_all();
    let tags_any = opts.all_tags_any();

    memories
        .into_iter()
        .filter(|m| !m.is_deleted())
        .filter(|m| opts.r#type.map(|t| t == m.r#type).unwrap_or(true))
        .filter(|m| opts.conf_min.map(|min| m.confidence.unwrap_or(0.0) >= min).unwrap_or(true))
        .filter(|m| tags_all.is_empty() || tags_all.iter().all(|t| m.tags.iter().any(|mt| mt == t)))
        .filter(|m| tags_any.is_empty() || tags_any.iter().any(|t| m.tags.iter().any(|mt| mt == t)))
        .take(opts.effective_n())
        .collect()
}

/// Escapes FTS operator injection: quoted phrases pass through verbatim;
/// unquoted tokens are individually quoted so boolean/NEAR operators in
/// user input can't change query semantics.
fn sanitize_fts_query(raw: &str) -> String {
    if raw.contains('"') {
        return raw.to_string();
    }
    raw.split_whitespace()
        .map(|tok| format!("\"{}\"", tok.replace('"', "")))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigStore;
    use crate::memory::{MemoryStore, RememberOptions};
    use crate::time::SystemClock;
    use crate::transport::test_support::MockTransport;

    fn engine_and_store() -> (SearchEngine, MemoryStore) {
        let transport: Arc<dyn Transport> = Arc::new(MockTransport::new());
        let clock: SharedClock = Arc::new(SystemClock);
        let config = Arc::new(ConfigStore::new(transport.clone(), clock.clone()));
        let store = MemoryStore::new(transport.clone(), clock.clone(), config);
        let engine = SearchEngine::new(transport, clock);
        (engine, store)
    }

    #[tokio::test]
    async fn wildcard_query_is_rejected() {
        let (engine, _store) = engine_and_store();
        let err = engine.recall(Some("*"), RecallOptions::new()).await.unwrap_err();
        assert!(matches!(err, MuninnError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn fetch_all_orders_by_priority_then_recency() {
        let (engine, store) = engine_and_store();
        let mut low = RememberOptions::new();
        low.priority = 0;
        store.remember("alpha beta", MemoryType::World, low).await.unwrap();
        let mut high = RememberOptions::new();
        high.priority = 2;
        store.remember("alpha beta", MemoryType::World, high).await.unwrap();

        let mut opts = RecallOptions::new();
        opts.fetch_all = true;
        let results = engine.recall(None, opts).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].inner().priority, 2);
    }

    #[tokio::test]
    async fn higher_priority_wins_search_mode_tie() {
        let (engine, store) = engine_and_store();
        let mut low = RememberOptions::new();
        low.priority = 0;
        store.remember("alpha beta", MemoryType::World, low).await.unwrap();
        let mut high = RememberOptions::new();
        high.priority = 2;
        store.remember("alpha beta", MemoryType::World, high).await.unwrap();

        let results = engine.recall(Some("alpha beta"), RecallOptions::new()).await.unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].inner().priority, 2);
    }

    #[tokio::test]
    async fn episodic_flag_reorders_equally_relevant_ties_by_access_count() {
        let (engine, store) = engine_and_store();
        let rarely_accessed = store
            .remember("alpha beta gamma", MemoryType::World, RememberOptions::new())
            .await
            .unwrap();
        let frequently_accessed = store
            .remember("alpha beta gamma", MemoryType::World, RememberOptions::new())
            .await
            .unwrap();

        for _ in 0..20 {
            engine
                .transport
                .exec_one(Statement::new(
                    sql::MEMORY_RECORD_ACCESS,
                    vec![chrono::Utc::now().to_rfc3339().into(), frequently_accessed.clone().into()],
                ))
                .await
                .unwrap();
        }

        let mut episodic_opts = RecallOptions::new();
        episodic_opts.episodic = true;
        let boosted = engine.recall(Some("alpha beta gamma"), episodic_opts).await.unwrap();

        assert_eq!(boosted.len(), 2);
        assert_eq!(boosted[0].id(), frequently_accessed);
        assert_eq!(boosted[1].id(), rarely_accessed);
    }

    #[tokio::test]
    async fn tag_expansion_merges_below_threshold_results() {
        let (engine, store) = engine_and_store();
        for _ in 0..4 {
            let mut opts = RememberOptions::new();
            opts.tags = vec!["kafka".into(), "streams".into()];
            store.remember("unrelated text", MemoryType::World, opts).await.unwrap();
        }
        let mut direct = RememberOptions::new();
        direct.tags = vec!["kafka".into(), "ops".into()];
        store
            .remember("kafka consumer lag", MemoryType::World, direct)
            .await
            .unwrap();

        let mut opts = RecallOptions::new();
        opts.n = Some(10);
        opts.expansion_threshold = 3;
        let results = engine.recall(Some("kafka consumer"), opts).await.unwrap();
        assert!(results.len() >= 5);
        assert_eq!(results[0].inner().summary, "kafka consumer lag");
    }
}
