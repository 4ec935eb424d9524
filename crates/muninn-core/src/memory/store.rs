//! Memory Store: the single writer/reader of `memories` rows.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use serde_json::Value as Json;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::config::{ConfigCategory, ConfigStore, SetOptions};
use crate::error::{MuninnError, Result};
use crate::sql;
use crate::time::SharedClock;
use crate::transport::{Statement, Transport, Value};

use super::{clamp_priority, ExportData, ExportRecord, Memory, MemoryType, RefEntry};

/// Config key that accumulates every tag ever seen, so novel tags can be
/// surfaced without a caller having to enumerate the tag space up front.
pub const RECALL_TRIGGERS_KEY: &str = "recall-triggers";

/// Optional arguments to [`MemoryStore::remember`].
#[derive(Debug, Clone, Default)]
pub struct RememberOptions {
    pub tags: Vec<String>,
    pub conf: Option<f64>,
    pub refs: Vec<RefEntry>,
    pub priority: i64,
    pub valid_from: Option<chrono::DateTime<chrono::Utc>>,
    pub session_id: Option<String>,
    pub alternatives: Vec<(String, Option<String>)>,
    pub sync: bool,
}

impl RememberOptions {
    pub fn new() -> Self {
        Self {
            sync: true,
            ..Default::default()
        }
    }
}

/// A read-only summary pass over non-deleted memories, returned by
/// [`MemoryStore::curate`].
#[derive(Debug, Clone, Default)]
pub struct CurationReport {
    pub counts_by_type: Vec<(MemoryType, usize)>,
    pub oldest: Option<chrono::DateTime<chrono::Utc>>,
    pub newest: Option<chrono::DateTime<chrono::Utc>>,
    pub likely_stale_ids: Vec<String>,
}

pub struct MemoryStore {
    transport: Arc<dyn Transport>,
    clock: SharedClock,
    config: Arc<ConfigStore>,
}

impl MemoryStore {
    pub fn new(transport: Arc<dyn Transport>, clock: SharedClock, config: Arc<ConfigStore>) -> Self {
        Self {
            transport,
            clock,
            config,
        }
    }

    /// Inserts a record and returns its id.
    ///
    /// Always performs the write synchronously; the `sync=false` enqueue
    /// behavior lives one layer up, in [`crate::write::WritePipeline`], which
    /// pre-generates the id this method is handed so it can return the
    /// eventual id to the caller before the write lands.
    #[instrument(skip(self, what, opts))]
    pub async fn remember(&self, what: &str, ty: MemoryType, opts: RememberOptions) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        self.remember_with_id(id.clone(), what, ty, opts).await?;
        Ok(id)
    }

    pub async fn remember_with_id(
        &self,
        id: String,
        what: &str,
        ty: MemoryType,
        opts: RememberOptions,
    ) -> Result<()> {
        if let Some(conf) = opts.conf {
            if !(0.0..=1.0).contains(&conf) {
                return Err(MuninnError::InvalidConfidence(conf));
            }
        }

        let confidence = opts.conf.or_else(|| ty.default_confidence());
        let priority = clamp_priority(opts.priority);
        let now = self.clock.now();

        let mut refs = Vec::with_capacity(opts.alternatives.len() + opts.refs.len());
        for (option, rejected) in opts.alternatives {
            refs.push(RefEntry::alternative(option, rejected));
        }
        refs.extend(opts.refs);

        for r in &refs {
            if r.as_id() == Some(id.as_str()) {
                return Err(MuninnError::RefCycleAttempt(id));
            }
        }

        self.register_novel_tags(&opts.tags).await;

        let tags_json = serde_json::to_string(&opts.tags)?;
        let refs_json = serde_json::to_string(&refs)?;

        self.transport
            .exec_one(Statement::new(
                sql::MEMORY_INSERT,
                vec![
                    id,
                    ty.as_str().to_string().into(),
                    now.to_rfc3339().into(),
                    what.to_string().into(),
                    Value::from(confidence),
                    tags_json.into(),
                    refs_json.into(),
                    priority.into(),
                    Value::from(opts.session_id),
                    Value::from(opts.valid_from.map(|t| t.to_rfc3339())),
                    0i64.into(),
                    Value::Null,
                    Value::Null,
                    now.to_rfc3339().into(),
                    now.to_rfc3339().into(),
                ],
            ))
            .await?;
        Ok(())
    }

    /// Groups writes via `exec_batch`.
    pub async fn remember_batch(
        &self,
        items: Vec<(String, MemoryType, RememberOptions)>,
    ) -> Result<Vec<String>> {
        let mut ids = Vec::with_capacity(items.len());
        let mut statements = Vec::with_capacity(items.len());
        let now = self.clock.now();

        for (what, ty, opts) in items {
            if let Some(conf) = opts.conf {
                if !(0.0..=1.0).contains(&conf) {
                    return Err(MuninnError::InvalidConfidence(conf));
                }
            }
            let id = Uuid::new_v4().to_string();
            let confidence = opts.conf.or_else(|| ty.default_confidence());
            let priority = clamp_priority(opts.priority);

            let mut refs = Vec::with_capacity(opts.alternatives.len() + opts.refs.len());
            for (option, rejected) in opts.alternatives {
                refs.push(RefEntry::alternative(option, rejected));
            }
            refs.extend(opts.refs);
            self.register_novel_tags(&opts.tags).await;

            statements.push(Statement::new(
                sql::MEMORY_INSERT,
                vec![
                    id.clone(),
                    ty.as_str().to_string().into(),
                    now.to_rfc3339().into(),
                    what.into(),
                    Value::from(confidence),
                    serde_json::to_string(&opts.tags)?.into(),
                    serde_json::to_string(&refs)?.into(),
                    priority.into(),
                    Value::from(opts.session_id),
                    Value::from(opts.valid_from.map(|t| t.to_rfc3339())),
                    0i64.into(),
                    Value::Null,
                    Value::Null,
                    now.to_rfc3339().into(),
                    now.to_rfc3339().into(),
                ],
            ));
            ids.push(id);
        }

        let results = self.transport.exec_batch(statements).await?;
        for result in results {
            result?;
        }
        Ok(ids)
    }

    /// Like [`Self::remember_batch`], but for callers (the write pipeline)
    /// that already committed to an id before the batch was assembled.
    pub(crate) async fn apply_batch_with_ids(
        &self,
        jobs: Vec<(String, String, MemoryType, RememberOptions)>,
    ) -> Result<()> {
        let mut statements = Vec::with_capacity(jobs.len());
        let now = self.clock.now();

        for (id, what, ty, opts) in jobs {
            if let Some(conf) = opts.conf {
                if !(0.0..=1.0).contains(&conf) {
                    return Err(MuninnError::InvalidConfidence(conf));
                }
            }
            let confidence = opts.conf.or_else(|| ty.default_confidence());
            let priority = clamp_priority(opts.priority);

            let mut refs = Vec::with_capacity(opts.alternatives.len() + opts.refs.len());
            for (option, rejected) in opts.alternatives {
                refs.push(RefEntry::alternative(option, rejected));
            }
            refs.extend(opts.refs);
            self.register_novel_tags(&opts.tags).await;

            statements.push(Statement::new(
                sql::MEMORY_INSERT,
                vec![
                    id,
                    ty.as_str().to_string().into(),
                    now.to_rfc3339().into(),
                    what.into(),
                    Value::from(confidence),
                    serde_json::to_string(&opts.tags)?.into(),
                    serde_json::to_string(&refs)?.into(),
                    priority.into(),
                    Value::from(opts.session_id),
                    Value::from(opts.valid_from.map(|t| t.to_rfc3339())),
                    0i64.into(),
                    Value::Null,
                    Value::Null,
                    now.to_rfc3339().into(),
                    now.to_rfc3339().into(),
                ],
            ));
        }

        let results = self.transport.exec_batch(statements).await?;
        for result in results {
            result?;
        }
        Ok(())
    }

    /// Soft-deletes a record. Idempotent: a second call is a silent no-op
    /// because the statement is scoped to `deleted_at IS NULL` (spec
    /// property 9).
    pub async fn forget(&self, id: &str) -> Result<()> {
        let now = self.clock.now();
        self.transport
            .exec_one(Statement::new(
                sql::MEMORY_SOFT_DELETE,
                vec![now.to_rfc3339().into(), now.to_rfc3339().into(), id.into()],
            ))
            .await?;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<Memory>> {
        let rows = self
            .transport
            .exec_one(Statement::new(sql::MEMORY_GET_BY_ID, vec![id.into()]))
            .await?;
        rows.iter().next().map(Memory::from_row).transpose()
    }

    async fn get_required(&self, id: &str) -> Result<Memory> {
        self.get(id).await?.ok_or_else(|| MuninnError::NotFound(id.to_string()))
    }

    /// Creates a new record whose `refs` begins with `original_id`,
    /// inheriting the predecessor's `t` as `valid_from`, then soft-deletes
    /// the predecessor.
    #[instrument(skip(self, summary, opts))]
    pub async fn supersede(
        &self,
        original_id: &str,
        summary: &str,
        ty: MemoryType,
        mut opts: RememberOptions,
    ) -> Result<String> {
        let original = self.get_required(original_id).await?;

        let mut refs = vec![RefEntry::id(original_id)];
        refs.append(&mut opts.refs);
        opts.refs = refs;
        opts.valid_from.get_or_insert(original.t);

        let new_id = self.remember(summary, ty, opts).await?;
        self.forget(original_id).await?;
        Ok(new_id)
    }

    pub async fn reprioritize(&self, id: &str, priority: i64) -> Result<()> {
        let priority = clamp_priority(priority);
        let now = self.clock.now();
        self.transport
            .exec_one(Statement::new(
                sql::MEMORY_SET_PRIORITY,
                vec![priority.into(), now.to_rfc3339().into(), id.into()],
            ))
            .await?;
        Ok(())
    }

    pub async fn strengthen(&self, id: &str, boost: i64) -> Result<()> {
        let current = self.get_required(id).await?;
        self.reprioritize(id, current.priority + boost).await
    }

    pub async fn weaken(&self, id: &str, drop: i64) -> Result<()> {
        let current = self.get_required(id).await?;
        self.reprioritize(id, current.priority - drop).await
    }

    /// BFS over `refs` ID-edges up to `min(depth, 10)` hops, cycle-safe.
    pub async fn get_chain(&self, id: &str, depth: usize) -> Result<Vec<(Memory, usize)>> {
        let max_depth = depth.min(10);
        let seed = self.get_required(id).await?;

        let mut visited = HashSet::new();
        visited.insert(seed.id.clone());
        let mut out = Vec::new();
        let mut queue: VecDeque<(Memory, usize)> = VecDeque::new();
        queue.push_back((seed, 0));

        while let Some((memory, chain_depth)) = queue.pop_front() {
            let next_depth = chain_depth + 1;
            let refs = memory.refs.clone();
            let current_id = memory.id.clone();
            out.push((memory, chain_depth));

            if next_depth > max_depth {
                continue;
            }
            for r in &refs {
                let Some(ref_id) = r.as_id() else { continue };
                if ref_id == current_id || visited.contains(ref_id) {
                    continue;
                }
                let Some(referenced) = self.get(ref_id).await? else {
                    continue;
                };
                // Non-seed soft-deleted nodes never appear in a chain traversal.
                if referenced.is_deleted() {
                    continue;
                }
                visited.insert(referenced.id.clone());
                queue.push_back((referenced, next_depth));
            }
        }

        Ok(out)
    }

    /// Projection of `refs` filtered to `type=="alternative"`.
    pub async fn get_alternatives(&self, id: &str) -> Result<Vec<(String, Option<String>)>> {
        let memory = self.get_required(id).await?;
        Ok(memory
            .alternatives()
            .into_iter()
            .map(|(option, rejected)| (option.to_string(), rejected.map(str::to_string)))
            .collect())
    }

    /// A read-only pass over non-deleted memories, optionally scoped to a
    /// session.
    pub async fn curate(&self, session_id: Option<&str>, min_priority: i64) -> Result<CurationReport> {
        let rows = match session_id {
            Some(session_id) => {
                self.transport
                    .exec_one(Statement::new(
                        sql::MEMORY_LIST_BY_SESSION,
                        vec![session_id.into(), Value::Integer(i64::MAX)],
                    ))
                    .await?
            }
            None => {
                self.transport
                    .exec_one(Statement::new(sql::MEMORY_LIST_RECENT, vec![Value::Integer(i64::MAX)]))
                    .await?
            }
        };

        let memories: Vec<Memory> = rows.iter().map(Memory::from_row).collect::<Result<_>>()?;
        let now = self.clock.now();
        let stale_cutoff = now - chrono::Duration::days(30);

        let mut counts: std::collections::BTreeMap<MemoryType, usize> = std::collections::BTreeMap::new();
        let mut oldest = None;
        let mut newest = None;
        let mut likely_stale_ids = Vec::new();

        for memory in &memories {
            *counts.entry(memory.r#type).or_insert(0) += 1;
            oldest = Some(oldest.map_or(memory.t, |o: chrono::DateTime<chrono::Utc>| o.min(memory.t)));
            newest = Some(newest.map_or(memory.t, |n: chrono::DateTime<chrono::Utc>| n.max(memory.t)));
            if memory.priority <= min_priority && memory.t < stale_cutoff {
                likely_stale_ids.push(memory.id.clone());
            }
        }

        Ok(CurationReport {
            counts_by_type: counts.into_iter().collect(),
            oldest,
            newest,
            likely_stale_ids,
        })
    }

    /// `get_chain` filtered to `type=="decision"`.
    pub async fn decision_trace(&self, id: &str, depth: usize) -> Result<Vec<(Memory, usize)>> {
        let chain = self.get_chain(id, depth).await?;
        Ok(chain
            .into_iter()
            .filter(|(m, _)| m.r#type == MemoryType::Decision)
            .collect())
    }

    /// Snapshots every record (including soft-deleted ones, so a restore can
    /// reproduce supersede chains) as the content fields spec property 8
    /// requires to round-trip byte-for-byte.
    pub async fn export(&self) -> Result<ExportData> {
        let rows = self
            .transport
            .exec_one(Statement::bare(sql::MEMORY_LIST_ALL_INCLUDING_DELETED))
            .await?;
        let memories = rows
            .iter()
            .map(Memory::from_row)
            .collect::<Result<Vec<_>>>()?;
        Ok(ExportData {
            memories: memories.iter().map(ExportRecord::from).collect(),
        })
    }

    /// Restores a snapshot produced by [`Self::export`].
    ///
    /// `merge=false` replaces the entire store with `data` (every existing
    /// record is deleted first); `merge=true` upserts each record by id,
    /// leaving records absent from `data` untouched. Bookkeeping fields not
    /// carried by [`ExportRecord`] (`access_count`, `last_accessed`,
    /// `deleted_at`) reset to their fresh-record defaults; `created_at` and
    /// `updated_at` are set to the record's own `t`.
    pub async fn import(&self, data: &ExportData, merge: bool) -> Result<usize> {
        if !merge {
            self.transport.exec_one(Statement::bare(sql::MEMORY_DELETE_ALL)).await?;
        }

        let mut statements = Vec::with_capacity(data.memories.len());
        for record in &data.memories {
            statements.push(Statement::new(
                sql::MEMORY_IMPORT_UPSERT,
                vec![
                    record.id.clone().into(),
                    record.r#type.as_str().to_string().into(),
                    record.t.to_rfc3339().into(),
                    record.summary.clone().into(),
                    Value::from(record.confidence),
                    serde_json::to_string(&record.tags)?.into(),
                    serde_json::to_string(&record.refs)?.into(),
                    clamp_priority(record.priority).into(),
                    Value::from(record.session_id.clone()),
                    Value::Null,
                    0i64.into(),
                    Value::Null,
                    Value::Null,
                    record.t.to_rfc3339().into(),
                    record.t.to_rfc3339().into(),
                ],
            ));
        }

        if statements.is_empty() {
            return Ok(0);
        }
        let count = statements.len();
        let results = self.transport.exec_batch(statements).await?;
        for result in results {
            result?;
        }
        Ok(count)
    }

    async fn register_novel_tags(&self, tags: &[String]) {
        if tags.is_empty() {
            return;
        }
        let existing = self.config.get(RECALL_TRIGGERS_KEY).await.ok().flatten();
        let mut known: Vec<String> = existing
            .as_deref()
            .and_then(|s| serde_json::from_str::<Json>(s).ok())
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();

        let mut changed = false;
        for tag in tags {
            if !known.iter().any(|t| t == tag) {
                known.push(tag.clone());
                changed = true;
            }
        }
        if !changed {
            return;
        }
        // Best-effort: a lost update under concurrent writers merely defers
        // tag registration, never corrupts state.
        if let Ok(value) = serde_json::to_string(&known) {
            if let Err(err) = self
                .config
                .set(RECALL_TRIGGERS_KEY, &value, ConfigCategory::Ops, SetOptions::default())
                .await
            {
                info!(%err, "novel-tag registration skipped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::SystemClock;
    use crate::transport::test_support::MockTransport;

    fn store() -> MemoryStore {
        let transport: Arc<dyn Transport> = Arc::new(MockTransport::new());
        let clock: SharedClock = Arc::new(SystemClock);
        let config = Arc::new(ConfigStore::new(transport.clone(), clock.clone()));
        MemoryStore::new(transport, clock, config)
    }

    #[tokio::test]
    async fn remember_then_get_round_trips_fields() {
        let store = store();
        let mut opts = RememberOptions::new();
        opts.tags = vec!["ui".into()];
        opts.conf = Some(0.9);
        let id = store
            .remember("User prefers dark mode", MemoryType::Decision, opts)
            .await
            .unwrap();

        let memory = store.get(&id).await.unwrap().unwrap();
        assert_eq!(memory.summary, "User prefers dark mode");
        assert_eq!(memory.confidence, Some(0.9));
        assert_eq!(memory.tags, vec!["ui".to_string()]);
    }

    #[tokio::test]
    async fn decision_gets_default_confidence_when_unset() {
        let store = store();
        let id = store
            .remember("a decision", MemoryType::Decision, RememberOptions::new())
            .await
            .unwrap();
        let memory = store.get(&id).await.unwrap().unwrap();
        assert_eq!(memory.confidence, Some(0.8));
    }

    #[tokio::test]
    async fn supersede_excludes_predecessor_and_links_refs() {
        let store = store();
        let a = store
            .remember("User prefers light mode", MemoryType::Decision, RememberOptions::new())
            .await
            .unwrap();
        let b = store
            .supersede(&a, "User prefers dark mode", MemoryType::Decision, RememberOptions::new())
            .await
            .unwrap();

        let a_record = store.get(&a).await.unwrap().unwrap();
        assert!(a_record.is_deleted());

        let b_record = store.get(&b).await.unwrap().unwrap();
        assert_eq!(b_record.refs.first().unwrap().as_id(), Some(a.as_str()));

        let chain = store.get_chain(&b, 3).await.unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].0.id, b);
        assert_eq!(chain[0].1, 0);
        assert_eq!(chain[1].0.id, a);
        assert_eq!(chain[1].1, 1);
    }

    #[tokio::test]
    async fn forget_twice_is_a_silent_no_op() {
        let store = store();
        let id = store
            .remember("transient", MemoryType::World, RememberOptions::new())
            .await
            .unwrap();
        store.forget(&id).await.unwrap();
        store.forget(&id).await.unwrap();
        assert!(store.get(&id).await.unwrap().unwrap().is_deleted());
    }

    #[tokio::test]
    async fn priority_mutators_stay_within_bounds() {
        let store = store();
        let id = store
            .remember("edge", MemoryType::World, RememberOptions::new())
            .await
            .unwrap();
        store.strengthen(&id, 10).await.unwrap();
        assert_eq!(store.get(&id).await.unwrap().unwrap().priority, 2);
        store.weaken(&id, 10).await.unwrap();
        assert_eq!(store.get(&id).await.unwrap().unwrap().priority, -1);
    }

    #[tokio::test]
    async fn export_then_import_restores_content_fields() {
        let store = store();
        let mut opts = RememberOptions::new();
        opts.tags = vec!["ui".into(), "dark-mode".into()];
        opts.conf = Some(0.9);
        opts.session_id = Some("s1".into());
        let id = store
            .remember("User prefers dark mode", MemoryType::Decision, opts)
            .await
            .unwrap();
        let original = store.get(&id).await.unwrap().unwrap();

        let data = store.export().await.unwrap();
        assert_eq!(data.memories.len(), 1);

        let fresh = store();
        let restored_count = fresh.import(&data, false).await.unwrap();
        assert_eq!(restored_count, 1);

        let restored = fresh.get(&id).await.unwrap().unwrap();
        assert_eq!(restored.summary, original.summary);
        assert_eq!(restored.tags, original.tags);
        assert_eq!(restored.refs, original.refs);
        assert_eq!(restored.r#type, original.r#type);
        assert_eq!(restored.confidence, original.confidence);
        assert_eq!(restored.priority, original.priority);
        assert_eq!(restored.t, original.t);
        assert_eq!(restored.session_id, original.session_id);
    }

    #[tokio::test]
    async fn import_without_merge_replaces_the_store() {
        let store = store();
        store
            .remember("will be wiped", MemoryType::World, RememberOptions::new())
            .await
            .unwrap();

        let mut opts = RememberOptions::new();
        opts.tags = vec!["kept".into()];
        let keep_id = store
            .remember("will survive export/import", MemoryType::World, opts)
            .await
            .unwrap();
        let data = store.export().await.unwrap();

        let fresh = store();
        let other_id = fresh
            .remember("pre-existing in target store", MemoryType::World, RememberOptions::new())
            .await
            .unwrap();
        fresh.import(&data, false).await.unwrap();

        assert!(fresh.get(&keep_id).await.unwrap().is_some());
        assert!(fresh.get(&other_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn import_with_merge_leaves_untouched_records_in_place() {
        let store = store();
        let exported_id = store
            .remember("exported record", MemoryType::World, RememberOptions::new())
            .await
            .unwrap();
        let data = store.export().await.unwrap();

        let fresh = store();
        let untouched_id = fresh
            .remember("not part of the import", MemoryType::World, RememberOptions::new())
            .await
            .unwrap();
        fresh.import(&data, true).await.unwrap();

        assert!(fresh.get(&exported_id).await.unwrap().is_some());
        assert!(fresh.get(&untouched_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn self_reference_is_rejected() {
        let store = store();
        let id = Uuid::new_v4().to_string();
        let mut opts = RememberOptions::new();
        opts.refs = vec![RefEntry::id(id.clone())];
        let err = store
            .remember_with_id(id.clone(), "bad", MemoryType::World, opts)
            .await
            .unwrap_err();
        assert!(matches!(err, MuninnError::RefCycleAttempt(_)));
    }
}
