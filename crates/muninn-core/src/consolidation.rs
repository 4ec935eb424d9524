//! Consolidation: clusters memories that share
//! a tag set into a single synthesis record, then demotes the sources to
//! background priority.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::instrument;

use crate::error::Result;
use crate::memory::{Memory, MemoryStore, MemoryType, RefEntry, RememberOptions};
use crate::search::{RecallOptions, SearchEngine, TagMode};
use crate::time::SharedClock;
use crate::transport::Transport;

/// Tags that don't count toward a shared-tag-set grouping key: process
/// markers rather than content the synthesis should cluster on.
const TRIVIAL_TAGS: &[&str] = &["session", "handoff", "pending", "completed", "consolidated", "utility-code"];

/// Priority sources are demoted to once folded into a synthesis memory.
const DEMOTED_PRIORITY: i64 = -1;

/// Upper bound on candidates considered per `consolidate` call.
const CANDIDATE_SCAN_LIMIT: usize = 1000;

const SUMMARY_SOURCE_HEAD_LEN: usize = 80;

#[derive(Debug, Clone)]
pub struct ConsolidationOptions {
    pub tags: Vec<String>,
    pub min_cluster: usize,
    pub dry_run: bool,
    pub session_id: Option<String>,
}

impl Default for ConsolidationOptions {
    fn default() -> Self {
        Self {
            tags: Vec::new(),
            min_cluster: 3,
            dry_run: true,
            session_id: None,
        }
    }
}

/// One cluster: its shared tag set, the sources it folds, and (when not a
/// dry run) the id of the synthesis memory created for it.
#[derive(Debug, Clone)]
pub struct ConsolidationGroup {
    pub tags: Vec<String>,
    pub source_ids: Vec<String>,
    pub summary: String,
    pub synthesis_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ConsolidationReport {
    pub groups: Vec<ConsolidationGroup>,
    pub dry_run: bool,
}

pub struct Consolidation {
    store: Arc<MemoryStore>,
    transport: Arc<dyn Transport>,
    clock: SharedClock,
}

impl Consolidation {
    pub fn new(store: Arc<MemoryStore>, transport: Arc<dyn Transport>, clock: SharedClock) -> Self {
        Self { store, transport, clock }
    }

    fn search(&self) -> SearchEngine {
        SearchEngine::new(self.transport.clone(), self.clock.clone())
    }

    #[instrument(skip(self, opts))]
    pub async fn consolidate(&self, opts: ConsolidationOptions) -> Result<ConsolidationReport> {
        let candidates = self.candidates(&opts).await?;
        let clustered = cluster_by_shared_tags(candidates, opts.min_cluster);

        let mut groups = Vec::with_capacity(clustered.len());
        for (tags, members) in clustered {
            let summary = synthesis_summary(&tags, &members);
            let source_ids: Vec<String> = members.iter().map(|m| m.id.clone()).collect();

            let synthesis_id = if opts.dry_run {
                None
            } else {
                let refs: Vec<RefEntry> = source_ids.iter().map(|id| RefEntry::id(id.clone())).collect();
                let remember_opts = RememberOptions {
                    tags: vec!["consolidated".to_string()],
                    refs,
                    sync: true,
                    ..RememberOptions::new()
                };
                let id = self.store.remember(&summary, MemoryType::World, remember_opts).await?;
                for source_id in &source_ids {
                    self.store.reprioritize(source_id, DEMOTED_PRIORITY).await?;
                }
                Some(id)
            };

            groups.push(ConsolidationGroup {
                tags,
                source_ids,
                summary,
                synthesis_id,
            });
        }

        Ok(ConsolidationReport {
            groups,
            dry_run: opts.dry_run,
        })
    }

    async fn candidates(&self, opts: &ConsolidationOptions) -> Result<Vec<Memory>> {
        let mut recall_opts = RecallOptions::new();
        recall_opts.n = Some(CANDIDATE_SCAN_LIMIT);
        recall_opts.session_id = opts.session_id.clone();
        if !opts.tags.is_empty() {
            recall_opts.tags_any = opts.tags.clone();
            recall_opts.tag_mode = TagMode::Any;
        }

        let results = self.search().recall(None, recall_opts).await?;
        Ok(results
            .iter()
            .map(|r| r.inner().clone())
            .filter(|m| m.priority != DEMOTED_PRIORITY)
            .filter(|m| !m.tags.iter().any(|t| t == "consolidated"))
            .collect())
    }
}

/// Groups candidates by their significant (non-trivial) tag set, keeping
/// only groups meeting `min_cluster`. The key is the sorted, deduped tag
/// list itself, so two candidates cluster only when they share exactly the
/// same significant tags.
fn cluster_by_shared_tags(candidates: Vec<Memory>, min_cluster: usize) -> Vec<(Vec<String>, Vec<Memory>)> {
    let mut grouped: BTreeMap<Vec<String>, Vec<Memory>> = BTreeMap::new();
    for memory in candidates {
        let mut significant: Vec<String> = memory
            .tags
            .iter()
            .filter(|t| !TRIVIAL_TAGS.contains(&t.as_str()))
            .cloned()
            .collect();
        significant.sort();
        significant.dedup();
        if significant.is_empty() {
            continue;
        }
        grouped.entry(significant).or_default().push(memory);
    }

    grouped.into_iter().filter(|(_, members)| members.len() >= min_cluster).collect()
}

fn synthesis_summary(tags: &[String], members: &[Memory]) -> String {
    let mut lines = vec![format!(
        "Consolidated {} records tagged [{}]:",
        members.len(),
        tags.join(", ")
    )];
    for member in members {
        let head: String = member.summary.chars().take(SUMMARY_SOURCE_HEAD_LEN).collect();
        lines.push(format!("- {}: {}", member.id, head));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigStore;
    use crate::time::SystemClock;
    use crate::transport::test_support::MockTransport;

    fn consolidation() -> Consolidation {
        let transport: Arc<dyn Transport> = Arc::new(MockTransport::new());
        let clock: SharedClock = Arc::new(SystemClock);
        let config = Arc::new(ConfigStore::new(transport.clone(), clock.clone()));
        let store = Arc::new(MemoryStore::new(transport.clone(), clock.clone(), config));
        Consolidation::new(store, transport, clock)
    }

    async fn seed_cluster(consolidation: &Consolidation, tag: &str, n: usize) {
        for i in 0..n {
            let mut opts = RememberOptions::new();
            opts.tags = vec![tag.to_string()];
            consolidation
                .store
                .remember(&format!("{tag} note {i}"), MemoryType::Experience, opts)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn dry_run_reports_a_plan_without_mutating() {
        let consolidation = consolidation();
        seed_cluster(&consolidation, "kafka-lag", 3).await;

        let report = consolidation
            .consolidate(ConsolidationOptions {
                dry_run: true,
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(report.groups.len(), 1);
        assert_eq!(report.groups[0].source_ids.len(), 3);
        assert!(report.groups[0].synthesis_id.is_none());

        for id in &report.groups[0].source_ids {
            let memory = consolidation.store.get(id).await.unwrap().unwrap();
            assert_eq!(memory.priority, 0, "dry run must not demote sources");
        }
    }

    #[tokio::test]
    async fn groups_below_min_cluster_are_dropped() {
        let consolidation = consolidation();
        seed_cluster(&consolidation, "rare-tag", 2).await;

        let report = consolidation
            .consolidate(ConsolidationOptions {
                min_cluster: 3,
                dry_run: true,
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(report.groups.is_empty());
    }

    #[tokio::test]
    async fn live_run_creates_synthesis_and_demotes_sources() {
        let consolidation = consolidation();
        seed_cluster(&consolidation, "outage-2026", 4).await;

        let report = consolidation
            .consolidate(ConsolidationOptions {
                dry_run: false,
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(report.groups.len(), 1);
        let group = &report.groups[0];
        let synthesis_id = group.synthesis_id.clone().unwrap();
        let synthesis = consolidation.store.get(&synthesis_id).await.unwrap().unwrap();
        assert_eq!(synthesis.r#type, MemoryType::World);
        assert!(synthesis.tags.contains(&"consolidated".to_string()));
        assert_eq!(synthesis.refs.len(), 4);

        for id in &group.source_ids {
            let memory = consolidation.store.get(id).await.unwrap().unwrap();
            assert_eq!(memory.priority, -1);
        }
    }
}
