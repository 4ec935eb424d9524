//! Handoff: tag-conventional cross-environment task
//! markers. A pending handoff is any memory carrying both `handoff` and
//! `pending`; completing one supersedes it with a record tagged `handoff` +
//! `completed`, which drops `pending` simply by not carrying it forward.

use std::sync::Arc;

use serde_json::{Map, Value as Json};
use tracing::instrument;

use crate::error::Result;
use crate::memory::{Memory, MemoryStore, MemoryType, RefEntry, RememberOptions};
use crate::search::{RecallOptions, SearchEngine, TagMode};
use crate::time::SharedClock;
use crate::transport::Transport;

const HANDOFF_TAG: &str = "handoff";
const PENDING_TAG: &str = "pending";
const COMPLETED_TAG: &str = "completed";
const VERSION_KEY: &str = "version";

/// Upper bound on how many pending handoffs a single query surfaces.
const PENDING_SCAN_LIMIT: usize = 1000;

pub struct Handoff {
    store: Arc<MemoryStore>,
    transport: Arc<dyn Transport>,
    clock: SharedClock,
}

impl Handoff {
    pub fn new(store: Arc<MemoryStore>, transport: Arc<dyn Transport>, clock: SharedClock) -> Self {
        Self { store, transport, clock }
    }

    fn search(&self) -> SearchEngine {
        SearchEngine::new(self.transport.clone(), self.clock.clone())
    }

    /// Memories carrying both `handoff` and `pending`.
    #[instrument(skip(self))]
    pub async fn handoff_pending(&self) -> Result<Vec<Memory>> {
        let mut opts = RecallOptions::new();
        opts.tags_all = vec![HANDOFF_TAG.to_string(), PENDING_TAG.to_string()];
        opts.tag_mode = TagMode::All;
        opts.n = Some(PENDING_SCAN_LIMIT);
        let results = self.search().recall(None, opts).await?;
        Ok(results.iter().map(|r| r.inner().clone()).collect())
    }

    /// Supersedes a pending handoff with a completion record tagged
    /// `handoff` + `completed`; the predecessor is soft-deleted by
    /// `supersede`, which is how `pending` stops applying.
    #[instrument(skip(self, notes, version))]
    pub async fn handoff_complete(&self, id: &str, notes: &str, version: Option<&str>) -> Result<String> {
        let mut refs = Vec::new();
        if let Some(version) = version {
            let mut map = Map::new();
            map.insert(VERSION_KEY.to_string(), Json::String(version.to_string()));
            refs.push(RefEntry::Other(map));
        }

        let opts = RememberOptions {
            tags: vec![HANDOFF_TAG.to_string(), COMPLETED_TAG.to_string()],
            refs,
            sync: true,
            ..RememberOptions::new()
        };
        self.store.supersede(id, notes, MemoryType::Interaction, opts).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigStore;
    use crate::time::SystemClock;
    use crate::transport::test_support::MockTransport;

    fn handoff() -> Handoff {
        let transport: Arc<dyn Transport> = Arc::new(MockTransport::new());
        let clock: SharedClock = Arc::new(SystemClock);
        let config = Arc::new(ConfigStore::new(transport.clone(), clock.clone()));
        let store = Arc::new(MemoryStore::new(transport.clone(), clock.clone(), config));
        Handoff::new(store, transport, clock)
    }

    #[tokio::test]
    async fn pending_handoffs_require_both_tags() {
        let handoff = handoff();
        let mut opts = RememberOptions::new();
        opts.tags = vec!["handoff".into(), "pending".into()];
        handoff.store.remember("deploy the new indexer", MemoryType::Procedure, opts).await.unwrap();

        let mut unrelated = RememberOptions::new();
        unrelated.tags = vec!["handoff".into()];
        handoff.store.remember("just a handoff tag", MemoryType::Procedure, unrelated).await.unwrap();

        let pending = handoff.handoff_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].summary, "deploy the new indexer");
    }

    #[tokio::test]
    async fn completing_a_handoff_removes_it_from_pending() {
        let handoff = handoff();
        let mut opts = RememberOptions::new();
        opts.tags = vec!["handoff".into(), "pending".into()];
        let id = handoff.store.remember("rotate the credentials", MemoryType::Procedure, opts).await.unwrap();

        let completed_id = handoff.handoff_complete(&id, "rotated, verified with a test login", Some("v2")).await.unwrap();
        assert_ne!(completed_id, id);

        let pending = handoff.handoff_pending().await.unwrap();
        assert!(pending.is_empty());

        let completed = handoff.store.get(&completed_id).await.unwrap().unwrap();
        assert!(completed.tags.contains(&"completed".to_string()));
        assert!(!completed.tags.contains(&"pending".to_string()));
    }
}
