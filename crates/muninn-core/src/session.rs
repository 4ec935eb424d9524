//! Session: session-save/resume markers layered on top of the memory store.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value as Json};
use tracing::instrument;

use crate::error::Result;
use crate::memory::{Memory, MemoryStore, MemoryType, RefEntry, RememberOptions};
use crate::search::{RecallOptions, SearchEngine, TagMode};
use crate::time::SharedClock;
use crate::transport::Transport;

const SESSION_TAG: &str = "session";
const CONTEXT_KEY: &str = "context";
const THERAPY_TAG: &str = "therapy";

/// Upper bound on records considered when locating the most recent
/// `therapy`-tagged record or counting what follows it.
const THERAPY_SCAN_LIMIT: usize = 1000;

/// How many of a session's most recent memories `session_resume` returns.
const RECENT_MEMORY_COUNT: usize = 10;

/// Maximum `session`-tagged markers scanned when listing known sessions.
const SESSIONS_SCAN_LIMIT: usize = 1000;

#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub summary: String,
    pub context: Option<String>,
    pub recent_memories: Vec<Memory>,
}

#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub session_id: String,
    pub summary: String,
    pub updated_at: DateTime<Utc>,
}

pub struct Session {
    store: Arc<MemoryStore>,
    transport: Arc<dyn Transport>,
    clock: SharedClock,
}

impl Session {
    pub fn new(store: Arc<MemoryStore>, transport: Arc<dyn Transport>, clock: SharedClock) -> Self {
        Self { store, transport, clock }
    }

    fn search(&self) -> SearchEngine {
        SearchEngine::new(self.transport.clone(), self.clock.clone())
    }

    /// Writes a `session`-tagged marker record for `session_id`.
    #[instrument(skip(self, summary, context))]
    pub async fn session_save(&self, session_id: &str, summary: &str, context: Option<&str>) -> Result<String> {
        let mut refs = Vec::new();
        if let Some(context) = context {
            let mut map = Map::new();
            map.insert(CONTEXT_KEY.to_string(), Json::String(context.to_string()));
            refs.push(RefEntry::Other(map));
        }

        let opts = RememberOptions {
            tags: vec![SESSION_TAG.to_string()],
            session_id: Some(session_id.to_string()),
            refs,
            sync: true,
            ..RememberOptions::new()
        };
        self.store.remember(summary, MemoryType::Interaction, opts).await
    }

    /// Reads the latest `session` marker (for `session_id` if given, else
    /// the most recent across all sessions) plus the newest memories
    /// belonging to that session.
    #[instrument(skip(self))]
    pub async fn session_resume(&self, session_id: Option<&str>) -> Result<Option<SessionRecord>> {
        let mut marker_opts = RecallOptions::new();
        marker_opts.tags_any = vec![SESSION_TAG.to_string()];
        marker_opts.n = Some(1);
        if let Some(session_id) = session_id {
            marker_opts.session_id = Some(session_id.to_string());
        }

        let markers = self.search().recall(None, marker_opts).await?;
        let Some(marker) = markers.iter().next() else {
            return Ok(None);
        };
        let marker = marker.inner();
        let resolved_session_id = marker.session_id.clone();
        let context = context_from_refs(&marker.refs);

        let mut recent_opts = RecallOptions::new();
        recent_opts.session_id = resolved_session_id;
        recent_opts.n = Some(RECENT_MEMORY_COUNT);
        let recent = self.search().recall(None, recent_opts).await?;

        Ok(Some(SessionRecord {
            summary: marker.summary.clone(),
            context,
            recent_memories: recent.iter().map(|r| r.inner().clone()).collect(),
        }))
    }

    /// Known session ids with their latest marker summary, newest first.
    #[instrument(skip(self))]
    pub async fn sessions(&self) -> Result<Vec<SessionSummary>> {
        let mut opts = RecallOptions::new();
        opts.tags_any = vec![SESSION_TAG.to_string()];
        opts.n = Some(SESSIONS_SCAN_LIMIT);
        let markers = self.search().recall(None, opts).await?;

        let mut latest: std::collections::HashMap<String, SessionSummary> = std::collections::HashMap::new();
        for result in markers.iter() {
            let memory = result.inner();
            let Some(session_id) = memory.session_id.clone() else {
                continue;
            };
            let candidate = SessionSummary {
                session_id: session_id.clone(),
                summary: memory.summary.clone(),
                updated_at: memory.t,
            };
            latest
                .entry(session_id)
                .and_modify(|existing| {
                    if candidate.updated_at > existing.updated_at {
                        *existing = candidate.clone();
                    }
                })
                .or_insert(candidate);
        }

        let mut sessions: Vec<SessionSummary> = latest.into_values().collect();
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(sessions)
    }

    /// Records created after the most recent `therapy`-tagged record, plus
    /// the cutoff instant itself. `None` when no `therapy`-tagged record
    /// exists yet "Therapy scope".
    #[instrument(skip(self))]
    pub async fn therapy_scope(&self) -> Result<Option<(DateTime<Utc>, Vec<Memory>)>> {
        let Some(cutoff) = self.latest_therapy_instant().await? else {
            return Ok(None);
        };
        let mut opts = RecallOptions::new();
        opts.n = Some(THERAPY_SCAN_LIMIT);
        // `recall_since` is inclusive of its bound; nudge past the therapy
        // marker itself so only what follows it is in scope.
        let after = cutoff + chrono::Duration::microseconds(1);
        let records = self.search().recall_since(None, after, opts).await?;
        Ok(Some((cutoff, records.iter().map(|r| r.inner().clone()).collect())))
    }

    /// Count of records created after the most recent `therapy`-tagged
    /// record. Zero when no `therapy`-tagged record exists.
    pub async fn therapy_session_count(&self) -> Result<usize> {
        Ok(self.therapy_scope().await?.map(|(_, records)| records.len()).unwrap_or(0))
    }

    async fn latest_therapy_instant(&self) -> Result<Option<DateTime<Utc>>> {
        let mut opts = RecallOptions::new();
        opts.tags_any = vec![THERAPY_TAG.to_string()];
        opts.tag_mode = TagMode::Any;
        opts.n = Some(1);
        let latest = self.search().recall(None, opts).await?;
        Ok(latest.iter().next().map(|r| r.inner().t))
    }
}

fn context_from_refs(refs: &[RefEntry]) -> Option<String> {
    refs.iter().find_map(|r| match r {
        RefEntry::Other(map) => map.get(CONTEXT_KEY).and_then(Json::as_str).map(str::to_string),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigStore;
    use crate::time::SystemClock;
    use crate::transport::test_support::MockTransport;

    fn session() -> Session {
        let transport: Arc<dyn Transport> = Arc::new(MockTransport::new());
        let clock: SharedClock = Arc::new(SystemClock);
        let config = Arc::new(ConfigStore::new(transport.clone(), clock.clone()));
        let store = Arc::new(MemoryStore::new(transport.clone(), clock.clone(), config));
        Session::new(store, transport, clock)
    }

    #[tokio::test]
    async fn resume_returns_latest_marker_and_its_context() {
        let session = session();
        session.session_save("sess-1", "first pass", Some("ctx-one")).await.unwrap();
        session.session_save("sess-1", "second pass", Some("ctx-two")).await.unwrap();

        let resumed = session.session_resume(Some("sess-1")).await.unwrap().unwrap();
        assert_eq!(resumed.summary, "second pass");
        assert_eq!(resumed.context.as_deref(), Some("ctx-two"));
    }

    #[tokio::test]
    async fn resume_with_no_session_id_finds_nothing_but_does_not_error() {
        let session = session();
        let resumed = session.session_resume(None).await.unwrap();
        assert!(resumed.is_none());
    }

    #[tokio::test]
    async fn sessions_lists_distinct_ids_with_latest_summary() {
        let session = session();
        session.session_save("sess-a", "a-old", None).await.unwrap();
        session.session_save("sess-b", "b-only", None).await.unwrap();
        session.session_save("sess-a", "a-new", None).await.unwrap();

        let sessions = session.sessions().await.unwrap();
        assert_eq!(sessions.len(), 2);
        let a = sessions.iter().find(|s| s.session_id == "sess-a").unwrap();
        assert_eq!(a.summary, "a-new");
    }

    #[tokio::test]
    async fn therapy_scope_is_none_without_a_therapy_tagged_record() {
        let session = session();
        let mut opts = RememberOptions::new();
        opts.tags = vec!["unrelated".into()];
        session.store.remember("just a note", MemoryType::Experience, opts).await.unwrap();

        assert!(session.therapy_scope().await.unwrap().is_none());
        assert_eq!(session.therapy_session_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn therapy_scope_counts_records_after_the_latest_therapy_tag() {
        let session = session();
        let mut before = RememberOptions::new();
        before.tags = vec!["unrelated".into()];
        session.store.remember("before therapy", MemoryType::Experience, before).await.unwrap();

        let mut marker = RememberOptions::new();
        marker.tags = vec!["therapy".into()];
        session.store.remember("therapy checkpoint", MemoryType::Interaction, marker).await.unwrap();

        for i in 0..3 {
            session
                .store
                .remember(&format!("after {i}"), MemoryType::Experience, RememberOptions::new())
                .await
                .unwrap();
        }

        assert_eq!(session.therapy_session_count().await.unwrap(), 3);
        let (_, records) = session.therapy_scope().await.unwrap().unwrap();
        assert_eq!(records.len(), 3);
    }
}
