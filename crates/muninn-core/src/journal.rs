//! Journal: append-only compact session notes stored
//! as `journal`-category config entries.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::instrument;

use crate::config::{ConfigCategory, ConfigEntry, ConfigStore, SetOptions};
use crate::error::Result;
use crate::sql;
use crate::time::SharedClock;
use crate::transport::{Statement, Transport};

/// Entries beyond this count are pruned by a default `journal_prune` call.
pub const DEFAULT_KEEP: usize = 40;

const DEFAULT_RECENT: usize = 10;

pub struct Journal {
    transport: Arc<dyn Transport>,
    clock: SharedClock,
    config: Arc<ConfigStore>,
    // The last key-bearing instant issued, so two calls landing on the same
    // clock reading (notably under a test `FixedClock`) still sort apart
    // without breaking the `j-YYYYMMDD-HHMMSS-µµµµµµ` key pattern.
    last: std::sync::Mutex<Option<DateTime<Utc>>>,
}

impl Journal {
    pub fn new(transport: Arc<dyn Transport>, clock: SharedClock, config: Arc<ConfigStore>) -> Self {
        Self {
            transport,
            clock,
            config,
            last: std::sync::Mutex::new(None),
        }
    }

    /// Appends a journal entry keyed `j-YYYYMMDD-HHMMSS-µµµµµµ`.
    #[instrument(skip(self, user_stated, my_intent))]
    pub async fn journal(
        &self,
        topics: &[String],
        user_stated: Option<&str>,
        my_intent: Option<&str>,
    ) -> Result<String> {
        let now = {
            let mut last = self.last.lock().unwrap();
            let mut stamp = self.clock.now();
            if let Some(prev) = *last {
                if stamp <= prev {
                    stamp = prev + Duration::microseconds(1);
                }
            }
            *last = Some(stamp);
            stamp
        };
        let key = now.format("j-%Y%m%d-%H%M%S-%6f").to_string();

        let mut parts = Vec::new();
        if !topics.is_empty() {
            parts.push(format!("topics: {}", topics.join(",")));
        }
        if let Some(user_stated) = user_stated {
            parts.push(format!("user_stated: {user_stated}"));
        }
        if let Some(my_intent) = my_intent {
            parts.push(format!("my_intent: {my_intent}"));
        }
        let value = parts.join(" | ");

        self.config
            .set(&key, &value, ConfigCategory::Journal, SetOptions {
                boot_load: true,
                ..Default::default()
            })
            .await?;
        Ok(key)
    }

    /// The newest `n` journal entries, most recent first.
    pub async fn journal_recent(&self, n: usize) -> Result<Vec<ConfigEntry>> {
        let n = if n == 0 { DEFAULT_RECENT } else { n };
        let rows = self
            .transport
            .exec_one(Statement::new(sql::CONFIG_LIST_JOURNAL_RECENT, vec![(n as i64).into()]))
            .await?;
        rows.iter().map(ConfigEntry::from_row).collect()
    }

    /// Deletes journal entries older than the `keep` most recent, oldest
    /// first, returning how many were removed.
    pub async fn journal_prune(&self, keep: usize) -> Result<usize> {
        let keep = if keep == 0 { DEFAULT_KEEP } else { keep };
        let candidates = self
            .transport
            .exec_one(Statement::new(sql::CONFIG_LIST_JOURNAL_PRUNE_CANDIDATES, vec![(keep as i64).into()]))
            .await?;

        let keys: Vec<String> = candidates.iter().map(|row| row.text("key")).collect::<Result<_, _>>()?;
        for key in &keys {
            self.config.delete(key).await?;
        }
        Ok(keys.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::{FixedClock, SystemClock};
    use crate::transport::test_support::MockTransport;
    use chrono::Utc;

    fn journal() -> Journal {
        let transport: Arc<dyn Transport> = Arc::new(MockTransport::new());
        let clock: SharedClock = Arc::new(SystemClock);
        let config = Arc::new(ConfigStore::new(transport.clone(), clock.clone()));
        Journal::new(transport, clock, config)
    }

    #[tokio::test]
    async fn journal_entries_come_back_newest_first() {
        let journal = journal();
        journal.journal(&["alpha".to_string()], None, None).await.unwrap();
        journal.journal(&["beta".to_string()], None, None).await.unwrap();
        journal.journal(&["gamma".to_string()], None, None).await.unwrap();

        let recent = journal.journal_recent(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert!(recent[0].key > recent[1].key);
    }

    #[tokio::test]
    async fn prune_keeps_only_the_newest_entries() {
        let journal = journal();
        for i in 0..5 {
            journal.journal(&[format!("topic-{i}")], None, None).await.unwrap();
        }
        let removed = journal.journal_prune(2).await.unwrap();
        assert_eq!(removed, 3);
        let remaining = journal.journal_recent(10).await.unwrap();
        assert_eq!(remaining.len(), 2);
    }

    #[tokio::test]
    async fn keys_are_unique_even_within_the_same_tick() {
        let clock: SharedClock = Arc::new(FixedClock::new(Utc::now()));
        let transport: Arc<dyn Transport> = Arc::new(MockTransport::new());
        let config = Arc::new(ConfigStore::new(transport.clone(), clock.clone()));
        let journal = Journal::new(transport, clock, config);

        let a = journal.journal(&["a".to_string()], None, None).await.unwrap();
        let b = journal.journal(&["b".to_string()], None, None).await.unwrap();
        assert_ne!(a, b, "keys sharing the same clock reading must still sort apart");
    }

    #[tokio::test]
    async fn key_follows_the_declared_pattern() {
        let journal = journal();
        let key = journal.journal(&["alpha".to_string()], None, None).await.unwrap();
        assert_eq!(key.len(), "j-20260101-120000-123456".len());
        assert!(key.starts_with("j-"));
    }
}
