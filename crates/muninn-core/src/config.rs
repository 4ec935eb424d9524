//! Config Store: CRUD over small, stable key/value entries.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::instrument;

use crate::error::{MuninnError, Result};
use crate::sql;
use crate::time::SharedClock;
use crate::transport::{Row, Statement, Transport, Value};

/// Declared config categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigCategory {
    Profile,
    Ops,
    Journal,
}

impl ConfigCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ConfigCategory::Profile => "profile",
            ConfigCategory::Ops => "ops",
            ConfigCategory::Journal => "journal",
        }
    }
}

impl std::fmt::Display for ConfigCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ConfigCategory {
    type Err = MuninnError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "profile" => Ok(ConfigCategory::Profile),
            "ops" => Ok(ConfigCategory::Ops),
            "journal" => Ok(ConfigCategory::Journal),
            other => Err(MuninnError::InvalidCategory(other.to_string())),
        }
    }
}

/// A config entry.
#[derive(Debug, Clone)]
pub struct ConfigEntry {
    pub key: String,
    pub value: String,
    pub category: ConfigCategory,
    pub char_limit: Option<usize>,
    pub read_only: bool,
    pub boot_load: bool,
    pub priority: i64,
    pub updated_at: DateTime<Utc>,
}

impl ConfigEntry {
    pub(crate) fn from_row(row: &Row) -> Result<Self> {
        let category = row.text("category")?.parse()?;
        Ok(Self {
            key: row.text("key")?,
            value: row.text("value")?,
            category,
            char_limit: row.real_opt("char_limit").map(|n| n as usize),
            read_only: row.integer("read_only").unwrap_or(0) != 0,
            boot_load: row.integer("boot_load").unwrap_or(0) != 0,
            priority: row.integer("priority").unwrap_or(0),
            updated_at: row
                .text("updated_at")?
                .parse()
                .unwrap_or_else(|_| Utc::now()),
        })
    }
}

/// Options accepted by `set` beyond the required positional arguments.
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    pub char_limit: Option<usize>,
    pub read_only: bool,
    pub boot_load: bool,
    pub priority: i64,
}

pub struct ConfigStore {
    transport: Arc<dyn Transport>,
    clock: SharedClock,
}

impl ConfigStore {
    pub fn new(transport: Arc<dyn Transport>, clock: SharedClock) -> Self {
        Self { transport, clock }
    }

    #[instrument(skip(self))]
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.get_entry(key).await?.map(|e| e.value))
    }

    pub async fn get_entry(&self, key: &str) -> Result<Option<ConfigEntry>> {
        let rows = self
            .transport
            .exec_one(Statement::new(sql::CONFIG_GET, vec![key.into()]))
            .await?;
        rows.iter().next().map(ConfigEntry::from_row).transpose()
    }

    /// Writes `key`. Fails with `ConfigReadOnly` if the existing record is
    /// read-only, or `CharLimitExceeded` if `opts.char_limit` (or the
    /// existing entry's limit) is violated.
    #[instrument(skip(self, value))]
    pub async fn set(
        &self,
        key: &str,
        value: &str,
        category: ConfigCategory,
        opts: SetOptions,
    ) -> Result<()> {
        self.set_inner(key, value, category, opts, false).await
    }

    /// Administrative escape hatch: writes `key` even if the existing
    /// record is `read_only`.
    pub async fn force_set(
        &self,
        key: &str,
        value: &str,
        category: ConfigCategory,
        opts: SetOptions,
    ) -> Result<()> {
        self.set_inner(key, value, category, opts, true).await
    }

    async fn set_inner(
        &self,
        key: &str,
        value: &str,
        category: ConfigCategory,
        opts: SetOptions,
        force: bool,
    ) -> Result<()> {
        if let Some(existing) = self.get_entry(key).await? {
            if existing.read_only && !force {
                return Err(MuninnError::ConfigReadOnly(key.to_string()));
            }
            let limit = opts.char_limit.or(existing.char_limit);
            if let Some(limit) = limit {
                let len = value.chars().count();
                if len > limit {
                    return Err(MuninnError::CharLimitExceeded {
                        key: key.to_string(),
                        len,
                        limit,
                    });
                }
            }
        } else if let Some(limit) = opts.char_limit {
            let len = value.chars().count();
            if len > limit {
                return Err(MuninnError::CharLimitExceeded {
                    key: key.to_string(),
                    len,
                    limit,
                });
            }
        }

        let now = self.clock.now();
        self.transport
            .exec_one(Statement::new(
                sql::CONFIG_UPSERT,
                vec![
                    key.into(),
                    value.into(),
                    category.as_str().into(),
                    Value::from(opts.char_limit.map(|n| n as i64)),
                    opts.read_only.into(),
                    opts.boot_load.into(),
                    opts.priority.into(),
                    now.to_rfc3339().into(),
                ],
            ))
            .await?;
        Ok(())
    }

    /// Updates only the `value` column, preserving other fields, using
    /// `CONFIG_SET_VALUE_ONLY` — used by journal append and novel-tag
    /// registration where the full upsert shape would clobber metadata set
    /// by an earlier `set` call.
    pub async fn set_value_only(&self, key: &str, value: &str) -> Result<()> {
        let now = self.clock.now();
        self.transport
            .exec_one(Statement::new(
                sql::CONFIG_SET_VALUE_ONLY,
                vec![value.into(), now.to_rfc3339().into(), key.into()],
            ))
            .await?;
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        self.transport
            .exec_one(Statement::new(sql::CONFIG_DELETE, vec![key.into()]))
            .await?;
        Ok(())
    }

    pub async fn set_boot_load(&self, key: &str, boot_load: bool) -> Result<()> {
        let now = self.clock.now();
        self.transport
            .exec_one(Statement::new(
                sql::CONFIG_SET_BOOT_LOAD,
                vec![boot_load.into(), now.to_rfc3339().into(), key.into()],
            ))
            .await?;
        Ok(())
    }

    pub async fn set_priority(&self, key: &str, priority: i64) -> Result<()> {
        let now = self.clock.now();
        self.transport
            .exec_one(Statement::new(
                sql::CONFIG_SET_PRIORITY,
                vec![priority.into(), now.to_rfc3339().into(), key.into()],
            ))
            .await?;
        Ok(())
    }

    pub async fn list(&self, category: Option<ConfigCategory>) -> Result<Vec<ConfigEntry>> {
        let rows = match category {
            Some(cat) => {
                self.transport
                    .exec_one(Statement::new(sql::CONFIG_LIST_BY_CATEGORY, vec![cat.as_str().into()]))
                    .await?
            }
            None => self.transport.exec_one(Statement::bare(sql::CONFIG_LIST_ALL)).await?,
        };
        rows.iter().map(ConfigEntry::from_row).collect()
    }

    pub async fn list_boot_load(&self, category: ConfigCategory) -> Result<Vec<ConfigEntry>> {
        let rows = self
            .transport
            .exec_one(Statement::new(
                sql::CONFIG_LIST_BOOT_LOAD_BY_CATEGORY,
                vec![category.as_str().into()],
            ))
            .await?;
        rows.iter().map(ConfigEntry::from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::{FixedClock, SystemClock};
    use crate::transport::test_support::MockTransport;

    fn store() -> ConfigStore {
        let transport: Arc<dyn Transport> = Arc::new(MockTransport::new());
        ConfigStore::new(transport, Arc::new(SystemClock))
    }

    #[tokio::test]
    async fn read_only_rejects_update_but_allows_force_set() {
        let store = store();
        store
            .set(
                "core-rule",
                "v1",
                ConfigCategory::Ops,
                SetOptions {
                    read_only: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let err = store
            .set("core-rule", "v2", ConfigCategory::Ops, SetOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, MuninnError::ConfigReadOnly(_)));
        assert_eq!(store.get("core-rule").await.unwrap().unwrap(), "v1");

        store
            .force_set("core-rule", "v2", ConfigCategory::Ops, SetOptions::default())
            .await
            .unwrap();
        assert_eq!(store.get("core-rule").await.unwrap().unwrap(), "v2");
    }

    #[tokio::test]
    async fn char_limit_is_enforced() {
        let store = store();
        let err = store
            .set(
                "short",
                "this is too long",
                ConfigCategory::Ops,
                SetOptions {
                    char_limit: Some(4),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MuninnError::CharLimitExceeded { .. }));
    }

    #[tokio::test]
    async fn updated_at_reflects_the_injected_clock() {
        let clock = Arc::new(FixedClock::new(
            DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        ));
        let transport: Arc<dyn Transport> = Arc::new(MockTransport::new());
        let store = ConfigStore::new(transport, clock.clone());
        store
            .set("k", "v", ConfigCategory::Ops, SetOptions::default())
            .await
            .unwrap();
        let entry = store.get_entry("k").await.unwrap().unwrap();
        assert_eq!(entry.updated_at, clock.now());
    }
}
