//! Boot Composer.
//!
//! Produces the markdown identity document an agent reads on startup, and a
//! structured [`BootDocument`] equivalent.
//! On backend failure this degrades to the bundled `defaults/*.json`
//! fixtures rather than failing outright.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use tracing::{instrument, warn};

use crate::config::{ConfigCategory, ConfigEntry, ConfigStore};
use crate::credentials::CredentialsResolver;
use crate::error::Result;
use crate::search::{RecallOptions, SearchEngine, TagMode};
use crate::time::SharedClock;
use crate::transport::Transport;

/// Default materialization path for `utility-code`-tagged memories (spec
/// §6 "Persisted state layout").
pub const DEFAULT_UTILS_DIR: &str = "/home/claude/muninn_utils";

const DEFAULT_PROFILE_JSON: &str = include_str!("../defaults/profile.json");
const DEFAULT_OPS_JSON: &str = include_str!("../defaults/ops.json");

const DEFAULT_JOURNAL_COUNT: usize = 10;

#[derive(Debug, Clone, Deserialize)]
struct DefaultEntry {
    key: String,
    value: String,
    category: String,
    #[serde(default)]
    priority: i64,
    #[serde(default)]
    boot_load: bool,
}

/// `# OPERATIONS` is grouped by a topic classifier keyed on the key's
/// prefix up to its first `-`.
fn topic_of(key: &str) -> &str {
    key.split('-').next().unwrap_or(key)
}

#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    pub github_access: bool,
    pub utilities: Vec<String>,
    pub offline: bool,
}

#[derive(Debug, Clone, Default)]
pub struct BootDocument {
    pub identity: Vec<ConfigEntry>,
    pub operations: Vec<(String, Vec<ConfigEntry>)>,
    pub recent: Vec<ConfigEntry>,
    pub capabilities: Capabilities,
}

impl std::fmt::Display for BootDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "# IDENTITY")?;
        for entry in &self.identity {
            writeln!(f, "- **{}**: {}", entry.key, entry.value)?;
        }

        writeln!(f, "\n# OPERATIONS")?;
        for (topic, entries) in &self.operations {
            writeln!(f, "## {topic}")?;
            for entry in entries {
                writeln!(f, "- **{}**: {}", entry.key, entry.value)?;
            }
        }

        writeln!(f, "\n# RECENT")?;
        for entry in &self.recent {
            writeln!(f, "- {}", entry.value)?;
        }

        writeln!(f, "\n# CAPABILITIES")?;
        writeln!(
            f,
            "- GitHub access: {}",
            if self.capabilities.github_access { "yes" } else { "no" }
        )?;
        if self.capabilities.utilities.is_empty() {
            writeln!(f, "- Installed utilities: none")?;
        } else {
            writeln!(f, "- Installed utilities: {}", self.capabilities.utilities.join(", "))?;
        }
        if self.capabilities.offline {
            writeln!(f, "- Note: backend unreachable, serving defaults")?;
        }
        Ok(())
    }
}

pub struct BootComposer {
    transport: Arc<dyn Transport>,
    clock: SharedClock,
    config: Arc<ConfigStore>,
    credentials: Arc<CredentialsResolver>,
    materialize_dir: PathBuf,
    journal_count: usize,
}

impl BootComposer {
    pub fn new(
        transport: Arc<dyn Transport>,
        clock: SharedClock,
        config: Arc<ConfigStore>,
        credentials: Arc<CredentialsResolver>,
    ) -> Self {
        Self {
            transport,
            clock,
            config,
            credentials,
            materialize_dir: PathBuf::from(DEFAULT_UTILS_DIR),
            journal_count: DEFAULT_JOURNAL_COUNT,
        }
    }

    pub fn with_materialize_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.materialize_dir = dir.into();
        self
    }

    pub fn with_journal_count(mut self, n: usize) -> Self {
        self.journal_count = n;
        self
    }

    #[instrument(skip(self))]
    pub async fn boot(&self) -> Result<BootDocument> {
        match self.compose_live().await {
            Ok(doc) => Ok(doc),
            Err(err) => {
                warn!(%err, "boot composer falling back to bundled defaults");
                Ok(self.compose_offline())
            }
        }
    }

    async fn compose_live(&self) -> Result<BootDocument> {
        let profile = self.config.list(Some(ConfigCategory::Profile)).await?;
        let ops = self.config.list(Some(ConfigCategory::Ops)).await?;
        let recent = self.config.list_boot_load(ConfigCategory::Journal).await;
        let recent = match recent {
            Ok(entries) if !entries.is_empty() => entries,
            _ => self.config.list(Some(ConfigCategory::Journal)).await?,
        };

        let identity: Vec<ConfigEntry> = filter_boot_load(profile);
        let mut grouped: std::collections::BTreeMap<String, Vec<ConfigEntry>> = std::collections::BTreeMap::new();
        for entry in filter_boot_load(ops) {
            grouped.entry(topic_of(&entry.key).to_string()).or_default().push(entry);
        }
        for group in grouped.values_mut() {
            group.sort_by(|a, b| b.priority.cmp(&a.priority));
        }

        let mut recent = recent;
        recent.sort_by(|a, b| b.key.cmp(&a.key));
        recent.truncate(self.journal_count);

        let capabilities = self.capabilities(false).await;
        self.materialize_utility_code().await;

        Ok(BootDocument {
            identity,
            operations: grouped.into_iter().collect(),
            recent,
            capabilities,
        })
    }

    fn compose_offline(&self) -> BootDocument {
        let profile = parse_defaults(DEFAULT_PROFILE_JSON);
        let ops = parse_defaults(DEFAULT_OPS_JSON);

        let identity = filter_boot_load(profile);
        let mut grouped: std::collections::BTreeMap<String, Vec<ConfigEntry>> = std::collections::BTreeMap::new();
        for entry in filter_boot_load(ops) {
            grouped.entry(topic_of(&entry.key).to_string()).or_default().push(entry);
        }
        for group in grouped.values_mut() {
            group.sort_by(|a, b| b.priority.cmp(&a.priority));
        }

        BootDocument {
            identity,
            operations: grouped.into_iter().collect(),
            recent: Vec::new(),
            capabilities: Capabilities {
                github_access: false,
                utilities: Vec::new(),
                offline: true,
            },
        }
    }

    async fn capabilities(&self, offline: bool) -> Capabilities {
        let github_access = self.credentials.has_github_access();
        let utilities = self.installed_utilities().await;
        Capabilities {
            github_access,
            utilities,
            offline,
        }
    }

    /// Distinct tags held by `utility-code`-tagged memories, excluding the
    /// marker tag itself.
    async fn installed_utilities(&self) -> Vec<String> {
        let Ok(memories) = self.recent_tagged("utility-code").await else {
            return Vec::new();
        };

        let mut tags: Vec<String> = memories
            .iter()
            .flat_map(|m| m.tags.iter().cloned())
            .filter(|t| t != "utility-code")
            .collect();
        tags.sort();
        tags.dedup();
        tags
    }

    async fn recent_tagged(&self, tag: &str) -> Result<Vec<crate::memory::Memory>> {
        let mut opts = RecallOptions::new();
        opts.fetch_all = true;
        opts.n = Some(1000);
        opts.tag_mode = TagMode::Any;
        let engine = SearchEngine::new(self.transport.clone(), self.clock.clone());
        let results = engine.recall(None, opts).await?;
        Ok(results
            .iter()
            .map(|r| r.inner().clone())
            .filter(|m| m.tags.iter().any(|t| t == tag))
            .collect())
    }

    async fn materialize_utility_code(&self) {
        let Ok(memories) = self.recent_tagged("utility-code").await else {
            return;
        };
        if memories.is_empty() {
            return;
        }
        if let Err(err) = tokio::fs::create_dir_all(&self.materialize_dir).await {
            warn!(%err, dir = %self.materialize_dir.display(), "could not create utility-code materialization dir");
            return;
        }
        for memory in memories {
            let path = self.materialize_dir.join(format!("{}.txt", memory.id));
            if let Err(err) = write_utility_file(&path, &memory.summary).await {
                warn!(%err, path = %path.display(), "failed to materialize utility-code memory");
            }
        }
    }

    pub fn credentials(&self) -> &CredentialsResolver {
        &self.credentials
    }
}

async fn write_utility_file(path: &Path, contents: &str) -> std::io::Result<()> {
    tokio::fs::write(path, contents).await
}

fn filter_boot_load(entries: Vec<ConfigEntry>) -> Vec<ConfigEntry> {
    let mut kept: Vec<ConfigEntry> = entries.into_iter().filter(|e| e.boot_load).collect();
    kept.sort_by(|a, b| b.priority.cmp(&a.priority));
    kept
}

fn parse_defaults(raw: &str) -> Vec<ConfigEntry> {
    let parsed: Vec<DefaultEntry> = serde_json::from_str(raw).unwrap_or_default();
    parsed
        .into_iter()
        .filter_map(|e| {
            let category = e.category.parse().ok()?;
            Some(ConfigEntry {
                key: e.key,
                value: e.value,
                category,
                char_limit: None,
                read_only: false,
                boot_load: e.boot_load,
                priority: e.priority,
                updated_at: chrono::Utc::now(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SetOptions;
    use crate::time::SystemClock;
    use crate::transport::test_support::MockTransport;

    fn composer() -> BootComposer {
        let transport: Arc<dyn Transport> = Arc::new(MockTransport::new());
        let clock: SharedClock = Arc::new(SystemClock);
        let config = Arc::new(ConfigStore::new(transport.clone(), clock.clone()));
        let credentials = Arc::new(CredentialsResolver::fixed("mock://transport", Some("mock-token".into())));
        BootComposer::new(transport, clock, config, credentials)
            .with_materialize_dir(std::env::temp_dir().join("muninn-boot-test"))
    }

    #[tokio::test]
    async fn boot_renders_fixed_section_order() {
        let composer = composer();
        composer
            .config
            .set("identity-name", "Muninn", ConfigCategory::Profile, SetOptions { boot_load: true, ..Default::default() })
            .await
            .unwrap();

        let doc = composer.boot().await.unwrap();
        let rendered = doc.to_string();
        let identity_pos = rendered.find("# IDENTITY").unwrap();
        let ops_pos = rendered.find("# OPERATIONS").unwrap();
        let recent_pos = rendered.find("# RECENT").unwrap();
        let caps_pos = rendered.find("# CAPABILITIES").unwrap();
        assert!(identity_pos < ops_pos && ops_pos < recent_pos && recent_pos < caps_pos);
    }

    #[test]
    fn topic_of_splits_on_first_hyphen() {
        assert_eq!(topic_of("llm-system-prompt"), "llm");
        assert_eq!(topic_of("standalone"), "standalone");
    }

    #[tokio::test]
    async fn unreachable_backend_falls_back_to_bundled_defaults() {
        use crate::transport::test_support::FailingTransport;

        let transport: Arc<dyn Transport> = Arc::new(FailingTransport);
        let clock: SharedClock = Arc::new(SystemClock);
        let config = Arc::new(ConfigStore::new(transport.clone(), clock.clone()));
        let credentials = Arc::new(CredentialsResolver::fixed(crate::credentials::DEFAULT_URL, None));
        let composer = BootComposer::new(transport, clock, config, credentials)
            .with_materialize_dir(std::env::temp_dir().join("muninn-boot-offline-test"));

        let doc = composer.boot().await.unwrap();
        let rendered = doc.to_string();
        assert!(rendered.contains("# IDENTITY"));
        assert!(rendered.contains("# OPERATIONS"));
        assert!(rendered.contains("# CAPABILITIES"));
        assert!(rendered.contains("backend unreachable"));
    }
}
