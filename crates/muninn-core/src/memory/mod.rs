//! Memory record types.

mod refs;
pub mod store;

pub use refs::RefEntry;
pub use store::{CurationReport, MemoryStore, RememberOptions};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MuninnError;
use crate::transport::Row;

/// The closed set of memory types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    Decision,
    World,
    Anomaly,
    Experience,
    Interaction,
    Procedure,
}

impl MemoryType {
    pub fn as_str(self) -> &'static str {
        match self {
            MemoryType::Decision => "decision",
            MemoryType::World => "world",
            MemoryType::Anomaly => "anomaly",
            MemoryType::Experience => "experience",
            MemoryType::Interaction => "interaction",
            MemoryType::Procedure => "procedure",
        }
    }

    /// Default confidence for a freshly-created record of this type, absent
    /// an explicit value.
    pub fn default_confidence(self) -> Option<f64> {
        match self {
            MemoryType::Decision => Some(0.8),
            _ => None,
        }
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MemoryType {
    type Err = MuninnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "decision" => Ok(MemoryType::Decision),
            "world" => Ok(MemoryType::World),
            "anomaly" => Ok(MemoryType::Anomaly),
            "experience" => Ok(MemoryType::Experience),
            "interaction" => Ok(MemoryType::Interaction),
            "procedure" => Ok(MemoryType::Procedure),
            other => Err(MuninnError::UnknownType(other.to_string())),
        }
    }
}

/// Clamps a raw priority value to the declared range.
pub fn clamp_priority(priority: i64) -> i64 {
    priority.clamp(-1, 2)
}

/// An observation record.
#[derive(Debug, Clone)]
pub struct Memory {
    pub id: String,
    pub r#type: MemoryType,
    pub t: DateTime<Utc>,
    pub summary: String,
    pub confidence: Option<f64>,
    pub tags: Vec<String>,
    pub refs: Vec<RefEntry>,
    pub priority: i64,
    pub session_id: Option<String>,
    pub valid_from: Option<DateTime<Utc>>,
    pub access_count: i64,
    pub last_accessed: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Memory {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Projection of `refs` to `type=="alternative"` entries.
    pub fn alternatives(&self) -> Vec<(&str, Option<&str>)> {
        self.refs
            .iter()
            .filter_map(|r| match r {
                RefEntry::Alternative { option, rejected } => {
                    Some((option.as_str(), rejected.as_deref()))
                }
                _ => None,
            })
            .collect()
    }

    pub(crate) fn from_row(row: &Row) -> Result<Self, MuninnError> {
        let r#type: MemoryType = row.text("type")?.parse()?;
        let tags = row
            .json("tags")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();
        let refs = row
            .json("refs")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();

        Ok(Self {
            id: row.text("id")?,
            r#type,
            t: parse_instant(&row.text("t")?)?,
            summary: row.text("summary")?,
            confidence: row.real_opt("confidence"),
            tags,
            refs,
            priority: row.integer("priority").unwrap_or(0),
            session_id: row.text_opt("session_id"),
            valid_from: row.text_opt("valid_from").and_then(|s| parse_instant(&s).ok()),
            access_count: row.integer("access_count").unwrap_or(0),
            last_accessed: row.text_opt("last_accessed").and_then(|s| parse_instant(&s).ok()),
            deleted_at: row.text_opt("deleted_at").and_then(|s| parse_instant(&s).ok()),
            created_at: parse_instant(&row.text("created_at")?)?,
            updated_at: parse_instant(&row.text("updated_at")?)?,
        })
    }
}

/// The content fields a round-trip export/import is required to preserve
/// byte-for-byte: `summary`, `tags`, `refs`, `type`, `confidence`, `priority`,
/// `t`, `session_id`. Bookkeeping fields (`access_count`, `last_accessed`,
/// `deleted_at`) are deliberately excluded — a restore is not a replay of
/// access history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRecord {
    pub id: String,
    pub r#type: MemoryType,
    pub t: DateTime<Utc>,
    pub summary: String,
    pub confidence: Option<f64>,
    pub tags: Vec<String>,
    pub refs: Vec<RefEntry>,
    pub priority: i64,
    pub session_id: Option<String>,
}

impl From<&Memory> for ExportRecord {
    fn from(m: &Memory) -> Self {
        Self {
            id: m.id.clone(),
            r#type: m.r#type,
            t: m.t,
            summary: m.summary.clone(),
            confidence: m.confidence,
            tags: m.tags.clone(),
            refs: m.refs.clone(),
            priority: m.priority,
            session_id: m.session_id.clone(),
        }
    }
}

/// A full store snapshot, as produced by [`store::MemoryStore::export`] and
/// consumed by [`store::MemoryStore::import`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportData {
    pub memories: Vec<ExportRecord>,
}

fn parse_instant(s: &str) -> Result<DateTime<Utc>, MuninnError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| MuninnError::InvalidArgument(format!("bad timestamp {s:?}: {e}")))
}
