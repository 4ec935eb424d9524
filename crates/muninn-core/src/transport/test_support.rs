//! In-memory [`Transport`] double used by every other module's test suite.
//!
//! Dispatches on exact string equality against the named constants in
//! [`crate::sql`], letting a fake stand in for a real query executor without
//! a SQL parser. DDL statements are no-ops; `MEMORY_FTS_SEARCH` fakes a
//! BM25-shaped `rank` column by counting substring hits, since the
//! composite ranking math that consumes it lives in `search::ranking`, not
//! in SQL.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::TransportError;
use crate::sql;
use crate::transport::{Row, Rows, Statement, Transport, Value};

#[derive(Debug, Clone)]
struct ConfigRow {
    key: String,
    value: String,
    category: String,
    char_limit: Option<i64>,
    read_only: bool,
    boot_load: bool,
    priority: i64,
    updated_at: String,
}

impl ConfigRow {
    fn into_row(self) -> Row {
        Row::from_cells(HashMap::from([
            ("key".into(), Value::Text(self.key)),
            ("value".into(), Value::Text(self.value)),
            ("category".into(), Value::Text(self.category)),
            ("char_limit".into(), self.char_limit.map(Value::Integer).unwrap_or(Value::Null)),
            ("read_only".into(), Value::Integer(self.read_only as i64)),
            ("boot_load".into(), Value::Integer(self.boot_load as i64)),
            ("priority".into(), Value::Integer(self.priority)),
            ("updated_at".into(), Value::Text(self.updated_at)),
        ]))
    }
}

#[derive(Debug, Clone)]
struct MemoryRow {
    id: String,
    r#type: String,
    t: String,
    summary: String,
    confidence: Option<f64>,
    tags: String,
    refs: String,
    priority: i64,
    session_id: Option<String>,
    valid_from: Option<String>,
    access_count: i64,
    last_accessed: Option<String>,
    deleted_at: Option<String>,
    created_at: String,
    updated_at: String,
}

impl MemoryRow {
    fn into_row(self) -> Row {
        Row::from_cells(HashMap::from([
            ("id".into(), Value::Text(self.id)),
            ("type".into(), Value::Text(self.r#type)),
            ("t".into(), Value::Text(self.t)),
            ("summary".into(), Value::Text(self.summary)),
            ("confidence".into(), self.confidence.map(Value::Real).unwrap_or(Value::Null)),
            ("tags".into(), Value::Text(self.tags)),
            ("refs".into(), Value::Text(self.refs)),
            ("priority".into(), Value::Integer(self.priority)),
            ("session_id".into(), self.session_id.map(Value::Text).unwrap_or(Value::Null)),
            ("valid_from".into(), self.valid_from.map(Value::Text).unwrap_or(Value::Null)),
            ("access_count".into(), Value::Integer(self.access_count)),
            ("last_accessed".into(), self.last_accessed.map(Value::Text).unwrap_or(Value::Null)),
            ("deleted_at".into(), self.deleted_at.map(Value::Text).unwrap_or(Value::Null)),
            ("created_at".into(), Value::Text(self.created_at)),
            ("updated_at".into(), Value::Text(self.updated_at)),
        ]))
    }
}

fn as_text(v: &Value) -> String {
    match v {
        Value::Text(s) => s.clone(),
        Value::Null => String::new(),
        Value::Integer(n) => n.to_string(),
        Value::Real(f) => f.to_string(),
    }
}

fn as_text_opt(v: &Value) -> Option<String> {
    match v {
        Value::Text(s) => Some(s.clone()),
        Value::Null => None,
        Value::Integer(n) => Some(n.to_string()),
        Value::Real(f) => Some(f.to_string()),
    }
}

fn as_int(v: &Value) -> i64 {
    match v {
        Value::Integer(n) => *n,
        Value::Real(f) => *f as i64,
        _ => 0,
    }
}

fn as_int_opt(v: &Value) -> Option<i64> {
    match v {
        Value::Integer(n) => Some(*n),
        Value::Real(f) => Some(*f as i64),
        Value::Null => None,
        Value::Text(_) => None,
    }
}

fn as_real_opt(v: &Value) -> Option<f64> {
    match v {
        Value::Real(f) => Some(*f),
        Value::Integer(n) => Some(*n as f64),
        _ => None,
    }
}

fn strip_fts_syntax(query: &str) -> String {
    // A real FTS5 MATCH query may carry boolean/column operators; the mock
    // only needs the bare terms to do a substring search.
    query
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

/// An in-memory stand-in for the remote backend, used throughout this
/// crate's test suites. Not exposed outside `#[cfg(test)]`/`test-support`.
pub struct MockTransport {
    config: Mutex<HashMap<String, ConfigRow>>,
    memories: Mutex<Vec<MemoryRow>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            config: Mutex::new(HashMap::new()),
            memories: Mutex::new(Vec::new()),
        }
    }

    fn exec(&self, stmt: &Statement) -> Result<Rows, TransportError> {
        let sql = stmt.sql.as_str();
        let args = &stmt.args;

        // Schema DDL: no-ops, the mock has no real tables to create.
        if matches!(
            sql,
            sql::CREATE_MEMORIES_TABLE
                | sql::CREATE_CONFIG_TABLE
                | sql::CREATE_MEMORIES_FTS
                | sql::CREATE_TRIGGER_MEMORIES_AI
                | sql::CREATE_TRIGGER_MEMORIES_AU
                | sql::CREATE_TRIGGER_MEMORIES_AD
                | sql::CREATE_INDEX_MEMORIES_T
                | sql::CREATE_INDEX_MEMORIES_PRIORITY_T
                | sql::CREATE_INDEX_MEMORIES_SESSION
                | sql::CREATE_INDEX_CONFIG_CATEGORY
        ) {
            return Ok(Rows::empty());
        }

        match sql {
            sql::CONFIG_GET => {
                let key = as_text(&args[0]);
                let config = self.config.lock().unwrap();
                let rows = config
                    .get(&key)
                    .cloned()
                    .into_iter()
                    .map(ConfigRow::into_row)
                    .collect();
                Ok(Rows { rows })
            }
            sql::CONFIG_UPSERT => {
                let entry = ConfigRow {
                    key: as_text(&args[0]),
                    value: as_text(&args[1]),
                    category: as_text(&args[2]),
                    char_limit: as_int_opt(&args[3]),
                    read_only: as_int(&args[4]) != 0,
                    boot_load: as_int(&args[5]) != 0,
                    priority: as_int(&args[6]),
                    updated_at: as_text(&args[7]),
                };
                self.config.lock().unwrap().insert(entry.key.clone(), entry);
                Ok(Rows::empty())
            }
            sql::CONFIG_SET_VALUE_ONLY => {
                let value = as_text(&args[0]);
                let updated_at = as_text(&args[1]);
                let key = as_text(&args[2]);
                if let Some(row) = self.config.lock().unwrap().get_mut(&key) {
                    row.value = value;
                    row.updated_at = updated_at;
                }
                Ok(Rows::empty())
            }
            sql::CONFIG_DELETE => {
                let key = as_text(&args[0]);
                self.config.lock().unwrap().remove(&key);
                Ok(Rows::empty())
            }
            sql::CONFIG_SET_BOOT_LOAD => {
                let boot_load = as_int(&args[0]) != 0;
                let updated_at = as_text(&args[1]);
                let key = as_text(&args[2]);
                if let Some(row) = self.config.lock().unwrap().get_mut(&key) {
                    row.boot_load = boot_load;
                    row.updated_at = updated_at;
                }
                Ok(Rows::empty())
            }
            sql::CONFIG_SET_PRIORITY => {
                let priority = as_int(&args[0]);
                let updated_at = as_text(&args[1]);
                let key = as_text(&args[2]);
                if let Some(row) = self.config.lock().unwrap().get_mut(&key) {
                    row.priority = priority;
                    row.updated_at = updated_at;
                }
                Ok(Rows::empty())
            }
            sql::CONFIG_LIST_ALL => {
                let config = self.config.lock().unwrap();
                let mut entries: Vec<ConfigRow> = config.values().cloned().collect();
                entries.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.key.cmp(&b.key)));
                Ok(Rows {
                    rows: entries.into_iter().map(ConfigRow::into_row).collect(),
                })
            }
            sql::CONFIG_LIST_BY_CATEGORY => {
                let category = as_text(&args[0]);
                let config = self.config.lock().unwrap();
                let mut entries: Vec<ConfigRow> =
                    config.values().filter(|e| e.category == category).cloned().collect();
                entries.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.key.cmp(&b.key)));
                Ok(Rows {
                    rows: entries.into_iter().map(ConfigRow::into_row).collect(),
                })
            }
            sql::CONFIG_LIST_BOOT_LOAD_BY_CATEGORY => {
                let category = as_text(&args[0]);
                let config = self.config.lock().unwrap();
                let mut entries: Vec<ConfigRow> = config
                    .values()
                    .filter(|e| e.category == category && e.boot_load)
                    .cloned()
                    .collect();
                entries.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.key.cmp(&b.key)));
                Ok(Rows {
                    rows: entries.into_iter().map(ConfigRow::into_row).collect(),
                })
            }
            sql::CONFIG_LIST_JOURNAL_RECENT => {
                let limit = as_int(&args[0]).max(0) as usize;
                let config = self.config.lock().unwrap();
                let mut entries: Vec<ConfigRow> =
                    config.values().filter(|e| e.category == "journal").cloned().collect();
                entries.sort_by(|a, b| b.key.cmp(&a.key));
                entries.truncate(limit);
                Ok(Rows {
                    rows: entries.into_iter().map(ConfigRow::into_row).collect(),
                })
            }
            sql::CONFIG_LIST_JOURNAL_PRUNE_CANDIDATES => {
                let offset = as_int(&args[0]).max(0) as usize;
                let config = self.config.lock().unwrap();
                let mut entries: Vec<ConfigRow> =
                    config.values().filter(|e| e.category == "journal").cloned().collect();
                entries.sort_by(|a, b| b.key.cmp(&a.key));
                let candidates = entries.into_iter().skip(offset);
                Ok(Rows {
                    rows: candidates
                        .map(|e| Row::from_cells(HashMap::from([("key".into(), Value::Text(e.key))])))
                        .collect(),
                })
            }
            sql::MEMORY_INSERT => {
                let row = MemoryRow {
                    id: as_text(&args[0]),
                    r#type: as_text(&args[1]),
                    t: as_text(&args[2]),
                    summary: as_text(&args[3]),
                    confidence: as_real_opt(&args[4]),
                    tags: as_text(&args[5]),
                    refs: as_text(&args[6]),
                    priority: as_int(&args[7]),
                    session_id: as_text_opt(&args[8]),
                    valid_from: as_text_opt(&args[9]),
                    access_count: as_int(&args[10]),
                    last_accessed: as_text_opt(&args[11]),
                    deleted_at: as_text_opt(&args[12]),
                    created_at: as_text(&args[13]),
                    updated_at: as_text(&args[14]),
                };
                self.memories.lock().unwrap().push(row);
                Ok(Rows::empty())
            }
            sql::MEMORY_GET_BY_ID => {
                let id = as_text(&args[0]);
                let memories = self.memories.lock().unwrap();
                let rows = memories
                    .iter()
                    .find(|m| m.id == id)
                    .cloned()
                    .into_iter()
                    .map(MemoryRow::into_row)
                    .collect();
                Ok(Rows { rows })
            }
            sql::MEMORY_SOFT_DELETE => {
                let deleted_at = as_text(&args[0]);
                let updated_at = as_text(&args[1]);
                let id = as_text(&args[2]);
                let mut memories = self.memories.lock().unwrap();
                if let Some(m) = memories.iter_mut().find(|m| m.id == id && m.deleted_at.is_none()) {
                    m.deleted_at = Some(deleted_at);
                    m.updated_at = updated_at;
                }
                Ok(Rows::empty())
            }
            sql::MEMORY_SET_PRIORITY => {
                let priority = as_int(&args[0]);
                let updated_at = as_text(&args[1]);
                let id = as_text(&args[2]);
                let mut memories = self.memories.lock().unwrap();
                if let Some(m) = memories.iter_mut().find(|m| m.id == id) {
                    m.priority = priority;
                    m.updated_at = updated_at;
                }
                Ok(Rows::empty())
            }
            sql::MEMORY_SET_CONFIDENCE => {
                let confidence = as_real_opt(&args[0]);
                let updated_at = as_text(&args[1]);
                let id = as_text(&args[2]);
                let mut memories = self.memories.lock().unwrap();
                if let Some(m) = memories.iter_mut().find(|m| m.id == id) {
                    m.confidence = confidence;
                    m.updated_at = updated_at;
                }
                Ok(Rows::empty())
            }
            sql::MEMORY_RECORD_ACCESS => {
                let last_accessed = as_text(&args[0]);
                let id = as_text(&args[1]);
                let mut memories = self.memories.lock().unwrap();
                if let Some(m) = memories.iter_mut().find(|m| m.id == id) {
                    m.access_count += 1;
                    m.last_accessed = Some(last_accessed);
                }
                Ok(Rows::empty())
            }
            sql::MEMORY_FTS_SEARCH => {
                let query = strip_fts_syntax(&as_text(&args[0]));
                let limit = as_int(&args[1]).max(0) as usize;
                let terms: Vec<&str> = query.split_whitespace().collect();
                let memories = self.memories.lock().unwrap();
                let mut scored: Vec<(f64, MemoryRow)> = memories
                    .iter()
                    .filter(|m| m.deleted_at.is_none())
                    .filter_map(|m| {
                        let haystack = format!("{} {}", m.summary.to_lowercase(), m.tags.to_lowercase());
                        let hits: usize = terms.iter().filter(|t| haystack.contains(*t)).count();
                        if hits == 0 {
                            None
                        } else {
                            Some((-(hits as f64), m.clone()))
                        }
                    })
                    .collect();
                scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
                scored.truncate(limit);
                let rows = scored
                    .into_iter()
                    .map(|(rank, m)| {
                        let mut row = m.into_row();
                        row = Row::from_cells({
                            let mut cells: HashMap<String, Value> = row
                                .columns()
                                .map(|c| (c.to_string(), row.get(c).cloned().unwrap()))
                                .collect();
                            cells.insert("rank".into(), Value::Real(rank));
                            cells
                        });
                        row
                    })
                    .collect();
                Ok(Rows { rows })
            }
            sql::MEMORY_LIKE_FALLBACK => {
                let pattern = as_text(&args[0]).trim_matches('%').to_lowercase();
                let limit = as_int(&args[2]).max(0) as usize;
                let memories = self.memories.lock().unwrap();
                let mut matches: Vec<MemoryRow> = memories
                    .iter()
                    .filter(|m| m.deleted_at.is_none())
                    .filter(|m| {
                        m.summary.to_lowercase().contains(&pattern) || m.tags.to_lowercase().contains(&pattern)
                    })
                    .cloned()
                    .collect();
                matches.sort_by(|a, b| b.priority.cmp(&a.priority).then(b.t.cmp(&a.t)));
                matches.truncate(limit);
                Ok(Rows {
                    rows: matches.into_iter().map(MemoryRow::into_row).collect(),
                })
            }
            sql::MEMORY_LIST_RECENT => {
                let limit = as_int(&args[0]).max(0) as usize;
                let memories = self.memories.lock().unwrap();
                let mut live: Vec<MemoryRow> =
                    memories.iter().filter(|m| m.deleted_at.is_none()).cloned().collect();
                live.sort_by(|a, b| b.priority.cmp(&a.priority).then(b.t.cmp(&a.t)));
                live.truncate(limit);
                Ok(Rows {
                    rows: live.into_iter().map(MemoryRow::into_row).collect(),
                })
            }
            sql::MEMORY_LIST_SINCE => {
                let since = as_text(&args[0]);
                let limit = as_int(&args[1]).max(0) as usize;
                let memories = self.memories.lock().unwrap();
                let mut live: Vec<MemoryRow> = memories
                    .iter()
                    .filter(|m| m.deleted_at.is_none() && m.t >= since)
                    .cloned()
                    .collect();
                live.sort_by(|a, b| b.priority.cmp(&a.priority).then(b.t.cmp(&a.t)));
                live.truncate(limit);
                Ok(Rows {
                    rows: live.into_iter().map(MemoryRow::into_row).collect(),
                })
            }
            sql::MEMORY_LIST_BETWEEN => {
                let from = as_text(&args[0]);
                let to = as_text(&args[1]);
                let limit = as_int(&args[2]).max(0) as usize;
                let memories = self.memories.lock().unwrap();
                let mut live: Vec<MemoryRow> = memories
                    .iter()
                    .filter(|m| m.deleted_at.is_none() && m.t >= from && m.t <= to)
                    .cloned()
                    .collect();
                live.sort_by(|a, b| b.priority.cmp(&a.priority).then(b.t.cmp(&a.t)));
                live.truncate(limit);
                Ok(Rows {
                    rows: live.into_iter().map(MemoryRow::into_row).collect(),
                })
            }
            sql::MEMORY_LIST_BY_SESSION => {
                let session_id = as_text(&args[0]);
                let limit = as_int(&args[1]).max(0) as usize;
                let memories = self.memories.lock().unwrap();
                let mut live: Vec<MemoryRow> = memories
                    .iter()
                    .filter(|m| m.deleted_at.is_none() && m.session_id.as_deref() == Some(session_id.as_str()))
                    .cloned()
                    .collect();
                live.sort_by(|a, b| b.t.cmp(&a.t));
                live.truncate(limit);
                Ok(Rows {
                    rows: live.into_iter().map(MemoryRow::into_row).collect(),
                })
            }
            sql::MEMORY_LIST_ALL_INCLUDING_DELETED => {
                let mut all: Vec<MemoryRow> = self.memories.lock().unwrap().clone();
                all.sort_by(|a, b| a.t.cmp(&b.t));
                Ok(Rows {
                    rows: all.into_iter().map(MemoryRow::into_row).collect(),
                })
            }
            sql::MEMORY_DELETE_ALL => {
                self.memories.lock().unwrap().clear();
                Ok(Rows::empty())
            }
            sql::MEMORY_IMPORT_UPSERT => {
                let row = MemoryRow {
                    id: as_text(&args[0]),
                    r#type: as_text(&args[1]),
                    t: as_text(&args[2]),
                    summary: as_text(&args[3]),
                    confidence: as_real_opt(&args[4]),
                    tags: as_text(&args[5]),
                    refs: as_text(&args[6]),
                    priority: as_int(&args[7]),
                    session_id: as_text_opt(&args[8]),
                    valid_from: as_text_opt(&args[9]),
                    access_count: as_int(&args[10]),
                    last_accessed: as_text_opt(&args[11]),
                    deleted_at: as_text_opt(&args[12]),
                    created_at: as_text(&args[13]),
                    updated_at: as_text(&args[14]),
                };
                let mut memories = self.memories.lock().unwrap();
                match memories.iter_mut().find(|m| m.id == row.id) {
                    Some(existing) => {
                        let preserved_access_count = existing.access_count;
                        let preserved_last_accessed = existing.last_accessed.clone();
                        let preserved_deleted_at = existing.deleted_at.clone();
                        let preserved_created_at = existing.created_at.clone();
                        *existing = row;
                        existing.access_count = preserved_access_count;
                        existing.last_accessed = preserved_last_accessed;
                        existing.deleted_at = preserved_deleted_at;
                        existing.created_at = preserved_created_at;
                    }
                    None => memories.push(row),
                }
                Ok(Rows::empty())
            }
            other => Err(TransportError::Protocol(format!(
                "MockTransport: unrecognized statement: {other}"
            ))),
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

/// A [`Transport`] double that fails every call, standing in for a
/// genuinely unreachable backend — used to exercise the boot composer's
/// offline fallback (spec §4.8, §7) without a real network dependency.
#[derive(Debug, Default)]
pub struct FailingTransport;

#[async_trait::async_trait]
impl Transport for FailingTransport {
    async fn exec_one(&self, _stmt: Statement) -> Result<Rows, TransportError> {
        Err(TransportError::Unavailable)
    }

    async fn exec_batch(
        &self,
        _stmts: Vec<Statement>,
    ) -> Result<Vec<Result<Rows, TransportError>>, TransportError> {
        Err(TransportError::Unavailable)
    }
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    async fn exec_one(&self, stmt: Statement) -> Result<Rows, TransportError> {
        self.exec(&stmt)
    }

    async fn exec_batch(
        &self,
        stmts: Vec<Statement>,
    ) -> Result<Vec<Result<Rows, TransportError>>, TransportError> {
        Ok(stmts.iter().map(|s| self.exec(s)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_then_get_by_id_round_trips() {
        let transport = MockTransport::new();
        transport
            .exec_one(Statement::new(
                sql::MEMORY_INSERT,
                vec![
                    "m1".into(),
                    "fact".into(),
                    "2026-01-01T00:00:00Z".into(),
                    "the sky is blue".into(),
                    Value::Real(0.9),
                    "[]".into(),
                    "[]".into(),
                    Value::Integer(0),
                    Value::Null,
                    Value::Null,
                    Value::Integer(0),
                    Value::Null,
                    Value::Null,
                    "2026-01-01T00:00:00Z".into(),
                    "2026-01-01T00:00:00Z".into(),
                ],
            ))
            .await
            .unwrap();

        let rows = transport
            .exec_one(Statement::new(sql::MEMORY_GET_BY_ID, vec!["m1".into()]))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows.iter().next().unwrap().text("summary").unwrap(), "the sky is blue");
    }

    #[tokio::test]
    async fn fts_search_ranks_by_hit_count() {
        let transport = MockTransport::new();
        for (id, summary) in [("a", "rust rust rust"), ("b", "rust")] {
            transport
                .exec_one(Statement::new(
                    sql::MEMORY_INSERT,
                    vec![
                        id.into(),
                        "fact".into(),
                        "2026-01-01T00:00:00Z".into(),
                        summary.into(),
                        Value::Null,
                        "[]".into(),
                        "[]".into(),
                        Value::Integer(0),
                        Value::Null,
                        Value::Null,
                        Value::Integer(0),
                        Value::Null,
                        Value::Null,
                        "2026-01-01T00:00:00Z".into(),
                        "2026-01-01T00:00:00Z".into(),
                    ],
                ))
                .await
                .unwrap();
        }

        let rows = transport
            .exec_one(Statement::new(
                sql::MEMORY_FTS_SEARCH,
                vec!["rust".into(), Value::Integer(10)],
            ))
            .await
            .unwrap();
        assert_eq!(rows.iter().next().unwrap().text("id").unwrap(), "a");
    }
}
