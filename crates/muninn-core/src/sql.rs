//! Central SQL query registry.
//!
//! Every statement the engine issues against the remote backend is declared
//! here once, the way `storage/queries` modules are organized in the wider
//! pack's repository-style crates (one named constant per shape, reused by
//! both the production transport and the in-memory test double).

// ---------------------------------------------------------------------------
// Schema (see `schema.rs` for the full bootstrap sequence)
// ---------------------------------------------------------------------------

pub const CREATE_MEMORIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS memories (
    id TEXT PRIMARY KEY,
    type TEXT NOT NULL,
    t TEXT NOT NULL,
    summary TEXT NOT NULL,
    confidence REAL,
    tags TEXT NOT NULL DEFAULT '[]',
    refs TEXT NOT NULL DEFAULT '[]',
    priority INTEGER NOT NULL DEFAULT 0,
    session_id TEXT,
    valid_from TEXT,
    access_count INTEGER NOT NULL DEFAULT 0,
    last_accessed TEXT,
    deleted_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)"#;

pub const CREATE_CONFIG_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS config_entries (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    category TEXT NOT NULL,
    char_limit INTEGER,
    read_only INTEGER NOT NULL DEFAULT 0,
    boot_load INTEGER NOT NULL DEFAULT 0,
    priority INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL
)"#;

pub const CREATE_MEMORIES_FTS: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS memories_fts USING fts5(
    id UNINDEXED,
    summary,
    tags,
    tokenize = 'porter unicode61'
)"#;

pub const CREATE_TRIGGER_MEMORIES_AI: &str = r#"
CREATE TRIGGER IF NOT EXISTS memories_fts_ai AFTER INSERT ON memories
WHEN new.deleted_at IS NULL
BEGIN
    INSERT INTO memories_fts(id, summary, tags) VALUES (new.id, new.summary, new.tags);
END"#;

pub const CREATE_TRIGGER_MEMORIES_AU: &str = r#"
CREATE TRIGGER IF NOT EXISTS memories_fts_au AFTER UPDATE ON memories
BEGIN
    DELETE FROM memories_fts WHERE id = old.id;
    INSERT INTO memories_fts(id, summary, tags)
        SELECT new.id, new.summary, new.tags WHERE new.deleted_at IS NULL;
END"#;

pub const CREATE_TRIGGER_MEMORIES_AD: &str = r#"
CREATE TRIGGER IF NOT EXISTS memories_fts_ad AFTER DELETE ON memories
BEGIN
    DELETE FROM memories_fts WHERE id = old.id;
END"#;

pub const CREATE_INDEX_MEMORIES_T: &str =
    "CREATE INDEX IF NOT EXISTS idx_memories_t ON memories(t DESC)";
pub const CREATE_INDEX_MEMORIES_PRIORITY_T: &str =
    "CREATE INDEX IF NOT EXISTS idx_memories_priority_t ON memories(priority DESC, t DESC)";
pub const CREATE_INDEX_MEMORIES_SESSION: &str =
    "CREATE INDEX IF NOT EXISTS idx_memories_session ON memories(session_id)";
pub const CREATE_INDEX_CONFIG_CATEGORY: &str =
    "CREATE INDEX IF NOT EXISTS idx_config_category ON config_entries(category)";

// ---------------------------------------------------------------------------
// Config store
// ---------------------------------------------------------------------------

pub const CONFIG_GET: &str = "SELECT key, value, category, char_limit, read_only, boot_load, priority, updated_at \
    FROM config_entries WHERE key = ?";

pub const CONFIG_UPSERT: &str = "INSERT INTO config_entries \
    (key, value, category, char_limit, read_only, boot_load, priority, updated_at) \
    VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
    ON CONFLICT(key) DO UPDATE SET value = excluded.value, category = excluded.category, \
    char_limit = excluded.char_limit, updated_at = excluded.updated_at";

pub const CONFIG_SET_VALUE_ONLY: &str =
    "UPDATE config_entries SET value = ?, updated_at = ? WHERE key = ?";

pub const CONFIG_DELETE: &str = "DELETE FROM config_entries WHERE key = ?";

pub const CONFIG_SET_BOOT_LOAD: &str =
    "UPDATE config_entries SET boot_load = ?, updated_at = ? WHERE key = ?";

pub const CONFIG_SET_PRIORITY: &str =
    "UPDATE config_entries SET priority = ?, updated_at = ? WHERE key = ?";

pub const CONFIG_LIST_ALL: &str = "SELECT key, value, category, char_limit, read_only, boot_load, priority, updated_at \
    FROM config_entries ORDER BY priority DESC, key ASC";

pub const CONFIG_LIST_BY_CATEGORY: &str = "SELECT key, value, category, char_limit, read_only, boot_load, priority, updated_at \
    FROM config_entries WHERE category = ? ORDER BY priority DESC, key ASC";

pub const CONFIG_LIST_BOOT_LOAD_BY_CATEGORY: &str = "SELECT key, value, category, char_limit, read_only, boot_load, priority, updated_at \
    FROM config_entries WHERE category = ? AND boot_load = 1 ORDER BY priority DESC, key ASC";

pub const CONFIG_LIST_JOURNAL_RECENT: &str = "SELECT key, value, category, char_limit, read_only, boot_load, priority, updated_at \
    FROM config_entries WHERE category = 'journal' ORDER BY key DESC LIMIT ?";

pub const CONFIG_LIST_JOURNAL_PRUNE_CANDIDATES: &str =
    "SELECT key FROM config_entries WHERE category = 'journal' ORDER BY key DESC LIMIT -1 OFFSET ?";

// ---------------------------------------------------------------------------
// Memory store
// ---------------------------------------------------------------------------

pub const MEMORY_COLUMNS: &str =
    "id, type, t, summary, confidence, tags, refs, priority, session_id, valid_from, \
     access_count, last_accessed, deleted_at, created_at, updated_at";

pub const MEMORY_INSERT: &str = "INSERT INTO memories \
    (id, type, t, summary, confidence, tags, refs, priority, session_id, valid_from, \
     access_count, last_accessed, deleted_at, created_at, updated_at) \
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";

pub const MEMORY_GET_BY_ID: &str =
    "SELECT id, type, t, summary, confidence, tags, refs, priority, session_id, valid_from, \
     access_count, last_accessed, deleted_at, created_at, updated_at \
     FROM memories WHERE id = ?";

pub const MEMORY_SOFT_DELETE: &str =
    "UPDATE memories SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL";

pub const MEMORY_SET_PRIORITY: &str =
    "UPDATE memories SET priority = ?, updated_at = ? WHERE id = ?";

pub const MEMORY_SET_CONFIDENCE: &str =
    "UPDATE memories SET confidence = ?, updated_at = ? WHERE id = ?";

pub const MEMORY_RECORD_ACCESS: &str =
    "UPDATE memories SET access_count = access_count + 1, last_accessed = ? WHERE id = ?";

pub const MEMORY_FTS_SEARCH: &str = "SELECT m.id, m.type, m.t, m.summary, m.confidence, m.tags, m.refs, \
     m.priority, m.session_id, m.valid_from, m.access_count, m.last_accessed, m.deleted_at, \
     m.created_at, m.updated_at, bm25(memories_fts, 0.0, 1.0, 1.0) AS rank \
     FROM memories_fts JOIN memories m ON m.id = memories_fts.id \
     WHERE memories_fts MATCH ? AND m.deleted_at IS NULL ORDER BY rank LIMIT ?";

pub const MEMORY_LIKE_FALLBACK: &str =
    "SELECT id, type, t, summary, confidence, tags, refs, priority, session_id, valid_from, \
     access_count, last_accessed, deleted_at, created_at, updated_at \
     FROM memories WHERE deleted_at IS NULL AND (summary LIKE ? OR tags LIKE ?) \
     ORDER BY priority DESC, t DESC LIMIT ?";

pub const MEMORY_LIST_RECENT: &str =
    "SELECT id, type, t, summary, confidence, tags, refs, priority, session_id, valid_from, \
     access_count, last_accessed, deleted_at, created_at, updated_at \
     FROM memories WHERE deleted_at IS NULL ORDER BY priority DESC, t DESC LIMIT ?";

pub const MEMORY_LIST_SINCE: &str =
    "SELECT id, type, t, summary, confidence, tags, refs, priority, session_id, valid_from, \
     access_count, last_accessed, deleted_at, created_at, updated_at \
     FROM memories WHERE deleted_at IS NULL AND t >= ? ORDER BY priority DESC, t DESC LIMIT ?";

pub const MEMORY_LIST_BETWEEN: &str =
    "SELECT id, type, t, summary, confidence, tags, refs, priority, session_id, valid_from, \
     access_count, last_accessed, deleted_at, created_at, updated_at \
     FROM memories WHERE deleted_at IS NULL AND t >= ? AND t <= ? ORDER BY priority DESC, t DESC LIMIT ?";

pub const MEMORY_LIST_BY_SESSION: &str =
    "SELECT id, type, t, summary, confidence, tags, refs, priority, session_id, valid_from, \
     access_count, last_accessed, deleted_at, created_at, updated_at \
     FROM memories WHERE deleted_at IS NULL AND session_id = ? ORDER BY t DESC LIMIT ?";

// ---------------------------------------------------------------------------
// Export / import
// ---------------------------------------------------------------------------

/// Every record regardless of soft-delete state, oldest first, so a restore
/// replays in original creation order.
pub const MEMORY_LIST_ALL_INCLUDING_DELETED: &str =
    "SELECT id, type, t, summary, confidence, tags, refs, priority, session_id, valid_from, \
     access_count, last_accessed, deleted_at, created_at, updated_at \
     FROM memories ORDER BY t ASC";

pub const MEMORY_DELETE_ALL: &str = "DELETE FROM memories";

pub const MEMORY_IMPORT_UPSERT: &str = "INSERT INTO memories \
    (id, type, t, summary, confidence, tags, refs, priority, session_id, valid_from, \
     access_count, last_accessed, deleted_at, created_at, updated_at) \
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
    ON CONFLICT(id) DO UPDATE SET type = excluded.type, t = excluded.t, summary = excluded.summary, \
    confidence = excluded.confidence, tags = excluded.tags, refs = excluded.refs, \
    priority = excluded.priority, session_id = excluded.session_id, valid_from = excluded.valid_from, \
    updated_at = excluded.updated_at";
