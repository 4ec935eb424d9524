//! Result Wrapper: attribute/map access over a [`Memory`] with
//! field aliasing and a nearest-field-name suggestion on typos.

use serde_json::{json, Map, Value as Json};

use crate::error::MuninnError;
use crate::memory::Memory;

const KNOWN_FIELDS: &[&str] = &[
    "id",
    "type",
    "t",
    "summary",
    "confidence",
    "tags",
    "refs",
    "priority",
    "session_id",
    "valid_from",
    "access_count",
    "last_accessed",
    "deleted_at",
    "created_at",
    "updated_at",
    "alternatives",
];

/// Resolves the documented aliases transparently: the
/// wrapper does this at the boundary rather than duplicating storage.
fn resolve_alias(field: &str) -> &str {
    match field {
        "content" => "summary",
        "conf" => "confidence",
        "timestamp" => "t",
        other => other,
    }
}

/// A retrieval-time view over one [`Memory`], exposing fields by name and
/// lazily computing `alternatives` for `decision` records.
#[derive(Debug, Clone)]
pub struct MemoryResult {
    memory: Memory,
}

impl MemoryResult {
    pub fn new(memory: Memory) -> Self {
        Self { memory }
    }

    pub fn inner(&self) -> &Memory {
        &self.memory
    }

    pub fn into_inner(self) -> Memory {
        self.memory
    }

    pub fn id(&self) -> &str {
        &self.memory.id
    }

    /// `alternatives`: computed on demand from `refs`,
    /// never stored.
    pub fn alternatives(&self) -> Vec<(String, Option<String>)> {
        self.memory
            .alternatives()
            .into_iter()
            .map(|(option, rejected)| (option.to_string(), rejected.map(str::to_string)))
            .collect()
    }

    /// Map-style access with alias resolution. Unknown fields raise
    /// [`MuninnError::UnknownField`] naming the nearest known field, or
    /// [`MuninnError::UnknownFieldNoSuggestion`] if nothing is close.
    pub fn get(&self, field: &str) -> Result<Json, MuninnError> {
        let resolved = resolve_alias(field);
        if let Some(value) = self.field_value(resolved) {
            return Ok(value);
        }
        match nearest_field(resolved) {
            Some(suggestion) => Err(MuninnError::UnknownField {
                field: field.to_string(),
                suggestion: suggestion.to_string(),
            }),
            None => Err(MuninnError::UnknownFieldNoSuggestion(field.to_string())),
        }
    }

    fn field_value(&self, field: &str) -> Option<Json> {
        let m = &self.memory;
        Some(match field {
            "id" => json!(m.id),
            "type" => json!(m.r#type.as_str()),
            "t" => json!(m.t.to_rfc3339()),
            "summary" => json!(m.summary),
            "confidence" => json!(m.confidence),
            "tags" => json!(m.tags),
            "refs" => serde_json::to_value(&m.refs).unwrap_or(Json::Null),
            "priority" => json!(m.priority),
            "session_id" => json!(m.session_id),
            "valid_from" => json!(m.valid_from.map(|t| t.to_rfc3339())),
            "access_count" => json!(m.access_count),
            "last_accessed" => json!(m.last_accessed.map(|t| t.to_rfc3339())),
            "deleted_at" => json!(m.deleted_at.map(|t| t.to_rfc3339())),
            "created_at" => json!(m.created_at.to_rfc3339()),
            "updated_at" => json!(m.updated_at.to_rfc3339()),
            "alternatives" => json!(self.alternatives()),
            _ => return None,
        })
    }

    pub fn to_dict(&self) -> Map<String, Json> {
        let mut map = Map::new();
        for field in KNOWN_FIELDS {
            if let Some(value) = self.field_value(field) {
                map.insert(field.to_string(), value);
            }
        }
        map
    }
}

fn nearest_field(field: &str) -> Option<&'static str> {
    KNOWN_FIELDS
        .iter()
        .map(|&candidate| (candidate, levenshtein(field, candidate)))
        .min_by_key(|(_, dist)| *dist)
        .filter(|(_, dist)| *dist <= 3)
        .map(|(candidate, _)| candidate)
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for i in 1..=a.len() {
        let mut prev = row[0];
        row[0] = i;
        for j in 1..=b.len() {
            let tmp = row[j];
            row[j] = if a[i - 1] == b[j - 1] {
                prev
            } else {
                1 + prev.min(row[j]).min(row[j - 1])
            };
            prev = tmp;
        }
    }
    row[b.len()]
}

/// An ordered, indexable collection of [`MemoryResult`]s.
#[derive(Debug, Clone, Default)]
pub struct MemoryResultList {
    items: Vec<MemoryResult>,
}

impl MemoryResultList {
    pub fn new(items: Vec<MemoryResult>) -> Self {
        Self { items }
    }

    pub fn empty() -> Self {
        Self { items: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MemoryResult> {
        self.items.iter()
    }

    pub fn ids(&self) -> Vec<String> {
        self.items.iter().map(|r| r.id().to_string()).collect()
    }

    pub fn to_dicts(&self) -> Vec<Map<String, Json>> {
        self.items.iter().map(MemoryResult::to_dict).collect()
    }
}

impl std::ops::Index<usize> for MemoryResultList {
    type Output = MemoryResult;

    fn index(&self, index: usize) -> &Self::Output {
        &self.items[index]
    }
}

impl IntoIterator for MemoryResultList {
    type Item = MemoryResult;
    type IntoIter = std::vec::IntoIter<MemoryResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl FromIterator<MemoryResult> for MemoryResultList {
    fn from_iter<I: IntoIterator<Item = MemoryResult>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryType;
    use chrono::Utc;

    fn sample() -> Memory {
        Memory {
            id: "m1".into(),
            r#type: MemoryType::Decision,
            t: Utc::now(),
            summary: "hello".into(),
            confidence: Some(0.9),
            tags: vec!["x".into()],
            refs: vec![],
            priority: 1,
            session_id: None,
            valid_from: None,
            access_count: 0,
            last_accessed: None,
            deleted_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn aliases_resolve_to_underlying_fields() {
        let result = MemoryResult::new(sample());
        assert_eq!(result.get("content").unwrap(), json!("hello"));
        assert_eq!(result.get("conf").unwrap(), json!(0.9));
    }

    #[test]
    fn unknown_field_suggests_the_nearest_match() {
        let result = MemoryResult::new(sample());
        let err = result.get("summry").unwrap_err();
        match err {
            MuninnError::UnknownField { suggestion, .. } => assert_eq!(suggestion, "summary"),
            other => panic!("expected UnknownField, got {other:?}"),
        }
    }

    #[test]
    fn wildly_unknown_field_gets_no_suggestion() {
        let result = MemoryResult::new(sample());
        let err = result.get("zzzzzzzzzz").unwrap_err();
        assert!(matches!(err, MuninnError::UnknownFieldNoSuggestion(_)));
    }
}
