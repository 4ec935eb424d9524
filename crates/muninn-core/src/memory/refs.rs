//! The `refs` sum type.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// One entry of a memory's `refs` list: either the id of another memory, a
/// reserved `"alternative"` object (for `decision` records), or an arbitrary
/// typed object the engine doesn't interpret but preserves for forward
/// compatibility.
#[derive(Debug, Clone, PartialEq)]
pub enum RefEntry {
    Id(String),
    Alternative { option: String, rejected: Option<String> },
    Other(Map<String, Value>),
}

impl RefEntry {
    pub fn id(id: impl Into<String>) -> Self {
        RefEntry::Id(id.into())
    }

    pub fn alternative(option: impl Into<String>, rejected: Option<String>) -> Self {
        RefEntry::Alternative {
            option: option.into(),
            rejected,
        }
    }

    pub fn as_id(&self) -> Option<&str> {
        match self {
            RefEntry::Id(id) => Some(id),
            _ => None,
        }
    }
}

impl Serialize for RefEntry {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            RefEntry::Id(id) => serializer.serialize_str(id),
            RefEntry::Alternative { option, rejected } => {
                use serde::ser::SerializeMap;
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("type", "alternative")?;
                map.serialize_entry("option", option)?;
                if let Some(rejected) = rejected {
                    map.serialize_entry("rejected", rejected)?;
                }
                map.end()
            }
            RefEntry::Other(map) => map.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for RefEntry {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        match value {
            Value::String(id) => Ok(RefEntry::Id(id)),
            Value::Object(mut map) => {
                if map.get("type").and_then(Value::as_str) == Some("alternative") {
                    let option = map
                        .remove("option")
                        .and_then(|v| v.as_str().map(str::to_string))
                        .ok_or_else(|| D::Error::custom("alternative ref missing `option`"))?;
                    let rejected = map.remove("rejected").and_then(|v| v.as_str().map(str::to_string));
                    Ok(RefEntry::Alternative { option, rejected })
                } else {
                    Ok(RefEntry::Other(map))
                }
            }
            other => Err(D::Error::custom(format!("invalid refs entry: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_entries_round_trip_as_bare_strings() {
        let entry = RefEntry::id("m1");
        let json = serde_json::to_string(&entry).unwrap();
        assert_eq!(json, "\"m1\"");
        let back: RefEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn alternative_entries_round_trip_as_tagged_objects() {
        let entry = RefEntry::alternative("light mode", Some("too bright".to_string()));
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "alternative");
        assert_eq!(json["option"], "light mode");
        let back: RefEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn unrecognized_objects_are_preserved_opaquely() {
        let json = serde_json::json!({"type": "custom", "payload": 1});
        let entry: RefEntry = serde_json::from_value(json.clone()).unwrap();
        assert!(matches!(entry, RefEntry::Other(_)));
        assert_eq!(serde_json::to_value(&entry).unwrap(), json);
    }
}
