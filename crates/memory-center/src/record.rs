use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::FORMAT_VERSION;

/// One stored value and when it was last written.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemoryFact {
    pub value: Value,
    pub updated_at: DateTime<Utc>,
}

/// Flattened view of a fact, used for listings and oracle context.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub category: String,
    pub key: String,
    pub value: Value,
    pub updated_at: DateTime<Utc>,
}

/// In-memory image of the store: category -> key -> fact, insertion ordered.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    #[serde(default)]
    categories: IndexMap<String, IndexMap<String, MemoryFact>>,
}

impl MemoryRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace `category/key`. Returns true when the key was new.
    pub fn upsert(&mut self, category: &str, key: &str, value: Value) -> bool {
        self.upsert_at(category, key, value, Utc::now())
    }

    fn upsert_at(&mut self, category: &str, key: &str, value: Value, at: DateTime<Utc>) -> bool {
        let facts = self.categories.entry(category.to_string()).or_default();
        let fact = MemoryFact {
            value,
            updated_at: at,
        };
        facts.insert(key.to_string(), fact).is_none()
    }

    pub fn get(&self, category: &str, key: &str) -> Option<&MemoryFact> {
        self.categories.get(category)?.get(key)
    }

    pub fn category(&self, category: &str) -> Option<&IndexMap<String, MemoryFact>> {
        self.categories.get(category)
    }

    pub fn category_names(&self) -> impl Iterator<Item = &str> {
        self.categories.keys().map(String::as_str)
    }

    /// Remove one category, or everything when `category` is `None`.
    /// Returns the number of facts dropped; unknown categories drop nothing.
    pub fn clear(&mut self, category: Option<&str>) -> usize {
        match category {
            Some(name) => self
                .categories
                .shift_remove(name)
                .map(|facts| facts.len())
                .unwrap_or(0),
            None => {
                let removed = self.len();
                self.categories.clear();
                removed
            }
        }
    }

    pub fn len(&self) -> usize {
        self.categories.values().map(IndexMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn entries(&self) -> Vec<MemoryEntry> {
        self.categories
            .iter()
            .flat_map(|(category, facts)| {
                facts.iter().map(move |(key, fact)| MemoryEntry {
                    category: category.clone(),
                    key: key.clone(),
                    value: fact.value.clone(),
                    updated_at: fact.updated_at,
                })
            })
            .collect()
    }

    /// The `limit` most recently written facts, newest first.
    pub fn recent(&self, limit: usize) -> Vec<MemoryEntry> {
        let mut entries = self.entries();
        entries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        entries.truncate(limit);
        entries
    }

    /// Facts whose key names `host`, either exactly or as a path under it.
    pub fn facts_for_host(&self, host: &str) -> Vec<MemoryEntry> {
        let host = host.to_ascii_lowercase();
        self.entries()
            .into_iter()
            .filter(|entry| {
                let key = entry.key.to_ascii_lowercase();
                key == host
                    || key
                        .strip_prefix(host.as_str())
                        .is_some_and(|rest| rest.starts_with('/') || rest.starts_with(':'))
            })
            .collect()
    }

    pub(crate) fn to_file(&self) -> MemoryFile {
        MemoryFile {
            version: FORMAT_VERSION,
            categories: self.categories.clone(),
        }
    }

    /// Decode either the versioned layout or the older flat layout.
    pub(crate) fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        match serde_json::from_slice::<StoredMemory>(bytes)? {
            StoredMemory::Current(file) => Ok(Self {
                categories: file.categories,
            }),
            StoredMemory::Legacy(entries) => Ok(Self::from_legacy(entries)),
        }
    }

    fn from_legacy(entries: BTreeMap<String, LegacyEntry>) -> Self {
        let mut ordered: Vec<LegacyEntry> = entries.into_values().collect();
        ordered.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        let mut record = Self::new();
        for entry in ordered {
            let at = entry
                .timestamp
                .as_deref()
                .and_then(parse_legacy_timestamp)
                .unwrap_or_else(Utc::now);
            record.upsert_at(&entry.category, &entry.key, entry.value, at);
        }
        record
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct MemoryFile {
    #[serde(default = "default_version")]
    pub version: u32,
    pub categories: IndexMap<String, IndexMap<String, MemoryFact>>,
}

fn default_version() -> u32 {
    FORMAT_VERSION
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StoredMemory {
    Current(MemoryFile),
    Legacy(BTreeMap<String, LegacyEntry>),
}

#[derive(Debug, Deserialize)]
struct LegacyEntry {
    key: String,
    value: Value,
    #[serde(default = "default_legacy_category")]
    category: String,
    #[serde(default)]
    timestamp: Option<String>,
}

fn default_legacy_category() -> String {
    "general".to_string()
}

fn parse_legacy_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn upsert_replaces_existing_key() {
        let mut record = MemoryRecord::new();
        assert!(record.upsert("website", "example.com", json!("first")));
        assert!(!record.upsert("website", "example.com", json!("second")));
        assert_eq!(record.len(), 1);
        assert_eq!(
            record.get("website", "example.com").unwrap().value,
            json!("second")
        );
    }

    #[test]
    fn merging_same_value_twice_is_idempotent() {
        let mut once = MemoryRecord::new();
        once.upsert("prefs", "lang", json!("en"));
        let mut twice = once.clone();
        twice.upsert("prefs", "lang", json!("en"));
        assert_eq!(once.entries().len(), twice.entries().len());
        assert_eq!(
            once.get("prefs", "lang").unwrap().value,
            twice.get("prefs", "lang").unwrap().value
        );
    }

    #[test]
    fn clear_is_scoped_and_idempotent() {
        let mut record = MemoryRecord::new();
        record.upsert("website", "a.com", json!(1));
        record.upsert("website", "b.com", json!(2));
        record.upsert("prefs", "lang", json!("en"));

        assert_eq!(record.clear(Some("missing")), 0);
        assert_eq!(record.clear(Some("website")), 2);
        assert_eq!(record.clear(Some("website")), 0);
        assert!(record.get("prefs", "lang").is_some());

        assert_eq!(record.clear(None), 1);
        assert!(record.is_empty());
    }

    #[test]
    fn facts_for_host_matches_host_and_paths() {
        let mut record = MemoryRecord::new();
        record.upsert("website", "example.com", json!("root"));
        record.upsert("website", "example.com/pricing", json!("pricing"));
        record.upsert("website", "example.com.evil.net", json!("other"));
        record.upsert("exploration", "Example.com/docs", json!("docs"));

        let keys: Vec<String> = record
            .facts_for_host("example.com")
            .into_iter()
            .map(|entry| entry.key)
            .collect();
        assert_eq!(
            keys,
            vec!["example.com", "example.com/pricing", "Example.com/docs"]
        );
    }

    #[test]
    fn recent_returns_newest_first() {
        let mut record = MemoryRecord::new();
        let base = Utc::now();
        record.upsert_at("a", "old", json!(1), base - chrono::Duration::seconds(10));
        record.upsert_at("b", "new", json!(2), base);
        record.upsert_at("a", "mid", json!(3), base - chrono::Duration::seconds(5));

        let recent = record.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].key, "new");
        assert_eq!(recent[1].key, "mid");
    }

    #[test]
    fn decodes_flat_layout() {
        let raw = br#"{
            "5b1c": {"key": "google.com", "value": "search engine", "category": "website", "timestamp": "2024-03-01T10:00:00.123456"},
            "0a9f": {"key": "name", "value": "Ada", "category": "user_info", "timestamp": "2024-03-01T09:00:00"}
        }"#;
        let record = MemoryRecord::from_slice(raw).unwrap();
        assert_eq!(record.len(), 2);
        assert_eq!(
            record.get("website", "google.com").unwrap().value,
            json!("search engine")
        );
        let names: Vec<&str> = record.category_names().collect();
        assert_eq!(names, vec!["user_info", "website"]);
    }

    #[test]
    fn decodes_versioned_layout() {
        let mut record = MemoryRecord::new();
        record.upsert("website", "example.com", json!({"title": "Example"}));
        let bytes = serde_json::to_vec(&record.to_file()).unwrap();
        let decoded = MemoryRecord::from_slice(&bytes).unwrap();
        assert_eq!(decoded, record);
    }
}
