use std::fs;
use std::sync::Arc;
use std::thread;

use memory_center::{MemoryStore, FORMAT_VERSION};
use serde_json::{json, Value};
use tempfile::tempdir;

#[test]
fn missing_file_loads_empty() {
    let dir = tempdir().unwrap();
    let store = MemoryStore::new(dir.path().join("memory.json"));
    assert!(store.load().is_empty());
}

#[test]
fn corrupted_file_loads_empty() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("memory.json");
    fs::write(&path, b"{ not json").unwrap();

    let store = MemoryStore::new(&path);
    assert!(store.load().is_empty());

    store.merge("website", "example.com", json!("ok"));
    store.save().unwrap();
    assert_eq!(MemoryStore::new(&path).load().len(), 1);
}

#[test]
fn save_round_trips_and_leaves_no_temp_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("memory.json");
    let store = MemoryStore::new(&path);
    store.ensure_loaded();
    store.merge("website", "example.com", json!({"title": "Example"}));
    store.merge("user_info", "name", json!("Ada"));
    store.save().unwrap();

    let raw: Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
    assert_eq!(raw["version"], json!(FORMAT_VERSION));
    assert_eq!(
        raw["categories"]["website"]["example.com"]["value"]["title"],
        json!("Example")
    );
    assert!(!dir.path().join("nested").join("memory.json.tmp").exists());

    let reloaded = MemoryStore::new(&path).load();
    let categories: Vec<&str> = reloaded.category_names().collect();
    assert_eq!(categories, vec!["website", "user_info"]);
}

#[test]
fn clear_persists_immediately() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("memory.json");
    let store = MemoryStore::new(&path);
    store.merge("website", "a.com", json!(1));
    store.merge("prefs", "lang", json!("en"));
    store.save().unwrap();

    assert_eq!(store.clear(Some("website")).unwrap(), 1);
    assert_eq!(store.clear(Some("website")).unwrap(), 0);

    let reloaded = MemoryStore::new(&path).load();
    assert!(reloaded.category("website").is_none());
    assert!(reloaded.get("prefs", "lang").is_some());
}

#[test]
fn flat_layout_is_migrated_on_save() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("memory.json");
    fs::write(
        &path,
        r#"{"c0ffee": {"key": "docs.rs", "value": "crate docs", "category": "website", "timestamp": "2024-05-02T08:30:00"}}"#,
    )
    .unwrap();

    let store = MemoryStore::new(&path);
    store.ensure_loaded();
    store.save().unwrap();

    let raw: Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
    assert_eq!(
        raw["categories"]["website"]["docs.rs"]["value"],
        json!("crate docs")
    );
}

#[test]
fn transactions_serialize_read_modify_write() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("memory.json");
    let store = Arc::new(MemoryStore::new(&path));
    store.ensure_loaded();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let mut tx = store.transaction();
                let current = tx
                    .record()
                    .get("counter", "value")
                    .and_then(|fact| fact.value.as_u64())
                    .unwrap_or(0);
                tx.merge("counter", "value", json!(current + 1));
                tx.merge("workers", &format!("w{i}"), json!(true));
                tx.commit().unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let reloaded = MemoryStore::new(&path).load();
    assert_eq!(reloaded.get("counter", "value").unwrap().value, json!(8));
    assert_eq!(reloaded.category("workers").unwrap().len(), 8);
}
