use std::fs;
use std::path::Path;

use assert_cmd::Command;
use serde_json::Value;
use tempfile::TempDir;

const SEEDED: &str = r#"{
  "version": 1,
  "categories": {
    "website": {
      "docs.rs": { "value": "crate documentation", "updated_at": "2026-01-05T10:00:00Z" },
      "crates.io": { "value": { "title": "crates.io" }, "updated_at": "2026-01-05T10:01:00Z" }
    },
    "task_pattern": {
      "search": { "value": "use the top search box", "updated_at": "2026-01-05T10:02:00Z" }
    }
  }
}"#;

fn workspace() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("memory.json"), SEEDED).unwrap();
    dir
}

/// The binary isolated from the developer's config, `.env` and keys.
fn webpilot(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("webpilot").unwrap();
    cmd.current_dir(dir)
        .env("HOME", dir)
        .env("XDG_CONFIG_HOME", dir.join("xdg"))
        .env_remove("RUST_LOG")
        .env_remove("WEBPILOT_API_KEY")
        .arg("--memory-file")
        .arg(dir.join("memory.json"));
    cmd
}

fn stdout_of(cmd: &mut Command) -> String {
    let output = cmd.assert().success().get_output().stdout.clone();
    String::from_utf8(output).unwrap()
}

#[test]
fn show_lists_facts_by_category() {
    let dir = workspace();
    let out = stdout_of(webpilot(dir.path()).args(["memory", "show"]));
    assert!(out.contains("[website]"));
    assert!(out.contains("docs.rs: crate documentation"));
    assert!(out.contains("[task_pattern]"));
}

#[test]
fn show_json_filters_category() {
    let dir = workspace();
    let out = stdout_of(
        webpilot(dir.path()).args(["--output", "json", "memory", "show", "--category", "website"]),
    );
    let entries: Vec<Value> = serde_json::from_str(&out).unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|entry| entry["category"] == "website"));
}

#[test]
fn clear_category_persists() {
    let dir = workspace();
    let out = stdout_of(webpilot(dir.path()).args(["memory", "clear", "--category", "website"]));
    assert!(out.contains("2 fact(s) removed"));

    let stored: Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join("memory.json")).unwrap()).unwrap();
    assert!(stored["categories"].get("website").is_none());
    assert_eq!(
        stored["categories"]["task_pattern"]["search"]["value"],
        "use the top search box"
    );
}

#[test]
fn clear_all_empties_file() {
    let dir = workspace();
    stdout_of(webpilot(dir.path()).args(["memory", "clear"]));
    let out = stdout_of(webpilot(dir.path()).args(["memory", "show"]));
    assert!(out.contains("Memory is empty."));
}

#[test]
fn missing_memory_file_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let out = stdout_of(webpilot(dir.path()).args(["memory", "show"]));
    assert!(out.contains("Memory is empty."));
}

#[test]
fn run_without_api_key_fails() {
    let dir = tempfile::tempdir().unwrap();
    webpilot(dir.path())
        .env("WEBPILOT__ORACLE__API_KEY_ENV", "WEBPILOT_TEST_MISSING_KEY")
        .args(["run", "find", "something"])
        .assert()
        .failure();
}
