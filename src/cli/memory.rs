use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use memory_center::{MemoryEntry, MemoryRecord};
use serde_json::{json, Value};

use super::context::CliContext;
use super::output::render;

#[derive(Args, Clone, Debug)]
pub struct MemoryArgs {
    #[command(subcommand)]
    pub command: MemoryCommand,
}

#[derive(Subcommand, Clone, Debug)]
pub enum MemoryCommand {
    /// Print remembered facts
    Show {
        /// Only this category
        #[arg(long)]
        category: Option<String>,
    },
    /// Forget facts and save the file
    Clear {
        /// Only this category; everything when omitted
        #[arg(long)]
        category: Option<String>,
    },
}

pub async fn cmd_memory(args: MemoryArgs, ctx: &CliContext) -> Result<()> {
    let store = ctx.memory_store();
    let record = store.load();
    match args.command {
        MemoryCommand::Show { category } => {
            let entries = entries_in(&record, category.as_deref());
            match render(ctx.output(), &entries)? {
                Some(text) => println!("{text}"),
                None => print!("{}", format_memory(&record, category.as_deref())),
            }
        }
        MemoryCommand::Clear { category } => {
            let removed = store
                .clear(category.as_deref())
                .with_context(|| format!("Failed to save {}", ctx.config().memory.path.display()))?;
            let scope = category.as_deref().unwrap_or("all");
            let payload = json!({ "category": scope, "removed": removed });
            match render(ctx.output(), &payload)? {
                Some(text) => println!("{text}"),
                None => println!("Memory cleared ({scope}): {removed} fact(s) removed."),
            }
        }
    }
    Ok(())
}

fn entries_in(record: &MemoryRecord, category: Option<&str>) -> Vec<MemoryEntry> {
    record
        .entries()
        .into_iter()
        .filter(|entry| category.map_or(true, |wanted| entry.category == wanted))
        .collect()
}

/// Human-readable listing grouped by category, in stored order.
pub fn format_memory(record: &MemoryRecord, category: Option<&str>) -> String {
    let entries = entries_in(record, category);
    if entries.is_empty() {
        return match category {
            Some(name) => format!("No facts in category '{name}'.\n"),
            None => "Memory is empty.\n".to_string(),
        };
    }
    let mut out = String::new();
    let mut current: Option<&str> = None;
    for entry in &entries {
        if current != Some(entry.category.as_str()) {
            out.push_str(&format!("[{}]\n", entry.category));
            current = Some(entry.category.as_str());
        }
        let value = match &entry.value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        out.push_str(&format!(
            "  {}: {}  ({})\n",
            entry.key,
            value,
            entry.updated_at.format("%Y-%m-%d %H:%M")
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_by_category() {
        let mut record = MemoryRecord::new();
        record.upsert("website", "docs.rs", json!("crate docs"));
        record.upsert("website", "crates.io", json!({"title": "crates"}));
        record.upsert("task_pattern", "search", json!("use the top box"));

        let text = format_memory(&record, None);
        assert!(text.starts_with("[website]\n  docs.rs: crate docs"));
        assert!(text.contains("  crates.io: {\"title\":\"crates\"}"));
        assert!(text.contains("[task_pattern]\n  search: use the top box"));

        let only = format_memory(&record, Some("task_pattern"));
        assert!(!only.contains("[website]"));
        assert_eq!(format_memory(&record, Some("nothing")), "No facts in category 'nothing'.\n");
        assert_eq!(format_memory(&MemoryRecord::new(), None), "Memory is empty.\n");
    }
}
