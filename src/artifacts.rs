//! Debug artifacts: one screenshot per iteration plus a JSON-lines step log.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use agent_core::{ActionOutcome, AgentDecision, DebugSink};
use chrono::Utc;
use serde_json::json;
use tracing::{debug, warn};
use webpilot_core_types::Observation;

pub const STEP_LOG: &str = "steps.jsonl";

/// Writes `step_<n>_<timestamp>.png` and appends decisions/outcomes to
/// `steps.jsonl` under one directory. I/O failures are logged and ignored.
pub struct ArtifactSink {
    dir: PathBuf,
}

impl ArtifactSink {
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn append(&self, record: serde_json::Value) {
        let path = self.dir.join(STEP_LOG);
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut file| writeln!(file, "{record}"));
        if let Err(err) = result {
            warn!(path = %path.display(), error = %err, "failed to append step log");
        }
    }
}

impl DebugSink for ArtifactSink {
    fn on_observation(&self, iteration: u32, observation: &Observation) {
        let Some(screenshot) = &observation.screenshot else {
            return;
        };
        let name = format!(
            "step_{iteration:03}_{}.png",
            Utc::now().format("%Y%m%d_%H%M%S")
        );
        let path = self.dir.join(name);
        match fs::write(&path, &screenshot.png) {
            Ok(()) => debug!(path = %path.display(), "screenshot saved"),
            Err(err) => warn!(path = %path.display(), error = %err, "failed to save screenshot"),
        }
    }

    fn on_decision(&self, iteration: u32, decision: &AgentDecision) {
        self.append(json!({
            "iteration": iteration,
            "at": Utc::now().to_rfc3339(),
            "decision": decision,
        }));
    }

    fn on_outcome(&self, iteration: u32, outcome: &ActionOutcome) {
        self.append(json!({
            "iteration": iteration,
            "at": Utc::now().to_rfc3339(),
            "outcome": outcome,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::Action;

    #[test]
    fn writes_screenshots_and_step_log() {
        let dir = tempfile::tempdir().unwrap();
        let sink = ArtifactSink::new(dir.path().join("shots")).unwrap();

        let observation =
            Observation::new("https://example.com/", None, "hi").with_screenshot(vec![1, 2, 3]);
        sink.on_observation(1, &observation);
        sink.on_observation(2, &Observation::new("https://example.com/", None, "no image"));
        sink.on_decision(1, &AgentDecision::new(Action::Wait { duration_ms: 10 }));
        sink.on_outcome(1, &ActionOutcome::completed());

        let pngs: Vec<_> = fs::read_dir(sink.dir())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "png"))
            .collect();
        assert_eq!(pngs.len(), 1);
        assert!(pngs[0].file_name().to_string_lossy().starts_with("step_001_"));

        let log = fs::read_to_string(sink.dir().join(STEP_LOG)).unwrap();
        let lines: Vec<serde_json::Value> = log
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["decision"]["action"]["action"], "wait");
        assert_eq!(lines[1]["outcome"]["outcome"], "completed");
    }
}
