//! Configuration for the perception-decision-action loop.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default page opened before the first task.
pub const DEFAULT_START_URL: &str = "https://www.google.com";

/// Limits and pacing for one control-loop run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentLoopConfig {
    /// Maximum entries into `Observing` before the run fails.
    /// Default: 30
    pub max_iterations: u32,

    /// Cumulative recoverable errors tolerated. The run fails once the
    /// count exceeds this value.
    /// Default: 3
    pub max_errors: u32,

    /// Identical (observation, action) pairs in a row that count as a stall.
    /// Zero disables the guard.
    /// Default: 3
    pub repetition_threshold: usize,

    /// Size of the history ring buffer.
    /// Default: 20
    pub history_capacity: usize,

    /// Timeout for one oracle call in milliseconds.
    /// Default: 60000
    pub oracle_timeout_ms: u64,

    /// Pause between iterations in milliseconds.
    /// Default: 1000
    pub wait_between_iterations_ms: u64,

    /// Navigation timeout in milliseconds.
    /// Default: 30000
    pub navigation_timeout_ms: u64,

    /// Longest pause a `wait` action may request, in milliseconds.
    /// Default: 10000
    pub max_wait_ms: u64,

    /// Page opened for the first task.
    pub start_url: String,

    /// Pixels scrolled by the scroll-then-retry recovery step.
    /// Default: 300
    pub recovery_scroll_px: u32,

    /// Link depth of the exploration crawl.
    /// Default: 2
    pub exploration_depth: u32,

    /// Page cap for the exploration crawl.
    /// Default: 10
    pub exploration_max_pages: usize,

    /// Characters of extracted text stored in a memory fact.
    /// Default: 500
    pub excerpt_chars: usize,

    /// Characters returned by an `extract` action.
    /// Default: 2000
    pub extract_max_chars: usize,

    /// Number of links returned by a `links` extraction.
    /// Default: 20
    pub extract_link_limit: usize,
}

impl Default for AgentLoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: 30,
            max_errors: 3,
            repetition_threshold: 3,
            history_capacity: 20,
            oracle_timeout_ms: 60_000,
            wait_between_iterations_ms: 1_000,
            navigation_timeout_ms: 30_000,
            max_wait_ms: 10_000,
            start_url: DEFAULT_START_URL.to_string(),
            recovery_scroll_px: 300,
            exploration_depth: 2,
            exploration_max_pages: 10,
            excerpt_chars: 500,
            extract_max_chars: 2_000,
            extract_link_limit: 20,
        }
    }
}

impl AgentLoopConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a minimal config for testing: no pacing, short timeouts.
    pub fn minimal() -> Self {
        Self {
            max_iterations: 10,
            max_errors: 3,
            oracle_timeout_ms: 2_000,
            wait_between_iterations_ms: 0,
            navigation_timeout_ms: 5_000,
            exploration_max_pages: 3,
            ..Self::default()
        }
    }

    /// Builder: set the iteration ceiling.
    pub fn max_iterations(mut self, iterations: u32) -> Self {
        self.max_iterations = iterations;
        self
    }

    /// Builder: set the error budget.
    pub fn max_errors(mut self, errors: u32) -> Self {
        self.max_errors = errors;
        self
    }

    /// Builder: set the repetition threshold.
    pub fn repetition_threshold(mut self, threshold: usize) -> Self {
        self.repetition_threshold = threshold;
        self
    }

    /// Builder: set the oracle timeout.
    pub fn oracle_timeout(mut self, ms: u64) -> Self {
        self.oracle_timeout_ms = ms;
        self
    }

    /// Builder: set the pause between iterations.
    pub fn wait_between_iterations(mut self, ms: u64) -> Self {
        self.wait_between_iterations_ms = ms;
        self
    }

    /// Builder: set the longest allowed `wait`.
    pub fn max_wait(mut self, ms: u64) -> Self {
        self.max_wait_ms = ms;
        self
    }

    /// Builder: set the start page.
    pub fn start_url(mut self, url: impl Into<String>) -> Self {
        self.start_url = url.into();
        self
    }

    /// Ring buffer size, never smaller than the repetition threshold so a
    /// stall stays detectable.
    pub fn history_len(&self) -> usize {
        self.history_capacity.max(self.repetition_threshold)
    }

    pub fn oracle_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.oracle_timeout_ms)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn iteration_pause(&self) -> Duration {
        Duration::from_millis(self.wait_between_iterations_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AgentLoopConfig::default();
        assert_eq!(config.max_iterations, 30);
        assert_eq!(config.max_errors, 3);
        assert_eq!(config.repetition_threshold, 3);
        assert_eq!(config.start_url, "https://www.google.com");
        assert_eq!(config.max_wait_ms, 10_000);
    }

    #[test]
    fn test_builder() {
        let config = AgentLoopConfig::new()
            .max_iterations(5)
            .max_errors(2)
            .wait_between_iterations(0);

        assert_eq!(config.max_iterations, 5);
        assert_eq!(config.max_errors, 2);
        assert_eq!(config.iteration_pause(), Duration::ZERO);
    }

    #[test]
    fn test_history_len_covers_threshold() {
        let mut config = AgentLoopConfig::default().repetition_threshold(5);
        config.history_capacity = 3;
        assert_eq!(config.history_len(), 5);
        config.history_capacity = 8;
        assert_eq!(config.history_len(), 8);
    }

    #[test]
    fn test_partial_deserialize_keeps_defaults() {
        let config: AgentLoopConfig =
            serde_json::from_str(r#"{"max_iterations": 12}"#).unwrap();
        assert_eq!(config.max_iterations, 12);
        assert_eq!(config.history_capacity, 20);
        assert_eq!(config.exploration_depth, 2);
    }
}
