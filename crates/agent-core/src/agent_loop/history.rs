//! Bounded action history used for repetition detection and debug replay.

use std::collections::VecDeque;

use super::types::{Action, AgentHistoryEntry};

/// Ring buffer of the most recent executions; the oldest entry is evicted
/// once `capacity` is reached.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    entries: VecDeque<AgentHistoryEntry>,
    capacity: usize,
}

impl HistoryBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, entry: AgentHistoryEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&AgentHistoryEntry> {
        self.entries.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AgentHistoryEntry> {
        self.entries.iter()
    }

    /// Oldest first.
    pub fn to_vec(&self) -> Vec<AgentHistoryEntry> {
        self.entries.iter().cloned().collect()
    }

    /// True when the last `threshold` entries all executed `action` against
    /// the page identified by `fingerprint` and each of them completed.
    ///
    /// Failed executions are left to the error budget, so a retry streak
    /// never counts as a stall.
    pub fn is_repeating(&self, fingerprint: &str, action: &Action, threshold: usize) -> bool {
        if threshold == 0 || self.entries.len() < threshold {
            return false;
        }
        self.entries.iter().rev().take(threshold).all(|entry| {
            entry.fingerprint == fingerprint && &entry.action == action && entry.outcome.is_success()
        })
    }
}
