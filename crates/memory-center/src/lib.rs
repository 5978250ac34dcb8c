//! Durable categorized fact store.
//!
//! Facts are grouped by category (for example `website`) and keyed within a
//! category. A key is unique per category; merging an existing key replaces
//! its value and refreshes its timestamp. The store is loaded once per
//! assistant and flushed by the caller, so several merges can share one
//! durable write.

mod record;
mod store;

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

pub use record::{MemoryEntry, MemoryFact, MemoryRecord};
pub use store::{MemoryStore, MemoryTransaction};

pub type SharedMemoryStore = Arc<MemoryStore>;

/// Version tag written into the persisted file.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("memory file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode memory: {0}")]
    Encode(#[from] serde_json::Error),
}

impl MemoryError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
