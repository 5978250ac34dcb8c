use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, MutexGuard};
use serde_json::Value;
use tracing::{debug, warn};

use crate::record::{MemoryEntry, MemoryRecord};
use crate::MemoryError;

#[derive(Default)]
struct StoreState {
    record: MemoryRecord,
    loaded: bool,
}

/// File-backed memory shared by every task an assistant runs.
///
/// All access goes through one in-process mutex, so a
/// [`MemoryTransaction`] makes `load + merge + save` a critical section.
/// Across processes `save` is last-writer-wins.
pub struct MemoryStore {
    path: Option<PathBuf>,
    state: Mutex<StoreState>,
}

impl MemoryStore {
    /// Store backed by `path`. Nothing is read until [`load`](Self::load).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            state: Mutex::new(StoreState::default()),
        }
    }

    /// Store without a backing file; `save` is a no-op.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(StoreState {
                record: MemoryRecord::new(),
                loaded: true,
            }),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Take the single-writer lock. Do not hold the guard across an await.
    pub fn transaction(&self) -> MemoryTransaction<'_> {
        MemoryTransaction {
            path: self.path.as_deref(),
            state: self.state.lock(),
        }
    }

    /// Re-read backing storage, replacing in-memory state.
    pub fn load(&self) -> MemoryRecord {
        let mut tx = self.transaction();
        tx.reload();
        tx.record().clone()
    }

    /// Load from disk on first use only.
    pub fn ensure_loaded(&self) {
        let mut tx = self.transaction();
        if !tx.state.loaded {
            tx.reload();
        }
    }

    pub fn merge(&self, category: &str, key: &str, value: Value) {
        self.transaction().merge(category, key, value);
    }

    pub fn save(&self) -> Result<(), MemoryError> {
        self.transaction().save()
    }

    /// Clear one category (or all) and persist the result.
    pub fn clear(&self, category: Option<&str>) -> Result<usize, MemoryError> {
        let mut tx = self.transaction();
        let removed = tx.clear(category);
        tx.save()?;
        Ok(removed)
    }

    pub fn snapshot(&self) -> MemoryRecord {
        self.transaction().record().clone()
    }

    pub fn facts_for_host(&self, host: &str) -> Vec<MemoryEntry> {
        self.transaction().record().facts_for_host(host)
    }

    pub fn recent(&self, limit: usize) -> Vec<MemoryEntry> {
        self.transaction().record().recent(limit)
    }
}

/// Exclusive access to a [`MemoryStore`]; the lock is released on drop.
pub struct MemoryTransaction<'a> {
    path: Option<&'a Path>,
    state: MutexGuard<'a, StoreState>,
}

impl MemoryTransaction<'_> {
    pub fn record(&self) -> &MemoryRecord {
        &self.state.record
    }

    /// Replace in-memory state with the backing file. Missing or unreadable
    /// files yield an empty record.
    pub fn reload(&mut self) -> &MemoryRecord {
        self.state.record = match self.path {
            Some(path) => read_record(path),
            None => MemoryRecord::new(),
        };
        self.state.loaded = true;
        &self.state.record
    }

    pub fn merge(&mut self, category: &str, key: &str, value: Value) {
        self.state.record.upsert(category, key, value);
    }

    pub fn clear(&mut self, category: Option<&str>) -> usize {
        self.state.record.clear(category)
    }

    /// Atomically replace the backing file with the current record.
    pub fn save(&mut self) -> Result<(), MemoryError> {
        let Some(path) = self.path else {
            return Ok(());
        };
        let bytes = serde_json::to_vec_pretty(&self.state.record.to_file())?;
        write_atomic(path, &bytes)?;
        debug!(path = %path.display(), facts = self.state.record.len(), "memory saved");
        Ok(())
    }

    pub fn commit(mut self) -> Result<(), MemoryError> {
        self.save()
    }
}

fn read_record(path: &Path) -> MemoryRecord {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => return MemoryRecord::new(),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "memory file unreadable, starting empty");
            return MemoryRecord::new();
        }
    };
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return MemoryRecord::new();
    }
    match MemoryRecord::from_slice(&bytes) {
        Ok(record) => record,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "memory file malformed, starting empty");
            MemoryRecord::new()
        }
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), MemoryError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| MemoryError::io(parent, err))?;
    }
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);

    let result = (|| {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();
    if let Err(err) = result {
        let _ = fs::remove_file(&tmp);
        return Err(MemoryError::io(path, err));
    }
    Ok(())
}
