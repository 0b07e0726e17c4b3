use std::fs;
use std::path::PathBuf;

use tracing::warn;

use super::registry::TaskTable;
use super::types::SchedulerError;

/// File-backed task table, stored as pretty-printed JSON keyed by
/// session id and then task id.
#[derive(Debug)]
pub(super) struct JsonTaskStore {
    path: PathBuf,
}

impl JsonTaskStore {
    pub(super) fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load the persisted table. A missing file is a normal first start;
    /// an unreadable or corrupt file degrades to an empty table so the
    /// daemon still comes up.
    pub(super) fn load(&self) -> TaskTable {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return TaskTable::new();
            }
            Err(err) => {
                warn!(
                    "failed to read task table {}: {}; starting empty",
                    self.path.display(),
                    err
                );
                return TaskTable::new();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(table) => table,
            Err(err) => {
                warn!(
                    "failed to parse task table {}: {}; starting empty",
                    self.path.display(),
                    err
                );
                TaskTable::new()
            }
        }
    }

    /// Write the whole table atomically (temp file, then rename).
    pub(super) fn save(&self, table: &TaskTable) -> Result<(), SchedulerError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let serialized = serde_json::to_string_pretty(table)?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, serialized)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}
