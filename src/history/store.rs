use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::log::Turn;
use crate::error::{ConversationError, Result};

/// Durable storage for the conversation log snapshot
pub trait HistoryStore: Send + Sync {
    /// Read the persisted snapshot. A store that was never written is empty.
    fn load(&self) -> Result<Vec<Turn>>;

    /// Overwrite the persisted snapshot
    fn save(&self, turns: &[Turn]) -> Result<()>;
}

/// Stores the log as a JSON array of `{role, content}` in a single file
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl HistoryStore for JsonFileStore {
    fn load(&self) -> Result<Vec<Turn>> {
        if !self.path.exists() {
            debug!("No history at {}", self.path.display());
            return Ok(Vec::new());
        }

        let data = fs::read(&self.path)?;
        serde_json::from_slice(&data).map_err(|e| {
            ConversationError::HistoryPersistFailed(format!("{}: {}", self.path.display(), e))
        })
    }

    fn save(&self, turns: &[Turn]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let data = serde_json::to_vec_pretty(turns)
            .map_err(|e| ConversationError::HistoryPersistFailed(e.to_string()))?;

        // Write-then-rename so a crash mid-write never truncates the log
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &self.path)?;

        debug!("Persisted {} turns to {}", turns.len(), self.path.display());
        Ok(())
    }
}
