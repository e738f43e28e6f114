// Durable grid snapshot on the local filesystem

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::core::state::{GridState, STATE_VERSION};
use crate::error::{TradingError, TradingResult};

/// Indented JSON snapshot of [`GridState`], replaced atomically on save
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the last committed snapshot. A missing, unreadable or
    /// incompatible file yields a fresh empty state.
    pub fn load(&self) -> GridState {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No saved grid state, starting fresh");
                return GridState::default();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read grid state, starting fresh");
                return GridState::default();
            }
        };

        match serde_json::from_str::<GridState>(&content) {
            Ok(state) if state.version == STATE_VERSION => {
                info!(
                    path = %self.path.display(),
                    levels = state.levels.len(),
                    "📂 Restored grid state"
                );
                state
            }
            Ok(state) => {
                warn!(
                    path = %self.path.display(),
                    version = state.version,
                    expected = STATE_VERSION,
                    "Unsupported grid state version, starting fresh"
                );
                GridState::default()
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Corrupt grid state, starting fresh");
                GridState::default()
            }
        }
    }

    /// Write the full snapshot to a sibling temp file and rename it over the
    /// target, so readers only ever see a complete file.
    pub fn save(&self, state: &GridState) -> TradingResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.error("create directory for", e))?;
        }

        let json = serde_json::to_string_pretty(state)
            .map_err(|e| TradingError::Persistence(format!("failed to serialize grid state: {}", e)))?;

        let tmp = self.temp_path();
        fs::write(&tmp, json).map_err(|e| self.error("write", e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.error("replace", e))?;

        debug!(path = %self.path.display(), levels = state.levels.len(), "Grid state saved");
        Ok(())
    }

    /// Persist an empty state in place of the current snapshot
    pub fn clear(&self) -> TradingResult<()> {
        self.save(&GridState::default())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "grid_state.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn error(&self, action: &str, e: std::io::Error) -> TradingError {
        TradingError::Persistence(format!("failed to {} {}: {}", action, self.path.display(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_fresh_state() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path().join("absent.json"));
        assert_eq!(store.load(), GridState::default());
    }

    #[test]
    fn test_save_creates_parent_and_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("state.json");
        let store = StateStore::new(&path);

        store.save(&GridState::default()).unwrap();
        assert!(path.exists());
        assert!(!dir.path().join("nested").join("state.json.tmp").exists());
    }

    #[test]
    fn test_unknown_version_is_discarded() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, r#"{"version": 99, "levels": []}"#).unwrap();
        assert_eq!(StateStore::new(&path).load(), GridState::default());
    }
}
