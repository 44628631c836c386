//! Scale persistence — a JSON sidecar file next to the executable.
//!
//! The file is a JSON array of `{id, scale}` objects. A missing, unreadable
//! or empty file is the same as having nothing persisted.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use scale_net::ScaleEntry;
use scale_region::{ScaleMap, is_valid_scale};

use crate::error::PersistenceError;

/// File name used when no explicit path is configured.
pub const PERSISTENCE_FILE_NAME: &str = "scales.json";

/// Loads and saves the scale table.
#[derive(Debug, Clone)]
pub struct ScalePersistence {
    path: PathBuf,
}

impl ScalePersistence {
    /// Persist to `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Persist to [`PERSISTENCE_FILE_NAME`] in the executable's directory,
    /// or in the working directory if that cannot be determined.
    #[must_use]
    pub fn beside_executable() -> Self {
        let dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_default();
        Self::new(dir.join(PERSISTENCE_FILE_NAME))
    }

    /// Returns the sidecar file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted scales.
    ///
    /// Returns `None` if the file is absent, cannot be parsed or holds no
    /// valid entries.
    #[must_use]
    pub fn load(&self) -> Option<ScaleMap> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no persisted scales");
                return None;
            }
            Err(err) => {
                warn!(path = %self.path.display(), %err, "failed to read persisted scales");
                return None;
            }
        };

        let entries: Vec<ScaleEntry> = match serde_json::from_str(&text) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(path = %self.path.display(), %err, "ignoring unparsable persisted scales");
                return None;
            }
        };

        let scales: ScaleMap = entries
            .into_iter()
            .filter(|e| e.id != 0 && is_valid_scale(e.scale))
            .map(|e| (e.id, e.scale))
            .collect();
        if scales.is_empty() {
            return None;
        }
        info!(path = %self.path.display(), entries = scales.len(), "loaded persisted scales");
        Some(scales)
    }

    /// Save `scales`, or delete the file if `scales` is `None` or empty.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if writing or deleting fails. Deleting a
    /// file that does not exist is not an error.
    pub fn save(&self, scales: Option<&ScaleMap>) -> Result<(), PersistenceError> {
        let Some(scales) = scales.filter(|s| !s.is_empty()) else {
            return match std::fs::remove_file(&self.path) {
                Ok(()) => {
                    info!(path = %self.path.display(), "cleared persisted scales");
                    Ok(())
                }
                Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
                Err(err) => Err(err.into()),
            };
        };

        let entries: Vec<ScaleEntry> = scales
            .iter()
            .map(|(&id, &scale)| ScaleEntry { id, scale })
            .collect();
        let text = serde_json::to_string_pretty(&entries)?;
        std::fs::write(&self.path, text)?;
        info!(path = %self.path.display(), entries = entries.len(), "saved scales");
        Ok(())
    }
}
