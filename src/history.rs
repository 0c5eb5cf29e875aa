//! Persistence of the statistics history as JSON.
//!
//! Only renders at the canonical benchmark resolution are worth keeping,
//! so history stays comparable across sessions. Saving is always an
//! explicit call by the owner of the aggregator, and replaces the file
//! atomically so an interrupted save never leaves a truncated history.

use crate::error::HistoryError;
use crate::stats::{ComputationRecord, StatsAggregator};
use log::{debug, info, warn};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

/// Canonical benchmark width.
pub const CANONICAL_WIDTH: u32 = 4096;
/// Canonical benchmark height.
pub const CANONICAL_HEIGHT: u32 = 4096;
/// Default history file name.
pub const DEFAULT_HISTORY_FILE: &str = "mandelbench-stats.json";

/// `path` with `suffix` appended to its file name.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Where an unreadable history file is moved by [`StatsAggregator::load_or_recover`].
pub fn backup_path(path: &Path) -> PathBuf {
    sibling(path, ".bak")
}

/// Whether renders at `width x height` are persisted.
pub fn is_canonical_resolution(width: u32, height: u32) -> bool {
    width == CANONICAL_WIDTH && height == CANONICAL_HEIGHT
}

impl StatsAggregator {
    /// Loads the history at `path`; a missing file yields an empty aggregator.
    pub fn load(path: &Path) -> Result<Self, HistoryError> {
        if !path.exists() {
            debug!("no history at {}, starting empty", path.display());
            return Ok(Self::new());
        }
        let text = fs::read_to_string(path)?;
        let records: Vec<ComputationRecord> = serde_json::from_str(&text)?;
        info!("loaded {} records from {}", records.len(), path.display());
        Ok(Self::from_records(records))
    }

    /// Loads the history at `path`, moving an unreadable file aside.
    ///
    /// When the file exists but cannot be parsed or read, it is renamed to
    /// [`backup_path`] and an empty aggregator is returned together with the
    /// backup location, so a later `save` cannot overwrite the old records.
    ///
    /// # Errors
    ///
    /// Returns the original load error if the file could not be moved; the
    /// caller must not save over it in that case.
    pub fn load_or_recover(path: &Path) -> Result<(Self, Option<PathBuf>), HistoryError> {
        let err = match Self::load(path) {
            Ok(history) => return Ok((history, None)),
            Err(err) => err,
        };
        let backup = backup_path(path);
        match fs::rename(path, &backup) {
            Ok(()) => {
                warn!(
                    "history {} unreadable ({}), moved to {}",
                    path.display(),
                    err,
                    backup.display()
                );
                Ok((Self::new(), Some(backup)))
            }
            Err(rename_err) => {
                debug!("could not move {} aside: {}", path.display(), rename_err);
                Err(err)
            }
        }
    }

    /// Writes every record to `path`, replacing its contents.
    ///
    /// The records go to a temporary sibling file first, which is then
    /// renamed over `path`.
    pub fn save(&self, path: &Path) -> Result<(), HistoryError> {
        let text = serde_json::to_string_pretty(self.records())?;
        let temp = sibling(path, ".tmp");
        fs::write(&temp, text)?;
        if let Err(err) = fs::rename(&temp, path) {
            fs::remove_file(&temp).ok();
            return Err(err.into());
        }
        debug!("saved {} records to {}", self.len(), path.display());
        Ok(())
    }

    /// Saves only when `width x height` is the canonical resolution.
    ///
    /// Returns whether the file was written.
    pub fn save_if_canonical(
        &self,
        path: &Path,
        width: u32,
        height: u32,
    ) -> Result<bool, HistoryError> {
        if !is_canonical_resolution(width, height) {
            return Ok(false);
        }
        self.save(path)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EngineKind;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("mandelbench-{}-{}.json", name, std::process::id()))
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let stats = StatsAggregator::load(Path::new("/nonexistent/dir/stats.json")).unwrap();
        assert!(stats.is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let path = temp_path("save-load");
        let mut stats = StatsAggregator::new();
        stats.record(ComputationRecord::new(812.5, "4096x4096", EngineKind::Linear));
        stats.record(ComputationRecord::new(31.25, "4096x4096", EngineKind::Gpu));
        stats.save(&path).unwrap();

        let loaded = StatsAggregator::load(&path).unwrap();
        fs::remove_file(&path).ok();
        assert_eq!(loaded, stats);
    }

    #[test]
    fn test_engine_serialized_lowercase() {
        let record = ComputationRecord::new(1.0, "8x8", EngineKind::Parallel);
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"engine\":\"parallel\""));
    }

    #[test]
    fn test_malformed_file() {
        let path = temp_path("malformed");
        fs::write(&path, "{ not json").unwrap();
        let result = StatsAggregator::load(&path);
        fs::remove_file(&path).ok();
        assert!(matches!(result, Err(HistoryError::Json(_))));
    }

    #[test]
    fn test_save_only_at_canonical_resolution() {
        let path = temp_path("canonical");
        fs::remove_file(&path).ok();
        let stats = StatsAggregator::new();

        assert!(!stats.save_if_canonical(&path, 1024, 1024).unwrap());
        assert!(!path.exists());

        assert!(stats.save_if_canonical(&path, 4096, 4096).unwrap());
        assert!(path.exists());
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_is_canonical_resolution() {
        assert!(is_canonical_resolution(4096, 4096));
        assert!(!is_canonical_resolution(4096, 2048));
    }

    #[test]
    fn test_save_leaves_no_temporary_file() {
        let path = temp_path("atomic");
        let mut stats = StatsAggregator::new();
        stats.record(ComputationRecord::new(2.0, "4096x4096", EngineKind::Parallel));
        stats.save(&path).unwrap();
        stats.record(ComputationRecord::new(3.0, "4096x4096", EngineKind::Parallel));
        stats.save(&path).unwrap();

        assert!(!sibling(&path, ".tmp").exists());
        let loaded = StatsAggregator::load(&path).unwrap();
        fs::remove_file(&path).ok();
        assert_eq!(loaded.len(), 2);
    }

    #[test]
    fn test_save_into_missing_directory_fails_cleanly() {
        let path = Path::new("/nonexistent/dir/stats.json");
        let result = StatsAggregator::new().save(path);
        assert!(matches!(result, Err(HistoryError::Io(_))));
    }

    #[test]
    fn test_recover_moves_malformed_history_aside() {
        let path = temp_path("recover");
        let backup = backup_path(&path);
        fs::remove_file(&backup).ok();
        fs::write(&path, "{ not json").unwrap();

        let (stats, moved) = StatsAggregator::load_or_recover(&path).unwrap();
        assert!(stats.is_empty());
        assert_eq!(moved.as_deref(), Some(backup.as_path()));
        assert!(!path.exists());

        // Saving the new session keeps the old contents in the backup
        let mut stats = stats;
        stats.record(ComputationRecord::new(4.0, "4096x4096", EngineKind::Linear));
        stats.save_if_canonical(&path, 4096, 4096).unwrap();
        let kept = fs::read_to_string(&backup).unwrap();
        fs::remove_file(&path).ok();
        fs::remove_file(&backup).ok();
        assert_eq!(kept, "{ not json");
    }

    #[test]
    fn test_recover_passes_through_good_and_missing_files() {
        let path = temp_path("recover-good");
        let mut stats = StatsAggregator::new();
        stats.record(ComputationRecord::new(5.0, "4096x4096", EngineKind::Gpu));
        stats.save(&path).unwrap();

        let (loaded, moved) = StatsAggregator::load_or_recover(&path).unwrap();
        fs::remove_file(&path).ok();
        assert_eq!(loaded, stats);
        assert!(moved.is_none());

        let (empty, moved) =
            StatsAggregator::load_or_recover(Path::new("/nonexistent/dir/stats.json")).unwrap();
        assert!(empty.is_empty());
        assert!(moved.is_none());
    }

    #[test]
    fn test_backup_path_appends_suffix() {
        assert_eq!(
            backup_path(Path::new("runs/stats.json")),
            PathBuf::from("runs/stats.json.bak")
        );
    }
}
