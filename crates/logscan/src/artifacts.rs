//! Per-run scan result files.
//!
//! Each task result is written to `<task>.scan.json` in the run directory.
//! Files left over from an earlier run are removed when the directory is
//! opened, and the files of this run are removed on drop unless [`RunArtifacts::keep`]
//! was called. A [`RunArtifacts::temporary`] run directory is removed as well.

use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

use crate::error::{Result, ScanError};
use crate::types::ScanResult;

/// Suffix of every result file.
pub const ARTIFACT_SUFFIX: &str = ".scan.json";

/// Result files owned by one invocation.
#[derive(Debug)]
pub struct RunArtifacts {
    dir: PathBuf,
    written: Vec<PathBuf>,
    keep: bool,
    /// Owned scratch directory; dropped after the files are removed
    scratch: Option<TempDir>,
}

impl RunArtifacts {
    /// Create `dir` if needed and remove stale result files in it.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| ScanError::io(&dir, e))?;

        let entries = std::fs::read_dir(&dir).map_err(|e| ScanError::io(&dir, e))?;
        for entry in entries {
            let path = entry.map_err(|e| ScanError::io(&dir, e))?.path();
            if is_artifact(&path) {
                std::fs::remove_file(&path).map_err(|e| ScanError::io(&path, e))?;
                debug!(path = %path.display(), "Removed stale scan result");
            }
        }

        Ok(Self {
            dir,
            written: Vec::new(),
            keep: false,
            scratch: None,
        })
    }

    /// Use a fresh `logscan-*` directory under the system temp dir, deleted on drop.
    pub fn temporary() -> Result<Self> {
        let scratch = tempfile::Builder::new()
            .prefix("logscan-")
            .tempdir()
            .map_err(|e| ScanError::io(std::env::temp_dir(), e))?;
        debug!(path = %scratch.path().display(), "Created temporary result directory");
        Ok(Self {
            dir: scratch.path().to_path_buf(),
            written: Vec::new(),
            keep: false,
            scratch: Some(scratch),
        })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Files written so far, in write order.
    #[must_use]
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    /// Keep the written files, and a temporary directory, after drop.
    pub fn keep(&mut self) {
        self.keep = true;
        if let Some(scratch) = self.scratch.take() {
            #[allow(deprecated)]
            let _ = scratch.into_path();
        }
    }

    /// Write one task result as pretty JSON.
    pub fn write(&mut self, result: &ScanResult) -> Result<PathBuf> {
        let path = self.dir.join(artifact_name(&result.task));
        let content = serde_json::to_string_pretty(result)?;
        std::fs::write(&path, content).map_err(|e| ScanError::io(&path, e))?;
        debug!(task = %result.task, path = %path.display(), "Wrote scan result");
        if !self.written.contains(&path) {
            self.written.push(path.clone());
        }
        Ok(path)
    }
}

impl Drop for RunArtifacts {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        for path in &self.written {
            if let Err(e) = std::fs::remove_file(path) {
                warn!(path = %path.display(), error = %e, "Failed to remove scan result");
            }
        }
    }
}

/// File name for a task result; anything outside `[A-Za-z0-9_-]` becomes `_`.
#[must_use]
pub fn artifact_name(task: &str) -> String {
    let stem: String = task
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("{stem}{ARTIFACT_SUFFIX}")
}

fn is_artifact(path: &Path) -> bool {
    path.is_file()
        && path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.ends_with(ARTIFACT_SUFFIX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_files_removed_on_open() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("Old.scan.json"), "{}").unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "keep me").unwrap();

        let artifacts = RunArtifacts::open(tmp.path()).unwrap();
        assert!(!tmp.path().join("Old.scan.json").exists());
        assert!(tmp.path().join("notes.txt").exists());
        assert!(artifacts.written().is_empty());
    }

    #[test]
    fn test_written_files_removed_on_drop() {
        let tmp = TempDir::new().unwrap();
        let path = {
            let mut artifacts = RunArtifacts::open(tmp.path().join("run")).unwrap();
            let path = artifacts
                .write(&ScanResult::empty("Connection", "nothing"))
                .unwrap();
            assert!(path.exists());
            path
        };
        assert!(!path.exists());
        assert!(tmp.path().join("run").exists());
    }

    #[test]
    fn test_keep_preserves_files() {
        let tmp = TempDir::new().unwrap();
        let path = {
            let mut artifacts = RunArtifacts::open(tmp.path()).unwrap();
            artifacts.keep();
            artifacts
                .write(&ScanResult::empty("Connection", "nothing"))
                .unwrap()
        };
        let stored: ScanResult =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(stored.task, "Connection");
    }

    #[test]
    fn test_temporary_dir_removed_on_drop() {
        let dir = {
            let mut artifacts = RunArtifacts::temporary().unwrap();
            let path = artifacts
                .write(&ScanResult::empty("Connection", "nothing"))
                .unwrap();
            assert!(path.exists());
            assert!(artifacts
                .dir()
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with("logscan-")));
            artifacts.dir().to_path_buf()
        };
        assert!(!dir.exists());
    }

    #[test]
    fn test_kept_temporary_dir_survives_drop() {
        let dir = {
            let mut artifacts = RunArtifacts::temporary().unwrap();
            artifacts
                .write(&ScanResult::empty("Connection", "nothing"))
                .unwrap();
            artifacts.keep();
            artifacts.dir().to_path_buf()
        };
        assert!(dir.join("Connection.scan.json").exists());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_artifact_name() {
        assert_eq!(artifact_name("Connection"), "Connection.scan.json");
        assert_eq!(artifact_name("../etc passwd"), "___etc_passwd.scan.json");
    }
}
