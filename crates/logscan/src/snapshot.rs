//! On-disk log snapshots.
//!
//! A snapshot directory holds a `manifest.json` naming the workload and its
//! containers, plus one directory per pod:
//!
//! ```text
//! snapshot/
//!   manifest.json
//!   api-7d9f-abcde/
//!     app.log
//!     app.previous.log
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{Result, ScanError};
use crate::types::{LogRecord, WorkloadRef};

/// Manifest file name inside a snapshot directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// One container of the workload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRef {
    pub pod: String,
    pub container: String,
}

/// Snapshot manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub workload: WorkloadRef,
    #[serde(default)]
    pub containers: Vec<ContainerRef>,
}

/// A workload and the logs of its containers, in manifest order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSnapshot {
    pub workload: WorkloadRef,
    pub records: Vec<LogRecord>,
}

impl LogSnapshot {
    /// Load a snapshot directory.
    ///
    /// A missing current log yields a record without current text; scanners
    /// skip it with a warning. A missing or malformed manifest is an error.
    pub fn load(dir: &Path) -> Result<Self> {
        let manifest_path = dir.join(MANIFEST_FILE);
        let content =
            std::fs::read_to_string(&manifest_path).map_err(|e| ScanError::io(&manifest_path, e))?;
        let manifest: Manifest = serde_json::from_str(&content)?;

        let records = manifest
            .containers
            .iter()
            .map(|c| read_record(dir, c))
            .collect::<Result<Vec<_>>>()?;

        info!(
            workload = %manifest.workload,
            containers = records.len(),
            "Loaded log snapshot"
        );
        Ok(Self {
            workload: manifest.workload,
            records,
        })
    }
}

/// Path of the current log for a container.
#[must_use]
pub fn current_log_path(dir: &Path, container: &ContainerRef) -> PathBuf {
    dir.join(&container.pod).join(format!("{}.log", container.container))
}

/// Path of the previous-instance log for a container.
#[must_use]
pub fn previous_log_path(dir: &Path, container: &ContainerRef) -> PathBuf {
    dir.join(&container.pod)
        .join(format!("{}.previous.log", container.container))
}

fn read_record(dir: &Path, container: &ContainerRef) -> Result<LogRecord> {
    let current = read_optional(&current_log_path(dir, container))?;
    let previous = read_optional(&previous_log_path(dir, container))?;
    debug!(
        pod = %container.pod,
        container = %container.container,
        current = current.is_some(),
        previous = previous.is_some(),
        "Read container logs"
    );
    Ok(LogRecord {
        pod: container.pod.clone(),
        container: container.container.clone(),
        current,
        previous,
    })
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ScanError::io(path, e)),
    }
}
