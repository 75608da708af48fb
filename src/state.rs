//! Durable task state: one JSON record per task id.
//!
//! [`TaskStateStore`] keeps exactly one file per task,
//! `<dir>/task_<task_id>.json`, and replaces it wholesale on every write. A
//! write goes to a sibling temp file first and is then renamed over the
//! record, so a concurrent reader sees either the previous record or the new
//! one, never a half-written file.
//!
//! There is no locking. The store assumes a single writer per task id (the
//! run executing that task); two runs of the same id at once race, and the
//! last rename wins.

use crate::error::OcrTaskError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

static RE_TASK_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]{0,127}$").unwrap());

/// Check that `task_id` is safe to embed in a file name.
pub fn validate_task_id(task_id: &str) -> Result<(), OcrTaskError> {
    if RE_TASK_ID.is_match(task_id) {
        Ok(())
    } else {
        Err(OcrTaskError::InvalidTaskId(task_id.to_string()))
    }
}

/// Persisted lifecycle record of a task.
///
/// Serialised with an inline `status` tag:
///
/// ```json
/// {"status": "running", "result_dir": "...", "progress": 50, "current_page": 1, "total_pages": 2}
/// {"status": "finished", "result_dir": "...", "files": ["metadata.json", ...], "progress": 100}
/// {"status": "error", "message": "page 2 recognition failed: ..."}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TaskState {
    Running {
        result_dir: PathBuf,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        progress: Option<u8>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        current_page: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        total_pages: Option<usize>,
    },
    Finished {
        result_dir: PathBuf,
        files: Vec<String>,
        progress: u8,
    },
    Error {
        message: String,
        /// Present when the failure happened after the result directory existed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result_dir: Option<PathBuf>,
        /// Last progress persisted before the failure, if any page completed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        progress: Option<u8>,
    },
}

impl TaskState {
    /// `running`, `finished` or `error`.
    pub fn status(&self) -> &'static str {
        match self {
            TaskState::Running { .. } => "running",
            TaskState::Finished { .. } => "finished",
            TaskState::Error { .. } => "error",
        }
    }

    /// `finished` and `error` are terminal; a task never leaves them.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskState::Running { .. })
    }

    pub fn progress(&self) -> Option<u8> {
        match self {
            TaskState::Running { progress, .. } | TaskState::Error { progress, .. } => *progress,
            TaskState::Finished { progress, .. } => Some(*progress),
        }
    }
}

/// File-backed store of [`TaskState`] records.
#[derive(Debug, Clone)]
pub struct TaskStateStore {
    dir: PathBuf,
}

impl TaskStateStore {
    /// A store keeping its records in `dir`. The directory is created on
    /// first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Location of the record for `task_id`.
    pub fn path_for(&self, task_id: &str) -> PathBuf {
        self.dir.join(format!("task_{task_id}.json"))
    }

    /// Replace the record for `task_id` with `state`.
    pub async fn write(&self, task_id: &str, state: &TaskState) -> Result<PathBuf, OcrTaskError> {
        validate_task_id(task_id)?;
        let path = self.path_for(task_id);

        let json = serde_json::to_vec_pretty(state)
            .map_err(|e| OcrTaskError::Internal(format!("serialise task state: {e}")))?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| OcrTaskError::StateWrite {
                path: path.clone(),
                source: e,
            })?;

        // Write-then-rename so readers never observe a partial record.
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &json)
            .await
            .map_err(|e| OcrTaskError::StateWrite {
                path: path.clone(),
                source: e,
            })?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| OcrTaskError::StateWrite {
                path: path.clone(),
                source: e,
            })?;

        debug!("Task {} → {}", task_id, state.status());
        Ok(path)
    }

    /// The last record written for `task_id`.
    ///
    /// Returns `None` when nothing was written, the id is invalid, or the file
    /// cannot be read or parsed. Garbled state is reported as absent, never as
    /// an error.
    pub async fn read(&self, task_id: &str) -> Option<TaskState> {
        validate_task_id(task_id).ok()?;
        let path = self.path_for(task_id);

        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Cannot read task state {}: {}", path.display(), e);
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(state) => Some(state),
            Err(e) => {
                warn!("Ignoring corrupt task state {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Blocking variant of [`TaskStateStore::read`] for non-async callers.
    pub fn read_blocking(&self, task_id: &str) -> Option<TaskState> {
        validate_task_id(task_id).ok()?;
        let bytes = std::fs::read(self.path_for(task_id)).ok()?;
        serde_json::from_slice(&bytes).ok()
    }
}
