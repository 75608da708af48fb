//! Values handed back to callers and written next to the results.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Summary returned by [`crate::task::TaskRunner::run`].
///
/// `run` never returns `Err`; branch on the variant instead. Serialises with
/// the same `status` tag as the persisted [`crate::state::TaskState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TaskOutcome {
    Finished {
        task_id: String,
        result_dir: PathBuf,
        files: Vec<String>,
    },
    Error {
        task_id: String,
        message: String,
    },
}

impl TaskOutcome {
    pub fn task_id(&self) -> &str {
        match self {
            TaskOutcome::Finished { task_id, .. } | TaskOutcome::Error { task_id, .. } => task_id,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, TaskOutcome::Finished { .. })
    }
}

/// Contents of `metadata.json` in a finished result directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetadata {
    /// Number of pages recognised.
    pub pages: usize,
    /// Prompt sent with every page.
    pub prompt: String,
    /// Model identifier reported by the recognizer.
    pub model: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_serialises_with_status_tag() {
        let ok = TaskOutcome::Finished {
            task_id: "t".into(),
            result_dir: PathBuf::from("/r"),
            files: vec!["result.md".into()],
        };
        let v = serde_json::to_value(&ok).unwrap();
        assert_eq!(v["status"], "finished");
        assert_eq!(v["files"][0], "result.md");

        let err = TaskOutcome::Error {
            task_id: "t".into(),
            message: "no recognizable pages".into(),
        };
        let v = serde_json::to_value(&err).unwrap();
        assert_eq!(v["status"], "error");
        assert_eq!(err.task_id(), "t");
        assert!(!err.is_finished());
    }
}
