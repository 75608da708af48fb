//! On-disk workspace: where uploads, results and task state live.
//!
//! ```text
//! <root>/
//!   uploads/                      inputs staged by callers
//!   results/ocr_task_<id>/        one private result directory per task
//!   logs/task_<id>.json           task state records
//! ```

use crate::error::OcrTaskError;
use crate::state::TaskStateStore;
use std::cmp::Ordering;
use std::iter::Peekable;
use std::path::{Path, PathBuf};
use std::str::Chars;
use tracing::debug;

/// Directory layout rooted at [`crate::config::OcrConfig::workspace_dir`].
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.root.join("uploads")
    }

    pub fn results_dir(&self) -> PathBuf {
        self.root.join("results")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// State store backed by `logs/`.
    pub fn state_store(&self) -> TaskStateStore {
        TaskStateStore::new(self.logs_dir())
    }

    /// Create every workspace directory that does not exist yet.
    pub fn ensure(&self) -> Result<(), OcrTaskError> {
        for dir in [self.uploads_dir(), self.results_dir(), self.logs_dir()] {
            std::fs::create_dir_all(&dir)
                .map_err(|e| OcrTaskError::ArtifactWrite { path: dir, source: e })?;
        }
        Ok(())
    }

    /// Create an empty result directory named `prefix` under `results/`.
    ///
    /// Anything left there by an earlier run with the same name is removed
    /// first, so every run starts from an empty shell.
    pub async fn create_result_dir(&self, prefix: &str) -> Result<PathBuf, OcrTaskError> {
        let dir = self.results_dir().join(prefix);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => debug!("Cleared previous results in {}", dir.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(OcrTaskError::ArtifactWrite {
                    path: dir,
                    source: e,
                })
            }
        }
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| OcrTaskError::ArtifactWrite {
                path: dir.clone(),
                source: e,
            })?;
        Ok(dir)
    }
}

/// Every regular file under `dir`, as `/`-separated paths relative to `dir`.
///
/// Sorted in natural order, so `pages/page_2.md` precedes `pages/page_10.md`.
pub fn list_files(dir: &Path) -> Result<Vec<String>, OcrTaskError> {
    let mut files = Vec::new();
    collect_files(dir, dir, &mut files)?;
    files.sort_by(|a, b| natural_cmp(a, b));
    Ok(files)
}

/// Compare strings with digit runs ordered by numeric value.
fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (mut a, mut b) = (a.chars().peekable(), b.chars().peekable());
    loop {
        match (a.peek().copied(), b.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let (na, nb) = (digit_run(&mut a), digit_run(&mut b));
                let (ta, tb) = (na.trim_start_matches('0'), nb.trim_start_matches('0'));
                let ord = ta
                    .len()
                    .cmp(&tb.len())
                    .then_with(|| ta.cmp(tb))
                    .then_with(|| na.len().cmp(&nb.len()));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(x), Some(y)) => {
                if x != y {
                    return x.cmp(&y);
                }
                a.next();
                b.next();
            }
        }
    }
}

fn digit_run(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut run = String::new();
    while let Some(c) = chars.next_if(|c| c.is_ascii_digit()) {
        run.push(c);
    }
    run
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<String>) -> Result<(), OcrTaskError> {
    let entries = std::fs::read_dir(dir).map_err(|e| OcrTaskError::Internal(format!(
        "cannot list '{}': {e}",
        dir.display()
    )))?;
    for entry in entries {
        let entry =
            entry.map_err(|e| OcrTaskError::Internal(format!("cannot list '{}': {e}", dir.display())))?;
        let path = entry.path();
        let file_type = entry
            .file_type()
            .map_err(|e| OcrTaskError::Internal(format!("cannot stat '{}': {e}", path.display())))?;
        if file_type.is_dir() {
            collect_files(root, &path, out)?;
        } else if file_type.is_file() {
            if let Ok(rel) = path.strip_prefix(root) {
                let parts: Vec<String> = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                out.push(parts.join("/"));
            }
        }
    }
    Ok(())
}
