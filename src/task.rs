//! Task orchestration: one input file in, one result directory out.
//!
//! [`TaskRunner::run`] drives a task through its whole lifecycle:
//!
//! ```text
//! running ──▶ finished     every page recognised, artifacts written
//!    │
//!    └──────▶ error        first failure anywhere, run stops there
//! ```
//!
//! Pages are recognised strictly in order, one at a time. After each page
//! the per-page artifact is written, the `running` record is replaced with
//! the new progress, and only then does the progress callback fire. The first
//! failure aborts the task: pages after it are not attempted and no
//! `result.md` is written, though earlier `pages/page_<n>.md` files stay on
//! disk.
//!
//! `run` never returns an error. Every failure (including a panic inside a
//! pipeline stage) is persisted as an `error` record and handed back as
//! [`TaskOutcome::Error`].
//!
//! ## Single writer per task id
//!
//! A run owns `results/ocr_task_<id>/` and `logs/task_<id>.json` for its
//! whole duration. Nothing stops a caller from starting two runs of the same
//! id at once; if it does, their files interleave and the last state write
//! wins. Runs with distinct ids share nothing and may run concurrently.

use crate::config::OcrConfig;
use crate::error::OcrTaskError;
use crate::output::{RunMetadata, TaskOutcome};
use crate::pipeline::input;
use crate::pipeline::recognize::{resolve_recognizer, Recognizer};
use crate::pipeline::render::{self, PdfRasteriser, PdfiumRasteriser};
use crate::progress::{NoopProgressCallback, TaskProgressCallback};
use crate::state::{validate_task_id, TaskState, TaskStateStore};
use crate::workspace::{list_files, Workspace};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Name of the combined document inside a result directory.
pub const RESULT_FILE: &str = "result.md";
/// Name of the run metadata record inside a result directory.
pub const METADATA_FILE: &str = "metadata.json";
/// Subdirectory holding one text file per page.
pub const PAGES_DIR: &str = "pages";

/// What the failure path needs to know about a run in flight.
#[derive(Debug, Default)]
struct RunTrack {
    result_dir: Option<PathBuf>,
    progress: Option<u8>,
}

/// Runs OCR tasks against a workspace.
///
/// Cheap to share behind an `Arc`; `run` takes `&self` so distinct task ids
/// can be driven concurrently from one runner.
pub struct TaskRunner {
    config: OcrConfig,
    workspace: Workspace,
    store: TaskStateStore,
    recognizer: Arc<dyn Recognizer>,
    rasteriser: Arc<dyn PdfRasteriser>,
}

impl TaskRunner {
    /// Build a runner with the recognizer selected by `config` and the
    /// pdfium rasteriser.
    ///
    /// Fails only when no recognizer can be configured (no API key and no
    /// provider). pdfium is bound lazily, on the first PDF.
    pub fn new(config: OcrConfig) -> Result<Self, OcrTaskError> {
        let recognizer = resolve_recognizer(&config)?;
        let rasteriser: Arc<dyn PdfRasteriser> = Arc::new(PdfiumRasteriser::new(&config));
        Ok(Self::with_components(config, recognizer, rasteriser))
    }

    /// Build a runner from explicit collaborators.
    pub fn with_components(
        config: OcrConfig,
        recognizer: Arc<dyn Recognizer>,
        rasteriser: Arc<dyn PdfRasteriser>,
    ) -> Self {
        let workspace = Workspace::new(config.workspace_dir.clone());
        let store = workspace.state_store();
        Self {
            config,
            workspace,
            store,
            recognizer,
            rasteriser,
        }
    }

    pub fn config(&self) -> &OcrConfig {
        &self.config
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Run one task over `input` under the caller-chosen `task_id`.
    ///
    /// `prompt` defaults to [`OcrConfig::default_prompt`]. A previous run of
    /// the same id is replaced: its result directory is emptied and its state
    /// record overwritten.
    ///
    /// An invalid `task_id` is reported as [`TaskOutcome::Error`] without
    /// touching the workspace.
    pub async fn run(
        &self,
        input: impl AsRef<Path>,
        task_id: &str,
        on_progress: Option<&dyn TaskProgressCallback>,
        prompt: Option<&str>,
    ) -> TaskOutcome {
        let input = input.as_ref();
        if let Err(e) = validate_task_id(task_id) {
            warn!("Rejected task: {}", e);
            return TaskOutcome::Error {
                task_id: task_id.to_string(),
                message: e.to_string(),
            };
        }

        let prompt = prompt.unwrap_or(&self.config.default_prompt);
        let cb: &dyn TaskProgressCallback = on_progress.unwrap_or(&NoopProgressCallback);
        let mut track = RunTrack::default();

        info!("Starting OCR task {} on {}", task_id, input.display());
        let result = AssertUnwindSafe(self.execute(input, task_id, cb, prompt, &mut track))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(OcrTaskError::Internal(panic_message(panic))));

        match result {
            Ok((result_dir, files)) => {
                info!(
                    "Task {} finished: {} files in {}",
                    task_id,
                    files.len(),
                    result_dir.display()
                );
                TaskOutcome::Finished {
                    task_id: task_id.to_string(),
                    result_dir,
                    files,
                }
            }
            Err(e) => {
                let message = e.to_string();
                error!("Task {} failed: {}", task_id, message);
                let state = TaskState::Error {
                    message: message.clone(),
                    result_dir: track.result_dir,
                    progress: track.progress,
                };
                if let Err(write_err) = self.store.write(task_id, &state).await {
                    warn!("Could not persist error state for {}: {}", task_id, write_err);
                }
                TaskOutcome::Error {
                    task_id: task_id.to_string(),
                    message,
                }
            }
        }
    }

    /// Blocking wrapper around [`TaskRunner::run`].
    ///
    /// Creates its own Tokio runtime; do not call from inside one.
    pub fn run_sync(
        &self,
        input: impl AsRef<Path>,
        task_id: &str,
        on_progress: Option<&dyn TaskProgressCallback>,
        prompt: Option<&str>,
    ) -> TaskOutcome {
        match tokio::runtime::Runtime::new() {
            Ok(rt) => rt.block_on(self.run(input, task_id, on_progress, prompt)),
            Err(e) => TaskOutcome::Error {
                task_id: task_id.to_string(),
                message: OcrTaskError::Internal(format!("Failed to create tokio runtime: {}", e))
                    .to_string(),
            },
        }
    }

    /// Last persisted state of `task_id`, or `None` if absent or unreadable.
    pub async fn read_state(&self, task_id: &str) -> Option<TaskState> {
        self.store.read(task_id).await
    }

    async fn execute(
        &self,
        input: &Path,
        task_id: &str,
        cb: &dyn TaskProgressCallback,
        prompt: &str,
        track: &mut RunTrack,
    ) -> Result<(PathBuf, Vec<String>), OcrTaskError> {
        // ── 1. Result directory + first running record ───────────────────
        let result_dir = self
            .workspace
            .create_result_dir(&format!("ocr_task_{task_id}"))
            .await?;
        track.result_dir = Some(result_dir.clone());
        self.store
            .write(
                task_id,
                &TaskState::Running {
                    result_dir: result_dir.clone(),
                    progress: None,
                    current_page: None,
                    total_pages: None,
                },
            )
            .await?;

        // ── 2. Classify + render ─────────────────────────────────────────
        let kind = input::classify(input)?;
        let pages = render::render_document(input, kind, &self.rasteriser).await?;
        let total_pages = pages.len();
        info!(
            "Task {}: {} {} page(s) to recognise",
            task_id,
            total_pages,
            kind.as_str()
        );
        cb.on_task_start(task_id, total_pages);

        let pages_dir = result_dir.join(PAGES_DIR);
        tokio::fs::create_dir_all(&pages_dir)
            .await
            .map_err(|e| OcrTaskError::ArtifactWrite {
                path: pages_dir.clone(),
                source: e,
            })?;

        // ── 3. Recognise page by page ────────────────────────────────────
        let mut sections = Vec::with_capacity(total_pages);
        for page in &pages {
            let page_num = page.page_num;
            cb.on_page_start(page_num, total_pages);
            debug!("Recognising page {}/{}", page_num, total_pages);

            let text = self
                .recognizer
                .recognize(&page.data, &page.mime_type, prompt)
                .await
                .map_err(|source| OcrTaskError::Recognition {
                    page: page_num,
                    source,
                })?;
            let text = text.trim();

            write_artifact(
                &pages_dir.join(format!("page_{page_num}.md")),
                format!("{text}\n"),
            )
            .await?;
            sections.push(format!("## Page {page_num}\n\n{text}\n"));

            let progress = (page_num * 100 / total_pages) as u8;
            self.store
                .write(
                    task_id,
                    &TaskState::Running {
                        result_dir: result_dir.clone(),
                        progress: Some(progress),
                        current_page: Some(page_num),
                        total_pages: Some(total_pages),
                    },
                )
                .await?;
            track.progress = Some(progress);
            cb.on_page_complete(page_num, total_pages, progress);
        }

        // ── 4. Aggregate + finalise ──────────────────────────────────────
        let combined = format!("{}\n", sections.join("\n").trim());
        write_artifact(&result_dir.join(RESULT_FILE), combined).await?;

        let metadata = RunMetadata {
            pages: total_pages,
            prompt: prompt.to_string(),
            model: self.recognizer.model().to_string(),
        };
        let metadata_json = serde_json::to_string_pretty(&metadata)
            .map_err(|e| OcrTaskError::Internal(format!("serialise metadata: {e}")))?;
        write_artifact(&result_dir.join(METADATA_FILE), metadata_json).await?;

        let files = list_files(&result_dir)?;
        self.store
            .write(
                task_id,
                &TaskState::Finished {
                    result_dir: result_dir.clone(),
                    files: files.clone(),
                    progress: 100,
                },
            )
            .await?;
        track.progress = Some(100);

        Ok((result_dir, files))
    }
}

async fn write_artifact(path: &Path, contents: String) -> Result<(), OcrTaskError> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| OcrTaskError::ArtifactWrite {
            path: path.to_path_buf(),
            source: e,
        })
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("task panicked: {detail}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RecognitionError;
    use async_trait::async_trait;
    use image::DynamicImage;

    struct Echo;

    #[async_trait]
    impl Recognizer for Echo {
        fn model(&self) -> &str {
            "echo"
        }

        async fn recognize(
            &self,
            _image: &[u8],
            _mime_type: &str,
            prompt: &str,
        ) -> Result<String, RecognitionError> {
            Ok(format!("  {prompt}  "))
        }
    }

    struct Panics;

    #[async_trait]
    impl Recognizer for Panics {
        fn model(&self) -> &str {
            "panics"
        }

        async fn recognize(
            &self,
            _image: &[u8],
            _mime_type: &str,
            _prompt: &str,
        ) -> Result<String, RecognitionError> {
            panic!("boom")
        }
    }

    struct NoPdf;

    impl PdfRasteriser for NoPdf {
        fn rasterise(&self, _pdf_path: &Path) -> Result<Vec<DynamicImage>, OcrTaskError> {
            Ok(Vec::new())
        }
    }

    fn runner(root: &Path, recognizer: Arc<dyn Recognizer>) -> TaskRunner {
        let config = OcrConfig::builder().workspace_dir(root).build().unwrap();
        TaskRunner::with_components(config, recognizer, Arc::new(NoPdf))
    }

    fn png(root: &Path) -> PathBuf {
        let img = DynamicImage::new_rgb8(3, 3);
        let path = root.join("in.png");
        img.save(&path).unwrap();
        path
    }

    #[tokio::test]
    async fn custom_prompt_reaches_recognizer_and_metadata() {
        let tmp = tempfile::tempdir().unwrap();
        let r = runner(tmp.path(), Arc::new(Echo));
        let input = png(tmp.path());

        let outcome = r.run(&input, "t1", None, Some("read this")).await;
        let result_dir = match outcome {
            TaskOutcome::Finished { result_dir, .. } => result_dir,
            other => panic!("expected finished, got {other:?}"),
        };
        let page = std::fs::read_to_string(result_dir.join("pages/page_1.md")).unwrap();
        assert_eq!(page, "read this\n");

        let meta: RunMetadata = serde_json::from_str(
            &std::fs::read_to_string(result_dir.join(METADATA_FILE)).unwrap(),
        )
        .unwrap();
        assert_eq!(
            meta,
            RunMetadata {
                pages: 1,
                prompt: "read this".into(),
                model: "echo".into()
            }
        );
    }

    #[tokio::test]
    async fn invalid_task_id_touches_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let r = runner(tmp.path(), Arc::new(Echo));
        let outcome = r.run(png(tmp.path()), "../escape", None, None).await;
        assert!(!outcome.is_finished());
        assert!(!tmp.path().join("results").exists());
        assert!(!tmp.path().join("logs").exists());
    }

    #[tokio::test]
    async fn panics_become_error_state() {
        let tmp = tempfile::tempdir().unwrap();
        let r = runner(tmp.path(), Arc::new(Panics));
        let outcome = r.run(png(tmp.path()), "p1", None, None).await;

        match outcome {
            TaskOutcome::Error { message, .. } => assert!(message.contains("boom")),
            other => panic!("expected error, got {other:?}"),
        }
        let state = r.read_state("p1").await.unwrap();
        assert_eq!(state.status(), "error");
    }

    #[test]
    fn run_sync_outside_runtime() {
        let tmp = tempfile::tempdir().unwrap();
        let r = runner(tmp.path(), Arc::new(Echo));
        let outcome = r.run_sync(png(tmp.path()), "sync-1", None, None);
        assert!(outcome.is_finished());
    }
}
