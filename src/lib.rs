//! # pageocr
//!
//! Turn an image or a multi-page PDF into text by sending each page to a
//! remote OCR model, and track the job as a durable, pollable task.
//!
//! ## Why tasks?
//!
//! OCR over a long PDF is dominated by one slow network call per page. A
//! caller (a web handler, a CLI, a queue worker) needs to hand the job off
//! and check on it later, even after a crash. Every run therefore keeps a
//! single JSON state record that is replaced wholesale after each page, and
//! writes its artifacts into a private result directory.
//!
//! ## Pipeline Overview
//!
//! ```text
//! input file
//!  │
//!  ├─ 1. Classify   PDF (magic bytes / extension) or single image
//!  ├─ 2. Render     rasterise PDF pages via pdfium (spawn_blocking)
//!  ├─ 3. Normalise  keep PNG/JPEG/WebP/GIF, re-encode anything else as PNG
//!  ├─ 4. Recognise  one model call per page, in order, fail-fast
//!  └─ 5. Output     pages/page_<n>.md + result.md + metadata.json
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pageocr::{OcrConfig, TaskOutcome, TaskRunner};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = OcrConfig::builder()
//!         .api_key(std::env::var("DEEPSEEK_API_KEY")?)
//!         .workspace_dir("workspace")
//!         .build()?;
//!     let runner = TaskRunner::new(config)?;
//!
//!     match runner.run("scan.pdf", "invoice-42", None, None).await {
//!         TaskOutcome::Finished { result_dir, files, .. } => {
//!             println!("{} files in {}", files.len(), result_dir.display());
//!         }
//!         TaskOutcome::Error { message, .. } => eprintln!("failed: {message}"),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Workspace Layout
//!
//! ```text
//! <workspace>/
//!   uploads/
//!   results/ocr_task_<id>/
//!     pages/page_<n>.md
//!     result.md
//!     metadata.json
//!   logs/task_<id>.json
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pageocr` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pageocr = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod state;
pub mod task;
pub mod workspace;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{OcrConfig, OcrConfigBuilder};
pub use error::{OcrTaskError, RecognitionError};
pub use output::{RunMetadata, TaskOutcome};
pub use pipeline::input::{classify, InputKind};
pub use pipeline::recognize::{
    resolve_recognizer, ChatCompletionsRecognizer, ProviderRecognizer, Recognizer,
};
pub use pipeline::render::{PdfRasteriser, PdfiumRasteriser};
pub use pipeline::Page;
pub use progress::{NoopProgressCallback, ProgressCallback, ProgressFn, TaskProgressCallback};
pub use prompts::{PromptTemplate, DEFAULT_PROMPT};
pub use state::{TaskState, TaskStateStore};
pub use task::TaskRunner;
pub use workspace::{list_files, Workspace};
