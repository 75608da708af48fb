//! Error types for the pageocr library.
//!
//! Two error types reflect two layers of failure:
//!
//! * [`RecognitionError`]: one call to the remote OCR model failed
//!   (transport, non-success status, unparseable body, timeout). Produced by
//!   [`crate::pipeline::recognize::Recognizer`] implementations.
//!
//! * [`OcrTaskError`]: the task as a whole cannot finish. Every pipeline
//!   stage returns it; a [`RecognitionError`] is wrapped with the page it
//!   occurred on. Only [`crate::task::TaskRunner::run`] turns it into a
//!   [`crate::output::TaskOutcome::Error`]; it never crosses the public
//!   `run` boundary as an `Err`.

use std::path::PathBuf;
use thiserror::Error;

/// Failure of a single recognition call.
#[derive(Debug, Error)]
pub enum RecognitionError {
    /// The request never produced an HTTP response.
    #[error("request to OCR endpoint failed: {0}")]
    Transport(String),

    /// No response within the recognizer's timeout.
    #[error("OCR endpoint did not respond within {secs}s")]
    Timeout { secs: u64 },

    /// The endpoint answered with a non-success status.
    #[error("OCR endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// The body could not be read as a chat-completion response.
    #[error("could not parse OCR response: {detail}")]
    MalformedResponse { detail: String },

    /// An edgequake-llm provider reported an error.
    #[error("LLM provider error: {0}")]
    Provider(String),
}

/// All fatal errors of an OCR task.
#[derive(Debug, Error)]
pub enum OcrTaskError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("input file not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    /// Any other I/O failure while reading the input (a directory, EIO, ...).
    #[error("cannot read input '{path}': {source}")]
    InputRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' could not be opened: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// pdfium-render returned an error for a specific page.
    #[error("rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Image bytes could not be decoded or re-encoded.
    #[error("could not decode image '{path}': {detail}")]
    ImageDecode { path: PathBuf, detail: String },

    /// Rendering produced nothing to recognise.
    #[error("no recognizable pages in '{path}'")]
    NoPages { path: PathBuf },

    // ── Recognition errors ────────────────────────────────────────────────
    /// The remote model failed on a page; later pages were not attempted.
    #[error("page {page} recognition failed: {source}")]
    Recognition {
        page: usize,
        #[source]
        source: RecognitionError,
    },

    // ── Persistence errors ────────────────────────────────────────────────
    /// The task state record could not be written.
    #[error("failed to write task state '{path}': {source}")]
    StateWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A result artifact or directory could not be written.
    #[error("failed to write '{path}': {source}")]
    ArtifactWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Caller errors ─────────────────────────────────────────────────────
    /// Task ids become file names, so they are restricted to a safe alphabet.
    #[error("invalid task id '{0}': use 1-128 characters from [A-Za-z0-9._-], not starting with '.', '-' or '_'")]
    InvalidTaskId(String),

    /// Builder validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// No usable recognizer could be built from the configuration.
    #[error("recognizer '{backend}' is not configured: {hint}")]
    RecognizerNotConfigured { backend: String, hint: String },

    /// Could not bind to a pdfium library.
    #[error(
        "failed to bind to pdfium library: {0}\n\
Set `pdfium_library_path` (CLI: --pdfium-lib / PDFIUM_LIB_PATH) to the directory holding libpdfium."
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("internal error: {0}")]
    Internal(String),
}
