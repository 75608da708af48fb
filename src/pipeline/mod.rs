//! Pipeline stages of an OCR task.
//!
//! Each submodule implements one step; [`crate::task`] drives them in order.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ recognize
//! (classify) (pdfium)  (normalise) (remote model, one call per page)
//! ```
//!
//! 1. [`input`]    : decide whether the file is a PDF or a single image
//! 2. [`render`]   : rasterise PDF pages; runs in `spawn_blocking` because
//!    pdfium is not async-safe
//! 3. [`encode`]   : make sure every page is PNG/JPEG/WebP/GIF bytes with a
//!    matching MIME type
//! 4. [`recognize`]: send a page to the OCR model; the only stage with
//!    network I/O

pub mod encode;
pub mod input;
pub mod recognize;
pub mod render;

/// One page of input, ready for recognition.
#[derive(Debug, Clone)]
pub struct Page {
    /// 1-based position in the input.
    pub page_num: usize,
    /// MIME type of `data`; always an image type.
    pub mime_type: String,
    /// Encoded image bytes.
    pub data: Vec<u8>,
}
