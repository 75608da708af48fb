//! Input classification: is this file a paginated document or one image?
//!
//! The decision is made on content first (`%PDF` magic bytes), then on the
//! file extension, so a PDF saved without an extension is still rendered
//! page by page. Existence and read permission are checked here so callers
//! get a meaningful error before any rendering starts.

use crate::error::OcrTaskError;
use std::io::{ErrorKind, Read};
use std::path::Path;
use tracing::debug;

/// What kind of input a file is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// Multi-page document, rasterised page by page.
    Pdf,
    /// A single raster image, sent as one page.
    Image,
}

impl InputKind {
    pub fn as_str(self) -> &'static str {
        match self {
            InputKind::Pdf => "pdf",
            InputKind::Image => "image",
        }
    }
}

/// Classify `path` as [`InputKind::Pdf`] or [`InputKind::Image`].
pub fn classify(path: &Path) -> Result<InputKind, OcrTaskError> {
    if !path.exists() {
        return Err(OcrTaskError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let mut magic = [0u8; 4];
    let mut file = std::fs::File::open(path).map_err(|e| read_error(path, e))?;
    let has_pdf_magic = file.read_exact(&mut magic).is_ok() && &magic == b"%PDF";

    let has_pdf_extension = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));

    let kind = if has_pdf_magic || has_pdf_extension {
        InputKind::Pdf
    } else {
        InputKind::Image
    };
    debug!("Classified {} as {}", path.display(), kind.as_str());
    Ok(kind)
}

/// Map an I/O error on the input file to the matching input error.
pub(crate) fn read_error(path: &Path, e: std::io::Error) -> OcrTaskError {
    match e.kind() {
        ErrorKind::NotFound => OcrTaskError::FileNotFound {
            path: path.to_path_buf(),
        },
        ErrorKind::PermissionDenied => OcrTaskError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => OcrTaskError::InputRead {
            path: path.to_path_buf(),
            source: e,
        },
    }
}
