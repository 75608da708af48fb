//! Page normalisation and encoding.
//!
//! Every page leaves this module as bytes plus a MIME type the recognizer
//! accepts. PDF pages are encoded to PNG here (lossless, text stays crisp).
//! Single images keep their original bytes when the MIME type guessed from the
//! file name is one vision endpoints accept; anything else (a non-image type,
//! or an image type such as TIFF or BMP) is decoded and re-encoded as PNG. A
//! missing or misleading extension therefore never fails a task on its own.

use super::{input, Page};
use crate::error::OcrTaskError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

/// MIME type of every re-encoded page.
pub const PNG_MIME: &str = "image/png";

/// Used when the extension tells us nothing.
pub const FALLBACK_MIME: &str = PNG_MIME;

/// Image types sent as-is.
pub const ACCEPTED_IMAGE_TYPES: &[&str] = &["image/png", "image/jpeg", "image/webp", "image/gif"];

/// Best-guess MIME type from the file name, falling back to [`FALLBACK_MIME`].
pub fn guess_mime_type(path: &Path) -> String {
    mime_guess::from_path(path)
        .first()
        .map(|m| m.essence_str().to_string())
        .unwrap_or_else(|| FALLBACK_MIME.to_string())
}

/// Encode a rasterised page as PNG.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    debug!("Encoded {}x{} page → {} bytes PNG", img.width(), img.height(), buf.len());
    Ok(buf)
}

/// Ensure `data` is declared with an image MIME type the recognizer accepts.
///
/// `mime_type` is the caller's guess. [`ACCEPTED_IMAGE_TYPES`] pass through
/// untouched; anything else is decoded as a generic raster and re-encoded as
/// PNG.
pub fn normalize(
    path: &Path,
    data: Vec<u8>,
    mime_type: String,
) -> Result<(Vec<u8>, String), OcrTaskError> {
    if ACCEPTED_IMAGE_TYPES.contains(&mime_type.as_str()) {
        return Ok((data, mime_type));
    }

    debug!(
        "{} guessed as '{}', re-encoding as PNG",
        path.display(),
        mime_type
    );
    let decode_err = |e: image::ImageError| OcrTaskError::ImageDecode {
        path: path.to_path_buf(),
        detail: e.to_string(),
    };
    let img = image::load_from_memory(&data).map_err(decode_err)?;
    let png = encode_png(&img).map_err(decode_err)?;
    Ok((png, PNG_MIME.to_string()))
}

/// Read a single image file into one normalised page.
pub fn load_image_page(path: &Path) -> Result<Page, OcrTaskError> {
    let data = std::fs::read(path).map_err(|e| input::read_error(path, e))?;
    let (data, mime_type) = normalize(path, data, guess_mime_type(path))?;
    Ok(Page {
        page_num: 1,
        mime_type,
        data,
    })
}

/// `data:` URL embedding `data` as base64.
pub fn data_url(mime_type: &str, data: &[u8]) -> String {
    format!("data:{};base64,{}", mime_type, STANDARD.encode(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn jpeg_bytes() -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([200, 10, 10])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Jpeg)
            .unwrap();
        buf
    }

    #[test]
    fn guesses_from_extension_with_fallback() {
        assert_eq!(guess_mime_type(Path::new("a.png")), "image/png");
        assert_eq!(guess_mime_type(Path::new("a.JPG")), "image/jpeg");
        assert_eq!(guess_mime_type(Path::new("a.txt")), "text/plain");
        assert_eq!(guess_mime_type(Path::new("noextension")), FALLBACK_MIME);
    }

    #[test]
    fn image_types_pass_through_untouched() {
        let bytes = jpeg_bytes();
        let (out, mime) =
            normalize(Path::new("x.jpg"), bytes.clone(), "image/jpeg".into()).unwrap();
        assert_eq!(out, bytes);
        assert_eq!(mime, "image/jpeg");
    }

    #[test]
    fn misleading_extension_is_reencoded_as_png() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("scan.txt");
        std::fs::write(&p, jpeg_bytes()).unwrap();

        let page = load_image_page(&p).unwrap();
        assert_eq!(page.page_num, 1);
        assert_eq!(page.mime_type, PNG_MIME);
        assert_eq!(&page.data[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn other_image_types_are_reencoded_too() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([0, 0, 0])));
        let mut bmp = Vec::new();
        img.write_to(&mut Cursor::new(&mut bmp), image::ImageFormat::Bmp)
            .unwrap();
        let (out, mime) = normalize(Path::new("x.bmp"), bmp, "image/bmp".into()).unwrap();
        assert_eq!(mime, PNG_MIME);
        assert_eq!(image::guess_format(&out).unwrap(), image::ImageFormat::Png);
    }

    #[test]
    fn directory_is_not_reported_as_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let err = load_image_page(tmp.path()).unwrap_err();
        assert!(matches!(err, OcrTaskError::InputRead { .. }), "{err:?}");
        assert!(err.to_string().starts_with("cannot read input"), "{err}");
    }

    #[test]
    fn undecodable_non_image_is_an_input_error() {
        let err = normalize(Path::new("notes.txt"), b"hello".to_vec(), "text/plain".into())
            .unwrap_err();
        assert!(matches!(err, OcrTaskError::ImageDecode { .. }));
    }

    #[test]
    fn encode_small_image() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 10, Rgb([255, 255, 255])));
        let png = encode_png(&img).expect("encode should succeed");
        let decoded = image::load_from_memory(&png).expect("valid PNG");
        assert_eq!(decoded.width(), 10);
    }

    #[test]
    fn data_url_shape() {
        assert_eq!(data_url("image/png", b"abc"), "data:image/png;base64,YWJj");
    }
}
