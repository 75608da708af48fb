//! Page rendering: turn one input file into an ordered list of page images.
//!
//! A single image becomes exactly one page holding the file's own bytes
//! (after [`super::encode::normalize`]). A PDF is rasterised page by page at
//! `dpi / 72` times its native size and each page is PNG-encoded.
//!
//! ## Why spawn_blocking?
//!
//! pdfium is a C++ library with thread-local state and CPU-heavy rendering.
//! [`render_document`] moves rasterisation onto Tokio's blocking pool so the
//! async workers never stall on it.
//!
//! ## One pdfium per process
//!
//! pdfium initialises process-global state when it is bound and tears it down
//! when the handle drops, so a handle dropped by one task would pull the
//! library out from under another. [`PdfiumRasteriser`] binds the library once
//! into a process-wide [`SharedLibrary`] that is never dropped, and holds its
//! lock for the whole of each document. The first successful binding wins:
//! later `pdfium_library_path` values are ignored for the rest of the process.
//!
//! Rasterisation sits behind the [`PdfRasteriser`] trait; the orchestrator
//! holds an `Arc<dyn PdfRasteriser>` and tests substitute one that needs no
//! pdfium library.

use super::encode::{self, PNG_MIME};
use super::input::InputKind;
use super::Page;
use crate::config::OcrConfig;
use crate::error::OcrTaskError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Renders every page of a PDF, in document order.
pub trait PdfRasteriser: Send + Sync {
    fn rasterise(&self, pdf_path: &Path) -> Result<Vec<DynamicImage>, OcrTaskError>;
}

/// A library handle bound at most once per process and used by one caller at
/// a time.
///
/// A failed bind leaves the cell empty, so the next caller tries again.
pub(crate) struct SharedLibrary<T> {
    cell: OnceCell<T>,
    in_use: Mutex<()>,
}

impl<T> SharedLibrary<T> {
    pub(crate) const fn new() -> Self {
        Self {
            cell: OnceCell::new(),
            in_use: Mutex::new(()),
        }
    }

    /// Run `f` with exclusive access to the handle, binding it first if needed.
    pub(crate) fn with<R>(
        &self,
        bind: impl FnOnce() -> Result<T, OcrTaskError>,
        f: impl FnOnce(&T) -> Result<R, OcrTaskError>,
    ) -> Result<R, OcrTaskError> {
        // A panic mid-document leaves nothing for the next caller to repair.
        let _guard = self
            .in_use
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let handle = self.cell.get_or_try_init(bind)?;
        f(handle)
    }
}

static PDFIUM: SharedLibrary<Pdfium> = SharedLibrary::new();

/// [`PdfRasteriser`] backed by pdfium-render.
#[derive(Debug, Clone)]
pub struct PdfiumRasteriser {
    scale: f32,
    max_pixels: u32,
    password: Option<String>,
    library_path: Option<PathBuf>,
}

impl PdfiumRasteriser {
    pub fn new(config: &OcrConfig) -> Self {
        Self {
            scale: config.render_scale(),
            max_pixels: config.max_rendered_pixels,
            password: config.password.clone(),
            library_path: config.pdfium_library_path.clone(),
        }
    }

    fn bind(&self) -> Result<Pdfium, OcrTaskError> {
        info!("Binding pdfium library");
        let bindings = match &self.library_path {
            Some(dir) => {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir))
            }
            None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library()),
        }
        .map_err(|e| OcrTaskError::PdfiumBindingFailed(format!("{:?}", e)))?;
        Ok(Pdfium::new(bindings))
    }
}

impl PdfRasteriser for PdfiumRasteriser {
    fn rasterise(&self, pdf_path: &Path) -> Result<Vec<DynamicImage>, OcrTaskError> {
        PDFIUM.with(|| self.bind(), |pdfium| self.rasterise_with(pdfium, pdf_path))
    }
}

impl PdfiumRasteriser {
    fn rasterise_with(
        &self,
        pdfium: &Pdfium,
        pdf_path: &Path,
    ) -> Result<Vec<DynamicImage>, OcrTaskError> {
        let password = self.password.as_deref();

        let document = pdfium.load_pdf_from_file(pdf_path, password).map_err(|e| {
            let err_str = format!("{:?}", e);
            if err_str.contains("Password") || err_str.contains("password") {
                if password.is_some() {
                    OcrTaskError::WrongPassword {
                        path: pdf_path.to_path_buf(),
                    }
                } else {
                    OcrTaskError::PasswordRequired {
                        path: pdf_path.to_path_buf(),
                    }
                }
            } else {
                OcrTaskError::CorruptPdf {
                    path: pdf_path.to_path_buf(),
                    detail: err_str,
                }
            }
        })?;

        let pages = document.pages();
        info!("PDF loaded: {} pages", pages.len());

        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(self.scale)
            .set_maximum_width(self.max_pixels as i32)
            .set_maximum_height(self.max_pixels as i32);

        let mut images = Vec::with_capacity(pages.len() as usize);
        for (idx, page) in pages.iter().enumerate() {
            let bitmap = page.render_with_config(&render_config).map_err(|e| {
                OcrTaskError::RasterisationFailed {
                    page: idx + 1,
                    detail: format!("{:?}", e),
                }
            })?;

            // Flatten onto RGB; transparency carries no text.
            let image = DynamicImage::ImageRgb8(bitmap.as_image().to_rgb8());
            debug!(
                "Rendered page {} → {}x{} px",
                idx + 1,
                image.width(),
                image.height()
            );
            images.push(image);
        }

        Ok(images)
    }
}

/// Render `path` into normalised pages, numbered from 1.
///
/// Fails with [`OcrTaskError::NoPages`] if nothing was produced.
pub async fn render_document(
    path: &Path,
    kind: InputKind,
    rasteriser: &Arc<dyn PdfRasteriser>,
) -> Result<Vec<Page>, OcrTaskError> {
    let path_buf = path.to_path_buf();
    let rasteriser = Arc::clone(rasteriser);

    let pages = tokio::task::spawn_blocking(move || match kind {
        InputKind::Pdf => rasterise_pdf(&path_buf, rasteriser.as_ref()),
        InputKind::Image => encode::load_image_page(&path_buf).map(|page| vec![page]),
    })
    .await
    .map_err(|e| OcrTaskError::Internal(format!("Render task panicked: {}", e)))??;

    if pages.is_empty() {
        return Err(OcrTaskError::NoPages {
            path: path.to_path_buf(),
        });
    }
    Ok(pages)
}

fn rasterise_pdf(path: &Path, rasteriser: &dyn PdfRasteriser) -> Result<Vec<Page>, OcrTaskError> {
    rasteriser
        .rasterise(path)?
        .iter()
        .enumerate()
        .map(|(idx, img)| {
            let data = encode::encode_png(img).map_err(|e| OcrTaskError::RasterisationFailed {
                page: idx + 1,
                detail: format!("Image encoding failed: {}", e),
            })?;
            Ok(Page {
                page_num: idx + 1,
                mime_type: PNG_MIME.to_string(),
                data,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct FixedPages(usize);

    impl PdfRasteriser for FixedPages {
        fn rasterise(&self, _pdf_path: &Path) -> Result<Vec<DynamicImage>, OcrTaskError> {
            Ok((0..self.0)
                .map(|i| {
                    DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([i as u8, 0, 0])))
                })
                .collect())
        }
    }

    fn png_file(dir: &Path, name: &str) -> (PathBuf, Vec<u8>) {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(6, 6, Rgb([9, 9, 9])));
        let bytes = encode::encode_png(&img).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, &bytes).unwrap();
        (path, bytes)
    }

    #[tokio::test]
    async fn single_image_is_one_page_with_original_bytes() {
        let tmp = tempfile::tempdir().unwrap();
        let (path, bytes) = png_file(tmp.path(), "photo.png");
        let rasteriser: Arc<dyn PdfRasteriser> = Arc::new(FixedPages(0));

        let pages = render_document(&path, InputKind::Image, &rasteriser)
            .await
            .unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].page_num, 1);
        assert_eq!(pages[0].mime_type, "image/png");
        assert_eq!(pages[0].data, bytes);
    }

    #[tokio::test]
    async fn pdf_pages_are_png_encoded_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("doc.pdf");
        std::fs::write(&path, b"%PDF-1.4").unwrap();
        let rasteriser: Arc<dyn PdfRasteriser> = Arc::new(FixedPages(3));

        let pages = render_document(&path, InputKind::Pdf, &rasteriser)
            .await
            .unwrap();
        let nums: Vec<usize> = pages.iter().map(|p| p.page_num).collect();
        assert_eq!(nums, vec![1, 2, 3]);
        for (i, page) in pages.iter().enumerate() {
            assert_eq!(page.mime_type, PNG_MIME);
            let img = image::load_from_memory(&page.data).unwrap().to_rgb8();
            assert_eq!(img.get_pixel(0, 0)[0], i as u8);
        }
    }

    #[tokio::test]
    async fn zero_page_pdf_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("empty.pdf");
        std::fs::write(&path, b"%PDF-1.4").unwrap();
        let rasteriser: Arc<dyn PdfRasteriser> = Arc::new(FixedPages(0));

        let err = render_document(&path, InputKind::Pdf, &rasteriser)
            .await
            .unwrap_err();
        assert!(matches!(err, OcrTaskError::NoPages { .. }));
    }

    #[test]
    fn pdfium_rasteriser_takes_scale_from_dpi() {
        let config = OcrConfig::builder().dpi(216).build().unwrap();
        let r = PdfiumRasteriser::new(&config);
        assert!((r.scale - 3.0).abs() < f32::EPSILON);
    }

    #[test]
    fn shared_library_binds_once_and_serialises_callers() {
        let library: Arc<SharedLibrary<usize>> = Arc::new(SharedLibrary::new());
        let binds = Arc::new(AtomicUsize::new(0));
        let busy = Arc::new(AtomicBool::new(false));

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let (library, binds, busy) =
                    (Arc::clone(&library), Arc::clone(&binds), Arc::clone(&busy));
                std::thread::spawn(move || {
                    library.with(
                        || Ok(binds.fetch_add(1, Ordering::SeqCst) + 100),
                        |handle| {
                            assert!(!busy.swap(true, Ordering::SeqCst), "overlapping use");
                            std::thread::sleep(std::time::Duration::from_millis(5));
                            busy.store(false, Ordering::SeqCst);
                            Ok(*handle)
                        },
                    )
                })
            })
            .collect();

        for worker in workers {
            assert_eq!(worker.join().unwrap().unwrap(), 100);
        }
        assert_eq!(binds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_bind_is_retried_by_the_next_caller() {
        let library: SharedLibrary<&str> = SharedLibrary::new();

        let err = library
            .with(
                || Err(OcrTaskError::PdfiumBindingFailed("missing".into())),
                |_| Ok(()),
            )
            .unwrap_err();
        assert!(matches!(err, OcrTaskError::PdfiumBindingFailed(_)));

        let got = library.with(|| Ok("bound"), |h| Ok(*h)).unwrap();
        assert_eq!(got, "bound");
        let again = library
            .with(|| panic!("already bound"), |h| Ok(*h))
            .unwrap();
        assert_eq!(again, "bound");
    }
}
