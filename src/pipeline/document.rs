//! Document handle: the read-only seam between the pipeline and a PDF engine.
//!
//! The pipeline only ever asks three questions of a document: how many
//! pages it has, how large a page is, and "draw page N into a surface of
//! this size". [`PageSource`] captures exactly that, so the rendering
//! adapter, the thumbnail loader and the export pipeline can share one
//! `Arc<dyn PageSource>` without coordination, and tests can swap in an
//! in-memory engine.
//!
//! ## Why reopen the PDF per page?
//!
//! `pdfium-render` ties a `PdfDocument<'a>` to the `Pdfium` binding that
//! loaded it, and neither can be held across `.await` points. Keeping the
//! raw bytes and reopening inside `spawn_blocking` makes [`PdfiumDocument`]
//! `Send + Sync` and lets preview and export renders run on different
//! blocking threads. The library load itself is cached by the OS loader.

use crate::error::{EngineError, Pdf2ImgError};
use crate::output::DocumentInfo;
use image::RgbaImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

/// Page dimensions in PDF points (1/72 inch).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    /// Pixel size of the surface needed to draw this page at `scale`.
    pub fn viewport(self, scale: f32) -> Viewport {
        Viewport {
            width: ((self.width * scale).round() as u32).max(1),
            height: ((self.height * scale).round() as u32).max(1),
        }
    }
}

/// Pixel dimensions of a rendering surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// A paginated document that can be rasterised page by page.
///
/// Implementations are read-only: concurrent calls for different pages must
/// be safe. All methods block; async callers go through `spawn_blocking`.
pub trait PageSource: Send + Sync {
    /// Number of pages. Page numbers are `1..=page_count()`.
    fn page_count(&self) -> usize;

    /// Natural size of a page (1-indexed).
    fn page_size(&self, page_num: usize) -> Result<PageSize, EngineError>;

    /// Draw a page (1-indexed) into a fresh RGBA surface of `viewport` size.
    ///
    /// Areas the page does not paint stay transparent.
    fn rasterize(&self, page_num: usize, viewport: Viewport) -> Result<RgbaImage, EngineError>;
}

/// A PDF held in memory and rendered through pdfium.
pub struct PdfiumDocument {
    bytes: Arc<Vec<u8>>,
    password: Option<String>,
    page_sizes: Vec<PageSize>,
    info: DocumentInfo,
}

impl std::fmt::Debug for PdfiumDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfiumDocument")
            .field("bytes", &self.bytes.len())
            .field("pages", &self.page_sizes.len())
            .field("info", &self.info)
            .finish()
    }
}

impl PdfiumDocument {
    /// Read and open a PDF file. Runs the pdfium work on a blocking thread.
    pub async fn open(path: &Path, password: Option<&str>) -> Result<Self, Pdf2ImgError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => Pdf2ImgError::FileNotFound {
                    path: path.to_path_buf(),
                },
                std::io::ErrorKind::PermissionDenied => Pdf2ImgError::PermissionDenied {
                    path: path.to_path_buf(),
                },
                _ => Pdf2ImgError::Internal(format!("Failed to read {}: {e}", path.display())),
            })?;
        let path = path.to_path_buf();
        let pwd = password.map(|s| s.to_string());

        tokio::task::spawn_blocking(move || Self::open_blocking(bytes, pwd, &path))
            .await
            .map_err(|e| Pdf2ImgError::Internal(format!("Open task panicked: {}", e)))?
    }

    /// Blocking implementation of [`PdfiumDocument::open`].
    pub fn open_blocking(
        bytes: Vec<u8>,
        password: Option<String>,
        path: &Path,
    ) -> Result<Self, Pdf2ImgError> {
        let pdfium = bind_pdfium()?;

        let (page_sizes, title, author, pdf_version) = {
            let document = pdfium
                .load_pdf_from_byte_slice(&bytes, password.as_deref())
                .map_err(|e| classify_load_error(e, password.is_some(), path))?;

            let pages = document.pages();
            let page_sizes: Vec<PageSize> = pages
                .iter()
                .map(|page| PageSize {
                    width: page.width().value,
                    height: page.height().value,
                })
                .collect();

            let metadata = document.metadata();
            let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
                metadata.get(tag).and_then(|t| {
                    let v = t.value().to_string();
                    if v.is_empty() {
                        None
                    } else {
                        Some(v)
                    }
                })
            };

            (
                page_sizes,
                get_meta(PdfDocumentMetadataTagType::Title),
                get_meta(PdfDocumentMetadataTagType::Author),
                format!("{:?}", document.version()),
            )
        };

        if page_sizes.is_empty() {
            return Err(Pdf2ImgError::EmptyDocument {
                path: path.to_path_buf(),
            });
        }
        info!("PDF loaded: {} pages", page_sizes.len());

        let info = DocumentInfo {
            name: document_base_name(path),
            size_bytes: bytes.len() as u64,
            page_count: page_sizes.len(),
            title,
            author,
            pdf_version,
        };

        Ok(Self {
            bytes: Arc::new(bytes),
            password,
            page_sizes,
            info,
        })
    }

    pub fn info(&self) -> &DocumentInfo {
        &self.info
    }
}

impl PageSource for PdfiumDocument {
    fn page_count(&self) -> usize {
        self.page_sizes.len()
    }

    fn page_size(&self, page_num: usize) -> Result<PageSize, EngineError> {
        page_num
            .checked_sub(1)
            .and_then(|idx| self.page_sizes.get(idx))
            .copied()
            .ok_or_else(|| EngineError::Page(format!("no page {page_num}")))
    }

    fn rasterize(&self, page_num: usize, viewport: Viewport) -> Result<RgbaImage, EngineError> {
        let pdfium =
            bind_pdfium().map_err(|e| EngineError::DocumentUnavailable(e.to_string()))?;
        let document = pdfium
            .load_pdf_from_byte_slice(&self.bytes, self.password.as_deref())
            .map_err(|e| EngineError::DocumentUnavailable(format!("{:?}", e)))?;

        let index = page_num
            .checked_sub(1)
            .and_then(|idx| u16::try_from(idx).ok())
            .ok_or_else(|| EngineError::Page(format!("no page {page_num}")))?;

        let page = document
            .pages()
            .get(index)
            .map_err(|e| EngineError::Page(format!("{:?}", e)))?;

        let render_config = PdfRenderConfig::new()
            .set_target_width(viewport.width as i32)
            .set_target_height(viewport.height as i32)
            .set_clear_color(PdfColor::new(255, 255, 255, 0));

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| EngineError::Page(format!("{:?}", e)))?;

        let image = bitmap.as_image().to_rgba8();
        debug!(
            "Rasterised page {} → {}x{} px",
            page_num,
            image.width(),
            image.height()
        );
        Ok(image)
    }
}

/// File name without directory and without a trailing `.pdf`.
pub fn document_base_name(path: &Path) -> String {
    let file = path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = match file.len().checked_sub(4) {
        Some(cut) if file.is_char_boundary(cut) && file[cut..].eq_ignore_ascii_case(".pdf") => {
            &file[..cut]
        }
        _ => file.as_str(),
    };
    if stem.is_empty() {
        "document".to_string()
    } else {
        stem.to_string()
    }
}

/// Where the pdfium library was found the first time it bound.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LibraryLocation {
    File(PathBuf),
    System,
}

static RESOLVED_LIBRARY: OnceLock<LibraryLocation> = OnceLock::new();

/// Bind to a pdfium shared library.
///
/// Discovery order:
/// 1. `PDFIUM_LIB_PATH` env var (explicit path to the library file)
/// 2. Alongside the running executable
/// 3. The current directory
/// 4. System library search paths
///
/// The first successful location is remembered for the rest of the process,
/// so per-page renders skip the search. Failures are not remembered.
pub fn bind_pdfium() -> Result<Pdfium, Pdf2ImgError> {
    if let Some(location) = RESOLVED_LIBRARY.get() {
        return bind_at(location);
    }

    let (location, pdfium) = discover_pdfium()?;
    debug!(?location, "pdfium library resolved");
    // a concurrent first bind may win the race; both found a working library
    let _ = RESOLVED_LIBRARY.set(location);
    Ok(pdfium)
}

fn bind_at(location: &LibraryLocation) -> Result<Pdfium, Pdf2ImgError> {
    let bindings = match location {
        LibraryLocation::File(path) => Pdfium::bind_to_library(path),
        LibraryLocation::System => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| Pdf2ImgError::PdfiumBindingFailed(e.to_string()))?;
    Ok(Pdfium::new(bindings))
}

fn discover_pdfium() -> Result<(LibraryLocation, Pdfium), Pdf2ImgError> {
    if let Ok(path) = std::env::var("PDFIUM_LIB_PATH") {
        debug!(path = %path, "Loading pdfium from env var");
        let bindings = Pdfium::bind_to_library(&path).map_err(|e| {
            Pdf2ImgError::PdfiumBindingFailed(format!("{path}: {e}"))
        })?;
        return Ok((LibraryLocation::File(PathBuf::from(path)), Pdfium::new(bindings)));
    }

    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            candidates.push(dir.to_path_buf());
        }
    }
    candidates.push(PathBuf::from("./"));

    for dir in &candidates {
        let lib_path = PathBuf::from(Pdfium::pdfium_platform_library_name_at_path(
            dir.to_string_lossy().as_ref(),
        ));
        if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
            debug!(dir = %dir.display(), "Loaded pdfium from candidate directory");
            return Ok((LibraryLocation::File(lib_path), Pdfium::new(bindings)));
        }
    }

    let bindings = Pdfium::bind_to_system_library()
        .map_err(|e| Pdf2ImgError::PdfiumBindingFailed(e.to_string()))?;
    Ok((LibraryLocation::System, Pdfium::new(bindings)))
}

/// Map a pdfium load failure onto the input-rejection errors.
fn classify_load_error(e: PdfiumError, had_password: bool, path: &Path) -> Pdf2ImgError {
    let err_str = format!("{:?}", e);
    if err_str.contains("Password") || err_str.contains("password") {
        if had_password {
            Pdf2ImgError::WrongPassword {
                path: path.to_path_buf(),
            }
        } else {
            Pdf2ImgError::PasswordRequired {
                path: path.to_path_buf(),
            }
        }
    } else {
        Pdf2ImgError::CorruptPdf {
            path: path.to_path_buf(),
            detail: err_str,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_name_strips_pdf_extension() {
        assert_eq!(document_base_name(Path::new("/tmp/report.pdf")), "report");
        assert_eq!(document_base_name(Path::new("Slides.PDF")), "Slides");
        assert_eq!(document_base_name(Path::new("notes.txt")), "notes.txt");
        assert_eq!(document_base_name(Path::new(".pdf")), "document");
    }

    #[test]
    fn failed_binding_is_not_remembered() {
        std::env::set_var("PDFIUM_LIB_PATH", "/nonexistent/libpdfium-missing.so");
        let err = bind_pdfium().unwrap_err();
        std::env::remove_var("PDFIUM_LIB_PATH");

        match err {
            Pdf2ImgError::PdfiumBindingFailed(msg) => {
                assert!(msg.contains("libpdfium-missing"), "{msg}")
            }
            other => panic!("expected PdfiumBindingFailed, got {other:?}"),
        }
        assert!(RESOLVED_LIBRARY.get().is_none());
    }

    #[test]
    fn viewport_rounds_and_never_collapses() {
        let letter = PageSize {
            width: 612.0,
            height: 792.0,
        };
        assert_eq!(
            letter.viewport(1.5),
            Viewport {
                width: 918,
                height: 1188
            }
        );
        let sliver = PageSize {
            width: 0.2,
            height: 10.0,
        };
        assert_eq!(sliver.viewport(1.0).width, 1);
    }
}
