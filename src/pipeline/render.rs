//! Rendering adapter: page number + quality spec → [`PageArtifact`].
//!
//! This is the only place that talks to a [`PageSource`]. Whatever the
//! engine does (corrupt page, unsupported content, encoder failure) ends up
//! as a `PageArtifact` with `status == Error`; nothing is returned as `Err`.
//!
//! ## Why spawn_blocking?
//!
//! pdfium is CPU-bound and not async-safe. `tokio::task::spawn_blocking`
//! moves each render onto the blocking pool so Tokio worker threads never
//! stall while a large page rasterises.
//!
//! ## Surface lifetime
//!
//! Each call allocates one RGBA surface sized to the page's viewport at the
//! requested scale, encodes it, and drops it before returning. Only the
//! encoded bytes survive, owned by the artifact.

use super::document::PageSource;
use super::encode;
use crate::config::{ConversionSettings, ImageFormat};
use crate::error::PageError;
use crate::output::PageArtifact;
use image::{imageops, DynamicImage, Rgba, RgbaImage};
use std::sync::Arc;
use tracing::{debug, warn};

/// Fixed scale for preview renders, independent of the export settings.
pub const PREVIEW_SCALE: f32 = 0.5;
/// Encoder quality for preview renders.
pub const PREVIEW_QUALITY: f32 = 0.5;
/// Background painted under JPEG renders.
pub const OPAQUE_BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// The two quality tiers a page can be rendered at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityTier {
    /// Cheap, low-resolution, best-effort.
    Preview,
    /// Full resolution at the caller's scale.
    Export,
}

/// Geometry scale, encoding and encoder quality for one render.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualitySpec {
    pub tier: QualityTier,
    pub scale: f32,
    pub format: ImageFormat,
    pub quality: f32,
}

impl QualitySpec {
    /// Low-resolution JPEG used for thumbnails.
    pub fn preview() -> Self {
        Self {
            tier: QualityTier::Preview,
            scale: PREVIEW_SCALE,
            format: ImageFormat::Jpeg,
            quality: PREVIEW_QUALITY,
        }
    }

    /// Full-resolution render following the user's settings.
    pub fn export(settings: &ConversionSettings) -> Self {
        Self {
            tier: QualityTier::Export,
            scale: settings.scale.factor(),
            format: settings.format,
            quality: settings.quality,
        }
    }

    /// Scale actually used: previews ignore the caller-supplied scale.
    pub fn effective_scale(&self) -> f32 {
        match self.tier {
            QualityTier::Preview => PREVIEW_SCALE,
            QualityTier::Export => self.scale,
        }
    }
}

/// Render one page on the blocking pool.
///
/// `page_num` must be within `1..=source.page_count()`.
pub async fn render_page(
    source: Arc<dyn PageSource>,
    page_num: usize,
    spec: QualitySpec,
) -> PageArtifact {
    tokio::task::spawn_blocking(move || render_page_blocking(source.as_ref(), page_num, &spec))
        .await
        .unwrap_or_else(|e| {
            warn!("Render task for page {} died: {}", page_num, e);
            PageArtifact::failed(
                page_num,
                PageError::RenderFailed {
                    page: page_num,
                    detail: format!("render task panicked: {e}"),
                },
            )
        })
}

/// Blocking implementation of [`render_page`].
pub fn render_page_blocking(
    source: &dyn PageSource,
    page_num: usize,
    spec: &QualitySpec,
) -> PageArtifact {
    debug_assert!(
        (1..=source.page_count()).contains(&page_num),
        "page {page_num} outside 1..={}",
        source.page_count()
    );

    let viewport = match source.page_size(page_num) {
        Ok(size) => size.viewport(spec.effective_scale()),
        Err(e) => return PageArtifact::failed(page_num, e.into_page_error(page_num)),
    };

    let drawn = match source.rasterize(page_num, viewport) {
        Ok(img) => img,
        Err(e) => {
            warn!("Page {}: rasterisation failed: {}", page_num, e);
            return PageArtifact::failed(page_num, e.into_page_error(page_num));
        }
    };
    let (width, height) = drawn.dimensions();

    let surface = if spec.format.needs_opaque_background() {
        let mut canvas = RgbaImage::from_pixel(width, height, OPAQUE_BACKGROUND);
        imageops::overlay(&mut canvas, &drawn, 0, 0);
        DynamicImage::ImageRgba8(canvas)
    } else {
        DynamicImage::ImageRgba8(drawn)
    };

    match encode::encode_raster(&surface, spec.format, spec.quality) {
        Ok(bytes) => {
            debug!(
                "Rendered page {} ({:?}) → {}x{} px, {} bytes",
                page_num,
                spec.tier,
                width,
                height,
                bytes.len()
            );
            PageArtifact::completed(page_num, bytes, width, height)
        }
        Err(e) => {
            warn!("Page {}: encoding failed: {}", page_num, e);
            PageArtifact::failed(
                page_num,
                PageError::EncodeFailed {
                    page: page_num,
                    detail: e.to_string(),
                },
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RenderScale;
    use crate::error::EngineError;
    use crate::output::PageStatus;
    use crate::pipeline::document::{PageSize, Viewport};

    /// Half-transparent page; page 2 is broken, page 3 takes the document down.
    struct GlassDocument;

    impl PageSource for GlassDocument {
        fn page_count(&self) -> usize {
            3
        }

        fn page_size(&self, _page_num: usize) -> Result<PageSize, EngineError> {
            Ok(PageSize {
                width: 40.0,
                height: 20.0,
            })
        }

        fn rasterize(&self, page_num: usize, vp: Viewport) -> Result<RgbaImage, EngineError> {
            match page_num {
                2 => Err(EngineError::Page("unsupported shading".into())),
                3 => Err(EngineError::DocumentUnavailable("file vanished".into())),
                _ => Ok(RgbaImage::from_pixel(vp.width, vp.height, Rgba([0, 0, 0, 0]))),
            }
        }
    }

    #[test]
    fn preview_ignores_caller_scale() {
        let mut spec = QualitySpec::preview();
        spec.scale = 3.0;
        assert_eq!(spec.effective_scale(), PREVIEW_SCALE);
        let a = render_page_blocking(&GlassDocument, 1, &spec);
        assert_eq!((a.width, a.height), (20, 10));
    }

    #[test]
    fn export_uses_settings_scale() {
        let settings = ConversionSettings::builder()
            .scale(RenderScale::X2)
            .build()
            .unwrap();
        let a = render_page_blocking(&GlassDocument, 1, &QualitySpec::export(&settings));
        assert_eq!(a.status, PageStatus::Completed);
        assert_eq!((a.width, a.height), (80, 40));
    }

    #[test]
    fn jpeg_surface_is_flattened_onto_white() {
        let settings = ConversionSettings::default();
        let a = render_page_blocking(&GlassDocument, 1, &QualitySpec::export(&settings));
        let decoded = image::load_from_memory(a.data.as_deref().unwrap())
            .unwrap()
            .to_rgb8();
        let px = decoded.get_pixel(5, 5);
        assert!(px.0.iter().all(|&c| c > 240), "expected white, got {:?}", px);
    }

    #[test]
    fn png_keeps_transparency() {
        let settings = ConversionSettings::builder()
            .format(ImageFormat::Png)
            .build()
            .unwrap();
        let a = render_page_blocking(&GlassDocument, 1, &QualitySpec::export(&settings));
        let decoded = image::load_from_memory(a.data.as_deref().unwrap())
            .unwrap()
            .to_rgba8();
        assert_eq!(decoded.get_pixel(0, 0).0[3], 0);
    }

    #[test]
    fn engine_failures_become_error_artifacts() {
        let spec = QualitySpec::preview();
        let broken = render_page_blocking(&GlassDocument, 2, &spec);
        assert_eq!(broken.status, PageStatus::Error);
        assert!(broken.data.is_none());
        assert!(!broken.error.as_ref().unwrap().is_fatal());

        let gone = render_page_blocking(&GlassDocument, 3, &spec);
        assert!(gone.error.as_ref().unwrap().is_fatal());
    }

    #[tokio::test]
    async fn render_page_runs_on_blocking_pool() {
        let source: Arc<dyn PageSource> = Arc::new(GlassDocument);
        let ok = render_page(Arc::clone(&source), 1, QualitySpec::preview()).await;
        let err = render_page(source, 2, QualitySpec::preview()).await;
        assert_eq!(ok.status, PageStatus::Completed);
        assert_eq!(err.status, PageStatus::Error);
    }
}
