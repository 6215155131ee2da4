//! Configuration types for PDF-to-image conversion.
//!
//! Two layers of configuration exist:
//!
//! * [`ConversionSettings`]: the output knobs a user edits (format, quality,
//!   scale). An export run takes an immutable copy of these when it starts,
//!   so editing settings can never change a run that is already going.
//! * [`ConversionConfig`]: everything the one-shot [`crate::convert()`]
//!   entry point needs on top of the settings: page range, password,
//!   naming service, progress callback, cancellation and input limits.
//!
//! Both are built through builders so callers set only what they care about
//! and rely on documented defaults for the rest.

use crate::error::Pdf2ImgError;
use crate::export::CancelFlag;
use crate::naming::NameSuggester;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Lowest accepted encoder quality.
pub const MIN_QUALITY: f32 = 0.1;
/// Highest accepted encoder quality.
pub const MAX_QUALITY: f32 = 1.0;

// ── Output settings ──────────────────────────────────────────────────────

/// Raster encoding of the exported page images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// Lossy, no alpha channel. Pages are flattened onto white. (default)
    #[default]
    Jpeg,
    /// Lossless, keeps transparency.
    Png,
    /// Lossless WebP, keeps transparency.
    Webp,
}

impl ImageFormat {
    /// MIME type, e.g. `image/jpeg`.
    pub fn mime_type(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Webp => "image/webp",
        }
    }

    /// File extension used for archive entries.
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
            ImageFormat::Webp => "webp",
        }
    }

    /// JPEG has no alpha channel, so the surface has to be opaque before drawing.
    pub fn needs_opaque_background(self) -> bool {
        matches!(self, ImageFormat::Jpeg)
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Png => "png",
            ImageFormat::Webp => "webp",
        })
    }
}

/// Geometry multiplier applied to the page's natural size (72 points per inch).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RenderScale {
    #[serde(rename = "1")]
    X1,
    #[default]
    #[serde(rename = "1.5")]
    X1_5,
    #[serde(rename = "2")]
    X2,
    #[serde(rename = "3")]
    X3,
}

impl RenderScale {
    /// All supported multipliers, smallest first.
    pub const ALL: [RenderScale; 4] = [
        RenderScale::X1,
        RenderScale::X1_5,
        RenderScale::X2,
        RenderScale::X3,
    ];

    pub fn factor(self) -> f32 {
        match self {
            RenderScale::X1 => 1.0,
            RenderScale::X1_5 => 1.5,
            RenderScale::X2 => 2.0,
            RenderScale::X3 => 3.0,
        }
    }
}

impl TryFrom<f32> for RenderScale {
    type Error = Pdf2ImgError;

    fn try_from(value: f32) -> Result<Self, Self::Error> {
        RenderScale::ALL
            .into_iter()
            .find(|s| (s.factor() - value).abs() < f32::EPSILON)
            .ok_or_else(|| {
                Pdf2ImgError::InvalidConfig(format!(
                    "scale must be one of 1, 1.5, 2, 3 (got {value})"
                ))
            })
    }
}

impl fmt::Display for RenderScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x", self.factor())
    }
}

/// Output settings for an export run.
///
/// `Copy` on purpose: a run stores its own snapshot taken at start.
///
/// # Example
/// ```rust
/// use edgequake_pdf2img::{ConversionSettings, ImageFormat, RenderScale};
///
/// let settings = ConversionSettings::builder()
///     .format(ImageFormat::Png)
///     .scale(RenderScale::X2)
///     .build()
///     .unwrap();
/// assert_eq!(settings.format.extension(), "png");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConversionSettings {
    /// Raster encoding. Default: JPEG.
    pub format: ImageFormat,
    /// Encoder quality in `[0.1, 1.0]`. Only JPEG is lossy. Default: 0.8.
    pub quality: f32,
    /// Geometry multiplier. Default: 1.5×.
    pub scale: RenderScale,
}

impl Default for ConversionSettings {
    fn default() -> Self {
        Self {
            format: ImageFormat::Jpeg,
            quality: 0.8,
            scale: RenderScale::X1_5,
        }
    }
}

impl ConversionSettings {
    pub fn builder() -> ConversionSettingsBuilder {
        ConversionSettingsBuilder {
            settings: Self::default(),
        }
    }

    /// Check the quality range; used by the builder and by callers that
    /// deserialise settings from elsewhere.
    pub fn validate(&self) -> Result<(), Pdf2ImgError> {
        if !(MIN_QUALITY..=MAX_QUALITY).contains(&self.quality) {
            return Err(Pdf2ImgError::InvalidConfig(format!(
                "quality must be {MIN_QUALITY}–{MAX_QUALITY}, got {}",
                self.quality
            )));
        }
        Ok(())
    }
}

/// Builder for [`ConversionSettings`].
#[derive(Debug)]
pub struct ConversionSettingsBuilder {
    settings: ConversionSettings,
}

impl ConversionSettingsBuilder {
    pub fn format(mut self, format: ImageFormat) -> Self {
        self.settings.format = format;
        self
    }

    pub fn quality(mut self, q: f32) -> Self {
        // NaN survives `clamp` and is rejected by `build`.
        self.settings.quality = q.clamp(MIN_QUALITY, MAX_QUALITY);
        self
    }

    pub fn scale(mut self, scale: RenderScale) -> Self {
        self.settings.scale = scale;
        self
    }

    pub fn build(self) -> Result<ConversionSettings, Pdf2ImgError> {
        self.settings.validate()?;
        Ok(self.settings)
    }
}

/// Which pages an export run renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExportScope {
    /// Render only the selected pages. (default)
    #[default]
    Selection,
    /// Render every page; the selection still filters the archive at hand-off.
    AllPages,
}

// ── One-shot conversion config ───────────────────────────────────────────

/// Configuration for [`crate::convert()`] and friends.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_pdf2img::{ConversionConfig, ImageFormat};
///
/// let config = ConversionConfig::builder()
///     .format(ImageFormat::Png)
///     .pages("1-3, 5")
///     .build()
///     .unwrap();
/// assert_eq!(config.pages.as_deref(), Some("1-3, 5"));
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Output format, quality and scale.
    pub settings: ConversionSettings,

    /// Page range specification, e.g. `"1-3, 5"`. `None` selects every page.
    pub pages: Option<String>,

    /// Render the selection only, or every page. Default: selection.
    pub scope: ExportScope,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Explicit archive container name. Wins over the naming service.
    pub container_name: Option<String>,

    /// Optional service that proposes a container name from the first page.
    pub name_suggester: Option<Arc<dyn NameSuggester>>,

    /// Receives per-page progress events.
    pub progress_callback: Option<ProgressCallback>,

    /// Raised to stop dispatching further pages.
    pub cancel: CancelFlag,

    /// Extra attempts for each page that failed during the run. Default: 0.
    pub retry_failed: u32,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Largest accepted input file in megabytes. Default: 50.
    pub max_file_size_mb: u64,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            settings: ConversionSettings::default(),
            pages: None,
            scope: ExportScope::default(),
            password: None,
            container_name: None,
            name_suggester: None,
            progress_callback: None,
            cancel: CancelFlag::new(),
            retry_failed: 0,
            download_timeout_secs: 120,
            max_file_size_mb: 50,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("settings", &self.settings)
            .field("pages", &self.pages)
            .field("scope", &self.scope)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("container_name", &self.container_name)
            .field(
                "name_suggester",
                &self.name_suggester.as_ref().map(|_| "<dyn NameSuggester>"),
            )
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ExportProgressCallback>"),
            )
            .field("cancelled", &self.cancel.is_cancelled())
            .field("retry_failed", &self.retry_failed)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("max_file_size_mb", &self.max_file_size_mb)
            .finish()
    }
}

impl ConversionConfig {
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn settings(mut self, settings: ConversionSettings) -> Self {
        self.config.settings = settings;
        self
    }

    pub fn format(mut self, format: ImageFormat) -> Self {
        self.config.settings.format = format;
        self
    }

    pub fn quality(mut self, q: f32) -> Self {
        self.config.settings.quality = q.clamp(MIN_QUALITY, MAX_QUALITY);
        self
    }

    pub fn scale(mut self, scale: RenderScale) -> Self {
        self.config.settings.scale = scale;
        self
    }

    pub fn pages(mut self, spec: impl Into<String>) -> Self {
        self.config.pages = Some(spec.into());
        self
    }

    pub fn scope(mut self, scope: ExportScope) -> Self {
        self.config.scope = scope;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn container_name(mut self, name: impl Into<String>) -> Self {
        self.config.container_name = Some(name.into());
        self
    }

    pub fn name_suggester(mut self, suggester: Arc<dyn NameSuggester>) -> Self {
        self.config.name_suggester = Some(suggester);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn cancel_flag(mut self, flag: CancelFlag) -> Self {
        self.config.cancel = flag;
        self
    }

    pub fn retry_failed(mut self, n: u32) -> Self {
        self.config.retry_failed = n;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn max_file_size_mb(mut self, mb: u64) -> Self {
        self.config.max_file_size_mb = mb;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Pdf2ImgError> {
        let c = &self.config;
        c.settings.validate()?;
        if c.max_file_size_mb == 0 {
            return Err(Pdf2ImgError::InvalidConfig(
                "max file size must be ≥ 1 MB".into(),
            ));
        }
        if let Some(ref spec) = c.pages {
            if spec.trim().is_empty() {
                return Err(Pdf2ImgError::InvalidConfig(
                    "page range must not be empty".into(),
                ));
            }
        }
        Ok(self.config)
    }
}
