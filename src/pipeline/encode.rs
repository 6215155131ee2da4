//! Raster encoding: `DynamicImage` → JPEG / PNG / WebP bytes.
//!
//! JPEG is the only lossy format here; `quality` (0.1–1.0) maps onto the
//! encoder's 1–100 scale. PNG and WebP are written lossless, so `quality`
//! has no effect on them. JPEG input must already be opaque: the rendering
//! adapter flattens the page onto white before calling in here.

use crate::config::ImageFormat;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::DynamicImage;
use tracing::debug;

/// Encode a rasterised page in the requested format.
pub fn encode_raster(
    img: &DynamicImage,
    format: ImageFormat,
    quality: f32,
) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    match format {
        ImageFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            rgb.write_with_encoder(JpegEncoder::new_with_quality(
                &mut buf,
                jpeg_quality(quality),
            ))?;
        }
        ImageFormat::Png => {
            img.write_with_encoder(PngEncoder::new(&mut buf))?;
        }
        ImageFormat::Webp => {
            let rgba = DynamicImage::ImageRgba8(img.to_rgba8());
            rgba.write_with_encoder(WebPEncoder::new_lossless(&mut buf))?;
        }
    }

    debug!("Encoded {} image → {} bytes", format, buf.len());
    Ok(buf)
}

/// Map a 0.1–1.0 quality onto the JPEG encoder's 1–100 scale.
fn jpeg_quality(quality: f32) -> u8 {
    (quality * 100.0).round().clamp(1.0, 100.0) as u8
}
