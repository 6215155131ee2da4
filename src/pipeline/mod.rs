//! Pipeline stages for turning a PDF into page images.
//!
//! Each submodule implements exactly one step.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ document ──▶ render ──▶ encode
//! (URL/path)  (pdfium)   (surface)  (jpeg/png/webp)
//! ```
//!
//! 1. [`input`]: canonicalise the user-supplied path or URL to a local
//!    file and reject anything that is not a PDF
//! 2. [`document`]: the [`document::PageSource`] seam and its pdfium
//!    implementation
//! 3. [`render`]: page + quality spec → artifact,
//!    on the blocking pool, never failing as `Err`
//! 4. [`encode`]: raster encoding of the drawn surface

pub mod document;
pub mod encode;
pub mod input;
pub mod render;
