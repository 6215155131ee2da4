//! End-to-end tests against real PDFs rendered by pdfium.
//!
//! PDFs live in `./test_cases/`. Tests that need pdfium are gated behind the
//! `E2E_ENABLED` environment variable and skip when their file is missing.
//!
//! Run with:
//!   E2E_ENABLED=1 PDFIUM_LIB_PATH=/path/to/libpdfium.so cargo test --test e2e -- --nocapture

use edgequake_pdf2img::{
    convert, convert_from_bytes, convert_to_file, inspect, ConversionConfig, ExportScope,
    ImageFormat, LlmNameSuggester, Pdf2ImgError, PdfiumDocument, ProximityWindow, RenderScale,
    Session, ThumbnailState,
};
use std::io::{Cursor, Read};
use std::path::PathBuf;
use std::sync::Arc;

// ── Test helpers ─────────────────────────────────────────────────────────

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

/// Skip unless E2E_ENABLED is set and the PDF at `path` exists.
macro_rules! e2e_skip_unless_ready {
    ($path:expr) => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let p: PathBuf = $path;
        if !p.exists() {
            println!("SKIP: test file not found: {}", p.display());
            return;
        }
        p
    }};
}

fn sample_pdf() -> PathBuf {
    test_cases_dir().join("sample.pdf")
}

/// Names and first bytes of every file entry in a zip.
fn read_zip(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut zip = zip::ZipArchive::new(Cursor::new(bytes)).expect("valid zip");
    let mut out = Vec::new();
    for i in 0..zip.len() {
        let mut file = zip.by_index(i).unwrap();
        if file.is_dir() {
            continue;
        }
        let mut head = Vec::new();
        file.read_to_end(&mut head).unwrap();
        head.truncate(16);
        out.push((file.name().to_string(), head));
    }
    out
}

// ── Input rejection (no pdfium needed) ───────────────────────────────────

#[tokio::test]
async fn missing_file_is_reported() {
    let err = convert("/definitely/not/here.pdf", &ConversionConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Pdf2ImgError::FileNotFound { .. }), "{err:?}");
}

#[tokio::test]
async fn non_pdf_bytes_are_rejected_before_rendering() {
    let err = convert_from_bytes(b"<html>not a pdf</html>", &ConversionConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Pdf2ImgError::NotAPdf { .. }), "{err:?}");
}

// ── Inspect ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn inspect_reports_page_count() {
    let path = e2e_skip_unless_ready!(sample_pdf());

    let info = inspect(path.to_str().unwrap(), None)
        .await
        .expect("inspect() should succeed");

    assert!(info.page_count > 0);
    assert_eq!(info.name, "sample");
    assert!(!info.pdf_version.is_empty());
    println!("Document: {info:?}");
}

// ── Conversion ───────────────────────────────────────────────────────────

#[tokio::test]
async fn convert_first_page_to_jpeg() {
    let path = e2e_skip_unless_ready!(sample_pdf());

    let config = ConversionConfig::builder().pages("1").build().unwrap();
    let output = convert(path.to_str().unwrap(), &config)
        .await
        .expect("conversion should succeed");

    assert_eq!(output.archive_name, "sample_exported.zip");
    let files = read_zip(&output.archive);
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].0, "sample_exported/page_001.jpg");
    assert_eq!(&files[0].1[..3], &[0xFF, 0xD8, 0xFF]);
}

#[tokio::test]
async fn convert_to_file_writes_png_archive() {
    let path = e2e_skip_unless_ready!(sample_pdf());
    let dir = tempfile::tempdir().unwrap();

    let config = ConversionConfig::builder()
        .format(ImageFormat::Png)
        .scale(RenderScale::X1)
        .pages("1-2")
        .container_name("pngs")
        .build()
        .unwrap();
    let (written, stats) = convert_to_file(path.to_str().unwrap(), dir.path(), &config)
        .await
        .expect("conversion should succeed");

    assert_eq!(written, dir.path().join("pngs.zip"));
    assert_eq!(stats.failed_pages, 0);
    let bytes = std::fs::read(&written).unwrap();
    for (name, head) in read_zip(&bytes) {
        assert!(name.starts_with("pngs/page_"), "{name}");
        assert_eq!(&head[..8], b"\x89PNG\r\n\x1a\n");
    }
}

#[tokio::test]
async fn higher_scale_gives_larger_images() {
    let path = e2e_skip_unless_ready!(sample_pdf());
    let input = path.to_str().unwrap();

    let small = ConversionConfig::builder()
        .scale(RenderScale::X1)
        .pages("1")
        .build()
        .unwrap();
    let large = ConversionConfig::builder()
        .scale(RenderScale::X3)
        .pages("1")
        .build()
        .unwrap();

    let a = convert(input, &small).await.unwrap();
    let b = convert(input, &large).await.unwrap();
    let wa = a.pages[0].width;
    let wb = b.pages[0].width;
    assert!(
        (wb as f32 / wa as f32 - 3.0).abs() < 0.05,
        "{wa}px at 1x vs {wb}px at 3x"
    );
}

#[tokio::test]
async fn convert_from_bytes_matches_file_conversion() {
    let path = e2e_skip_unless_ready!(sample_pdf());
    let bytes = std::fs::read(&path).unwrap();

    let config = ConversionConfig::builder()
        .pages("1")
        .container_name("mem")
        .build()
        .unwrap();
    let output = convert_from_bytes(&bytes, &config).await.unwrap();
    assert_eq!(output.entries, vec!["mem/page_001.jpg"]);
}

// ── Session ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn session_previews_then_exports_selection() {
    let path = e2e_skip_unless_ready!(sample_pdf());

    let mut session = Session::open(&path, None).await.expect("open");
    let pages = session.page_count();
    assert!(pages > 0);

    let doc = PdfiumDocument::open(&path, None).await.unwrap();
    let window = ProximityWindow::for_document(&doc, 0.5, 8.0);
    for page in window.candidates(0.0, 600.0) {
        session.thumbnails().signal_visible(page);
    }
    assert!(matches!(
        session.thumbnails().settled(1).await,
        ThumbnailState::Success { .. }
    ));

    session.selection_mut().select_none();
    session.selection_mut().toggle(1);
    let container = session.default_container();
    let archive = session
        .export(ExportScope::Selection, &container)
        .await
        .expect("export");
    assert_eq!(archive.entries, vec![format!("{container}/page_001.jpg")]);
}

// ── Smart naming (live LLM) ──────────────────────────────────────────────

#[tokio::test]
async fn smart_name_is_sanitised() {
    let path = e2e_skip_unless_ready!(sample_pdf());
    if std::env::var("OPENAI_API_KEY").is_err() {
        println!("SKIP: OPENAI_API_KEY not set");
        return;
    }

    let suggester = LlmNameSuggester::from_env(Some("openai"), None).unwrap();
    let config = ConversionConfig::builder()
        .pages("1")
        .name_suggester(Arc::new(suggester))
        .build()
        .unwrap();
    let output = convert(path.to_str().unwrap(), &config).await.unwrap();

    let container = output.archive_name.trim_end_matches(".zip");
    assert!(container.ends_with("_exported"), "{container}");
    assert!(container
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_'));
    println!("Suggested archive: {}", output.archive_name);
}
