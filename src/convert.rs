//! One-shot conversion entry points.
//!
//! [`convert`] does the whole job in one call: resolve the input, open the
//! PDF, select pages, run the export pipeline, retry failed pages, pick a
//! container name and assemble the archive. Use [`crate::session::Session`]
//! instead when pages are selected, previewed or retried interactively.

use crate::archive::ZipArchiveWriter;
use crate::config::{ConversionConfig, ExportScope};
use crate::error::Pdf2ImgError;
use crate::export::{ConversionRun, ExportPipeline, RunOutcome};
use crate::naming;
use crate::output::{ConversionOutput, ConversionStats, DocumentInfo, PageStatus, PageSummary};
use crate::pipeline::document::{PageSource, PdfiumDocument};
use crate::pipeline::input;
use crate::selection::SelectionSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Convert a PDF file or URL into a zip of page images.
///
/// # Arguments
/// * `input_str`: local file path or HTTP/HTTPS URL to a PDF
/// * `config`: conversion configuration
///
/// # Returns
/// `Ok(ConversionOutput)` whenever an archive was produced, even if some
/// pages failed (check `output.stats.failed_pages`).
///
/// # Errors
/// * input rejection: file not found, not a PDF, too large, wrong password
/// * [`Pdf2ImgError::DocumentUnreadable`] if the document died before any
///   page could be archived (a later failure is reported in
///   `output.stats.aborted` and the earlier pages are still packaged)
/// * [`Pdf2ImgError::NothingToExport`] if no selected page rendered
/// * [`Pdf2ImgError::ArchiveFailed`] if the archive could not be written
pub async fn convert(
    input_str: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Pdf2ImgError> {
    let input_str = input_str.as_ref();
    info!("Starting conversion: {}", input_str);

    // ── Step 1: Resolve input ────────────────────────────────────────────
    let resolved =
        input::resolve_input(input_str, config.download_timeout_secs, config.max_file_size_mb)
            .await?;

    // ── Step 2: Open the document ────────────────────────────────────────
    let doc = PdfiumDocument::open(resolved.path(), config.password.as_deref()).await?;
    let info = doc.info().clone();
    info!("PDF '{}' has {} pages", info.name, info.page_count);

    let output = convert_document(Arc::new(doc), info, config).await;
    drop(resolved);
    output
}

/// Run the export part of [`convert`] against an already opened document.
///
/// Works with any [`PageSource`], so it can be driven by an in-memory
/// engine as well as by pdfium.
pub async fn convert_document(
    source: Arc<dyn PageSource>,
    info: DocumentInfo,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Pdf2ImgError> {
    let total_start = Instant::now();
    let total_pages = source.page_count();

    // ── Step 3: Selection and targets ────────────────────────────────────
    let mut selection = SelectionSet::all(total_pages);
    if let Some(ref spec) = config.pages {
        if !selection.apply_range(spec) {
            return Err(Pdf2ImgError::InvalidConfig(format!(
                "page range '{spec}' selects no page of this {total_pages}-page document"
            )));
        }
    }
    let targets: Vec<usize> = match config.scope {
        ExportScope::Selection => selection.sorted(),
        ExportScope::AllPages => (1..=total_pages).collect(),
    };
    debug!("{}; rendering {} pages", selection, targets.len());

    // ── Step 4: Export run ───────────────────────────────────────────────
    let mut pipeline = ExportPipeline::new(source, Arc::new(ZipArchiveWriter::new()))
        .with_cancel_flag(config.cancel.clone());
    if let Some(ref cb) = config.progress_callback {
        pipeline = pipeline.with_progress(Arc::clone(cb));
    }

    let mut run = pipeline.start(targets, config.settings)?;
    let mut aborted: Option<Pdf2ImgError> = None;
    match pipeline.drive(&mut run).await {
        Ok(RunOutcome::Cancelled { processed }) => warn!(
            "Conversion cancelled after {}/{} pages; packaging what is done",
            processed,
            run.total()
        ),
        Ok(RunOutcome::Completed { .. }) => {}
        Err(e @ Pdf2ImgError::DocumentUnreadable { .. }) => {
            warn!("{}; packaging the pages rendered before it", e);
            aborted = Some(e);
        }
        Err(e) => return Err(e),
    }

    // ── Step 5: Retry failed pages ───────────────────────────────────────
    if !run.is_cancelled() && aborted.is_none() {
        if let Err(e) = retry_failed_pages(&pipeline, &mut run, &mut selection, config).await {
            match e {
                Pdf2ImgError::DocumentUnreadable { .. } => {
                    warn!("{} during retries; packaging what is done", e);
                    aborted = Some(e);
                }
                other => return Err(other),
            }
        }
    }

    // ── Step 6: Container name ───────────────────────────────────────────
    let container = resolve_container(&run, &info, config).await;

    // ── Step 7: Archive ──────────────────────────────────────────────────
    if let Err(e) = pipeline
        .assemble(&mut run, &selection, &container)
        .await
        .map(|_| ())
    {
        // nothing survived the abort: report the abort, not the empty archive
        return Err(match (e, aborted) {
            (Pdf2ImgError::NothingToExport { .. }, Some(abort)) => abort,
            (e, _) => e,
        });
    }
    let archive = run
        .take_archive()
        .ok_or_else(|| Pdf2ImgError::Internal("assembled archive went missing".into()))?;

    // ── Step 8: Stats ────────────────────────────────────────────────────
    let stats = ConversionStats {
        total_pages,
        target_pages: run.total(),
        completed_pages: run.succeeded(),
        failed_pages: run.failed(),
        archived_pages: archive.entries.len(),
        retried_pages: run.retried(),
        archive_bytes: archive.bytes.len(),
        total_duration_ms: total_start.elapsed().as_millis() as u64,
        render_duration_ms: run.render_time().as_millis() as u64,
        cancelled: run.is_cancelled(),
        aborted: aborted.map(|e| e.to_string()),
    };

    info!(
        "Conversion complete: {}/{} pages archived in '{}', {}ms total",
        stats.archived_pages, stats.target_pages, archive.file_name, stats.total_duration_ms
    );

    Ok(ConversionOutput {
        document: info,
        settings: *run.settings(),
        archive_name: archive.file_name,
        entries: archive.entries,
        archive: archive.bytes,
        pages: run.artifacts().iter().map(PageSummary::from).collect(),
        stats,
    })
}

/// Convert a PDF and write the archive to disk.
///
/// `output_path` may be a file path or an existing directory; in the latter
/// case the archive's own file name is used. Returns the written path.
pub async fn convert_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<(PathBuf, ConversionStats), Pdf2ImgError> {
    let output = convert(input_str, config).await?;
    let path = save_archive(&output.archive, &output.archive_name, output_path).await?;
    Ok((path, output.stats))
}

/// Persist archive bytes.
///
/// Writes to a temporary sibling and renames it into place, so a crash never
/// leaves a truncated archive behind.
pub async fn save_archive(
    bytes: &[u8],
    file_name: &str,
    target: impl AsRef<Path>,
) -> Result<PathBuf, Pdf2ImgError> {
    let target = target.as_ref();
    let path = if target.is_dir() {
        target.join(file_name)
    } else {
        target.to_path_buf()
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Pdf2ImgError::OutputWriteFailed {
                path: path.clone(),
                source: e,
            })?;
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".part");
    let tmp_path = path.with_file_name(tmp_name);

    tokio::fs::write(&tmp_path, bytes)
        .await
        .map_err(|e| Pdf2ImgError::OutputWriteFailed {
            path: path.clone(),
            source: e,
        })?;

    tokio::fs::rename(&tmp_path, &path)
        .await
        .map_err(|e| Pdf2ImgError::OutputWriteFailed {
            path: path.clone(),
            source: e,
        })?;

    info!("Saved archive to {}", path.display());
    Ok(path)
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    input_str: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Pdf2ImgError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Pdf2ImgError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(input_str, config))
}

/// Read document facts without rendering anything.
pub async fn inspect(
    input_str: impl AsRef<str>,
    password: Option<&str>,
) -> Result<DocumentInfo, Pdf2ImgError> {
    let defaults = ConversionConfig::default();
    let resolved = input::resolve_input(
        input_str.as_ref(),
        defaults.download_timeout_secs,
        defaults.max_file_size_mb,
    )
    .await?;
    let doc = PdfiumDocument::open(resolved.path(), password).await?;
    Ok(doc.info().clone())
}

/// Convert PDF bytes held in memory.
///
/// The bytes are written to a managed temp file that is removed when this
/// returns.
pub async fn convert_from_bytes(
    bytes: &[u8],
    config: &ConversionConfig,
) -> Result<ConversionOutput, Pdf2ImgError> {
    let mut tmp = tempfile::Builder::new()
        .suffix(".pdf")
        .tempfile()
        .map_err(|e| Pdf2ImgError::Internal(format!("tempfile: {e}")))?;
    tmp.write_all(bytes)
        .map_err(|e| Pdf2ImgError::Internal(format!("tempfile write: {e}")))?;
    let path = tmp.path().to_string_lossy().to_string();
    convert(&path, config).await
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Give every failed page up to `config.retry_failed` more attempts.
async fn retry_failed_pages(
    pipeline: &ExportPipeline,
    run: &mut ConversionRun,
    selection: &mut SelectionSet,
    config: &ConversionConfig,
) -> Result<(), Pdf2ImgError> {
    for attempt in 1..=config.retry_failed {
        let failed: Vec<usize> = run
            .artifacts()
            .iter()
            .filter(|a| a.status == PageStatus::Error)
            .map(|a| a.page_num)
            .collect();
        if failed.is_empty() {
            break;
        }
        info!(
            "Retry round {}/{}: {} failed pages",
            attempt,
            config.retry_failed,
            failed.len()
        );
        for page_num in failed {
            if config.cancel.is_cancelled() {
                return Ok(());
            }
            pipeline.retry(run, selection, page_num).await?;
        }
    }
    Ok(())
}

/// Explicit name, else the naming service, else `{base}_exported`.
async fn resolve_container(
    run: &ConversionRun,
    info: &DocumentInfo,
    config: &ConversionConfig,
) -> String {
    if let Some(name) = config
        .container_name
        .as_deref()
        .map(|n| n.trim().trim_end_matches('/'))
        .filter(|n| !n.is_empty())
    {
        return name.to_string();
    }

    let sample = run
        .artifacts()
        .iter()
        .find(|a| a.is_completed())
        .and_then(|a| a.data.as_deref());
    let suggested = match (&config.name_suggester, sample) {
        (Some(suggester), Some(bytes)) => {
            suggester
                .suggest(bytes, run.settings().format.mime_type())
                .await
        }
        _ => String::new(),
    };
    naming::container_name(&suggested, &info.name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_archive_into_directory_uses_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = save_archive(b"PK\x05\x06", "doc_exported.zip", dir.path())
            .await
            .unwrap();
        assert_eq!(path, dir.path().join("doc_exported.zip"));
        assert_eq!(std::fs::read(&path).unwrap(), b"PK\x05\x06");
        assert!(!dir.path().join("doc_exported.zip.part").exists());
    }

    #[tokio::test]
    async fn save_archive_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested/out/custom.zip");
        let path = save_archive(b"zip", "ignored.zip", &target).await.unwrap();
        assert_eq!(path, target);
        assert!(target.exists());
    }

    #[tokio::test]
    async fn convert_rejects_missing_input() {
        let err = convert("/no/such/dir/file.pdf", &ConversionConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Pdf2ImgError::FileNotFound { .. }));
    }

    #[test]
    fn convert_sync_rejects_non_pdf() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"hello world").unwrap();
        let err = convert_sync(tmp.path().to_str().unwrap(), &ConversionConfig::default())
            .unwrap_err();
        assert!(matches!(err, Pdf2ImgError::NotAPdf { .. }));
    }
}
