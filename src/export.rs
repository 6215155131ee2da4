//! Export pipeline: render target pages one at a time, then hand the
//! completed, selected ones to the archive writer.
//!
//! The pipeline is a resumable step function over an explicit
//! [`ConversionRun`]. [`ExportPipeline::step`] renders exactly one page;
//! [`ExportPipeline::drive`] loops `step` until the run is finished or the
//! [`CancelFlag`] is raised. Callers that want to interleave other work
//! (selection edits, retries, UI updates) call `step` themselves.
//!
//! ## Memory bound
//!
//! Only one export render is in flight per run. The raster surface of a
//! page is dropped inside the rendering adapter before the next page
//! starts; only the encoded bytes stay on the run.
//!
//! ## Failure scopes
//!
//! * A page that fails to render is recorded as an `Error` artifact and the
//!   run moves on.
//! * A page whose failure means the document is gone aborts the run with
//!   [`Pdf2ImgError::DocumentUnreadable`]. Everything rendered so far stays
//!   on the run.
//! * An archive-writer failure, a panic included, is returned verbatim as
//!   [`Pdf2ImgError::ArchiveFailed`]; artifacts are left untouched.

use crate::archive::{ArchiveEntry, ArchiveError, ArchiveWriter};
use crate::config::ConversionSettings;
use crate::error::Pdf2ImgError;
use crate::output::{ArchivePayload, PageArtifact, PageStatus};
use crate::pipeline::document::PageSource;
use crate::pipeline::render::{self, QualitySpec};
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::selection::SelectionSet;
use std::collections::BTreeSet;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

// ── Cancellation ─────────────────────────────────────────────────────────

/// Cooperative cancellation signal shared between a run and its owner.
///
/// Checked before each page is dispatched. The page currently rendering is
/// always allowed to finish.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Lower the flag so the next run can start.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// ── Run state ────────────────────────────────────────────────────────────

/// Working state of one export run.
///
/// Created by [`ExportPipeline::start`], advanced by
/// [`ExportPipeline::step`], and discarded when a new run starts or the
/// document is unloaded.
#[derive(Debug, Clone)]
pub struct ConversionRun {
    settings: ConversionSettings,
    targets: Vec<usize>,
    next: usize,
    completed: usize,
    /// One artifact per processed target, in page order.
    artifacts: Vec<PageArtifact>,
    progress: u8,
    cancelled: bool,
    aborted: Option<String>,
    archive: Option<ArchivePayload>,
    retried: usize,
    render_time: Duration,
}

impl ConversionRun {
    fn new(settings: ConversionSettings, targets: Vec<usize>) -> Self {
        Self {
            settings,
            artifacts: Vec::with_capacity(targets.len()),
            targets,
            next: 0,
            completed: 0,
            progress: 0,
            cancelled: false,
            aborted: None,
            archive: None,
            retried: 0,
            render_time: Duration::ZERO,
        }
    }

    /// Settings snapshot taken when the run started.
    pub fn settings(&self) -> &ConversionSettings {
        &self.settings
    }

    /// Target pages in ascending order.
    pub fn targets(&self) -> &[usize] {
        &self.targets
    }

    pub fn total(&self) -> usize {
        self.targets.len()
    }

    /// Pages processed so far, successful or not.
    pub fn completed(&self) -> usize {
        self.completed
    }

    /// `round(completed / total * 100)`.
    pub fn progress(&self) -> u8 {
        self.progress
    }

    /// Next page the run would dispatch, if any.
    pub fn next_page(&self) -> Option<usize> {
        if self.is_finished() {
            None
        } else {
            self.targets.get(self.next).copied()
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Reason the run was aborted by a document-level failure.
    pub fn abort_reason(&self) -> Option<&str> {
        self.aborted.as_deref()
    }

    /// No more pages will be dispatched: every target was processed, the
    /// run was cancelled, or it was aborted.
    pub fn is_finished(&self) -> bool {
        self.next >= self.targets.len() || self.cancelled || self.aborted.is_some()
    }

    /// Artifacts produced so far, in page order.
    pub fn artifacts(&self) -> &[PageArtifact] {
        &self.artifacts
    }

    pub fn artifact(&self, page_num: usize) -> Option<&PageArtifact> {
        self.index_of(page_num).map(|i| &self.artifacts[i])
    }

    /// Status of a target page; `None` when the page is not a target.
    pub fn status_of(&self, page_num: usize) -> Option<PageStatus> {
        if self.targets.binary_search(&page_num).is_err() {
            return None;
        }
        Some(
            self.artifact(page_num)
                .map_or(PageStatus::Pending, |a| a.status),
        )
    }

    pub fn succeeded(&self) -> usize {
        self.artifacts.iter().filter(|a| a.is_completed()).count()
    }

    pub fn failed(&self) -> usize {
        self.artifacts
            .iter()
            .filter(|a| a.status == PageStatus::Error)
            .count()
    }

    /// Number of retry attempts made on this run.
    pub fn retried(&self) -> usize {
        self.retried
    }

    /// Wall time spent in export renders, retries included.
    pub fn render_time(&self) -> Duration {
        self.render_time
    }

    /// The archive from the last successful hand-off, if still current.
    pub fn archive(&self) -> Option<&ArchivePayload> {
        self.archive.as_ref()
    }

    pub fn take_archive(&mut self) -> Option<ArchivePayload> {
        self.archive.take()
    }

    fn index_of(&self, page_num: usize) -> Option<usize> {
        self.artifacts
            .binary_search_by_key(&page_num, |a| a.page_num)
            .ok()
    }

    fn recompute_progress(&mut self) {
        let total = self.targets.len().max(1);
        self.progress = ((self.completed as f64 / total as f64) * 100.0).round() as u8;
    }
}

/// What one call to [`ExportPipeline::step`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// One page was rendered; `status` is `Completed` or `Error`.
    Rendered {
        page_num: usize,
        status: PageStatus,
        progress: u8,
    },
    /// The cancel flag was raised; nothing was dispatched.
    Cancelled,
    /// Every target has been processed.
    Finished,
}

/// How [`ExportPipeline::drive`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed { succeeded: usize, failed: usize },
    Cancelled { processed: usize },
}

// ── Pipeline ─────────────────────────────────────────────────────────────

/// Orchestrates export runs against one document.
pub struct ExportPipeline {
    source: Arc<dyn PageSource>,
    writer: Arc<dyn ArchiveWriter>,
    progress: ProgressCallback,
    cancel: CancelFlag,
}

impl fmt::Debug for ExportPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportPipeline")
            .field("page_count", &self.source.page_count())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl ExportPipeline {
    pub fn new(source: Arc<dyn PageSource>, writer: Arc<dyn ArchiveWriter>) -> Self {
        Self {
            source,
            writer,
            progress: Arc::new(NoopProgressCallback),
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_progress(mut self, cb: ProgressCallback) -> Self {
        self.progress = cb;
        self
    }

    /// Share an existing flag, e.g. one wired to Ctrl-C.
    pub fn with_cancel_flag(mut self, flag: CancelFlag) -> Self {
        self.cancel = flag;
        self
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn source(&self) -> &Arc<dyn PageSource> {
        &self.source
    }

    /// Create a run over `targets`, sorted ascending and de-duplicated.
    ///
    /// # Errors
    /// * [`Pdf2ImgError::PageOutOfRange`] if any target is outside the document
    /// * [`Pdf2ImgError::NothingToExport`] if `targets` is empty
    /// * [`Pdf2ImgError::InvalidConfig`] if `settings` fail validation
    pub fn start(
        &self,
        targets: impl IntoIterator<Item = usize>,
        settings: ConversionSettings,
    ) -> Result<ConversionRun, Pdf2ImgError> {
        settings.validate()?;
        let total = self.source.page_count();
        let targets: BTreeSet<usize> = targets.into_iter().collect();

        if let Some(&page) = targets.iter().find(|p| !(1..=total).contains(*p)) {
            return Err(Pdf2ImgError::PageOutOfRange { page, total });
        }
        if targets.is_empty() {
            return Err(Pdf2ImgError::NothingToExport {
                reason: "no pages selected".into(),
            });
        }

        let run = ConversionRun::new(settings, targets.into_iter().collect());
        info!(
            "Export run started: {} of {} pages, {} @ {} q={}",
            run.total(),
            total,
            settings.format,
            settings.scale,
            settings.quality
        );
        self.progress.on_run_start(run.total());
        Ok(run)
    }

    /// Render the next target page.
    ///
    /// # Errors
    /// [`Pdf2ImgError::DocumentUnreadable`] when the page failed because the
    /// document itself is gone. The failing artifact is recorded first and
    /// the run stays inspectable.
    pub async fn step(&self, run: &mut ConversionRun) -> Result<Step, Pdf2ImgError> {
        if run.cancelled {
            return Ok(Step::Cancelled);
        }
        if run.is_finished() {
            return Ok(Step::Finished);
        }
        if self.cancel.is_cancelled() {
            run.cancelled = true;
            info!(
                "Export run cancelled after {}/{} pages",
                run.completed,
                run.total()
            );
            self.progress.on_run_cancelled(run.completed, run.total());
            return Ok(Step::Cancelled);
        }

        let page_num = run.targets[run.next];
        let total = run.total();
        self.progress.on_page_start(page_num, total);

        let started = Instant::now();
        let artifact = render::render_page(
            Arc::clone(&self.source),
            page_num,
            QualitySpec::export(&run.settings),
        )
        .await;
        run.render_time += started.elapsed();

        run.next += 1;
        run.completed += 1;
        run.recompute_progress();
        let status = artifact.status;
        let progress = run.progress;

        let fatal = match &artifact.error {
            Some(err) => {
                warn!("Page {}/{} failed: {}", page_num, total, err);
                self.progress
                    .on_page_error(page_num, total, progress, &err.to_string());
                err.is_fatal().then(|| err.to_string())
            }
            None => {
                debug!(
                    "Page {}/{} done ({} bytes, {}%)",
                    page_num,
                    total,
                    artifact.byte_len(),
                    progress
                );
                self.progress
                    .on_page_complete(page_num, total, progress, artifact.byte_len());
                None
            }
        };
        run.artifacts.push(artifact);

        if let Some(detail) = fatal {
            run.aborted = Some(detail.clone());
            warn!("Export run aborted at page {}: {}", page_num, detail);
            return Err(Pdf2ImgError::DocumentUnreadable {
                page: page_num,
                detail,
            });
        }

        if run.next == total {
            info!(
                "Export run complete: {}/{} pages rendered",
                run.succeeded(),
                total
            );
            self.progress.on_run_complete(total, run.succeeded());
        }

        Ok(Step::Rendered {
            page_num,
            status,
            progress,
        })
    }

    /// Step until the run is finished or cancelled.
    pub async fn drive(&self, run: &mut ConversionRun) -> Result<RunOutcome, Pdf2ImgError> {
        loop {
            match self.step(run).await? {
                Step::Rendered { .. } => continue,
                Step::Cancelled => {
                    return Ok(RunOutcome::Cancelled {
                        processed: run.completed,
                    })
                }
                Step::Finished => {
                    return Ok(RunOutcome::Completed {
                        succeeded: run.succeeded(),
                        failed: run.failed(),
                    })
                }
            }
        }
    }

    /// Hand completed artifacts that are selected *right now* to the
    /// archive writer.
    ///
    /// Entries are named `{container}/page_{NNN}.{ext}` in page order. The
    /// payload is stored on the run and returned.
    ///
    /// # Errors
    /// * [`Pdf2ImgError::RunInProgress`] if pages are still to be dispatched
    /// * [`Pdf2ImgError::NothingToExport`] if no completed page is selected
    /// * [`Pdf2ImgError::ArchiveFailed`] if the writer failed
    pub async fn assemble<'r>(
        &self,
        run: &'r mut ConversionRun,
        selection: &SelectionSet,
        container: &str,
    ) -> Result<&'r ArchivePayload, Pdf2ImgError> {
        if !run.is_finished() {
            return Err(Pdf2ImgError::RunInProgress);
        }
        run.archive = None;

        let ext = run.settings.format.extension();
        let mut parts: Vec<(usize, String, Vec<u8>)> = Vec::new();
        for (idx, artifact) in run.artifacts.iter_mut().enumerate() {
            if !artifact.is_completed() || !selection.contains(artifact.page_num) {
                continue;
            }
            if let Some(bytes) = artifact.data.take() {
                let name = format!("{container}/page_{:03}.{ext}", artifact.page_num);
                parts.push((idx, name, bytes));
            }
        }

        if parts.is_empty() {
            return Err(Pdf2ImgError::NothingToExport {
                reason: format!(
                    "none of the {} rendered pages is selected",
                    run.succeeded()
                ),
            });
        }

        let writer = Arc::clone(&self.writer);
        let container_owned = container.to_string();
        let joined = tokio::task::spawn_blocking(move || {
            let result = {
                let entries: Vec<ArchiveEntry<'_>> = parts
                    .iter()
                    .map(|(_, name, bytes)| ArchiveEntry {
                        name: name.as_str(),
                        bytes: bytes.as_slice(),
                    })
                    .collect();
                // a panicking writer must not take the page bytes down with it
                let written = panic::catch_unwind(AssertUnwindSafe(|| {
                    writer.write_archive(&container_owned, &entries)
                }));
                written.unwrap_or_else(|payload| {
                    Err(ArchiveError(format!(
                        "archive writer panicked: {}",
                        panic_message(payload.as_ref())
                    )))
                })
            };
            (result, parts)
        })
        .await
        .map_err(|e| Pdf2ImgError::ArchiveFailed(format!("archive task panicked: {e}")))?;

        let (result, parts) = joined;
        let mut names = Vec::with_capacity(parts.len());
        for (idx, name, bytes) in parts {
            run.artifacts[idx].data = Some(bytes);
            names.push(name);
        }

        let bytes = result.map_err(|e| {
            warn!("Archive assembly failed: {}", e);
            Pdf2ImgError::ArchiveFailed(e.to_string())
        })?;

        let file_name = format!("{container}.{}", self.writer.extension());
        info!(
            "Archive '{}' ready: {} pages, {} bytes",
            file_name,
            names.len(),
            bytes.len()
        );
        self.progress
            .on_archive_ready(&file_name, names.len(), bytes.len());

        Ok(run.archive.insert(ArchivePayload {
            file_name,
            container: container.to_string(),
            entries: names,
            bytes,
        }))
    }

    /// [`drive`](Self::drive) then [`assemble`](Self::assemble).
    ///
    /// A cancelled run is still assembled from whatever it produced.
    pub async fn export<'r>(
        &self,
        run: &'r mut ConversionRun,
        selection: &SelectionSet,
        container: &str,
    ) -> Result<&'r ArchivePayload, Pdf2ImgError> {
        self.drive(run).await?;
        self.assemble(run, selection, container).await
    }

    /// Re-render one page that this run already processed and replace its
    /// artifact in place.
    ///
    /// Counters and progress are untouched. On success the page is added to
    /// `selection` and any previously assembled archive is dropped.
    ///
    /// # Errors
    /// * [`Pdf2ImgError::NotRetryable`] if the run has no settled artifact
    ///   for the page
    /// * [`Pdf2ImgError::DocumentUnreadable`] if the document is gone
    pub async fn retry(
        &self,
        run: &mut ConversionRun,
        selection: &mut SelectionSet,
        page_num: usize,
    ) -> Result<PageStatus, Pdf2ImgError> {
        let idx = run
            .index_of(page_num)
            .filter(|&i| run.artifacts[i].status.is_terminal())
            .ok_or(Pdf2ImgError::NotRetryable { page: page_num })?;
        let total = run.total();
        let progress = run.progress;

        debug!("Retrying page {}", page_num);
        run.artifacts[idx].mark_processing();
        run.retried += 1;
        self.progress.on_page_start(page_num, total);

        let started = Instant::now();
        let artifact = render::render_page(
            Arc::clone(&self.source),
            page_num,
            QualitySpec::export(&run.settings),
        )
        .await;
        run.render_time += started.elapsed();

        let status = artifact.status;
        let fatal = match &artifact.error {
            Some(err) => {
                warn!("Retry of page {} failed: {}", page_num, err);
                self.progress
                    .on_page_error(page_num, total, progress, &err.to_string());
                err.is_fatal().then(|| err.to_string())
            }
            None => {
                info!("Retry of page {} succeeded", page_num);
                self.progress
                    .on_page_complete(page_num, total, progress, artifact.byte_len());
                selection.insert(page_num);
                run.archive = None;
                None
            }
        };
        run.artifacts[idx] = artifact;

        match fatal {
            Some(detail) => Err(Pdf2ImgError::DocumentUnreadable {
                page: page_num,
                detail,
            }),
            None => Ok(status),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ZipArchiveWriter;
    use crate::error::EngineError;
    use crate::pipeline::document::{PageSize, Viewport};
    use image::{Rgba, RgbaImage};
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Pages listed in `broken` fail until `heal()` is called.
    struct FakeDocument {
        pages: usize,
        broken: Mutex<HashSet<usize>>,
        vanish_at: Option<usize>,
    }

    impl FakeDocument {
        fn new(pages: usize) -> Self {
            Self {
                pages,
                broken: Mutex::new(HashSet::new()),
                vanish_at: None,
            }
        }

        fn broken(pages: usize, broken: &[usize]) -> Self {
            let doc = Self::new(pages);
            doc.broken.lock().unwrap().extend(broken.iter().copied());
            doc
        }

        fn heal(&self) {
            self.broken.lock().unwrap().clear();
        }
    }

    impl PageSource for FakeDocument {
        fn page_count(&self) -> usize {
            self.pages
        }

        fn page_size(&self, _page_num: usize) -> Result<PageSize, EngineError> {
            Ok(PageSize {
                width: 8.0,
                height: 12.0,
            })
        }

        fn rasterize(&self, page_num: usize, vp: Viewport) -> Result<RgbaImage, EngineError> {
            if self.vanish_at == Some(page_num) {
                return Err(EngineError::DocumentUnavailable("file removed".into()));
            }
            if self.broken.lock().unwrap().contains(&page_num) {
                return Err(EngineError::Page(format!("page {page_num} is corrupt")));
            }
            Ok(RgbaImage::from_pixel(vp.width, vp.height, Rgba([10, 20, 30, 255])))
        }
    }

    struct FailingWriter;

    impl ArchiveWriter for FailingWriter {
        fn write_archive(
            &self,
            _container: &str,
            _entries: &[ArchiveEntry<'_>],
        ) -> Result<Vec<u8>, ArchiveError> {
            Err(ArchiveError("disk full".into()))
        }
    }

    struct PanickingWriter;

    impl ArchiveWriter for PanickingWriter {
        fn write_archive(
            &self,
            _container: &str,
            _entries: &[ArchiveEntry<'_>],
        ) -> Result<Vec<u8>, ArchiveError> {
            panic!("zip state corrupted");
        }
    }

    fn pipeline(doc: FakeDocument) -> (Arc<FakeDocument>, ExportPipeline) {
        let doc = Arc::new(doc);
        let source: Arc<dyn PageSource> = Arc::clone(&doc) as Arc<dyn PageSource>;
        (doc, ExportPipeline::new(source, Arc::new(ZipArchiveWriter::new())))
    }

    #[test]
    fn cancel_flag_is_shared_between_clones() {
        let a = CancelFlag::new();
        let b = a.clone();
        b.cancel();
        assert!(a.is_cancelled());
        a.reset();
        assert!(!b.is_cancelled());
    }

    #[test]
    fn start_sorts_and_dedups_targets() {
        let (_, p) = pipeline(FakeDocument::new(10));
        let run = p
            .start([5, 1, 3, 5], ConversionSettings::default())
            .unwrap();
        assert_eq!(run.targets(), &[1, 3, 5]);
        assert_eq!(run.next_page(), Some(1));
        assert_eq!(run.status_of(3), Some(PageStatus::Pending));
        assert_eq!(run.status_of(2), None);
    }

    #[test]
    fn start_rejects_out_of_range_and_empty() {
        let (_, p) = pipeline(FakeDocument::new(3));
        let err = p.start([1, 4], ConversionSettings::default()).unwrap_err();
        assert!(matches!(err, Pdf2ImgError::PageOutOfRange { page: 4, total: 3 }));
        let err = p.start([0], ConversionSettings::default()).unwrap_err();
        assert!(matches!(err, Pdf2ImgError::PageOutOfRange { page: 0, .. }));
        let err = p
            .start(Vec::new(), ConversionSettings::default())
            .unwrap_err();
        assert!(matches!(err, Pdf2ImgError::NothingToExport { .. }));
    }

    #[tokio::test]
    async fn step_processes_one_page_at_a_time() {
        let (_, p) = pipeline(FakeDocument::new(4));
        let mut run = p.start([2, 4], ConversionSettings::default()).unwrap();

        let first = p.step(&mut run).await.unwrap();
        assert_eq!(
            first,
            Step::Rendered {
                page_num: 2,
                status: PageStatus::Completed,
                progress: 50
            }
        );
        assert_eq!(run.artifacts().len(), 1);
        assert_eq!(run.status_of(4), Some(PageStatus::Pending));

        p.step(&mut run).await.unwrap();
        assert_eq!(run.progress(), 100);
        assert_eq!(p.step(&mut run).await.unwrap(), Step::Finished);
    }

    #[tokio::test]
    async fn broken_page_does_not_abort_run() {
        let (_, p) = pipeline(FakeDocument::broken(3, &[2]));
        let mut run = p.start(1..=3, ConversionSettings::default()).unwrap();
        let outcome = p.drive(&mut run).await.unwrap();
        assert_eq!(
            outcome,
            RunOutcome::Completed {
                succeeded: 2,
                failed: 1
            }
        );
        assert_eq!(run.status_of(2), Some(PageStatus::Error));
        assert_eq!(run.progress(), 100);
    }

    #[tokio::test]
    async fn vanished_document_aborts_but_keeps_artifacts() {
        let mut doc = FakeDocument::new(5);
        doc.vanish_at = Some(3);
        let (_, p) = pipeline(doc);
        let mut run = p.start(1..=5, ConversionSettings::default()).unwrap();

        let err = p.drive(&mut run).await.unwrap_err();
        assert!(matches!(err, Pdf2ImgError::DocumentUnreadable { page: 3, .. }));
        assert!(run.is_finished());
        assert_eq!(run.artifacts().len(), 3);
        assert_eq!(run.succeeded(), 2);
        assert!(run.abort_reason().is_some());
        assert_eq!(p.step(&mut run).await.unwrap(), Step::Finished);
    }

    #[tokio::test]
    async fn cancelled_before_start_dispatches_nothing() {
        let (_, p) = pipeline(FakeDocument::new(3));
        let mut run = p.start(1..=3, ConversionSettings::default()).unwrap();
        p.cancel();
        let outcome = p.drive(&mut run).await.unwrap();
        assert_eq!(outcome, RunOutcome::Cancelled { processed: 0 });
        assert!(run.artifacts().is_empty());
        assert_eq!(run.next_page(), None);
    }

    #[tokio::test]
    async fn assemble_names_entries_by_page() {
        let (_, p) = pipeline(FakeDocument::new(12));
        let mut run = p.start([12, 1], ConversionSettings::default()).unwrap();
        let selection = SelectionSet::all(12);
        let payload = p.export(&mut run, &selection, "doc_exported").await.unwrap();
        assert_eq!(payload.file_name, "doc_exported.zip");
        assert_eq!(
            payload.entries,
            vec!["doc_exported/page_001.jpg", "doc_exported/page_012.jpg"]
        );
        // bytes are handed back to the artifacts after writing
        assert!(run.artifact(1).unwrap().data.is_some());
    }

    #[tokio::test]
    async fn assemble_before_finish_is_rejected() {
        let (_, p) = pipeline(FakeDocument::new(3));
        let mut run = p.start(1..=3, ConversionSettings::default()).unwrap();
        p.step(&mut run).await.unwrap();
        let err = p
            .assemble(&mut run, &SelectionSet::all(3), "x")
            .await
            .unwrap_err();
        assert!(matches!(err, Pdf2ImgError::RunInProgress));
    }

    #[tokio::test]
    async fn writer_failure_keeps_artifacts() {
        let source: Arc<dyn PageSource> = Arc::new(FakeDocument::new(2));
        let p = ExportPipeline::new(source, Arc::new(FailingWriter));
        let mut run = p.start(1..=2, ConversionSettings::default()).unwrap();
        let err = p
            .export(&mut run, &SelectionSet::all(2), "x")
            .await
            .unwrap_err();
        match err {
            Pdf2ImgError::ArchiveFailed(msg) => assert_eq!(msg, "disk full"),
            other => panic!("expected ArchiveFailed, got {other:?}"),
        }
        assert!(run.archive().is_none());
        assert!(run.artifacts().iter().all(|a| a.data.is_some()));
    }

    #[tokio::test]
    async fn panicking_writer_keeps_artifacts() {
        let source: Arc<dyn PageSource> = Arc::new(FakeDocument::new(3));
        let p = ExportPipeline::new(Arc::clone(&source), Arc::new(PanickingWriter));
        let mut run = p.start(1..=3, ConversionSettings::default()).unwrap();
        let selection = SelectionSet::all(3);

        let err = p.export(&mut run, &selection, "x").await.unwrap_err();
        match err {
            Pdf2ImgError::ArchiveFailed(msg) => {
                assert!(msg.contains("zip state corrupted"), "{msg}")
            }
            other => panic!("expected ArchiveFailed, got {other:?}"),
        }
        assert_eq!(run.succeeded(), 3);
        assert!(run.artifacts().iter().all(|a| a.data.is_some()));

        let fixed = ExportPipeline::new(source, Arc::new(ZipArchiveWriter::new()));
        let payload = fixed.assemble(&mut run, &selection, "x").await.unwrap();
        assert_eq!(payload.entries.len(), 3);
    }

    #[tokio::test]
    async fn retry_replaces_in_place_and_selects_page() {
        let (doc, p) = pipeline(FakeDocument::broken(4, &[3]));
        let mut run = p.start(1..=4, ConversionSettings::default()).unwrap();
        p.drive(&mut run).await.unwrap();

        let mut selection = SelectionSet::new(4);
        selection.insert(1);
        doc.heal();

        let status = p.retry(&mut run, &mut selection, 3).await.unwrap();
        assert_eq!(status, PageStatus::Completed);
        assert!(selection.contains(3));
        assert_eq!(run.progress(), 100);
        assert_eq!(run.completed(), 4);
        assert_eq!(run.retried(), 1);
        assert_eq!(run.artifacts().len(), 4);
    }

    #[tokio::test]
    async fn retry_of_unprocessed_page_is_rejected() {
        let (_, p) = pipeline(FakeDocument::new(4));
        let mut run = p.start([1, 2], ConversionSettings::default()).unwrap();
        p.step(&mut run).await.unwrap();
        let mut selection = SelectionSet::all(4);
        let err = p.retry(&mut run, &mut selection, 2).await.unwrap_err();
        assert!(matches!(err, Pdf2ImgError::NotRetryable { page: 2 }));
    }

    #[tokio::test]
    async fn successful_retry_invalidates_archive() {
        let (_, p) = pipeline(FakeDocument::new(2));
        let mut run = p.start(1..=2, ConversionSettings::default()).unwrap();
        let mut selection = SelectionSet::all(2);
        p.export(&mut run, &selection, "x").await.unwrap();
        assert!(run.archive().is_some());

        p.retry(&mut run, &mut selection, 2).await.unwrap();
        assert!(run.archive().is_none());
    }
}
