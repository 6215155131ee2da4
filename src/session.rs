//! One loaded document and everything that hangs off it.
//!
//! A [`Session`] owns the document handle, the selection, the current
//! settings, the thumbnail loader and at most one [`ConversionRun`]. There
//! is no global state: loading another document goes through
//! [`Session::replace_document`], which swaps all of it in one call.
//!
//! ```text
//!          start_export            finish (archive ok)
//!  Ready ───────────────▶ Converting ───────────────▶ Completed
//!    ▲                        │                            │
//!    └── run-level error ─────┘            start_export ───┘
//! ```
//!
//! A run-level failure (unreadable document, archive writer error) puts
//! the session back in `Ready`. Selection and settings are untouched and
//! the failed run stays available through [`Session::run`].

use crate::archive::{ArchiveWriter, ZipArchiveWriter};
use crate::config::{ConversionSettings, ExportScope};
use crate::error::Pdf2ImgError;
use crate::export::{CancelFlag, ConversionRun, ExportPipeline, RunOutcome, Step};
use crate::naming::{self, NameSuggester};
use crate::output::{ArchivePayload, DocumentInfo, PageStatus};
use crate::pipeline::document::{PageSource, PdfiumDocument};
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::selection::SelectionSet;
use crate::thumbnails::ThumbnailLoader;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Where the session is in its export lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Settings may be edited and a run may be started.
    Ready,
    /// A run exists and has not been packaged yet.
    Converting,
    /// The current run produced an archive.
    Completed,
}

/// Single-document conversion session.
pub struct Session {
    info: DocumentInfo,
    source: Arc<dyn PageSource>,
    selection: SelectionSet,
    settings: ConversionSettings,
    thumbnails: ThumbnailLoader,
    writer: Arc<dyn ArchiveWriter>,
    progress: ProgressCallback,
    cancel: CancelFlag,
    pipeline: ExportPipeline,
    run: Option<ConversionRun>,
    phase: SessionPhase,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("document", &self.info.name)
            .field("pages", &self.info.page_count)
            .field("selection", &self.selection.to_string())
            .field("settings", &self.settings)
            .field("phase", &self.phase)
            .field("run_progress", &self.run.as_ref().map(ConversionRun::progress))
            .finish()
    }
}

impl Session {
    /// Start a session over an already opened document. Every page starts
    /// selected.
    pub fn new(source: Arc<dyn PageSource>, info: DocumentInfo) -> Self {
        let writer: Arc<dyn ArchiveWriter> = Arc::new(ZipArchiveWriter::new());
        let progress: ProgressCallback = Arc::new(NoopProgressCallback);
        let cancel = CancelFlag::new();
        let pipeline = build_pipeline(&source, &writer, &progress, &cancel);
        info!(
            "Session opened for '{}' ({} pages)",
            info.name,
            source.page_count()
        );
        Self {
            selection: SelectionSet::all(source.page_count()),
            thumbnails: ThumbnailLoader::new(Arc::clone(&source)),
            settings: ConversionSettings::default(),
            info,
            source,
            writer,
            progress,
            cancel,
            pipeline,
            run: None,
            phase: SessionPhase::Ready,
        }
    }

    /// Open a PDF with pdfium and start a session over it.
    pub async fn open(path: impl AsRef<Path>, password: Option<&str>) -> Result<Self, Pdf2ImgError> {
        let doc = PdfiumDocument::open(path.as_ref(), password).await?;
        let info = doc.info().clone();
        Ok(Self::new(Arc::new(doc), info))
    }

    pub fn with_writer(mut self, writer: Arc<dyn ArchiveWriter>) -> Self {
        self.writer = writer;
        self.rebuild_pipeline();
        self
    }

    pub fn with_progress(mut self, cb: ProgressCallback) -> Self {
        self.progress = cb;
        self.rebuild_pipeline();
        self
    }

    pub fn with_settings(mut self, settings: ConversionSettings) -> Result<Self, Pdf2ImgError> {
        self.set_settings(settings)?;
        Ok(self)
    }

    // ── Accessors ────────────────────────────────────────────────────────

    pub fn info(&self) -> &DocumentInfo {
        &self.info
    }

    pub fn page_count(&self) -> usize {
        self.source.page_count()
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn settings(&self) -> &ConversionSettings {
        &self.settings
    }

    pub fn selection(&self) -> &SelectionSet {
        &self.selection
    }

    /// The selection may be edited at any time, including mid-run; the
    /// archive reflects it as it is when [`Session::finish`] runs.
    pub fn selection_mut(&mut self) -> &mut SelectionSet {
        &mut self.selection
    }

    pub fn thumbnails(&self) -> &ThumbnailLoader {
        &self.thumbnails
    }

    pub fn run(&self) -> Option<&ConversionRun> {
        self.run.as_ref()
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// `{base}_exported`, the container name used without a naming service.
    pub fn default_container(&self) -> String {
        naming::container_name("", &self.info.name)
    }

    // ── Settings and document ───────────────────────────────────────────

    /// # Errors
    /// [`Pdf2ImgError::RunInProgress`] while a run still has pages to render.
    pub fn set_settings(&mut self, settings: ConversionSettings) -> Result<(), Pdf2ImgError> {
        if self.is_running() {
            return Err(Pdf2ImgError::RunInProgress);
        }
        settings.validate()?;
        self.settings = settings;
        Ok(())
    }

    /// Swap in another document. Outstanding previews are released, the
    /// run is dropped and every page of the new document is selected.
    /// Settings carry over.
    pub fn replace_document(&mut self, source: Arc<dyn PageSource>, info: DocumentInfo) {
        self.cancel.cancel();
        self.thumbnails.unload();
        info!(
            "Replacing '{}' with '{}' ({} pages)",
            self.info.name,
            info.name,
            source.page_count()
        );

        self.selection = SelectionSet::all(source.page_count());
        self.thumbnails = ThumbnailLoader::new(Arc::clone(&source));
        self.source = source;
        self.info = info;
        self.run = None;
        self.phase = SessionPhase::Ready;
        self.cancel.reset();
        self.rebuild_pipeline();
    }

    // ── Export ──────────────────────────────────────────────────────────

    /// Start a new run over the selection (or every page) with a snapshot of
    /// the current settings. Any previous run is discarded.
    pub fn start_export(&mut self, scope: ExportScope) -> Result<(), Pdf2ImgError> {
        if self.is_running() {
            return Err(Pdf2ImgError::RunInProgress);
        }
        let targets: Vec<usize> = match scope {
            ExportScope::Selection => self.selection.sorted(),
            ExportScope::AllPages => (1..=self.page_count()).collect(),
        };

        self.cancel.reset();
        let run = self.pipeline.start(targets, self.settings)?;
        debug!("Session run created over {} pages", run.total());
        self.run = Some(run);
        self.phase = SessionPhase::Converting;
        Ok(())
    }

    /// Render the next page of the current run.
    pub async fn step(&mut self) -> Result<Step, Pdf2ImgError> {
        let run = self.run.as_mut().ok_or(Pdf2ImgError::NoActiveRun)?;
        let result = self.pipeline.step(run).await;
        if result.is_err() {
            self.phase = SessionPhase::Ready;
        }
        result
    }

    /// Step the current run until it is finished or cancelled.
    pub async fn drive(&mut self) -> Result<RunOutcome, Pdf2ImgError> {
        let run = self.run.as_mut().ok_or(Pdf2ImgError::NoActiveRun)?;
        let result = self.pipeline.drive(run).await;
        if result.is_err() {
            self.phase = SessionPhase::Ready;
        }
        result
    }

    /// Re-render one page of the finished run.
    ///
    /// A success selects the page and drops any archive built earlier.
    pub async fn retry(&mut self, page_num: usize) -> Result<PageStatus, Pdf2ImgError> {
        let run = self.run.as_mut().ok_or(Pdf2ImgError::NoActiveRun)?;
        if !run.is_finished() {
            return Err(Pdf2ImgError::RunInProgress);
        }
        let status = self
            .pipeline
            .retry(run, &mut self.selection, page_num)
            .await?;
        if self.phase == SessionPhase::Completed && run.archive().is_none() {
            self.phase = SessionPhase::Ready;
        }
        Ok(status)
    }

    /// Ask `suggester` for a container name using the first completed page
    /// of the run; falls back to [`Session::default_container`].
    pub async fn suggest_container(&self, suggester: &dyn NameSuggester) -> String {
        let sample = self
            .run
            .as_ref()
            .and_then(|run| run.artifacts().iter().find(|a| a.is_completed()))
            .and_then(|a| a.data.as_deref());
        let suggested = match (sample, self.run.as_ref()) {
            (Some(bytes), Some(run)) => {
                suggester
                    .suggest(bytes, run.settings().format.mime_type())
                    .await
            }
            _ => String::new(),
        };
        naming::container_name(&suggested, &self.info.name)
    }

    /// Package the run's completed, currently selected pages.
    pub async fn finish(&mut self, container: &str) -> Result<&ArchivePayload, Pdf2ImgError> {
        let run = self.run.as_mut().ok_or(Pdf2ImgError::NoActiveRun)?;
        match self.pipeline.assemble(run, &self.selection, container).await {
            Ok(payload) => {
                self.phase = SessionPhase::Completed;
                Ok(payload)
            }
            Err(Pdf2ImgError::RunInProgress) => Err(Pdf2ImgError::RunInProgress),
            Err(e) => {
                self.phase = SessionPhase::Ready;
                Err(e)
            }
        }
    }

    /// `start_export`, `drive` and `finish` in one call.
    pub async fn export(
        &mut self,
        scope: ExportScope,
        container: &str,
    ) -> Result<&ArchivePayload, Pdf2ImgError> {
        self.start_export(scope)?;
        self.drive().await?;
        self.finish(container).await
    }

    /// A run has been started and still has pages to dispatch.
    fn is_running(&self) -> bool {
        self.phase == SessionPhase::Converting
            && self.run.as_ref().is_some_and(|run| !run.is_finished())
    }

    fn rebuild_pipeline(&mut self) {
        self.pipeline = build_pipeline(&self.source, &self.writer, &self.progress, &self.cancel);
    }
}

fn build_pipeline(
    source: &Arc<dyn PageSource>,
    writer: &Arc<dyn ArchiveWriter>,
    progress: &ProgressCallback,
    cancel: &CancelFlag,
) -> ExportPipeline {
    ExportPipeline::new(Arc::clone(source), Arc::clone(writer))
        .with_progress(Arc::clone(progress))
        .with_cancel_flag(cancel.clone())
}
