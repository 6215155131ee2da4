//! Event-stream API: watch a conversion as a `Stream` instead of callbacks.
//!
//! [`progress_channel`] turns [`ExportProgressCallback`] events into a
//! [`Stream`] of [`ExportEvent`]s. [`convert_stream`] runs a whole
//! [`crate::convert()`] in a spawned task and hands back that stream plus
//! the task's [`JoinHandle`]; the stream ends when the conversion is done.
//!
//! Events arrive in the order the pipeline emits them, which is page order
//! because export renders are strictly sequential.

use crate::config::ConversionConfig;
use crate::convert::convert;
use crate::error::Pdf2ImgError;
use crate::output::ConversionOutput;
use crate::progress::{ExportProgressCallback, ProgressCallback};
use serde::Serialize;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::Stream;

/// A boxed stream of export events.
pub type EventStream = Pin<Box<dyn Stream<Item = ExportEvent> + Send>>;

/// One progress event from an export run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExportEvent {
    RunStarted {
        total_pages: usize,
    },
    PageStarted {
        page_num: usize,
        total_pages: usize,
    },
    PageCompleted {
        page_num: usize,
        total_pages: usize,
        progress: u8,
        bytes: usize,
    },
    PageFailed {
        page_num: usize,
        total_pages: usize,
        progress: u8,
        error: String,
    },
    RunCancelled {
        processed: usize,
        total_pages: usize,
    },
    RunCompleted {
        total_pages: usize,
        success_count: usize,
    },
    ArchiveReady {
        file_name: String,
        entries: usize,
        bytes: usize,
    },
}

/// Progress callback that forwards every event into an unbounded channel,
/// and optionally to another callback as well.
pub struct ChannelProgress {
    tx: mpsc::UnboundedSender<ExportEvent>,
    forward: Option<ProgressCallback>,
}

impl ChannelProgress {
    fn send(&self, event: ExportEvent) {
        // receiver gone means nobody is listening any more
        let _ = self.tx.send(event);
    }
}

impl ExportProgressCallback for ChannelProgress {
    fn on_run_start(&self, total_pages: usize) {
        if let Some(cb) = &self.forward {
            cb.on_run_start(total_pages);
        }
        self.send(ExportEvent::RunStarted { total_pages });
    }

    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        if let Some(cb) = &self.forward {
            cb.on_page_start(page_num, total_pages);
        }
        self.send(ExportEvent::PageStarted {
            page_num,
            total_pages,
        });
    }

    fn on_page_complete(&self, page_num: usize, total_pages: usize, progress: u8, bytes: usize) {
        if let Some(cb) = &self.forward {
            cb.on_page_complete(page_num, total_pages, progress, bytes);
        }
        self.send(ExportEvent::PageCompleted {
            page_num,
            total_pages,
            progress,
            bytes,
        });
    }

    fn on_page_error(&self, page_num: usize, total_pages: usize, progress: u8, error: &str) {
        if let Some(cb) = &self.forward {
            cb.on_page_error(page_num, total_pages, progress, error);
        }
        self.send(ExportEvent::PageFailed {
            page_num,
            total_pages,
            progress,
            error: error.to_string(),
        });
    }

    fn on_run_cancelled(&self, processed: usize, total_pages: usize) {
        if let Some(cb) = &self.forward {
            cb.on_run_cancelled(processed, total_pages);
        }
        self.send(ExportEvent::RunCancelled {
            processed,
            total_pages,
        });
    }

    fn on_run_complete(&self, total_pages: usize, success_count: usize) {
        if let Some(cb) = &self.forward {
            cb.on_run_complete(total_pages, success_count);
        }
        self.send(ExportEvent::RunCompleted {
            total_pages,
            success_count,
        });
    }

    fn on_archive_ready(&self, file_name: &str, entries: usize, bytes: usize) {
        if let Some(cb) = &self.forward {
            cb.on_archive_ready(file_name, entries, bytes);
        }
        self.send(ExportEvent::ArchiveReady {
            file_name: file_name.to_string(),
            entries,
            bytes,
        });
    }
}

/// A callback/stream pair: events given to the callback come out of the
/// stream. The stream ends once every clone of the callback is dropped.
pub fn progress_channel() -> (ProgressCallback, EventStream) {
    channel_with_forward(None)
}

fn channel_with_forward(forward: Option<ProgressCallback>) -> (ProgressCallback, EventStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    let cb: ProgressCallback = Arc::new(ChannelProgress { tx, forward });
    (cb, Box::pin(UnboundedReceiverStream::new(rx)))
}

/// Run [`convert`] in a spawned task and stream its progress events.
///
/// A progress callback already set on `config` keeps receiving events too.
///
/// # Example
/// ```rust,no_run
/// use edgequake_pdf2img::{convert_stream, ConversionConfig, ExportEvent};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let (mut events, task) = convert_stream("report.pdf", ConversionConfig::default());
/// while let Some(event) = events.next().await {
///     if let ExportEvent::PageCompleted { page_num, progress, .. } = event {
///         println!("page {page_num} done ({progress}%)");
///     }
/// }
/// let output = task.await??;
/// println!("{} entries", output.entries.len());
/// # Ok(())
/// # }
/// ```
pub fn convert_stream(
    input: impl Into<String>,
    mut config: ConversionConfig,
) -> (EventStream, JoinHandle<Result<ConversionOutput, Pdf2ImgError>>) {
    let input = input.into();
    let (cb, events) = channel_with_forward(config.progress_callback.take());
    config.progress_callback = Some(cb);
    let task = tokio::spawn(async move { convert(&input, &config).await });
    (events, task)
}
