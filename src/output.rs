//! Result types produced by the rendering adapter and the export pipeline.

use crate::config::ConversionSettings;
use crate::error::PageError;
use serde::{Deserialize, Serialize};

/// Lifecycle of one export-tier page.
///
/// `Pending → Processing → Completed | Error`. A retry moves a terminal page
/// back to `Processing` explicitly; nothing else re-enters it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

impl PageStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, PageStatus::Completed | PageStatus::Error)
    }
}

/// The rendered raster (or the failure record) for one page at one quality tier.
///
/// The encoded bytes are owned by the artifact; handing them to the archive
/// writer borrows them, and dropping the artifact frees them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageArtifact {
    /// 1-indexed page number. Never renumbered.
    pub page_num: usize,
    pub status: PageStatus,
    /// Encoded image bytes; present iff `status == Completed`.
    #[serde(skip)]
    pub data: Option<Vec<u8>>,
    pub width: u32,
    pub height: u32,
    /// Present iff `status == Error`.
    pub error: Option<PageError>,
}

impl PageArtifact {
    pub fn completed(page_num: usize, data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            page_num,
            status: PageStatus::Completed,
            data: Some(data),
            width,
            height,
            error: None,
        }
    }

    pub fn failed(page_num: usize, error: PageError) -> Self {
        Self {
            page_num,
            status: PageStatus::Error,
            data: None,
            width: 0,
            height: 0,
            error: Some(error),
        }
    }

    /// Drop any previous result and mark the page as in flight.
    pub fn mark_processing(&mut self) {
        self.status = PageStatus::Processing;
        self.data = None;
        self.width = 0;
        self.height = 0;
        self.error = None;
    }

    pub fn is_completed(&self) -> bool {
        self.status == PageStatus::Completed
    }

    /// Byte length of the encoded image, 0 when there is none.
    pub fn byte_len(&self) -> usize {
        self.data.as_ref().map_or(0, Vec::len)
    }
}

/// The assembled archive handed back by the export pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivePayload {
    /// Suggested file name, e.g. `report_exported.zip`.
    pub file_name: String,
    /// Folder name inside the archive, e.g. `report_exported`.
    pub container: String,
    /// Entry names in archive order.
    pub entries: Vec<String>,
    pub bytes: Vec<u8>,
}

/// Basic facts about a loaded document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInfo {
    /// File name without directory and without the `.pdf` extension.
    pub name: String,
    pub size_bytes: u64,
    pub page_count: usize,
    pub title: Option<String>,
    pub author: Option<String>,
    pub pdf_version: String,
}

/// Per-page line of a conversion summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSummary {
    pub page_num: usize,
    pub status: PageStatus,
    pub width: u32,
    pub height: u32,
    pub bytes: usize,
    pub error: Option<String>,
}

impl From<&PageArtifact> for PageSummary {
    fn from(a: &PageArtifact) -> Self {
        Self {
            page_num: a.page_num,
            status: a.status,
            width: a.width,
            height: a.height,
            bytes: a.byte_len(),
            error: a.error.as_ref().map(|e| e.to_string()),
        }
    }
}

/// Aggregate numbers for a finished conversion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionStats {
    pub total_pages: usize,
    pub target_pages: usize,
    pub completed_pages: usize,
    pub failed_pages: usize,
    /// Completed and selected pages that ended up in the archive.
    pub archived_pages: usize,
    pub retried_pages: usize,
    pub archive_bytes: usize,
    pub total_duration_ms: u64,
    pub render_duration_ms: u64,
    pub cancelled: bool,
    /// Why the run stopped early when the document became unreadable.
    /// Pages rendered before that point are still archived.
    pub aborted: Option<String>,
}

/// Everything [`crate::convert()`] returns.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionOutput {
    pub document: DocumentInfo,
    pub settings: ConversionSettings,
    pub archive_name: String,
    pub entries: Vec<String>,
    #[serde(skip)]
    pub archive: Vec<u8>,
    pub pages: Vec<PageSummary>,
    pub stats: ConversionStats,
}
