//! Archive writer: a container name plus named blobs in, one archive out.
//!
//! The export pipeline only knows the [`ArchiveWriter`] trait. It runs the
//! writer on the blocking pool and surfaces any failure verbatim as
//! [`crate::Pdf2ImgError::ArchiveFailed`]; no retries happen here.

use std::io::{Cursor, Write};
use thiserror::Error;
use tracing::debug;
use zip::write::FileOptions;

/// Failure inside an [`ArchiveWriter`].
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ArchiveError(pub String);

impl From<zip::result::ZipError> for ArchiveError {
    fn from(err: zip::result::ZipError) -> Self {
        ArchiveError(err.to_string())
    }
}

impl From<std::io::Error> for ArchiveError {
    fn from(err: std::io::Error) -> Self {
        ArchiveError(err.to_string())
    }
}

/// One file handed to the archive writer. Bytes are borrowed from the
/// page artifacts, not copied.
#[derive(Debug, Clone, Copy)]
pub struct ArchiveEntry<'a> {
    /// Path inside the archive, e.g. `report_exported/page_001.jpg`.
    pub name: &'a str,
    pub bytes: &'a [u8],
}

/// Serialises a set of named blobs into one archive payload.
pub trait ArchiveWriter: Send + Sync {
    /// File extension of the produced archive, without the dot.
    fn extension(&self) -> &'static str {
        "zip"
    }

    fn write_archive(
        &self,
        container: &str,
        entries: &[ArchiveEntry<'_>],
    ) -> Result<Vec<u8>, ArchiveError>;
}

/// Zip archive with one top-level folder named after the container.
///
/// Entries are stored uncompressed by default: JPEG, PNG and WebP are
/// already compressed and deflating them only costs time.
#[derive(Debug, Clone, Copy)]
pub struct ZipArchiveWriter {
    method: zip::CompressionMethod,
}

impl Default for ZipArchiveWriter {
    fn default() -> Self {
        Self {
            method: zip::CompressionMethod::Stored,
        }
    }
}

impl ZipArchiveWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deflate entries instead of storing them.
    pub fn deflated() -> Self {
        Self {
            method: zip::CompressionMethod::Deflated,
        }
    }
}

impl ArchiveWriter for ZipArchiveWriter {
    fn write_archive(
        &self,
        container: &str,
        entries: &[ArchiveEntry<'_>],
    ) -> Result<Vec<u8>, ArchiveError> {
        let options = FileOptions::default().compression_method(self.method);
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));

        if !container.is_empty() {
            zip.add_directory(format!("{container}/"), options)?;
        }
        for entry in entries {
            zip.start_file(entry.name, options)?;
            zip.write_all(entry.bytes)?;
        }

        let bytes = zip.finish()?.into_inner();
        debug!(
            "Wrote zip '{}' with {} entries ({} bytes)",
            container,
            entries.len(),
            bytes.len()
        );
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn zip_contains_folder_and_entries_in_order() {
        let entries = [
            ArchiveEntry {
                name: "doc_exported/page_001.jpg",
                bytes: b"one",
            },
            ArchiveEntry {
                name: "doc_exported/page_003.jpg",
                bytes: b"three",
            },
        ];
        let bytes = ZipArchiveWriter::new()
            .write_archive("doc_exported", &entries)
            .unwrap();

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let names: Vec<String> = archive.file_names().map(str::to_string).collect();
        assert!(names.contains(&"doc_exported/".to_string()));
        assert!(names.contains(&"doc_exported/page_001.jpg".to_string()));

        let mut content = String::new();
        archive
            .by_name("doc_exported/page_003.jpg")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "three");
    }

    #[test]
    fn deflated_archive_round_trips() {
        let payload = vec![b'a'; 4096];
        let entries = [ArchiveEntry {
            name: "x/page_001.png",
            bytes: &payload,
        }];
        let bytes = ZipArchiveWriter::deflated().write_archive("x", &entries).unwrap();
        assert!(bytes.len() < payload.len());
        assert_eq!(&bytes[..2], b"PK");
    }
}
