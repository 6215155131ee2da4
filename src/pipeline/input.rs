//! Input resolution: normalise a user-supplied path or URL to a local PDF.
//!
//! Everything here is *input rejection*: it runs before any selection,
//! thumbnail or export state is created, so a bad file leaves the caller
//! exactly where it was. URLs are downloaded into a `TempDir` that lives as
//! long as the [`ResolvedInput`]; the `%PDF` magic bytes and the size limit
//! are checked before pdfium ever sees the file.

use crate::error::Pdf2ImgError;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, info};

const BYTES_PER_MB: u64 = 1024 * 1024;
const PDF_MAGIC: &[u8] = b"%PDF";

/// The resolved input: either a local path or a downloaded temp file.
pub enum ResolvedInput {
    /// Input was already a local file.
    Local(PathBuf),
    /// Input was a URL; PDF downloaded to a temp directory.
    /// The `TempDir` is kept alive to prevent cleanup until processing completes.
    Downloaded { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    /// Get the path to the PDF file regardless of how it was resolved.
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Downloaded { path, .. } => path,
        }
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to a local PDF file path.
///
/// URLs are downloaded to a temporary directory; local files are checked
/// for existence, permissions, size and PDF magic bytes.
pub async fn resolve_input(
    input: &str,
    timeout_secs: u64,
    max_file_size_mb: u64,
) -> Result<ResolvedInput, Pdf2ImgError> {
    if input.trim().is_empty() {
        return Err(Pdf2ImgError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs, max_file_size_mb).await
    } else {
        resolve_local(input, max_file_size_mb)
    }
}

/// Open a local file and run the size and magic checks on it.
fn resolve_local(path_str: &str, max_file_size_mb: u64) -> Result<ResolvedInput, Pdf2ImgError> {
    use std::io::{ErrorKind, Read};

    let path = PathBuf::from(path_str);
    let mut file = std::fs::File::open(&path).map_err(|e| match e.kind() {
        ErrorKind::PermissionDenied => Pdf2ImgError::PermissionDenied { path: path.clone() },
        _ => Pdf2ImgError::FileNotFound { path: path.clone() },
    })?;
    if file.metadata().map(|m| m.is_dir()).unwrap_or(false) {
        return Err(Pdf2ImgError::InvalidInput {
            input: path_str.to_string(),
        });
    }

    let len = file.metadata().map(|m| m.len()).unwrap_or(0);
    check_size(&path, len, max_file_size_mb)?;

    let mut head = Vec::with_capacity(PDF_MAGIC.len());
    file.by_ref()
        .take(PDF_MAGIC.len() as u64)
        .read_to_end(&mut head)
        .map_err(|_| Pdf2ImgError::FileNotFound { path: path.clone() })?;
    check_magic(&path, &head)?;

    debug!("Resolved local PDF: {}", path.display());
    Ok(ResolvedInput::Local(path))
}

fn check_size(path: &Path, len: u64, max_file_size_mb: u64) -> Result<(), Pdf2ImgError> {
    let limit = max_file_size_mb.saturating_mul(BYTES_PER_MB);
    if len <= limit {
        return Ok(());
    }
    Err(Pdf2ImgError::FileTooLarge {
        path: path.to_path_buf(),
        size_mb: len as f64 / BYTES_PER_MB as f64,
        limit_mb: max_file_size_mb,
    })
}

/// Reject anything that does not start with `%PDF`; short files included.
fn check_magic(path: &Path, head: &[u8]) -> Result<(), Pdf2ImgError> {
    if head.starts_with(PDF_MAGIC) {
        return Ok(());
    }
    let mut magic = [0u8; 4];
    for (dst, src) in magic.iter_mut().zip(head) {
        *dst = *src;
    }
    Err(Pdf2ImgError::NotAPdf {
        path: path.to_path_buf(),
        magic,
    })
}

fn download_error(url: &str, timeout_secs: u64, err: reqwest::Error) -> Pdf2ImgError {
    if err.is_timeout() {
        Pdf2ImgError::DownloadTimeout {
            url: url.to_string(),
            secs: timeout_secs,
        }
    } else {
        Pdf2ImgError::DownloadFailed {
            url: url.to_string(),
            reason: err.to_string(),
        }
    }
}

/// Stream a URL into a temporary directory.
///
/// The size limit is enforced while the body arrives, so an oversized or
/// endless response is cut off instead of being buffered whole.
async fn download_url(
    url: &str,
    timeout_secs: u64,
    max_file_size_mb: u64,
) -> Result<ResolvedInput, Pdf2ImgError> {
    info!("Downloading PDF from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| download_error(url, timeout_secs, e))?;
    let response = client
        .get(url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|e| download_error(url, timeout_secs, e))?;

    let temp_dir = TempDir::new().map_err(|e| Pdf2ImgError::Internal(e.to_string()))?;
    let file_path = temp_dir.path().join(filename_from_url(url));

    if let Some(len) = response.content_length() {
        check_size(&file_path, len, max_file_size_mb)?;
    }

    let mut body = Vec::new();
    let mut chunks = response.bytes_stream();
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.map_err(|e| download_error(url, timeout_secs, e))?;
        body.extend_from_slice(&chunk);
        check_size(&file_path, body.len() as u64, max_file_size_mb)?;
    }
    check_magic(&file_path, &body)?;

    tokio::fs::write(&file_path, &body)
        .await
        .map_err(|e| Pdf2ImgError::OutputWriteFailed {
            path: file_path.clone(),
            source: e,
        })?;
    info!(
        "Downloaded {} bytes to {}",
        body.len(),
        file_path.display()
    );

    Ok(ResolvedInput::Downloaded {
        path: file_path,
        _temp_dir: temp_dir,
    })
}

/// Last path segment of the URL when it looks like a file name.
fn filename_from_url(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut s| s.next_back().map(str::to_string))
        })
        .filter(|last| last.contains('.'))
        .unwrap_or_else(|| "downloaded.pdf".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn filename_from_url_prefers_last_segment() {
        assert_eq!(filename_from_url("https://x.org/a/report.pdf"), "report.pdf");
        assert_eq!(filename_from_url("https://arxiv.org/pdf/1706"), "downloaded.pdf");
    }

    #[tokio::test]
    async fn rejects_missing_file() {
        let err = resolve_input("/definitely/not/here.pdf", 5, 50).await;
        assert!(matches!(err, Err(Pdf2ImgError::FileNotFound { .. })));
    }

    #[tokio::test]
    async fn rejects_non_pdf() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"PK\x03\x04 not a pdf").unwrap();
        let err = resolve_input(tmp.path().to_str().unwrap(), 5, 50).await;
        match err {
            Err(Pdf2ImgError::NotAPdf { magic, .. }) => assert_eq!(&magic, b"PK\x03\x04"),
            other => panic!("expected NotAPdf, got {:?}", other.map(|r| r.path().to_path_buf())),
        }
    }

    #[tokio::test]
    async fn rejects_oversized_file() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"%PDF-1.7\n").unwrap();
        tmp.write_all(&vec![b' '; 2 * 1024 * 1024]).unwrap();
        let err = resolve_input(tmp.path().to_str().unwrap(), 5, 1).await;
        assert!(matches!(err, Err(Pdf2ImgError::FileTooLarge { limit_mb: 1, .. })));
    }

    #[tokio::test]
    async fn accepts_pdf_magic() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"%PDF-1.4\n%%EOF\n").unwrap();
        let resolved = resolve_input(tmp.path().to_str().unwrap(), 5, 50)
            .await
            .expect("should resolve");
        assert_eq!(resolved.path(), tmp.path());
    }

    #[tokio::test]
    async fn rejects_truncated_file() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"%P").unwrap();
        let err = resolve_input(tmp.path().to_str().unwrap(), 5, 50).await;
        assert!(matches!(err, Err(Pdf2ImgError::NotAPdf { .. })));
    }

    #[tokio::test]
    async fn rejects_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_input(dir.path().to_str().unwrap(), 5, 50).await;
        assert!(matches!(err, Err(Pdf2ImgError::InvalidInput { .. })));
    }

    #[tokio::test]
    async fn rejects_blank_input() {
        let err = resolve_input("  ", 5, 50).await;
        assert!(matches!(err, Err(Pdf2ImgError::InvalidInput { .. })));
    }
}
