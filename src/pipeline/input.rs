//! Input resolution: turn a user-supplied path or URL into an in-memory PDF.
//!
//! ## Why bytes, not paths?
//!
//! Both lopdf and pdfium can work from a byte buffer, and keeping the input
//! in memory means nothing has to be cleaned up afterwards: no temp files,
//! no half-downloaded leftovers. The size limit is applied here, before any
//! decoding starts, together with a cheap `%PDF-` header check so callers
//! get a meaningful error instead of a parser failure.

use crate::error::PdfPressError;
use crate::pipeline::decode::check_pdf_magic;
use std::path::PathBuf;
use tracing::{debug, info};

/// One input document: identifier, display name and raw bytes.
///
/// `id` is the input exactly as the caller gave it (path or URL) and is
/// what an explicit merge order refers to. `name` is the file name used in
/// messages and as the stem for output file names.
#[derive(Clone)]
pub struct InputDocument {
    pub id: String,
    pub name: String,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for InputDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputDocument")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .finish()
    }
}

impl InputDocument {
    /// An in-memory document whose identifier is its name.
    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        let name = name.into();
        Self {
            id: name.clone(),
            name,
            bytes: bytes.into(),
        }
    }

    /// Replace the merge-order identifier.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn byte_len(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Reject buffers over `max_bytes`.
pub fn check_input_size(len: u64, max_bytes: u64) -> Result<(), PdfPressError> {
    if len > max_bytes {
        return Err(PdfPressError::ResourceLimit {
            what: "input size (bytes)",
            actual: len,
            limit: max_bytes,
        });
    }
    Ok(())
}

/// Resolve the input string to an in-memory PDF.
///
/// If the input is a URL, download it; otherwise read the local file.
/// Either way the result is size-checked and header-checked.
pub async fn resolve_input(
    input: &str,
    timeout_secs: u64,
    max_bytes: u64,
) -> Result<InputDocument, PdfPressError> {
    let doc = if is_url(input) {
        download_url(input, timeout_secs, max_bytes).await?
    } else {
        read_local(input, max_bytes).await?
    };
    check_pdf_magic(&doc.name, &doc.bytes)?;
    Ok(doc)
}

/// Read a local file, mapping I/O failures onto input errors.
async fn read_local(path_str: &str, max_bytes: u64) -> Result<InputDocument, PdfPressError> {
    let path = PathBuf::from(path_str);

    let metadata = tokio::fs::metadata(&path).await.map_err(|e| io_error(&path, e))?;
    if !metadata.is_file() {
        return Err(PdfPressError::FileNotFound { path });
    }
    // Check before reading so an oversized file is never pulled into memory.
    check_input_size(metadata.len(), max_bytes)?;

    let bytes = tokio::fs::read(&path).await.map_err(|e| io_error(&path, e))?;
    check_input_size(bytes.len() as u64, max_bytes)?;

    debug!("Read local PDF: {} ({} bytes)", path.display(), bytes.len());
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path_str.to_string());
    Ok(InputDocument::from_bytes(name, bytes).with_id(path_str))
}

fn io_error(path: &std::path::Path, e: std::io::Error) -> PdfPressError {
    match e.kind() {
        std::io::ErrorKind::PermissionDenied => PdfPressError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => PdfPressError::FileNotFound {
            path: path.to_path_buf(),
        },
    }
}

/// Download a URL into memory.
async fn download_url(
    url: &str,
    timeout_secs: u64,
    max_bytes: u64,
) -> Result<InputDocument, PdfPressError> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| PdfPressError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
    fetch(&client, url, timeout_secs, max_bytes).await
}

/// GET `url` with `client`, never holding more than `max_bytes` of body.
async fn fetch(
    client: &reqwest::Client,
    url: &str,
    timeout_secs: u64,
    max_bytes: u64,
) -> Result<InputDocument, PdfPressError> {
    info!("Downloading PDF from: {}", url);

    let map_send_error = |e: reqwest::Error| {
        if e.is_timeout() {
            PdfPressError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            PdfPressError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let mut response = client.get(url).send().await.map_err(map_send_error)?;

    if !response.status().is_success() {
        return Err(PdfPressError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let declared = response.content_length();
    if let Some(len) = declared {
        check_input_size(len, max_bytes)?;
    }

    // Chunked responses carry no length up front; count as we go.
    let mut bytes = Vec::with_capacity(declared.unwrap_or(0) as usize);
    while let Some(chunk) = response.chunk().await.map_err(map_send_error)? {
        check_input_size((bytes.len() + chunk.len()) as u64, max_bytes)?;
        bytes.extend_from_slice(&chunk);
    }

    info!("Downloaded {} bytes", bytes.len());

    Ok(InputDocument::from_bytes(extract_filename(url), bytes).with_id(url))
}

/// Extract a reasonable filename from the URL.
fn extract_filename(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded.pdf".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn test_extract_filename() {
        assert_eq!(extract_filename("https://example.com/a/b/report.pdf"), "report.pdf");
        assert_eq!(extract_filename("https://example.com/a/b/"), "downloaded.pdf");
        assert_eq!(extract_filename("https://example.com/download"), "downloaded.pdf");
    }

    #[test]
    fn test_size_limit() {
        assert!(check_input_size(10, 10).is_ok());
        match check_input_size(11, 10) {
            Err(PdfPressError::ResourceLimit { actual, limit, .. }) => {
                assert_eq!((actual, limit), (11, 10));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_file() {
        let err = resolve_input("/definitely/not/here.pdf", 5, 1024)
            .await
            .unwrap_err();
        assert!(matches!(err, PdfPressError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn test_local_file_checks() {
        let dir = tempfile::tempdir().unwrap();

        let not_pdf = dir.path().join("notes.pdf");
        std::fs::write(&not_pdf, b"hello world").unwrap();
        let err = resolve_input(not_pdf.to_str().unwrap(), 5, 1024)
            .await
            .unwrap_err();
        assert!(matches!(err, PdfPressError::NotAPdf { .. }));

        let big = dir.path().join("big.pdf");
        std::fs::write(&big, vec![b'%'; 2048]).unwrap();
        let err = resolve_input(big.to_str().unwrap(), 5, 1024)
            .await
            .unwrap_err();
        assert!(matches!(err, PdfPressError::ResourceLimit { .. }));

        let ok = dir.path().join("ok.pdf");
        std::fs::write(&ok, b"%PDF-1.7\n%%EOF\n").unwrap();
        let input = ok.to_str().unwrap();
        let doc = resolve_input(input, 5, 1024).await.unwrap();
        assert_eq!(doc.byte_len(), 15);
        assert_eq!(doc.name, "ok.pdf");
        assert_eq!(doc.id, input);
    }

    #[test]
    fn from_bytes_uses_name_as_id() {
        let doc = InputDocument::from_bytes("a.pdf", b"%PDF-1.7".to_vec());
        assert_eq!(doc.id, "a.pdf");
        let doc = doc.with_id("https://x/a.pdf");
        assert_eq!((doc.id.as_str(), doc.name.as_str()), ("https://x/a.pdf", "a.pdf"));
    }

    /// Serve one chunked response (no Content-Length) of `body`, then close.
    async fn serve_chunked(body: Vec<u8>) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            let _ = socket
                .write_all(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n")
                .await;
            for chunk in body.chunks(512) {
                let mut frame = format!("{:x}\r\n", chunk.len()).into_bytes();
                frame.extend_from_slice(chunk);
                frame.extend_from_slice(b"\r\n");
                if socket.write_all(&frame).await.is_err() {
                    return;
                }
            }
            let _ = socket.write_all(b"0\r\n\r\n").await;
        });
        format!("http://{addr}/files/report.pdf")
    }

    fn local_client() -> reqwest::Client {
        reqwest::Client::builder().no_proxy().build().unwrap()
    }

    #[tokio::test]
    async fn chunked_download_is_bounded() {
        let mut body = b"%PDF-1.7\n".to_vec();
        body.resize(4096, b' ');

        let url = serve_chunked(body).await;
        let err = fetch(&local_client(), &url, 5, 1024).await.unwrap_err();
        match err {
            PdfPressError::ResourceLimit { actual, limit, .. } => {
                assert_eq!(limit, 1024);
                assert!(actual > 1024 && actual <= 1024 + 512, "stopped at {actual}");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn chunked_download_within_limit() {
        let mut body = b"%PDF-1.7\n".to_vec();
        body.resize(1500, b' ');

        let url = serve_chunked(body).await;
        let doc = fetch(&local_client(), &url, 5, 4096).await.unwrap();
        assert_eq!(doc.byte_len(), 1500);
        assert_eq!(doc.name, "report.pdf");
        assert_eq!(doc.id, url);
    }
}
