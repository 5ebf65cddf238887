//! Result types produced by a pipeline run.
//!
//! A run yields one or more [`PdfArtifact`]s: raw PDF bytes tagged with a
//! suggested file name and MIME type. What happens to them next (download,
//! upload, write to disk) is the caller's business; [`write_artifacts`] is
//! provided for the common "save into a directory" case.

use crate::config::PipelineMode;
use crate::error::{PageError, PdfPressError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// MIME type of every artifact the pipeline produces.
pub const PDF_MIME_TYPE: &str = "application/pdf";

/// One produced PDF document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdfArtifact {
    /// Suggested file name, e.g. `report-compressed.pdf`.
    pub file_name: String,
    /// Always [`PDF_MIME_TYPE`].
    pub mime_type: String,
    /// Serialised PDF. Omitted from JSON summaries.
    #[serde(skip)]
    pub bytes: Vec<u8>,
    /// Pages in this document.
    pub page_count: usize,
    /// 1-indexed source page this document was split from (split only).
    pub source_page: Option<usize>,
}

impl PdfArtifact {
    pub(crate) fn new(
        file_name: String,
        bytes: Vec<u8>,
        page_count: usize,
        source_page: Option<usize>,
    ) -> Self {
        Self {
            file_name,
            mime_type: PDF_MIME_TYPE.to_string(),
            bytes,
            page_count,
            source_page,
        }
    }

    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutput {
    /// Produced documents: one for compress and merge, one per page for split.
    pub artifacts: Vec<PdfArtifact>,
    /// Per-page failures. Only split reports these; the other modes abort.
    pub failures: Vec<PageError>,
    pub stats: RunStats,
}

impl RunOutput {
    /// True when every page made it into an artifact.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Summary numbers for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStats {
    pub mode: PipelineMode,
    /// Input documents read.
    pub documents: usize,
    /// Pages the run set out to process.
    pub total_pages: usize,
    pub processed_pages: usize,
    pub failed_pages: usize,
    /// Sum of input buffer sizes.
    pub input_bytes: u64,
    /// Sum of artifact sizes.
    pub output_bytes: u64,
    pub duration_ms: u64,
}

/// Facts about a PDF, read without processing any page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub name: String,
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub creation_date: Option<String>,
    pub modification_date: Option<String>,
    pub page_count: usize,
    pub pdf_version: String,
    pub is_encrypted: bool,
    pub byte_len: usize,
}

/// File stem of a document name, without directories or a `.pdf` suffix.
pub(crate) fn file_stem(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let stem = match base.rfind('.') {
        Some(dot) if dot > 0 && base[dot + 1..].eq_ignore_ascii_case("pdf") => &base[..dot],
        _ => base,
    };
    if stem.is_empty() {
        "document".to_string()
    } else {
        stem.to_string()
    }
}

pub(crate) fn compressed_name(source: &str) -> String {
    format!("{}-compressed.pdf", file_stem(source))
}

pub(crate) fn split_page_name(source: &str, page_num: usize) -> String {
    format!("{}-page-{}.pdf", file_stem(source), page_num)
}

pub(crate) const MERGED_NAME: &str = "merged.pdf";

/// Write every artifact into `dir`, returning the written paths.
///
/// Each file is written to a temporary sibling and renamed into place, so
/// a reader never observes a half-written PDF.
pub async fn write_artifacts(
    artifacts: &[PdfArtifact],
    dir: impl AsRef<Path>,
) -> Result<Vec<PathBuf>, PdfPressError> {
    let dir = dir.as_ref();
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| PdfPressError::OutputWriteFailed {
            path: dir.to_path_buf(),
            source: e,
        })?;

    let mut written = Vec::with_capacity(artifacts.len());
    for artifact in artifacts {
        let path = dir.join(&artifact.file_name);
        write_atomic(&path, &artifact.bytes).await?;
        debug!("Wrote {} ({} bytes)", path.display(), artifact.byte_len());
        written.push(path);
    }
    Ok(written)
}

/// Atomic write: temp file next to `path`, then rename.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PdfPressError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| PdfPressError::OutputWriteFailed {
                path: path.to_path_buf(),
                source: e,
            })?;
    }

    let tmp_path = path.with_extension("pdf.tmp");
    tokio::fs::write(&tmp_path, bytes)
        .await
        .map_err(|e| PdfPressError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| PdfPressError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stems() {
        assert_eq!(file_stem("report.pdf"), "report");
        assert_eq!(file_stem("/tmp/in/Scan.PDF"), "Scan");
        assert_eq!(file_stem("C:\\docs\\a.b.pdf"), "a.b");
        assert_eq!(file_stem("notes"), "notes");
        assert_eq!(file_stem(".pdf"), ".pdf");
        assert_eq!(file_stem(""), "document");
    }

    #[test]
    fn artifact_names() {
        assert_eq!(compressed_name("exam/form.pdf"), "form-compressed.pdf");
        assert_eq!(split_page_name("form.pdf", 3), "form-page-3.pdf");
    }

    #[test]
    fn artifact_json_omits_bytes() {
        let a = PdfArtifact::new("x.pdf".into(), vec![1, 2, 3], 1, Some(2));
        assert_eq!(a.mime_type, "application/pdf");
        assert_eq!(a.byte_len(), 3);
        let json = serde_json::to_string(&a).unwrap();
        assert!(!json.contains("bytes"));
        assert!(json.contains("\"source_page\":2"));
    }
}
