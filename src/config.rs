//! Configuration types for the compress / split / merge pipeline.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built via
//! its [`PipelineConfigBuilder`]. The config carries parameters only: preset
//! lookup (exam photo sizes and the like) belongs to the caller, which turns
//! a preset into a `target_max_width_px` / `quality` pair before calling in.

use crate::cancel::CancelFlag;
use crate::error::PdfPressError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default JPEG quality fraction for raster compression.
pub const DEFAULT_QUALITY: f32 = 0.6;

/// Default maximum rendered page width in pixels.
pub const DEFAULT_TARGET_MAX_WIDTH_PX: u32 = 1400;

/// Default cap on a single input buffer (200 MiB).
pub const DEFAULT_MAX_INPUT_BYTES: u64 = 200 * 1024 * 1024;

/// Default cap on the number of documents in one merge.
pub const DEFAULT_MAX_DOCUMENTS: usize = 50;

/// Configuration for one pipeline run.
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_pdfpress::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .quality(0.6)
///     .target_max_width_px(1400)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Encoder quality in `(0, 1]`. Default: 0.6.
    ///
    /// Passed straight to the JPEG encoder (`round(q * 100)`); there is no
    /// search for a target file size. Ignored by [`PageImageFormat::Lossless`].
    pub quality: f32,

    /// Maximum rendered page width in pixels. Default: 1400.
    ///
    /// Pages wider than this are downscaled proportionally; narrower pages
    /// are rendered at scale 1.0 and never upscaled.
    pub target_max_width_px: u32,

    /// How rendered pages are encoded before embedding. Default: JPEG.
    pub image_format: PageImageFormat,

    /// PDF user password for encrypted documents.
    ///
    /// Without one, the empty password is tried before giving up.
    pub password: Option<String>,

    /// Pages to extract in split mode. Default: all pages.
    ///
    /// Compress and merge always process every page.
    pub pages: PageSelection,

    /// Explicit merge order as a list of document identifiers.
    ///
    /// When `None`, documents are merged in the order they were supplied.
    pub order: Option<Vec<String>>,

    /// Largest accepted input buffer in bytes. Default: 200 MiB.
    pub max_input_bytes: u64,

    /// Largest accepted number of documents per merge. Default: 50.
    pub max_documents: usize,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Optional observer for per-page progress events.
    pub progress_callback: Option<ProgressCallback>,

    /// Cooperative cancellation flag, checked between pages.
    pub cancel: CancelFlag,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            quality: DEFAULT_QUALITY,
            target_max_width_px: DEFAULT_TARGET_MAX_WIDTH_PX,
            image_format: PageImageFormat::default(),
            password: None,
            pages: PageSelection::default(),
            order: None,
            max_input_bytes: DEFAULT_MAX_INPUT_BYTES,
            max_documents: DEFAULT_MAX_DOCUMENTS,
            download_timeout_secs: 120,
            progress_callback: None,
            cancel: CancelFlag::new(),
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("quality", &self.quality)
            .field("target_max_width_px", &self.target_max_width_px)
            .field("image_format", &self.image_format)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("pages", &self.pages)
            .field("order", &self.order)
            .field("max_input_bytes", &self.max_input_bytes)
            .field("max_documents", &self.max_documents)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn PipelineProgressCallback>"),
            )
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// JPEG quality on the encoder's 1–100 scale.
    pub fn jpeg_quality(&self) -> u8 {
        (self.quality * 100.0).round().clamp(1.0, 100.0) as u8
    }

    /// Check every constraint the builder enforces.
    ///
    /// Called again at the start of each run since fields are public.
    pub fn validate(&self) -> Result<(), PdfPressError> {
        if !self.quality.is_finite() || self.quality <= 0.0 || self.quality > 1.0 {
            return Err(PdfPressError::InvalidConfig(format!(
                "quality must be in (0, 1], got {}",
                self.quality
            )));
        }
        if self.target_max_width_px == 0 {
            return Err(PdfPressError::InvalidConfig(
                "target_max_width_px must be ≥ 1".into(),
            ));
        }
        if self.max_documents == 0 {
            return Err(PdfPressError::InvalidConfig(
                "max_documents must be ≥ 1".into(),
            ));
        }
        if let Some(ref order) = self.order {
            let mut seen = std::collections::HashSet::new();
            for id in order {
                if !seen.insert(id.as_str()) {
                    return Err(PdfPressError::InvalidConfig(format!(
                        "document '{id}' appears twice in merge order"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn quality(mut self, q: f32) -> Self {
        self.config.quality = q;
        self
    }

    pub fn target_max_width_px(mut self, px: u32) -> Self {
        self.config.target_max_width_px = px;
        self
    }

    pub fn image_format(mut self, format: PageImageFormat) -> Self {
        self.config.image_format = format;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn order<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.order = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn max_input_bytes(mut self, bytes: u64) -> Self {
        self.config.max_input_bytes = bytes;
        self
    }

    pub fn max_documents(mut self, n: usize) -> Self {
        self.config.max_documents = n;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn cancel(mut self, flag: CancelFlag) -> Self {
        self.config.cancel = flag;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PdfPressError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Which transformation a run performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineMode {
    /// Rasterise every page and rebuild an image-only PDF.
    Compress,
    /// One single-page PDF per selected page.
    Split,
    /// Concatenate several PDFs into one.
    Merge,
}

impl fmt::Display for PipelineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PipelineMode::Compress => "compress",
            PipelineMode::Split => "split",
            PipelineMode::Merge => "merge",
        })
    }
}

/// Encoding used for rasterised pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageImageFormat {
    /// JPEG (`DCTDecode`), quality-controlled. (default)
    #[default]
    Jpeg,
    /// zlib-compressed RGB (`FlateDecode`); quality is ignored.
    Lossless,
}

/// Specifies which pages of the PDF to extract in split mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSelection {
    /// Every page (default).
    #[default]
    All,
    /// A single page (1-indexed).
    Single(usize),
    /// A contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Expand the selection into a sorted, deduplicated list of 0-indexed page numbers.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = match self {
            PageSelection::All => (0..total_pages).collect(),
            PageSelection::Single(p) => {
                if *p >= 1 && *p <= total_pages {
                    vec![p - 1]
                } else {
                    vec![]
                }
            }
            PageSelection::Range(start, end) => {
                let s = (*start).max(1) - 1;
                let e = (*end).min(total_pages);
                (s..e).collect()
            }
            PageSelection::Set(pages) => pages
                .iter()
                .filter(|&&p| p >= 1 && p <= total_pages)
                .map(|p| p - 1)
                .collect(),
        };
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}

impl std::str::FromStr for PageSelection {
    type Err = PdfPressError;

    /// Parse `all`, `5`, `3-15` or `1,3,5,7`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        let parse_page = |p: &str| -> Result<usize, PdfPressError> {
            let n: usize = p
                .trim()
                .parse()
                .map_err(|_| PdfPressError::InvalidConfig(format!("invalid page number '{}'", p.trim())))?;
            if n < 1 {
                return Err(PdfPressError::InvalidConfig(
                    "pages are 1-indexed, minimum is 1".into(),
                ));
            }
            Ok(n)
        };

        if s == "all" {
            return Ok(PageSelection::All);
        }
        if let Some((start, end)) = s.split_once('-') {
            let (start, end) = (parse_page(start)?, parse_page(end)?);
            if start > end {
                return Err(PdfPressError::InvalidConfig(format!(
                    "invalid page range '{start}-{end}': start must be <= end"
                )));
            }
            return Ok(PageSelection::Range(start, end));
        }
        if s.contains(',') {
            let pages = s.split(',').map(parse_page).collect::<Result<Vec<_>, _>>()?;
            return Ok(PageSelection::Set(pages));
        }
        Ok(PageSelection::Single(parse_page(s.as_str())?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let c = PipelineConfig::builder().build().expect("defaults valid");
        assert_eq!(c.target_max_width_px, 1400);
        assert_eq!(c.jpeg_quality(), 60);
        assert_eq!(c.image_format, PageImageFormat::Jpeg);
    }

    #[test]
    fn quality_bounds() {
        assert!(PipelineConfig::builder().quality(0.0).build().is_err());
        assert!(PipelineConfig::builder().quality(1.01).build().is_err());
        assert!(PipelineConfig::builder().quality(f32::NAN).build().is_err());
        let c = PipelineConfig::builder().quality(1.0).build().unwrap();
        assert_eq!(c.jpeg_quality(), 100);
        let c = PipelineConfig::builder().quality(0.001).build().unwrap();
        assert_eq!(c.jpeg_quality(), 1);
    }

    #[test]
    fn zero_width_rejected() {
        let err = PipelineConfig::builder()
            .target_max_width_px(0)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("target_max_width_px"));
    }

    #[test]
    fn duplicate_order_rejected() {
        assert!(PipelineConfig::builder()
            .order(["a.pdf", "b.pdf", "a.pdf"])
            .build()
            .is_err());
        let c = PipelineConfig::builder()
            .order(["b.pdf", "a.pdf"])
            .build()
            .unwrap();
        assert_eq!(c.order.as_deref(), Some(&["b.pdf".to_string(), "a.pdf".to_string()][..]));
    }

    #[test]
    fn page_selection_to_indices() {
        assert_eq!(PageSelection::All.to_indices(5), vec![0, 1, 2, 3, 4]);
        assert_eq!(PageSelection::Single(3).to_indices(5), vec![2]);
        assert_eq!(PageSelection::Single(6).to_indices(5), Vec::<usize>::new());
        assert_eq!(PageSelection::Range(2, 4).to_indices(5), vec![1, 2, 3]);
        assert_eq!(PageSelection::Range(3, 10).to_indices(4), vec![2, 3]);
        assert_eq!(
            PageSelection::Set(vec![3, 1, 3]).to_indices(5),
            vec![0, 2] // deduplicated and sorted
        );
    }

    #[test]
    fn page_selection_parse() {
        assert_eq!("all".parse::<PageSelection>().unwrap(), PageSelection::All);
        assert_eq!("5".parse::<PageSelection>().unwrap(), PageSelection::Single(5));
        assert_eq!(
            "3-15".parse::<PageSelection>().unwrap(),
            PageSelection::Range(3, 15)
        );
        assert_eq!(
            "1, 3,5".parse::<PageSelection>().unwrap(),
            PageSelection::Set(vec![1, 3, 5])
        );
        assert!("0".parse::<PageSelection>().is_err());
        assert!("9-2".parse::<PageSelection>().is_err());
        assert!("x".parse::<PageSelection>().is_err());
    }
}
