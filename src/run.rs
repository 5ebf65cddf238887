//! Pipeline orchestration: compress, split and merge.
//!
//! [`Pipeline`] drives one run synchronously and owns its progress state.
//! The async entry points ([`run`], [`compress`], [`split`], [`merge`]) move
//! that work onto tokio's blocking pool, because pdfium and lopdf are
//! CPU-bound and pdfium is not async-safe.
//!
//! ## Failure policy
//!
//! | Mode     | A page fails                                   |
//! |----------|------------------------------------------------|
//! | compress | abort; no artifact                             |
//! | split    | record a [`PageError`]; other pages still emit |
//! | merge    | abort; no artifact                             |
//!
//! Pages are processed strictly one at a time: page *i* is fully rendered,
//! encoded and embedded (or copied) before page *i + 1* starts. The cancel
//! flag is checked before every page and once more before finalising.

use crate::cancel::{CancelFlag, CancelOnDrop};
use crate::config::{PageSelection, PipelineConfig, PipelineMode};
use crate::engine::shared_pdfium;
use crate::error::{PageError, PdfPressError};
use crate::output::{
    compressed_name, split_page_name, DocumentMetadata, PdfArtifact, RunOutput, RunStats,
    MERGED_NAME,
};
use crate::pipeline::decode::{PageHandle, SourceDocument};
use crate::pipeline::encode::{encode_page, EncodedPageImage};
use crate::pipeline::input::{check_input_size, resolve_input, InputDocument};
use crate::pipeline::rebuild::OutputDocument;
use crate::pipeline::render::{PageRasterizer, PdfiumRasterizer};
use crate::progress::{Phase, PipelineProgress, ProgressTracker};
use std::time::Instant;
use tracing::{debug, info, warn};

/// One pipeline, driven synchronously.
///
/// Every run method resets progress. The cancel flag is a child of the
/// config's flag: cancelling the config's flag stops this pipeline, while
/// [`Pipeline::cancel_flag`] stops only this one.
pub struct Pipeline<'c> {
    config: &'c PipelineConfig,
    cancel: CancelFlag,
    tracker: ProgressTracker,
    started: Instant,
}

impl<'c> Pipeline<'c> {
    pub fn new(config: &'c PipelineConfig) -> Self {
        Self::with_cancel(config, config.cancel.child())
    }

    pub(crate) fn with_cancel(config: &'c PipelineConfig, cancel: CancelFlag) -> Self {
        Self {
            config,
            cancel,
            tracker: ProgressTracker::new(config.progress_callback.clone()),
            started: Instant::now(),
        }
    }

    /// Progress of the current (or last) run.
    pub fn progress(&self) -> PipelineProgress {
        self.tracker.snapshot()
    }

    /// Flag that cancels this pipeline only.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Run `mode` over `inputs`.
    ///
    /// Compress and split take exactly one input; merge takes one or more.
    pub fn run(
        &mut self,
        inputs: Vec<InputDocument>,
        mode: PipelineMode,
    ) -> Result<RunOutput, PdfPressError> {
        match mode {
            PipelineMode::Compress => {
                let input = self.single_input(inputs, mode)?;
                self.compress(input)
            }
            PipelineMode::Split => {
                let input = self.single_input(inputs, mode)?;
                self.split(input)
            }
            PipelineMode::Merge => self.merge(inputs),
        }
    }

    /// Rasterise every page with pdfium and rebuild an image-only PDF.
    pub fn compress(&mut self, input: InputDocument) -> Result<RunOutput, PdfPressError> {
        self.begin();
        let result = self.compress_pdfium(input);
        self.settle(result)
    }

    /// Like [`Pipeline::compress`], with a caller-supplied rasteriser.
    ///
    /// `rasterizer` must cover the same pages as `input`.
    pub fn compress_with<R: PageRasterizer + ?Sized>(
        &mut self,
        input: InputDocument,
        rasterizer: &mut R,
    ) -> Result<RunOutput, PdfPressError> {
        self.begin();
        let result = self
            .read(input)
            .and_then(|source| self.compress_source(&source, rasterizer));
        self.settle(result)
    }

    /// One single-page PDF per selected page.
    pub fn split(&mut self, input: InputDocument) -> Result<RunOutput, PdfPressError> {
        self.begin();
        let result = self
            .read(input)
            .and_then(|source| self.split_source(&source));
        self.settle(result)
    }

    /// Concatenate `inputs` into one PDF, in caller order or `config.order`.
    pub fn merge(&mut self, inputs: Vec<InputDocument>) -> Result<RunOutput, PdfPressError> {
        self.begin();
        let result = self.merge_inputs(inputs);
        self.settle(result)
    }

    // ── Run lifecycle ────────────────────────────────────────────────────

    fn begin(&mut self) {
        self.tracker = ProgressTracker::new(self.config.progress_callback.clone());
        self.started = Instant::now();
    }

    /// Record how the run ended. A terminal phase is never left again.
    fn settle(
        &mut self,
        result: Result<RunOutput, PdfPressError>,
    ) -> Result<RunOutput, PdfPressError> {
        match &result {
            Ok(_) => {}
            Err(e) if e.is_cancelled() => {
                info!("{}", e);
                self.tracker.transition(Phase::Cancelled);
            }
            Err(e) => {
                warn!("Run failed: {}", e);
                self.tracker.transition(Phase::Errored);
            }
        }
        result
    }

    fn checkpoint(&self, completed: usize, total: usize) -> Result<(), PdfPressError> {
        if self.cancel.is_cancelled() {
            return Err(PdfPressError::Cancelled { completed, total });
        }
        Ok(())
    }

    fn single_input(
        &self,
        inputs: Vec<InputDocument>,
        mode: PipelineMode,
    ) -> Result<InputDocument, PdfPressError> {
        let count = inputs.len();
        let mut inputs = inputs.into_iter();
        match (inputs.next(), inputs.next()) {
            (Some(input), None) => Ok(input),
            _ => Err(PdfPressError::InvalidConfig(format!(
                "{mode} takes exactly one document, got {count}"
            ))),
        }
    }

    /// Validate, enter `Reading` and decode one input.
    fn read(&mut self, input: InputDocument) -> Result<SourceDocument, PdfPressError> {
        self.config.validate()?;
        self.tracker.transition(Phase::Reading);
        self.decode(input)
    }

    fn decode(&self, input: InputDocument) -> Result<SourceDocument, PdfPressError> {
        check_input_size(input.byte_len(), self.config.max_input_bytes)?;
        SourceDocument::open(input.name, input.bytes, self.config.password.as_deref())
    }

    fn complete(
        &mut self,
        mode: PipelineMode,
        sources: &[&SourceDocument],
        total_pages: usize,
        artifacts: Vec<PdfArtifact>,
        failures: Vec<PageError>,
    ) -> RunOutput {
        let processed = total_pages.saturating_sub(failures.len());
        self.tracker.finish(processed);

        let stats = RunStats {
            mode,
            documents: sources.len(),
            total_pages,
            processed_pages: processed,
            failed_pages: failures.len(),
            input_bytes: sources.iter().map(|s| s.byte_len() as u64).sum(),
            output_bytes: artifacts.iter().map(|a| a.byte_len() as u64).sum(),
            duration_ms: self.started.elapsed().as_millis() as u64,
        };

        info!(
            "{} complete: {}/{} pages, {} → {} bytes, {}ms",
            mode,
            stats.processed_pages,
            stats.total_pages,
            stats.input_bytes,
            stats.output_bytes,
            stats.duration_ms
        );

        RunOutput {
            artifacts,
            failures,
            stats,
        }
    }

    // ── Compress ─────────────────────────────────────────────────────────

    fn compress_pdfium(&mut self, input: InputDocument) -> Result<RunOutput, PdfPressError> {
        let source = self.read(input)?;
        let pdfium = shared_pdfium()?;
        let mut rasterizer = PdfiumRasterizer::open(
            pdfium,
            source.name(),
            source.render_bytes(),
            self.config.password.as_deref(),
        )?;
        self.compress_source(&source, &mut rasterizer)
    }

    fn compress_source<R: PageRasterizer + ?Sized>(
        &mut self,
        source: &SourceDocument,
        rasterizer: &mut R,
    ) -> Result<RunOutput, PdfPressError> {
        let total = source.page_count();
        if rasterizer.page_count() != total {
            return Err(PdfPressError::Internal(format!(
                "rasteriser sees {} pages, decoder sees {}",
                rasterizer.page_count(),
                total
            )));
        }
        self.tracker.set_total(total);
        info!(
            "Compressing '{}': {} pages, max width {} px, quality {}",
            source.name(),
            total,
            self.config.target_max_width_px,
            self.config.jpeg_quality()
        );

        let mut out = OutputDocument::create();
        for index in 0..total {
            self.checkpoint(index, total)?;
            self.tracker.page(Phase::Rendering, index);
            let page_num = index + 1;
            if let Some((width, height)) = source.page(index)?.size_points() {
                debug!("Page {}: {:.0}x{:.0} pt", page_num, width, height);
            }

            let image = match self.render_and_encode(rasterizer, index) {
                Ok(image) => image,
                Err(e) => {
                    warn!("Page {} failed: {}", page_num, e);
                    self.tracker.page_error(page_num, &e.to_string());
                    return Err(e.into_fatal(source.name()));
                }
            };

            let size = image.data.len();
            if let Err(e) = out.add_image_page(image) {
                let e = PageError::EncodeFailed {
                    page: page_num,
                    detail: e.to_string(),
                };
                self.tracker.page_error(page_num, &e.to_string());
                return Err(e.into_fatal(source.name()));
            }
            self.tracker.page_complete(page_num, size);
        }

        self.checkpoint(total, total)?;
        self.tracker.transition(Phase::Finalizing);
        let bytes = out.serialize()?;
        let artifact = PdfArtifact::new(compressed_name(source.name()), bytes, total, None);

        Ok(self.complete(PipelineMode::Compress, &[source], total, vec![artifact], Vec::new()))
    }

    /// Render, then encode. The surface is dropped as soon as it is encoded.
    fn render_and_encode<R: PageRasterizer + ?Sized>(
        &self,
        rasterizer: &mut R,
        index: usize,
    ) -> Result<EncodedPageImage, PageError> {
        let surface = rasterizer.render(index, self.config.target_max_width_px)?;
        debug!(
            "Page {}: {}x{} px at scale {:.3}",
            index + 1,
            surface.width(),
            surface.height(),
            surface.scale
        );
        encode_page(surface, self.config.image_format, self.config.jpeg_quality()).map_err(|e| {
            PageError::EncodeFailed {
                page: index + 1,
                detail: e.to_string(),
            }
        })
    }

    // ── Split ────────────────────────────────────────────────────────────

    fn split_source(&mut self, source: &SourceDocument) -> Result<RunOutput, PdfPressError> {
        let page_count = source.page_count();
        let indices = self.config.pages.to_indices(page_count);
        if indices.is_empty() {
            return Err(PdfPressError::PageOutOfRange {
                index: first_requested_page(&self.config.pages).saturating_sub(1),
                total: page_count,
            });
        }

        let total = indices.len();
        self.tracker.set_total(total);
        info!("Splitting '{}': {} of {} pages", source.name(), total, page_count);

        let mut artifacts = Vec::with_capacity(total);
        let mut failures = Vec::new();
        for (position, &index) in indices.iter().enumerate() {
            self.checkpoint(position, total)?;
            self.tracker.page(Phase::Copying, position);

            let page = source.page(index)?;
            match single_page_document(page) {
                Ok(bytes) => {
                    self.tracker.page_complete(page.number(), bytes.len());
                    artifacts.push(PdfArtifact::new(
                        split_page_name(source.name(), page.number()),
                        bytes,
                        1,
                        Some(page.number()),
                    ));
                }
                Err(e) => {
                    warn!("Skipping page {}: {}", page.number(), e);
                    self.tracker.page_error(page.number(), &e.to_string());
                    failures.push(e);
                }
            }
        }

        if artifacts.is_empty() {
            return Err(PdfPressError::AllPagesFailed {
                total,
                first_error: failures
                    .first()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "unknown error".to_string()),
            });
        }

        self.checkpoint(total, total)?;
        self.tracker.transition(Phase::Finalizing);
        Ok(self.complete(PipelineMode::Split, &[source], total, artifacts, failures))
    }

    // ── Merge ────────────────────────────────────────────────────────────

    fn merge_inputs(&mut self, inputs: Vec<InputDocument>) -> Result<RunOutput, PdfPressError> {
        self.config.validate()?;
        if inputs.is_empty() {
            return Err(PdfPressError::InvalidConfig(
                "merge needs at least one document".into(),
            ));
        }
        if inputs.len() > self.config.max_documents {
            return Err(PdfPressError::ResourceLimit {
                what: "documents per merge",
                actual: inputs.len() as u64,
                limit: self.config.max_documents as u64,
            });
        }
        let inputs = apply_order(inputs, self.config.order.as_deref())?;

        self.tracker.transition(Phase::Reading);
        let mut sources = Vec::with_capacity(inputs.len());
        for input in inputs {
            self.checkpoint(0, 0)?;
            sources.push(self.decode(input)?);
        }

        let total: usize = sources.iter().map(SourceDocument::page_count).sum();
        self.tracker.set_total(total);
        info!("Merging {} documents, {} pages", sources.len(), total);

        let mut out = OutputDocument::create();
        let mut position = 0;
        for source in &sources {
            for page in source.pages() {
                self.checkpoint(position, total)?;
                self.tracker.page(Phase::Copying, position);
                if let Err(e) = out.add_copied_page(page) {
                    warn!("Page {} of '{}' failed: {}", page.number(), source.name(), e);
                    self.tracker.page_error(position + 1, &e.to_string());
                    return Err(e.into_fatal(source.name()));
                }
                self.tracker.page_complete(position + 1, 0);
                position += 1;
            }
        }

        self.checkpoint(total, total)?;
        self.tracker.transition(Phase::Finalizing);
        let bytes = out.serialize()?;
        let artifact = PdfArtifact::new(MERGED_NAME.to_string(), bytes, total, None);

        let refs: Vec<&SourceDocument> = sources.iter().collect();
        Ok(self.complete(PipelineMode::Merge, &refs, total, vec![artifact], Vec::new()))
    }
}

/// Copy one page into a document of its own.
fn single_page_document(page: PageHandle<'_>) -> Result<Vec<u8>, PageError> {
    let mut out = OutputDocument::create();
    out.add_copied_page(page)?;
    out.serialize().map_err(|e| PageError::SerializeFailed {
        page: page.number(),
        detail: e.to_string(),
    })
}

fn first_requested_page(selection: &PageSelection) -> usize {
    match selection {
        PageSelection::All => 1,
        PageSelection::Single(p) => *p,
        PageSelection::Range(start, _) => *start,
        PageSelection::Set(pages) => pages.iter().copied().min().unwrap_or(1),
    }
}

/// Reorder `inputs` to match `order`, which must name each input's `id`
/// exactly once.
fn apply_order(
    mut inputs: Vec<InputDocument>,
    order: Option<&[String]>,
) -> Result<Vec<InputDocument>, PdfPressError> {
    let Some(order) = order else {
        return Ok(inputs);
    };
    if order.len() != inputs.len() {
        return Err(PdfPressError::InvalidConfig(format!(
            "merge order lists {} documents but {} were supplied",
            order.len(),
            inputs.len()
        )));
    }

    let mut ordered = Vec::with_capacity(order.len());
    for id in order {
        let pos = inputs.iter().position(|d| &d.id == id).ok_or_else(|| {
            PdfPressError::InvalidConfig(format!("merge order names unknown document '{id}'"))
        })?;
        ordered.push(inputs.swap_remove(pos));
    }
    Ok(ordered)
}

// ── Async API ────────────────────────────────────────────────────────────

/// Run `mode` over in-memory `inputs` on tokio's blocking pool.
///
/// Dropping the returned future cancels the run at the next page boundary.
pub async fn run(
    inputs: Vec<InputDocument>,
    mode: PipelineMode,
    config: &PipelineConfig,
) -> Result<RunOutput, PdfPressError> {
    let config = config.clone();
    let cancel = config.cancel.child();
    let guard = CancelOnDrop::new(cancel.clone());

    let result = tokio::task::spawn_blocking(move || {
        Pipeline::with_cancel(&config, cancel).run(inputs, mode)
    })
    .await
    .map_err(|e| PdfPressError::Internal(format!("Pipeline task panicked: {}", e)))?;

    guard.disarm();
    result
}

/// Blocking counterpart of [`run`] for callers without a runtime.
pub fn run_sync(
    inputs: Vec<InputDocument>,
    mode: PipelineMode,
    config: &PipelineConfig,
) -> Result<RunOutput, PdfPressError> {
    Pipeline::new(config).run(inputs, mode)
}

/// Compress a PDF file or URL.
///
/// # Example
/// ```rust,no_run
/// use edgequake_pdfpress::{compress, write_artifacts, PipelineConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = PipelineConfig::builder().quality(0.5).build()?;
/// let output = compress("scan.pdf", &config).await?;
/// write_artifacts(&output.artifacts, "out").await?;
/// # Ok(())
/// # }
/// ```
pub async fn compress(
    input: impl AsRef<str>,
    config: &PipelineConfig,
) -> Result<RunOutput, PdfPressError> {
    let doc = load(input.as_ref(), config).await?;
    run(vec![doc], PipelineMode::Compress, config).await
}

/// Split a PDF file or URL into single-page PDFs.
pub async fn split(
    input: impl AsRef<str>,
    config: &PipelineConfig,
) -> Result<RunOutput, PdfPressError> {
    let doc = load(input.as_ref(), config).await?;
    run(vec![doc], PipelineMode::Split, config).await
}

/// Merge PDF files or URLs into one document.
///
/// Inputs are loaded concurrently; decoding and copying stay sequential.
pub async fn merge<I, S>(inputs: I, config: &PipelineConfig) -> Result<RunOutput, PdfPressError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let names: Vec<String> = inputs.into_iter().map(|s| s.as_ref().to_string()).collect();
    if names.len() > config.max_documents {
        return Err(PdfPressError::ResourceLimit {
            what: "documents per merge",
            actual: names.len() as u64,
            limit: config.max_documents as u64,
        });
    }
    let docs = futures::future::try_join_all(names.iter().map(|name| load(name, config))).await?;
    run(docs, PipelineMode::Merge, config).await
}

/// Read a PDF's metadata without processing any page.
pub async fn inspect(
    input: impl AsRef<str>,
    config: &PipelineConfig,
) -> Result<DocumentMetadata, PdfPressError> {
    let doc = load(input.as_ref(), config).await?;
    let password = config.password.clone();
    tokio::task::spawn_blocking(move || {
        SourceDocument::open(doc.name, doc.bytes, password.as_deref()).map(|s| s.metadata())
    })
    .await
    .map_err(|e| PdfPressError::Internal(format!("Metadata task panicked: {}", e)))?
}

async fn load(input: &str, config: &PipelineConfig) -> Result<InputDocument, PdfPressError> {
    resolve_input(input, config.download_timeout_secs, config.max_input_bytes).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &str) -> InputDocument {
        InputDocument::from_bytes(name, b"%PDF-1.4".to_vec())
    }

    #[test]
    fn order_reorders_by_name() {
        let inputs = vec![named("a.pdf"), named("b.pdf"), named("c.pdf")];
        let order = ["c.pdf".to_string(), "a.pdf".to_string(), "b.pdf".to_string()];
        let ordered = apply_order(inputs, Some(&order)).unwrap();
        let names: Vec<_> = ordered.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["c.pdf", "a.pdf", "b.pdf"]);
    }

    #[test]
    fn order_rejects_unknown_and_missing_ids() {
        let order = ["a.pdf".to_string(), "z.pdf".to_string()];
        assert!(apply_order(vec![named("a.pdf"), named("b.pdf")], Some(&order)).is_err());

        let order = ["a.pdf".to_string()];
        assert!(apply_order(vec![named("a.pdf"), named("b.pdf")], Some(&order)).is_err());
    }

    #[test]
    fn order_matches_ids_not_file_names() {
        let inputs = vec![
            named("report.pdf").with_id("https://x.test/report.pdf"),
            named("report.pdf").with_id("https://y.test/report.pdf"),
        ];
        let order = [
            "https://y.test/report.pdf".to_string(),
            "https://x.test/report.pdf".to_string(),
        ];
        let ordered = apply_order(inputs, Some(&order)).unwrap();
        let ids: Vec<_> = ordered.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["https://y.test/report.pdf", "https://x.test/report.pdf"]);

        let by_name = ["report.pdf".to_string(), "report.pdf".to_string()];
        let inputs = vec![named("report.pdf").with_id("a/report.pdf"), named("b.pdf")];
        assert!(apply_order(inputs, Some(&by_name)).is_err());
    }

    #[test]
    fn no_order_keeps_caller_order() {
        let ordered = apply_order(vec![named("b.pdf"), named("a.pdf")], None).unwrap();
        assert_eq!(ordered[0].name, "b.pdf");
    }

    #[test]
    fn compress_and_split_take_one_input() {
        let config = PipelineConfig::default();
        let mut p = Pipeline::new(&config);
        let err = p
            .run(vec![named("a.pdf"), named("b.pdf")], PipelineMode::Split)
            .unwrap_err();
        assert!(matches!(err, PdfPressError::InvalidConfig(_)));
        let err = p.run(Vec::new(), PipelineMode::Compress).unwrap_err();
        assert!(matches!(err, PdfPressError::InvalidConfig(_)));
    }

    #[test]
    fn first_requested_page_per_selection() {
        assert_eq!(first_requested_page(&PageSelection::Single(7)), 7);
        assert_eq!(first_requested_page(&PageSelection::Range(4, 9)), 4);
        assert_eq!(first_requested_page(&PageSelection::Set(vec![9, 3])), 3);
    }
}
