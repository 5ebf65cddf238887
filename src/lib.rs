//! # edgequake-pdfpress
//!
//! Compress, split and merge PDF documents.
//!
//! ## Why this crate?
//!
//! Scanned forms and phone photos exported as PDF are routinely ten times
//! larger than upload portals accept. Structural optimisers barely help on
//! such files because every page is already one big image. This crate
//! instead rasterises each page at a capped width, re-encodes it as JPEG and
//! rebuilds a fresh image-only PDF. The same decoder and rebuilder also
//! power lossless split and merge, which copy pages structurally.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input    read local file or download from URL into memory
//!  ├─ 2. Decode   parse with lopdf (best-effort decryption)
//!  ├─ 3. Render   rasterise each page via pdfium (compress only, spawn_blocking)
//!  ├─ 4. Encode   JPEG (DCTDecode) or zlib (FlateDecode)
//!  ├─ 5. Rebuild  image pages (compress) or deep-copied pages (split/merge)
//!  └─ 6. Output   PdfArtifact(s) + per-run stats
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdfpress::{compress, write_artifacts, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::builder()
//!         .quality(0.6)
//!         .target_max_width_px(1400)
//!         .build()?;
//!     let output = compress("scan.pdf", &config).await?;
//!     write_artifacts(&output.artifacts, "out").await?;
//!     eprintln!("{} → {} bytes", output.stats.input_bytes, output.stats.output_bytes);
//!     Ok(())
//! }
//! ```
//!
//! In-memory inputs go through [`run`] with [`InputDocument::from_bytes`].
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdfpress` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! edgequake-pdfpress = { version = "0.1", default-features = false }
//! ```
//!
//! ## pdfium
//!
//! Only compress needs the pdfium shared library; split, merge and inspect
//! are pure Rust. See [`engine`] for how the library is located.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod cancel;
pub mod config;
pub mod engine;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod run;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use cancel::CancelFlag;
pub use config::{
    PageImageFormat, PageSelection, PipelineConfig, PipelineConfigBuilder, PipelineMode,
};
pub use error::{PageError, PdfPressError};
pub use output::{write_artifacts, DocumentMetadata, PdfArtifact, RunOutput, RunStats, PDF_MIME_TYPE};
pub use pipeline::input::InputDocument;
pub use pipeline::render::{PageRasterizer, RasterSurface};
pub use progress::{
    NoopProgressCallback, Phase, PipelineProgress, PipelineProgressCallback, ProgressCallback,
};
pub use run::{compress, inspect, merge, run, run_sync, split, Pipeline};
