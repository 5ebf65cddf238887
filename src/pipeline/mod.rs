//! Pipeline stages for compressing, splitting and merging PDFs.
//!
//! Each submodule implements exactly one transformation step.
//! Keeping stages separate makes each independently testable and lets us
//! swap implementations (e.g. switch rendering backend) without touching
//! other stages.
//!
//! ## Data Flow
//!
//! ```text
//!                     ┌─▶ render ──▶ encode ──▶ rebuild (image pages)   compress
//! input ──▶ decode ───┤   (pdfium)   (JPEG/zlib)
//! (path/URL) (lopdf)  └──────────────────────▶ rebuild (copied pages)  split, merge
//! ```
//!
//! 1. [`input`]   — read the user-supplied path or URL into memory
//! 2. [`decode`]  — parse and (best-effort) decrypt with lopdf; page lookup
//! 3. [`render`]  — rasterise one page under a width cap; runs inside
//!    `spawn_blocking` because pdfium is not async-safe
//! 4. [`encode`]  — compress the surface into a PDF-embeddable image stream
//! 5. [`rebuild`] — assemble and serialise the output document

pub mod decode;
pub mod encode;
pub mod input;
pub mod rebuild;
pub mod render;
