//! Page rasterisation: render one page into an RGB pixel surface.
//!
//! ## Why a trait?
//!
//! The orchestrator only needs "give me page *i* as pixels, no wider than
//! *w*". [`PageRasterizer`] captures exactly that, so the compress loop can
//! be driven by pdfium in production and by a synthetic rasteriser in tests
//! that have no libpdfium available.
//!
//! ## Why cap width, not DPI?
//!
//! Inputs are typically phone scans and exported forms whose pages carry
//! wildly different point sizes. Capping the rendered width bounds memory
//! and output size regardless of physical page size, and a scale capped at
//! 1.0 (1 pt = 1 px) means small pages are never blown up.

use crate::error::{PageError, PdfPressError};
use image::RgbImage;
use pdfium_render::prelude::*;
use tracing::debug;

/// Rendered pixels for one page, plus the scale they were rendered at.
///
/// Owned by exactly one stage at a time: the encoder consumes it.
#[derive(Debug, Clone)]
pub struct RasterSurface {
    pub pixels: RgbImage,
    pub scale: f32,
}

impl RasterSurface {
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }
}

/// Pixel size and scale for a page rendered under a width cap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
    pub scale: f32,
}

/// pdfium addresses pages with a `u16`.
fn pdfium_page_index(index: usize) -> Result<u16, PageError> {
    u16::try_from(index).map_err(|_| PageError::RenderFailed {
        page: index + 1,
        detail: format!("page index {} exceeds pdfium's limit of {}", index, u16::MAX),
    })
}

/// Compute the surface for a `native_w × native_h` point page under `target_max_width_px`.
///
/// `scale = min(1, target / native_w)`; each dimension is rounded and kept ≥ 1.
pub fn fit_to_width(native_w: f32, native_h: f32, target_max_width_px: u32) -> SurfaceSize {
    let scale = if native_w > 0.0 {
        (target_max_width_px as f32 / native_w).min(1.0)
    } else {
        1.0
    };
    let px = |v: f32| ((v * scale).round() as u32).max(1);
    SurfaceSize {
        width: px(native_w),
        height: px(native_h),
        scale,
    }
}

/// Anything that can turn page `index` of an opened document into pixels.
///
/// Calls are strictly sequential: one page is fully rendered before the
/// next is requested.
pub trait PageRasterizer {
    fn page_count(&self) -> usize;

    /// Render the page at 0-based `index` no wider than `target_max_width_px`.
    fn render(&mut self, index: usize, target_max_width_px: u32)
        -> Result<RasterSurface, PageError>;
}

/// pdfium-backed rasteriser over an in-memory document.
pub struct PdfiumRasterizer<'a> {
    document: PdfDocument<'a>,
}

impl<'a> PdfiumRasterizer<'a> {
    /// Open `bytes` with a bound pdfium instance.
    ///
    /// `bytes` should be the decoder's render buffer, which is already
    /// decrypted, so `password` only matters for documents the structural
    /// decoder could not decrypt itself.
    pub fn open(
        pdfium: &'a Pdfium,
        name: &str,
        bytes: &'a [u8],
        password: Option<&str>,
    ) -> Result<Self, PdfPressError> {
        let document = pdfium
            .load_pdf_from_byte_slice(bytes, password)
            .map_err(|e| {
                let detail = format!("{:?}", e);
                if detail.contains("Password") || detail.contains("password") {
                    PdfPressError::PasswordRequired {
                        name: name.to_string(),
                    }
                } else {
                    PdfPressError::Decode {
                        name: name.to_string(),
                        detail,
                    }
                }
            })?;
        Ok(Self { document })
    }
}

impl PageRasterizer for PdfiumRasterizer<'_> {
    fn page_count(&self) -> usize {
        self.document.pages().len() as usize
    }

    fn render(
        &mut self,
        index: usize,
        target_max_width_px: u32,
    ) -> Result<RasterSurface, PageError> {
        let page_num = index + 1;
        let render_failed = |detail: String| PageError::RenderFailed {
            page: page_num,
            detail,
        };

        let page = self
            .document
            .pages()
            .get(pdfium_page_index(index)?)
            .map_err(|e| render_failed(format!("{:?}", e)))?;

        let size = fit_to_width(page.width().value, page.height().value, target_max_width_px);

        let render_config = PdfRenderConfig::new()
            .set_target_width(size.width as i32)
            .set_target_height(size.height as i32);

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| render_failed(format!("{:?}", e)))?;

        let mut image = bitmap.as_image();
        if image.width() != size.width || image.height() != size.height {
            image = image.resize_exact(size.width, size.height, image::imageops::FilterType::Triangle);
        }

        debug!(
            "Rendered page {} → {}x{} px (scale {:.3})",
            page_num, size.width, size.height, size.scale
        );

        Ok(RasterSurface {
            pixels: image.to_rgb8(),
            scale: size.scale,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_index_past_u16_is_a_render_error() {
        assert_eq!(pdfium_page_index(65_535).unwrap(), u16::MAX);
        let err = pdfium_page_index(65_536).unwrap_err();
        assert!(matches!(err, PageError::RenderFailed { page: 65_537, .. }));
    }

    #[test]
    fn wide_page_is_downscaled() {
        let s = fit_to_width(2000.0, 1000.0, 1400);
        assert_eq!(s.width, 1400);
        assert_eq!(s.height, 700);
        assert!((s.scale - 0.7).abs() < 1e-6);
    }

    #[test]
    fn narrow_page_is_never_upscaled() {
        let s = fit_to_width(612.0, 792.0, 1400);
        assert_eq!((s.width, s.height), (612, 792));
        assert_eq!(s.scale, 1.0);
    }

    #[test]
    fn page_exactly_at_target_keeps_scale_one() {
        let s = fit_to_width(1400.0, 1980.0, 1400);
        assert_eq!(s.scale, 1.0);
        assert_eq!(s.width, 1400);
    }

    #[test]
    fn dimensions_never_collapse_to_zero() {
        let s = fit_to_width(10_000.0, 0.2, 100);
        assert_eq!(s.width, 100);
        assert_eq!(s.height, 1);

        let s = fit_to_width(0.0, 0.0, 100);
        assert_eq!((s.width, s.height), (1, 1));
    }

    #[test]
    fn rounding_is_to_nearest() {
        // 595 × 842 (A4) at width 500 → scale ≈ 0.8403 → 707.56 → 708
        let s = fit_to_width(595.0, 842.0, 500);
        assert_eq!(s.width, 500);
        assert_eq!(s.height, 708);
    }
}
