//! Image encoding: `RasterSurface` → compressed bytes ready for a PDF image XObject.
//!
//! Both encodings map directly onto a standard PDF stream filter, so the
//! rebuilder can embed the bytes as-is without re-compressing them:
//!
//! | Format | PDF filter    | Quality knob |
//! |--------|---------------|--------------|
//! | JPEG   | `DCTDecode`   | `round(q * 100)` |
//! | Lossless | `FlateDecode` | ignored |

use crate::config::PageImageFormat;
use crate::pipeline::render::RasterSurface;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::codecs::jpeg::JpegEncoder;
use image::ImageError;
use std::io::Write;
use tracing::debug;

/// Stream filter needed to decode an [`EncodedPageImage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFilter {
    Dct,
    Flate,
}

impl ImageFilter {
    /// Name of the filter as written in the image dictionary.
    pub fn pdf_name(self) -> &'static str {
        match self {
            ImageFilter::Dct => "DCTDecode",
            ImageFilter::Flate => "FlateDecode",
        }
    }
}

/// A compressed page image and the pixel grid it decodes to.
#[derive(Debug, Clone)]
pub struct EncodedPageImage {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub filter: ImageFilter,
}

/// Encode a rendered page. Consumes the surface so its pixels are freed as
/// soon as the compressed copy exists.
pub fn encode_page(
    surface: RasterSurface,
    format: PageImageFormat,
    jpeg_quality: u8,
) -> Result<EncodedPageImage, ImageError> {
    let (width, height) = (surface.width(), surface.height());
    let raw_len = surface.pixels.as_raw().len();

    let (data, filter) = match format {
        PageImageFormat::Jpeg => {
            let mut buf = Vec::new();
            JpegEncoder::new_with_quality(&mut buf, jpeg_quality.clamp(1, 100))
                .encode_image(&surface.pixels)?;
            (buf, ImageFilter::Dct)
        }
        PageImageFormat::Lossless => {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder
                .write_all(surface.pixels.as_raw())
                .map_err(ImageError::IoError)?;
            (encoder.finish().map_err(ImageError::IoError)?, ImageFilter::Flate)
        }
    };

    debug!(
        "Encoded {}x{} surface → {} bytes {} (raw {} bytes)",
        width,
        height,
        data.len(),
        filter.pdf_name(),
        raw_len
    );

    Ok(EncodedPageImage {
        data,
        width,
        height,
        filter,
    })
}
