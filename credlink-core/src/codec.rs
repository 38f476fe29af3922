//! Image codec boundary.
//!
//! The engine never decodes pixels itself. It asks an [`ImageCodec`] whether
//! a buffer still decodes and at what size, and (in tests and degradation
//! tooling) to re-encode an image.
//!
//! Two implementations ship with the crate:
//!
//! - [`ImageCrateCodec`] (feature `image-codec`): full decode through the
//!   `image` crate.
//! - [`StructuralCodec`]: reads dimensions from container headers only. Used
//!   when full decode verification is disabled, and in builds without the
//!   `image` crate.

use thiserror::Error;

use crate::format::{
    identify, jpeg_segments, png_chunks, read_u16_be, read_u32_be, webp_canvas, ImageFormat,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Unsupported codec operation: {0}")]
    Unsupported(String),

    #[error("Decode failed: {0}")]
    Decode(String),

    #[error("Encode failed: {0}")]
    Encode(String),
}

/// Result of decoding a buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeReport {
    pub valid: bool,
    pub width: u32,
    pub height: u32,
}

impl DecodeReport {
    pub fn valid(width: u32, height: u32) -> Self {
        Self {
            valid: true,
            width,
            height,
        }
    }

    pub fn invalid() -> Self {
        Self::default()
    }

    /// Same validity and dimensions.
    pub fn same_image(&self, other: &Self) -> bool {
        self.valid && other.valid && self.width == other.width && self.height == other.height
    }
}

/// A descriptive metadata field a codec may know how to write natively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptiveField {
    Title,
    Creator,
    Description,
}

/// Image decode/encode capability supplied to the engine.
pub trait ImageCodec: Send + Sync {
    /// Decode `bytes` far enough to report validity and dimensions.
    fn decode(&self, bytes: &[u8]) -> DecodeReport;

    /// Write a descriptive field using the codec's own metadata support.
    fn write_descriptive_field(
        &self,
        _bytes: &[u8],
        field: DescriptiveField,
        _value: &str,
    ) -> Result<Vec<u8>, CodecError> {
        Err(CodecError::Unsupported(format!(
            "writing {field:?} is not supported by this codec"
        )))
    }

    /// Decode and re-encode `bytes` as `format`. `quality` (1-100) applies to
    /// lossy formats.
    fn reencode(&self, bytes: &[u8], format: ImageFormat, quality: u8)
        -> Result<Vec<u8>, CodecError>;
}

/// Header-only codec: validity means the container structure names a
/// non-zero canvas.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralCodec;

impl StructuralCodec {
    fn dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
        match identify(bytes) {
            ImageFormat::Jpeg => jpeg_segments(bytes)
                .find(|s| is_start_of_frame(s.marker) && !s.truncated)
                .and_then(|s| {
                    let height = read_u16_be(s.payload, 1)?;
                    let width = read_u16_be(s.payload, 3)?;
                    Some((u32::from(width), u32::from(height)))
                }),
            ImageFormat::Png => png_chunks(bytes)
                .next()
                .filter(|c| c.is(b"IHDR") && c.crc.is_some())
                .and_then(|c| Some((read_u32_be(c.data, 0)?, read_u32_be(c.data, 4)?))),
            ImageFormat::WebP => webp_canvas(bytes).map(|c| (c.width, c.height)),
            ImageFormat::Unknown => None,
        }
    }
}

fn is_start_of_frame(marker: u8) -> bool {
    matches!(marker, 0xC0..=0xC3 | 0xC5..=0xC7 | 0xC9..=0xCB | 0xCD..=0xCF)
}

impl ImageCodec for StructuralCodec {
    fn decode(&self, bytes: &[u8]) -> DecodeReport {
        match Self::dimensions(bytes) {
            Some((width, height)) if width > 0 && height > 0 => DecodeReport::valid(width, height),
            _ => DecodeReport::invalid(),
        }
    }

    fn reencode(&self, _bytes: &[u8], format: ImageFormat, _quality: u8) -> Result<Vec<u8>, CodecError> {
        Err(CodecError::Unsupported(format!(
            "header-only codec cannot re-encode to {format}"
        )))
    }
}

#[cfg(feature = "image-codec")]
pub use self::image_codec::ImageCrateCodec;

#[cfg(feature = "image-codec")]
mod image_codec {
    use std::io::Cursor;

    use image::codecs::jpeg::JpegEncoder;
    use image::codecs::png::PngEncoder;
    use image::codecs::webp::WebPEncoder;
    use image::DynamicImage;
    use tracing::debug;

    use super::{CodecError, DecodeReport, ImageCodec};
    use crate::format::{identify, ImageFormat};

    /// Codec backed by the `image` crate. Decoding is a full pixel decode.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct ImageCrateCodec;

    fn image_format(format: ImageFormat) -> Option<image::ImageFormat> {
        match format {
            ImageFormat::Jpeg => Some(image::ImageFormat::Jpeg),
            ImageFormat::Png => Some(image::ImageFormat::Png),
            ImageFormat::WebP => Some(image::ImageFormat::WebP),
            ImageFormat::Unknown => None,
        }
    }

    impl ImageCrateCodec {
        fn load(bytes: &[u8]) -> Result<DynamicImage, CodecError> {
            let format = identify(bytes);
            let image_format = image_format(format)
                .ok_or_else(|| CodecError::Decode("unrecognized container".into()))?;
            image::load_from_memory_with_format(bytes, image_format)
                .map_err(|e| CodecError::Decode(e.to_string()))
        }
    }

    impl ImageCodec for ImageCrateCodec {
        fn decode(&self, bytes: &[u8]) -> DecodeReport {
            match Self::load(bytes) {
                Ok(image) => DecodeReport::valid(image.width(), image.height()),
                Err(e) => {
                    debug!(error = %e, "Image failed to decode");
                    DecodeReport::invalid()
                }
            }
        }

        fn reencode(
            &self,
            bytes: &[u8],
            format: ImageFormat,
            quality: u8,
        ) -> Result<Vec<u8>, CodecError> {
            let image = Self::load(bytes)?;
            let mut buffer = Cursor::new(Vec::new());

            let written = match format {
                ImageFormat::Jpeg => {
                    let encoder =
                        JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
                    DynamicImage::ImageRgb8(image.to_rgb8()).write_with_encoder(encoder)
                }
                ImageFormat::Png => image.write_with_encoder(PngEncoder::new(&mut buffer)),
                ImageFormat::WebP => {
                    // Lossless only; `quality` does not apply
                    let encoder = WebPEncoder::new_lossless(&mut buffer);
                    if image.color().has_alpha() {
                        DynamicImage::ImageRgba8(image.to_rgba8()).write_with_encoder(encoder)
                    } else {
                        DynamicImage::ImageRgb8(image.to_rgb8()).write_with_encoder(encoder)
                    }
                }
                ImageFormat::Unknown => {
                    return Err(CodecError::Unsupported(
                        "cannot encode an unknown format".into(),
                    ))
                }
            };
            written.map_err(|e| CodecError::Encode(e.to_string()))?;
            Ok(buffer.into_inner())
        }
    }
}
