//! Container format identification and bounded region iteration.
//!
//! Both the embedder and the extractor walk container structure through the
//! iterators in this module. Every in-container length field (JPEG segment
//! length, PNG chunk length, RIFF chunk size) is passed through [`clamp_len`]
//! before it is used to slice or skip, so a lying length can shorten a region
//! but never push a read past the end of the buffer.

mod jpeg;
mod png;
mod riff;

pub use jpeg::{jpeg_segments, marker, JpegSegment, JpegSegments};
pub use png::{png_chunks, png_crc32, PngChunk, PngChunks, PNG_SIGNATURE};
pub use riff::{riff_chunks, webp_canvas, RiffChunk, RiffChunks, WebpCanvas};

use serde::{Deserialize, Serialize};

/// Image container formats known to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    WebP,
    /// Anything else, including empty and non-image buffers.
    Unknown,
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Jpeg => write!(f, "JPEG"),
            Self::Png => write!(f, "PNG"),
            Self::WebP => write!(f, "WebP"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Identify the container format from its leading magic bytes.
pub fn identify(bytes: &[u8]) -> ImageFormat {
    if bytes.len() >= 2 && bytes[0] == 0xFF && bytes[1] == 0xD8 {
        ImageFormat::Jpeg
    } else if bytes.starts_with(&PNG_SIGNATURE) {
        ImageFormat::Png
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        ImageFormat::WebP
    } else {
        ImageFormat::Unknown
    }
}

/// Clamp a declared region length to the bytes actually remaining.
#[inline]
pub fn clamp_len(declared: usize, remaining: usize) -> usize {
    declared.min(remaining)
}

/// Read a big-endian u16 at `offset`, if in bounds.
#[inline]
pub(crate) fn read_u16_be(bytes: &[u8], offset: usize) -> Option<u16> {
    let b = bytes.get(offset..offset.checked_add(2)?)?;
    Some(u16::from_be_bytes([b[0], b[1]]))
}

/// Read a big-endian u32 at `offset`, if in bounds.
#[inline]
pub(crate) fn read_u32_be(bytes: &[u8], offset: usize) -> Option<u32> {
    let b = bytes.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

/// Read a little-endian u32 at `offset`, if in bounds.
#[inline]
pub(crate) fn read_u32_le(bytes: &[u8], offset: usize) -> Option<u32> {
    let b = bytes.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

/// Find the first occurrence of `needle` in `haystack` at or after `from`.
pub(crate) fn find_bytes(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}
