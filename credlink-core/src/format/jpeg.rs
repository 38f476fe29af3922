//! JPEG marker segment iteration.

use super::{clamp_len, read_u16_be};

/// JPEG marker codes used by the engine.
pub mod marker {
    pub const SOI: u8 = 0xD8;
    pub const EOI: u8 = 0xD9;
    pub const SOS: u8 = 0xDA;
    pub const APP0: u8 = 0xE0;
    pub const APP1: u8 = 0xE1;
    pub const APP11: u8 = 0xEB;
    pub const APP15: u8 = 0xEF;
    pub const COM: u8 = 0xFE;

    /// Markers that carry no length field.
    pub fn is_standalone(code: u8) -> bool {
        matches!(code, 0x01 | 0xD0..=0xD7 | SOI | EOI)
    }

    /// Application segments (APP0..APP15).
    pub fn is_app(code: u8) -> bool {
        (APP0..=APP15).contains(&code)
    }
}

/// A marker segment located in a JPEG buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JpegSegment<'a> {
    /// Marker code (the byte following `0xFF`).
    pub marker: u8,
    /// Offset of the `0xFF` byte that starts the segment.
    pub offset: usize,
    /// Bytes occupied by the segment, marker and length field included.
    pub len: usize,
    /// Segment payload (after the length field).
    pub payload: &'a [u8],
    /// The declared length ran past the end of the buffer.
    pub truncated: bool,
}

impl JpegSegment<'_> {
    /// Offset one past the last byte of the segment.
    pub fn end(&self) -> usize {
        self.offset + self.len
    }
}

/// Iterator over the marker segments that precede the entropy-coded data.
///
/// Stops at the Start-of-Scan marker, at EOI, at the end of the buffer, or at
/// the first byte that is not a marker. A segment whose length field claims
/// more bytes than remain is yielded once, clamped and flagged `truncated`,
/// and ends the iteration.
#[derive(Debug, Clone)]
pub struct JpegSegments<'a> {
    bytes: &'a [u8],
    pos: usize,
    done: bool,
}

/// Iterate over the marker segments of a JPEG buffer.
///
/// Returns an empty iterator for buffers that do not start with SOI.
pub fn jpeg_segments(bytes: &[u8]) -> JpegSegments<'_> {
    let is_jpeg = bytes.len() >= 2 && bytes[0] == 0xFF && bytes[1] == marker::SOI;
    JpegSegments {
        bytes,
        pos: 2,
        done: !is_jpeg,
    }
}

impl<'a> JpegSegments<'a> {
    /// Offset where iteration stopped (the SOS marker for well-formed files).
    pub fn position(&self) -> usize {
        self.pos
    }
}

impl<'a> Iterator for JpegSegments<'a> {
    type Item = JpegSegment<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let bytes = self.bytes;
        if self.pos >= bytes.len() || bytes[self.pos] != 0xFF {
            self.done = true;
            return None;
        }

        // Skip fill bytes between markers
        let mut code_pos = self.pos + 1;
        while code_pos < bytes.len() && bytes[code_pos] == 0xFF {
            code_pos += 1;
        }
        let Some(&code) = bytes.get(code_pos) else {
            self.done = true;
            return None;
        };
        let offset = code_pos - 1;

        if code == marker::SOS || code == marker::EOI {
            self.pos = offset;
            self.done = true;
            return None;
        }

        if marker::is_standalone(code) {
            self.pos = code_pos + 1;
            return Some(JpegSegment {
                marker: code,
                offset,
                len: 2,
                payload: &[],
                truncated: false,
            });
        }

        let Some(declared) = read_u16_be(bytes, code_pos + 1) else {
            self.done = true;
            return None;
        };
        let declared = declared as usize;
        if declared < 2 {
            self.done = true;
            return None;
        }

        let payload_start = code_pos + 3;
        let wanted = declared - 2;
        let available = clamp_len(wanted, bytes.len().saturating_sub(payload_start));
        let truncated = available < wanted;
        let payload = &bytes[payload_start.min(bytes.len())..payload_start.min(bytes.len()) + available];

        let segment = JpegSegment {
            marker: code,
            offset,
            len: 2 + 2 + available,
            payload,
            truncated,
        };

        if truncated {
            self.done = true;
        }
        self.pos = payload_start + available;
        Some(segment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(code: u8, payload: &[u8]) -> Vec<u8> {
        let mut out = vec![0xFF, code];
        out.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn test_iterates_until_sos() {
        let mut jpeg = vec![0xFF, 0xD8];
        jpeg.extend(segment(marker::APP0, b"JFIF\0"));
        jpeg.extend(segment(marker::COM, b"hello"));
        jpeg.extend(segment(marker::SOS, b"\x01\x02"));
        jpeg.extend_from_slice(&[0x12, 0x34, 0xFF, 0xD9]);

        let mut iter = jpeg_segments(&jpeg);
        let app0 = iter.next().unwrap();
        assert_eq!(app0.marker, marker::APP0);
        assert_eq!(app0.offset, 2);
        assert_eq!(app0.payload, b"JFIF\0");
        let com = iter.next().unwrap();
        assert_eq!(com.marker, marker::COM);
        assert_eq!(com.payload, b"hello");
        assert_eq!(com.offset, app0.end());
        assert!(iter.next().is_none());
        assert_eq!(iter.position(), com.end());
    }

    #[test]
    fn test_lying_length_is_clamped() {
        let mut jpeg = vec![0xFF, 0xD8, 0xFF, marker::APP1, 0xFF, 0xF0];
        jpeg.extend_from_slice(b"short");

        let segments: Vec<_> = jpeg_segments(&jpeg).collect();
        assert_eq!(segments.len(), 1);
        assert!(segments[0].truncated);
        assert_eq!(segments[0].payload, b"short");
        assert_eq!(segments[0].end(), jpeg.len());
    }

    #[test]
    fn test_non_jpeg_and_truncated_headers() {
        assert_eq!(jpeg_segments(b"").count(), 0);
        assert_eq!(jpeg_segments(&[0xFF, 0xD8, 0xFF]).count(), 0);
        assert_eq!(jpeg_segments(&[0xFF, 0xD8, 0xFF, 0xE1, 0x00]).count(), 0);
        assert_eq!(jpeg_segments(b"not a jpeg at all").count(), 0);
        // Length field smaller than itself
        assert_eq!(jpeg_segments(&[0xFF, 0xD8, 0xFF, 0xE1, 0x00, 0x01]).count(), 0);
    }

    #[test]
    fn test_fill_bytes_and_standalone_markers() {
        let mut jpeg = vec![0xFF, 0xD8, 0xFF, 0xFF, 0xD0];
        jpeg.extend(segment(marker::COM, b"x"));
        let segments: Vec<_> = jpeg_segments(&jpeg).collect();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].marker, 0xD0);
        assert_eq!(segments[0].offset, 3);
        assert_eq!(segments[1].payload, b"x");
    }
}
