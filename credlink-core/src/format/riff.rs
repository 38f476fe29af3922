//! WebP (RIFF) chunk iteration.

use super::{clamp_len, read_u32_le};

/// A sub-chunk located in a RIFF/WebP buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RiffChunk<'a> {
    /// Four-character chunk identifier.
    pub fourcc: [u8; 4],
    /// Offset of the chunk header.
    pub offset: usize,
    /// Chunk payload (clamped to the container).
    pub data: &'a [u8],
    /// Padding byte present after odd-sized payloads.
    pub padded: bool,
    /// The declared size ran past the end of the container.
    pub truncated: bool,
}

impl RiffChunk<'_> {
    /// Offset one past the last byte of the chunk, padding included.
    pub fn end(&self) -> usize {
        self.offset + 8 + self.data.len() + usize::from(self.padded)
    }

    pub fn is(&self, fourcc: &[u8; 4]) -> bool {
        &self.fourcc == fourcc
    }
}

/// Iterator over the sub-chunks of a WebP container.
///
/// Bounded by both the declared RIFF size and the buffer length; ends at the
/// first chunk whose declared size exceeds what remains.
#[derive(Debug, Clone)]
pub struct RiffChunks<'a> {
    bytes: &'a [u8],
    pos: usize,
    end: usize,
    done: bool,
}

/// Iterate over the sub-chunks of a WebP buffer.
///
/// Returns an empty iterator when the `RIFF....WEBP` header is missing.
pub fn riff_chunks(bytes: &[u8]) -> RiffChunks<'_> {
    let is_webp = bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP";
    let end = if is_webp {
        let declared = read_u32_le(bytes, 4).unwrap_or(0) as usize;
        8 + clamp_len(declared, bytes.len() - 8)
    } else {
        0
    };
    RiffChunks {
        bytes,
        pos: 12,
        end,
        done: !is_webp,
    }
}

impl<'a> Iterator for RiffChunks<'a> {
    type Item = RiffChunk<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.pos + 8 > self.end {
            self.done = true;
            return None;
        }

        let bytes = &self.bytes[..self.end];
        let fourcc = [
            bytes[self.pos],
            bytes[self.pos + 1],
            bytes[self.pos + 2],
            bytes[self.pos + 3],
        ];
        let declared = read_u32_le(bytes, self.pos + 4).unwrap_or(0) as usize;

        let data_start = self.pos + 8;
        let available = clamp_len(declared, bytes.len() - data_start);
        let truncated = available < declared;
        let padded = !truncated && declared % 2 == 1 && data_start + available < bytes.len();

        let chunk = RiffChunk {
            fourcc,
            offset: self.pos,
            data: &self.bytes[data_start..data_start + available],
            padded,
            truncated,
        };

        self.pos = chunk.end();
        if truncated {
            self.done = true;
        }
        Some(chunk)
    }
}

/// Canvas information of a WebP image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WebpCanvas {
    pub width: u32,
    pub height: u32,
    /// Alpha is present (VP8X flag, or the VP8L alpha hint).
    pub alpha: bool,
    /// The file already uses the extended (`VP8X`) layout.
    pub extended: bool,
}

/// Read canvas dimensions from the first image-bearing chunk of a WebP buffer.
pub fn webp_canvas(bytes: &[u8]) -> Option<WebpCanvas> {
    let first = riff_chunks(bytes).next()?;
    let data = first.data;

    match &first.fourcc {
        b"VP8X" if data.len() >= 10 => Some(WebpCanvas {
            width: 1 + read_u24_le(&data[4..7]),
            height: 1 + read_u24_le(&data[7..10]),
            alpha: data[0] & 0x10 != 0,
            extended: true,
        }),
        b"VP8L" if data.len() >= 5 && data[0] == 0x2F => {
            let bits = read_u32_le(data, 1)?;
            Some(WebpCanvas {
                width: (bits & 0x3FFF) + 1,
                height: ((bits >> 14) & 0x3FFF) + 1,
                alpha: (bits >> 28) & 1 == 1,
                extended: false,
            })
        }
        b"VP8 " if data.len() >= 10 && data[3..6] == [0x9D, 0x01, 0x2A] => Some(WebpCanvas {
            width: u32::from(u16::from_le_bytes([data[6], data[7]]) & 0x3FFF),
            height: u32::from(u16::from_le_bytes([data[8], data[9]]) & 0x3FFF),
            alpha: false,
            extended: false,
        }),
        _ => None,
    }
}

fn read_u24_le(b: &[u8]) -> u32 {
    u32::from(b[0]) | (u32::from(b[1]) << 8) | (u32::from(b[2]) << 16)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn webp(chunks: &[(&[u8; 4], &[u8])]) -> Vec<u8> {
        let mut body = b"WEBP".to_vec();
        for (fourcc, data) in chunks {
            body.extend_from_slice(*fourcc);
            body.extend_from_slice(&(data.len() as u32).to_le_bytes());
            body.extend_from_slice(data);
            if data.len() % 2 == 1 {
                body.push(0);
            }
        }
        let mut out = b"RIFF".to_vec();
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend(body);
        out
    }

    #[test]
    fn test_iterates_with_padding() {
        let file = webp(&[(b"VP8L", &[0x2F, 0, 0, 0, 0]), (b"CLNK", b"abc")]);
        let chunks: Vec<_> = riff_chunks(&file).collect();
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].is(b"VP8L"));
        assert!(chunks[0].padded);
        assert_eq!(chunks[1].data, b"abc");
        assert_eq!(chunks[1].end(), file.len());
    }

    #[test]
    fn test_lying_size_is_clamped() {
        let mut file = webp(&[(b"VP8L", &[0x2F, 0, 0, 0, 0, 0])]);
        file.extend_from_slice(b"EXIF");
        file.extend_from_slice(&u32::MAX.to_le_bytes());
        file.extend_from_slice(b"tail");
        let riff_size = (file.len() - 8) as u32;
        file[4..8].copy_from_slice(&riff_size.to_le_bytes());

        let chunks: Vec<_> = riff_chunks(&file).collect();
        assert_eq!(chunks.len(), 2);
        assert!(chunks[1].truncated);
        assert_eq!(chunks[1].data, b"tail");
    }

    #[test]
    fn test_riff_size_bounds_iteration() {
        let mut file = webp(&[(b"VP8L", &[0x2F, 0, 0, 0, 0, 0])]);
        // Bytes past the declared RIFF size are not part of the container
        file.extend_from_slice(b"CLNK\x02\x00\x00\x00hi");
        assert_eq!(riff_chunks(&file).count(), 1);
    }

    #[test]
    fn test_canvas_from_vp8l() {
        // 640x480 with alpha hint set
        let bits: u32 = 639 | (479 << 14) | (1 << 28);
        let mut data = vec![0x2F];
        data.extend_from_slice(&bits.to_le_bytes());
        let file = webp(&[(b"VP8L", &data)]);
        let canvas = webp_canvas(&file).unwrap();
        assert_eq!((canvas.width, canvas.height), (640, 480));
        assert!(canvas.alpha);
        assert!(!canvas.extended);
    }

    #[test]
    fn test_canvas_from_vp8x() {
        let mut data = vec![0x10, 0, 0, 0];
        data.extend_from_slice(&[0x1F, 0x03, 0x00]); // 800 - 1
        data.extend_from_slice(&[0x57, 0x02, 0x00]); // 600 - 1
        let file = webp(&[(b"VP8X", &data)]);
        let canvas = webp_canvas(&file).unwrap();
        assert_eq!((canvas.width, canvas.height), (800, 600));
        assert!(canvas.alpha);
        assert!(canvas.extended);
    }

    #[test]
    fn test_not_webp() {
        assert_eq!(riff_chunks(b"RIFF\x04\x00\x00\x00WAVE").count(), 0);
        assert_eq!(riff_chunks(b"").count(), 0);
        assert!(webp_canvas(b"garbage").is_none());
    }
}
