//! PNG chunk iteration.

use super::{clamp_len, read_u32_be};

/// The 8-byte PNG file signature.
pub const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// A chunk located in a PNG buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PngChunk<'a> {
    /// Four-character chunk type.
    pub chunk_type: [u8; 4],
    /// Offset of the chunk's length field.
    pub offset: usize,
    /// Chunk data (clamped to the buffer).
    pub data: &'a [u8],
    /// Stored CRC, absent when the buffer ends before it.
    pub crc: Option<u32>,
    /// The declared length ran past the end of the buffer.
    pub truncated: bool,
}

impl PngChunk<'_> {
    /// Offset one past the last byte of the chunk, CRC included when present.
    pub fn end(&self) -> usize {
        self.offset + 8 + self.data.len() + if self.crc.is_some() { 4 } else { 0 }
    }

    /// Whether the stored CRC matches type and data.
    pub fn crc_valid(&self) -> bool {
        self.crc == Some(png_crc32(&self.chunk_type, self.data))
    }

    pub fn is(&self, chunk_type: &[u8; 4]) -> bool {
        &self.chunk_type == chunk_type
    }
}

/// Iterator over PNG chunks, ending after `IEND` or at the first chunk whose
/// declared length exceeds the remaining buffer.
#[derive(Debug, Clone)]
pub struct PngChunks<'a> {
    bytes: &'a [u8],
    pos: usize,
    done: bool,
}

/// Iterate over the chunks of a PNG buffer.
///
/// Returns an empty iterator when the PNG signature is missing.
pub fn png_chunks(bytes: &[u8]) -> PngChunks<'_> {
    PngChunks {
        bytes,
        pos: PNG_SIGNATURE.len(),
        done: !bytes.starts_with(&PNG_SIGNATURE),
    }
}

impl<'a> Iterator for PngChunks<'a> {
    type Item = PngChunk<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let bytes = self.bytes;
        let Some(declared) = read_u32_be(bytes, self.pos) else {
            self.done = true;
            return None;
        };
        let Some(type_bytes) = bytes.get(self.pos + 4..self.pos + 8) else {
            self.done = true;
            return None;
        };
        let chunk_type = [type_bytes[0], type_bytes[1], type_bytes[2], type_bytes[3]];

        let data_start = self.pos + 8;
        let declared = declared as usize;
        let available = clamp_len(declared, bytes.len() - data_start);
        let truncated = available < declared;
        let data = &bytes[data_start..data_start + available];
        let crc = if truncated {
            None
        } else {
            read_u32_be(bytes, data_start + available)
        };

        let chunk = PngChunk {
            chunk_type,
            offset: self.pos,
            data,
            crc,
            truncated,
        };

        self.pos = chunk.end();
        if truncated || crc.is_none() || chunk.is(b"IEND") {
            self.done = true;
        }
        Some(chunk)
    }
}

const CRC_TABLE: [u32; 256] = build_crc_table();

const fn build_crc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut n = 0;
    while n < 256 {
        let mut c = n as u32;
        let mut k = 0;
        while k < 8 {
            c = if c & 1 != 0 { 0xEDB8_8320 ^ (c >> 1) } else { c >> 1 };
            k += 1;
        }
        table[n] = c;
        n += 1;
    }
    table
}

/// CRC-32 (ISO 3309) over chunk type and data, as stored after every PNG chunk.
pub fn png_crc32(chunk_type: &[u8; 4], data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &b in chunk_type.iter().chain(data.iter()) {
        crc = CRC_TABLE[((crc ^ b as u32) & 0xFF) as usize] ^ (crc >> 8);
    }
    crc ^ 0xFFFF_FFFF
}
