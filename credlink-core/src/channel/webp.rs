//! WebP channels: a custom `CLNK` chunk and the `EXIF` chunk.
//!
//! Decoders only tolerate extra chunks in the extended layout, so a simple
//! (`VP8 `/`VP8L` only) file is promoted to `VP8X` whenever it is written.

use std::borrow::Cow;

use super::{exif, jumbf, ChannelError, Payload, Recovered};
use crate::format::{riff_chunks, webp_canvas, RiffChunk, WebpCanvas};

const CREDLINK_CHUNK: &[u8; 4] = b"CLNK";

const FLAG_ALPHA: u8 = 0x10;
const FLAG_EXIF: u8 = 0x08;
const FLAG_XMP: u8 = 0x04;

struct Part<'a> {
    fourcc: [u8; 4],
    data: Cow<'a, [u8]>,
}

impl<'a> From<&RiffChunk<'a>> for Part<'a> {
    fn from(chunk: &RiffChunk<'a>) -> Self {
        Self {
            fourcc: chunk.fourcc,
            data: Cow::Borrowed(chunk.data),
        }
    }
}

struct Layout<'a> {
    chunks: Vec<RiffChunk<'a>>,
    canvas: WebpCanvas,
    /// Bytes after the RIFF payload, copied through unchanged.
    trailer: &'a [u8],
}

fn layout(bytes: &[u8]) -> Result<Layout<'_>, ChannelError> {
    let chunks: Vec<_> = riff_chunks(bytes).collect();
    if chunks.is_empty() || chunks.iter().any(|c| c.truncated) {
        return Err(ChannelError::Malformed(
            "RIFF chunk runs past end of container".into(),
        ));
    }
    let canvas = webp_canvas(bytes)
        .ok_or_else(|| ChannelError::Malformed("no VP8X, VP8L or VP8 header".into()))?;
    let end = chunks.last().map(|c| c.end()).unwrap_or(12);
    Ok(Layout {
        chunks,
        canvas,
        trailer: &bytes[end.min(bytes.len())..],
    })
}

fn vp8x_flags(parts: &[Part<'_>], existing: u8, alpha: bool) -> u8 {
    let mut flags = existing & !(FLAG_EXIF | FLAG_XMP);
    if alpha {
        flags |= FLAG_ALPHA;
    }
    if parts.iter().any(|p| &p.fourcc == b"EXIF") {
        flags |= FLAG_EXIF;
    }
    if parts.iter().any(|p| &p.fourcc == b"XMP ") {
        flags |= FLAG_XMP;
    }
    flags
}

fn vp8x_chunk(canvas: &WebpCanvas, flags: u8) -> Vec<u8> {
    let mut data = vec![flags, 0, 0, 0];
    data.extend_from_slice(&canvas.width.saturating_sub(1).to_le_bytes()[..3]);
    data.extend_from_slice(&canvas.height.saturating_sub(1).to_le_bytes()[..3]);
    data
}

/// Serialize the parts as an extended WebP, fixing the VP8X flags and the
/// RIFF size.
fn assemble(
    mut parts: Vec<Part<'_>>,
    canvas: &WebpCanvas,
    trailer: &[u8],
) -> Result<Vec<u8>, ChannelError> {
    if canvas.extended {
        let existing = parts[0].data.first().copied().unwrap_or(0);
        let flags = vp8x_flags(&parts, existing, false);
        parts[0].data.to_mut()[0] = flags;
    } else {
        let flags = vp8x_flags(&parts, 0, canvas.alpha);
        parts.insert(
            0,
            Part {
                fourcc: *b"VP8X",
                data: Cow::Owned(vp8x_chunk(canvas, flags)),
            },
        );
    }

    let body_len: usize = 4 + parts
        .iter()
        .map(|p| 8 + p.data.len() + p.data.len() % 2)
        .sum::<usize>();
    let riff_size = u32::try_from(body_len).map_err(|_| ChannelError::PayloadTooLarge {
        size: body_len,
        limit: u32::MAX as usize,
    })?;

    let mut out = Vec::with_capacity(8 + body_len + trailer.len());
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&riff_size.to_le_bytes());
    out.extend_from_slice(b"WEBP");
    for part in &parts {
        out.extend_from_slice(&part.fourcc);
        out.extend_from_slice(&(part.data.len() as u32).to_le_bytes());
        out.extend_from_slice(&part.data);
        if part.data.len() % 2 == 1 {
            out.push(0);
        }
    }
    out.extend_from_slice(trailer);
    Ok(out)
}

pub fn write_chunk(bytes: &[u8], payload: &Payload) -> Result<Vec<u8>, ChannelError> {
    let layout = layout(bytes)?;
    let mut parts: Vec<Part<'_>> = layout
        .chunks
        .iter()
        .filter(|c| !c.is(CREDLINK_CHUNK))
        .map(Part::from)
        .collect();
    parts.push(Part {
        fourcc: *CREDLINK_CHUNK,
        data: Cow::Owned(jumbf::encode(payload)),
    });
    assemble(parts, &layout.canvas, layout.trailer)
}

pub fn read_chunk(bytes: &[u8]) -> Option<Recovered> {
    riff_chunks(bytes)
        .filter(|c| c.is(CREDLINK_CHUNK))
        .find_map(|c| jumbf::decode(c.data))
}

/// Upsert into an existing `EXIF` chunk; files without one are left alone.
pub fn write_exif(bytes: &[u8], payload: &Payload) -> Result<Vec<u8>, ChannelError> {
    let layout = layout(bytes)?;
    if !layout.chunks.iter().any(|c| c.is(b"EXIF")) {
        return Err(ChannelError::NotApplicable("no EXIF chunk present".into()));
    }

    let mut parts = Vec::with_capacity(layout.chunks.len());
    for chunk in &layout.chunks {
        if !chunk.is(b"EXIF") {
            parts.push(Part::from(chunk));
            continue;
        }
        let tiff = exif::upsert(Some(exif::strip_exif_header(chunk.data)), payload)?;
        let mut data = if chunk.data.starts_with(exif::EXIF_HEADER) {
            exif::EXIF_HEADER.to_vec()
        } else {
            Vec::new()
        };
        data.extend_from_slice(&tiff);
        parts.push(Part {
            fourcc: *b"EXIF",
            data: Cow::Owned(data),
        });
    }
    assemble(parts, &layout.canvas, layout.trailer)
}

pub fn read_exif(bytes: &[u8]) -> Option<Recovered> {
    riff_chunks(bytes)
        .filter(|c| c.is(b"EXIF"))
        .find_map(|c| exif::find_tag(exif::strip_exif_header(c.data)))
        .map(Recovered::tag_only)
}

/// XMP packets stored in `XMP ` chunks.
pub fn xmp_packets(bytes: &[u8]) -> Vec<&[u8]> {
    riff_chunks(bytes)
        .filter(|c| c.is(b"XMP "))
        .map(|c| c.data)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::read_u32_le;
    use crate::manifest::ManifestBuilder;

    fn webp(chunks: &[(&[u8; 4], &[u8])]) -> Vec<u8> {
        let parts = chunks
            .iter()
            .map(|(fourcc, data)| Part {
                fourcc: **fourcc,
                data: Cow::Borrowed(*data),
            })
            .collect::<Vec<_>>();
        let mut body = b"WEBP".to_vec();
        for part in &parts {
            body.extend_from_slice(&part.fourcc);
            body.extend_from_slice(&(part.data.len() as u32).to_le_bytes());
            body.extend_from_slice(&part.data);
            if part.data.len() % 2 == 1 {
                body.push(0);
            }
        }
        let mut out = b"RIFF".to_vec();
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend(body);
        out
    }

    /// VP8L header for a 3x2 image with the alpha hint set.
    fn vp8l() -> Vec<u8> {
        let bits: u32 = 2 | (1 << 14) | (1 << 28);
        let mut data = vec![0x2F];
        data.extend_from_slice(&bits.to_le_bytes());
        data.extend_from_slice(&[0, 0, 0]);
        data
    }

    fn payload(uri: &str) -> Payload {
        let manifest = ManifestBuilder::new(b"x").with_title("Recovery Test").build();
        Payload::full(uri, &manifest).unwrap()
    }

    fn fourccs(bytes: &[u8]) -> Vec<[u8; 4]> {
        riff_chunks(bytes).map(|c| c.fourcc).collect()
    }

    #[test]
    fn test_simple_file_is_promoted() {
        let original = webp(&[(b"VP8L", &vp8l())]);
        let out = write_chunk(&original, &payload("https://proofs.example.com/abc123")).unwrap();
        assert_eq!(fourccs(&out), vec![*b"VP8X", *b"VP8L", *b"CLNK"]);
        assert_eq!(read_u32_le(&out, 4), Some(out.len() as u32 - 8));

        let canvas = webp_canvas(&out).unwrap();
        assert!(canvas.extended);
        assert!(canvas.alpha);
        assert_eq!((canvas.width, canvas.height), (3, 2));

        let recovered = read_chunk(&out).unwrap();
        assert_eq!(recovered.proof_uri, "https://proofs.example.com/abc123");
        assert!(recovered.manifest.is_some());
    }

    #[test]
    fn test_resign_replaces_chunk() {
        let original = webp(&[(b"VP8L", &vp8l())]);
        let once = write_chunk(&original, &payload("urn:proof:1")).unwrap();
        let twice = write_chunk(&once, &payload("urn:proof:2")).unwrap();
        assert_eq!(fourccs(&twice), vec![*b"VP8X", *b"VP8L", *b"CLNK"]);
        assert_eq!(read_chunk(&twice).unwrap().proof_uri, "urn:proof:2");
    }

    #[test]
    fn test_exif_requires_existing_chunk() {
        let original = webp(&[(b"VP8L", &vp8l())]);
        assert!(matches!(
            write_exif(&original, &payload("urn:proof:1")),
            Err(ChannelError::NotApplicable(_))
        ));
    }

    #[test]
    fn test_exif_upsert_sets_flag() {
        let tiff = exif::upsert(None, &payload("urn:proof:0")).unwrap();
        let mut exif_data = exif::EXIF_HEADER.to_vec();
        exif_data.extend_from_slice(&tiff);
        let mut vp8x = vec![0u8; 10];
        vp8x[4] = 2;
        vp8x[7] = 1;
        let original = webp(&[(b"VP8X", &vp8x), (b"VP8L", &vp8l()), (b"EXIF", &exif_data)]);

        let out = write_exif(&original, &payload("urn:proof:7")).unwrap();
        assert_eq!(fourccs(&out), vec![*b"VP8X", *b"VP8L", *b"EXIF"]);
        let vp8x_flags = riff_chunks(&out).next().unwrap().data[0];
        assert_eq!(vp8x_flags & FLAG_EXIF, FLAG_EXIF);
        assert_eq!(read_exif(&out).unwrap().proof_uri, "urn:proof:7");
        let exif_chunk = riff_chunks(&out).find(|c| c.is(b"EXIF")).unwrap();
        assert!(exif_chunk.data.starts_with(exif::EXIF_HEADER));
    }

    #[test]
    fn test_malformed_is_refused() {
        let mut original = webp(&[(b"VP8L", &vp8l())]);
        original[16..20].copy_from_slice(&1000u32.to_le_bytes());
        assert!(matches!(
            write_chunk(&original, &payload("urn:proof:1")),
            Err(ChannelError::Malformed(_))
        ));
        assert!(write_chunk(b"RIFF\x04\0\0\0WEBP", &payload("urn:proof:1")).is_err());
    }

    #[test]
    fn test_xmp_packets() {
        let original = webp(&[(b"VP8L", &vp8l()), (b"XMP ", b"<x:xmpmeta/>")]);
        assert_eq!(xmp_packets(&original), vec![&b"<x:xmpmeta/>"[..]]);
    }
}
