//! PNG channels: an `iTXt` text chunk and an `eXIf` chunk.

use base64::{engine::general_purpose::STANDARD, Engine};

use super::{exif, jumbf, ChannelError, Payload, Recovered};
use crate::format::{png_chunks, png_crc32, PngChunk, PNG_SIGNATURE};
use crate::tag::decode_tag;

/// Keyword of the CredLink text chunk.
const TEXT_KEYWORD: &[u8] = b"credlink";
const XMP_KEYWORD: &[u8] = b"XML:com.adobe.xmp";

/// Largest chunk length PNG allows.
const MAX_CHUNK_LEN: usize = 0x7FFF_FFFF;

/// Walk every chunk through `IEND`, refusing files we could not reproduce.
fn layout(bytes: &[u8]) -> Result<Vec<PngChunk<'_>>, ChannelError> {
    let chunks: Vec<_> = png_chunks(bytes).collect();
    match chunks.last() {
        Some(last) if last.is(b"IEND") && last.crc.is_some() => {}
        _ => {
            return Err(ChannelError::Malformed(
                "chunk stream does not end with a complete IEND".into(),
            ))
        }
    }
    Ok(chunks)
}

fn encode_chunk(chunk_type: &[u8; 4], data: &[u8]) -> Result<Vec<u8>, ChannelError> {
    if data.len() > MAX_CHUNK_LEN {
        return Err(ChannelError::PayloadTooLarge {
            size: data.len(),
            limit: MAX_CHUNK_LEN,
        });
    }
    let mut out = Vec::with_capacity(data.len() + 12);
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(chunk_type);
    out.extend_from_slice(data);
    out.extend_from_slice(&png_crc32(chunk_type, data).to_be_bytes());
    Ok(out)
}

/// Copy the file without the chunks matched by `remove`, placing `inserted`
/// just before the first `IDAT` (or before `IEND` when there is none).
fn rewrite(
    bytes: &[u8],
    remove: impl Fn(&PngChunk<'_>) -> bool,
    inserted: &[u8],
) -> Result<Vec<u8>, ChannelError> {
    let chunks = layout(bytes)?;
    let mut out = Vec::with_capacity(bytes.len() + inserted.len());
    out.extend_from_slice(&PNG_SIGNATURE);

    let mut placed = false;
    let mut end = PNG_SIGNATURE.len();
    for chunk in &chunks {
        end = chunk.end();
        if remove(chunk) {
            continue;
        }
        if !placed && (chunk.is(b"IDAT") || chunk.is(b"IEND")) {
            out.extend_from_slice(inserted);
            placed = true;
        }
        out.extend_from_slice(&bytes[chunk.offset..chunk.end()]);
    }
    // Bytes after IEND are not ours to drop
    out.extend_from_slice(&bytes[end..]);
    Ok(out)
}

/// Split uncompressed `iTXt` data into keyword and text.
fn itxt_fields(data: &[u8]) -> Option<(&[u8], &[u8])> {
    let keyword_end = data.iter().position(|b| *b == 0)?;
    let keyword = &data[..keyword_end];
    let compressed = *data.get(keyword_end + 1)?;
    if compressed != 0 {
        return None;
    }
    // Skip compression method, then language tag and translated keyword
    let mut pos = keyword_end + 3;
    for _ in 0..2 {
        pos += data.get(pos..)?.iter().position(|b| *b == 0)? + 1;
    }
    Some((keyword, data.get(pos..)?))
}

/// Keyword and text of any `tEXt` or uncompressed `iTXt` chunk.
fn text_fields<'a>(chunk: &PngChunk<'a>) -> Option<(&'a [u8], &'a [u8])> {
    if chunk.is(b"iTXt") {
        itxt_fields(chunk.data)
    } else if chunk.is(b"tEXt") {
        let keyword_end = chunk.data.iter().position(|b| *b == 0)?;
        Some((&chunk.data[..keyword_end], &chunk.data[keyword_end + 1..]))
    } else {
        None
    }
}

fn is_credlink_text(chunk: &PngChunk<'_>) -> bool {
    (chunk.is(b"iTXt") || chunk.is(b"tEXt")) && chunk.data.starts_with(b"credlink\0")
}

pub fn write_text(bytes: &[u8], payload: &Payload) -> Result<Vec<u8>, ChannelError> {
    let superbox = jumbf::encode(payload);
    let mut data = TEXT_KEYWORD.to_vec();
    data.extend_from_slice(&[0, 0, 0, 0, 0]);
    data.extend_from_slice(payload.tag.as_bytes());
    data.push(b'\n');
    data.extend_from_slice(STANDARD.encode(&superbox).as_bytes());

    let chunk = encode_chunk(b"iTXt", &data)?;
    rewrite(bytes, is_credlink_text, &chunk)
}

/// Read the text channel. The first line is the tag; the base64 superbox
/// after it adds the manifest when it decodes.
pub fn read_text(bytes: &[u8]) -> Option<Recovered> {
    png_chunks(bytes)
        .filter_map(|chunk| text_fields(&chunk))
        .filter(|(keyword, _)| *keyword == TEXT_KEYWORD)
        .find_map(|(_, text)| {
            let mut lines = text.splitn(2, |b| *b == b'\n');
            let tag_line = lines.next()?;
            let from_box = lines
                .next()
                .and_then(|encoded| STANDARD.decode(encoded.trim_ascii()).ok())
                .and_then(|superbox| jumbf::decode(&superbox));
            from_box.or_else(|| decode_tag(tag_line.trim_ascii()).map(Recovered::tag_only))
        })
}

pub fn write_exif(bytes: &[u8], payload: &Payload) -> Result<Vec<u8>, ChannelError> {
    let existing = layout(bytes)?.into_iter().find(|c| c.is(b"eXIf"));
    let tiff = exif::upsert(
        existing.map(|c| exif::strip_exif_header(c.data)),
        payload,
    )?;
    let chunk = encode_chunk(b"eXIf", &tiff)?;
    rewrite(bytes, |c| c.is(b"eXIf"), &chunk)
}

pub fn read_exif(bytes: &[u8]) -> Option<Recovered> {
    png_chunks(bytes)
        .filter(|c| c.is(b"eXIf"))
        .find_map(|c| exif::find_tag(exif::strip_exif_header(c.data)))
        .map(Recovered::tag_only)
}

/// XMP packets stored in `iTXt` chunks.
pub fn xmp_packets(bytes: &[u8]) -> Vec<&[u8]> {
    png_chunks(bytes)
        .filter(|c| c.is(b"iTXt"))
        .filter_map(|c| itxt_fields(c.data))
        .filter(|(keyword, _)| *keyword == XMP_KEYWORD)
        .map(|(_, text)| text)
        .collect()
}
