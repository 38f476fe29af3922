//! JPEG channels: APP11 box segments, APP1 EXIF and APP1 XMP.

use super::{exif, jumbf, xmp, ChannelError, Payload, Recovered};
use crate::format::{jpeg_segments, marker, read_u16_be, read_u32_be, JpegSegment};

/// Largest payload a marker segment can hold (length field minus itself).
const MAX_SEGMENT_PAYLOAD: usize = 0xFFFF - 2;

/// Common identifier of JPEG XT box segments.
const APP11_CI: &[u8; 2] = b"JP";
/// Box instance number used for CredLink boxes ("CL").
const APP11_INSTANCE: u16 = 0x434C;
/// CI + En + Z.
const APP11_HEADER_LEN: usize = 8;
const MAX_BOX_FRAGMENT: usize = MAX_SEGMENT_PAYLOAD - APP11_HEADER_LEN;

const XMP_NAMESPACE: &[u8] = b"http://ns.adobe.com/xap/1.0/\0";

struct Layout<'a> {
    segments: Vec<JpegSegment<'a>>,
    scan_start: usize,
}

/// Walk the marker segments up to SOS, refusing anything we could not
/// reproduce byte for byte.
fn layout(bytes: &[u8]) -> Result<Layout<'_>, ChannelError> {
    let mut iter = jpeg_segments(bytes);
    let segments: Vec<_> = iter.by_ref().collect();
    if segments.iter().any(|s| s.truncated) {
        return Err(ChannelError::Malformed(
            "marker segment runs past end of file".into(),
        ));
    }
    let scan_start = iter.position();
    if bytes.get(scan_start..scan_start + 2) != Some(&[0xFF, marker::SOS][..]) {
        return Err(ChannelError::Malformed(
            "no start-of-scan marker after header segments".into(),
        ));
    }
    Ok(Layout {
        segments,
        scan_start,
    })
}

fn encode_segment(code: u8, payload: &[u8]) -> Result<Vec<u8>, ChannelError> {
    if payload.len() > MAX_SEGMENT_PAYLOAD {
        return Err(ChannelError::PayloadTooLarge {
            size: payload.len(),
            limit: MAX_SEGMENT_PAYLOAD,
        });
    }
    let mut out = Vec::with_capacity(payload.len() + 4);
    out.extend_from_slice(&[0xFF, code]);
    out.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

/// Reassemble the file without the segments matched by `remove`, placing
/// `inserted` before the kept segment at the index chosen by `insert_at`.
fn rewrite(
    bytes: &[u8],
    remove: impl Fn(&JpegSegment<'_>) -> bool,
    insert_at: impl Fn(&[&JpegSegment<'_>]) -> usize,
    inserted: &[Vec<u8>],
) -> Result<Vec<u8>, ChannelError> {
    let layout = layout(bytes)?;
    let kept: Vec<&JpegSegment<'_>> = layout.segments.iter().filter(|s| !remove(*s)).collect();
    let index = insert_at(&kept).min(kept.len());

    let extra: usize = inserted.iter().map(Vec::len).sum();
    let mut out = Vec::with_capacity(bytes.len() + extra);
    out.extend_from_slice(&bytes[..2]);
    for segment in &kept[..index] {
        out.extend_from_slice(&bytes[segment.offset..segment.end()]);
    }
    for segment in inserted {
        out.extend_from_slice(segment);
    }
    for segment in &kept[index..] {
        out.extend_from_slice(&bytes[segment.offset..segment.end()]);
    }
    out.extend_from_slice(&bytes[layout.scan_start..]);
    Ok(out)
}

/// Index just past a leading APP0 (JFIF/JFXX) segment, if there is one.
fn after_app0(kept: &[&JpegSegment<'_>]) -> usize {
    usize::from(kept.first().is_some_and(|s| s.marker == marker::APP0))
}

fn is_credlink_box_segment(segment: &JpegSegment<'_>) -> bool {
    segment.marker == marker::APP11
        && segment.payload.starts_with(APP11_CI)
        && read_u16_be(segment.payload, 2) == Some(APP11_INSTANCE)
}

fn is_exif_segment(segment: &JpegSegment<'_>) -> bool {
    segment.marker == marker::APP1 && segment.payload.starts_with(exif::EXIF_HEADER)
}

fn is_xmp_segment(segment: &JpegSegment<'_>) -> bool {
    segment.marker == marker::APP1 && segment.payload.starts_with(XMP_NAMESPACE)
}

fn is_credlink_xmp_segment(segment: &JpegSegment<'_>) -> bool {
    is_xmp_segment(segment) && xmp::is_credlink_packet(&segment.payload[XMP_NAMESPACE.len()..])
}

pub fn write_jumbf(bytes: &[u8], payload: &Payload) -> Result<Vec<u8>, ChannelError> {
    let superbox = jumbf::encode(payload);
    let segments = superbox
        .chunks(MAX_BOX_FRAGMENT)
        .zip(1u32..)
        .map(|(fragment, sequence)| {
            let mut body = Vec::with_capacity(APP11_HEADER_LEN + fragment.len());
            body.extend_from_slice(APP11_CI);
            body.extend_from_slice(&APP11_INSTANCE.to_be_bytes());
            body.extend_from_slice(&sequence.to_be_bytes());
            body.extend_from_slice(fragment);
            encode_segment(marker::APP11, &body)
        })
        .collect::<Result<Vec<_>, _>>()?;

    rewrite(
        bytes,
        is_credlink_box_segment,
        |kept| {
            kept.iter()
                .position(|s| !marker::is_app(s.marker))
                .unwrap_or(kept.len())
        },
        &segments,
    )
}

pub fn read_jumbf(bytes: &[u8]) -> Option<Recovered> {
    let mut fragments: Vec<(u32, &[u8])> = jpeg_segments(bytes)
        .filter(is_credlink_box_segment)
        .filter_map(|s| Some((read_u32_be(s.payload, 4)?, s.payload.get(APP11_HEADER_LEN..)?)))
        .collect();
    if fragments.is_empty() {
        return None;
    }
    fragments.sort_by_key(|(sequence, _)| *sequence);
    let superbox: Vec<u8> = fragments.into_iter().flat_map(|(_, f)| f.iter().copied()).collect();
    jumbf::decode(&superbox)
}

pub fn write_exif(bytes: &[u8], payload: &Payload) -> Result<Vec<u8>, ChannelError> {
    let existing = layout(bytes)?
        .segments
        .into_iter()
        .find(is_exif_segment);
    let tiff = exif::upsert(
        existing.map(|s| &s.payload[exif::EXIF_HEADER.len()..]),
        payload,
    )?;

    let mut body = exif::EXIF_HEADER.to_vec();
    body.extend_from_slice(&tiff);
    let segment = encode_segment(marker::APP1, &body)?;

    let replaced = existing.map(|s| s.offset);
    rewrite(
        bytes,
        |s| Some(s.offset) == replaced,
        |kept| match replaced {
            Some(offset) => kept.iter().filter(|s| s.offset < offset).count(),
            None => after_app0(kept),
        },
        &[segment],
    )
}

pub fn read_exif(bytes: &[u8]) -> Option<Recovered> {
    jpeg_segments(bytes)
        .filter(is_exif_segment)
        .find_map(|s| exif::find_tag(&s.payload[exif::EXIF_HEADER.len()..]))
        .map(Recovered::tag_only)
}

pub fn write_xmp(bytes: &[u8], payload: &Payload) -> Result<Vec<u8>, ChannelError> {
    let packet = xmp::build_packet(payload);
    let mut body = XMP_NAMESPACE.to_vec();
    body.extend_from_slice(packet.as_bytes());
    let segment = encode_segment(marker::APP1, &body)?;

    rewrite(
        bytes,
        is_credlink_xmp_segment,
        |kept| match kept.iter().rposition(|s| is_exif_segment(s)) {
            Some(last_exif) => last_exif + 1,
            None => after_app0(kept),
        },
        &[segment],
    )
}

pub fn read_xmp(bytes: &[u8]) -> Option<Recovered> {
    jpeg_segments(bytes)
        .filter(is_xmp_segment)
        .find_map(|s| xmp::find_tag(&s.payload[XMP_NAMESPACE.len()..]))
        .map(Recovered::tag_only)
}
