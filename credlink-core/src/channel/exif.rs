//! Minimal TIFF/EXIF reading and in-place field upserts.
//!
//! Only IFD0 is ever rewritten. An upsert leaves the bytes of every entry it
//! keeps where they are, appends the new field values and a new IFD0, and
//! repoints the header at the new IFD0. Offsets held by existing entries
//! (sub-IFDs, thumbnails, long values) therefore remain valid. Values it
//! replaces are zeroed, and superseded regions left at the end of the block
//! are dropped, so signing the same block again does not grow it.

use std::cmp::Reverse;
use std::ops::Range;

use super::{ChannelError, Payload};
use crate::tag::decode_tag;

/// Prefix of an EXIF block inside a JPEG APP1 segment (and optionally a
/// WebP `EXIF` chunk).
pub const EXIF_HEADER: &[u8] = b"Exif\0\0";

pub const TAG_IMAGE_DESCRIPTION: u16 = 0x010E;
pub const TAG_SOFTWARE: u16 = 0x0131;
pub const TAG_ARTIST: u16 = 0x013B;
pub const TAG_EXIF_IFD: u16 = 0x8769;
pub const TAG_USER_COMMENT: u16 = 0x9286;

const TYPE_ASCII: u16 = 2;
const TYPE_LONG: u16 = 4;
const TYPE_UNDEFINED: u16 = 7;
const TYPE_IFD: u16 = 13;

const SOFTWARE_NAME: &str = "CredLink";
const ENTRY_LEN: usize = 12;

/// Tags a TIFF written from scratch by this module may contain.
const OWNED_TAGS: &[u16] = &[TAG_IMAGE_DESCRIPTION, TAG_SOFTWARE, TAG_ARTIST];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    fn u16(self, bytes: &[u8], offset: usize) -> Option<u16> {
        let b = bytes.get(offset..offset.checked_add(2)?)?;
        Some(match self {
            Self::Little => u16::from_le_bytes([b[0], b[1]]),
            Self::Big => u16::from_be_bytes([b[0], b[1]]),
        })
    }

    fn u32(self, bytes: &[u8], offset: usize) -> Option<u32> {
        let b = bytes.get(offset..offset.checked_add(4)?)?;
        let arr = [b[0], b[1], b[2], b[3]];
        Some(match self {
            Self::Little => u32::from_le_bytes(arr),
            Self::Big => u32::from_be_bytes(arr),
        })
    }

    fn put_u16(self, out: &mut Vec<u8>, value: u16) {
        match self {
            Self::Little => out.extend_from_slice(&value.to_le_bytes()),
            Self::Big => out.extend_from_slice(&value.to_be_bytes()),
        }
    }

    fn put_u32(self, out: &mut Vec<u8>, value: u32) {
        match self {
            Self::Little => out.extend_from_slice(&value.to_le_bytes()),
            Self::Big => out.extend_from_slice(&value.to_be_bytes()),
        }
    }

    fn u32_bytes(self, value: u32) -> [u8; 4] {
        match self {
            Self::Little => value.to_le_bytes(),
            Self::Big => value.to_be_bytes(),
        }
    }
}

/// One IFD entry, with its 4-byte value/offset field kept raw.
#[derive(Debug, Clone, Copy)]
struct Entry {
    tag: u16,
    field_type: u16,
    count: u32,
    raw: [u8; 4],
}

#[derive(Debug)]
struct Ifd {
    entries: Vec<Entry>,
    next: u32,
}

fn header(tiff: &[u8]) -> Option<(ByteOrder, usize)> {
    let order = match tiff.get(0..2)? {
        b"II" => ByteOrder::Little,
        b"MM" => ByteOrder::Big,
        _ => return None,
    };
    if order.u16(tiff, 2)? != 42 {
        return None;
    }
    Some((order, order.u32(tiff, 4)? as usize))
}

fn read_ifd(tiff: &[u8], order: ByteOrder, offset: usize) -> Option<Ifd> {
    let declared = order.u16(tiff, offset)? as usize;
    let room = tiff.len().saturating_sub(offset + 2) / ENTRY_LEN;
    let count = declared.min(room);

    let entries = (0..count)
        .filter_map(|i| {
            let at = offset + 2 + i * ENTRY_LEN;
            let raw = tiff.get(at + 8..at + 12)?;
            Some(Entry {
                tag: order.u16(tiff, at)?,
                field_type: order.u16(tiff, at + 2)?,
                count: order.u32(tiff, at + 4)?,
                raw: [raw[0], raw[1], raw[2], raw[3]],
            })
        })
        .collect();
    let next = order.u32(tiff, offset + 2 + count * ENTRY_LEN).unwrap_or(0);
    Some(Ifd { entries, next })
}

fn type_size(field_type: u16) -> Option<usize> {
    match field_type {
        1 | 2 | 6 | 7 => Some(1),
        3 | 8 => Some(2),
        4 | 9 | 11 | 13 => Some(4),
        5 | 10 | 12 => Some(8),
        _ => None,
    }
}

/// Value bytes of an entry, or `None` when they lie outside the buffer.
fn entry_value<'a>(tiff: &'a [u8], order: ByteOrder, entry: &'a Entry) -> Option<&'a [u8]> {
    let size = type_size(entry.field_type)?.checked_mul(entry.count as usize)?;
    if size <= 4 {
        return Some(&entry.raw[..size]);
    }
    let offset = order.u32(&entry.raw, 0)? as usize;
    tiff.get(offset..offset.checked_add(size)?)
}

/// Byte range of a value stored outside its entry, when it lies inside the
/// block and past the header.
fn value_range(tiff: &[u8], order: ByteOrder, entry: &Entry) -> Option<Range<usize>> {
    let size = type_size(entry.field_type)?.checked_mul(entry.count as usize)?;
    if size <= 4 {
        return None;
    }
    let start = order.u32(&entry.raw, 0)? as usize;
    let end = start.checked_add(size)?;
    (start >= 8 && end <= tiff.len()).then_some(start..end)
}

fn text_tag(value: &[u8]) -> Option<String> {
    let text = value.split(|b| *b == 0).next()?;
    decode_tag(text)
}

/// Find a CredLink tag in the descriptive fields of a TIFF block.
///
/// Looks at every ASCII or UNDEFINED entry of IFD0 and of the EXIF sub-IFD
/// it points to. UserComment values have their 8-byte character code
/// header skipped.
pub fn find_tag(tiff: &[u8]) -> Option<String> {
    let (order, ifd0_offset) = header(tiff)?;
    let ifd0 = read_ifd(tiff, order, ifd0_offset)?;

    let mut sub_ifd = None;
    for entry in &ifd0.entries {
        if entry.tag == TAG_EXIF_IFD && matches!(entry.field_type, TYPE_LONG | TYPE_IFD) {
            sub_ifd = order.u32(&entry.raw, 0).map(|o| o as usize);
            continue;
        }
        if !matches!(entry.field_type, TYPE_ASCII | TYPE_UNDEFINED) {
            continue;
        }
        if let Some(tag) = entry_value(tiff, order, entry).and_then(text_tag) {
            return Some(tag);
        }
    }

    let exif_ifd = read_ifd(tiff, order, sub_ifd?)?;
    exif_ifd
        .entries
        .iter()
        .filter(|e| matches!(e.field_type, TYPE_ASCII | TYPE_UNDEFINED))
        .find_map(|entry| {
            let value = entry_value(tiff, order, entry)?;
            let value = if entry.tag == TAG_USER_COMMENT {
                value.get(8..)?
            } else {
                value
            };
            text_tag(value)
        })
}

/// Strip the `Exif\0\0` prefix some containers put in front of the TIFF.
pub fn strip_exif_header(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(EXIF_HEADER).unwrap_or(bytes)
}

/// Whether a TIFF block holds nothing but fields this module writes.
pub fn is_owned(tiff: &[u8]) -> bool {
    let Some((order, offset)) = header(tiff) else {
        return false;
    };
    read_ifd(tiff, order, offset).is_some_and(|ifd| {
        ifd.next == 0 && ifd.entries.iter().all(|e| OWNED_TAGS.contains(&e.tag))
    })
}

/// A little-endian TIFF with an empty IFD0.
fn empty_tiff() -> Vec<u8> {
    let mut tiff = b"II*\0".to_vec();
    tiff.extend_from_slice(&8u32.to_le_bytes());
    tiff.extend_from_slice(&0u16.to_le_bytes());
    tiff.extend_from_slice(&0u32.to_le_bytes());
    tiff
}

fn ascii(value: &str) -> Vec<u8> {
    let mut bytes = value.as_bytes().to_vec();
    bytes.push(0);
    bytes
}

/// Write the payload's descriptive fields into a TIFF block.
///
/// `existing` of `None`, or a block that only holds fields written here
/// before, produces a fresh TIFF. A foreign block is upserted: its other
/// entries are kept and ImageDescription (and Artist, when the payload
/// names a creator) are replaced. Software is added only when absent.
pub fn upsert(existing: Option<&[u8]>, payload: &Payload) -> Result<Vec<u8>, ChannelError> {
    let base = match existing {
        Some(tiff) if !is_owned(tiff) => tiff.to_vec(),
        _ => empty_tiff(),
    };
    let (order, ifd0_offset) =
        header(&base).ok_or_else(|| ChannelError::Malformed("unrecognized TIFF header".into()))?;
    let ifd0 = read_ifd(&base, order, ifd0_offset)
        .ok_or_else(|| ChannelError::Malformed("IFD0 lies outside the TIFF block".into()))?;

    // Software goes first so the values replaced on every signing end up
    // last in the block
    let mut replaced: Vec<(u16, Vec<u8>)> = Vec::with_capacity(3);
    if !ifd0.entries.iter().any(|e| e.tag == TAG_SOFTWARE) {
        replaced.push((TAG_SOFTWARE, ascii(SOFTWARE_NAME)));
    }
    replaced.push((TAG_IMAGE_DESCRIPTION, ascii(&payload.tag)));
    if let Some(creator) = &payload.summary.creator {
        replaced.push((TAG_ARTIST, ascii(creator)));
    }

    let is_replaced = |entry: &Entry| replaced.iter().any(|(tag, _)| *tag == entry.tag);
    let mut entries: Vec<Entry> = ifd0
        .entries
        .iter()
        .filter(|e| !is_replaced(*e))
        .copied()
        .collect();

    let mut out = base;
    let mut superseded: Vec<Range<usize>> = ifd0
        .entries
        .iter()
        .filter(|e| is_replaced(*e))
        .filter_map(|e| value_range(&out, order, e))
        .collect();
    for range in &superseded {
        out[range.clone()].fill(0);
    }
    let ifd0_end = ifd0_offset + 2 + ifd0.entries.len() * ENTRY_LEN + 4;
    superseded.push(ifd0_offset..ifd0_end.min(out.len()));
    release_tail(&mut out, superseded);

    for (tag, value) in &replaced {
        let count = u32::try_from(value.len()).map_err(|_| too_large(value.len()))?;
        let raw = if value.len() <= 4 {
            let mut raw = [0u8; 4];
            raw[..value.len()].copy_from_slice(value);
            raw
        } else {
            pad_to_word(&mut out);
            let offset = u32::try_from(out.len()).map_err(|_| too_large(out.len()))?;
            out.extend_from_slice(value);
            order.u32_bytes(offset)
        };
        entries.push(Entry {
            tag: *tag,
            field_type: TYPE_ASCII,
            count,
            raw,
        });
    }
    entries.sort_by_key(|e| e.tag);

    let entry_count = u16::try_from(entries.len())
        .map_err(|_| ChannelError::Malformed("too many IFD0 entries".into()))?;
    pad_to_word(&mut out);
    let new_ifd0 = u32::try_from(out.len()).map_err(|_| too_large(out.len()))?;
    order.put_u16(&mut out, entry_count);
    for entry in &entries {
        order.put_u16(&mut out, entry.tag);
        order.put_u16(&mut out, entry.field_type);
        order.put_u32(&mut out, entry.count);
        out.extend_from_slice(&entry.raw);
    }
    order.put_u32(&mut out, ifd0.next);
    out[4..8].copy_from_slice(&order.u32_bytes(new_ifd0));
    Ok(out)
}

/// Truncate `tiff` through the superseded regions that end it, allowing a
/// zero pad byte after each.
fn release_tail(tiff: &mut Vec<u8>, mut regions: Vec<Range<usize>>) {
    regions.sort_by_key(|r| Reverse(r.start));
    for region in regions {
        if region.start < 8 {
            break;
        }
        let tail = tiff.get(region.end.min(tiff.len())..).unwrap_or_default();
        if tail.len() > 1 || tail.iter().any(|b| *b != 0) {
            break;
        }
        tiff.truncate(region.start);
    }
}

fn pad_to_word(out: &mut Vec<u8>) {
    if out.len() % 2 == 1 {
        out.push(0);
    }
}

fn too_large(size: usize) -> ChannelError {
    ChannelError::PayloadTooLarge {
        size,
        limit: u32::MAX as usize,
    }
}
