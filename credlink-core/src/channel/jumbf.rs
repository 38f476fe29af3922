//! Length-prefixed box container for the structured channels.
//!
//! Layout, modelled on JUMBF (ISO/IEC 19566-5):
//!
//! ```text
//! [LBox u32][jumb]                 superbox
//!   [LBox u32][jumd] label\0       description box, label = "credlink.proof"
//!   [LBox u32][clnk] tag           "CredLink:" + proof URI
//!   [LBox u32][cbor] manifest      optional, full manifest
//!   [LBox u32][json] summary       optional, title and creator
//! ```
//!
//! `LBox` counts the 8 header bytes. Box lengths are clamped to the
//! enclosing region before use.

use super::{Payload, Recovered};
use crate::format::{clamp_len, find_bytes, read_u32_be};
use crate::manifest::{Manifest, ManifestSummary};
use crate::tag::decode_tag;

pub const SUPERBOX_TYPE: &[u8; 4] = b"jumb";
pub const DESCRIPTION_TYPE: &[u8; 4] = b"jumd";
pub const TAG_TYPE: &[u8; 4] = b"clnk";
pub const MANIFEST_TYPE: &[u8; 4] = b"cbor";
pub const SUMMARY_TYPE: &[u8; 4] = b"json";
pub const LABEL: &[u8] = b"credlink.proof";

const HEADER_LEN: usize = 8;

/// A box found inside a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxRef<'a> {
    pub box_type: [u8; 4],
    pub content: &'a [u8],
    /// The declared length ran past the enclosing region.
    pub truncated: bool,
}

fn write_box(out: &mut Vec<u8>, box_type: &[u8; 4], content: &[u8]) {
    out.extend_from_slice(&((content.len() + HEADER_LEN) as u32).to_be_bytes());
    out.extend_from_slice(box_type);
    out.extend_from_slice(content);
}

/// Serialize a payload as a superbox.
pub fn encode(payload: &Payload) -> Vec<u8> {
    let mut label = LABEL.to_vec();
    label.push(0);

    let mut inner = Vec::new();
    write_box(&mut inner, DESCRIPTION_TYPE, &label);
    write_box(&mut inner, TAG_TYPE, payload.tag.as_bytes());
    if let Some(cbor) = &payload.manifest_cbor {
        write_box(&mut inner, MANIFEST_TYPE, cbor);
    }
    if payload.summary != ManifestSummary::default() {
        if let Ok(json) = serde_json::to_vec(&payload.summary) {
            write_box(&mut inner, SUMMARY_TYPE, &json);
        }
    }

    let mut out = Vec::with_capacity(inner.len() + HEADER_LEN);
    write_box(&mut out, SUPERBOX_TYPE, &inner);
    out
}

/// Iterate over the boxes laid end to end in `bytes`.
pub fn boxes(bytes: &[u8]) -> impl Iterator<Item = BoxRef<'_>> {
    let mut pos = 0usize;
    let mut done = false;
    std::iter::from_fn(move || {
        if done {
            return None;
        }
        let declared = read_u32_be(bytes, pos)? as usize;
        let type_bytes = bytes.get(pos + 4..pos + 8)?;
        if declared < HEADER_LEN {
            done = true;
            return None;
        }
        let start = pos + HEADER_LEN;
        let wanted = declared - HEADER_LEN;
        let available = clamp_len(wanted, bytes.len() - start);
        let truncated = available < wanted;
        if truncated {
            done = true;
        }
        pos = start + available;
        Some(BoxRef {
            box_type: [type_bytes[0], type_bytes[1], type_bytes[2], type_bytes[3]],
            content: &bytes[start..start + available],
            truncated,
        })
    })
}

/// Parse a CredLink superbox at the start of `bytes`.
pub fn decode(bytes: &[u8]) -> Option<Recovered> {
    let superbox = boxes(bytes).next()?;
    if &superbox.box_type != SUPERBOX_TYPE || superbox.truncated {
        return None;
    }

    let mut children = boxes(superbox.content);
    let description = children.next()?;
    if &description.box_type != DESCRIPTION_TYPE
        || description.content.split(|b| *b == 0).next() != Some(LABEL)
    {
        return None;
    }

    let mut proof_uri = None;
    let mut manifest = None;
    let mut summary = None;
    for child in children.filter(|b| !b.truncated) {
        match &child.box_type {
            t if t == TAG_TYPE && proof_uri.is_none() => proof_uri = decode_tag(child.content),
            t if t == MANIFEST_TYPE && manifest.is_none() => {
                manifest = Manifest::from_cbor(child.content).ok()
            }
            t if t == SUMMARY_TYPE && summary.is_none() => {
                summary = serde_json::from_slice::<ManifestSummary>(child.content).ok()
            }
            _ => {}
        }
    }

    Some(Recovered {
        proof_uri: proof_uri?,
        manifest,
        summary,
    })
}

/// Scan arbitrary bytes for a CredLink superbox, ignoring container structure.
pub fn scan(bytes: &[u8]) -> Option<Recovered> {
    let mut from = 0;
    while let Some(pos) = find_bytes(bytes, SUPERBOX_TYPE, from) {
        if pos >= 4 {
            if let Some(recovered) = decode(&bytes[pos - 4..]) {
                return Some(recovered);
            }
        }
        from = pos + 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ManifestBuilder;

    fn manifest() -> Manifest {
        ManifestBuilder::new(b"image")
            .with_title("Recovery Test")
            .with_creator("Test")
            .build()
    }

    #[test]
    fn test_encode_decode_full() {
        let m = manifest();
        let payload = Payload::full("https://proofs.example.com/abc123", &m).unwrap();
        let encoded = encode(&payload);
        assert_eq!(&encoded[4..8], SUPERBOX_TYPE);
        assert_eq!(read_u32_be(&encoded, 0), Some(encoded.len() as u32));

        let recovered = decode(&encoded).unwrap();
        assert_eq!(recovered.proof_uri, "https://proofs.example.com/abc123");
        assert_eq!(recovered.manifest, Some(m));
        assert_eq!(
            recovered.summary.and_then(|s| s.title).as_deref(),
            Some("Recovery Test")
        );
    }

    #[test]
    fn test_compact_has_no_manifest() {
        let payload = Payload::compact("urn:proof:1", &manifest());
        let recovered = decode(&encode(&payload)).unwrap();
        assert_eq!(recovered.proof_uri, "urn:proof:1");
        assert!(recovered.manifest.is_none());
        assert_eq!(
            recovered.summary,
            Some(ManifestSummary {
                title: Some("Recovery Test".into()),
                creator: Some("Test".into()),
            })
        );
    }

    #[test]
    fn test_empty_summary_is_not_written() {
        let bare = ManifestBuilder::new(b"image").build();
        let encoded = encode(&Payload::compact("urn:proof:1", &bare));
        assert!(!encoded.windows(4).any(|w| w == SUMMARY_TYPE));
        assert_eq!(decode(&encoded).unwrap().summary, None);
    }

    #[test]
    fn test_truncated_superbox_is_rejected() {
        let encoded = encode(&Payload::compact("urn:proof:1", &manifest()));
        for cut in [0, 3, 8, 20, encoded.len() - 1] {
            assert!(decode(&encoded[..cut]).is_none(), "cut at {cut}");
        }
    }

    #[test]
    fn test_wrong_label_is_rejected() {
        let mut inner = Vec::new();
        write_box(&mut inner, DESCRIPTION_TYPE, b"c2pa\0");
        write_box(&mut inner, TAG_TYPE, b"CredLink:abc");
        let mut superbox = Vec::new();
        write_box(&mut superbox, SUPERBOX_TYPE, &inner);
        assert!(decode(&superbox).is_none());
    }

    #[test]
    fn test_scan_finds_embedded_box() {
        let encoded = encode(&Payload::compact("urn:proof:7", &manifest()));
        let mut noise = b"jumb leading noise \x00\x00\x00\x01jumb".to_vec();
        noise.extend_from_slice(&encoded);
        noise.extend_from_slice(b"trailing");
        assert_eq!(scan(&noise).unwrap().proof_uri, "urn:proof:7");
        assert!(scan(b"no boxes here").is_none());
    }

    #[test]
    fn test_lying_child_length() {
        let mut inner = Vec::new();
        let mut label = LABEL.to_vec();
        label.push(0);
        write_box(&mut inner, DESCRIPTION_TYPE, &label);
        inner.extend_from_slice(&u32::MAX.to_be_bytes());
        inner.extend_from_slice(TAG_TYPE);
        inner.extend_from_slice(b"CredLink:abc");
        let mut superbox = Vec::new();
        write_box(&mut superbox, SUPERBOX_TYPE, &inner);
        assert!(decode(&superbox).is_none());
    }
}
