//! Embedding channels and the per-format priority table.
//!
//! A channel is one physical place in a container where the proof tag can
//! live. Each channel knows how to write its region (replacing any region it
//! wrote before) and how to read it back. The order in which channels are
//! tried is data, not control flow: see [`channels_for`].

pub(crate) mod exif;
mod jpeg;
pub(crate) mod jumbf;
mod png;
mod webp;
pub(crate) mod xmp;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::confidence::ExtractionSource;
use crate::format::ImageFormat;
use crate::manifest::{Manifest, ManifestSummary};
use crate::tag::encode_tag;

/// Per-channel limit (in characters) for title and creator copies written to
/// EXIF and XMP. The structured channel always carries the full manifest.
pub const TEXT_FIELD_LIMIT: usize = 1024;

/// Identifies a concrete embedding channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelId {
    /// APP11 segments carrying a `jumb` superbox.
    JpegJumbf,
    /// ImageDescription field of the APP1 EXIF block.
    JpegExif,
    /// APP1 XMP packet.
    JpegXmp,
    /// Uncompressed `iTXt` chunk before the image data.
    PngText,
    /// `eXIf` chunk before the image data.
    PngExif,
    /// Custom `CLNK` RIFF chunk.
    WebpChunk,
    /// Existing `EXIF` RIFF chunk.
    WebpExif,
    /// Description field written through the codec's own metadata support,
    /// tried only when no channel above could be written.
    CodecDescription,
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::JpegJumbf => "jpeg-jumbf",
            Self::JpegExif => "jpeg-exif",
            Self::JpegXmp => "jpeg-xmp",
            Self::PngText => "png-text",
            Self::PngExif => "png-exif",
            Self::WebpChunk => "webp-chunk",
            Self::WebpExif => "webp-exif",
            Self::CodecDescription => "codec-description",
        };
        f.write_str(s)
    }
}

/// Class of region a channel writes, which fixes its extraction confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Structured,
    Exif,
    Xmp,
}

impl ChannelKind {
    pub fn source(&self) -> ExtractionSource {
        match self {
            Self::Structured => ExtractionSource::Structured,
            Self::Exif => ExtractionSource::Exif,
            Self::Xmp => ExtractionSource::Xmp,
        }
    }
}

/// Why a channel did not produce output.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ChannelError {
    /// The channel does not apply to this container as it stands.
    #[error("channel not applicable: {0}")]
    NotApplicable(String),

    /// The container structure could not be walked safely.
    #[error("malformed container: {0}")]
    Malformed(String),

    /// The region would not fit in the container's length fields.
    #[error("payload of {size} bytes exceeds region limit of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },

    /// Writing would break the size growth bound.
    #[error("output of {size} bytes exceeds size limit of {limit} bytes")]
    SizeExceeded { size: usize, limit: usize },

    /// The written container no longer decodes as the same image.
    #[error("post-write decode check failed: {0}")]
    DecodeCheckFailed(String),

    /// The proof reference cannot be embedded.
    #[error("invalid proof reference: {0}")]
    InvalidProofUri(String),
}

/// A proof reference recovered from one region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recovered {
    pub proof_uri: String,
    pub manifest: Option<Manifest>,
    /// Title and creator box of a structured region.
    pub summary: Option<ManifestSummary>,
}

impl Recovered {
    pub(crate) fn tag_only(proof_uri: String) -> Self {
        Self {
            proof_uri,
            manifest: None,
            summary: None,
        }
    }
}

/// Everything a channel may write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    /// `"CredLink:" + proof_uri`
    pub tag: String,
    /// CBOR-encoded full manifest; `None` for the compact form.
    pub manifest_cbor: Option<Vec<u8>>,
    /// Title and creator, bounded to [`TEXT_FIELD_LIMIT`] characters.
    pub summary: ManifestSummary,
}

impl Payload {
    /// Full payload: tag plus the complete manifest.
    pub fn full(proof_uri: &str, manifest: &Manifest) -> crate::error::Result<Self> {
        Ok(Self {
            tag: encode_tag(proof_uri),
            manifest_cbor: Some(manifest.to_cbor()?),
            summary: bounded_summary(manifest),
        })
    }

    /// Compact payload: tag plus title and creator only.
    pub fn compact(proof_uri: &str, manifest: &Manifest) -> Self {
        Self {
            tag: encode_tag(proof_uri),
            manifest_cbor: None,
            summary: bounded_summary(manifest),
        }
    }

    pub fn is_compact(&self) -> bool {
        self.manifest_cbor.is_none()
    }
}

fn bounded_summary(manifest: &Manifest) -> ManifestSummary {
    let bound = |s: &Option<String>| s.as_ref().map(|v| v.chars().take(TEXT_FIELD_LIMIT).collect());
    ManifestSummary {
        title: bound(&manifest.title),
        creator: bound(&manifest.creator),
    }
}

type WriteFn = fn(&[u8], &Payload) -> Result<Vec<u8>, ChannelError>;
type ReadFn = fn(&[u8]) -> Option<Recovered>;

/// One entry of the channel priority table.
#[derive(Clone, Copy)]
pub struct ChannelDescriptor {
    pub id: ChannelId,
    pub kind: ChannelKind,
    pub format: ImageFormat,
    write: WriteFn,
    read: ReadFn,
}

impl ChannelDescriptor {
    /// Write this channel's region into `bytes`.
    pub fn write(&self, bytes: &[u8], payload: &Payload) -> Result<Vec<u8>, ChannelError> {
        (self.write)(bytes, payload)
    }

    /// Read this channel's region from `bytes`.
    pub fn read(&self, bytes: &[u8]) -> Option<Recovered> {
        (self.read)(bytes)
    }
}

impl std::fmt::Debug for ChannelDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelDescriptor")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("format", &self.format)
            .finish()
    }
}

const JPEG_CHANNELS: &[ChannelDescriptor] = &[
    ChannelDescriptor {
        id: ChannelId::JpegJumbf,
        kind: ChannelKind::Structured,
        format: ImageFormat::Jpeg,
        write: jpeg::write_jumbf,
        read: jpeg::read_jumbf,
    },
    ChannelDescriptor {
        id: ChannelId::JpegExif,
        kind: ChannelKind::Exif,
        format: ImageFormat::Jpeg,
        write: jpeg::write_exif,
        read: jpeg::read_exif,
    },
    ChannelDescriptor {
        id: ChannelId::JpegXmp,
        kind: ChannelKind::Xmp,
        format: ImageFormat::Jpeg,
        write: jpeg::write_xmp,
        read: jpeg::read_xmp,
    },
];

const PNG_CHANNELS: &[ChannelDescriptor] = &[
    ChannelDescriptor {
        id: ChannelId::PngText,
        kind: ChannelKind::Structured,
        format: ImageFormat::Png,
        write: png::write_text,
        read: png::read_text,
    },
    ChannelDescriptor {
        id: ChannelId::PngExif,
        kind: ChannelKind::Exif,
        format: ImageFormat::Png,
        write: png::write_exif,
        read: png::read_exif,
    },
];

const WEBP_CHANNELS: &[ChannelDescriptor] = &[
    ChannelDescriptor {
        id: ChannelId::WebpChunk,
        kind: ChannelKind::Structured,
        format: ImageFormat::WebP,
        write: webp::write_chunk,
        read: webp::read_chunk,
    },
    ChannelDescriptor {
        id: ChannelId::WebpExif,
        kind: ChannelKind::Exif,
        format: ImageFormat::WebP,
        write: webp::write_exif,
        read: webp::read_exif,
    },
];

/// Channel priority table: format to channels, highest confidence first.
pub const CHANNEL_TABLE: &[(ImageFormat, &[ChannelDescriptor])] = &[
    (ImageFormat::Jpeg, JPEG_CHANNELS),
    (ImageFormat::Png, PNG_CHANNELS),
    (ImageFormat::WebP, WEBP_CHANNELS),
];

/// Channels for a format in priority order; empty for unknown formats.
pub fn channels_for(format: ImageFormat) -> &'static [ChannelDescriptor] {
    CHANNEL_TABLE
        .iter()
        .find(|(f, _)| *f == format)
        .map(|(_, channels)| *channels)
        .unwrap_or(&[])
}

/// Readers of one kind, the given format's first and the other formats'
/// after it, so a converted or misidentified file is still examined.
pub(crate) fn readers_for(
    kind: ChannelKind,
    format: ImageFormat,
) -> impl Iterator<Item = &'static ChannelDescriptor> {
    let preferred = channels_for(format).iter().filter(move |d| d.kind == kind);
    let others = CHANNEL_TABLE
        .iter()
        .filter(move |(f, _)| *f != format)
        .flat_map(|(_, channels)| channels.iter())
        .filter(move |d| d.kind == kind);
    preferred.chain(others)
}

/// Readers for kinds that have no writer in the table.
///
/// XMP packets are only written to JPEG, but PNG (`iTXt`) and WebP (`XMP `)
/// containers converted by other tools may still carry one.
pub(crate) fn foreign_xmp_packets(bytes: &[u8]) -> Vec<&[u8]> {
    let mut packets = png::xmp_packets(bytes);
    packets.extend(webp::xmp_packets(bytes));
    packets
}
