//! Metadata extraction.
//!
//! Recovery walks a fixed chain of stages, each less trustworthy than the
//! last, and stops at the first one that yields a valid proof reference:
//!
//! ```text
//! identify -> structured (100) -> exif (90) -> xmp (80) -> partial (30..=50) -> none (0)
//! ```
//!
//! Stages read through the bounded iterators of [`crate::format`], so a
//! damaged container can only make a stage come up empty. When the format is
//! not recognized, the structured, EXIF and XMP stages also scan for their
//! region signatures anywhere in the buffer.

use std::sync::LazyLock;

use regex::bytes::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::channel::{exif, foreign_xmp_packets, jumbf, readers_for, xmp, ChannelKind, Recovered};
use crate::confidence::{score, ExtractionSource, MatchQuality};
use crate::config::EngineConfig;
use crate::format::{find_bytes, identify, read_u32_be, ImageFormat};
use crate::manifest::{Manifest, ManifestSummary};
use crate::tag::{proof_from_bytes, TAG_PREFIX_BYTES};

/// Tag prefix followed by a run of printable ASCII, stopping at characters
/// that close an attribute or element.
static TAG_RUN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?-u)CredLink:([\x20\x21\x23-\x3B\x3D-\x7E]*)").expect("tag regex is valid")
});

/// Bytes that end a tag written by one of the text-bearing channels.
const TERMINATORS: &[u8] = b"\0\"<\n\r";

/// Cap on signature hits examined per scan in an unidentified buffer.
const MAX_SIGNATURE_CANDIDATES: usize = 64;

/// Outcome of [`Extractor::extract`].
///
/// `proof_uri` is `None` exactly when `source` is `None`, which is exactly
/// when `confidence` is 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub proof_uri: Option<String>,
    pub source: ExtractionSource,
    /// 0-100
    pub confidence: u8,
    /// Recovered, but below the corruption threshold.
    pub corrupted: bool,
    /// Manifest carried by the structured region, when it decoded.
    pub manifest: Option<Manifest>,
    /// Title and creator recovered with the reference. Set whenever a
    /// structured region carried them, including compact regions without a
    /// manifest.
    pub summary: Option<ManifestSummary>,
    /// Container format as identified from the leading bytes.
    pub format: ImageFormat,
}

impl ExtractionResult {
    fn none(format: ImageFormat) -> Self {
        Self {
            proof_uri: None,
            source: ExtractionSource::None,
            confidence: 0,
            corrupted: false,
            manifest: None,
            summary: None,
            format,
        }
    }

    fn found(
        format: ImageFormat,
        source: ExtractionSource,
        quality: MatchQuality,
        recovered: Recovered,
    ) -> Self {
        let confidence = score(source, quality);
        let summary = recovered
            .summary
            .or_else(|| recovered.manifest.as_ref().map(Manifest::summary));
        Self {
            proof_uri: Some(recovered.proof_uri),
            source,
            confidence: confidence.value,
            corrupted: confidence.corrupted,
            manifest: recovered.manifest,
            summary,
            format,
        }
    }

    pub fn is_found(&self) -> bool {
        self.proof_uri.is_some()
    }
}

/// Recovers proof references from possibly damaged images.
#[derive(Debug, Clone, Default)]
pub struct Extractor {
    config: EngineConfig,
}

impl Extractor {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn from_env() -> Self {
        Self::new(EngineConfig::from_env())
    }

    /// Recover a proof reference from `bytes`.
    ///
    /// Never panics and never fails: input that yields nothing produces a
    /// result with source `None` and confidence 0.
    #[instrument(level = "debug", skip_all, fields(len = bytes.len(), format))]
    pub fn extract(&self, bytes: &[u8]) -> ExtractionResult {
        let format = identify(bytes);
        tracing::Span::current().record("format", tracing::field::display(format));

        for kind in [ChannelKind::Structured, ChannelKind::Exif, ChannelKind::Xmp] {
            if let Some(recovered) = self.stage(kind, format, bytes) {
                let result =
                    ExtractionResult::found(format, kind.source(), MatchQuality::Full, recovered);
                info!(
                    source = %result.source,
                    confidence = result.confidence,
                    "Proof reference recovered"
                );
                return result;
            }
            debug!(stage = %kind.source(), "Stage found nothing");
        }

        let window = &bytes[..bytes.len().min(self.config.max_partial_scan_bytes)];
        if let Some((quality, proof_uri)) = partial_scan(window) {
            let result = ExtractionResult::found(
                format,
                ExtractionSource::Partial,
                quality,
                Recovered::tag_only(proof_uri),
            );
            info!(
                confidence = result.confidence,
                corrupted = result.corrupted,
                "Proof reference recovered by raw scan"
            );
            return result;
        }

        info!("No proof reference found");
        ExtractionResult::none(format)
    }

    fn stage(&self, kind: ChannelKind, format: ImageFormat, bytes: &[u8]) -> Option<Recovered> {
        let found = readers_for(kind, format).find_map(|d| d.read(bytes));
        if found.is_some() {
            return found;
        }

        let found = match kind {
            ChannelKind::Xmp => foreign_xmp_packets(bytes)
                .into_iter()
                .find_map(xmp::find_tag)
                .map(Recovered::tag_only),
            _ => None,
        };
        if found.is_some() || format != ImageFormat::Unknown {
            return found;
        }

        debug!(stage = %kind.source(), "Unrecognized container, scanning for signatures");
        match kind {
            ChannelKind::Structured => jumbf::scan(bytes),
            ChannelKind::Exif => scan_tiff(bytes).map(Recovered::tag_only),
            ChannelKind::Xmp => xmp::scan_packets(bytes)
                .into_iter()
                .find_map(xmp::find_tag)
                .map(Recovered::tag_only),
        }
    }
}

/// Look for TIFF blocks anywhere in `bytes`, with or without the
/// `Exif\0\0` header.
fn scan_tiff(bytes: &[u8]) -> Option<String> {
    for signature in [&b"II*\0"[..], &b"MM\0*"[..]] {
        let mut from = 0;
        for _ in 0..MAX_SIGNATURE_CANDIDATES {
            let Some(pos) = find_bytes(bytes, signature, from) else {
                break;
            };
            if let Some(tag) = exif::find_tag(&bytes[pos..]) {
                return Some(tag);
            }
            from = pos + 1;
        }
    }
    None
}

/// Raw scan for the tag prefix, ignoring container structure.
///
/// Every occurrence is scored and the best one wins. A run is a full match
/// when a superbox header in front of it declares its length and the run
/// covers it, or when it ends at a terminator written by one of the text
/// channels. Otherwise it is truncated, with the fraction recovered known
/// only when the length was declared: an undeclared run that is cut off
/// scores the truncated floor (30) however long it is.
pub(crate) fn partial_scan(window: &[u8]) -> Option<(MatchQuality, String)> {
    let mut best: Option<(u8, MatchQuality, String)> = None;

    for captures in TAG_RUN.captures_iter(window) {
        let (Some(whole), Some(run)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        let mut run_bytes = run.as_bytes();
        let quality = match declared_uri_len(window, whole.start()) {
            Some(expected) if expected > 0 => {
                if run_bytes.len() >= expected {
                    run_bytes = &run_bytes[..expected];
                    MatchQuality::Full
                } else {
                    MatchQuality::Truncated(run_bytes.len() as f64 / expected as f64)
                }
            }
            _ => match window.get(run.end()) {
                Some(b) if TERMINATORS.contains(b) => MatchQuality::Full,
                _ => MatchQuality::Truncated(0.0),
            },
        };

        let Some(proof_uri) = proof_from_bytes(run_bytes) else {
            continue;
        };
        let value = score(ExtractionSource::Partial, quality).value;
        debug!(offset = whole.start(), confidence = value, "Raw tag candidate");
        if best.as_ref().map_or(true, |(v, _, _)| value > *v) {
            best = Some((value, quality, proof_uri));
        }
    }

    best.map(|(_, quality, uri)| (quality, uri))
}

/// Proof URI length declared by a tag box header directly before `prefix_at`.
fn declared_uri_len(window: &[u8], prefix_at: usize) -> Option<usize> {
    let header_at = prefix_at.checked_sub(8)?;
    if &window[header_at + 4..prefix_at] != jumbf::TAG_TYPE {
        return None;
    }
    let declared = read_u32_be(window, header_at)? as usize;
    declared.checked_sub(8 + TAG_PREFIX_BYTES.len())
}
