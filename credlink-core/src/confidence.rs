//! Confidence scoring for recovered proof references.
//!
//! Maps the extraction stage that produced a match, and how intact that
//! match was, to a 0-100 score. Pure and independent of byte parsing.

use serde::{Deserialize, Serialize};

/// Score for a match in a format-native structured region.
pub const STRUCTURED_CONFIDENCE: u8 = 100;
/// Score for a match in a descriptive EXIF field.
pub const EXIF_CONFIDENCE: u8 = 90;
/// Score for a match inside an XMP packet.
pub const XMP_CONFIDENCE: u8 = 80;
/// Score for a complete tag found by the raw byte scan.
pub const PARTIAL_FULL_CONFIDENCE: u8 = 50;
/// Floor of the band used for truncated raw-scan matches.
pub const PARTIAL_TRUNCATED_FLOOR: u8 = 30;
/// Results scoring below this are flagged as corrupted.
pub const CORRUPTION_THRESHOLD: u8 = 75;

/// Where a proof reference was recovered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionSource {
    /// Format-native structured region (APP11 box, PNG text chunk, RIFF chunk).
    Structured,
    /// Descriptive EXIF field.
    Exif,
    /// XMP packet.
    Xmp,
    /// Raw byte scan ignoring container structure.
    Partial,
    /// Nothing recovered.
    None,
}

impl std::fmt::Display for ExtractionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Structured => "structured",
            Self::Exif => "exif",
            Self::Xmp => "xmp",
            Self::Partial => "partial",
            Self::None => "none",
        };
        f.write_str(s)
    }
}

/// How much of the expected tag a match recovered.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatchQuality {
    /// The whole tag was recovered.
    Full,
    /// Fraction of the expected tag recovered before a read boundary or
    /// mismatch, in `[0, 1)`.
    Truncated(f64),
}

/// A confidence score together with the corruption flag derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confidence {
    pub value: u8,
    pub corrupted: bool,
}

/// Score a match.
///
/// Structured, EXIF and XMP matches are always full matches; a `Truncated`
/// quality for them is scored as `Full`. Partial matches land in `[30, 50]`:
/// 50 for a full tag, `30 + floor(20 * q)` (at most 49) for a truncated one.
pub fn score(source: ExtractionSource, quality: MatchQuality) -> Confidence {
    let value = match source {
        ExtractionSource::Structured => STRUCTURED_CONFIDENCE,
        ExtractionSource::Exif => EXIF_CONFIDENCE,
        ExtractionSource::Xmp => XMP_CONFIDENCE,
        ExtractionSource::Partial => match quality {
            MatchQuality::Full => PARTIAL_FULL_CONFIDENCE,
            MatchQuality::Truncated(q) => {
                let q = if q.is_finite() { q.clamp(0.0, 1.0) } else { 0.0 };
                let band = f64::from(PARTIAL_FULL_CONFIDENCE - PARTIAL_TRUNCATED_FLOOR);
                let scaled = PARTIAL_TRUNCATED_FLOOR + (band * q).floor() as u8;
                scaled.min(PARTIAL_FULL_CONFIDENCE - 1)
            }
        },
        ExtractionSource::None => 0,
    };

    Confidence {
        value,
        corrupted: source != ExtractionSource::None && value < CORRUPTION_THRESHOLD,
    }
}
