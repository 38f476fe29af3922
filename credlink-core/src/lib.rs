//! CredLink Core - provenance proof embedding and recovery for images
//!
//! This crate writes a reference to a content-provenance proof into JPEG, PNG
//! and WebP containers, and recovers it again from files that have been
//! re-encoded, stripped or truncated along the way.
//!
//! # Features
//!
//! - Redundant embedding: every format offers several independent channels
//!   (structured box, EXIF field, XMP packet), tried in priority order
//! - Graded recovery: structured (100), EXIF (90), XMP (80), raw byte scan
//!   (30-50), with a corruption flag below 75
//! - Bounded parsing: no in-container length field is trusted, and extraction
//!   never panics or errors on arbitrary input
//! - Size-bounded, decode-checked writes: output never grows past the
//!   configured ratio and always decodes at the original dimensions
//! - Store-assisted resolution by proof id, content hash or perceptual hash
//!
//! # Example
//!
//! ```
//! use credlink_core::{Embedder, EmbedStatus, ExtractionSource, Extractor, ManifestBuilder};
//! use image::{ImageBuffer, Rgb, RgbImage};
//!
//! let img: RgbImage = ImageBuffer::from_fn(256, 192, |x, y| {
//!     let v = x.wrapping_mul(2_654_435_761) ^ y.wrapping_mul(40_503);
//!     Rgb([(v >> 3) as u8, (v >> 11) as u8, (v >> 19) as u8])
//! });
//! let mut png = std::io::Cursor::new(Vec::new());
//! img.write_to(&mut png, image::ImageFormat::Png).unwrap();
//! let png = png.into_inner();
//!
//! let manifest = ManifestBuilder::new(&png)
//!     .with_title("Harbour at dawn")
//!     .with_creator("Jane Doe")
//!     .build();
//!
//! let outcome = Embedder::default().embed(&png, &manifest, "https://proofs.example.com/abc123");
//! assert_eq!(outcome.status, EmbedStatus::Embedded);
//!
//! let result = Extractor::default().extract(&outcome.bytes);
//! assert_eq!(result.proof_uri.as_deref(), Some("https://proofs.example.com/abc123"));
//! assert_eq!(result.source, ExtractionSource::Structured);
//! assert_eq!(result.confidence, 100);
//! assert_eq!(result.manifest, Some(manifest));
//! ```

pub mod channel;
pub mod codec;
pub mod confidence;
pub mod config;
pub mod embed;
pub mod error;
pub mod extract;
pub mod format;
pub mod manifest;
pub mod resolve;
pub mod soft_binding;
pub mod store;
pub mod tag;

// Re-export main types for convenience
pub use channel::{channels_for, ChannelDescriptor, ChannelError, ChannelId, ChannelKind};
pub use codec::{CodecError, DecodeReport, DescriptiveField, ImageCodec, StructuralCodec};
pub use confidence::{score, Confidence, ExtractionSource, MatchQuality};
pub use config::EngineConfig;
pub use embed::{EmbedOutcome, EmbedStatus, Embedder, SkippedChannel};
pub use error::{CredLinkError, Result};
pub use extract::{ExtractionResult, Extractor};
pub use format::{identify, ImageFormat};
pub use manifest::{content_hash, sanitize_text, Manifest, ManifestBuilder, ManifestSummary};
pub use resolve::{Resolution, ResolutionMethod, Resolver};
pub use soft_binding::{hamming_distance, PerceptualHash};
pub use store::{MemoryProofStore, ProofInput, ProofRecord, ProofStore, StoreError};
pub use tag::{encode_tag, validate_proof_uri, TAG_PREFIX};

#[cfg(feature = "image-codec")]
pub use codec::ImageCrateCodec;

// Perceptual hashing exports (soft binding)
#[cfg(feature = "perceptual-hash")]
pub use soft_binding::BlockhashHasher;
