//! Metadata embedding.
//!
//! [`Embedder::embed`] writes the proof tag into every channel the container
//! format offers, in the priority order of [`channels_for`]. Each write is
//! checked before it is kept: the output must stay within the size bound,
//! identify as the same format and decode at the same dimensions. A channel
//! that fails any check is skipped and the next one is tried against the last
//! accepted buffer. When none of them can be written, the codec's own
//! descriptive-field support gets one try, under the same checks.
//!
//! Embedding never panics and never returns an error. Failures are reported
//! through [`EmbedOutcome::status`] and [`EmbedOutcome::skipped`], with the
//! original bytes handed back unchanged.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::channel::{channels_for, ChannelDescriptor, ChannelError, ChannelId, ChannelKind, Payload};
use crate::codec::{CodecError, DecodeReport, DescriptiveField, ImageCodec, StructuralCodec};
use crate::config::EngineConfig;
use crate::format::{identify, ImageFormat};
use crate::manifest::Manifest;
use crate::tag::validate_proof_uri;

/// Overall result of an embed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedStatus {
    /// At least one channel was written.
    Embedded,
    /// The container format is not supported; bytes are unchanged.
    Unsupported,
    /// No channel could be written; bytes are unchanged.
    Failed,
}

/// A channel that was attempted and not written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedChannel {
    pub channel: ChannelId,
    pub reason: ChannelError,
}

/// Output of [`Embedder::embed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedOutcome {
    /// Embedded image, or the original bytes unless `status` is `Embedded`.
    pub bytes: Vec<u8>,
    pub status: EmbedStatus,
    /// Container format of the input.
    pub format: ImageFormat,
    /// Channels written, in the order they were written.
    pub channels_written: Vec<ChannelId>,
    pub skipped: Vec<SkippedChannel>,
}

impl EmbedOutcome {
    fn unchanged(original: &[u8], format: ImageFormat, status: EmbedStatus) -> Self {
        Self {
            bytes: original.to_vec(),
            status,
            format,
            channels_written: Vec::new(),
            skipped: Vec::new(),
        }
    }

    pub fn is_embedded(&self) -> bool {
        self.status == EmbedStatus::Embedded
    }
}

/// Writes proof references into image containers.
///
/// Stateless apart from its configuration; share one instance freely across
/// threads.
#[derive(Debug, Clone)]
pub struct Embedder<C> {
    codec: C,
    config: EngineConfig,
}

#[cfg(feature = "image-codec")]
impl Default for Embedder<crate::codec::ImageCrateCodec> {
    fn default() -> Self {
        Self::new(crate::codec::ImageCrateCodec, EngineConfig::default())
    }
}

#[cfg(feature = "image-codec")]
impl Embedder<crate::codec::ImageCrateCodec> {
    /// Embedder using the `image` crate codec and configuration from the
    /// environment.
    pub fn from_env() -> Self {
        Self::new(crate::codec::ImageCrateCodec, EngineConfig::from_env())
    }
}

impl<C: ImageCodec> Embedder<C> {
    pub fn new(codec: C, config: EngineConfig) -> Self {
        Self { codec, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Embed `proof_uri` and `manifest` into every channel of the input's
    /// format.
    pub fn embed(&self, original: &[u8], manifest: &Manifest, proof_uri: &str) -> EmbedOutcome {
        self.embed_channels(original, manifest, proof_uri, |_| true)
    }

    /// Embed into the listed channels only (still in priority order).
    pub fn embed_with_channels(
        &self,
        original: &[u8],
        manifest: &Manifest,
        proof_uri: &str,
        channels: &[ChannelId],
    ) -> EmbedOutcome {
        self.embed_channels(original, manifest, proof_uri, |id| channels.contains(&id))
    }

    #[instrument(level = "debug", skip_all, fields(len = original.len(), format))]
    fn embed_channels(
        &self,
        original: &[u8],
        manifest: &Manifest,
        proof_uri: &str,
        selected: impl Fn(ChannelId) -> bool,
    ) -> EmbedOutcome {
        let format = identify(original);
        tracing::Span::current().record("format", tracing::field::display(format));

        let channels: Vec<&ChannelDescriptor> = channels_for(format)
            .iter()
            .filter(|d| selected(d.id))
            .collect();

        if let Err(e) = validate_proof_uri(proof_uri) {
            warn!(error = %e, "Refusing to embed invalid proof reference");
            let mut outcome = EmbedOutcome::unchanged(original, format, EmbedStatus::Failed);
            outcome.skipped = channels
                .iter()
                .map(|d| SkippedChannel {
                    channel: d.id,
                    reason: ChannelError::InvalidProofUri(e.to_string()),
                })
                .collect();
            return outcome;
        }

        if format == ImageFormat::Unknown {
            info!("Unsupported container format, returning input unchanged");
            return EmbedOutcome::unchanged(original, format, EmbedStatus::Unsupported);
        }

        let baseline = self.checker().decode(original);
        if !baseline.valid {
            warn!("Original image does not decode, nothing written");
            let mut outcome = EmbedOutcome::unchanged(original, format, EmbedStatus::Failed);
            outcome.skipped = channels
                .iter()
                .map(|d| SkippedChannel {
                    channel: d.id,
                    reason: ChannelError::DecodeCheckFailed("original does not decode".into()),
                })
                .collect();
            return outcome;
        }

        let compact = Payload::compact(proof_uri, manifest);
        let full = match Payload::full(proof_uri, manifest) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Manifest serialization failed, using compact payload");
                compact.clone()
            }
        };
        let limit = self.config.size_limit(original.len());

        let mut current = original.to_vec();
        let mut written = Vec::new();
        let mut skipped = Vec::new();

        for descriptor in channels {
            debug!(channel = %descriptor.id, "Attempting channel");
            let result = if descriptor.kind == ChannelKind::Structured {
                match self.attempt(descriptor, &current, &full, limit, format, &baseline) {
                    Err(ChannelError::SizeExceeded { .. } | ChannelError::PayloadTooLarge { .. })
                        if !full.is_compact() =>
                    {
                        debug!(channel = %descriptor.id, "Full manifest does not fit, retrying compact");
                        self.attempt(descriptor, &current, &compact, limit, format, &baseline)
                    }
                    result => result,
                }
            } else {
                self.attempt(descriptor, &current, &compact, limit, format, &baseline)
            };

            match result {
                Ok(bytes) => {
                    debug!(channel = %descriptor.id, size = bytes.len(), "Channel written");
                    current = bytes;
                    written.push(descriptor.id);
                }
                Err(reason) => {
                    warn!(channel = %descriptor.id, reason = %reason, "Channel skipped");
                    skipped.push(SkippedChannel {
                        channel: descriptor.id,
                        reason,
                    });
                }
            }
        }

        if written.is_empty() && selected(ChannelId::CodecDescription) {
            match self.codec_fallback(&current, &compact.tag, limit, format, &baseline) {
                Ok(Some(bytes)) => {
                    debug!(size = bytes.len(), "Tag written through codec metadata");
                    current = bytes;
                    written.push(ChannelId::CodecDescription);
                }
                Ok(None) => {}
                Err(reason) => {
                    warn!(reason = %reason, "Codec metadata fallback skipped");
                    skipped.push(SkippedChannel {
                        channel: ChannelId::CodecDescription,
                        reason,
                    });
                }
            }
        }

        let status = if written.is_empty() {
            EmbedStatus::Failed
        } else {
            EmbedStatus::Embedded
        };
        info!(
            status = ?status,
            written = written.len(),
            skipped = skipped.len(),
            original_len = original.len(),
            output_len = current.len(),
            "Embedding finished"
        );

        EmbedOutcome {
            bytes: if status == EmbedStatus::Embedded {
                current
            } else {
                original.to_vec()
            },
            status,
            format,
            channels_written: written,
            skipped,
        }
    }

    /// Write one channel and check the result.
    fn attempt(
        &self,
        descriptor: &ChannelDescriptor,
        current: &[u8],
        payload: &Payload,
        limit: usize,
        format: ImageFormat,
        baseline: &DecodeReport,
    ) -> Result<Vec<u8>, ChannelError> {
        let out = descriptor.write(current, payload)?;
        self.check(out, limit, format, baseline)
    }

    /// Write the tag into the codec's description field. `Ok(None)` when the
    /// codec has no such support.
    fn codec_fallback(
        &self,
        current: &[u8],
        tag: &str,
        limit: usize,
        format: ImageFormat,
        baseline: &DecodeReport,
    ) -> Result<Option<Vec<u8>>, ChannelError> {
        let out = match self
            .codec
            .write_descriptive_field(current, DescriptiveField::Description, tag)
        {
            Ok(out) => out,
            Err(CodecError::Unsupported(reason)) => {
                debug!(reason = %reason, "Codec has no metadata fallback");
                return Ok(None);
            }
            Err(e) => return Err(ChannelError::NotApplicable(e.to_string())),
        };
        self.check(out, limit, format, baseline).map(Some)
    }

    /// Accept `out` only if it respects the size bound and still decodes as
    /// the original image.
    fn check(
        &self,
        out: Vec<u8>,
        limit: usize,
        format: ImageFormat,
        baseline: &DecodeReport,
    ) -> Result<Vec<u8>, ChannelError> {
        if out.len() > limit {
            return Err(ChannelError::SizeExceeded {
                size: out.len(),
                limit,
            });
        }
        if identify(&out) != format {
            return Err(ChannelError::DecodeCheckFailed(
                "output no longer identifies as the input format".into(),
            ));
        }
        let report = self.checker().decode(&out);
        if !report.same_image(baseline) {
            return Err(ChannelError::DecodeCheckFailed(format!(
                "expected valid {}x{} image, decoded {}x{} (valid: {})",
                baseline.width, baseline.height, report.width, report.height, report.valid
            )));
        }
        Ok(out)
    }

    fn checker(&self) -> &dyn ImageCodec {
        if self.config.verify_decode {
            &self.codec
        } else {
            &StructuralCodec
        }
    }
}
