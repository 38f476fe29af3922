//! Engine configuration
//!
//! Handles loading configuration from environment variables with sensible defaults.

use crate::manifest::ManifestBuilder;

/// Default size growth bound (output may be at most 20% larger than the input).
pub const DEFAULT_MAX_SIZE_GROWTH: f64 = 1.20;

/// Default confidence below which callers should consult remote proof storage.
pub const DEFAULT_TRUST_THRESHOLD: u8 = 75;

/// Default claim generator name written into manifests.
pub const DEFAULT_CLAIM_GENERATOR: &str = "CredLink";

/// Default upper bound for the raw partial scan (64 MiB).
pub const DEFAULT_MAX_SCAN_BYTES: usize = 64 * 1024 * 1024;

/// Engine configuration loaded from environment variables
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Maximum ratio between embedded and original size (default: 1.20)
    pub max_size_growth: f64,
    /// Re-decode every write through the codec before accepting it (default: true)
    pub verify_decode: bool,
    /// Claim generator name recorded in new manifests (default: "CredLink")
    pub claim_generator_name: String,
    /// Confidence below which the resolver falls back to proof storage (default: 75)
    pub trust_threshold: u8,
    /// Bytes examined by the partial scan; larger buffers are scanned up to this prefix
    pub max_partial_scan_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_size_growth: DEFAULT_MAX_SIZE_GROWTH,
            verify_decode: true,
            claim_generator_name: DEFAULT_CLAIM_GENERATOR.to_string(),
            trust_threshold: DEFAULT_TRUST_THRESHOLD,
            max_partial_scan_bytes: DEFAULT_MAX_SCAN_BYTES,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    ///
    /// Values that fail to parse or fall outside their valid range keep the default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let max_size_growth = lookup("CREDLINK_MAX_SIZE_GROWTH")
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite() && *v >= 1.0)
            .unwrap_or(defaults.max_size_growth);

        let verify_decode = lookup("CREDLINK_VERIFY_DECODE")
            .map(|v| v.trim().to_lowercase() != "false")
            .unwrap_or(defaults.verify_decode);

        let claim_generator_name = lookup("CREDLINK_CLAIM_GENERATOR")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.claim_generator_name);

        let trust_threshold = lookup("CREDLINK_TRUST_THRESHOLD")
            .and_then(|v| v.trim().parse::<u8>().ok())
            .filter(|v| *v <= 100)
            .unwrap_or(defaults.trust_threshold);

        let max_partial_scan_bytes = lookup("CREDLINK_MAX_SCAN_BYTES")
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(defaults.max_partial_scan_bytes);

        Self {
            max_size_growth,
            verify_decode,
            claim_generator_name,
            trust_threshold,
            max_partial_scan_bytes,
        }
    }

    /// Start a manifest for `original` that records the configured claim
    /// generator and this crate's version.
    pub fn manifest_builder(&self, original: &[u8]) -> ManifestBuilder {
        ManifestBuilder::new(original)
            .with_claim_generator(self.claim_generator_name.as_str(), env!("CARGO_PKG_VERSION"))
    }

    /// Largest output size allowed for an input of `original_len` bytes.
    pub fn size_limit(&self, original_len: usize) -> usize {
        (original_len as f64 * self.max_size_growth).floor() as usize
    }
}
