//! Manifest construction.
//!
//! A [`Manifest`] is the provenance record embedded next to the proof
//! reference. It is built once per sign operation from sanitized user input
//! and never mutated afterwards.
//!
//! # Example
//!
//! ```
//! use credlink_core::ManifestBuilder;
//!
//! let image = b"original image bytes";
//! let manifest = ManifestBuilder::new(image)
//!     .with_title("Harbour at dawn <script>alert(1)</script>")
//!     .with_creator("Jane Doe")
//!     .build();
//!
//! assert_eq!(manifest.title.as_deref(), Some("Harbour at dawn"));
//! assert_eq!(manifest.content_hash.len(), 64);
//! ```

mod sanitize;

pub use sanitize::{sanitize_field, sanitize_text, MAX_FIELD_CHARS};

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};

use crate::config::DEFAULT_CLAIM_GENERATOR;
use crate::error::{CredLinkError, Result};

/// Provenance record embedded alongside a proof reference.
///
/// Field order is fixed; CBOR and JSON encodings are deterministic for a
/// given manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub creator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,
    /// Creation time, truncated to whole milliseconds
    pub created_at: DateTime<Utc>,
    /// Lowercase hex SHA3-256 of the original image bytes
    pub content_hash: String,
    pub claim_generator_name: String,
    pub claim_generator_version: String,
}

/// The subset of a manifest carried by text channels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestSummary {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub creator: Option<String>,
}

impl Manifest {
    /// Serialize the manifest to CBOR bytes.
    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        ciborium::into_writer(self, &mut bytes)
            .map_err(|e| CredLinkError::SerializationError(e.to_string()))?;
        Ok(bytes)
    }

    /// Deserialize a manifest from CBOR bytes.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| CredLinkError::SerializationError(e.to_string()))
    }

    /// Serialize the manifest to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| CredLinkError::SerializationError(e.to_string()))
    }

    /// Title and creator only.
    pub fn summary(&self) -> ManifestSummary {
        ManifestSummary {
            title: self.title.clone(),
            creator: self.creator.clone(),
        }
    }
}

/// Compute the hex-encoded SHA3-256 digest of `data`.
pub fn content_hash(data: &[u8]) -> String {
    let mut hasher = Sha3_256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Builder for [`Manifest`] values.
///
/// All text is sanitized when the manifest is built; building never fails.
#[derive(Debug, Clone)]
pub struct ManifestBuilder {
    content_hash: String,
    title: Option<String>,
    creator: Option<String>,
    description: Option<String>,
    created_at: Option<DateTime<Utc>>,
    claim_generator_name: String,
    claim_generator_version: String,
}

impl ManifestBuilder {
    /// Create a builder for the given original image bytes.
    ///
    /// The content hash is taken over exactly these bytes, before any
    /// embedding happens.
    pub fn new(original: &[u8]) -> Self {
        Self {
            content_hash: content_hash(original),
            title: None,
            creator: None,
            description: None,
            created_at: None,
            claim_generator_name: DEFAULT_CLAIM_GENERATOR.to_string(),
            claim_generator_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_creator(mut self, creator: impl Into<String>) -> Self {
        self.creator = Some(creator.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the claim generator name and version.
    pub fn with_claim_generator(
        mut self,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        self.claim_generator_name = name.into();
        self.claim_generator_version = version.into();
        self
    }

    /// Pin the creation timestamp (defaults to the time of `build`).
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Build the manifest.
    pub fn build(self) -> Manifest {
        let generator_name = sanitize_text(&self.claim_generator_name);
        Manifest {
            title: sanitize_field(self.title.as_deref()),
            creator: sanitize_field(self.creator.as_deref()),
            description: sanitize_field(self.description.as_deref()),
            created_at: self.created_at.unwrap_or_else(Utc::now).trunc_subsecs(3),
            content_hash: self.content_hash,
            claim_generator_name: if generator_name.is_empty() {
                DEFAULT_CLAIM_GENERATOR.to_string()
            } else {
                generator_name
            },
            claim_generator_version: sanitize_text(&self.claim_generator_version),
        }
    }
}
