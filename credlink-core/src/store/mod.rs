//! Proof storage boundary.
//!
//! Durable proof storage lives outside the engine. The [`ProofStore`] trait is
//! the lookup surface the [`Resolver`](crate::Resolver) needs when an embedded
//! reference is missing or untrustworthy:
//! - Exact lookup by proof id (last path segment of the proof URI)
//! - Exact lookup by SHA3-256 content hash
//! - Nearest match by perceptual hash (optional)
//!
//! [`MemoryProofStore`] is an in-process implementation for tests and
//! single-node deployments.

mod memory;

pub use memory::MemoryProofStore;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::manifest::Manifest;

/// Errors that can occur when interacting with a proof store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store could not be reached or queried
    #[error("Backend error: {0}")]
    Backend(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// A stored proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofRecord {
    /// Unique store identifier
    pub id: Uuid,
    /// Proof identifier, the last path segment of `proof_uri`
    pub proof_id: String,
    pub proof_uri: String,
    /// SHA3-256 of the original image (hex-encoded)
    pub content_hash: String,
    /// 64-bit perceptual hash (hex-encoded), None when the image did not decode
    pub perceptual_hash: Option<String>,
    pub manifest: Option<Manifest>,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a new proof record.
#[derive(Debug, Clone)]
pub struct ProofInput {
    pub proof_uri: String,
    pub content_hash: String,
    pub perceptual_hash: Option<String>,
    pub manifest: Option<Manifest>,
}

impl ProofInput {
    /// Record for an embedded manifest, keyed by the manifest's content hash.
    pub fn from_manifest(proof_uri: impl Into<String>, manifest: &Manifest) -> Self {
        Self {
            proof_uri: proof_uri.into(),
            content_hash: manifest.content_hash.clone(),
            perceptual_hash: None,
            manifest: Some(manifest.clone()),
        }
    }

    pub fn with_perceptual_hash(mut self, hash: impl Into<String>) -> Self {
        self.perceptual_hash = Some(hash.into());
        self
    }
}

/// Result of a similarity search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimilarityMatch {
    pub record: ProofRecord,
    /// Hamming distance from the query hash (0 = exact match)
    pub hamming_distance: u32,
}

/// Lookup surface of a proof store.
pub trait ProofStore: Send + Sync {
    fn get_by_id(&self, id: &str) -> Result<Option<ProofRecord>, StoreError>;

    fn get_by_content_hash(&self, hash: &str) -> Result<Option<ProofRecord>, StoreError>;

    /// Closest record whose perceptual hash is within `threshold` bits of
    /// `perceptual_hash`. Stores without perceptual indexing find nothing.
    fn find_similar(
        &self,
        _perceptual_hash: &str,
        _threshold: u32,
    ) -> Result<Option<SimilarityMatch>, StoreError> {
        Ok(None)
    }
}

impl<T: ProofStore + ?Sized> ProofStore for Arc<T> {
    fn get_by_id(&self, id: &str) -> Result<Option<ProofRecord>, StoreError> {
        (**self).get_by_id(id)
    }

    fn get_by_content_hash(&self, hash: &str) -> Result<Option<ProofRecord>, StoreError> {
        (**self).get_by_content_hash(hash)
    }

    fn find_similar(
        &self,
        perceptual_hash: &str,
        threshold: u32,
    ) -> Result<Option<SimilarityMatch>, StoreError> {
        (**self).find_similar(perceptual_hash, threshold)
    }
}
