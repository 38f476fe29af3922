//! In-memory proof store
//!
//! Backed by `DashMap` so concurrent resolvers can share one instance without
//! a global lock. Contents are lost when the process exits.

use chrono::Utc;
use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use super::{ProofInput, ProofRecord, ProofStore, SimilarityMatch, StoreError};
use crate::soft_binding::hamming_distance;
use crate::tag::{proof_id, validate_proof_uri};

/// In-memory storage for proof records
#[derive(Debug, Default)]
pub struct MemoryProofStore {
    /// Records by proof id
    records: DashMap<String, ProofRecord>,
    /// Content hash -> proof id
    by_content_hash: DashMap<String, String>,
}

fn decode_hash(hash: &str, what: &str) -> Result<Vec<u8>, StoreError> {
    let bytes = hex::decode(hash)
        .map_err(|e| StoreError::InvalidInput(format!("{what} is not valid hex: {e}")))?;
    if bytes.is_empty() {
        return Err(StoreError::InvalidInput(format!("{what} is empty")));
    }
    Ok(bytes)
}

impl MemoryProofStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a proof. A record with the same proof id is replaced.
    pub fn insert(&self, input: ProofInput) -> Result<ProofRecord, StoreError> {
        validate_proof_uri(&input.proof_uri)
            .map_err(|e| StoreError::InvalidInput(e.to_string()))?;
        let id = proof_id(&input.proof_uri)
            .ok_or_else(|| StoreError::InvalidInput("proof URI has no identifier".into()))?
            .to_string();

        let content_hash = input.content_hash.to_ascii_lowercase();
        if decode_hash(&content_hash, "content hash")?.len() != 32 {
            return Err(StoreError::InvalidInput(
                "content hash must be a SHA3-256 digest".into(),
            ));
        }
        if let Some(phash) = &input.perceptual_hash {
            decode_hash(phash, "perceptual hash")?;
        }

        let record = ProofRecord {
            id: Uuid::new_v4(),
            proof_id: id.clone(),
            proof_uri: input.proof_uri,
            content_hash: content_hash.clone(),
            perceptual_hash: input.perceptual_hash.map(|h| h.to_ascii_lowercase()),
            manifest: input.manifest,
            created_at: Utc::now(),
        };

        if let Some(previous) = self.records.insert(id.clone(), record.clone()) {
            if previous.content_hash != content_hash {
                self.by_content_hash
                    .remove_if(&previous.content_hash, |_, owner| *owner == id);
            }
        }
        self.by_content_hash.insert(content_hash, id.clone());
        debug!(proof_id = %id, "Stored proof record");

        Ok(record)
    }

    /// Remove a proof by id. Returns whether a record was removed.
    pub fn remove(&self, id: &str) -> bool {
        match self.records.remove(id) {
            Some((_, record)) => {
                self.by_content_hash
                    .remove_if(&record.content_hash, |_, owner| owner == id);
                true
            }
            None => false,
        }
    }

    /// Number of stored proofs
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl ProofStore for MemoryProofStore {
    fn get_by_id(&self, id: &str) -> Result<Option<ProofRecord>, StoreError> {
        Ok(self.records.get(id).map(|r| r.value().clone()))
    }

    fn get_by_content_hash(&self, hash: &str) -> Result<Option<ProofRecord>, StoreError> {
        let Some(id) = self
            .by_content_hash
            .get(&hash.to_ascii_lowercase())
            .map(|r| r.value().clone())
        else {
            return Ok(None);
        };
        self.get_by_id(&id)
    }

    fn find_similar(
        &self,
        perceptual_hash: &str,
        threshold: u32,
    ) -> Result<Option<SimilarityMatch>, StoreError> {
        let query = decode_hash(perceptual_hash, "perceptual hash")?;

        let best = self
            .records
            .iter()
            .filter_map(|entry| {
                let stored = hex::decode(entry.perceptual_hash.as_ref()?).ok()?;
                let distance = hamming_distance(&query, &stored)?;
                (distance <= threshold).then(|| SimilarityMatch {
                    record: entry.value().clone(),
                    hamming_distance: distance,
                })
            })
            .min_by_key(|m| m.hamming_distance);

        Ok(best)
    }
}
