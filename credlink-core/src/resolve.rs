//! Proof resolution.
//!
//! Combines extraction with store lookups. An embedded reference recovered
//! with enough confidence is returned as is. Anything weaker is checked
//! against the store, by proof id first, then by content hash of the bytes
//! at hand, then by perceptual hash.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::config::EngineConfig;
use crate::error::Result;
use crate::extract::{ExtractionResult, Extractor};
use crate::manifest::content_hash;
use crate::soft_binding::{PerceptualHash, DEFAULT_SIMILARITY_THRESHOLD};
use crate::store::{ProofRecord, ProofStore};
use crate::tag::proof_id;

/// How a resolution was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMethod {
    /// The embedded reference was trusted without a store lookup.
    Embedded,
    /// Store lookup by the id of the recovered reference.
    ProofId,
    /// Store lookup by SHA3-256 of the input bytes.
    ContentHash,
    /// Store lookup by perceptual similarity.
    PerceptualHash {
        hamming_distance: u32,
    },
    /// Nothing trustworthy found.
    Unresolved,
}

/// Outcome of [`Resolver::resolve`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub extraction: ExtractionResult,
    /// Stored proof found by a lookup.
    pub record: Option<ProofRecord>,
    pub method: ResolutionMethod,
}

impl Resolution {
    /// Best known proof reference: the stored one when a lookup matched,
    /// otherwise the embedded one if it was trusted.
    pub fn proof_uri(&self) -> Option<&str> {
        match (&self.record, self.method) {
            (Some(record), _) => Some(record.proof_uri.as_str()),
            (None, ResolutionMethod::Embedded) => self.extraction.proof_uri.as_deref(),
            _ => None,
        }
    }
}

/// Resolves images to proofs through extraction and a [`ProofStore`].
///
/// # Example
///
/// ```
/// use credlink_core::{ExtractionSource, MemoryProofStore, ResolutionMethod, Resolver};
///
/// let resolver = Resolver::new(MemoryProofStore::new());
/// let resolution = resolver.resolve(b"not an image").unwrap();
/// assert_eq!(resolution.extraction.source, ExtractionSource::None);
/// assert_eq!(resolution.method, ResolutionMethod::Unresolved);
/// ```
pub struct Resolver<S> {
    extractor: Extractor,
    store: S,
    hasher: Option<Box<dyn PerceptualHash>>,
    trust_threshold: u8,
    similarity_threshold: u32,
}

impl<S: ProofStore> Resolver<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, EngineConfig::default())
    }

    pub fn with_config(store: S, config: EngineConfig) -> Self {
        Self {
            trust_threshold: config.trust_threshold,
            extractor: Extractor::new(config),
            store,
            hasher: None,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }

    /// Enable perceptual lookup with the given hasher.
    pub fn with_hasher(mut self, hasher: impl PerceptualHash + 'static) -> Self {
        self.hasher = Some(Box::new(hasher));
        self
    }

    pub fn with_similarity_threshold(mut self, threshold: u32) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Resolve `bytes` to a proof.
    ///
    /// Errors only when the store fails; an image that resolves to nothing
    /// yields [`ResolutionMethod::Unresolved`].
    #[instrument(level = "debug", skip_all, fields(len = bytes.len()))]
    pub fn resolve(&self, bytes: &[u8]) -> Result<Resolution> {
        let extraction = self.extractor.extract(bytes);

        if extraction.is_found() && extraction.confidence >= self.trust_threshold {
            debug!(confidence = extraction.confidence, "Embedded reference trusted");
            return Ok(Resolution {
                extraction,
                record: None,
                method: ResolutionMethod::Embedded,
            });
        }

        let (record, method) = self.lookup(bytes, &extraction)?;
        info!(
            method = ?method,
            confidence = extraction.confidence,
            found = record.is_some(),
            "Resolution finished"
        );
        Ok(Resolution {
            extraction,
            record,
            method,
        })
    }

    fn lookup(
        &self,
        bytes: &[u8],
        extraction: &ExtractionResult,
    ) -> Result<(Option<ProofRecord>, ResolutionMethod)> {
        if let Some(id) = extraction.proof_uri.as_deref().and_then(proof_id) {
            if let Some(record) = self.store.get_by_id(id)? {
                return Ok((Some(record), ResolutionMethod::ProofId));
            }
            debug!(proof_id = id, "No stored proof for recovered id");
        }

        if let Some(record) = self.store.get_by_content_hash(&content_hash(bytes))? {
            return Ok((Some(record), ResolutionMethod::ContentHash));
        }

        if let Some(hash) = self.hasher.as_ref().and_then(|h| h.hash(bytes)) {
            if let Some(found) = self.store.find_similar(&hash, self.similarity_threshold)? {
                return Ok((
                    Some(found.record),
                    ResolutionMethod::PerceptualHash {
                        hamming_distance: found.hamming_distance,
                    },
                ));
            }
        }

        Ok((None, ResolutionMethod::Unresolved))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ManifestBuilder;
    use crate::store::{MemoryProofStore, ProofInput, SimilarityMatch, StoreError};

    struct FixedHash(&'static str);

    impl PerceptualHash for FixedHash {
        fn hash(&self, _bytes: &[u8]) -> Option<String> {
            Some(self.0.to_string())
        }
    }

    struct FailingStore;

    impl ProofStore for FailingStore {
        fn get_by_id(&self, _: &str) -> std::result::Result<Option<ProofRecord>, StoreError> {
            Err(StoreError::Backend("offline".into()))
        }

        fn get_by_content_hash(
            &self,
            _: &str,
        ) -> std::result::Result<Option<ProofRecord>, StoreError> {
            Err(StoreError::Backend("offline".into()))
        }

        fn find_similar(
            &self,
            _: &str,
            _: u32,
        ) -> std::result::Result<Option<SimilarityMatch>, StoreError> {
            Err(StoreError::Backend("offline".into()))
        }
    }

    fn store_with(uri: &str, image: &[u8]) -> MemoryProofStore {
        let store = MemoryProofStore::new();
        let manifest = ManifestBuilder::new(image).build();
        store
            .insert(ProofInput::from_manifest(uri, &manifest).with_perceptual_hash("ffffffff00000000"))
            .unwrap();
        store
    }

    #[test]
    fn test_low_confidence_looks_up_by_id() {
        let resolver = Resolver::new(store_with("https://proofs.example.com/abc123", b"other"));
        let resolution = resolver
            .resolve(b"junk CredLink:https://proofs.example.com/abc123\0 junk")
            .unwrap();
        assert_eq!(resolution.extraction.confidence, 50);
        assert_eq!(resolution.method, ResolutionMethod::ProofId);
        assert_eq!(resolution.proof_uri(), Some("https://proofs.example.com/abc123"));
    }

    #[test]
    fn test_falls_back_to_content_hash() {
        let image = b"original bytes without any tag";
        let resolver = Resolver::new(store_with("urn:proof/xyz", image));
        let resolution = resolver.resolve(image).unwrap();
        assert_eq!(resolution.method, ResolutionMethod::ContentHash);
        assert_eq!(resolution.record.unwrap().proof_id, "xyz");
    }

    #[test]
    fn test_falls_back_to_perceptual_hash() {
        let resolver = Resolver::new(store_with("urn:proof/xyz", b"original"))
            .with_hasher(FixedHash("ffffffff00000001"));
        let resolution = resolver.resolve(b"re-encoded").unwrap();
        assert_eq!(
            resolution.method,
            ResolutionMethod::PerceptualHash { hamming_distance: 1 }
        );

        let strict = Resolver::new(store_with("urn:proof/xyz", b"original"))
            .with_hasher(FixedHash("ffffffff00000001"))
            .with_similarity_threshold(0);
        let resolution = strict.resolve(b"re-encoded").unwrap();
        assert_eq!(resolution.method, ResolutionMethod::Unresolved);
        assert_eq!(resolution.proof_uri(), None);
    }

    #[test]
    fn test_trust_threshold_skips_store() {
        let config = EngineConfig {
            trust_threshold: 50,
            ..EngineConfig::default()
        };
        let resolver = Resolver::with_config(FailingStore, config);
        let resolution = resolver.resolve(b"CredLink:urn:proof:1\0").unwrap();
        assert_eq!(resolution.method, ResolutionMethod::Embedded);
        assert_eq!(resolution.proof_uri(), Some("urn:proof:1"));
    }

    #[test]
    fn test_store_errors_propagate() {
        let resolver = Resolver::new(FailingStore);
        assert!(matches!(
            resolver.resolve(b"CredLink:urn:proof:1\0"),
            Err(crate::CredLinkError::Store(StoreError::Backend(_)))
        ));
    }
}
