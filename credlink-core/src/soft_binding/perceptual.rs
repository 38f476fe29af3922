//! Blockhash perceptual hashing.
//!
//! Blockhash produces a consistent 64-bit hash that is robust against JPEG
//! compression, resizing and minor cropping.
//!
//! ```no_run
//! use credlink_core::soft_binding::{hex_hamming_distance, BlockhashHasher, PerceptualHash};
//!
//! let hasher = BlockhashHasher;
//! let a = hasher.hash(&std::fs::read("image.jpg").unwrap()).unwrap();
//! let b = hasher.hash(&std::fs::read("image-recompressed.jpg").unwrap()).unwrap();
//! let similar = hex_hamming_distance(&a, &b).is_some_and(|d| d <= 10);
//! ```

use blockhash::{blockhash64, Blockhash64};
use image::DynamicImage;
use tracing::debug;

use super::PerceptualHash;

/// Hash size in bytes (64 bits).
pub const PERCEPTUAL_HASH_SIZE: usize = 8;

/// Blockhash64 over the decoded image.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockhashHasher;

impl BlockhashHasher {
    /// Raw hash of an already decoded image.
    pub fn hash_image(&self, image: &DynamicImage) -> [u8; PERCEPTUAL_HASH_SIZE] {
        let hash: Blockhash64 = blockhash64(image);
        hash.into()
    }
}

impl PerceptualHash for BlockhashHasher {
    fn hash(&self, bytes: &[u8]) -> Option<String> {
        match image::load_from_memory(bytes) {
            Ok(image) => Some(hex::encode(self.hash_image(&image))),
            Err(e) => {
                debug!(error = %e, "Perceptual hash skipped, image does not decode");
                None
            }
        }
    }
}
