//! Soft binding: locating a proof from image content instead of metadata.
//!
//! When every embedded copy of the proof reference has been stripped, a
//! perceptual hash of the pixels can still find the proof in a store. The
//! hashing algorithm is supplied through [`PerceptualHash`]; the engine only
//! compares hashes.

#[cfg(feature = "perceptual-hash")]
pub mod perceptual;

#[cfg(feature = "perceptual-hash")]
pub use perceptual::{BlockhashHasher, PERCEPTUAL_HASH_SIZE};

/// Default maximum Hamming distance for two hashes to count as the same image.
pub const DEFAULT_SIMILARITY_THRESHOLD: u32 = 10;

/// Perceptual hash capability.
pub trait PerceptualHash: Send + Sync {
    /// Hex-encoded hash of the image in `bytes`, or `None` if it does not
    /// decode.
    fn hash(&self, bytes: &[u8]) -> Option<String>;
}

/// Compute Hamming distance between two perceptual hash byte arrays.
///
/// Hashes of different sizes compare their overlapping portion plus a
/// penalty of 8 bits per byte of size difference.
///
/// Returns `None` if either array is empty.
pub fn hamming_distance(hash1: &[u8], hash2: &[u8]) -> Option<u32> {
    if hash1.is_empty() || hash2.is_empty() {
        return None;
    }

    let min_len = hash1.len().min(hash2.len());
    let distance: u32 = hash1[..min_len]
        .iter()
        .zip(&hash2[..min_len])
        .map(|(a, b)| (a ^ b).count_ones())
        .sum();
    let size_penalty = (hash1.len().abs_diff(hash2.len()) * 8) as u32;

    Some(distance + size_penalty)
}

/// [`hamming_distance`] over hex-encoded hashes.
pub fn hex_hamming_distance(hash1: &str, hash2: &str) -> Option<u32> {
    hamming_distance(&hex::decode(hash1).ok()?, &hex::decode(hash2).ok()?)
}
