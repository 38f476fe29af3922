//! The embedded tag wire format: ASCII `"CredLink:"` followed by the proof URI.
//!
//! Every extraction stage searches for [`TAG_PREFIX`]; every embedding
//! channel writes [`encode_tag`]'s output verbatim.

use crate::error::{CredLinkError, Result};

/// Prefix that introduces an embedded proof reference.
pub const TAG_PREFIX: &str = "CredLink:";

/// Byte form of [`TAG_PREFIX`].
pub const TAG_PREFIX_BYTES: &[u8] = TAG_PREFIX.as_bytes();

/// Validate a proof reference for embedding.
///
/// A proof reference must be non-empty and free of control characters
/// (including NUL), since several channels are NUL- or quote-terminated.
pub fn validate_proof_uri(proof_uri: &str) -> Result<()> {
    if proof_uri.is_empty() {
        return Err(CredLinkError::InvalidProofUri("empty".into()));
    }
    if let Some(c) = proof_uri.chars().find(|c| c.is_control()) {
        return Err(CredLinkError::InvalidProofUri(format!(
            "contains control character U+{:04X}",
            c as u32
        )));
    }
    Ok(())
}

/// Build the tag string for a proof reference.
pub fn encode_tag(proof_uri: &str) -> String {
    format!("{TAG_PREFIX}{proof_uri}")
}

/// Recover a proof reference from bytes that start with the tag prefix.
///
/// Returns `None` when the prefix is missing or the remainder is not a valid
/// proof reference.
pub fn decode_tag(bytes: &[u8]) -> Option<String> {
    let rest = bytes.strip_prefix(TAG_PREFIX_BYTES)?;
    proof_from_bytes(rest)
}

/// Interpret raw bytes as a proof reference.
pub(crate) fn proof_from_bytes(bytes: &[u8]) -> Option<String> {
    let value = std::str::from_utf8(bytes).ok()?;
    validate_proof_uri(value).ok()?;
    Some(value.to_string())
}

/// Extract the identifier part of a proof reference (its last path segment).
///
/// `https://proofs.example.com/abc123` yields `abc123`; an opaque token is
/// returned unchanged.
pub fn proof_id(proof_uri: &str) -> Option<&str> {
    let without_query = proof_uri
        .split(['?', '#'])
        .next()
        .unwrap_or(proof_uri);
    without_query
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
}
