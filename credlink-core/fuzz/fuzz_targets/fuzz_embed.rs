#![no_main]

//! Fuzz target for embedding
//!
//! Embedding into malformed containers must never panic, and anything it
//! does not embed into must come back unchanged.
//!
//! Run with: cargo +nightly fuzz run fuzz_embed

use credlink_core::{EmbedStatus, Embedder, EngineConfig, ManifestBuilder, StructuralCodec};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let config = EngineConfig {
        verify_decode: false,
        ..EngineConfig::default()
    };
    let embedder = Embedder::new(StructuralCodec, config);
    let manifest = ManifestBuilder::new(data).with_title("fuzz").build();

    let outcome = embedder.embed(data, &manifest, "https://proofs.example.com/fuzz");
    if outcome.status != EmbedStatus::Embedded {
        assert_eq!(outcome.bytes, data);
    }
});
