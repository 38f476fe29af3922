#![no_main]

//! Fuzz target for proof extraction
//!
//! Extraction must return a well-formed result for any input.
//!
//! Run with: cargo +nightly fuzz run fuzz_extract

use credlink_core::{ExtractionSource, Extractor};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let result = Extractor::default().extract(data);
    let none = result.source == ExtractionSource::None;
    assert_eq!(result.proof_uri.is_none(), none);
    assert_eq!(result.confidence == 0, none);
    assert!(!result.corrupted || result.confidence < 75);
});
