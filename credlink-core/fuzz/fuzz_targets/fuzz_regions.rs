#![no_main]

//! Fuzz target for the bounded region iterators
//!
//! Every region yielded must lie inside the input, whatever its length
//! fields claim.
//!
//! Run with: cargo +nightly fuzz run fuzz_regions

use credlink_core::format::{identify, jpeg_segments, png_chunks, riff_chunks, webp_canvas};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = identify(data);
    for segment in jpeg_segments(data) {
        assert!(segment.end() <= data.len());
    }
    for chunk in png_chunks(data) {
        assert!(chunk.end() <= data.len());
    }
    for chunk in riff_chunks(data) {
        assert!(chunk.end() <= data.len());
    }
    let _ = webp_canvas(data);
});
