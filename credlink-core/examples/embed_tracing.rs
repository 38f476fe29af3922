//! Example demonstrating embed/extract tracing instrumentation.
//!
//! Run with: cargo run -p credlink-core --example embed_tracing

use std::io::Cursor;

use credlink_core::{Embedder, Extractor, ImageCodec, ImageCrateCodec, ImageFormat};
use image::{ImageBuffer, Rgb, RgbImage};
use tracing_subscriber::{fmt, EnvFilter};

fn main() {
    // Initialize tracing subscriber with debug level
    fmt()
        .with_env_filter(EnvFilter::new("credlink_core=debug,info"))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    println!("=== CredLink Embed Tracing Demo ===\n");

    let img: RgbImage = ImageBuffer::from_fn(320, 240, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    let mut buffer = Cursor::new(Vec::new());
    if let Err(e) = img.write_to(&mut buffer, image::ImageFormat::Jpeg) {
        eprintln!("Failed to encode sample image: {}", e);
        return;
    }
    let original = buffer.into_inner();

    let embedder = Embedder::from_env();
    let manifest = embedder
        .config()
        .manifest_builder(&original)
        .with_title("Tracing demo")
        .with_creator("CredLink")
        .build();
    match manifest.to_json() {
        Ok(json) => println!("Manifest:\n{}\n", json),
        Err(e) => eprintln!("Failed to render manifest: {}", e),
    }

    println!("Embedding into {} byte JPEG...\n", original.len());
    let outcome = embedder.embed(&original, &manifest, "https://proofs.example.com/demo");
    println!("\nStatus: {:?}", outcome.status);
    println!("   Written: {:?}", outcome.channels_written);
    println!("   Size:    {} -> {} bytes", original.len(), outcome.bytes.len());

    let extractor = Extractor::from_env();

    println!("\nExtracting from the embedded file...\n");
    let result = extractor.extract(&outcome.bytes);
    println!("\nRecovered {:?} from {} (confidence {})", result.proof_uri, result.source, result.confidence);

    println!("\nRe-encoding at quality 20 and extracting again...\n");
    match ImageCrateCodec.reencode(&outcome.bytes, ImageFormat::Jpeg, 20) {
        Ok(degraded) => {
            let result = extractor.extract(&degraded);
            println!("\nRecovered {:?} from {} (confidence {})", result.proof_uri, result.source, result.confidence);
        }
        Err(e) => {
            println!("\nRe-encode failed: {}", e);
        }
    }
}
