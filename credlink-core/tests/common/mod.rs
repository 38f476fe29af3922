//! Shared image fixtures for the integration tests.

#![allow(dead_code)]

use std::io::Cursor;

use chrono::{TimeZone, Utc};
use credlink_core::{Manifest, ManifestBuilder};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::webp::WebPEncoder;
use image::{DynamicImage, ImageBuffer, Rgb, RgbImage};

pub const PROOF_URI: &str = "https://proofs.example.com/abc123";

/// Image with pixel-level noise, so encoders cannot shrink it much and the
/// embedded metadata stays small next to the pixel data.
pub fn noisy_image(width: u32, height: u32) -> RgbImage {
    ImageBuffer::from_fn(width, height, |x, y| {
        let v = x.wrapping_mul(2_654_435_761) ^ y.wrapping_mul(40_503) ^ (x * y);
        Rgb([(v >> 3) as u8, (v >> 11) as u8, (v >> 19) as u8])
    })
}

/// Smooth gradient with a checker pattern, for perceptual hashing.
pub fn pattern_image(width: u32, height: u32) -> RgbImage {
    ImageBuffer::from_fn(width, height, |x, y| {
        let r = ((x as f32 / width as f32) * 255.0) as u8;
        let g = ((y as f32 / height as f32) * 255.0) as u8;
        let b = (((x + y) as f32 / (width + height) as f32) * 200.0) as u8;
        let pattern = if (x / 20 + y / 20) % 2 == 0 { 30 } else { 0 };
        Rgb([r.saturating_add(pattern), g, b])
    })
}

pub fn jpeg(image: &RgbImage, quality: u8) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
    image.write_with_encoder(encoder).expect("JPEG encoding failed");
    buffer.into_inner()
}

pub fn png(image: &RgbImage) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, image::ImageFormat::Png)
        .expect("PNG encoding failed");
    buffer.into_inner()
}

pub fn webp(image: &RgbImage) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image.clone())
        .write_with_encoder(WebPEncoder::new_lossless(&mut buffer))
        .expect("WebP encoding failed");
    buffer.into_inner()
}

/// Manifest with a fixed timestamp, so encoded sizes are stable.
pub fn manifest_for(image: &[u8]) -> Manifest {
    ManifestBuilder::new(image)
        .with_title("Recovery Test")
        .with_creator("Test")
        .with_created_at(Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap())
        .build()
}

/// Copy of a JPEG without the marker segments matched by `remove`.
pub fn strip_jpeg_segments(bytes: &[u8], remove: impl Fn(u8, &[u8]) -> bool) -> Vec<u8> {
    let mut segments = credlink_core::format::jpeg_segments(bytes);
    let mut out = bytes[..2].to_vec();
    for segment in segments.by_ref() {
        if !remove(segment.marker, segment.payload) {
            out.extend_from_slice(&bytes[segment.offset..segment.end()]);
        }
    }
    out.extend_from_slice(&bytes[segments.position()..]);
    out
}

/// Copy of a JPEG with one extra marker segment right after SOI.
pub fn with_leading_segment(jpeg: &[u8], marker: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = jpeg[..2].to_vec();
    out.extend_from_slice(&[0xFF, marker]);
    out.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
    out.extend_from_slice(payload);
    out.extend_from_slice(&jpeg[2..]);
    out
}

/// `Exif\0\0` block as a camera writes it: IFD0 with Make only.
pub fn camera_exif() -> Vec<u8> {
    let mut exif = b"Exif\0\0II*\0".to_vec();
    exif.extend_from_slice(&8u32.to_le_bytes());
    exif.extend_from_slice(&1u16.to_le_bytes());
    exif.extend_from_slice(&0x010Fu16.to_le_bytes());
    exif.extend_from_slice(&2u16.to_le_bytes());
    exif.extend_from_slice(&10u32.to_le_bytes());
    exif.extend_from_slice(&26u32.to_le_bytes());
    exif.extend_from_slice(&0u32.to_le_bytes());
    exif.extend_from_slice(b"CameraCo\0\0");
    exif
}
