//! Recovery after the kinds of damage images pick up in the wild: stripped
//! regions, re-encoding, truncation and foreign metadata.

mod common;

use common::{
    camera_exif, jpeg, manifest_for, noisy_image, png, strip_jpeg_segments, webp,
    with_leading_segment, PROOF_URI,
};
use credlink_core::format::marker;
use credlink_core::{
    ChannelId, EmbedStatus, Embedder, ExtractionSource, Extractor, ImageCodec, ImageCrateCodec,
    ImageFormat,
};

#[test]
fn test_intact_recovery() {
    let original = jpeg(&noisy_image(400, 300), 92);
    let manifest = manifest_for(&original);
    let embedded = Embedder::default().embed(&original, &manifest, PROOF_URI);

    let result = Extractor::default().extract(&embedded.bytes);
    assert_eq!(result.proof_uri.as_deref(), Some(PROOF_URI));
    assert_eq!(result.source, ExtractionSource::Structured);
    assert_eq!(result.confidence, 100);
    assert!(!result.corrupted);
    assert_eq!(result.manifest.map(|m| m.content_hash), Some(manifest.content_hash));
}

#[test]
fn test_exif_only_fallback() {
    let image = noisy_image(300, 200);
    for (original, channel) in [
        (jpeg(&image, 90), ChannelId::JpegExif),
        (png(&image), ChannelId::PngExif),
    ] {
        let outcome = Embedder::default().embed_with_channels(
            &original,
            &manifest_for(&original),
            PROOF_URI,
            &[channel],
        );
        assert_eq!(outcome.channels_written, vec![channel]);

        let result = Extractor::default().extract(&outcome.bytes);
        assert_eq!(result.proof_uri.as_deref(), Some(PROOF_URI));
        assert_eq!(result.source, ExtractionSource::Exif);
        assert_eq!(result.confidence, 90);
        assert!(!result.corrupted);
    }
}

#[test]
fn test_xmp_only_fallback() {
    let original = jpeg(&noisy_image(300, 200), 90);
    let outcome = Embedder::default().embed_with_channels(
        &original,
        &manifest_for(&original),
        PROOF_URI,
        &[ChannelId::JpegXmp],
    );
    assert_eq!(outcome.channels_written, vec![ChannelId::JpegXmp]);

    let result = Extractor::default().extract(&outcome.bytes);
    assert_eq!(result.proof_uri.as_deref(), Some(PROOF_URI));
    assert_eq!(result.source, ExtractionSource::Xmp);
    assert_eq!(result.confidence, 80);
    assert!(!result.corrupted);
}

/// Removing the APP11 boxes after a full embed leaves the EXIF copy, and
/// removing EXIF as well leaves the XMP copy.
#[test]
fn test_stripped_regions_degrade_in_order() {
    let original = jpeg(&noisy_image(300, 200), 90);
    let embedded = Embedder::default().embed(&original, &manifest_for(&original), PROOF_URI);

    let no_box = strip_jpeg_segments(&embedded.bytes, |m, _| m == marker::APP11);
    let result = Extractor::default().extract(&no_box);
    assert_eq!(result.source, ExtractionSource::Exif);
    assert_eq!(result.proof_uri.as_deref(), Some(PROOF_URI));

    let no_exif = strip_jpeg_segments(&no_box, |m, payload| {
        m == marker::APP1 && payload.starts_with(b"Exif\0\0")
    });
    let result = Extractor::default().extract(&no_exif);
    assert_eq!(result.source, ExtractionSource::Xmp);
    assert_eq!(result.proof_uri.as_deref(), Some(PROOF_URI));

    let bare = strip_jpeg_segments(&no_exif, |m, _| m == marker::APP1);
    assert_eq!(Extractor::default().extract(&bare).source, ExtractionSource::None);
}

/// Re-encoding drops every metadata region; a damaged tag appended to the
/// file is all that is left.
#[test]
fn test_heavy_degradation_partial_recovery() {
    let original = jpeg(&noisy_image(320, 240), 90);
    let embedded = Embedder::default().embed(&original, &manifest_for(&original), PROOF_URI);

    let mut degraded = ImageCrateCodec
        .reencode(&embedded.bytes, ImageFormat::Jpeg, 10)
        .unwrap();
    assert_eq!(
        Extractor::default().extract(&degraded).source,
        ExtractionSource::None
    );

    degraded.extend_from_slice(b"CredLink:https://proofs.ex");
    degraded.extend_from_slice(&[0xFF, 0xFE]);

    let result = Extractor::default().extract(&degraded);
    assert_eq!(result.source, ExtractionSource::Partial);
    assert_eq!(result.proof_uri.as_deref(), Some("https://proofs.ex"));
    assert!(result.confidence < 75);
    assert!((30..=50).contains(&result.confidence));
    assert!(result.corrupted);
}

/// Cutting through the tag of a written structured region leaves a raw
/// match whose box header still declares the full length.
#[test]
fn test_truncated_structured_region_scaled_by_fraction() {
    let image = noisy_image(240, 160);
    for (original, channel) in [
        (jpeg(&image, 90), ChannelId::JpegJumbf),
        (webp(&image), ChannelId::WebpChunk),
    ] {
        let outcome = Embedder::default().embed_with_channels(
            &original,
            &manifest_for(&original),
            PROOF_URI,
            &[channel],
        );
        assert_eq!(outcome.channels_written, vec![channel]);

        let bytes = &outcome.bytes;
        let tag_at = bytes
            .windows(9)
            .position(|w| w == b"CredLink:")
            .expect("tag written in clear");
        assert_eq!(&bytes[tag_at - 4..tag_at], b"clnk");

        // 22 of 33 URI bytes survive: 30 + floor(20 * 2/3)
        let cut = &bytes[..tag_at + 9 + 22];
        let result = Extractor::default().extract(cut);
        assert_eq!(result.source, ExtractionSource::Partial, "{channel}");
        assert_eq!(result.proof_uri.as_deref(), Some(&PROOF_URI[..22]));
        assert_eq!(result.confidence, 43);
        assert!(result.corrupted);
        assert!(result.manifest.is_none());

        // Less surviving means less confidence
        let shorter = Extractor::default().extract(&bytes[..tag_at + 9 + 5]);
        assert!((30..43).contains(&shorter.confidence));
    }
}

/// Re-signing an image that carries camera EXIF rewrites our fields inside
/// the camera block without leaving the old tag behind.
#[test]
fn test_resign_with_camera_exif() {
    let original = with_leading_segment(
        &jpeg(&noisy_image(240, 160), 90),
        marker::APP1,
        &camera_exif(),
    );
    let embedder = Embedder::default();
    let first = embedder.embed(&original, &manifest_for(&original), "urn:proof:first-signing");
    assert!(first.channels_written.contains(&ChannelId::JpegExif));
    assert!(first
        .bytes
        .windows(b"urn:proof:first-signing".len())
        .any(|w| w == b"urn:proof:first-signing"));

    let second = embedder.embed(&first.bytes, &manifest_for(&original), "urn:proof:later-signing");
    assert!(second.channels_written.contains(&ChannelId::JpegExif));
    assert!(!second
        .bytes
        .windows(b"first-signing".len())
        .any(|w| w == b"first-signing"));
    assert_eq!(second.bytes.len(), first.bytes.len());
    assert!(second.bytes.windows(8).any(|w| w == b"CameraCo"));

    // EXIF alone still names the new proof
    let exif_only = strip_jpeg_segments(&second.bytes, |m, payload| {
        m == marker::APP11 || (m == marker::APP1 && !payload.starts_with(b"Exif\0\0"))
    });
    let result = Extractor::default().extract(&exif_only);
    assert_eq!(result.source, ExtractionSource::Exif);
    assert_eq!(result.proof_uri.as_deref(), Some("urn:proof:later-signing"));
}

/// Cutting a file through the structured region still finds the tag by
/// the raw scan, scored by how much of it survived.
#[test]
fn test_truncated_file_partial_recovery() {
    let original = png(&noisy_image(200, 120));
    let embedded = Embedder::default().embed_with_channels(
        &original,
        &manifest_for(&original),
        PROOF_URI,
        &[ChannelId::PngExif],
    );
    let bytes = &embedded.bytes;
    let tag_at = bytes
        .windows(9)
        .position(|w| w == b"CredLink:")
        .expect("tag written in clear");
    let cut = &bytes[..tag_at + 9 + 20];

    let result = Extractor::default().extract(cut);
    assert_eq!(result.source, ExtractionSource::Partial);
    assert_eq!(result.proof_uri.as_deref(), Some(&PROOF_URI[..20]));
    assert_eq!(result.confidence, 30);
    assert!(result.corrupted);
}

#[test]
fn test_garbage_and_empty_input() {
    let extractor = Extractor::default();
    let inputs: [&[u8]; 4] = [b"", b"This is not an image", &[0xFF, 0xD8, 0xFF], &[0u8; 4096]];
    for input in inputs {
        let result = extractor.extract(input);
        assert_eq!(result.source, ExtractionSource::None);
        assert_eq!(result.confidence, 0);
        assert!(result.proof_uri.is_none());
        assert!(!result.corrupted);

        let outcome = Embedder::default().embed(input, &manifest_for(input), PROOF_URI);
        assert_ne!(outcome.status, EmbedStatus::Embedded);
        assert_eq!(outcome.bytes, input);
    }
}

/// Signing an already signed image replaces every region.
#[test]
fn test_resign_last_write_wins() {
    let image = noisy_image(240, 160);
    for original in [jpeg(&image, 90), png(&image), webp(&image)] {
        let embedder = Embedder::default();
        let first = embedder.embed(&original, &manifest_for(&original), "urn:proof:first");
        let second = embedder.embed(&first.bytes, &manifest_for(&original), "urn:proof:second");
        assert!(second.is_embedded());
        assert_eq!(second.channels_written, first.channels_written);

        let result = Extractor::default().extract(&second.bytes);
        assert_eq!(result.proof_uri.as_deref(), Some("urn:proof:second"));
        assert_eq!(result.confidence, 100);

        let count = second
            .bytes
            .windows(b"urn:proof:first".len())
            .filter(|w| *w == b"urn:proof:first")
            .count();
        assert_eq!(count, 0, "stale proof reference left behind");
    }
}

/// Third-party EXIF and XMP survive embedding next to ours.
#[test]
fn test_foreign_metadata_preserved() {
    let original = jpeg(&noisy_image(200, 100), 90);
    let foreign_xmp = b"http://ns.adobe.com/xap/1.0/\0<?xpacket begin=\"\"?><x:xmpmeta xmlns:x=\"adobe:ns:meta/\"/><?xpacket end=\"w\"?>";
    let with_foreign = with_leading_segment(&original, marker::APP1, foreign_xmp);

    let outcome = Embedder::default().embed(&with_foreign, &manifest_for(&original), PROOF_URI);
    assert!(outcome.is_embedded());
    assert!(outcome
        .bytes
        .windows(foreign_xmp.len())
        .any(|w| w == foreign_xmp));
    assert_eq!(
        Extractor::default().extract(&outcome.bytes).proof_uri.as_deref(),
        Some(PROOF_URI)
    );
}
