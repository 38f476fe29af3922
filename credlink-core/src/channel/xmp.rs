//! XMP packets carrying the proof tag.

use super::Payload;
use crate::format::find_bytes;
use crate::tag::{decode_tag, TAG_PREFIX_BYTES};

pub const CREDLINK_NAMESPACE: &str = "https://credlink.io/ns/1.0/";

const PROOF_ATTRIBUTE: &[u8] = b"credlink:proof=\"";
const NAMESPACE_DECLARATION: &[u8] = b"xmlns:credlink=";

/// Build a complete XMP packet for a payload.
pub fn build_packet(payload: &Payload) -> String {
    let mut props = String::new();
    if let Some(title) = &payload.summary.title {
        props.push_str(&format!(
            "   <dc:title><rdf:Alt><rdf:li xml:lang=\"x-default\">{}</rdf:li></rdf:Alt></dc:title>\n",
            escape(title)
        ));
    }
    if let Some(creator) = &payload.summary.creator {
        props.push_str(&format!(
            "   <dc:creator><rdf:Seq><rdf:li>{}</rdf:li></rdf:Seq></dc:creator>\n",
            escape(creator)
        ));
    }

    format!(
        "<?xpacket begin=\"\u{FEFF}\" id=\"W5M0MpCehiHzreSzNTczkc9d\"?>\n\
         <x:xmpmeta xmlns:x=\"adobe:ns:meta/\">\n \
         <rdf:RDF xmlns:rdf=\"http://www.w3.org/1999/02/22-rdf-syntax-ns#\">\n  \
         <rdf:Description rdf:about=\"\"\n    \
         xmlns:dc=\"http://purl.org/dc/elements/1.1/\"\n    \
         xmlns:credlink=\"{CREDLINK_NAMESPACE}\"\n    \
         credlink:proof=\"{}\">\n\
         {props}  \
         </rdf:Description>\n \
         </rdf:RDF>\n\
         </x:xmpmeta>\n\
         <?xpacket end=\"w\"?>",
        escape(&payload.tag)
    )
}

/// Whether a packet was written by [`build_packet`] (or declares our
/// namespace), and so may be replaced on re-sign.
pub fn is_credlink_packet(packet: &[u8]) -> bool {
    find_bytes(packet, NAMESPACE_DECLARATION, 0).is_some()
}

/// Find the proof tag in an XMP packet.
///
/// Prefers the `credlink:proof` attribute; falls back to any `CredLink:`
/// text in the packet, terminated by a quote or a tag opener.
pub fn find_tag(packet: &[u8]) -> Option<String> {
    if let Some(start) = find_bytes(packet, PROOF_ATTRIBUTE, 0) {
        let value_start = start + PROOF_ATTRIBUTE.len();
        let value_len = packet[value_start..].iter().position(|b| *b == b'"')?;
        let raw = std::str::from_utf8(&packet[value_start..value_start + value_len]).ok()?;
        if let Some(proof) = decode_tag(unescape(raw).as_bytes()) {
            return Some(proof);
        }
    }

    let mut from = 0;
    while let Some(start) = find_bytes(packet, TAG_PREFIX_BYTES, from) {
        let len = packet[start..]
            .iter()
            .position(|b| matches!(b, b'"' | b'<' | b'\''))
            .unwrap_or(packet.len() - start);
        if let Ok(raw) = std::str::from_utf8(&packet[start..start + len]) {
            if let Some(proof) = decode_tag(unescape(raw).as_bytes()) {
                return Some(proof);
            }
        }
        from = start + 1;
    }
    None
}

/// Locate complete `<?xpacket ... <?xpacket end=...?>` packets in raw bytes.
pub fn scan_packets(bytes: &[u8]) -> Vec<&[u8]> {
    const BEGIN: &[u8] = b"<?xpacket begin";
    const END: &[u8] = b"<?xpacket end";

    let mut packets = Vec::new();
    let mut from = 0;
    while let Some(start) = find_bytes(bytes, BEGIN, from) {
        let Some(end_start) = find_bytes(bytes, END, start) else {
            break;
        };
        let end = find_bytes(bytes, b"?>", end_start)
            .map(|p| p + 2)
            .unwrap_or(bytes.len());
        packets.push(&bytes[start..end]);
        from = end;
    }
    packets
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

pub fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ManifestBuilder;

    fn payload(uri: &str) -> Payload {
        let manifest = ManifestBuilder::new(b"x")
            .with_title("Fish & <Chips>")
            .with_creator("Test")
            .build();
        Payload::compact(uri, &manifest)
    }

    #[test]
    fn test_packet_roundtrip() {
        let uri = "https://proofs.example.com/abc123?a=1&b=\"2\"";
        let packet = build_packet(&payload(uri));
        assert!(packet.starts_with("<?xpacket begin"));
        assert!(packet.ends_with("<?xpacket end=\"w\"?>"));
        assert!(packet.contains("Fish &amp; &lt;Chips&gt;"));
        assert!(is_credlink_packet(packet.as_bytes()));
        assert_eq!(find_tag(packet.as_bytes()).as_deref(), Some(uri));
    }

    #[test]
    fn test_fallback_text_scan() {
        let packet = b"<x:xmpmeta><dc:source>CredLink:urn:proof:5</dc:source></x:xmpmeta>";
        assert!(!is_credlink_packet(packet));
        assert_eq!(find_tag(packet).as_deref(), Some("urn:proof:5"));
        assert_eq!(find_tag(b"<x:xmpmeta/>"), None);
    }

    #[test]
    fn test_scan_packets() {
        let packet = build_packet(&payload("urn:proof:1"));
        let mut bytes = b"\x00\x01junk".to_vec();
        bytes.extend_from_slice(packet.as_bytes());
        bytes.extend_from_slice(b"more junk <?xpacket begin unterminated");
        let found = scan_packets(&bytes);
        assert_eq!(found, vec![packet.as_bytes()]);
    }

    #[test]
    fn test_escape_unescape() {
        let text = "a&b<c>\"d\"'e'";
        assert_eq!(unescape(&escape(text)), text);
        assert_eq!(unescape("&amp;lt;"), "&lt;");
    }
}
