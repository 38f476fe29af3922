//! Free-text sanitization for manifest fields.
//!
//! Strips active HTML constructs from user-supplied text before it is
//! embedded. The sanitizer is total (any input yields a string) and
//! idempotent: passes are repeated until the text stops changing, so
//! nested constructs such as `<scr<script>ipt>` cannot reassemble.

use std::sync::LazyLock;

use regex::Regex;

/// Maximum number of characters kept per free-text field.
pub const MAX_FIELD_CHARS: usize = 65_536;

/// Elements removed together with their content.
const BLOCK_ELEMENTS: &[&str] = &["script", "iframe", "object", "embed", "form"];

/// Elements whose remaining opening or closing tags are removed.
const TAG_ELEMENTS: &str = "script|iframe|object|embed|form|input|img";

static BLOCK_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    BLOCK_ELEMENTS
        .iter()
        .map(|name| {
            Regex::new(&format!(r"(?is)<\s*{name}\b[^>]*>.*?<\s*/\s*{name}\s*>"))
                .expect("invalid block element pattern")
        })
        .collect()
});

static TAG_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)<\s*/?\s*(?:{TAG_ELEMENTS})\b[^>]*>?"))
        .expect("invalid tag pattern")
});

static SCHEME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:javascript|vbscript)\s*:").expect("invalid scheme pattern")
});

static EVENT_HANDLER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bon\w+\s*=").expect("invalid event handler pattern"));

/// Sanitize one free-text field.
pub fn sanitize_text(input: &str) -> String {
    let mut current = truncate_chars(input, MAX_FIELD_CHARS).to_string();
    loop {
        let next = sanitize_pass(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

/// Sanitize an optional field; text that sanitizes to nothing becomes `None`.
pub fn sanitize_field(input: Option<&str>) -> Option<String> {
    input.map(sanitize_text).filter(|s| !s.is_empty())
}

fn sanitize_pass(input: &str) -> String {
    let mut text = input.to_string();
    for pattern in BLOCK_PATTERNS.iter() {
        text = pattern.replace_all(&text, "").into_owned();
    }
    text = TAG_PATTERN.replace_all(&text, "").into_owned();
    text = SCHEME_PATTERN.replace_all(&text, "").into_owned();
    text = EVENT_HANDLER_PATTERN.replace_all(&text, "").into_owned();
    text.trim().to_string()
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
