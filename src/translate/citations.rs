//! Removal of the upstream service's inline citation markers.
//!
//! Markers look like `[citation:3]` or `\u{3010}\u{5f15}\u{7528}:5-7\u{3011}`
//! (the CJK-bracketed localized form) and reference upstream web sources that
//! mean nothing to an OpenAI-compatible client. Stripping runs once over the
//! fully assembled content, never per-fragment, because a marker can straddle
//! frame boundaries.

use regex::Regex;
use std::sync::OnceLock;

static CITATION: OnceLock<Regex> = OnceLock::new();

fn citation_pattern() -> &'static Regex {
    CITATION.get_or_init(|| {
        Regex::new(r"[\[\u{3010}]\s*(?:citation|\u{5f15}\u{7528}):\d+(?:-\d+)?\s*[\]\u{3011}]")
            .expect("citation pattern is valid")
    })
}

/// Remove every citation marker from `content`. Text outside the matches,
/// including surrounding whitespace, is left untouched.
pub fn strip_citations(content: &str) -> String {
    citation_pattern().replace_all(content, "").into_owned()
}
