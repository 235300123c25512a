//! Shrinks rendered HTML before it is handed to the generator

use regex::Regex;
use std::sync::OnceLock;

fn noise_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?is)<script\b[^>]*>.*?</script\s*>|<style\b[^>]*>.*?</style\s*>|<svg\b[^>]*>.*?</svg\s*>|<noscript\b[^>]*>.*?</noscript\s*>|<!--.*?-->",
        )
        .unwrap()
    })
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

/// Drop scripts, styles, inline SVG and comments, collapse whitespace, then
/// cut to `max_chars` characters.
pub fn reduce_html(html: &str, max_chars: usize) -> String {
    let stripped = noise_re().replace_all(html, "");
    let collapsed = whitespace_re().replace_all(&stripped, " ");
    let trimmed = collapsed.trim();

    match trimmed.char_indices().nth(max_chars) {
        Some((idx, _)) => trimmed[..idx].to_string(),
        None => trimmed.to_string(),
    }
}

/// Visible text of an HTML document, tags removed and whitespace collapsed.
pub fn visible_text(html: &str) -> String {
    static TAG: OnceLock<Regex> = OnceLock::new();
    let tag = TAG.get_or_init(|| Regex::new(r"(?s)<[^>]*>").unwrap());

    let stripped = noise_re().replace_all(html, " ");
    let text = tag.replace_all(&stripped, " ");
    let text = decode_entities(&text);
    whitespace_re().replace_all(&text, " ").trim().to_string()
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
