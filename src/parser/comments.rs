//! `ensureUI` comment scanning
//!
//! A block opens on `// ensureUI: <text>` (or a bare `// ensureUI`) and
//! swallows the plain `//` comment lines directly below it. The block's text
//! is the space-joined concatenation of every fragment, anchored at the
//! marker's line.

use super::types::RawComment;
use regex::Regex;
use std::sync::OnceLock;

fn marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*//\s*ensureUI\b\s*:?\s*(.*)$").expect("valid marker regex")
    })
}

fn comment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*//(.*)$").expect("valid comment regex"))
}

/// Returns the marker's inline text when `line` opens a block.
fn marker_text(line: &str) -> Option<&str> {
    marker_re()
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
}

fn continuation_text(line: &str) -> Option<&str> {
    if marker_text(line).is_some() {
        return None;
    }
    comment_re()
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
}

/// Merge `ensureUI` blocks in a single forward pass.
///
/// Continuation lines are consumed exactly once; blocks whose merged text is
/// empty produce nothing.
pub fn merge_comment_blocks(source: &str) -> Vec<RawComment> {
    let lines: Vec<&str> = source.lines().collect();
    let mut blocks = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let Some(first) = marker_text(lines[i]) else {
            i += 1;
            continue;
        };

        let line_number = i + 1;
        let mut fragments: Vec<&str> = Vec::new();
        if !first.is_empty() {
            fragments.push(first);
        }

        i += 1;
        while i < lines.len() {
            match continuation_text(lines[i]) {
                Some(text) => {
                    if !text.is_empty() {
                        fragments.push(text);
                    }
                    i += 1;
                }
                None => break,
            }
        }

        if !fragments.is_empty() {
            blocks.push(RawComment {
                text: fragments.join(" "),
                line_number,
            });
        }
    }

    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_line_marker() {
        let src = r#"import x from "y";
// ensureUI: the page shows "About Us" heading
export default function About() {}
"#;
        let blocks = merge_comment_blocks(src);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].text, r#"the page shows "About Us" heading"#);
        assert_eq!(blocks[0].line_number, 2);
    }

    #[test]
    fn test_continuation_lines_are_merged_in_order() {
        let src = "// ensureUI: user clicks login\n//   then sees the form\n// and the submit button\nconst a = 1;\n// unrelated comment";
        let blocks = merge_comment_blocks(src);
        assert_eq!(blocks.len(), 1);
        assert_eq!(
            blocks[0].text,
            "user clicks login then sees the form and the submit button"
        );
        assert_eq!(blocks[0].line_number, 1);
    }

    #[test]
    fn test_bare_marker_takes_text_from_continuations() {
        let src = "  // ensureUI\n  // shows a pricing table\n\n// ensureUI\nfoo();";
        let blocks = merge_comment_blocks(src);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].text, "shows a pricing table");
    }

    #[test]
    fn test_new_marker_stops_previous_block() {
        let src = "// ensureUI: first\n// more first\n// ensureUI: second\n// more second";
        let blocks = merge_comment_blocks(src);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].text, "first more first");
        assert_eq!(blocks[1].text, "second more second");
        assert_eq!(blocks[1].line_number, 3);
    }

    #[test]
    fn test_continuation_never_reopens_as_block() {
        // The second line mentions ensureUI only mid-sentence; it is a continuation.
        let src = "// ensureUI: header is visible\n// note that ensureUI checks run live\nx();";
        let blocks = merge_comment_blocks(src);
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].text.ends_with("note that ensureUI checks run live"));
    }

    #[test]
    fn test_empty_comment_lines_do_not_double_spaces() {
        let src = "// ensureUI: a\n//\n// b";
        let blocks = merge_comment_blocks(src);
        assert_eq!(blocks[0].text, "a b");
    }
}
