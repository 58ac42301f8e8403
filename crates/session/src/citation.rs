//! Citation markers embedded in assistant messages.
//!
//! Assistant content may carry `{{quote:ID}}` markers pointing at entries
//! of the message's `quotes` list. Rendering splits the content into text
//! and citation segments; a citation's display index is the 1-based
//! position of its reference id within `quotes`, so the numbering stays
//! stable however often or in whatever order the markers appear. A marker
//! whose id is not declared in `quotes` is elided entirely.

use std::sync::LazyLock;

use regex::Regex;

static MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{quote:(\d+)\}\}").expect("marker regex"));

// Distinct shields so unshielding restores the exact indentation.
const SHIELD_SPACE: char = '\u{00A0}';
const SHIELD_TAB: char = '\u{2007}';

/// One rendered piece of an assistant message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Citation {
        /// 1-based position of `reference_id` in the message's quotes
        display_index: usize,
        reference_id: i64,
    },
}

/// Split `content` into text and citation segments against the message's
/// declared `quotes`. Unknown markers vanish; adjacent markers yield no
/// empty text segment between them.
pub fn parse_segments(content: &str, quotes: &[i64]) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut cursor = 0;

    for captures in MARKER.captures_iter(content) {
        let whole = captures.get(0).expect("match");
        if whole.start() > cursor {
            segments.push(Segment::Text(content[cursor..whole.start()].to_string()));
        }
        cursor = whole.end();

        let Ok(reference_id) = captures[1].parse::<i64>() else {
            continue;
        };
        if let Some(position) = quotes.iter().position(|&q| q == reference_id) {
            segments.push(Segment::Citation {
                display_index: position + 1,
                reference_id,
            });
        }
    }

    if cursor < content.len() {
        segments.push(Segment::Text(content[cursor..].to_string()));
    }
    segments
}

/// Render with inline `[n]` citation markers, for plain-text surfaces.
pub fn render_plain(content: &str, quotes: &[i64]) -> String {
    let mut out = String::with_capacity(content.len());
    for segment in parse_segments(content, quotes) {
        match segment {
            Segment::Text(text) => out.push_str(&text),
            Segment::Citation { display_index, .. } => {
                out.push('[');
                out.push_str(&display_index.to_string());
                out.push(']');
            }
        }
    }
    out
}

/// Replace leading spaces and tabs on each line with non-breaking
/// equivalents so a markdown renderer cannot mistake indented prose for a
/// code block.
pub fn shield_indentation(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    for (i, line) in content.split('\n').enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let body = line.trim_start_matches([' ', '\t']);
        for c in line[..line.len() - body.len()].chars() {
            out.push(if c == '\t' { SHIELD_TAB } else { SHIELD_SPACE });
        }
        out.push_str(body);
    }
    out
}

/// Reverse of `shield_indentation`
pub fn unshield_indentation(content: &str) -> String {
    content
        .replace(SHIELD_SPACE, " ")
        .replace(SHIELD_TAB, "\t")
}
