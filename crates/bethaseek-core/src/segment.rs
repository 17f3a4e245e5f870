//! Split a response into prose and code segments ready for display.
//!
//! Code segments come from fenced blocks (normalized, see [`crate::normalize`]).
//! Prose is split into physical lines, each classified as heading, bullet,
//! blank or paragraph, with `**bold**` and `` `code` `` spans picked out.

use std::sync::LazyLock;

use regex::Regex;

use crate::normalize::{normalize, CodeBlock, FENCE_RE};

static BOLD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*(.+?)\*\*").expect("bold pattern is valid"));
static CODE_SPAN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`([^`]+)`").expect("code span pattern is valid"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Prose(Vec<ProseLine>),
    Code(CodeBlock),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProseLine {
    Heading { level: u8, content: Vec<Inline> },
    Bullet(Vec<Inline>),
    Blank,
    Paragraph(Vec<Inline>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inline {
    Text(String),
    Bold(String),
    Code(String),
}

/// Split `text` into alternating prose and code segments.
///
/// Text without any complete fence comes back as a single prose segment, even
/// when empty. Unterminated fences are left in the prose.
pub fn segment(text: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut cursor = 0;

    for fence in FENCE_RE.find_iter(text) {
        push_prose(&mut segments, &text[cursor..fence.start()], cursor > 0);
        segments.push(Segment::Code(normalize(fence.as_str())));
        cursor = fence.end();
    }

    if segments.is_empty() {
        return vec![Segment::Prose(parse_prose(text))];
    }

    push_prose(&mut segments, &text[cursor..], true);
    segments
}

fn push_prose(segments: &mut Vec<Segment>, span: &str, after_fence: bool) {
    // The newline closing a fence line belongs to the fence.
    let span = if after_fence {
        span.strip_prefix("\r\n")
            .or_else(|| span.strip_prefix('\n'))
            .unwrap_or(span)
    } else {
        span
    };
    if !span.is_empty() {
        segments.push(Segment::Prose(parse_prose(span)));
    }
}

pub fn parse_prose(text: &str) -> Vec<ProseLine> {
    text.lines().map(parse_line).collect()
}

fn parse_line(line: &str) -> ProseLine {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return ProseLine::Blank;
    }

    for (marker, level) in [("### ", 3), ("## ", 2), ("# ", 1)] {
        if let Some(rest) = trimmed.strip_prefix(marker) {
            return ProseLine::Heading {
                level,
                content: parse_inline(rest),
            };
        }
    }

    if let Some(rest) = trimmed.strip_prefix("- ").or_else(|| trimmed.strip_prefix("* ")) {
        return ProseLine::Bullet(parse_inline(rest));
    }

    ProseLine::Paragraph(parse_inline(line))
}

/// Pick out bold and code spans; earlier starts win when matches overlap.
pub fn parse_inline(text: &str) -> Vec<Inline> {
    let mut spans: Vec<(usize, usize, Inline)> = Vec::new();
    for m in BOLD_RE.find_iter(text) {
        let inner = &text[m.start() + 2..m.end() - 2];
        spans.push((m.start(), m.end(), Inline::Bold(inner.to_string())));
    }
    for m in CODE_SPAN_RE.find_iter(text) {
        let inner = &text[m.start() + 1..m.end() - 1];
        spans.push((m.start(), m.end(), Inline::Code(inner.to_string())));
    }
    spans.sort_by_key(|(start, _, _)| *start);

    let mut inlines = Vec::new();
    let mut cursor = 0;
    for (start, end, inline) in spans {
        if start < cursor {
            continue;
        }
        if start > cursor {
            inlines.push(Inline::Text(text[cursor..start].to_string()));
        }
        inlines.push(inline);
        cursor = end;
    }
    if cursor < text.len() {
        inlines.push(Inline::Text(text[cursor..].to_string()));
    }
    inlines
}
