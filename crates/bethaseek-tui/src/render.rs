//! Turn conversations into styled ratatui lines.

use bethaseek_core::segment::{segment, Inline, ProseLine, Segment};
use bethaseek_core::{CodeBlock, Conversation, Message, Sender};
use chrono::Local;
use ratatui::{
    style::{Color, Modifier, Style},
    text::{Line, Span},
};

pub fn conversation_lines(conversation: &Conversation, animation_frame: u8) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    for message in &conversation.messages {
        lines.extend(message_lines(message, animation_frame));
        lines.push(Line::default());
    }
    lines
}

fn message_lines(message: &Message, animation_frame: u8) -> Vec<Line<'static>> {
    let (label, color) = match message.sender {
        Sender::User => ("Você", Color::Cyan),
        Sender::Assistant => ("BethaSeek", Color::Yellow),
    };
    let time = message.timestamp.with_timezone(&Local).format("%H:%M").to_string();

    let mut lines = vec![Line::from(vec![
        Span::styled(
            format!("{}:", label),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        ),
        Span::styled(format!(" {}", time), Style::default().fg(Color::DarkGray)),
    ])];

    if message.pending {
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((animation_frame as usize % 3) + 1);
        lines.push(Line::from(Span::styled(
            format!("Pensando{}", dots),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
        return lines;
    }

    match message.sender {
        // User text is shown as typed
        Sender::User => lines.extend(message.content.lines().map(|l| Line::from(l.to_string()))),
        Sender::Assistant => lines.extend(segment_lines(&segment(&message.content))),
    }
    lines
}

pub fn segment_lines(segments: &[Segment]) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    for seg in segments {
        match seg {
            Segment::Prose(prose) => lines.extend(prose.iter().map(prose_line)),
            Segment::Code(block) => lines.extend(code_lines(block)),
        }
    }
    lines
}

fn prose_line(line: &ProseLine) -> Line<'static> {
    match line {
        ProseLine::Heading { level, content } => {
            let style = match level {
                1 => Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
                2 => Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                _ => Style::default().add_modifier(Modifier::BOLD),
            };
            Line::from(inline_spans(content, style))
        }
        ProseLine::Bullet(content) => {
            let mut spans = vec![Span::raw("  • ")];
            spans.extend(inline_spans(content, Style::default()));
            Line::from(spans)
        }
        ProseLine::Blank => Line::default(),
        ProseLine::Paragraph(content) => Line::from(inline_spans(content, Style::default())),
    }
}

fn inline_spans(inlines: &[Inline], base: Style) -> Vec<Span<'static>> {
    inlines
        .iter()
        .map(|inline| match inline {
            Inline::Text(text) => Span::styled(text.clone(), base),
            Inline::Bold(text) => Span::styled(text.clone(), base.add_modifier(Modifier::BOLD)),
            Inline::Code(text) => Span::styled(text.clone(), base.fg(Color::Cyan)),
        })
        .collect()
}

fn code_lines(block: &CodeBlock) -> Vec<Line<'static>> {
    let frame = Style::default().fg(Color::DarkGray);
    let mut lines = vec![Line::from(Span::styled(format!("┌─ {}", block.language), frame))];
    for code in block.body.lines() {
        lines.push(Line::from(vec![
            Span::styled("│ ", frame),
            Span::styled(code.to_string(), Style::default().fg(Color::Green)),
        ]));
    }
    lines.push(Line::from(Span::styled("└─", frame)));
    lines
}

/// Word-wrap styled lines to `width` columns.
///
/// The transcript is drawn from these rows without any further wrapping, so
/// `len()` of the result is exactly the number of rows on screen. Words wider
/// than a row are broken between characters.
pub fn wrap_lines(lines: &[Line<'static>], width: u16) -> Vec<Line<'static>> {
    let width = width.max(1) as usize;
    let mut rows = Vec::with_capacity(lines.len());
    for line in lines {
        let start = rows.len();
        let mut row = RowBuilder::new(width);
        for span in &line.spans {
            for (piece, is_space) in split_words(&span.content) {
                if is_space {
                    row.push_space(piece, span.style, &mut rows);
                } else {
                    row.push_word(piece, span.style, &mut rows);
                }
            }
        }
        rows.push(Line::from(row.spans));
        for wrapped in &mut rows[start..] {
            wrapped.style = line.style;
        }
    }
    rows
}

struct RowBuilder {
    width: usize,
    used: usize,
    spans: Vec<Span<'static>>,
}

impl RowBuilder {
    fn new(width: usize) -> Self {
        Self { width, used: 0, spans: Vec::new() }
    }

    fn break_row(&mut self, rows: &mut Vec<Line<'static>>) {
        // Trailing whitespace at a wrap point is not shown
        while self.spans.last().is_some_and(|s| s.content.trim().is_empty()) {
            self.spans.pop();
        }
        rows.push(Line::from(std::mem::take(&mut self.spans)));
        self.used = 0;
    }

    fn push_space(&mut self, piece: &str, style: Style, rows: &mut Vec<Line<'static>>) {
        let w = Span::raw(piece).width();
        if self.used + w > self.width {
            // Whitespace that starts a wrapped row is dropped
            if self.used > 0 {
                self.break_row(rows);
            }
            return;
        }
        self.spans.push(Span::styled(piece.to_string(), style));
        self.used += w;
    }

    fn push_word(&mut self, piece: &str, style: Style, rows: &mut Vec<Line<'static>>) {
        let w = Span::raw(piece).width();
        if self.used + w <= self.width {
            self.spans.push(Span::styled(piece.to_string(), style));
            self.used += w;
            return;
        }
        if self.used > 0 {
            self.break_row(rows);
            if w <= self.width {
                self.spans.push(Span::styled(piece.to_string(), style));
                self.used = w;
                return;
            }
        }

        let mut chunk = String::new();
        for c in piece.chars() {
            let cw = Span::raw(c.to_string()).width();
            if self.used + cw > self.width && self.used > 0 {
                self.spans.push(Span::styled(std::mem::take(&mut chunk), style));
                self.break_row(rows);
            }
            chunk.push(c);
            self.used += cw;
        }
        if !chunk.is_empty() {
            self.spans.push(Span::styled(chunk, style));
        }
    }
}

/// Split into alternating runs of whitespace and non-whitespace.
fn split_words(text: &str) -> Vec<(&str, bool)> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut current: Option<bool> = None;
    for (i, c) in text.char_indices() {
        let is_space = c.is_whitespace();
        if current.is_some_and(|kind| kind != is_space) {
            pieces.push((&text[start..i], !is_space));
            start = i;
        }
        current = Some(is_space);
    }
    if let Some(kind) = current {
        pieces.push((&text[start..], kind));
    }
    pieces
}

/// All code blocks of a response, re-fenced, for the clipboard.
pub fn code_blocks_for_copy(content: &str) -> Option<String> {
    let blocks: Vec<String> = segment(content)
        .iter()
        .filter_map(|seg| match seg {
            Segment::Code(block) => Some(block.serialize()),
            Segment::Prose(_) => None,
        })
        .collect();
    (!blocks.is_empty()).then(|| blocks.join("\n\n"))
}
