//! Projection of messages into drawable form.
//!
//! Assistant replies pass through a small markdown parser covering the
//! subset chat models actually produce:
//! - `# Heading` through `#### Heading`
//! - `**bold**`
//! - `- bullet` and `* bullet` list items
//! - `[text](url)` links
//! - `` `inline code` ``
//! - blank lines as paragraph breaks
//!
//! User text is never parsed: whatever was typed shows up verbatim, so
//! markup (or a stray `<script>`) can never become anything but text.

use shared::api::{ChatMessage, Role};

/// One drawable line of a message.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Heading { level: u8, text: String },
    Bullet(Vec<Span>),
    Paragraph(Vec<Span>),
    Blank,
}

/// Inline run with one style applied.
#[derive(Debug, Clone, PartialEq)]
pub enum Span {
    Text(String),
    Bold(String),
    Code(String),
    Link { text: String, url: String },
}

/// A message projected for display.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedMessage {
    pub role: Role,
    pub blocks: Vec<Block>,
}

/// Project messages into drawable form, preserving order. Calling this
/// twice on unchanged input yields an identical projection.
pub fn project(messages: &[ChatMessage]) -> Vec<RenderedMessage> {
    messages
        .iter()
        .map(|msg| RenderedMessage {
            role: msg.role,
            blocks: match msg.role {
                Role::User => vec![Block::Paragraph(vec![Span::Text(msg.content.clone())])],
                Role::Assistant => parse(&msg.content),
            },
        })
        .collect()
}

/// Parse assistant markdown into blocks.
pub fn parse(text: &str) -> Vec<Block> {
    let mut blocks = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim();

        if trimmed.is_empty() {
            blocks.push(Block::Blank);
            continue;
        }

        if let Some((level, rest)) = heading(trimmed) {
            blocks.push(Block::Heading {
                level,
                text: rest.to_string(),
            });
            continue;
        }

        if let Some(rest) = trimmed
            .strip_prefix("- ")
            .or_else(|| trimmed.strip_prefix("* "))
        {
            blocks.push(Block::Bullet(parse_inline(rest)));
            continue;
        }

        blocks.push(Block::Paragraph(parse_inline(trimmed)));
    }

    blocks
}

fn heading(line: &str) -> Option<(u8, &str)> {
    for (prefix, level) in [("#### ", 4u8), ("### ", 3), ("## ", 2), ("# ", 1)] {
        if let Some(rest) = line.strip_prefix(prefix) {
            return Some((level, rest));
        }
    }
    None
}

#[derive(Debug)]
enum Marker {
    Bold, // **
    Code, // `
    Link, // [ with ]( ahead
}

/// Split a line into styled spans. Unclosed markers come out as literal
/// text rather than swallowing the rest of the line.
fn parse_inline(text: &str) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        let Some((pos, marker)) = next_marker(remaining) else {
            spans.push(Span::Text(remaining.to_string()));
            break;
        };

        if pos > 0 {
            spans.push(Span::Text(remaining[..pos].to_string()));
        }

        match marker {
            Marker::Bold => {
                let after = &remaining[pos + 2..];
                if let Some(end) = after.find("**") {
                    spans.push(Span::Bold(after[..end].to_string()));
                    remaining = &after[end + 2..];
                } else {
                    spans.push(Span::Text(format!("**{after}")));
                    break;
                }
            }
            Marker::Code => {
                let after = &remaining[pos + 1..];
                if let Some(end) = after.find('`') {
                    spans.push(Span::Code(after[..end].to_string()));
                    remaining = &after[end + 1..];
                } else {
                    spans.push(Span::Text(format!("`{after}")));
                    break;
                }
            }
            Marker::Link => {
                let after = &remaining[pos + 1..];
                // next_marker only fires when "](" is somewhere ahead
                let Some(close) = after.find("](") else {
                    spans.push(Span::Text(format!("[{after}")));
                    break;
                };
                let link_text = &after[..close];
                let rest = &after[close + 2..];
                if let Some(end) = rest.find(')') {
                    spans.push(Span::Link {
                        text: link_text.to_string(),
                        url: rest[..end].to_string(),
                    });
                    remaining = &rest[end + 1..];
                } else {
                    spans.push(Span::Text(format!("[{link_text}](")));
                    remaining = rest;
                }
            }
        }
    }

    spans
}

fn next_marker(text: &str) -> Option<(usize, Marker)> {
    let mut best: Option<(usize, Marker)> = None;

    if let Some(pos) = text.find("**") {
        best = Some((pos, Marker::Bold));
    }
    if let Some(pos) = text.find('`') {
        if best.as_ref().map_or(true, |(b, _)| pos < *b) {
            best = Some((pos, Marker::Code));
        }
    }
    if let Some(pos) = text.find('[') {
        if text[pos..].contains("](") && best.as_ref().map_or(true, |(b, _)| pos < *b) {
            best = Some((pos, Marker::Link));
        }
    }

    best
}
