// SPDX-License-Identifier: AGPL-3.0-or-later
//! Line-oriented MEBDF tokenizer
//!
//! Each line yields at most one line-start token (heading marker, list marker,
//! table row, table separator or standalone block directive) followed by inline
//! tokens. Lines are separated by `Newline` tokens. Tokens borrow from the
//! input; the tokenizer never fails, anything it cannot recognise is text.

use crate::ast::{ListKind, Span};

/// Characters a backslash escapes
pub const ESCAPABLE: &[u8] = b"\\*[]{}|<#-.";

/// A single line from the input with its source position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Line<'a> {
    /// Line text without the terminator (a trailing `\r` is dropped)
    pub text: &'a str,
    /// Byte offset of the line in the input
    pub offset: usize,
    /// 1-based line number
    pub number: u32,
}

/// Split input into lines. Empty input has no lines.
pub fn lines(input: &str) -> Vec<Line<'_>> {
    if input.is_empty() {
        return Vec::new();
    }
    let mut out = Vec::new();
    let mut offset = 0;
    for (index, raw) in input.split('\n').enumerate() {
        let text = raw.strip_suffix('\r').unwrap_or(raw);
        out.push(Line {
            text,
            offset,
            number: index as u32 + 1,
        });
        offset += raw.len() + 1;
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind<'a> {
    // Line-start tokens
    Heading(u8),
    ListMarker { kind: ListKind, depth: u8 },
    /// Whole line is `{!props}`; carries the raw props
    BlockDirective(&'a str),
    /// Leading `|` of a table row
    TableRow,
    /// `| --- | :-: |`
    TableSeparator,

    // Inline tokens
    Text(&'a str),
    Escaped(char),
    Stars {
        count: usize,
        can_open: bool,
        can_close: bool,
    },
    /// `{!props}`; carries the raw props
    FormatOpen(&'a str),
    FormatClose,
    /// `{^ id}` / `{^}`; carries everything after the caret
    Anchor(&'a str),
    /// `{^= id type}`; carries everything after the `=`
    Object(&'a str),
    LinkOpen,
    /// `](url)`; carries the url
    LinkClose(&'a str),
    /// Cell separator inside a table row
    Pipe,
    /// `<br>` inside a table row
    LineBreak,
    /// Unterminated directive opener; reverts to text with a warning
    Malformed(&'a str),

    Newline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind<'a>,
    pub span: Span,
}

/// How a line is classified
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineMode {
    /// Detect line-start constructs
    Auto,
    /// Plain paragraph content, no line-start detection
    Paragraph,
    /// Table row, even if it looks like a separator
    Row,
}

/// Tokenize a whole document
pub fn tokenize(input: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut previous: Option<Line<'_>> = None;
    for line in lines(input) {
        if let Some(prev) = previous {
            let end = prev.offset + prev.text.len();
            tokens.push(Token {
                kind: TokenKind::Newline,
                span: Span {
                    start: end,
                    end: line.offset,
                    line: prev.number,
                    column: prev.text.len() as u32 + 1,
                },
            });
        }
        tokenize_line(line, LineMode::Auto, &mut tokens);
        previous = Some(line);
    }
    tokens
}

/// Tokenize one line, appending to `out`
pub fn tokenize_line<'a>(line: Line<'a>, mode: LineMode, out: &mut Vec<Token<'a>>) {
    let mut lexer = LineLexer { line, out };
    match mode {
        LineMode::Paragraph => lexer.inline(0, false),
        LineMode::Row => lexer.row(),
        LineMode::Auto => lexer.classify(),
    }
}

pub fn is_separator_row(text: &str) -> bool {
    let trimmed = text.trim();
    trimmed.starts_with('|')
        && trimmed.contains('-')
        && trimmed.bytes().all(|b| matches!(b, b'|' | b'-' | b':' | b' ' | b'\t'))
}

/// Inner props of a line that is exactly `{!props}` (surrounding whitespace allowed)
pub fn standalone_directive(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    let inner = trimmed.strip_prefix("{!")?.strip_suffix('}')?;
    if inner.contains(['{', '}']) {
        return None;
    }
    Some(inner)
}

/// Length of a `N. ` ordered marker at the start of `text`
pub fn ordered_marker_len(text: &str) -> Option<usize> {
    let digits = text.bytes().take_while(u8::is_ascii_digit).count();
    if digits > 0 && text[digits..].starts_with(". ") {
        Some(digits + 2)
    } else {
        None
    }
}

struct LineLexer<'a, 'o> {
    line: Line<'a>,
    out: &'o mut Vec<Token<'a>>,
}

impl<'a> LineLexer<'a, '_> {
    fn push(&mut self, kind: TokenKind<'a>, start: usize, end: usize) {
        self.out.push(Token {
            kind,
            span: Span {
                start: self.line.offset + start,
                end: self.line.offset + end,
                line: self.line.number,
                column: start as u32 + 1,
            },
        });
    }

    fn classify(&mut self) {
        let text = self.line.text;

        if let Some(props) = standalone_directive(text) {
            self.push(TokenKind::BlockDirective(props), 0, text.len());
            return;
        }

        let hashes = text.bytes().take_while(|&b| b == b'#').count();
        if (1..=6).contains(&hashes) && (text.len() == hashes || text.as_bytes()[hashes] == b' ') {
            let marker_end = (hashes + 1).min(text.len());
            self.push(TokenKind::Heading(hashes as u8), 0, marker_end);
            self.inline(marker_end, false);
            return;
        }

        if text.starts_with('|') {
            if is_separator_row(text) {
                self.push(TokenKind::TableSeparator, 0, text.len());
            } else {
                self.row();
            }
            return;
        }

        let indent_len = text.bytes().take_while(|&b| b == b' ' || b == b'\t').count();
        let indent = &text[..indent_len];
        let rest = &text[indent_len..];
        let marker = if rest.starts_with("- ") || rest.starts_with("* ") {
            Some((ListKind::Bullet, 2))
        } else {
            ordered_marker_len(rest).map(|len| (ListKind::Ordered, len))
        };
        if let Some((kind, len)) = marker {
            let spaces = indent.bytes().filter(|&b| b == b' ').count();
            let tabs = indent.len() - spaces;
            let depth = (spaces / 2 + tabs).min(u8::MAX as usize) as u8;
            self.push(TokenKind::ListMarker { kind, depth }, 0, indent_len + len);
            self.inline(indent_len + len, false);
            return;
        }

        self.inline(0, false);
    }

    fn row(&mut self) {
        if self.line.text.starts_with('|') {
            self.push(TokenKind::TableRow, 0, 1);
            self.inline(1, true);
        } else {
            self.inline(0, true);
        }
    }

    fn inline(&mut self, from: usize, table: bool) {
        let text = self.line.text;
        let bytes = text.as_bytes();
        let mut i = from;
        let mut text_start = from;

        while i < bytes.len() {
            let rest = &text[i..];
            let (kind, len) = match bytes[i] {
                b'\\' if i + 1 < bytes.len() && ESCAPABLE.contains(&bytes[i + 1]) => {
                    (TokenKind::Escaped(bytes[i + 1] as char), 2)
                }
                b'*' => {
                    let count = bytes[i..].iter().take_while(|&&b| b == b'*').count();
                    let prev = text[..i].chars().next_back();
                    let next = text[i + count..].chars().next();
                    let kind = TokenKind::Stars {
                        count,
                        can_open: next.is_some_and(|c| !c.is_whitespace()),
                        can_close: prev.is_some_and(|c| !c.is_whitespace()),
                    };
                    (kind, count)
                }
                b'{' if rest.starts_with("{/!}") => (TokenKind::FormatClose, 4),
                b'{' if rest.starts_with("{!") => match directive_end(text, i + 2) {
                    Some(end) => (TokenKind::FormatOpen(&text[i + 2..end]), end + 1 - i),
                    None => (TokenKind::Malformed("{!"), 2),
                },
                b'{' if rest.starts_with("{^") => match directive_end(text, i + 2) {
                    Some(end) => {
                        let inner = &text[i + 2..end];
                        let kind = match inner.strip_prefix('=') {
                            Some(object) => TokenKind::Object(object),
                            None => TokenKind::Anchor(inner),
                        };
                        (kind, end + 1 - i)
                    }
                    None => (TokenKind::Malformed("{^"), 2),
                },
                b'[' => (TokenKind::LinkOpen, 1),
                b']' if rest.starts_with("](") => match text[i + 2..].find(')') {
                    Some(close) => (TokenKind::LinkClose(&text[i + 2..i + 2 + close]), close + 3),
                    None => {
                        i += 1;
                        continue;
                    }
                },
                b'|' if table => (TokenKind::Pipe, 1),
                b'<' if table && rest.starts_with("<br>") => (TokenKind::LineBreak, 4),
                _ => {
                    i += 1;
                    continue;
                }
            };
            if text_start < i {
                self.push(TokenKind::Text(&text[text_start..i]), text_start, i);
            }
            self.push(kind, i, i + len);
            i += len;
            text_start = i;
        }

        if text_start < bytes.len() {
            self.push(TokenKind::Text(&text[text_start..]), text_start, bytes.len());
        }
    }
}

/// Index of the `}` closing a directive whose body starts at `from`
fn directive_end(text: &str, from: usize) -> Option<usize> {
    for (offset, b) in text.as_bytes()[from..].iter().enumerate() {
        match b {
            b'}' => return Some(from + offset),
            b'{' => return None,
            _ => {}
        }
    }
    None
}
