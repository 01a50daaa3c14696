// SPDX-License-Identifier: AGPL-3.0-or-later
//! MEBDF parser: tokens → AST
//!
//! One line is one block. Inline markup is resolved with a frame stack; frames
//! still open at the end of a line revert to literal text.

use super::props;
use super::tokenizer::{self, Line, LineMode, Token, TokenKind};
use crate::ast::{
    AnchorId, Block, BlockFormattingState, Document, Inline, LinkTarget, ObjectKind, Span,
    TableCell, TableRow, TextFormatting,
};
use crate::traits::{ParseWarning, WarningKind};

/// Result of parsing: the document plus any recoverable problems
#[derive(Debug, Clone, PartialEq)]
pub struct ParseResult {
    pub document: Document,
    pub warnings: Vec<ParseWarning>,
}

impl ParseResult {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Parse MEBDF text. Never fails; malformed markup becomes text plus a warning.
pub fn parse(input: &str) -> ParseResult {
    let mut parser = BlockParser {
        input,
        lines: tokenizer::lines(input),
        blocks: Vec::new(),
        warnings: Vec::new(),
        state: BlockFormattingState::default(),
        directive_base: None,
    };
    parser.run();
    if !parser.warnings.is_empty() {
        tracing::debug!(warnings = parser.warnings.len(), "parsed MEBDF with warnings");
    }
    ParseResult {
        document: Document::new(parser.blocks),
        warnings: parser.warnings,
    }
}

fn line_tokens(line: Line<'_>, mode: LineMode) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    tokenizer::tokenize_line(line, mode, &mut tokens);
    tokens
}

struct BlockParser<'a> {
    input: &'a str,
    lines: Vec<Line<'a>>,
    blocks: Vec<Block>,
    warnings: Vec<ParseWarning>,
    /// Running block formatting
    state: BlockFormattingState,
    /// State before the trailing `BlockFormatting` node, while the last block is one
    directive_base: Option<BlockFormattingState>,
}

impl<'a> BlockParser<'a> {
    fn run(&mut self) {
        let mut index = 0;
        while index < self.lines.len() {
            let line = self.lines[index];
            let tokens = line_tokens(line, LineMode::Auto);
            match tokens.first().map(|t| t.kind) {
                Some(TokenKind::BlockDirective(raw)) => self.directive(raw, line, tokens[0].span),
                Some(TokenKind::Heading(level)) => {
                    let (anchor, rest) = self.heading_anchor(&tokens[1..]);
                    let content = self.inlines(rest);
                    self.push(Block::Heading {
                        level,
                        anchor,
                        content,
                    });
                }
                Some(TokenKind::ListMarker { kind, depth }) => {
                    let content = self.inlines(&tokens[1..]);
                    self.push(Block::ListItem {
                        kind,
                        depth,
                        content,
                    });
                }
                Some(TokenKind::TableRow) if self.separator_follows(index) => {
                    index = self.table(index);
                    continue;
                }
                Some(TokenKind::TableRow) | Some(TokenKind::TableSeparator) => {
                    let tokens = line_tokens(line, LineMode::Paragraph);
                    let content = self.inlines(&tokens);
                    self.push(Block::Paragraph { content });
                }
                _ => {
                    let content = self.inlines(&tokens);
                    self.push(Block::Paragraph { content });
                }
            }
            index += 1;
        }
    }

    fn push(&mut self, block: Block) {
        self.directive_base = None;
        self.blocks.push(block);
    }

    fn directive(&mut self, raw: &str, line: Line<'a>, span: Span) {
        let directive = match props::parse_block(raw) {
            Ok(directive) => directive,
            Err(err) => {
                self.warnings
                    .push(ParseWarning::at(span.line, span.column, err.kind, err.message));
                self.push(Block::Paragraph {
                    content: vec![Inline::text(line.text)],
                });
                return;
            }
        };
        let next = directive.apply(&self.state);
        if next == self.state {
            return;
        }
        match self.directive_base.clone() {
            Some(base) if base == next => {
                self.blocks.pop();
                self.directive_base = None;
            }
            Some(_) => {
                if let Some(Block::BlockFormatting { state }) = self.blocks.last_mut() {
                    *state = next.clone();
                }
            }
            None => {
                self.directive_base = Some(self.state.clone());
                self.blocks.push(Block::BlockFormatting {
                    state: next.clone(),
                });
            }
        }
        self.state = next;
    }

    fn heading_anchor<'t>(
        &self,
        tokens: &'t [Token<'a>],
    ) -> (Option<AnchorId>, &'t [Token<'a>]) {
        if let Some(Token {
            kind: TokenKind::Anchor(inner),
            ..
        }) = tokens.first()
        {
            if let Some(id) = anchor_id(inner) {
                return (Some(id), &tokens[1..]);
            }
        }
        (None, tokens)
    }

    fn separator_follows(&self, index: usize) -> bool {
        self.lines
            .get(index + 1)
            .is_some_and(|next| tokenizer::is_separator_row(next.text) && next.text.starts_with('|'))
    }

    /// Parse a table starting at `index`; returns the first line after it
    fn table(&mut self, index: usize) -> usize {
        let header = line_tokens(self.lines[index], LineMode::Row);
        let mut rows = vec![self.row(&header)];
        let mut next = index + 2;
        while let Some(line) = self.lines.get(next).copied() {
            if !line.text.starts_with('|') {
                break;
            }
            let tokens = line_tokens(line, LineMode::Row);
            rows.push(self.row(&tokens));
            next += 1;
        }
        self.push(Block::Table { rows });
        next
    }

    fn row(&mut self, tokens: &[Token<'a>]) -> TableRow {
        let body = match tokens.first() {
            Some(Token {
                kind: TokenKind::TableRow,
                ..
            }) => &tokens[1..],
            _ => tokens,
        };
        let mut segments: Vec<&[Token<'a>]> =
            body.split(|t| t.kind == TokenKind::Pipe).collect();
        if segments.len() > 1 && segments.last().is_some_and(|s| is_blank(s)) {
            segments.pop();
        }
        let cells = segments
            .into_iter()
            .map(|segment| self.cell(segment))
            .collect();
        TableRow { cells }
    }

    fn cell(&mut self, tokens: &[Token<'a>]) -> TableCell {
        let mut paragraphs: Vec<Vec<Token<'a>>> = tokens
            .split(|t| t.kind == TokenKind::LineBreak)
            .map(|p| p.to_vec())
            .collect();
        // One space of padding on each side of the cell belongs to the table syntax
        if let Some(first) = paragraphs.first_mut() {
            if let Some(Token {
                kind: TokenKind::Text(text),
                ..
            }) = first.first_mut()
            {
                let padded: &'a str = *text;
                *text = padded.strip_prefix(' ').unwrap_or(padded);
            }
        }
        if let Some(last) = paragraphs.last_mut() {
            if let Some(Token {
                kind: TokenKind::Text(text),
                ..
            }) = last.last_mut()
            {
                let padded: &'a str = *text;
                *text = padded.strip_suffix(' ').unwrap_or(padded);
            }
        }
        TableCell {
            paragraphs: paragraphs.iter().map(|p| self.inlines(p)).collect(),
        }
    }

    fn inlines(&mut self, tokens: &[Token<'a>]) -> Vec<Inline> {
        let mut parser = InlineParser {
            input: self.input,
            warnings: &mut self.warnings,
            stack: vec![Frame::root()],
        };
        for token in tokens {
            parser.token(token);
        }
        parser.finish()
    }
}

fn is_blank(tokens: &[Token<'_>]) -> bool {
    tokens
        .iter()
        .all(|t| matches!(t.kind, TokenKind::Text(text) if text.trim().is_empty()))
}

/// `{^}` → proposed, `{^ id}` → existing; ids never contain whitespace
fn anchor_id(inner: &str) -> Option<AnchorId> {
    let id = inner.trim();
    if id.is_empty() {
        Some(AnchorId::Proposed)
    } else if id.contains(char::is_whitespace) {
        None
    } else {
        Some(AnchorId::Existing(id.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
enum FrameKind {
    Root,
    Strong,
    Emphasis,
    Link,
    Formatted(TextFormatting),
}

#[derive(Debug)]
struct Frame {
    kind: FrameKind,
    /// Source text that opened the frame, restored if it never closes
    opener: String,
    content: Vec<Inline>,
    span: Span,
}

impl Frame {
    fn root() -> Self {
        Self {
            kind: FrameKind::Root,
            opener: String::new(),
            content: Vec::new(),
            span: Span::default(),
        }
    }

    fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        match self.content.last_mut() {
            Some(Inline::Text { content }) => content.push_str(text),
            _ => self.content.push(Inline::text(text)),
        }
    }

    fn push(&mut self, inline: Inline) {
        match inline {
            Inline::Text { content } => self.push_text(&content),
            other => self.content.push(other),
        }
    }
}

struct InlineParser<'a, 'w> {
    input: &'a str,
    warnings: &'w mut Vec<ParseWarning>,
    stack: Vec<Frame>,
}

impl InlineParser<'_, '_> {
    fn top(&mut self) -> &mut Frame {
        let last = self.stack.len() - 1;
        &mut self.stack[last]
    }

    fn warn(&mut self, span: Span, kind: WarningKind, message: impl Into<String>) {
        self.warnings
            .push(ParseWarning::at(span.line, span.column, kind, message));
    }

    fn literal(&mut self, span: Span) {
        let input = self.input;
        self.top().push_text(&input[span.start..span.end]);
    }

    fn open(&mut self, kind: FrameKind, opener: impl Into<String>, span: Span) {
        self.stack.push(Frame {
            kind,
            opener: opener.into(),
            content: Vec::new(),
            span,
        });
    }

    /// Pop the top frame and wrap it as a node of its parent
    fn close_top(&mut self, target: Option<LinkTarget>) {
        let Some(frame) = self.stack.pop() else {
            return;
        };
        let inline = match (frame.kind, target) {
            (FrameKind::Strong, _) => Inline::Strong {
                content: frame.content,
            },
            (FrameKind::Emphasis, _) => Inline::Emphasis {
                content: frame.content,
            },
            (FrameKind::Formatted(format), _) => Inline::Formatted {
                format,
                content: frame.content,
            },
            (FrameKind::Link, Some(target)) => Inline::Link {
                target,
                content: frame.content,
            },
            (FrameKind::Link, None) | (FrameKind::Root, _) => return,
        };
        self.top().push(inline);
    }

    /// Pop the top frame back into literal text
    fn unwind_top(&mut self) {
        if self.stack.len() <= 1 {
            return;
        }
        let Some(frame) = self.stack.pop() else {
            return;
        };
        if matches!(frame.kind, FrameKind::Formatted(_)) {
            self.warn(
                frame.span,
                WarningKind::UnclosedSpan,
                format!("unclosed `{}`", frame.opener),
            );
        }
        let parent = self.top();
        parent.push_text(&frame.opener);
        for inline in frame.content {
            parent.push(inline);
        }
    }

    fn nearest(&self, matches: impl Fn(&FrameKind) -> bool) -> Option<usize> {
        self.stack.iter().rposition(|frame| matches(&frame.kind))
    }

    fn token(&mut self, token: &Token<'_>) {
        let span = token.span;
        match token.kind {
            TokenKind::Text(text) => self.top().push_text(text),
            TokenKind::Escaped(c) => self.top().push_text(c.encode_utf8(&mut [0; 4])),
            TokenKind::Stars {
                count,
                can_open,
                can_close,
            } => self.stars(count, can_open, can_close, span),
            TokenKind::FormatOpen(raw) => match props::parse_inline(raw) {
                Ok(format) => self.open(FrameKind::Formatted(format), format!("{{!{raw}}}"), span),
                Err(err) => {
                    self.warn(span, err.kind, err.message);
                    self.literal(span);
                }
            },
            TokenKind::FormatClose => {
                match self.nearest(|kind| matches!(kind, FrameKind::Formatted(_))) {
                    Some(position) => {
                        while self.stack.len() > position + 1 {
                            self.unwind_top();
                        }
                        self.close_top(None);
                    }
                    None => {
                        self.warn(span, WarningKind::StrayClose, "`{/!}` without an open span");
                        self.literal(span);
                    }
                }
            }
            TokenKind::Anchor(inner) => match anchor_id(inner) {
                Some(id) => self.top().push(Inline::Anchor { id }),
                None => {
                    self.warn(
                        span,
                        WarningKind::MalformedAnchor,
                        format!("anchor id `{}` contains whitespace", inner.trim()),
                    );
                    self.literal(span);
                }
            },
            TokenKind::Object(inner) => match object(inner) {
                Ok(node) => self.top().push(node),
                Err(message) => {
                    self.warn(span, WarningKind::MalformedObject, message);
                    self.literal(span);
                }
            },
            TokenKind::LinkOpen => self.open(FrameKind::Link, "[", span),
            TokenKind::LinkClose(url) => match self.nearest(|kind| *kind == FrameKind::Link) {
                Some(position) => {
                    while self.stack.len() > position + 1 {
                        self.unwind_top();
                    }
                    let target = match url.strip_prefix("#^") {
                        Some(id) => LinkTarget::Anchor(id.to_string()),
                        None => LinkTarget::Url(url.to_string()),
                    };
                    self.close_top(Some(target));
                }
                None => self.literal(span),
            },
            TokenKind::Malformed(opener) => {
                self.warn(
                    span,
                    WarningKind::MalformedDirective,
                    format!("unterminated `{opener}`"),
                );
                self.literal(span);
            }
            TokenKind::Pipe | TokenKind::LineBreak => self.literal(span),
            TokenKind::Heading(_)
            | TokenKind::ListMarker { .. }
            | TokenKind::BlockDirective(_)
            | TokenKind::TableRow
            | TokenKind::TableSeparator
            | TokenKind::Newline => {}
        }
    }

    /// Close emphasis/strong frames while the run allows, then open with the rest.
    fn stars(&mut self, count: usize, can_open: bool, can_close: bool, span: Span) {
        let mut remaining = count;
        if can_close {
            loop {
                match self.top().kind {
                    FrameKind::Emphasis if remaining >= 1 => {
                        self.close_top(None);
                        remaining -= 1;
                    }
                    FrameKind::Strong if remaining >= 2 => {
                        self.close_top(None);
                        remaining -= 2;
                    }
                    _ => break,
                }
            }
        }
        if remaining == 0 {
            return;
        }
        if can_open {
            while remaining >= 2 {
                self.open(FrameKind::Strong, "**", span);
                remaining -= 2;
            }
            if remaining == 1 {
                self.open(FrameKind::Emphasis, "*", span);
            }
        } else {
            self.top().push_text(&"*".repeat(remaining));
        }
    }

    fn finish(mut self) -> Vec<Inline> {
        while self.stack.len() > 1 {
            self.unwind_top();
        }
        self.stack.pop().map(|root| root.content).unwrap_or_default()
    }
}

/// `{^= id type}` or `{^= equation}`
fn object(inner: &str) -> Result<Inline, String> {
    let parts: Vec<&str> = inner.split_whitespace().collect();
    let kind_of = |label: &str| {
        ObjectKind::from_label(label).ok_or_else(|| format!("unknown object type `{label}`"))
    };
    match parts.as_slice() {
        [label] => match kind_of(label)? {
            ObjectKind::Equation => Ok(Inline::Object {
                id: None,
                kind: ObjectKind::Equation,
            }),
            kind => Err(format!("`{kind}` placeholder needs an id")),
        },
        [id, label] => match kind_of(label)? {
            ObjectKind::Equation => Err("equation placeholders take no id".to_string()),
            kind => Ok(Inline::Object {
                id: Some((*id).to_string()),
                kind,
            }),
        },
        _ => Err(format!("malformed object placeholder `{{^={inner}}}`")),
    }
}
