// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tree reader: snapshot → MEBDF
//!
//! Walks the body in document order and builds a MEBDF AST. Character runs are
//! grouped hierarchically (link, span properties, bold, italic) so adjacent
//! runs with equal properties share one node. Block directives are emitted
//! only where the resolved paragraph state departs from the running one.

use crate::ast::{
    AnchorId, Block, Document, Inline, LinkTarget, ObjectKind, TableCell as CellNode,
    TableRow as RowNode, TextFormatting,
};
use crate::config::ConvertConfig;
use crate::mebdf::serialize;
use crate::resolve::{link_target, BlockText, FontChoice, ParaKind, ParagraphProps, RunningBlock};
use crate::traits::{ParseWarning, WarningKind};
use crate::tree::objects::ObjectIndex;
use crate::tree::{
    AnchorKind, BlockContent, InlineContent, NamedPosition, Paragraph, Snapshot, StructuralElement, Table,
    TableCell, TextStyle,
};
use serde::Serialize;
use std::ops::Range;

/// An anchor present in the exported range
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Anchor {
    pub id: String,
    pub kind: AnchorKind,
    pub start_index: usize,
}

/// An embedded object present in the exported range
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbeddedObject {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub kind: ObjectKind,
    pub start_index: usize,
}

/// Inline formatting of one stretch of text, relative to its paragraph
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormattingSpan {
    pub start_index: usize,
    pub end_index: usize,
    pub format: TextFormatting,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExportResult {
    pub content: String,
    pub anchors: Vec<Anchor>,
    pub embedded_objects: Vec<EmbeddedObject>,
    pub warnings: Vec<ParseWarning>,
}

/// Export the whole tab
pub fn export(snapshot: &Snapshot, config: &ConvertConfig) -> ExportResult {
    export_range(snapshot, 0..snapshot.doc_end(), config)
}

/// Export the structural elements starting inside `range`
pub fn export_range(snapshot: &Snapshot, range: Range<usize>, config: &ConvertConfig) -> ExportResult {
    let (document, mut result) = export_document(snapshot, range.clone(), config);
    result.content = serialize(&document);
    tracing::debug!(
        start = range.start,
        end = range.end,
        blocks = document.blocks.len(),
        "exported snapshot range"
    );
    result
}

/// The AST behind [`export_range`]; `content` is left empty
pub fn export_document(snapshot: &Snapshot, range: Range<usize>, config: &ConvertConfig) -> (Document, ExportResult) {
    let exporter = Exporter::run(snapshot, range, config);
    (Document::new(exporter.blocks), exporter.result)
}

/// Inline formatting spans of the range, adjacent equal spans merged
pub fn formatting_spans(snapshot: &Snapshot, range: Range<usize>, config: &ConvertConfig) -> Vec<FormattingSpan> {
    Exporter::run(snapshot, range, config).spans
}

struct Exporter<'a> {
    snapshot: &'a Snapshot,
    config: &'a ConvertConfig,
    objects: ObjectIndex,
    /// Bookmarks and comment anchors in range, by index
    positions: Vec<&'a NamedPosition>,
    next_position: usize,
    running: RunningBlock,
    blocks: Vec<Block>,
    spans: Vec<FormattingSpan>,
    result: ExportResult,
}

impl<'a> Exporter<'a> {
    fn run(snapshot: &'a Snapshot, range: Range<usize>, config: &'a ConvertConfig) -> Self {
        let objects = ObjectIndex::build(snapshot, &config.export);
        let mut positions: Vec<&NamedPosition> = snapshot
            .named_positions
            .iter()
            .filter(|position| range.contains(&position.index))
            .collect();
        positions.sort_by_key(|position| position.index);
        let warnings = objects.warnings_in(range.clone()).cloned().collect();

        let mut exporter = Self {
            snapshot,
            config,
            objects,
            positions,
            next_position: 0,
            running: RunningBlock::default(),
            blocks: Vec::new(),
            spans: Vec::new(),
            result: ExportResult {
                warnings,
                ..ExportResult::default()
            },
        };
        for element in &snapshot.body {
            if !range.contains(&element.start_index) {
                continue;
            }
            match &element.content {
                BlockContent::Paragraph(paragraph) => exporter.paragraph(element, paragraph),
                BlockContent::Table(table) => exporter.table(table),
                BlockContent::SectionBreak(_) => {}
            }
        }
        if exporter.next_position < exporter.positions.len() {
            tracing::debug!(
                unplaced = exporter.positions.len() - exporter.next_position,
                "named positions outside any exported paragraph"
            );
        }
        exporter
    }

    fn paragraph(&mut self, element: &StructuralElement, paragraph: &Paragraph) {
        let props = ParagraphProps::from_tree(&paragraph.style, paragraph.bullet.as_ref(), &self.snapshot.lists);
        let kind = ParaKind::classify(&props, false);
        if kind == ParaKind::Heading {
            let anchor = paragraph.style.heading_id.as_ref().map(|id| {
                self.result.anchors.push(Anchor {
                    id: id.clone(),
                    kind: AnchorKind::Heading,
                    start_index: element.start_index,
                });
                AnchorId::Existing(id.clone())
            });
            let content = self.inlines(paragraph, element.end_index, &BlockText::default());
            self.blocks.push(Block::Heading {
                level: props.named.heading_level().unwrap_or(1),
                anchor,
                content,
            });
            return;
        }

        let (text, changed) = self
            .running
            .enter(&props, kind, paragraph.char_styles(), &self.config.style);
        if changed {
            self.blocks.push(Block::BlockFormatting {
                state: self.running.state.clone(),
            });
        }
        let content = self.inlines(paragraph, element.end_index, &text);
        self.blocks.push(match props.list {
            Some(placement) => Block::ListItem {
                kind: placement.kind,
                depth: placement.nesting_level,
                content,
            },
            None => Block::Paragraph { content },
        });
    }

    fn table(&mut self, table: &Table) {
        if table.rows.is_empty() {
            return;
        }
        let mut rows = Vec::with_capacity(table.rows.len());
        for row in &table.rows {
            let mut cells = Vec::with_capacity(row.cells.len());
            for cell in &row.cells {
                cells.push(self.cell(cell));
            }
            rows.push(RowNode { cells });
        }
        self.blocks.push(Block::Table { rows });
    }

    fn cell(&mut self, cell: &TableCell) -> CellNode {
        let mut paragraphs = Vec::new();
        for element in &cell.content {
            match &element.content {
                BlockContent::Paragraph(paragraph) => {
                    paragraphs.push(self.inlines(paragraph, element.end_index, &BlockText::default()));
                }
                BlockContent::Table(_) => {
                    tracing::warn!(start = element.start_index, "nested table left out of export");
                    self.result.warnings.push(ParseWarning::new(
                        WarningKind::TableStructure,
                        format!("nested table at {} cannot be expressed and was left out", element.start_index),
                    ));
                }
                BlockContent::SectionBreak(_) => {}
            }
        }
        if paragraphs.is_empty() {
            return CellNode::default();
        }
        CellNode { paragraphs }
    }

    /// Inline content of one paragraph ending (terminator included) at `end_index`
    fn inlines(&mut self, paragraph: &Paragraph, end_index: usize, text: &BlockText) -> Vec<Inline> {
        let mut pieces = Vec::new();
        for element in &paragraph.elements {
            match &element.content {
                InlineContent::TextRun(run) => {
                    let format = self.run_format(&run.style, text);
                    let mut index = element.start_index;
                    let mut buffer = String::new();
                    for ch in run.content.chars() {
                        if ch == '\n' {
                            index += 1;
                            continue;
                        }
                        if self.anchor_due(index) {
                            flush_text(&mut pieces, &mut buffer, &format);
                            self.place_anchors(index, &mut pieces);
                        }
                        buffer.push(ch);
                        index += ch.len_utf16();
                    }
                    flush_text(&mut pieces, &mut buffer, &format);
                    self.record_span(element.start_index, index, &format);
                }
                InlineContent::Opaque(_) => self.place_anchors(element.start_index, &mut pieces),
                _ => {
                    self.place_anchors(element.start_index, &mut pieces);
                    let (id, kind) = self
                        .objects
                        .at(element.start_index)
                        .map_or((None, ObjectKind::Embed), |object| (object.id.clone(), object.kind));
                    self.result.embedded_objects.push(EmbeddedObject {
                        id: id.clone(),
                        kind,
                        start_index: element.start_index,
                    });
                    pieces.push(Piece {
                        body: PieceBody::Object { id, kind },
                        format: None,
                    });
                }
            }
        }
        self.place_anchors(end_index.saturating_sub(1), &mut pieces);
        group(pieces)
    }

    fn anchor_due(&self, index: usize) -> bool {
        self.positions
            .get(self.next_position)
            .is_some_and(|position| position.index <= index)
    }

    fn place_anchors(&mut self, upto: usize, pieces: &mut Vec<Piece>) {
        while let Some(position) = self.positions.get(self.next_position).copied() {
            if position.index > upto {
                break;
            }
            self.next_position += 1;
            self.result.anchors.push(Anchor {
                id: position.id.clone(),
                kind: position.kind,
                start_index: position.index,
            });
            pieces.push(Piece {
                body: PieceBody::Anchor(position.id.clone()),
                format: None,
            });
        }
    }

    /// What a run shows in MEBDF, given its paragraph's block text
    fn run_format(&self, style: &TextStyle, block: &BlockText) -> RunFormat {
        let config = &self.config.style;
        let link = style.link.as_ref().map(link_target);
        let is_link = link.is_some();
        let mut span = TextFormatting {
            highlight: style.background_color,
            ..TextFormatting::default()
        };
        if is_link {
            span.underline = (style.underline == Some(false)).then_some(false);
            span.color = style.foreground_color.filter(|color| *color != config.link_color);
        } else {
            span.underline = (style.underline == Some(true)).then_some(true);
            span.color = style.foreground_color.filter(|_| style.foreground_color != block.color);
        }
        match FontChoice::of(style.font_family.as_deref(), config) {
            Some(FontChoice::Mono) => span.mono = Some(true),
            Some(FontChoice::Family(family)) if block.font.as_ref() != Some(&family) => span.font = Some(family),
            _ => {}
        }
        RunFormat {
            link,
            span,
            bold: style.bold == Some(true),
            italic: style.italic == Some(true),
        }
    }

    fn record_span(&mut self, start_index: usize, end_index: usize, format: &RunFormat) {
        let mut merged = format.span.clone();
        if format.bold {
            merged.bold = Some(true);
        }
        if format.italic {
            merged.italic = Some(true);
        }
        if merged.is_empty() || start_index >= end_index {
            return;
        }
        if let Some(last) = self.spans.last_mut() {
            if last.end_index == start_index && last.format == merged {
                last.end_index = end_index;
                return;
            }
        }
        self.spans.push(FormattingSpan {
            start_index,
            end_index,
            format: merged,
        });
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct RunFormat {
    link: Option<LinkTarget>,
    /// Span properties; bold and italic stay unset here
    span: TextFormatting,
    bold: bool,
    italic: bool,
}

#[derive(Debug, Clone)]
enum PieceBody {
    Text(String),
    Anchor(String),
    Object { id: Option<String>, kind: ObjectKind },
}

/// A leaf with its run format; anchors and objects have none and take their
/// neighbour's so they never split a group
struct Piece {
    body: PieceBody,
    format: Option<RunFormat>,
}

type Item = (RunFormat, PieceBody);

fn flush_text(pieces: &mut Vec<Piece>, buffer: &mut String, format: &RunFormat) {
    if buffer.is_empty() {
        return;
    }
    pieces.push(Piece {
        body: PieceBody::Text(std::mem::take(buffer)),
        format: Some(format.clone()),
    });
}

fn group(pieces: Vec<Piece>) -> Vec<Inline> {
    let fallback = pieces
        .iter()
        .find_map(|piece| piece.format.clone())
        .unwrap_or_default();
    let mut previous: Option<RunFormat> = None;
    let mut items: Vec<Item> = Vec::with_capacity(pieces.len());
    for piece in pieces {
        let format = piece
            .format
            .or_else(|| previous.clone())
            .unwrap_or_else(|| fallback.clone());
        previous = Some(format.clone());
        items.push((format, piece.body));
    }
    let mut inlines = by_link(&items);
    merge_text(&mut inlines);
    inlines
}

fn by_link(items: &[Item]) -> Vec<Inline> {
    let mut out = Vec::new();
    for chunk in items.chunk_by(|a, b| a.0.link == b.0.link) {
        let content = by_span(chunk);
        match &chunk[0].0.link {
            Some(target) => out.push(Inline::Link {
                target: target.clone(),
                content,
            }),
            None => out.extend(content),
        }
    }
    out
}

fn by_span(items: &[Item]) -> Vec<Inline> {
    let mut out = Vec::new();
    for chunk in items.chunk_by(|a, b| a.0.span == b.0.span) {
        let content = by_bold(chunk);
        let format = &chunk[0].0.span;
        if format.is_empty() {
            out.extend(content);
        } else {
            out.push(Inline::Formatted {
                format: format.clone(),
                content,
            });
        }
    }
    out
}

fn by_bold(items: &[Item]) -> Vec<Inline> {
    let mut out = Vec::new();
    for chunk in items.chunk_by(|a, b| a.0.bold == b.0.bold) {
        let content = by_italic(chunk);
        if chunk[0].0.bold {
            out.extend(wrap_trimmed(content, |content| Inline::Strong { content }));
        } else {
            out.extend(content);
        }
    }
    out
}

fn by_italic(items: &[Item]) -> Vec<Inline> {
    let mut out = Vec::new();
    for chunk in items.chunk_by(|a, b| a.0.italic == b.0.italic) {
        let content = leaves(chunk);
        if chunk[0].0.italic {
            out.extend(wrap_trimmed(content, |content| Inline::Emphasis { content }));
        } else {
            out.extend(content);
        }
    }
    out
}

fn leaves(items: &[Item]) -> Vec<Inline> {
    items
        .iter()
        .map(|(_, body)| match body {
            PieceBody::Text(text) => Inline::text(text.clone()),
            PieceBody::Anchor(id) => Inline::Anchor {
                id: AnchorId::Existing(id.clone()),
            },
            PieceBody::Object { id, kind } => Inline::Object {
                id: id.clone(),
                kind: *kind,
            },
        })
        .collect()
}

/// Star markup cannot open before or close after whitespace, so edge
/// whitespace moves outside the wrapper
fn wrap_trimmed(mut content: Vec<Inline>, wrap: impl Fn(Vec<Inline>) -> Inline) -> Vec<Inline> {
    merge_text(&mut content);
    let mut leading = String::new();
    if let Some(Inline::Text { content: text }) = content.first_mut() {
        let cut = text.len() - text.trim_start().len();
        leading = text.drain(..cut).collect();
        if text.is_empty() {
            content.remove(0);
        }
    }
    let mut trailing = String::new();
    if let Some(Inline::Text { content: text }) = content.last_mut() {
        let keep = text.trim_end().len();
        trailing = text.split_off(keep);
        if text.is_empty() {
            content.pop();
        }
    }

    let mut out = Vec::with_capacity(3);
    if !leading.is_empty() {
        out.push(Inline::text(leading));
    }
    if !content.is_empty() {
        out.push(wrap(content));
    }
    if !trailing.is_empty() {
        out.push(Inline::text(trailing));
    }
    out
}

fn merge_text(inlines: &mut Vec<Inline>) {
    let mut merged: Vec<Inline> = Vec::with_capacity(inlines.len());
    for mut inline in inlines.drain(..) {
        match &mut inline {
            Inline::Strong { content }
            | Inline::Emphasis { content }
            | Inline::Link { content, .. }
            | Inline::Formatted { content, .. } => merge_text(content),
            Inline::Text { content } if content.is_empty() => continue,
            _ => {}
        }
        if let (Some(Inline::Text { content: last }), Inline::Text { content }) = (merged.last_mut(), &inline) {
            last.push_str(content);
            continue;
        }
        merged.push(inline);
    }
    *inlines = merged;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Color;
    use pretty_assertions::assert_eq;

    fn snapshot(json: &str) -> Snapshot {
        Snapshot::from_json(json).unwrap()
    }

    fn export_default(snapshot: &Snapshot) -> ExportResult {
        export(snapshot, &ConvertConfig::default())
    }

    #[test]
    fn test_headings_and_paragraphs() {
        let snapshot = snapshot(
            r#"{"body": [
                {"startIndex": 0, "endIndex": 6, "paragraph": {"elements": [
                    {"startIndex": 0, "endIndex": 6, "textRun": {"content": "Title\n"}}
                ], "style": {"namedStyleType": "HEADING_1", "headingId": "h1"}}},
                {"startIndex": 6, "endIndex": 11, "paragraph": {"elements": [
                    {"startIndex": 6, "endIndex": 11, "textRun": {"content": "Body\n"}}
                ]}}
            ]}"#,
        );
        let result = export_default(&snapshot);
        assert_eq!(result.content, "# {^ h1}Title\nBody");
        assert_eq!(
            result.anchors,
            vec![Anchor {
                id: "h1".into(),
                kind: AnchorKind::Heading,
                start_index: 0
            }]
        );
    }

    #[test]
    fn test_run_grouping() {
        let snapshot = snapshot(
            r##"{"body": [{"startIndex": 0, "endIndex": 14, "paragraph": {"elements": [
                {"startIndex": 0, "endIndex": 4, "textRun": {"content": "one ", "style": {"bold": true}}},
                {"startIndex": 4, "endIndex": 7, "textRun": {"content": "two", "style": {"bold": true, "italic": true}}},
                {"startIndex": 7, "endIndex": 13, "textRun": {"content": " three", "style": {"backgroundColor": "#ffff00", "underline": true}}},
                {"startIndex": 13, "endIndex": 14, "textRun": {"content": "\n"}}
            ]}}]}"##,
        );
        assert_eq!(
            export_default(&snapshot).content,
            "**one *two***{!underline, highlight:yellow} three{/!}"
        );
    }

    #[test]
    fn test_whitespace_moves_outside_stars() {
        let snapshot = snapshot(
            r#"{"body": [{"startIndex": 0, "endIndex": 8, "paragraph": {"elements": [
                {"startIndex": 0, "endIndex": 1, "textRun": {"content": "a"}},
                {"startIndex": 1, "endIndex": 4, "textRun": {"content": " b ", "style": {"italic": true}}},
                {"startIndex": 4, "endIndex": 8, "textRun": {"content": "c  \n"}}
            ]}}]}"#,
        );
        assert_eq!(export_default(&snapshot).content, "a *b* c  ");
    }

    #[test]
    fn test_links_hide_default_decoration() {
        let snapshot = snapshot(
            r##"{"body": [{"startIndex": 0, "endIndex": 9, "paragraph": {"elements": [
                {"startIndex": 0, "endIndex": 4, "textRun": {"content": "site", "style": {
                    "underline": true, "foregroundColor": "#1155cc", "link": {"url": "https://x.test/a)"}}}},
                {"startIndex": 4, "endIndex": 5, "textRun": {"content": " "}},
                {"startIndex": 5, "endIndex": 8, "textRun": {"content": "sec", "style": {
                    "underline": true, "foregroundColor": "#ff0000", "link": {"headingId": "h.2"}}}},
                {"startIndex": 8, "endIndex": 9, "textRun": {"content": "\n"}}
            ]}}]}"##,
        );
        assert_eq!(
            export_default(&snapshot).content,
            "[site](https://x.test/a%29) [{!color:red}sec{/!}](#^h.2)"
        );
    }

    #[test]
    fn test_block_directives_follow_state() {
        let snapshot = snapshot(
            r#"{"body": [
                {"startIndex": 0, "endIndex": 2, "paragraph": {"elements": [
                    {"startIndex": 0, "endIndex": 2, "textRun": {"content": "a\n", "style": {"fontSize": 14}}}
                ], "style": {"alignment": "center"}}},
                {"startIndex": 2, "endIndex": 3, "paragraph": {"elements": [
                    {"startIndex": 2, "endIndex": 3, "textRun": {"content": "\n"}}
                ], "style": {"alignment": "center"}}},
                {"startIndex": 3, "endIndex": 5, "paragraph": {"elements": [
                    {"startIndex": 3, "endIndex": 5, "textRun": {"content": "b\n"}}
                ]}}
            ]}"#,
        );
        assert_eq!(
            export_default(&snapshot).content,
            "{!size:14, align:center}\na\n\n{!Normal text}\nb"
        );
    }

    #[test]
    fn test_lists_ignore_indents() {
        let snapshot = snapshot(
            r#"{"body": [
                {"startIndex": 0, "endIndex": 2, "paragraph": {"elements": [
                    {"startIndex": 0, "endIndex": 2, "textRun": {"content": "a\n"}}
                ], "style": {"indentStart": 36}, "bullet": {"listId": "l1"}}},
                {"startIndex": 2, "endIndex": 4, "paragraph": {"elements": [
                    {"startIndex": 2, "endIndex": 4, "textRun": {"content": "b\n"}}
                ], "style": {"indentStart": 72}, "bullet": {"listId": "l1", "nestingLevel": 1}}}
            ], "lists": {"l1": {"nestingLevels": ["ordered", "bullet"]}}}"#,
        );
        assert_eq!(export_default(&snapshot).content, "1. a\n  - b");
    }

    #[test]
    fn test_bookmarks_and_objects() {
        let snapshot = snapshot(
            r#"{"body": [{"startIndex": 0, "endIndex": 6, "paragraph": {"elements": [
                {"startIndex": 0, "endIndex": 2, "textRun": {"content": "ab"}},
                {"startIndex": 2, "endIndex": 3, "inlineObject": {"objectId": "obj1"}},
                {"startIndex": 3, "endIndex": 4, "equation": {}},
                {"startIndex": 4, "endIndex": 6, "textRun": {"content": "c\n"}}
            ]}}],
            "objects": {"obj1": {"image": {}}},
            "namedPositions": [{"id": "bm", "kind": "bookmark", "index": 1}]}"#,
        );
        let result = export_default(&snapshot);
        assert_eq!(result.content, "a{^ bm}b{^= obj1 image}{^= equation}c");
        assert_eq!(result.embedded_objects.len(), 2);
        assert_eq!(result.embedded_objects[0].id.as_deref(), Some("obj1"));
        assert_eq!(result.embedded_objects[1].kind, ObjectKind::Equation);
    }

    #[test]
    fn test_table_cells() {
        let snapshot = snapshot(
            r#"{"body": [
                {"startIndex": 0, "endIndex": 12, "table": {"rows": [
                    {"startIndex": 1, "endIndex": 11, "cells": [
                        {"startIndex": 1, "endIndex": 7, "content": [
                            {"startIndex": 2, "endIndex": 4, "paragraph": {"elements": [
                                {"startIndex": 2, "endIndex": 4, "textRun": {"content": "a\n"}}]}},
                            {"startIndex": 4, "endIndex": 7, "paragraph": {"elements": [
                                {"startIndex": 4, "endIndex": 7, "textRun": {"content": "b|\n"}}]}}
                        ]},
                        {"startIndex": 7, "endIndex": 11, "content": [
                            {"startIndex": 8, "endIndex": 11, "paragraph": {"elements": [
                                {"startIndex": 8, "endIndex": 11, "textRun": {"content": "-c\n", "style": {"bold": true}}}]}}
                        ]}
                    ]}
                ]}},
                {"startIndex": 12, "endIndex": 13, "paragraph": {"elements": [
                    {"startIndex": 12, "endIndex": 13, "textRun": {"content": "\n"}}]}}
            ]}"#,
        );
        assert_eq!(
            export_default(&snapshot).content,
            "| a<br>b\\| | **\\-c** |\n| --- | --- |\n"
        );
    }

    #[test]
    fn test_section_range_clips() {
        let snapshot = snapshot(
            r##"{"body": [
                {"startIndex": 0, "endIndex": 2, "paragraph": {"elements": [
                    {"startIndex": 0, "endIndex": 2, "textRun": {"content": "a\n"}}]}},
                {"startIndex": 2, "endIndex": 4, "paragraph": {"elements": [
                    {"startIndex": 2, "endIndex": 4, "textRun": {"content": "b\n", "style": {"foregroundColor": "#ff0000"}}}]}}
            ]}"##,
        );
        let result = export_range(&snapshot, 2..4, &ConvertConfig::default());
        assert_eq!(result.content, "{!color:red}\nb");
    }

    #[test]
    fn test_formatting_spans_merge() {
        let snapshot = snapshot(
            r#"{"body": [{"startIndex": 0, "endIndex": 5, "paragraph": {"elements": [
                {"startIndex": 0, "endIndex": 2, "textRun": {"content": "ab", "style": {"bold": true}}},
                {"startIndex": 2, "endIndex": 4, "textRun": {"content": "cd", "style": {"bold": true, "weight": 700}}},
                {"startIndex": 4, "endIndex": 5, "textRun": {"content": "\n"}}
            ]}}]}"#,
        );
        let spans = formatting_spans(&snapshot, 0..5, &ConvertConfig::default());
        assert_eq!(spans.len(), 1);
        assert_eq!((spans[0].start_index, spans[0].end_index), (0, 4));
        assert_eq!(spans[0].format.bold, Some(true));
        assert_eq!(spans[0].format.color, None::<Color>);
    }
}
