// SPDX-License-Identifier: AGPL-3.0-or-later
//! AST lowering
//!
//! Flattens a parsed document into the item sequence the diff compares with
//! the old tree: one item per character, one per paragraph terminator, and
//! one per object or table pin. Anchors are zero-width and recorded beside
//! the items at the position they precede.

use crate::ast::{AnchorId, Block, BlockFormattingState, Color, Document, Inline, LinkTarget, ObjectKind, TableRow, TextFormatting};
use crate::config::StyleConfig;
use crate::resolve::{BlockText, FontChoice, ParaKind, ParagraphProps};
use crate::tree::{AnchorKind, NamedStyleType};
use crate::writer::ops::ListPlacement;

/// Fully resolved inline style of one new character
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct CharFormat {
    pub bold: bool,
    pub italic: bool,
    pub underline: Option<bool>,
    pub highlight: Option<Color>,
    pub color: Option<Color>,
    pub font: Option<FontChoice>,
    pub link: Option<LinkTarget>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LoweredParagraph {
    pub kind: ParaKind,
    pub props: ParagraphProps,
    pub text: BlockText,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum NewItem {
    Char {
        ch: char,
        format: CharFormat,
        paragraph: usize,
    },
    Newline {
        paragraph: usize,
    },
    Object {
        id: Option<String>,
        kind: ObjectKind,
    },
    Table(LoweredTable),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct NewAnchor {
    /// Item position the anchor precedes
    pub position: usize,
    pub id: AnchorId,
    pub kind: AnchorKind,
}

/// Items of the body or of one table cell
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Sequence {
    pub items: Vec<NewItem>,
    pub anchors: Vec<NewAnchor>,
}

impl Sequence {
    /// Explicit anchor ids, tables included
    pub fn explicit_anchors(&self, out: &mut Vec<(String, AnchorKind)>) {
        let mut anchors = self.anchors.iter().peekable();
        for (position, item) in self.items.iter().enumerate() {
            while let Some(anchor) = anchors.next_if(|anchor| anchor.position <= position) {
                if let AnchorId::Existing(id) = &anchor.id {
                    out.push((id.clone(), anchor.kind));
                }
            }
            if let NewItem::Table(table) = item {
                for cell in table.rows.iter().flatten() {
                    cell.explicit_anchors(out);
                }
            }
        }
        for anchor in anchors {
            if let AnchorId::Existing(id) = &anchor.id {
                out.push((id.clone(), anchor.kind));
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LoweredTable {
    pub rows: Vec<Vec<Sequence>>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Lowered {
    pub body: Sequence,
    pub paragraphs: Vec<LoweredParagraph>,
}

/// Lower `document`; with `terminate` the body is guaranteed to end with a
/// paragraph terminator
pub(crate) fn lower(document: &Document, style: &StyleConfig, terminate: bool) -> Lowered {
    let mut lowerer = Lowerer {
        style,
        paragraphs: Vec::new(),
        running: BlockFormattingState::default(),
    };
    let mut body = Sequence::default();
    for block in &document.blocks {
        lowerer.block(&mut body, block);
    }
    if terminate && !matches!(body.items.last(), Some(NewItem::Newline { .. })) {
        let props = ParagraphProps::from_state(&lowerer.running);
        let text = BlockText::of_state(&lowerer.running);
        lowerer.paragraph(&mut body, ParaKind::Body, props, text, &[]);
    }
    Lowered {
        body,
        paragraphs: lowerer.paragraphs,
    }
}

struct Lowerer<'a> {
    style: &'a StyleConfig,
    paragraphs: Vec<LoweredParagraph>,
    running: BlockFormattingState,
}

#[derive(Debug, Clone, Default)]
struct InlineContext {
    format: TextFormatting,
    link: Option<LinkTarget>,
}

impl Lowerer<'_> {
    fn block(&mut self, seq: &mut Sequence, block: &Block) {
        match block {
            Block::BlockFormatting { state } => self.running = state.clone(),
            Block::Paragraph { content } => {
                let props = ParagraphProps::from_state(&self.running);
                let text = BlockText::of_state(&self.running);
                self.paragraph(seq, ParaKind::Body, props, text, content);
            }
            Block::ListItem { kind, depth, content } => {
                let props = ParagraphProps {
                    list: Some(ListPlacement {
                        kind: *kind,
                        nesting_level: *depth,
                    }),
                    ..ParagraphProps::from_state(&self.running)
                };
                let text = BlockText::of_state(&self.running);
                self.paragraph(seq, ParaKind::ListItem, props, text, content);
            }
            Block::Heading { level, anchor, content } => {
                if let Some(id) = anchor {
                    seq.anchors.push(NewAnchor {
                        position: seq.items.len(),
                        id: id.clone(),
                        kind: AnchorKind::Heading,
                    });
                }
                let props = ParagraphProps {
                    named: NamedStyleType::heading(*level),
                    ..ParagraphProps::default()
                };
                self.paragraph(seq, ParaKind::Heading, props, BlockText::default(), content);
            }
            Block::Table { rows } => {
                let table = self.table(rows);
                seq.items.push(NewItem::Table(table));
            }
        }
    }

    fn paragraph(
        &mut self,
        seq: &mut Sequence,
        kind: ParaKind,
        props: ParagraphProps,
        text: BlockText,
        content: &[Inline],
    ) {
        let paragraph = self.paragraphs.len();
        self.paragraphs.push(LoweredParagraph { kind, props, text });
        self.inlines(seq, content, &InlineContext::default(), paragraph);
        seq.items.push(NewItem::Newline { paragraph });
    }

    fn table(&mut self, rows: &[TableRow]) -> LoweredTable {
        let mut lowered = Vec::with_capacity(rows.len());
        for row in rows {
            let mut cells = Vec::with_capacity(row.cells.len());
            for cell in &row.cells {
                let mut seq = Sequence::default();
                for paragraph in &cell.paragraphs {
                    self.paragraph(
                        &mut seq,
                        ParaKind::Cell,
                        ParagraphProps::default(),
                        BlockText::default(),
                        paragraph,
                    );
                }
                if seq.items.is_empty() {
                    self.paragraph(&mut seq, ParaKind::Cell, ParagraphProps::default(), BlockText::default(), &[]);
                }
                cells.push(seq);
            }
            lowered.push(cells);
        }
        LoweredTable { rows: lowered }
    }

    fn inlines(&mut self, seq: &mut Sequence, inlines: &[Inline], context: &InlineContext, paragraph: usize) {
        for inline in inlines {
            match inline {
                Inline::Text { content } => {
                    let format = self.resolve(context);
                    for ch in content.chars().filter(|ch| *ch != '\n') {
                        seq.items.push(NewItem::Char {
                            ch,
                            format: format.clone(),
                            paragraph,
                        });
                    }
                }
                Inline::Strong { content } => {
                    let mut inner = context.clone();
                    inner.format.bold = Some(true);
                    self.inlines(seq, content, &inner, paragraph);
                }
                Inline::Emphasis { content } => {
                    let mut inner = context.clone();
                    inner.format.italic = Some(true);
                    self.inlines(seq, content, &inner, paragraph);
                }
                Inline::Link { target, content } => {
                    let inner = InlineContext {
                        link: Some(target.clone()),
                        ..context.clone()
                    };
                    self.inlines(seq, content, &inner, paragraph);
                }
                Inline::Formatted { format, content } => {
                    let inner = InlineContext {
                        format: context.format.merged_with(format),
                        link: context.link.clone(),
                    };
                    self.inlines(seq, content, &inner, paragraph);
                }
                Inline::Anchor { id } => seq.anchors.push(NewAnchor {
                    position: seq.items.len(),
                    id: id.clone(),
                    kind: AnchorKind::Bookmark,
                }),
                Inline::Object { id, kind } => seq.items.push(NewItem::Object {
                    id: id.clone(),
                    kind: *kind,
                }),
            }
        }
    }

    fn resolve(&self, context: &InlineContext) -> CharFormat {
        let format = &context.format;
        let font = if format.mono == Some(true) {
            Some(FontChoice::Mono)
        } else {
            FontChoice::of(format.font.as_deref(), self.style)
        };
        CharFormat {
            bold: format.bold.unwrap_or(false),
            italic: format.italic.unwrap_or(false),
            underline: format.underline,
            highlight: format.highlight,
            color: format.color,
            font,
            link: context.link.clone(),
        }
    }
}
