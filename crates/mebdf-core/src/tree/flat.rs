// SPDX-License-Identifier: AGPL-3.0-or-later
//! Flat unit view of a body
//!
//! The body is flattened into one unit per UTF-16 addressable item so edits
//! can be applied and diffed by position, then rebuilt into a tree with fresh
//! indices. Table markers keep the widths implied by the source indices.

use super::{
    BlockContent, Bullet, InlineContent, Paragraph, ParagraphElement, ParagraphStyle,
    SectionBreak, StructuralElement, Table, TableCell, TableRow, TextRun, TextStyle,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Unit {
    Char {
        ch: char,
        style: TextStyle,
    },
    /// Paragraph terminator; carries the paragraph's own style
    Newline {
        style: TextStyle,
        paragraph: ParagraphStyle,
        bullet: Option<Bullet>,
    },
    /// Non-text inline element (object, equation, rich link, opaque)
    Element {
        content: InlineContent,
        width: usize,
    },
    TableStart {
        width: usize,
    },
    RowStart {
        width: usize,
    },
    CellStart {
        width: usize,
    },
    TableEnd {
        width: usize,
    },
    SectionBreak {
        width: usize,
    },
}

impl Unit {
    pub fn width(&self) -> usize {
        match self {
            Unit::Char { ch, .. } => ch.len_utf16(),
            Unit::Newline { .. } => 1,
            Unit::Element { width, .. }
            | Unit::TableStart { width }
            | Unit::RowStart { width }
            | Unit::CellStart { width }
            | Unit::TableEnd { width }
            | Unit::SectionBreak { width } => *width,
        }
    }

    pub fn is_table_marker(&self) -> bool {
        matches!(
            self,
            Unit::TableStart { .. } | Unit::RowStart { .. } | Unit::CellStart { .. } | Unit::TableEnd { .. }
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatBody {
    /// Index of the first unit
    pub start: usize,
    pub units: Vec<Unit>,
}

impl FlatBody {
    pub fn flatten(body: &[StructuralElement]) -> Self {
        let mut units = Vec::new();
        flatten_into(body, &mut units);
        Self {
            start: body.first().map_or(0, |element| element.start_index),
            units,
        }
    }

    /// Start index of every unit, followed by the end index
    pub fn positions(&self) -> Vec<usize> {
        let mut positions = Vec::with_capacity(self.units.len() + 1);
        let mut index = self.start;
        for unit in &self.units {
            positions.push(index);
            index += unit.width();
        }
        positions.push(index);
        positions
    }

    pub fn end(&self) -> usize {
        self.start + self.units.iter().map(Unit::width).sum::<usize>()
    }

    /// Rebuild a body with indices recomputed from unit widths
    pub fn rebuild(&self) -> Vec<StructuralElement> {
        let mut rebuilder = Rebuilder {
            units: &self.units,
            pos: 0,
            index: self.start,
        };
        rebuilder.container(false)
    }
}

fn flatten_into(body: &[StructuralElement], units: &mut Vec<Unit>) {
    for element in body {
        match &element.content {
            BlockContent::Paragraph(paragraph) => flatten_paragraph(paragraph, units),
            BlockContent::Table(table) => flatten_table(element, table, units),
            BlockContent::SectionBreak(_) => units.push(Unit::SectionBreak {
                width: element.end_index.saturating_sub(element.start_index),
            }),
        }
    }
}

fn flatten_paragraph(paragraph: &Paragraph, units: &mut Vec<Unit>) {
    let last = paragraph.elements.len().checked_sub(1);
    let mut terminated = false;
    for (i, element) in paragraph.elements.iter().enumerate() {
        match &element.content {
            InlineContent::TextRun(run) => {
                let (text, newline) = match run.content.strip_suffix('\n') {
                    Some(text) if Some(i) == last => (text, true),
                    _ => (run.content.as_str(), false),
                };
                units.extend(text.chars().map(|ch| Unit::Char {
                    ch,
                    style: run.style.clone(),
                }));
                if newline {
                    units.push(Unit::Newline {
                        style: run.style.clone(),
                        paragraph: paragraph.style.clone(),
                        bullet: paragraph.bullet.clone(),
                    });
                    terminated = true;
                }
            }
            other => units.push(Unit::Element {
                content: other.clone(),
                width: element.end_index.saturating_sub(element.start_index).max(1),
            }),
        }
    }
    if !terminated {
        tracing::warn!("paragraph without terminator, adding one");
        units.push(Unit::Newline {
            style: TextStyle::default(),
            paragraph: paragraph.style.clone(),
            bullet: paragraph.bullet.clone(),
        });
    }
}

fn flatten_table(element: &StructuralElement, table: &Table, units: &mut Vec<Unit>) {
    let first_row = table
        .rows
        .first()
        .map_or(element.end_index, |row| row.start_index);
    units.push(Unit::TableStart {
        width: first_row.saturating_sub(element.start_index),
    });
    for row in &table.rows {
        let first_cell = row.cells.first().map_or(row.end_index, |cell| cell.start_index);
        units.push(Unit::RowStart {
            width: first_cell.saturating_sub(row.start_index),
        });
        for cell in &row.cells {
            let content_start = cell
                .content
                .first()
                .map_or(cell.end_index, |content| content.start_index);
            units.push(Unit::CellStart {
                width: content_start.saturating_sub(cell.start_index),
            });
            flatten_into(&cell.content, units);
        }
    }
    let last_row_end = table.rows.last().map_or(first_row, |row| row.end_index);
    units.push(Unit::TableEnd {
        width: element.end_index.saturating_sub(last_row_end),
    });
}

struct Rebuilder<'a> {
    units: &'a [Unit],
    pos: usize,
    index: usize,
}

impl Rebuilder<'_> {
    fn advance(&mut self) {
        if let Some(unit) = self.units.get(self.pos) {
            self.index += unit.width();
            self.pos += 1;
        }
    }

    /// Structural elements up to the next row, cell or table boundary
    fn container(&mut self, nested: bool) -> Vec<StructuralElement> {
        let units = self.units;
        let mut elements = Vec::new();
        let mut pending = PendingParagraph::at(self.index);
        while let Some(unit) = units.get(self.pos) {
            match unit {
                Unit::RowStart { .. } | Unit::CellStart { .. } | Unit::TableEnd { .. } => {
                    if nested {
                        break;
                    }
                    tracing::warn!("stray table marker outside a table");
                    self.advance();
                }
                Unit::TableStart { .. } => {
                    pending.flush_unterminated(&mut elements, self.index);
                    let table = self.table();
                    elements.push(table);
                    pending = PendingParagraph::at(self.index);
                }
                Unit::SectionBreak { width } => {
                    pending.flush_unterminated(&mut elements, self.index);
                    elements.push(StructuralElement {
                        start_index: self.index,
                        end_index: self.index + width,
                        content: BlockContent::SectionBreak(SectionBreak {}),
                    });
                    self.advance();
                    pending = PendingParagraph::at(self.index);
                }
                Unit::Char { ch, style } => {
                    pending.push_char(*ch, style, self.index);
                    self.advance();
                }
                Unit::Element { content, width } => {
                    pending.elements.push(ParagraphElement {
                        start_index: self.index,
                        end_index: self.index + width,
                        content: content.clone(),
                    });
                    self.advance();
                }
                Unit::Newline {
                    style,
                    paragraph,
                    bullet,
                } => {
                    pending.push_char('\n', style, self.index);
                    self.advance();
                    let finished = std::mem::replace(&mut pending, PendingParagraph::at(self.index));
                    elements.push(finished.finish(paragraph.clone(), bullet.clone(), self.index));
                }
            }
        }
        pending.flush_unterminated(&mut elements, self.index);
        elements
    }

    fn table(&mut self) -> StructuralElement {
        let start_index = self.index;
        self.advance();
        let mut rows = Vec::new();
        while let Some(Unit::RowStart { .. }) = self.units.get(self.pos) {
            let row_start = self.index;
            self.advance();
            let mut cells = Vec::new();
            while let Some(Unit::CellStart { .. }) = self.units.get(self.pos) {
                let cell_start = self.index;
                self.advance();
                let content = self.container(true);
                cells.push(TableCell {
                    start_index: cell_start,
                    end_index: self.index,
                    content,
                });
            }
            rows.push(TableRow {
                start_index: row_start,
                end_index: self.index,
                cells,
            });
        }
        if let Some(Unit::TableEnd { .. }) = self.units.get(self.pos) {
            self.advance();
        }
        StructuralElement {
            start_index,
            end_index: self.index,
            content: BlockContent::Table(Table { rows }),
        }
    }
}

struct PendingParagraph {
    start: usize,
    elements: Vec<ParagraphElement>,
}

impl PendingParagraph {
    fn at(start: usize) -> Self {
        Self {
            start,
            elements: Vec::new(),
        }
    }

    fn push_char(&mut self, ch: char, style: &TextStyle, index: usize) {
        let width = ch.len_utf16();
        if let Some(ParagraphElement {
            end_index,
            content: InlineContent::TextRun(run),
            ..
        }) = self.elements.last_mut()
        {
            if run.style == *style && *end_index == index {
                run.content.push(ch);
                *end_index += width;
                return;
            }
        }
        self.elements.push(ParagraphElement {
            start_index: index,
            end_index: index + width,
            content: InlineContent::TextRun(TextRun {
                content: ch.to_string(),
                style: style.clone(),
            }),
        });
    }

    fn finish(self, style: ParagraphStyle, bullet: Option<Bullet>, end_index: usize) -> StructuralElement {
        StructuralElement {
            start_index: self.start,
            end_index,
            content: BlockContent::Paragraph(Paragraph {
                elements: self.elements,
                style,
                bullet,
            }),
        }
    }

    /// Content left without a terminator (only reachable through edits that
    /// removed a newline right before a table)
    fn flush_unterminated(&mut self, elements: &mut Vec<StructuralElement>, end_index: usize) {
        if self.elements.is_empty() {
            return;
        }
        let pending = std::mem::replace(self, PendingParagraph::at(end_index));
        elements.push(pending.finish(ParagraphStyle::default(), None, end_index));
    }
}
