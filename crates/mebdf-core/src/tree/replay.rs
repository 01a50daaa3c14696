// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory application of mutation batches
//!
//! Ops apply in list order against the flat unit view; the tree is rebuilt
//! with fresh indices once the whole batch has gone through. Named positions
//! move with the text around them.

use super::flat::{FlatBody, Unit};
use super::{AnchorKind, Bullet, ListDefinition, NamedPosition, Snapshot, TextStyle};
use crate::ast::ListKind;
use crate::traits::{ConversionError, Result};
use crate::tree::{utf16_len, InlineContent, ParagraphStyle};
use crate::writer::ops::{ListPlacement, MutationOp, ParagraphField, TextField};
use std::collections::BTreeSet;
use std::ops::Range;

/// Apply `ops` to a copy of `snapshot`
pub fn apply(snapshot: &Snapshot, ops: &[MutationOp]) -> Result<Snapshot> {
    let mut replay = Replay {
        flat: FlatBody::flatten(&snapshot.body),
        snapshot: snapshot.clone(),
    };
    for op in ops {
        replay.apply(op)?;
    }
    tracing::debug!(ops = ops.len(), "replayed mutation batch");
    let mut result = replay.snapshot;
    result.body = replay.flat.rebuild();
    Ok(result)
}

fn invalid(message: impl Into<String>) -> ConversionError {
    ConversionError::Provider(message.into())
}

struct Replay {
    flat: FlatBody,
    /// Everything but the body, which lives in `flat` until the end
    snapshot: Snapshot,
}

impl Replay {
    fn apply(&mut self, op: &MutationOp) -> Result<()> {
        match op {
            MutationOp::InsertText { index, text } => self.insert_text(*index, text),
            MutationOp::DeleteRange { range } => self.delete_range(range.clone()),
            MutationOp::UpdateTextStyle {
                range,
                style,
                fields,
            } => {
                self.update_text_style(range.clone(), style, fields);
                Ok(())
            }
            MutationOp::UpdateParagraphStyle {
                range,
                style,
                list,
                fields,
            } => {
                self.update_paragraph_style(range.clone(), style, *list, fields);
                Ok(())
            }
            MutationOp::CreateAnchor { index, id, kind } => self.create_anchor(*index, id, *kind),
        }
    }

    /// Unit position whose start is exactly `index`
    fn boundary(&self, index: usize) -> Result<usize> {
        let positions = self.flat.positions();
        positions
            .iter()
            .position(|&start| start == index)
            .ok_or_else(|| invalid(format!("index {index} is not a unit boundary")))
    }

    fn insert_text(&mut self, index: usize, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        let at = self.boundary(index)?;
        let units = &self.flat.units;
        let style = match (at.checked_sub(1).and_then(|i| units.get(i)), units.get(at)) {
            (Some(Unit::Char { style, .. }), _) => style.clone(),
            (_, Some(Unit::Char { style, .. } | Unit::Newline { style, .. })) => style.clone(),
            _ => TextStyle::default(),
        };
        // split paragraphs copy the style of the paragraph they split
        let (paragraph, bullet) = units[at..]
            .iter()
            .take_while(|unit| !unit.is_table_marker())
            .find_map(|unit| match unit {
                Unit::Newline {
                    paragraph, bullet, ..
                } => Some((
                    ParagraphStyle {
                        heading_id: None,
                        ..paragraph.clone()
                    },
                    bullet.clone(),
                )),
                _ => None,
            })
            .unwrap_or_default();

        let inserted: Vec<Unit> = text
            .chars()
            .map(|ch| match ch {
                '\n' => Unit::Newline {
                    style: style.clone(),
                    paragraph: paragraph.clone(),
                    bullet: bullet.clone(),
                },
                ch => Unit::Char {
                    ch,
                    style: style.clone(),
                },
            })
            .collect();
        self.flat.units.splice(at..at, inserted);

        let width = utf16_len(text);
        for position in &mut self.snapshot.named_positions {
            if position.index > index {
                position.index += width;
            }
        }
        Ok(())
    }

    fn delete_range(&mut self, range: Range<usize>) -> Result<()> {
        if range.is_empty() {
            return Ok(());
        }
        let from = self.boundary(range.start)?;
        let to = self.boundary(range.end)?;
        let doomed = &self.flat.units[from..to];

        let mut depth = 0i32;
        for unit in doomed {
            match unit {
                Unit::TableStart { .. } => depth += 1,
                Unit::TableEnd { .. } => depth -= 1,
                Unit::RowStart { .. } | Unit::CellStart { .. } if depth == 0 => depth = -1,
                _ => {}
            }
            if depth < 0 {
                break;
            }
        }
        if depth != 0 {
            return Err(invalid(format!("range {range:?} cuts through a table")));
        }
        let ends_in_newline = matches!(doomed.last(), Some(Unit::Newline { .. }));
        let followed_by_boundary = match self.flat.units.get(to) {
            None => true,
            Some(unit) => unit.is_table_marker(),
        };
        if ends_in_newline && followed_by_boundary {
            return Err(invalid(format!(
                "range {range:?} removes the last paragraph terminator of its segment"
            )));
        }

        self.flat.units.drain(from..to);
        let width = range.len();
        for position in &mut self.snapshot.named_positions {
            if position.index >= range.end {
                position.index -= width;
            } else if position.index > range.start {
                position.index = range.start;
            }
        }
        Ok(())
    }

    fn update_text_style(&mut self, range: Range<usize>, source: &TextStyle, fields: &BTreeSet<TextField>) {
        let positions = self.flat.positions();
        for (unit, &start) in self.flat.units.iter_mut().zip(&positions) {
            if !range.contains(&start) {
                continue;
            }
            let target = match unit {
                Unit::Char { style, .. } | Unit::Newline { style, .. } => style,
                Unit::Element { content, .. } => match content {
                    InlineContent::InlineObject(object) => &mut object.style,
                    InlineContent::RichLink(link) => &mut link.style,
                    _ => continue,
                },
                _ => continue,
            };
            copy_text_fields(target, source, fields);
        }
    }

    fn update_paragraph_style(
        &mut self,
        range: Range<usize>,
        source: &ParagraphStyle,
        list: Option<ListPlacement>,
        fields: &BTreeSet<ParagraphField>,
    ) {
        let synthetic = list.map(|placement| self.synthetic_list(placement.kind));
        let positions = self.flat.positions();
        let lists = &self.snapshot.lists;
        let mut paragraph_start = self.flat.start;
        for (unit, &start) in self.flat.units.iter_mut().zip(&positions) {
            let (paragraph, bullet) = match unit {
                Unit::Newline {
                    paragraph, bullet, ..
                } => (paragraph, bullet),
                other => {
                    if other.is_table_marker() || matches!(other, Unit::SectionBreak { .. }) {
                        paragraph_start = start + other.width();
                    }
                    continue;
                }
            };
            let overlaps = if range.is_empty() {
                paragraph_start <= range.start && range.start <= start
            } else {
                paragraph_start < range.end && range.start <= start
            };
            paragraph_start = start + 1;
            if !overlaps {
                continue;
            }

            for field in fields {
                match field {
                    ParagraphField::NamedStyle => paragraph.named_style_type = source.named_style_type,
                    ParagraphField::Alignment => paragraph.alignment = source.alignment,
                    ParagraphField::IndentStart => paragraph.indent_start = source.indent_start,
                    ParagraphField::IndentFirstLine => paragraph.indent_first_line = source.indent_first_line,
                    ParagraphField::SpaceAbove => paragraph.space_above = source.space_above,
                    ParagraphField::SpaceBelow => paragraph.space_below = source.space_below,
                    ParagraphField::LineSpacing => paragraph.line_spacing = source.line_spacing,
                    ParagraphField::Bullet => {
                        *bullet = match (list, &synthetic) {
                            (Some(placement), Some(list_id)) => {
                                // keep the paragraph's own list when it already has the right glyphs
                                let keep = bullet.as_ref().filter(|current| {
                                    lists.get(&current.list_id).map(|def| def.kind_at(placement.nesting_level))
                                        == Some(placement.kind)
                                });
                                Some(Bullet {
                                    list_id: keep.map_or_else(|| list_id.clone(), |current| current.list_id.clone()),
                                    nesting_level: placement.nesting_level,
                                })
                            }
                            _ => None,
                        }
                    }
                }
            }
        }
    }

    fn synthetic_list(&mut self, kind: ListKind) -> String {
        let id = match kind {
            ListKind::Bullet => "list.bullet",
            ListKind::Ordered => "list.ordered",
        };
        self.snapshot
            .lists
            .entry(id.to_string())
            .or_insert_with(|| ListDefinition {
                nesting_levels: vec![kind],
            });
        id.to_string()
    }

    fn create_anchor(&mut self, index: usize, id: &str, kind: AnchorKind) -> Result<()> {
        if index > self.flat.end() {
            return Err(invalid(format!("anchor index {index} is past the end")));
        }
        if kind != AnchorKind::Heading {
            self.snapshot.named_positions.push(NamedPosition {
                id: id.to_string(),
                kind,
                index,
            });
            return Ok(());
        }
        // a heading id names one paragraph; creating it again moves it
        let positions = self.flat.positions();
        let mut paragraph_start = self.flat.start;
        let mut target = None;
        for (position, (unit, &start)) in self.flat.units.iter().zip(&positions).enumerate() {
            match unit {
                Unit::Newline { .. } => {
                    if target.is_none() && paragraph_start <= index && index <= start {
                        target = Some(position);
                    }
                    paragraph_start = start + 1;
                }
                unit if unit.is_table_marker() => paragraph_start = start + unit.width(),
                _ => {}
            }
        }
        let target =
            target.ok_or_else(|| invalid(format!("no paragraph at index {index} for heading anchor {id}")))?;
        for (position, unit) in self.flat.units.iter_mut().enumerate() {
            if let Unit::Newline { paragraph, .. } = unit {
                if position == target {
                    paragraph.heading_id = Some(id.to_string());
                } else if paragraph.heading_id.as_deref() == Some(id) {
                    paragraph.heading_id = None;
                }
            }
        }
        Ok(())
    }
}

fn copy_text_fields(target: &mut TextStyle, source: &TextStyle, fields: &BTreeSet<TextField>) {
    for field in fields {
        match field {
            TextField::Bold => target.bold = source.bold,
            TextField::Italic => target.italic = source.italic,
            TextField::Underline => target.underline = source.underline,
            TextField::FontFamily => target.font_family = source.font_family.clone(),
            TextField::Weight => target.weight = source.weight,
            TextField::FontSize => target.font_size = source.font_size,
            TextField::ForegroundColor => target.foreground_color = source.foreground_color,
            TextField::BackgroundColor => target.background_color = source.background_color,
            TextField::Link => target.link = source.link.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{BlockContent, NamedStyleType, Paragraph};
    use pretty_assertions::assert_eq;

    fn fixture() -> Snapshot {
        Snapshot::from_json(
            r#"{"tabId": "t.0", "body": [
                {"startIndex": 0, "endIndex": 6, "paragraph": {"elements": [
                    {"startIndex": 0, "endIndex": 6, "textRun": {"content": "Hello\n"}}
                ], "style": {"namedStyleType": "HEADING_1", "headingId": "h.1"}}},
                {"startIndex": 6, "endIndex": 12, "paragraph": {"elements": [
                    {"startIndex": 6, "endIndex": 12, "textRun": {"content": "world\n"}}
                ]}}
            ], "namedPositions": [{"id": "b1", "kind": "bookmark", "index": 8}]}"#,
        )
        .unwrap()
    }

    fn paragraph(snapshot: &Snapshot, n: usize) -> &Paragraph {
        snapshot.paragraphs().nth(n).map(|(_, p)| p).unwrap()
    }

    #[test]
    fn test_insert_shifts_later_positions() {
        let result = apply(
            &fixture(),
            &[MutationOp::InsertText {
                index: 6,
                text: "big ".into(),
            }],
        )
        .unwrap();
        assert_eq!(paragraph(&result, 1).text(), "big world\n");
        assert_eq!(result.named_positions[0].index, 12);
        assert_eq!(result.doc_end(), 16);
    }

    #[test]
    fn test_insert_newline_splits_paragraph() {
        let result = apply(
            &fixture(),
            &[MutationOp::InsertText {
                index: 2,
                text: "\n".into(),
            }],
        )
        .unwrap();
        let texts: Vec<String> = result.paragraphs().map(|(_, p)| p.text()).collect();
        assert_eq!(texts, vec!["He\n", "llo\n", "world\n"]);
        assert_eq!(paragraph(&result, 0).style.named_style_type, NamedStyleType::Heading1);
        assert_eq!(paragraph(&result, 0).style.heading_id, None);
        assert_eq!(paragraph(&result, 1).style.heading_id.as_deref(), Some("h.1"));
    }

    #[test]
    fn test_delete_merges_and_collapses_positions() {
        let result = apply(&fixture(), &[MutationOp::DeleteRange { range: 3..9 }]).unwrap();
        let texts: Vec<String> = result.paragraphs().map(|(_, p)| p.text()).collect();
        assert_eq!(texts, vec!["Helld\n"]);
        assert_eq!(result.named_positions[0].index, 3);
        // the surviving terminator is the second paragraph's
        assert_eq!(paragraph(&result, 0).style.named_style_type, NamedStyleType::NormalText);
    }

    #[test]
    fn test_final_terminator_cannot_be_deleted() {
        let err = apply(&fixture(), &[MutationOp::DeleteRange { range: 10..12 }]).unwrap_err();
        assert!(matches!(err, ConversionError::Provider(_)));
    }

    #[test]
    fn test_style_updates() {
        let ops = vec![
            MutationOp::UpdateTextStyle {
                range: 6..9,
                style: TextStyle {
                    bold: Some(true),
                    ..TextStyle::default()
                },
                fields: [TextField::Bold].into_iter().collect(),
            },
            MutationOp::UpdateParagraphStyle {
                range: 6..12,
                style: ParagraphStyle::default(),
                list: Some(ListPlacement {
                    kind: ListKind::Ordered,
                    nesting_level: 1,
                }),
                fields: [ParagraphField::Bullet].into_iter().collect(),
            },
        ];
        let result = apply(&fixture(), &ops).unwrap();
        let (_, second) = result.paragraphs().nth(1).unwrap();
        assert_eq!(second.elements.len(), 2);
        let bullet = second.bullet.as_ref().unwrap();
        assert_eq!(bullet.nesting_level, 1);
        assert_eq!(result.lists[&bullet.list_id].kind_at(1), ListKind::Ordered);
        match &second.elements[0].content {
            InlineContent::TextRun(run) => {
                assert_eq!(run.content, "wor");
                assert_eq!(run.style.bold, Some(true));
            }
            other => panic!("expected text run, got {other:?}"),
        }
    }

    #[test]
    fn test_create_anchors() {
        let ops = vec![
            MutationOp::CreateAnchor {
                index: 6,
                id: "h.2".into(),
                kind: AnchorKind::Heading,
            },
            MutationOp::CreateAnchor {
                index: 3,
                id: "id.1".into(),
                kind: AnchorKind::Bookmark,
            },
        ];
        let result = apply(&fixture(), &ops).unwrap();
        assert_eq!(paragraph(&result, 1).style.heading_id.as_deref(), Some("h.2"));
        assert!(result
            .named_positions
            .iter()
            .any(|position| position.id == "id.1" && position.index == 3));
        assert!(matches!(result.body[0].content, BlockContent::Paragraph(_)));
    }

    #[test]
    fn test_heading_anchor_moves_an_existing_id() {
        let ops = [MutationOp::CreateAnchor {
            index: 6,
            id: "h.1".into(),
            kind: AnchorKind::Heading,
        }];
        let result = apply(&fixture(), &ops).unwrap();
        assert_eq!(paragraph(&result, 0).style.heading_id, None);
        assert_eq!(paragraph(&result, 1).style.heading_id.as_deref(), Some("h.1"));
    }

    #[test]
    fn test_misaligned_index_is_rejected() {
        let snapshot = Snapshot::from_json(
            r#"{"body": [{"startIndex": 0, "endIndex": 3, "paragraph": {"elements": [
                {"startIndex": 0, "endIndex": 3, "textRun": {"content": "😀\n"}}
            ]}}]}"#,
        )
        .unwrap();
        let err = apply(
            &snapshot,
            &[MutationOp::InsertText {
                index: 1,
                text: "x".into(),
            }],
        )
        .unwrap_err();
        assert!(err.to_string().contains("not a unit boundary"));
    }
}
