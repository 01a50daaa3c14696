// SPDX-License-Identifier: AGPL-3.0-or-later
//! Snapshots built from MEBDF text
//!
//! The tree is the one an import into an empty tab would leave behind: the
//! same character styles the writer emits for new text, heading ids from
//! `{^ id}`, bookmarks from inline anchors and one descriptor per object
//! placeholder. Every structural marker is one unit wide and the body starts
//! at index 0.

use super::flat::{FlatBody, Unit};
use super::{
    AnchorKind, Bullet, Equation, InlineContent, InlineObject, ListDefinition, NamedPosition,
    ObjectDescriptor, ImageProperties, ParagraphStyle, RichLink, RichLinkProperties, Snapshot, TextStyle,
};
use crate::ast::{AnchorId, ListKind, ObjectKind};
use crate::config::ConvertConfig;
use crate::mebdf::parse;
use crate::writer::diff::{tree_link, written_style};
use crate::writer::fresh_anchor_id;
use crate::writer::lower::{lower, LoweredParagraph, NewItem, Sequence};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};

impl Snapshot {
    /// Build a snapshot holding `text`. Parse warnings are dropped; the
    /// malformed markup stays as literal text.
    pub fn from_mebdf(text: &str, config: &ConvertConfig) -> Snapshot {
        let parsed = parse(text);
        let lowered = lower(&parsed.document, &config.style, true);

        let mut explicit = Vec::new();
        lowered.body.explicit_anchors(&mut explicit);
        let mut builder = Builder {
            config,
            paragraphs: &lowered.paragraphs,
            link_kinds: explicit.iter().cloned().collect(),
            known: explicit.into_iter().map(|(id, _)| id).collect(),
            units: Vec::new(),
            index: 0,
            heading_id: None,
            snapshot: Snapshot {
                tab_id: "t.0".to_string(),
                ..Snapshot::default()
            },
        };
        builder.sequence(&lowered.body);

        let mut snapshot = builder.snapshot;
        snapshot.body = FlatBody {
            start: 0,
            units: builder.units,
        }
        .rebuild();
        tracing::debug!(elements = snapshot.body.len(), end = snapshot.doc_end(), "built snapshot from MEBDF");
        snapshot
    }
}

struct Builder<'a> {
    config: &'a ConvertConfig,
    paragraphs: &'a [LoweredParagraph],
    link_kinds: BTreeMap<String, AnchorKind>,
    known: BTreeSet<String>,
    units: Vec<Unit>,
    index: usize,
    /// Heading id waiting for its paragraph terminator
    heading_id: Option<String>,
    snapshot: Snapshot,
}

impl Builder<'_> {
    fn sequence(&mut self, seq: &Sequence) {
        let mut anchors = seq.anchors.iter().peekable();
        for (position, item) in seq.items.iter().enumerate() {
            while let Some(anchor) = anchors.next_if(|anchor| anchor.position <= position) {
                self.anchor(&anchor.id, anchor.kind);
            }
            self.item(item);
        }
        for anchor in anchors {
            self.anchor(&anchor.id, anchor.kind);
        }
    }

    fn anchor(&mut self, id: &AnchorId, kind: AnchorKind) {
        let id = match id {
            AnchorId::Existing(id) => id.clone(),
            AnchorId::Proposed => {
                let id = fresh_anchor_id(&self.known, kind, &self.config.import);
                self.known.insert(id.clone());
                id
            }
        };
        match kind {
            AnchorKind::Heading => self.heading_id = Some(id),
            AnchorKind::Bookmark | AnchorKind::Comment => self.snapshot.named_positions.push(NamedPosition {
                id,
                kind,
                index: self.index,
            }),
        }
    }

    fn push(&mut self, unit: Unit) {
        self.index += unit.width();
        self.units.push(unit);
    }

    fn item(&mut self, item: &NewItem) {
        match item {
            NewItem::Char { ch, format, paragraph } => {
                let link = format.link.as_ref().map(|target| tree_link(target, &self.link_kinds));
                let style = written_style(format, &self.paragraphs[*paragraph].text, self.config, link);
                self.push(Unit::Char { ch: *ch, style });
            }
            NewItem::Newline { paragraph } => {
                let props = &self.paragraphs[*paragraph].props;
                let bullet = props.list.map(|placement| Bullet {
                    list_id: self.list_id(placement.kind),
                    nesting_level: placement.nesting_level,
                });
                let paragraph = ParagraphStyle {
                    heading_id: self.heading_id.take(),
                    ..props.to_style()
                };
                self.push(Unit::Newline {
                    style: TextStyle::default(),
                    paragraph,
                    bullet,
                });
            }
            NewItem::Object { id, kind } => {
                if let Some(content) = self.object(id.as_deref(), *kind) {
                    self.push(Unit::Element { content, width: 1 });
                }
            }
            NewItem::Table(table) => {
                self.push(Unit::TableStart { width: 1 });
                for row in &table.rows {
                    self.push(Unit::RowStart { width: 1 });
                    for cell in row {
                        self.push(Unit::CellStart { width: 1 });
                        self.sequence(cell);
                    }
                }
                self.push(Unit::TableEnd { width: 1 });
            }
        }
    }

    fn object(&mut self, id: Option<&str>, kind: ObjectKind) -> Option<InlineContent> {
        let id = match (id, kind) {
            (_, ObjectKind::Equation) => return Some(InlineContent::Equation(Equation {})),
            (Some(id), _) => id.to_string(),
            (None, _) => {
                tracing::debug!(%kind, "placeholder without id skipped");
                return None;
            }
        };
        let rich_link = |uri: String| {
            InlineContent::RichLink(RichLink {
                rich_link_id: id.clone(),
                properties: RichLinkProperties {
                    uri,
                    title: None,
                    mime_type: None,
                },
                style: TextStyle::default(),
            })
        };
        let descriptor = match kind {
            ObjectKind::Video => return Some(rich_link(format!("https://www.youtube.com/watch?v={id}"))),
            ObjectKind::Embed => return Some(rich_link(format!("https://files.example.com/{id}"))),
            ObjectKind::Image => ObjectDescriptor {
                image: Some(ImageProperties {
                    content_uri: Some(format!("https://images.example.com/{id}.png")),
                    source_uri: None,
                }),
                ..ObjectDescriptor::default()
            },
            ObjectKind::Drawing => ObjectDescriptor {
                drawing: Some(json!({})),
                ..ObjectDescriptor::default()
            },
            ObjectKind::Chart => ObjectDescriptor {
                chart_reference: Some(json!({ "chartId": id })),
                ..ObjectDescriptor::default()
            },
            ObjectKind::Equation => ObjectDescriptor::default(),
        };
        self.snapshot.objects.insert(id.clone(), descriptor);
        Some(InlineContent::InlineObject(InlineObject {
            object_id: id,
            style: TextStyle::default(),
        }))
    }

    fn list_id(&mut self, kind: ListKind) -> String {
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{BlockContent, NamedStyleType, TreeLink};
    use pretty_assertions::assert_eq;

    fn build(text: &str) -> Snapshot {
        Snapshot::from_mebdf(text, &ConvertConfig::default())
    }

    #[test]
    fn test_indices_are_contiguous() {
        let snapshot = build("ab\n# {^ h.1}T");
        assert_eq!(snapshot.body.len(), 2);
        assert_eq!((snapshot.body[0].start_index, snapshot.body[0].end_index), (0, 3));
        assert_eq!((snapshot.body[1].start_index, snapshot.body[1].end_index), (3, 5));
        let (_, heading) = snapshot.paragraphs().nth(1).unwrap();
        assert_eq!(heading.style.named_style_type, NamedStyleType::Heading1);
        assert_eq!(heading.style.heading_id.as_deref(), Some("h.1"));
    }

    #[test]
    fn test_proposed_anchors_get_fresh_ids() {
        let snapshot = build("# {^}One\n# {^ h.1}Two\ntext{^}");
        assert!(snapshot.is_heading_id("h.2"));
        assert!(snapshot.is_heading_id("h.1"));
        assert_eq!(snapshot.named_positions.len(), 1);
        assert_eq!(snapshot.named_positions[0].id, "id.1");
        assert_eq!(snapshot.named_positions[0].index, 12);
    }

    #[test]
    fn test_objects_get_descriptors() {
        let snapshot = build("{^= pic image}{^= chart1 chart}{^= clip video}{^= equation}");
        assert!(snapshot.objects["pic"].image.is_some());
        assert!(snapshot.objects["chart1"].chart_reference.is_some());
        assert!(!snapshot.objects.contains_key("clip"));
        let (element, paragraph) = snapshot.paragraphs().next().unwrap();
        assert_eq!(paragraph.elements.len(), 5);
        assert_eq!(element.end_index, 5);
    }

    #[test]
    fn test_table_markers() {
        let snapshot = build("| a | b |\n| --- | --- |");
        let BlockContent::Table(table) = &snapshot.body[0].content else {
            panic!("expected a table");
        };
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].cells.len(), 2);
        // table, row and cell markers precede the first cell paragraph
        assert_eq!(table.rows[0].cells[0].content[0].start_index, 3);
        assert_eq!(snapshot.body[0].end_index, 9);
        // a paragraph follows a trailing table
        assert_eq!(snapshot.doc_end(), 10);
    }

    #[test]
    fn test_links_and_lists() {
        let snapshot = build("- [x](#^id.1) {^ id.1}\n  1. y");
        let (_, first) = snapshot.paragraphs().next().unwrap();
        let style = first.char_styles().next().unwrap();
        assert_eq!(style.link, Some(TreeLink::BookmarkId("id.1".into())));
        assert_eq!(style.underline, Some(true));
        let (_, second) = snapshot.paragraphs().nth(1).unwrap();
        let bullet = second.bullet.as_ref().unwrap();
        assert_eq!(bullet.nesting_level, 1);
        assert_eq!(snapshot.lists[&bullet.list_id].kind_at(1), ListKind::Ordered);
    }
}
