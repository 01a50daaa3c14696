// SPDX-License-Identifier: AGPL-3.0-or-later
//! Rich-document tree snapshots
//!
//! A snapshot is the immutable tree of one tab as supplied by the document
//! provider. Offsets are UTF-16 code units; every element carries its absolute
//! `[start_index, end_index)`. Snapshots deserialize from camelCase JSON.

pub mod builder;
pub mod flat;
pub mod objects;
pub mod replay;

use crate::ast::{Alignment, Color, ListKind, NamedStyle};
use crate::traits::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// UTF-16 width of a string
pub fn utf16_len(text: &str) -> usize {
    text.chars().map(char::len_utf16).sum()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub tab_id: String,
    #[serde(default)]
    pub body: Vec<StructuralElement>,
    /// Embedded object descriptors by object id
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub objects: BTreeMap<String, ObjectDescriptor>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub lists: BTreeMap<String, ListDefinition>,
    /// Bookmarks and comment anchors
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub named_positions: Vec<NamedPosition>,
}

impl Snapshot {
    pub fn from_json(input: &str) -> Result<Self> {
        Ok(serde_json::from_str(input)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// End index of the last structural element
    pub fn doc_end(&self) -> usize {
        self.body.last().map_or(0, |element| element.end_index)
    }

    /// Top-level paragraphs with their structural element
    pub fn paragraphs(&self) -> impl Iterator<Item = (&StructuralElement, &Paragraph)> {
        self.body.iter().filter_map(|element| match &element.content {
            BlockContent::Paragraph(paragraph) => Some((element, paragraph)),
            _ => None,
        })
    }

    /// Every id an anchor reference may resolve to: heading ids anywhere in
    /// the body plus bookmarks and comment anchors
    pub fn known_anchor_ids(&self) -> BTreeSet<String> {
        let mut ids: BTreeSet<String> = self
            .named_positions
            .iter()
            .map(|position| position.id.clone())
            .collect();
        visit_paragraphs(&self.body, &mut |_, paragraph| {
            if let Some(id) = &paragraph.style.heading_id {
                ids.insert(id.clone());
            }
        });
        ids
    }

    /// Whether `id` names a heading (as opposed to a bookmark or comment)
    pub fn is_heading_id(&self, id: &str) -> bool {
        let mut found = false;
        visit_paragraphs(&self.body, &mut |_, paragraph| {
            found |= paragraph.style.heading_id.as_deref() == Some(id);
        });
        found
    }
}

/// Depth-first walk over all paragraphs, including those inside table cells
pub fn visit_paragraphs<'a>(
    body: &'a [StructuralElement],
    visit: &mut impl FnMut(&'a StructuralElement, &'a Paragraph),
) {
    for element in body {
        match &element.content {
            BlockContent::Paragraph(paragraph) => visit(element, paragraph),
            BlockContent::Table(table) => {
                for row in &table.rows {
                    for cell in &row.cells {
                        visit_paragraphs(&cell.content, visit);
                    }
                }
            }
            BlockContent::SectionBreak(_) => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuralElement {
    pub start_index: usize,
    pub end_index: usize,
    #[serde(flatten)]
    pub content: BlockContent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BlockContent {
    Paragraph(Paragraph),
    Table(Table),
    SectionBreak(SectionBreak),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SectionBreak {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paragraph {
    #[serde(default)]
    pub elements: Vec<ParagraphElement>,
    #[serde(default)]
    pub style: ParagraphStyle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bullet: Option<Bullet>,
}

impl Paragraph {
    /// Style of every character, terminator excluded
    pub fn char_styles(&self) -> impl Iterator<Item = &TextStyle> {
        self.elements.iter().flat_map(|element| {
            let run = match &element.content {
                InlineContent::TextRun(run) => Some(run),
                _ => None,
            };
            run.into_iter()
                .flat_map(|run| run.content.chars().filter(|ch| *ch != '\n').map(move |_| &run.style))
        })
    }

    /// Text of all runs, terminator included
    pub fn text(&self) -> String {
        self.elements
            .iter()
            .filter_map(|element| match &element.content {
                InlineContent::TextRun(run) => Some(run.content.as_str()),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParagraphElement {
    pub start_index: usize,
    pub end_index: usize,
    #[serde(flatten)]
    pub content: InlineContent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InlineContent {
    TextRun(TextRun),
    InlineObject(InlineObject),
    Equation(Equation),
    RichLink(RichLink),
    /// Page breaks, footnote references, auto text and the like
    Opaque(Opaque),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextRun {
    pub content: String,
    #[serde(default)]
    pub style: TextStyle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineObject {
    pub object_id: String,
    #[serde(default)]
    pub style: TextStyle,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Equation {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RichLink {
    pub rich_link_id: String,
    pub properties: RichLinkProperties,
    #[serde(default)]
    pub style: TextStyle,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RichLinkProperties {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Opaque {
    pub kind: String,
}

/// Character style. `None` means "inherited from the paragraph style".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextStyle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bold: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub italic: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub underline: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strikethrough: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub small_caps: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_offset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreground_color: Option<Color>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<Color>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<TreeLink>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TreeLink {
    Url(String),
    HeadingId(String),
    BookmarkId(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParagraphStyle {
    #[serde(default)]
    pub named_style_type: NamedStyleType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alignment: Option<Alignment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indent_start: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indent_first_line: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space_above: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space_below: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_spacing: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum NamedStyleType {
    #[default]
    #[serde(rename = "NORMAL_TEXT")]
    NormalText,
    #[serde(rename = "TITLE")]
    Title,
    #[serde(rename = "SUBTITLE")]
    Subtitle,
    #[serde(rename = "HEADING_1")]
    Heading1,
    #[serde(rename = "HEADING_2")]
    Heading2,
    #[serde(rename = "HEADING_3")]
    Heading3,
    #[serde(rename = "HEADING_4")]
    Heading4,
    #[serde(rename = "HEADING_5")]
    Heading5,
    #[serde(rename = "HEADING_6")]
    Heading6,
}

impl NamedStyleType {
    pub fn heading_level(&self) -> Option<u8> {
        match self {
            Self::Heading1 => Some(1),
            Self::Heading2 => Some(2),
            Self::Heading3 => Some(3),
            Self::Heading4 => Some(4),
            Self::Heading5 => Some(5),
            Self::Heading6 => Some(6),
            _ => None,
        }
    }

    pub fn heading(level: u8) -> Self {
        match level {
            0 | 1 => Self::Heading1,
            2 => Self::Heading2,
            3 => Self::Heading3,
            4 => Self::Heading4,
            5 => Self::Heading5,
            _ => Self::Heading6,
        }
    }

    /// The directive-level style, for non-heading paragraphs
    pub fn to_named(&self) -> Option<NamedStyle> {
        match self {
            Self::NormalText => Some(NamedStyle::NormalText),
            Self::Title => Some(NamedStyle::Title),
            Self::Subtitle => Some(NamedStyle::Subtitle),
            _ => None,
        }
    }
}

impl From<NamedStyle> for NamedStyleType {
    fn from(named: NamedStyle) -> Self {
        match named {
            NamedStyle::NormalText => Self::NormalText,
            NamedStyle::Title => Self::Title,
            NamedStyle::Subtitle => Self::Subtitle,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bullet {
    pub list_id: String,
    #[serde(default)]
    pub nesting_level: u8,
}

/// Glyph kind per nesting level; deeper levels repeat the last entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListDefinition {
    #[serde(default)]
    pub nesting_levels: Vec<ListKind>,
}

impl ListDefinition {
    pub fn kind_at(&self, level: u8) -> ListKind {
        self.nesting_levels
            .get(level as usize)
            .or(self.nesting_levels.last())
            .copied()
            .unwrap_or(ListKind::Bullet)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnchorKind {
    Heading,
    Bookmark,
    Comment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamedPosition {
    pub id: String,
    pub kind: AnchorKind,
    pub index: usize,
}

/// Provider-side description of an embedded object; only presence of the
/// reference fields matters for classification
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_reference: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drawing: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageProperties>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_content: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_uri: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    pub rows: Vec<TableRow>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRow {
    pub start_index: usize,
    pub end_index: usize,
    pub cells: Vec<TableCell>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableCell {
    pub start_index: usize,
    pub end_index: usize,
    pub content: Vec<StructuralElement>,
}
