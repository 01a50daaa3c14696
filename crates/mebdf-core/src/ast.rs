// SPDX-License-Identifier: AGPL-3.0-or-later
//! MEBDF document AST
//!
//! One `Block` per line of MEBDF text. Inline formatting nests; block formatting
//! is stateful and is carried by standalone `BlockFormatting` nodes holding the
//! state that applies from that line on.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Span information for source mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: u32,
    pub column: u32,
}

/// The root document node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub blocks: Vec<Block>,
}

impl Document {
    pub fn new(blocks: Vec<Block>) -> Self {
        Self { blocks }
    }

    /// Heading blocks in document order
    pub fn headings(&self) -> impl Iterator<Item = (u8, Option<&AnchorId>, &[Inline])> {
        self.blocks.iter().filter_map(|block| match block {
            Block::Heading {
                level,
                anchor,
                content,
            } => Some((*level, anchor.as_ref(), content.as_slice())),
            _ => None,
        })
    }
}

/// Block-level elements, one per MEBDF line (tables span several lines)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    /// Plain paragraph
    Paragraph { content: Vec<Inline> },

    /// Heading with level 1-6 and its anchor (`# {^ id}Title`)
    Heading {
        level: u8,
        anchor: Option<AnchorId>,
        content: Vec<Inline>,
    },

    /// One list paragraph; nesting is by depth, not by containment
    ListItem {
        kind: ListKind,
        depth: u8,
        content: Vec<Inline>,
    },

    /// Table; the first row is rendered as the header row
    Table { rows: Vec<TableRow> },

    /// Standalone `{!props}` directive holding the state in effect afterwards
    BlockFormatting { state: BlockFormattingState },
}

impl Block {
    /// Inline content of paragraph-like blocks
    pub fn inlines(&self) -> Option<&[Inline]> {
        match self {
            Block::Paragraph { content }
            | Block::Heading { content, .. }
            | Block::ListItem { content, .. } => Some(content),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListKind {
    Bullet,
    Ordered,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    pub cells: Vec<TableCell>,
}

/// Table cell; each entry is one paragraph (`<br>` separated in MEBDF)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableCell {
    pub paragraphs: Vec<Vec<Inline>>,
}

impl Default for TableCell {
    fn default() -> Self {
        Self {
            paragraphs: vec![Vec::new()],
        }
    }
}

/// Anchor reference: an existing id, or a proposed anchor awaiting one
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorId {
    Existing(String),
    Proposed,
}

impl AnchorId {
    pub fn is_proposed(&self) -> bool {
        matches!(self, AnchorId::Proposed)
    }

    pub fn as_existing(&self) -> Option<&str> {
        match self {
            AnchorId::Existing(id) => Some(id),
            AnchorId::Proposed => None,
        }
    }
}

/// Link destination
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkTarget {
    Url(String),
    /// `[text](#^id)`: a heading or bookmark in the same tab
    Anchor(String),
}

/// Inline elements (character-level)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inline {
    /// Plain text
    Text { content: String },

    /// Bold (`**`)
    Strong { content: Vec<Inline> },

    /// Italic (`*`)
    Emphasis { content: Vec<Inline> },

    /// Hyperlink or anchor link
    Link {
        target: LinkTarget,
        content: Vec<Inline>,
    },

    /// `{!props}...{/!}` span
    Formatted {
        format: TextFormatting,
        content: Vec<Inline>,
    },

    /// `{^ id}` or `{^}`
    Anchor { id: AnchorId },

    /// `{^= id type}` or `{^= equation}`
    Object { id: Option<String>, kind: ObjectKind },
}

impl Inline {
    pub fn text(content: impl Into<String>) -> Self {
        Inline::Text {
            content: content.into(),
        }
    }

    /// Concatenated text content, markup dropped
    pub fn plain_text(inlines: &[Inline]) -> String {
        let mut out = String::new();
        for inline in inlines {
            inline.collect_text(&mut out);
        }
        out
    }

    fn collect_text(&self, out: &mut String) {
        match self {
            Inline::Text { content } => out.push_str(content),
            Inline::Strong { content }
            | Inline::Emphasis { content }
            | Inline::Link { content, .. }
            | Inline::Formatted { content, .. } => {
                for inline in content {
                    inline.collect_text(out);
                }
            }
            Inline::Anchor { .. } | Inline::Object { .. } => {}
        }
    }
}

/// Character-level properties of a `{!...}` span. `None` means "not specified".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextFormatting {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bold: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub italic: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub underline: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mono: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlight: Option<Color>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font: Option<String>,
}

impl TextFormatting {
    pub fn is_empty(&self) -> bool {
        *self == TextFormatting::default()
    }

    /// Overlay `inner` on top of `self` (inner wins where specified)
    pub fn merged_with(&self, inner: &TextFormatting) -> TextFormatting {
        TextFormatting {
            bold: inner.bold.or(self.bold),
            italic: inner.italic.or(self.italic),
            underline: inner.underline.or(self.underline),
            mono: inner.mono.or(self.mono),
            highlight: inner.highlight.or(self.highlight),
            color: inner.color.or(self.color),
            font: inner.font.clone().or_else(|| self.font.clone()),
        }
    }
}

/// Paragraph named styles reachable through block directives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamedStyle {
    #[default]
    NormalText,
    Title,
    Subtitle,
}

impl NamedStyle {
    pub const ALL: [Self; 3] = [Self::NormalText, Self::Title, Self::Subtitle];

    /// Directive label (`{!Normal text}`)
    pub const fn label(&self) -> &'static str {
        match self {
            Self::NormalText => "Normal text",
            Self::Title => "Title",
            Self::Subtitle => "Subtitle",
        }
    }

    /// Case-insensitive, whitespace-collapsing label lookup
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized = label.split_whitespace().collect::<Vec<_>>().join(" ");
        Self::ALL
            .into_iter()
            .find(|style| style.label().eq_ignore_ascii_case(&normalized))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    Left,
    Center,
    Right,
    Justify,
}

impl Alignment {
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Center => "center",
            Self::Right => "right",
            Self::Justify => "justify",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.to_ascii_lowercase().as_str() {
            "left" | "start" => Some(Self::Left),
            "center" | "centre" => Some(Self::Center),
            "right" | "end" => Some(Self::Right),
            "justify" | "justified" => Some(Self::Justify),
            _ => None,
        }
    }
}

/// The "current" block formatting: applies to paragraphs and list items until a
/// directive changes or resets it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockFormattingState {
    #[serde(default)]
    pub named_style: NamedStyle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<u16>,
    /// Points
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alignment: Option<Alignment>,
    /// Points
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indent_start: Option<f64>,
    /// Points
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indent_first_line: Option<f64>,
    /// Points
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space_above: Option<f64>,
    /// Points
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space_below: Option<f64>,
    /// Percent (100 = single spacing)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_spacing: Option<f64>,
}

impl BlockFormattingState {
    /// A named style with no overrides
    pub fn baseline(named_style: NamedStyle) -> Self {
        Self {
            named_style,
            ..Self::default()
        }
    }

    pub fn is_baseline(&self) -> bool {
        *self == Self::baseline(self.named_style)
    }

    /// List items take indentation from their nesting, so their effective state
    /// keeps whatever indents are already running.
    pub fn with_indents_from(mut self, running: &BlockFormattingState) -> Self {
        self.indent_start = running.indent_start;
        self.indent_first_line = running.indent_first_line;
        self
    }
}

/// RGB color; named colors print by name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

const NAMED_COLORS: [(&str, Color); 13] = [
    ("black", Color::rgb(0x00, 0x00, 0x00)),
    ("white", Color::rgb(0xff, 0xff, 0xff)),
    ("red", Color::rgb(0xff, 0x00, 0x00)),
    ("green", Color::rgb(0x00, 0x80, 0x00)),
    ("lime", Color::rgb(0x00, 0xff, 0x00)),
    ("blue", Color::rgb(0x00, 0x00, 0xff)),
    ("yellow", Color::rgb(0xff, 0xff, 0x00)),
    ("cyan", Color::rgb(0x00, 0xff, 0xff)),
    ("magenta", Color::rgb(0xff, 0x00, 0xff)),
    ("orange", Color::rgb(0xff, 0xa5, 0x00)),
    ("purple", Color::rgb(0x80, 0x00, 0x80)),
    ("gray", Color::rgb(0x80, 0x80, 0x80)),
    ("pink", Color::rgb(0xff, 0xc0, 0xcb)),
];

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn name(&self) -> Option<&'static str> {
        NAMED_COLORS
            .iter()
            .find(|(_, color)| color == self)
            .map(|(name, _)| *name)
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => f.write_str(&self.to_hex()),
        }
    }
}

impl FromStr for Color {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(hex) = s.strip_prefix('#') {
            if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(format!("invalid color: {s}"));
            }
            let expanded: String = match hex.len() {
                3 => hex.chars().flat_map(|c| [c, c]).collect(),
                6 => hex.to_string(),
                _ => return Err(format!("invalid color: {s}")),
            };
            let channel = |i: usize| {
                u8::from_str_radix(&expanded[i..i + 2], 16).map_err(|_| format!("invalid color: {s}"))
            };
            return Ok(Color::rgb(channel(0)?, channel(2)?, channel(4)?));
        }
        NAMED_COLORS
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(s))
            .map(|(_, color)| *color)
            .ok_or_else(|| format!("unknown color: {s}"))
    }
}

impl TryFrom<String> for Color {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_hex()
    }
}

/// Embedded object kinds (closed set)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Image,
    Drawing,
    Chart,
    Equation,
    Video,
    Embed,
}

impl ObjectKind {
    pub const ALL: [Self; 6] = [
        Self::Image,
        Self::Drawing,
        Self::Chart,
        Self::Equation,
        Self::Video,
        Self::Embed,
    ];

    pub const fn label(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Drawing => "drawing",
            Self::Chart => "chart",
            Self::Equation => "equation",
            Self::Video => "video",
            Self::Embed => "embed",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.label().eq_ignore_ascii_case(label))
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_parse_forms() {
        assert_eq!("yellow".parse::<Color>().unwrap(), Color::rgb(255, 255, 0));
        assert_eq!("#FFFF00".parse::<Color>().unwrap(), Color::rgb(255, 255, 0));
        assert_eq!("#ff0".parse::<Color>().unwrap(), Color::rgb(255, 255, 0));
        assert!("#12345".parse::<Color>().is_err());
        assert!("chartreuse-ish".parse::<Color>().is_err());
        assert!("#a\u{20ac}bc".parse::<Color>().is_err());
        assert!("#\u{20ac}".parse::<Color>().is_err());
        assert!("#+1+2+3".parse::<Color>().is_err());
    }

    #[test]
    fn test_color_display_prefers_names() {
        assert_eq!(Color::rgb(255, 255, 0).to_string(), "yellow");
        assert_eq!(Color::rgb(0x11, 0x55, 0xcc).to_string(), "#1155cc");
    }

    #[test]
    fn test_named_style_labels() {
        assert_eq!(NamedStyle::from_label("normal   TEXT"), Some(NamedStyle::NormalText));
        assert_eq!(NamedStyle::from_label("Title"), Some(NamedStyle::Title));
        assert_eq!(NamedStyle::from_label("Heading 1"), None);
    }

    #[test]
    fn test_plain_text_drops_markup() {
        let inlines = vec![
            Inline::text("a "),
            Inline::Strong {
                content: vec![Inline::text("b")],
            },
            Inline::Anchor {
                id: AnchorId::Proposed,
            },
            Inline::Link {
                target: LinkTarget::Url("https://example.com".into()),
                content: vec![Inline::text(" c")],
            },
        ];
        assert_eq!(Inline::plain_text(&inlines), "a b c");
    }

    #[test]
    fn test_list_indents_follow_running_state() {
        let running = BlockFormattingState {
            indent_start: Some(36.0),
            ..BlockFormattingState::default()
        };
        let item = BlockFormattingState {
            alignment: Some(Alignment::Center),
            indent_start: Some(72.0),
            ..BlockFormattingState::default()
        }
        .with_indents_from(&running);
        assert_eq!(item.indent_start, Some(36.0));
        assert_eq!(item.alignment, Some(Alignment::Center));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn object_kind_strategy() -> impl Strategy<Value = ObjectKind> {
        prop_oneof![
            Just(ObjectKind::Image),
            Just(ObjectKind::Drawing),
            Just(ObjectKind::Chart),
            Just(ObjectKind::Equation),
            Just(ObjectKind::Video),
            Just(ObjectKind::Embed),
        ]
    }

    proptest! {
        // Property: every color prints to a form that parses back to itself
        #[test]
        fn prop_color_display_parse_roundtrip(r in any::<u8>(), g in any::<u8>(), b in any::<u8>()) {
            let color = Color::rgb(r, g, b);
            prop_assert_eq!(color.to_string().parse::<Color>().unwrap(), color);
        }

        // Property: object kind labels are stable identifiers
        #[test]
        fn prop_object_kind_label_roundtrip(kind in object_kind_strategy()) {
            prop_assert_eq!(ObjectKind::from_label(kind.label()), Some(kind));
        }

        // Property: Color survives JSON as a hex string
        #[test]
        fn prop_color_serde_roundtrip(r in any::<u8>(), g in any::<u8>(), b in any::<u8>()) {
            let color = Color::rgb(r, g, b);
            let json = serde_json::to_string(&color).expect("serialize");
            let back: Color = serde_json::from_str(&json).expect("deserialize");
            prop_assert_eq!(back, color);
        }
    }
}
