// SPDX-License-Identifier: AGPL-3.0-or-later
//! Property resolution shared by both conversion directions
//!
//! The exporter decides what a paragraph's block directive says; the writer
//! must reach the same decision on the old tree to diff against the new one.

use crate::ast::{Alignment, BlockFormattingState, Color, LinkTarget, ListKind};
use crate::config::StyleConfig;
use crate::tree::{Bullet, ListDefinition, NamedStyleType, ParagraphStyle, TextStyle, TreeLink};
use crate::writer::ops::{ListPlacement, ParagraphField};
use std::collections::{BTreeMap, BTreeSet};

/// Text properties a block directive carries for a whole paragraph
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct BlockText {
    pub font: Option<String>,
    pub weight: Option<u16>,
    pub size: Option<f64>,
    pub color: Option<Color>,
}

enum Uniform<T> {
    Unseen,
    Same(T),
    Mixed,
}

impl<T: PartialEq> Uniform<T> {
    fn observe(&mut self, value: T) {
        *self = match std::mem::replace(self, Uniform::Mixed) {
            Uniform::Unseen => Uniform::Same(value),
            Uniform::Same(seen) if seen == value => Uniform::Same(seen),
            _ => Uniform::Mixed,
        };
    }
}

impl<T> Uniform<Option<T>> {
    fn resolve(self, inherit: Option<T>) -> Option<T> {
        match self {
            Uniform::Unseen => inherit,
            Uniform::Same(value) => value,
            Uniform::Mixed => None,
        }
    }
}

impl BlockText {
    pub fn of_state(state: &BlockFormattingState) -> Self {
        Self {
            font: state.font.clone(),
            weight: state.weight,
            size: state.size,
            color: state.color,
        }
    }

    /// Values shared by every character of a paragraph (terminator excluded).
    /// Monospace families never become the block font, and link characters
    /// do not vote on color. A field nothing votes on keeps `inherit`.
    pub fn uniform<'a>(
        chars: impl IntoIterator<Item = &'a TextStyle>,
        inherit: &BlockText,
        style: &StyleConfig,
    ) -> Self {
        let mut font = Uniform::Unseen;
        let mut weight = Uniform::Unseen;
        let mut size = Uniform::Unseen;
        let mut color = Uniform::Unseen;
        for text in chars {
            font.observe(text.font_family.clone());
            weight.observe(text.weight);
            size.observe(text.font_size);
            if text.link.is_none() {
                color.observe(text.foreground_color);
            }
        }
        Self {
            font: font
                .resolve(inherit.font.clone())
                .filter(|family| !style.is_monospace(family)),
            weight: weight.resolve(inherit.weight),
            size: size.resolve(inherit.size),
            color: color.resolve(inherit.color),
        }
    }
}

/// Block state threaded over body and list paragraphs in document order
#[derive(Debug, Clone, Default)]
pub(crate) struct RunningBlock {
    pub state: BlockFormattingState,
}

impl RunningBlock {
    /// Enter a body or list paragraph. Returns its block text and whether the
    /// running state changed.
    pub fn enter<'a>(
        &mut self,
        props: &ParagraphProps,
        kind: ParaKind,
        chars: impl IntoIterator<Item = &'a TextStyle>,
        style: &StyleConfig,
    ) -> (BlockText, bool) {
        let text = BlockText::uniform(chars, &BlockText::of_state(&self.state), style);
        let mut state = props.to_state(&text);
        if kind == ParaKind::ListItem {
            state = state.with_indents_from(&self.state);
        }
        let changed = state != self.state;
        self.state = state;
        (text, changed)
    }
}

/// Paragraph properties the converter manages
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct ParagraphProps {
    pub named: NamedStyleType,
    pub alignment: Option<Alignment>,
    pub indent_start: Option<f64>,
    pub indent_first_line: Option<f64>,
    pub space_above: Option<f64>,
    pub space_below: Option<f64>,
    pub line_spacing: Option<f64>,
    pub list: Option<ListPlacement>,
}

impl ParagraphProps {
    pub fn from_tree(
        style: &ParagraphStyle,
        bullet: Option<&Bullet>,
        lists: &BTreeMap<String, ListDefinition>,
    ) -> Self {
        Self {
            named: style.named_style_type,
            alignment: style.alignment,
            indent_start: style.indent_start,
            indent_first_line: style.indent_first_line,
            space_above: style.space_above,
            space_below: style.space_below,
            line_spacing: style.line_spacing,
            list: bullet.map(|bullet| ListPlacement {
                kind: lists
                    .get(&bullet.list_id)
                    .map(|list| list.kind_at(bullet.nesting_level))
                    .unwrap_or(ListKind::Bullet),
                nesting_level: bullet.nesting_level,
            }),
        }
    }

    pub fn from_state(state: &BlockFormattingState) -> Self {
        Self {
            named: state.named_style.into(),
            alignment: state.alignment,
            indent_start: state.indent_start,
            indent_first_line: state.indent_first_line,
            space_above: state.space_above,
            space_below: state.space_below,
            line_spacing: state.line_spacing,
            list: None,
        }
    }

    /// Directive state for a body or list paragraph
    pub fn to_state(&self, text: &BlockText) -> BlockFormattingState {
        BlockFormattingState {
            named_style: self.named.to_named().unwrap_or_default(),
            font: text.font.clone(),
            weight: text.weight,
            size: text.size,
            color: text.color,
            alignment: self.alignment,
            indent_start: self.indent_start,
            indent_first_line: self.indent_first_line,
            space_above: self.space_above,
            space_below: self.space_below,
            line_spacing: self.line_spacing,
        }
    }

    pub fn to_style(&self) -> ParagraphStyle {
        ParagraphStyle {
            named_style_type: self.named,
            heading_id: None,
            alignment: self.alignment,
            indent_start: self.indent_start,
            indent_first_line: self.indent_first_line,
            space_above: self.space_above,
            space_below: self.space_below,
            line_spacing: self.line_spacing,
        }
    }

    /// Masked fields whose values differ
    pub fn differing(&self, other: &ParagraphProps, mask: &[ParagraphField]) -> BTreeSet<ParagraphField> {
        mask.iter()
            .copied()
            .filter(|field| match field {
                ParagraphField::NamedStyle => self.named != other.named,
                ParagraphField::Alignment => self.alignment != other.alignment,
                ParagraphField::IndentStart => self.indent_start != other.indent_start,
                ParagraphField::IndentFirstLine => self.indent_first_line != other.indent_first_line,
                ParagraphField::SpaceAbove => self.space_above != other.space_above,
                ParagraphField::SpaceBelow => self.space_below != other.space_below,
                ParagraphField::LineSpacing => self.line_spacing != other.line_spacing,
                ParagraphField::Bullet => self.list != other.list,
            })
            .collect()
    }
}

/// How a paragraph surfaces in MEBDF; decides which properties it manages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ParaKind {
    Body,
    ListItem,
    Heading,
    Cell,
}

impl ParaKind {
    pub fn classify(props: &ParagraphProps, in_table: bool) -> Self {
        if in_table {
            ParaKind::Cell
        } else if props.named.heading_level().is_some() {
            ParaKind::Heading
        } else if props.list.is_some() {
            ParaKind::ListItem
        } else {
            ParaKind::Body
        }
    }

    pub fn mask(&self) -> &'static [ParagraphField] {
        match self {
            ParaKind::Body => &[
                ParagraphField::NamedStyle,
                ParagraphField::Alignment,
                ParagraphField::IndentStart,
                ParagraphField::IndentFirstLine,
                ParagraphField::SpaceAbove,
                ParagraphField::SpaceBelow,
                ParagraphField::LineSpacing,
                ParagraphField::Bullet,
            ],
            // indentation follows nesting
            ParaKind::ListItem => &[
                ParagraphField::NamedStyle,
                ParagraphField::Alignment,
                ParagraphField::SpaceAbove,
                ParagraphField::SpaceBelow,
                ParagraphField::LineSpacing,
                ParagraphField::Bullet,
            ],
            ParaKind::Heading => &[ParagraphField::NamedStyle],
            ParaKind::Cell => &[],
        }
    }

    /// Whether block directives apply to this kind
    pub fn takes_block_text(&self) -> bool {
        matches!(self, ParaKind::Body | ParaKind::ListItem)
    }
}

/// A URL in the form it takes in MEBDF link syntax
pub(crate) fn markup_url(url: &str) -> String {
    let url = url.replace(')', "%29");
    match url.strip_prefix("#^") {
        Some(rest) => format!("#%5E{rest}"),
        None => url,
    }
}

pub(crate) fn link_target(link: &TreeLink) -> LinkTarget {
    match link {
        TreeLink::Url(url) => LinkTarget::Url(markup_url(url)),
        TreeLink::HeadingId(id) | TreeLink::BookmarkId(id) => LinkTarget::Anchor(id.clone()),
    }
}

/// Font family after collapsing monospace families
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FontChoice {
    Mono,
    Family(String),
}

impl FontChoice {
    pub fn of(family: Option<&str>, style: &StyleConfig) -> Option<Self> {
        family.map(|family| {
            if style.is_monospace(family) {
                FontChoice::Mono
            } else {
                FontChoice::Family(family.to_string())
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::NamedStyle;

    fn run(font: Option<&str>, size: Option<f64>, color: Option<Color>, link: bool) -> TextStyle {
        TextStyle {
            font_family: font.map(String::from),
            font_size: size,
            foreground_color: color,
            link: link.then(|| TreeLink::Url("https://x.test".into())),
            ..TextStyle::default()
        }
    }

    #[test]
    fn test_uniform_block_text() {
        let red = Color::rgb(255, 0, 0);
        let chars = vec![
            run(Some("Georgia"), Some(12.0), Some(red), false),
            run(Some("Georgia"), Some(12.0), Some(Color::rgb(0x11, 0x55, 0xcc)), true),
            run(Some("Georgia"), Some(14.0), Some(red), false),
        ];
        let text = BlockText::uniform(&chars, &BlockText::default(), &StyleConfig::default());
        assert_eq!(text.font.as_deref(), Some("Georgia"));
        assert_eq!(text.size, None);
        assert_eq!(text.color, Some(red));
    }

    #[test]
    fn test_monospace_never_becomes_block_font() {
        let chars = vec![run(Some("Courier New"), None, None, false)];
        let text = BlockText::uniform(&chars, &BlockText::default(), &StyleConfig::default());
        assert_eq!(text.font, None);
    }

    #[test]
    fn test_empty_paragraph_inherits() {
        let inherit = BlockText {
            font: Some("Georgia".into()),
            size: Some(9.0),
            ..BlockText::default()
        };
        let text = BlockText::uniform(std::iter::empty(), &inherit, &StyleConfig::default());
        assert_eq!(text, inherit);
    }

    #[test]
    fn test_masks_by_kind() {
        let old = ParagraphProps {
            indent_start: Some(36.0),
            list: Some(ListPlacement {
                kind: ListKind::Bullet,
                nesting_level: 0,
            }),
            ..ParagraphProps::default()
        };
        let new = ParagraphProps {
            list: Some(ListPlacement {
                kind: ListKind::Bullet,
                nesting_level: 0,
            }),
            ..ParagraphProps::default()
        };
        assert!(new.differing(&old, ParaKind::ListItem.mask()).is_empty());
        let fields = new.differing(&old, ParaKind::Body.mask());
        assert!(fields.contains(&ParagraphField::IndentStart));
        assert!(ParaKind::Cell.mask().is_empty());
    }

    #[test]
    fn test_kind_classification() {
        let heading = ParagraphProps {
            named: NamedStyleType::Heading2,
            ..ParagraphProps::default()
        };
        assert_eq!(ParaKind::classify(&heading, false), ParaKind::Heading);
        assert_eq!(ParaKind::classify(&heading, true), ParaKind::Cell);
        let title = ParagraphProps::from_state(&BlockFormattingState::baseline(NamedStyle::Title));
        assert_eq!(ParaKind::classify(&title, false), ParaKind::Body);
        assert_eq!(title.to_state(&BlockText::default()).named_style, NamedStyle::Title);
    }

    #[test]
    fn test_markup_url() {
        assert_eq!(markup_url("https://x.test/a_(b)"), "https://x.test/a_(b%29");
        assert_eq!(markup_url("#^frag"), "#%5Efrag");
        assert_eq!(
            link_target(&TreeLink::BookmarkId("id.1".into())),
            LinkTarget::Anchor("id.1".into())
        );
    }
}
