// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mutation operations emitted by the writer
//!
//! # Batch contract
//!
//! - Every index in a batch is an absolute UTF-16 index into the snapshot the
//!   batch was computed from (the pre-mutation snapshot).
//! - A batch must be applied atomically and in list order. Partial or
//!   reordered application is undefined.
//!
//! The writer orders ops so that reading an index against the pre-mutation
//! snapshot and reading it against the document left by the preceding ops
//! give the same position. Style updates over kept text never move text and
//! come first. Edit sites follow in descending index order, so text changed
//! by one site lies above every index used after it. Ops that address text a
//! site has just inserted follow that site directly.

use crate::ast::ListKind;
use crate::tree::{utf16_len, AnchorKind, ParagraphStyle, TextStyle};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::ops::Range;

/// One edit; indices follow the [batch contract](self)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MutationOp {
    InsertText {
        index: usize,
        text: String,
    },
    DeleteRange {
        range: Range<usize>,
    },
    /// Set the listed fields to the values in `style`; a listed field whose
    /// value is `None` is cleared
    UpdateTextStyle {
        range: Range<usize>,
        style: TextStyle,
        fields: BTreeSet<TextField>,
    },
    /// Applies to every paragraph overlapping `range`
    UpdateParagraphStyle {
        range: Range<usize>,
        style: ParagraphStyle,
        list: Option<ListPlacement>,
        fields: BTreeSet<ParagraphField>,
    },
    CreateAnchor {
        index: usize,
        id: String,
        kind: AnchorKind,
    },
}

impl MutationOp {
    /// Ops that add or remove text
    pub fn is_text_op(&self) -> bool {
        matches!(self, Self::InsertText { .. } | Self::DeleteRange { .. })
    }

    /// Positions the op reads or writes, in the coordinates it is applied in
    pub fn touched(&self) -> Range<usize> {
        match self {
            Self::InsertText { index, .. } | Self::CreateAnchor { index, .. } => *index..*index,
            Self::DeleteRange { range }
            | Self::UpdateTextStyle { range, .. }
            | Self::UpdateParagraphStyle { range, .. } => range.clone(),
        }
    }

    /// Signed change in document length
    pub fn length_delta(&self) -> isize {
        match self {
            Self::InsertText { text, .. } => utf16_len(text) as isize,
            Self::DeleteRange { range } => -(range.len() as isize),
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextField {
    Bold,
    Italic,
    Underline,
    FontFamily,
    Weight,
    FontSize,
    ForegroundColor,
    BackgroundColor,
    Link,
}

impl TextField {
    pub const ALL: [Self; 9] = [
        Self::Bold,
        Self::Italic,
        Self::Underline,
        Self::FontFamily,
        Self::Weight,
        Self::FontSize,
        Self::ForegroundColor,
        Self::BackgroundColor,
        Self::Link,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParagraphField {
    NamedStyle,
    Alignment,
    IndentStart,
    IndentFirstLine,
    SpaceAbove,
    SpaceBelow,
    LineSpacing,
    Bullet,
}

/// List membership requested for a paragraph; the provider picks the list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListPlacement {
    pub kind: ListKind,
    pub nesting_level: u8,
}

/// Ops for one tab. Indices are pre-mutation indices; apply the whole batch
/// atomically in list order or not at all (see the [module docs](self)).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MutationBatch {
    pub tab_id: String,
    pub ops: Vec<MutationOp>,
}

impl MutationBatch {
    pub fn new(tab_id: impl Into<String>, ops: Vec<MutationOp>) -> Self {
        Self {
            tab_id: tab_id.into(),
            ops,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}
