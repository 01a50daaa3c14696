// SPDX-License-Identifier: AGPL-3.0-or-later
//! Heading hierarchy and section ranges
//!
//! A section runs from its heading to the next heading of the same or a
//! higher level. The preamble (anchor id `""`) runs from the start of the
//! tab to the first heading.

use crate::ast::{AnchorId, Block, Document, Inline};
use crate::config::ConvertConfig;
use crate::mebdf::serialize;
use crate::reader::{export_range, ExportResult};
use crate::traits::{ConversionError, Result};
use crate::tree::Snapshot;
use crate::writer::{import_range, ImportResult};
use serde::Serialize;
use std::ops::Range;

/// A heading that carries an id
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeadingAnchor {
    pub id: String,
    pub level: u8,
    pub text: String,
    pub start_index: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HierarchyResult {
    pub headings: Vec<HeadingAnchor>,
    /// One MEBDF heading line per entry
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Section {
    pub anchor_id: String,
    /// 0 for the preamble
    pub level: u8,
    pub start_index: usize,
    pub end_index: usize,
}

impl Section {
    pub fn range(&self) -> Range<usize> {
        self.start_index..self.end_index
    }
}

struct HeadingParagraph<'a> {
    id: Option<&'a str>,
    level: u8,
    start_index: usize,
}

/// Top-level heading paragraphs in body order
fn heading_paragraphs(snapshot: &Snapshot) -> impl Iterator<Item = (HeadingParagraph<'_>, String)> {
    snapshot.paragraphs().filter_map(|(element, paragraph)| {
        let level = paragraph.style.named_style_type.heading_level()?;
        let heading = HeadingParagraph {
            id: paragraph.style.heading_id.as_deref(),
            level,
            start_index: element.start_index,
        };
        Some((heading, paragraph.text().trim_end_matches('\n').to_string()))
    })
}

pub fn get_hierarchy(snapshot: &Snapshot) -> HierarchyResult {
    let headings: Vec<HeadingAnchor> = heading_paragraphs(snapshot)
        .filter_map(|(heading, text)| {
            Some(HeadingAnchor {
                id: heading.id?.to_string(),
                level: heading.level,
                text,
                start_index: heading.start_index,
            })
        })
        .collect();
    let outline = Document::new(
        headings
            .iter()
            .map(|heading| Block::Heading {
                level: heading.level,
                anchor: Some(AnchorId::Existing(heading.id.clone())),
                content: vec![Inline::text(heading.text.as_str())],
            })
            .collect(),
    );
    HierarchyResult {
        content: serialize(&outline),
        headings,
    }
}

/// The range owned by `anchor_id`; `""` names the preamble
pub fn compute_section(snapshot: &Snapshot, anchor_id: &str) -> Result<Section> {
    let headings: Vec<HeadingParagraph<'_>> = heading_paragraphs(snapshot).map(|(heading, _)| heading).collect();
    if let Some(pair) = headings.windows(2).find(|pair| pair[1].start_index <= pair[0].start_index) {
        return Err(ConversionError::SectionBoundary {
            message: format!(
                "heading at {} does not follow heading at {}",
                pair[1].start_index, pair[0].start_index
            ),
        });
    }

    let doc_end = snapshot.doc_end();
    if anchor_id.is_empty() {
        return Ok(Section {
            anchor_id: String::new(),
            level: 0,
            start_index: 0,
            end_index: headings.first().map_or(doc_end, |heading| heading.start_index),
        });
    }

    let position = headings
        .iter()
        .position(|heading| heading.id == Some(anchor_id))
        .ok_or_else(|| ConversionError::AnchorNotFound {
            id: anchor_id.to_string(),
        })?;
    let heading = &headings[position];
    let end_index = headings[position + 1..]
        .iter()
        .find(|next| next.level <= heading.level)
        .map_or(doc_end, |next| next.start_index);
    tracing::trace!(anchor_id, start = heading.start_index, end = end_index, "computed section");
    Ok(Section {
        anchor_id: anchor_id.to_string(),
        level: heading.level,
        start_index: heading.start_index,
        end_index,
    })
}

pub fn export_section(snapshot: &Snapshot, anchor_id: &str, config: &ConvertConfig) -> Result<ExportResult> {
    let section = compute_section(snapshot, anchor_id)?;
    Ok(export_range(snapshot, section.range(), config))
}

/// Rewrite one section; the ops never reach outside it
pub fn import_section(
    snapshot: &Snapshot,
    anchor_id: &str,
    text: &str,
    config: &ConvertConfig,
) -> Result<ImportResult> {
    let section = compute_section(snapshot, anchor_id)?;
    import_range(snapshot, section.range(), text, config)
}
