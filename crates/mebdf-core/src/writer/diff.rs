// SPDX-License-Identifier: AGPL-3.0-or-later
//! Pin-anchored diff between the old tree and the lowered document
//!
//! Objects, equations and tables are pins: they are matched first and the
//! text between consecutive pins is diffed by common prefix and suffix. Kept
//! items yield style updates that never move text (phase one); each edit site
//! yields a delete/insert pair plus styling for what it inserted (phase two).
//! Sites are emitted in descending index order so every index holds both
//! before the batch and at the moment its op is applied. Anchors are created
//! once the edits to their paragraph are done, so a heading id survives when
//! the terminator that carried it is rewritten.

use super::anchors::AnchorIds;
use super::lower::{CharFormat, LoweredParagraph, LoweredTable, NewAnchor, NewItem, Sequence};
use super::ops::{MutationOp, ParagraphField, TextField};
use crate::ast::{Color, LinkTarget, ObjectKind};
use crate::config::ConvertConfig;
use crate::resolve::{link_target, BlockText, FontChoice, ParaKind, ParagraphProps, RunningBlock};
use crate::traits::{ConversionError, ParseWarning, Result, WarningKind};
use crate::tree::objects::ObjectIndex;
use crate::tree::{AnchorKind, BlockContent, InlineContent, Paragraph, Snapshot, StructuralElement, Table, TextStyle, TreeLink};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct OldParagraph {
    pub start: usize,
    pub kind: ParaKind,
    pub props: ParagraphProps,
    /// Block text as the exporter resolves it
    pub text: BlockText,
    /// Index of the terminating newline
    pub terminator: usize,
    pub heading_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum OldItem<'a> {
    Char {
        ch: char,
        index: usize,
        style: &'a TextStyle,
        paragraph: usize,
    },
    Newline {
        index: usize,
        paragraph: usize,
    },
    Object {
        index: usize,
        width: usize,
        id: Option<String>,
        kind: ObjectKind,
        paragraph: usize,
    },
    Table {
        index: usize,
        width: usize,
        rows: Vec<Vec<OldCell<'a>>>,
    },
}

impl OldItem<'_> {
    pub fn index(&self) -> usize {
        match self {
            OldItem::Char { index, .. }
            | OldItem::Newline { index, .. }
            | OldItem::Object { index, .. }
            | OldItem::Table { index, .. } => *index,
        }
    }

    pub fn end(&self) -> usize {
        match self {
            OldItem::Char { ch, index, .. } => index + ch.len_utf16(),
            OldItem::Newline { index, .. } => index + 1,
            OldItem::Object { index, width, .. } | OldItem::Table { index, width, .. } => index + width,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct OldCell<'a> {
    /// Index of the cell's first content element
    pub start: usize,
    pub items: Vec<OldItem<'a>>,
    /// Holds a nested table; never diffed
    pub frozen: bool,
}

/// The old side of an import: items of the top-level elements starting in range
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct OldTree<'a> {
    pub items: Vec<OldItem<'a>>,
    pub paragraphs: Vec<OldParagraph>,
}

impl<'a> OldTree<'a> {
    pub fn collect(snapshot: &'a Snapshot, range: Range<usize>, objects: &ObjectIndex, config: &ConvertConfig) -> Self {
        let mut collector = Collector {
            snapshot,
            objects,
            config,
            running: RunningBlock::default(),
            paragraphs: Vec::new(),
        };
        let mut items = Vec::new();
        for element in snapshot.body.iter().filter(|element| range.contains(&element.start_index)) {
            collector.element(element, false, &mut items);
        }
        Self {
            items,
            paragraphs: collector.paragraphs,
        }
    }
}

struct Collector<'s, 'a> {
    snapshot: &'a Snapshot,
    objects: &'s ObjectIndex,
    config: &'s ConvertConfig,
    running: RunningBlock,
    paragraphs: Vec<OldParagraph>,
}

impl<'a> Collector<'_, 'a> {
    /// Returns true for a table nested inside a cell, which is not collected
    fn element(&mut self, element: &'a StructuralElement, in_table: bool, items: &mut Vec<OldItem<'a>>) -> bool {
        match &element.content {
            BlockContent::Paragraph(paragraph) => self.paragraph(element, paragraph, in_table, items),
            BlockContent::Table(_) if in_table => return true,
            // the exporter skips empty tables, so they are not items either
            BlockContent::Table(table) if !table.rows.is_empty() => items.push(self.table(element, table)),
            BlockContent::Table(_) | BlockContent::SectionBreak(_) => {}
        }
        false
    }

    fn table(&mut self, element: &'a StructuralElement, table: &'a Table) -> OldItem<'a> {
        let mut rows = Vec::with_capacity(table.rows.len());
        for row in &table.rows {
            let mut cells = Vec::with_capacity(row.cells.len());
            for cell in &row.cells {
                let mut items = Vec::new();
                let mut frozen = false;
                for content in &cell.content {
                    frozen |= self.element(content, true, &mut items);
                }
                cells.push(OldCell {
                    start: cell.content.first().map_or(cell.end_index, |content| content.start_index),
                    items,
                    frozen,
                });
            }
            rows.push(cells);
        }
        OldItem::Table {
            index: element.start_index,
            width: element.end_index.saturating_sub(element.start_index),
            rows,
        }
    }

    fn paragraph(
        &mut self,
        element: &'a StructuralElement,
        paragraph: &'a Paragraph,
        in_table: bool,
        items: &mut Vec<OldItem<'a>>,
    ) {
        let props = ParagraphProps::from_tree(&paragraph.style, paragraph.bullet.as_ref(), &self.snapshot.lists);
        let kind = ParaKind::classify(&props, in_table);
        let text = if kind.takes_block_text() {
            self.running
                .enter(&props, kind, paragraph.char_styles(), &self.config.style)
                .0
        } else {
            BlockText::default()
        };
        let id = self.paragraphs.len();
        self.paragraphs.push(OldParagraph {
            start: element.start_index,
            kind,
            props,
            text,
            terminator: element.end_index.saturating_sub(1),
            heading_id: paragraph.style.heading_id.clone(),
        });

        for inline in &paragraph.elements {
            match &inline.content {
                InlineContent::TextRun(run) => {
                    let mut index = inline.start_index;
                    for ch in run.content.chars() {
                        items.push(match ch {
                            '\n' => OldItem::Newline { index, paragraph: id },
                            ch => OldItem::Char {
                                ch,
                                index,
                                style: &run.style,
                                paragraph: id,
                            },
                        });
                        index += ch.len_utf16();
                    }
                }
                InlineContent::Opaque(_) => {}
                _ => {
                    let (object_id, kind) = self
                        .objects
                        .at(inline.start_index)
                        .map_or((None, ObjectKind::Embed), |object| (object.id.clone(), object.kind));
                    items.push(OldItem::Object {
                        index: inline.start_index,
                        width: inline.end_index.saturating_sub(inline.start_index).max(1),
                        id: object_id,
                        kind,
                        paragraph: id,
                    });
                }
            }
        }
    }
}

/// Where a segment sits among its pins
#[derive(Debug, Clone, Copy)]
struct Bound {
    /// Start of the paragraph holding the item just before the segment
    lead: usize,
    /// Index the segment ends at
    end: usize,
    followed_by_table: bool,
    /// Last segment of the body or of a cell
    last: bool,
}

/// A text patch: the listed fields take the values in `style`
#[derive(Debug, Clone, Default, PartialEq)]
struct Patch {
    style: TextStyle,
    fields: BTreeSet<TextField>,
}

#[derive(Debug, Clone, PartialEq)]
struct Run {
    range: Range<usize>,
    patch: Patch,
}

fn push_run(runs: &mut Vec<Run>, index: usize, width: usize, patch: Patch) {
    if let Some(last) = runs.last_mut() {
        if last.range.end == index && last.patch == patch {
            last.range.end += width;
            return;
        }
    }
    runs.push(Run {
        range: index..index + width,
        patch,
    });
}

fn style_op(run: Run) -> MutationOp {
    MutationOp::UpdateTextStyle {
        range: run.range,
        style: run.patch.style,
        fields: run.patch.fields,
    }
}

/// Ops for one edit site, in application order
#[derive(Debug, Clone)]
struct Site {
    index: usize,
    ops: Vec<MutationOp>,
}

/// An anchor placed at `index`, resolved once every deletion is known
struct PendingAnchor {
    anchor: NewAnchor,
    index: usize,
    /// Site whose inserted text holds the anchor
    site: Option<usize>,
    /// New paragraph the anchor opens
    paragraph: Option<usize>,
}

/// Everything one diff produced
#[derive(Debug, Clone, Default)]
pub(crate) struct DiffOutput {
    pub ops: Vec<MutationOp>,
    pub preserved_object_ids: Vec<String>,
    pub warnings: Vec<ParseWarning>,
}

pub(crate) struct Differ<'a> {
    config: &'a ConvertConfig,
    objects: &'a ObjectIndex,
    range: Range<usize>,
    old_paragraphs: &'a [OldParagraph],
    new_paragraphs: &'a [LoweredParagraph],
    anchors: AnchorIds<'a>,
    /// Anchor kind per id, for link targets
    link_kinds: BTreeMap<String, AnchorKind>,
    paragraph_ops: Vec<MutationOp>,
    kept_runs: Vec<Run>,
    pending: Vec<PendingAnchor>,
    /// Old ranges removed by edit sites
    deleted: Vec<Range<usize>>,
    /// New paragraph each kept old terminator ends, by old paragraph
    kept_terminators: BTreeMap<usize, usize>,
    sites: Vec<Site>,
    preserved: Vec<String>,
    warnings: Vec<ParseWarning>,
}

impl<'a> Differ<'a> {
    pub fn new(
        snapshot: &'a Snapshot,
        config: &'a ConvertConfig,
        objects: &'a ObjectIndex,
        range: Range<usize>,
        old_paragraphs: &'a [OldParagraph],
        new_paragraphs: &'a [LoweredParagraph],
        written_anchors: &[(String, AnchorKind)],
    ) -> Self {
        let mut link_kinds: BTreeMap<String, AnchorKind> = written_anchors.iter().cloned().collect();
        for position in &snapshot.named_positions {
            link_kinds.insert(position.id.clone(), position.kind);
        }
        crate::tree::visit_paragraphs(&snapshot.body, &mut |_, paragraph| {
            if let Some(id) = &paragraph.style.heading_id {
                link_kinds.insert(id.clone(), AnchorKind::Heading);
            }
        });
        Self {
            config,
            objects,
            range,
            old_paragraphs,
            new_paragraphs,
            anchors: {
                let mut ids = AnchorIds::new(snapshot, &config.import);
                ids.reserve(written_anchors.iter().map(|(id, _)| id.clone()));
                ids
            },
            link_kinds,
            paragraph_ops: Vec::new(),
            kept_runs: Vec::new(),
            pending: Vec::new(),
            deleted: Vec::new(),
            kept_terminators: BTreeMap::new(),
            sites: Vec::new(),
            preserved: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn finish(mut self) -> DiffOutput {
        // A heading id lives on its terminator. When that terminator is
        // deleted, or now ends another paragraph than the one the text puts
        // the heading anchor on, writing the id creates it again.
        let homes: BTreeMap<&str, Option<usize>> = self
            .pending
            .iter()
            .filter(|pending| pending.anchor.kind == AnchorKind::Heading)
            .filter_map(|pending| Some((pending.anchor.id.as_existing()?, pending.paragraph)))
            .collect();
        let mut lost = Vec::new();
        for (k, paragraph) in self.old_paragraphs.iter().enumerate() {
            let Some(id) = paragraph.heading_id.as_deref() else {
                continue;
            };
            let deleted = self.deleted.iter().any(|range| range.contains(&paragraph.terminator));
            let moved = match (self.kept_terminators.get(&k), homes.get(id)) {
                (Some(&ends), Some(&home)) => home != Some(ends),
                _ => false,
            };
            if deleted || moved {
                lost.push(id.to_string());
            }
        }
        for id in &lost {
            self.anchors.forget(id);
        }
        // An anchor in kept text rides with the lowest site above it: its index
        // is still untouched there and the edits to its paragraph are done.
        let mut anchor_ops = Vec::new();
        for pending in std::mem::take(&mut self.pending) {
            let Some(id) = self.anchors.resolve(&pending.anchor.id, pending.anchor.kind) else {
                continue;
            };
            tracing::debug!(%id, index = pending.index, "creating anchor");
            let op = MutationOp::CreateAnchor {
                index: pending.index,
                id,
                kind: pending.anchor.kind,
            };
            let host = pending.site.or_else(|| {
                (0..self.sites.len())
                    .filter(|&k| self.sites[k].index > pending.index)
                    .min_by_key(|&k| self.sites[k].index)
            });
            match host {
                Some(k) => self.sites[k].ops.push(op),
                None => anchor_ops.push(op),
            }
        }

        let mut ops = self.paragraph_ops;
        ops.extend(self.kept_runs.into_iter().map(style_op));
        ops.extend(anchor_ops);
        self.sites.sort_by(|a, b| b.index.cmp(&a.index));
        for site in self.sites {
            ops.extend(site.ops);
        }
        DiffOutput {
            ops,
            preserved_object_ids: self.preserved,
            warnings: self.warnings,
        }
    }

    /// Diff one sequence (the body or a cell) starting at `start`
    pub fn sequence(&mut self, old: &[OldItem<'_>], new: &Sequence, start: usize) -> Result<()> {
        let (pairs, dropped) = self.match_pins(old, new)?;
        let sequence_end = old.last().map_or(start, OldItem::end);

        let mut old_from = 0;
        let mut new_from = 0;
        let mut lead = start;
        for &(oi, nj) in &pairs {
            let pin = &old[oi];
            let bound = Bound {
                lead,
                end: pin.index(),
                followed_by_table: matches!(pin, OldItem::Table { .. }),
                last: false,
            };
            self.segment(&old[old_from..oi], new, new_from..nj, &dropped, bound)?;
            match (pin, &new.items[nj]) {
                (OldItem::Object { id, paragraph, .. }, _) => {
                    if let Some(id) = id {
                        self.preserved.push(id.clone());
                    }
                    lead = self.old_paragraphs[*paragraph].start;
                }
                (OldItem::Table { index, rows, .. }, NewItem::Table(table)) => {
                    self.table(*index, rows, table)?;
                    lead = pin.end();
                }
                _ => {}
            }
            old_from = oi + 1;
            new_from = nj + 1;
        }
        let bound = Bound {
            lead,
            end: sequence_end,
            followed_by_table: false,
            last: true,
        };
        self.segment(&old[old_from..], new, new_from..new.items.len(), &dropped, bound)
    }

    /// Pair each new pin with an old one. New tables without a partner are
    /// dropped; objects without one fail the call.
    fn match_pins(&mut self, old: &[OldItem<'_>], new: &Sequence) -> Result<(Vec<(usize, usize)>, BTreeSet<usize>)> {
        let mut pairs = Vec::new();
        let mut dropped = BTreeSet::new();
        let mut cursor = 0;
        for (j, item) in new.items.iter().enumerate() {
            let found = match item {
                NewItem::Object { id: Some(id), kind } => {
                    let found = old[cursor..]
                        .iter()
                        .position(|old| matches!(old, OldItem::Object { id: Some(other), .. } if other == id));
                    match found.map(|k| &old[cursor + k]) {
                        Some(OldItem::Object { kind: old_kind, .. }) if old_kind != kind => {
                            return Err(object_error(Some(id), *kind, format!("the document has it as {old_kind}")));
                        }
                        Some(_) => found,
                        None => return Err(self.object_not_found(id, *kind, &old[..cursor])),
                    }
                }
                NewItem::Object { id: None, kind } => {
                    if *kind != ObjectKind::Equation {
                        return Err(object_error(None, *kind, "only equations may omit an id".to_string()));
                    }
                    let found = old[cursor..].iter().position(|old| {
                        matches!(old, OldItem::Object { id: None, kind: ObjectKind::Equation, .. })
                    });
                    if found.is_none() {
                        return Err(object_error(None, *kind, "no equation left in range".to_string()));
                    }
                    found
                }
                NewItem::Table(_) => {
                    let found = old[cursor..]
                        .iter()
                        .position(|old| matches!(old, OldItem::Table { .. }));
                    if found.is_none() {
                        tracing::warn!("table without a counterpart dropped from import");
                        self.warnings.push(ParseWarning::new(
                            WarningKind::DroppedTable,
                            "tables cannot be created by import; the new table was dropped",
                        ));
                        dropped.insert(j);
                    }
                    found
                }
                NewItem::Char { .. } | NewItem::Newline { .. } => None,
            };
            if let Some(k) = found {
                pairs.push((cursor + k, j));
                cursor += k + 1;
            }
        }
        Ok((pairs, dropped))
    }

    fn object_not_found(&self, id: &str, kind: ObjectKind, passed: &[OldItem<'_>]) -> ConversionError {
        let reason = match self.objects.by_id(id) {
            None => "no object with this id in the document".to_string(),
            Some(found) if found.kind != kind => format!("the document has it as {}", found.kind),
            Some(found) if !self.range.contains(&found.start_index) => "it lies outside the target range".to_string(),
            Some(_)
                if passed
                    .iter()
                    .any(|old| matches!(old, OldItem::Object { id: Some(other), .. } if other == id)) =>
            {
                "it is out of order with the other placeholders".to_string()
            }
            Some(_) => "it lies in a different table cell".to_string(),
        };
        object_error(Some(id), kind, reason)
    }

    fn table(&mut self, index: usize, old_rows: &[Vec<OldCell<'_>>], new: &LoweredTable) -> Result<()> {
        let same_shape = old_rows.len() == new.rows.len()
            && old_rows.iter().zip(&new.rows).all(|(old, new)| old.len() == new.len());
        if !same_shape {
            tracing::warn!(index, "table shape changed, leaving it untouched");
            self.warnings.push(ParseWarning::new(
                WarningKind::TableStructure,
                format!("table at {index} changed rows or columns; it was left untouched"),
            ));
            return Ok(());
        }
        for (old_row, new_row) in old_rows.iter().zip(&new.rows) {
            for (cell, seq) in old_row.iter().zip(new_row) {
                if cell.frozen {
                    self.warnings.push(ParseWarning::new(
                        WarningKind::TableStructure,
                        format!("cell at {} holds a nested table; it was left untouched", cell.start),
                    ));
                    continue;
                }
                self.sequence(&cell.items, seq, cell.start)?;
            }
        }
        Ok(())
    }

    fn segment(
        &mut self,
        old: &[OldItem<'_>],
        new: &Sequence,
        span: Range<usize>,
        dropped: &BTreeSet<usize>,
        bound: Bound,
    ) -> Result<()> {
        let positions: Vec<usize> = span.clone().filter(|j| !dropped.contains(j)).collect();
        let items: Vec<&NewItem> = positions.iter().map(|&j| &new.items[j]).collect();
        let anchors: Vec<(usize, &NewAnchor)> = new
            .anchors
            .iter()
            .filter(|anchor| span.start <= anchor.position && anchor.position <= span.end)
            .map(|anchor| (positions.iter().take_while(|&&j| j < anchor.position).count(), anchor))
            .collect();

        let (old_len, new_len) = (old.len(), items.len());
        let mut old_hi = old_len;
        let mut new_hi = new_len;
        let protected = bound.last
            && matches!(old.last(), Some(OldItem::Newline { .. }))
            && matches!(items.last(), Some(NewItem::Newline { .. }));
        if protected {
            old_hi -= 1;
            new_hi -= 1;
        }

        let mut prefix = 0;
        while prefix < old_hi && prefix < new_hi && same(&old[prefix], items[prefix]) {
            prefix += 1;
        }
        let mut suffix = 0;
        while suffix < old_hi - prefix
            && suffix < new_hi - prefix
            && same(&old[old_hi - 1 - suffix], items[new_hi - 1 - suffix])
        {
            suffix += 1;
        }
        let mut old_mid = prefix..old_hi - suffix;
        let mut new_mid = prefix..new_hi - suffix;

        // A paragraph terminator directly before a table cannot go
        if suffix == 0 && bound.followed_by_table {
            let old_ends = old_mid.end > old_mid.start && is_newline(&old[old_mid.end - 1]);
            let new_ends = new_mid.end > new_mid.start && matches!(items[new_mid.end - 1], NewItem::Newline { .. });
            let old_ok = old_mid.is_empty() || old_ends;
            let new_ok = new_mid.is_empty() || new_ends;
            let can_slide = prefix > 0
                && is_newline(&old[prefix - 1])
                && matches!(items[prefix - 1], NewItem::Newline { .. });
            if (old_ends || new_ends) && old_ok && new_ok && can_slide {
                old_mid = prefix - 1..old_mid.end - 1;
                new_mid = prefix - 1..new_mid.end - 1;
            } else if old_ends {
                old_mid.end -= 1;
            }
        }

        let mut kept: Vec<(usize, usize)> = (0..new_mid.start).map(|i| (i, i)).collect();
        let new_suffix = new_hi - new_mid.end;
        let old_suffix_start = old_hi - new_suffix;
        kept.extend((0..new_suffix).map(|k| (old_suffix_start + k, new_mid.end + k)));
        if protected {
            kept.push((old_hi, new_hi));
        }
        let mut kept_old: Vec<Option<usize>> = vec![None; new_len];
        for &(o, n) in &kept {
            kept_old[n] = Some(old[o].index());
            self.kept_pair(&old[o], items[n]);
        }

        let has_site = !old_mid.is_empty() || !new_mid.is_empty();
        let site_index = if old_mid.is_empty() {
            old.get(old_mid.start).map_or(bound.end, OldItem::index)
        } else {
            old[old_mid.start].index()
        };
        for (rel, anchor) in anchors {
            let pending = if has_site && new_mid.start <= rel && rel <= new_mid.end {
                let offset: usize = items[new_mid.start..rel].iter().map(|item| new_width(item)).sum();
                PendingAnchor {
                    anchor: anchor.clone(),
                    index: site_index + offset,
                    site: Some(self.sites.len()),
                    paragraph: opened_paragraph(&items[rel..]),
                }
            } else {
                PendingAnchor {
                    anchor: anchor.clone(),
                    index: kept_old.get(rel).copied().flatten().unwrap_or(bound.end),
                    site: None,
                    paragraph: opened_paragraph(&items[rel..]),
                }
            };
            self.pending.push(pending);
        }

        if has_site {
            let paragraph_start = match old_mid.start.checked_sub(1).map(|k| &old[k]) {
                Some(OldItem::Char { paragraph, .. } | OldItem::Object { paragraph, .. }) => {
                    self.old_paragraphs[*paragraph].start
                }
                Some(item) => item.end(),
                None => bound.lead,
            };
            let deleted = (!old_mid.is_empty()).then(|| site_index..old[old_mid.end - 1].end());
            self.site(site_index, deleted, &items[new_mid], paragraph_start);
        }
        Ok(())
    }

    fn site(
        &mut self,
        index: usize,
        deleted: Option<Range<usize>>,
        inserted: &[&NewItem],
        paragraph_start: usize,
    ) {
        let mut ops = Vec::new();
        if let Some(range) = deleted {
            self.deleted.push(range.clone());
            ops.push(MutationOp::DeleteRange { range });
        }
        let text: String = inserted
            .iter()
            .filter_map(|item| match item {
                NewItem::Char { ch, .. } => Some(*ch),
                NewItem::Newline { .. } => Some('\n'),
                _ => None,
            })
            .collect();
        if !text.is_empty() {
            ops.push(MutationOp::InsertText { index, text });
        }

        let mut paragraph_ops = Vec::new();
        let mut runs = Vec::new();
        let mut position = index;
        let mut paragraph_start = paragraph_start;
        for item in inserted {
            match item {
                NewItem::Char { ch, format, paragraph } => {
                    let patch = self.inserted_patch(format, &self.new_paragraphs[*paragraph].text);
                    push_run(&mut runs, position, ch.len_utf16(), patch);
                    position += ch.len_utf16();
                }
                NewItem::Newline { paragraph } => {
                    let lowered = &self.new_paragraphs[*paragraph];
                    if lowered.kind != ParaKind::Cell {
                        paragraph_ops.push(MutationOp::UpdateParagraphStyle {
                            range: paragraph_start..position + 1,
                            style: lowered.props.to_style(),
                            list: lowered.props.list,
                            fields: ParaKind::Body.mask().iter().copied().collect(),
                        });
                    }
                    position += 1;
                    paragraph_start = position;
                }
                _ => {}
            }
        }
        ops.extend(paragraph_ops);
        ops.extend(runs.into_iter().map(style_op));
        self.sites.push(Site { index, ops });
    }

    fn kept_pair(&mut self, old: &OldItem<'_>, new: &NewItem) {
        match (old, new) {
            (
                OldItem::Char {
                    ch,
                    index,
                    style,
                    paragraph: old_paragraph,
                },
                NewItem::Char {
                    format,
                    paragraph: new_paragraph,
                    ..
                },
            ) => {
                let old_text = &self.old_paragraphs[*old_paragraph].text;
                let new_text = &self.new_paragraphs[*new_paragraph].text;
                if let Some(patch) = self.kept_patch(*ch, style, old_text, format, new_text) {
                    push_run(&mut self.kept_runs, *index, ch.len_utf16(), patch);
                }
            }
            (
                OldItem::Newline {
                    index,
                    paragraph: old_paragraph,
                },
                NewItem::Newline {
                    paragraph: new_paragraph,
                },
            ) => {
                self.kept_terminators.insert(*old_paragraph, *new_paragraph);
                let old = &self.old_paragraphs[*old_paragraph];
                let new = &self.new_paragraphs[*new_paragraph];
                let mut fields = new.props.differing(&old.props, new.kind.mask());
                // leaving a list for a kind that ignores bullets still drops the bullet
                if old.kind != new.kind && new.props.list != old.props.list {
                    fields.insert(ParagraphField::Bullet);
                }
                if !fields.is_empty() {
                    self.paragraph_ops.push(MutationOp::UpdateParagraphStyle {
                        range: old.start..index + 1,
                        style: new.props.to_style(),
                        list: new.props.list,
                        fields,
                    });
                }
            }
            _ => {}
        }
    }

    /// Fields of a kept character whose shown value differs from the new one
    fn kept_patch(
        &self,
        ch: char,
        old: &TextStyle,
        old_text: &BlockText,
        new: &CharFormat,
        new_text: &BlockText,
    ) -> Option<Patch> {
        let mut patch = Patch::default();
        let old_link = old.link.is_some();
        // star markup never covers edge whitespace, so its emphasis is not shown
        if !ch.is_whitespace() {
            if (old.bold == Some(true)) != new.bold {
                patch.style.bold = Some(new.bold);
                patch.fields.insert(TextField::Bold);
            }
            if (old.italic == Some(true)) != new.italic {
                patch.style.italic = Some(new.italic);
                patch.fields.insert(TextField::Italic);
            }
        }
        if let Some(underline) = underline_for(new, old_link) {
            if old.underline.unwrap_or(false) != underline {
                patch.style.underline = Some(underline);
                patch.fields.insert(TextField::Underline);
            }
        }
        if let Some(color) = foreground_for(new, new_text, old_link, self.config) {
            if old.foreground_color != color {
                patch.style.foreground_color = color;
                patch.fields.insert(TextField::ForegroundColor);
            }
        }
        if old.background_color != new.highlight {
            patch.style.background_color = new.highlight;
            patch.fields.insert(TextField::BackgroundColor);
        }
        let font = font_for(new, new_text, self.config);
        if FontChoice::of(old.font_family.as_deref(), &self.config.style) != font {
            patch.style.font_family = font_family(font, self.config);
            patch.fields.insert(TextField::FontFamily);
        }
        if new_text.size != old_text.size {
            match new_text.size {
                Some(size) if old.font_size != Some(size) => {
                    patch.style.font_size = Some(size);
                    patch.fields.insert(TextField::FontSize);
                }
                None if old.font_size.is_some() => {
                    patch.fields.insert(TextField::FontSize);
                }
                _ => {}
            }
        }
        if new_text.weight != old_text.weight {
            match new_text.weight {
                Some(weight) if old.weight != Some(weight) => {
                    patch.style.weight = Some(weight);
                    patch.fields.insert(TextField::Weight);
                }
                None if old.weight.is_some() => {
                    patch.fields.insert(TextField::Weight);
                }
                _ => {}
            }
        }
        if old.link.as_ref().map(link_target) != new.link {
            patch.style.link = new.link.as_ref().map(|target| tree_link(target, &self.link_kinds));
            patch.fields.insert(TextField::Link);
        }
        (!patch.fields.is_empty()).then_some(patch)
    }

    /// Every managed field of an inserted character
    fn inserted_patch(&self, new: &CharFormat, text: &BlockText) -> Patch {
        let link = new.link.as_ref().map(|target| tree_link(target, &self.link_kinds));
        Patch {
            style: written_style(new, text, self.config, link),
            fields: TextField::ALL.into_iter().collect(),
        }
    }
}

/// Character style for a newly written character, every managed field explicit
pub(crate) fn written_style(
    new: &CharFormat,
    text: &BlockText,
    config: &ConvertConfig,
    link: Option<TreeLink>,
) -> TextStyle {
    TextStyle {
        bold: Some(new.bold),
        italic: Some(new.italic),
        underline: underline_for(new, false),
        font_family: font_family(font_for(new, text, config), config),
        weight: text.weight,
        font_size: text.size,
        foreground_color: foreground_for(new, text, false, config).flatten(),
        background_color: new.highlight,
        link,
        ..TextStyle::default()
    }
}

/// `None` leaves underline alone: a link kept as a link keeps its decoration
fn underline_for(new: &CharFormat, old_link: bool) -> Option<bool> {
    match new.underline {
        Some(underline) => Some(underline),
        None if new.link.is_some() && old_link => None,
        None => Some(new.link.is_some()),
    }
}

/// Outer `None` leaves the color alone, inner `None` clears it
fn foreground_for(new: &CharFormat, text: &BlockText, old_link: bool, config: &ConvertConfig) -> Option<Option<Color>> {
    if new.link.is_none() {
        return Some(new.color.or(text.color));
    }
    match new.color {
        Some(color) => Some(Some(color)),
        None if old_link => None,
        None => Some(Some(config.style.link_color)),
    }
}

fn font_for(new: &CharFormat, text: &BlockText, config: &ConvertConfig) -> Option<FontChoice> {
    new.font
        .clone()
        .or_else(|| FontChoice::of(text.font.as_deref(), &config.style))
}

fn font_family(font: Option<FontChoice>, config: &ConvertConfig) -> Option<String> {
    font.map(|choice| match choice {
        FontChoice::Mono => config.import.monospace_font.clone(),
        FontChoice::Family(family) => family,
    })
}

/// Tree link for a MEBDF target; ids not known as bookmarks link to headings
pub(crate) fn tree_link(target: &LinkTarget, kinds: &BTreeMap<String, AnchorKind>) -> TreeLink {
    match target {
        LinkTarget::Url(url) => TreeLink::Url(url.clone()),
        LinkTarget::Anchor(id) => match kinds.get(id) {
            Some(AnchorKind::Bookmark | AnchorKind::Comment) => TreeLink::BookmarkId(id.clone()),
            _ => TreeLink::HeadingId(id.clone()),
        },
    }
}

fn object_error(id: Option<&str>, kind: ObjectKind, reason: String) -> ConversionError {
    tracing::warn!(id = id.unwrap_or("<positional>"), %kind, %reason, "embedded object placeholder unresolved");
    ConversionError::EmbeddedObjectNotFound {
        id: id.map(String::from),
        kind,
        reason,
    }
}

fn same(old: &OldItem<'_>, new: &NewItem) -> bool {
    match (old, new) {
        (OldItem::Char { ch: a, .. }, NewItem::Char { ch: b, .. }) => a == b,
        (OldItem::Newline { .. }, NewItem::Newline { .. }) => true,
        _ => false,
    }
}

/// Paragraph of the first text item in `items`
fn opened_paragraph(items: &[&NewItem]) -> Option<usize> {
    for item in items {
        match item {
            NewItem::Char { paragraph, .. } | NewItem::Newline { paragraph } => return Some(*paragraph),
            NewItem::Object { .. } => {}
            NewItem::Table(_) => return None,
        }
    }
    None
}

fn is_newline(item: &OldItem<'_>) -> bool {
    matches!(item, OldItem::Newline { .. })
}

fn new_width(item: &NewItem) -> usize {
    match item {
        NewItem::Char { ch, .. } => ch.len_utf16(),
        NewItem::Newline { .. } => 1,
        NewItem::Object { .. } | NewItem::Table(_) => 0,
    }
}
