// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tree writer: MEBDF → mutation ops
//!
//! Parses the text, lowers it to items, diffs the items against the target
//! range of the snapshot and returns the ops that turn one into the other.
//! Nothing is applied here; the host submits the ops as one batch.

pub mod anchors;
pub(crate) mod diff;
pub(crate) mod lower;
pub mod ops;

pub use anchors::fresh_anchor_id;
pub use ops::{ListPlacement, MutationBatch, MutationOp, ParagraphField, TextField};

use crate::ast::{Block, Document};
use crate::config::ConvertConfig;
use crate::mebdf::parse;
use crate::traits::{ConversionError, ParseWarning, Result};
use crate::tree::objects::ObjectIndex;
use crate::tree::{BlockContent, Snapshot};
use diff::{Differ, OldItem, OldTree};
use serde::Serialize;
use std::collections::BTreeSet;
use std::ops::Range;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportResult {
    pub mutation_ops: Vec<MutationOp>,
    /// Objects the text kept by placeholder, in document order
    pub preserved_object_ids: Vec<String>,
    pub warnings: Vec<ParseWarning>,
}

impl ImportResult {
    pub fn into_batch(self, tab_id: impl Into<String>) -> MutationBatch {
        MutationBatch::new(tab_id, self.mutation_ops)
    }
}

/// Import over the whole tab
pub fn import(snapshot: &Snapshot, text: &str, config: &ConvertConfig) -> Result<ImportResult> {
    import_range(snapshot, 0..snapshot.doc_end(), text, config)
}

/// Replace the structural elements starting inside `range` with `text`
pub fn import_range(
    snapshot: &Snapshot,
    range: Range<usize>,
    text: &str,
    config: &ConvertConfig,
) -> Result<ImportResult> {
    let parsed = parse(text);
    let mut result = import_document(snapshot, range, &parsed.document, config)?;
    let mut warnings = parsed.warnings;
    warnings.append(&mut result.warnings);
    result.warnings = warnings;
    Ok(result)
}

/// [`import_range`] for an already parsed document
pub fn import_document(
    snapshot: &Snapshot,
    range: Range<usize>,
    document: &Document,
    config: &ConvertConfig,
) -> Result<ImportResult> {
    let objects = ObjectIndex::build(snapshot, &config.export);
    let old = OldTree::collect(snapshot, range.clone(), &objects, config);
    // Clearing a range that a paragraph follows removes it whole; otherwise
    // its last terminator stays and the text keeps a paragraph to end in.
    let empty = document
        .blocks
        .iter()
        .all(|block| matches!(block, Block::BlockFormatting { .. }));
    let followed_by_paragraph = snapshot
        .body
        .iter()
        .find(|element| element.start_index >= range.end)
        .is_some_and(|element| matches!(element.content, BlockContent::Paragraph(_)));
    let terminate =
        matches!(old.items.last(), Some(OldItem::Newline { .. })) && !(empty && followed_by_paragraph);
    let lowered = lower::lower(document, &config.style, terminate);

    let mut explicit = Vec::new();
    lowered.body.explicit_anchors(&mut explicit);
    let start = snapshot
        .body
        .iter()
        .find(|element| {
            range.contains(&element.start_index) && !matches!(element.content, BlockContent::SectionBreak(_))
        })
        .map_or(range.start, |element| element.start_index);

    let mut differ = Differ::new(
        snapshot,
        config,
        &objects,
        range.clone(),
        &old.paragraphs,
        &lowered.paragraphs,
        &explicit,
    );
    differ.sequence(&old.items, &lowered.body, start)?;
    let output = differ.finish();
    check_bounds(&output.ops, &range)?;

    let written: BTreeSet<String> = explicit.into_iter().map(|(id, _)| id).collect();
    let mut warnings = output.warnings;
    warnings.extend(anchors::removed_anchor_warnings(snapshot, range.clone(), &written));
    tracing::debug!(
        start = range.start,
        end = range.end,
        ops = output.ops.len(),
        preserved = output.preserved_object_ids.len(),
        "computed import"
    );
    Ok(ImportResult {
        mutation_ops: output.ops,
        preserved_object_ids: output.preserved_object_ids,
        warnings,
    })
}

/// Every op must stay inside the range as it stands when the op applies.
/// Insertion at the very end is allowed only for whole paragraphs.
fn check_bounds(ops: &[MutationOp], range: &Range<usize>) -> Result<()> {
    let start = range.start as isize;
    let mut end = range.end as isize;
    for op in ops {
        let inside = match op {
            MutationOp::InsertText { index, text } => {
                let index = *index as isize;
                start <= index && (index < end || (index == end && text.ends_with('\n')))
            }
            MutationOp::CreateAnchor { index, .. } => {
                let index = *index as isize;
                start <= index && index < end
            }
            other => {
                let touched = other.touched();
                start <= touched.start as isize && touched.end as isize <= end
            }
        };
        if !inside {
            tracing::warn!(?op, start, end, "op escapes the target range");
            return Err(ConversionError::SectionBoundary {
                message: format!("op {op:?} escapes range {start}..{end}"),
            });
        }
        end += op.length_delta();
    }
    Ok(())
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::reader::export;
    use crate::tree::replay;
    use proptest::prelude::*;

    /// Inline fragments, broken markup included. Anchors and pins are left
    /// to the fixed frame of [`document`] so both sides agree on them.
    fn inline() -> impl Strategy<Value = &'static str> {
        prop_oneof![
            Just("text"),
            Just(" "),
            Just("*"),
            Just("**"),
            Just("\\"),
            Just("{!bold}"),
            Just("{!highlight:yellow, underline}"),
            Just("{!glow}"),
            Just("{/!}"),
            Just("{!"),
            Just("["),
            Just("](https://x.test)"),
            Just("<br>"),
            Just("#"),
            Just("-"),
            Just("\u{e9}"),
            Just("\u{1F600}"),
        ]
    }

    fn line() -> impl Strategy<Value = String> {
        let prefix = prop_oneof![
            Just(""),
            Just(""),
            Just("# "),
            Just("## "),
            Just("- "),
            Just("  1. "),
            Just("{!Title}\n"),
            Just("{!align:center}\n"),
            Just("{!Normal text}\n"),
        ];
        (prefix, proptest::collection::vec(inline(), 0..5)).prop_map(|(prefix, parts)| format!("{prefix}{}", parts.concat()))
    }

    fn cell() -> impl Strategy<Value = &'static str> {
        prop_oneof![Just("x"), Just("**y**"), Just("\u{e9}"), Just("{!color:red}z{/!}")]
    }

    /// Free lines around an image, an equation and a two-column table that
    /// every generated document shares, so only text and cells differ
    fn document() -> impl Strategy<Value = String> {
        let lines = || proptest::collection::vec(line(), 0..4);
        (lines(), cell(), cell(), cell(), lines()).prop_map(|(head, a, b, c, tail)| {
            format!(
                "{}\nfig {{^= obj1 image}} {a} {{^= equation}}\n| {b} | {c} |\n| --- | --- |\n{}",
                head.join("\n"),
                tail.join("\n")
            )
        })
    }

    /// Everything the serializer round-trips, anchors and objects included
    fn any_text() -> impl Strategy<Value = String> {
        let fragment = prop_oneof![
            inline().boxed(),
            prop_oneof![
                Just("{^ a}"),
                Just("{^}"),
                Just("](#^h.1)"),
                Just("{^= obj image}"),
                Just("{^= equation}"),
                Just("\n"),
                Just("\n# "),
                Just("\n# {^}"),
                Just("\n- "),
                Just("\n| "),
                Just(" | "),
                Just("\n| --- |"),
                Just("\n{!Title}"),
            ]
            .boxed(),
        ];
        proptest::collection::vec(fragment, 0..24).prop_map(|parts| parts.concat())
    }

    proptest! {
        // Property: replaying the ops of an import reads back as the text
        // built directly
        #[test]
        fn prop_import_then_replay_reads_back(before in document(), after in document()) {
            let config = ConvertConfig::default();
            let snapshot = Snapshot::from_mebdf(&before, &config);
            let result = import(&snapshot, &after, &config).expect("import");
            let applied = replay::apply(&snapshot, &result.mutation_ops).expect("replay");
            let expected = export(&Snapshot::from_mebdf(&after, &config), &config).content;
            prop_assert_eq!(export(&applied, &config).content, expected);
        }

        // Property: importing what was just exported changes nothing
        #[test]
        fn prop_reimport_is_a_no_op(before in any_text()) {
            let config = ConvertConfig::default();
            let snapshot = Snapshot::from_mebdf(&before, &config);
            let exported = export(&snapshot, &config).content;
            let result = import(&snapshot, &exported, &config).expect("import");
            prop_assert_eq!(result.mutation_ops, vec![]);
        }
    }
}
