// SPDX-License-Identifier: AGPL-3.0-or-later
//! Anchor id resolution for the writer

use crate::ast::AnchorId;
use crate::config::ImportConfig;
use crate::traits::{ParseWarning, WarningKind};
use crate::tree::{AnchorKind, Snapshot};
use std::collections::BTreeSet;
use std::ops::Range;

/// Smallest `prefix + n` (n ≥ 1) not in `known`. Headings use the heading
/// prefix; bookmarks and comments the bookmark prefix.
pub fn fresh_anchor_id(known: &BTreeSet<String>, kind: AnchorKind, config: &ImportConfig) -> String {
    let prefix = match kind {
        AnchorKind::Heading => &config.heading_id_prefix,
        AnchorKind::Bookmark | AnchorKind::Comment => &config.bookmark_id_prefix,
    };
    let mut n = 1usize;
    loop {
        let id = format!("{prefix}{n}");
        if !known.contains(&id) {
            return id;
        }
        n += 1;
    }
}

/// Tracks ids across one import call so fresh ids never collide
pub(crate) struct AnchorIds<'a> {
    known: BTreeSet<String>,
    /// Explicit ids of the written text; fresh ids avoid them too
    reserved: BTreeSet<String>,
    config: &'a ImportConfig,
}

impl<'a> AnchorIds<'a> {
    pub fn new(snapshot: &Snapshot, config: &'a ImportConfig) -> Self {
        Self {
            known: snapshot.known_anchor_ids(),
            reserved: BTreeSet::new(),
            config,
        }
    }

    pub fn reserve(&mut self, ids: impl IntoIterator<Item = String>) {
        self.reserved.extend(ids);
    }

    /// Drop an id whose carrier the import deletes, so writing it creates it again
    pub fn forget(&mut self, id: &str) {
        self.known.remove(id);
    }

    /// The id to create for `anchor`, or `None` when it already exists
    pub fn resolve(&mut self, anchor: &AnchorId, kind: AnchorKind) -> Option<String> {
        let id = match anchor {
            AnchorId::Existing(id) if self.known.contains(id) => return None,
            AnchorId::Existing(id) => id.clone(),
            AnchorId::Proposed => {
                let taken: BTreeSet<String> = self.known.union(&self.reserved).cloned().collect();
                fresh_anchor_id(&taken, kind, self.config)
            }
        };
        self.known.insert(id.clone());
        Some(id)
    }
}

/// Warnings for bookmarks and comment anchors in `range` whose id no longer
/// appears in the written text. They stay in the document.
pub(crate) fn removed_anchor_warnings(
    snapshot: &Snapshot,
    range: Range<usize>,
    written: &BTreeSet<String>,
) -> Vec<ParseWarning> {
    snapshot
        .named_positions
        .iter()
        .filter(|position| range.contains(&position.index) && !written.contains(&position.id))
        .map(|position| {
            tracing::debug!(id = %position.id, "anchor missing from written text");
            ParseWarning::new(
                WarningKind::RemovedAnchor,
                format!("anchor {} was removed from the text but kept in the document", position.id),
            )
        })
        .collect()
}
