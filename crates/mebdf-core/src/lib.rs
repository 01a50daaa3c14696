// SPDX-License-Identifier: AGPL-3.0-or-later
//! MEBDF Core - markup dialect and rich-document tree converter
//!
//! This crate provides:
//! - The MEBDF AST with a tokenizer, parser and serializer
//! - A tree reader exporting snapshot ranges as MEBDF
//! - A tree writer turning edited MEBDF into minimal mutation ops
//! - Heading hierarchy and section-bounded read/write
//! - Snapshot building and batch replay for tests and previews

pub mod ast;
pub mod config;
pub mod mebdf;
pub mod reader;
pub(crate) mod resolve;
pub mod section;
pub mod session;
pub mod traits;
pub mod tree;
pub mod writer;

pub use ast::{AnchorId, Block, BlockFormattingState, Document, Inline, ObjectKind, TextFormatting};
pub use config::{ConvertConfig, ExportConfig, ImportConfig, StyleConfig};
pub use mebdf::{parse, serialize, ParseResult};
pub use reader::{export, export_range, ExportResult};
pub use section::{compute_section, export_section, get_hierarchy, import_section, HeadingAnchor, HierarchyResult, Section};
pub use session::{InMemoryTabs, Session};
pub use traits::{ConversionError, ParseWarning, Result, TreeMutator, TreeProvider, WarningKind};
pub use tree::Snapshot;
pub use writer::{fresh_anchor_id, import, import_range, ImportResult, MutationBatch, MutationOp};
