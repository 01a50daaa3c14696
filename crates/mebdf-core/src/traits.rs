// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error and warning types, and the collaborator traits the converter talks to

use crate::ast::ObjectKind;
use crate::tree::Snapshot;
use crate::writer::ops::MutationBatch;
use serde::Serialize;
use std::fmt;

/// Error type for conversion calls. Any of these aborts the call.
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("Anchor not found: {id}")]
    AnchorNotFound { id: String },

    #[error(
        "Embedded object {} ({kind}) not found: {reason}",
        .id.as_deref().unwrap_or("<positional>")
    )]
    EmbeddedObjectNotFound {
        id: Option<String>,
        kind: ObjectKind,
        reason: String,
    },

    #[error("Section boundary error: {message}")]
    SectionBoundary { message: String },

    #[error("Invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Invalid snapshot: {0}")]
    Snapshot(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Provider error: {0}")]
    Provider(String),
}

pub type Result<T> = std::result::Result<T, ConversionError>;

/// Non-fatal problem categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    MalformedDirective,
    UnknownProperty,
    /// A span-only key such as `mono` on a standalone directive line
    InlineOnlyProperty,
    InvalidValue,
    UnclosedSpan,
    StrayClose,
    MalformedAnchor,
    MalformedObject,
    TableStructure,
    DroppedTable,
    RemovedAnchor,
    UnclassifiedObject,
}

/// A recoverable problem. Parser warnings carry a 1-based source position;
/// reader and writer warnings carry none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseWarning {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    pub kind: WarningKind,
    pub message: String,
}

impl ParseWarning {
    pub fn at(line: u32, column: u32, kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            line: Some(line),
            column: Some(column),
            kind,
            message: message.into(),
        }
    }

    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            line: None,
            column: None,
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.line, self.column) {
            (Some(line), Some(column)) => {
                write!(f, "line {line}, column {column}: {}", self.message)
            }
            _ => f.write_str(&self.message),
        }
    }
}

/// Supplies the current tree of a tab
pub trait TreeProvider {
    fn snapshot(&self, tab_id: &str) -> Result<Snapshot>;
}

/// Applies a mutation batch atomically, in list order
pub trait TreeMutator {
    fn apply(&mut self, batch: MutationBatch) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_error_names_id() {
        let err = ConversionError::EmbeddedObjectNotFound {
            id: Some("obj2".into()),
            kind: ObjectKind::Image,
            reason: "no such object".into(),
        };
        let message = err.to_string();
        assert!(message.contains("obj2"));
        assert!(message.contains("image"));
    }

    #[test]
    fn test_positional_object_error() {
        let err = ConversionError::EmbeddedObjectNotFound {
            id: None,
            kind: ObjectKind::Equation,
            reason: "no equation left".into(),
        };
        assert!(err.to_string().contains("<positional>"));
    }

    #[test]
    fn test_warning_display() {
        let warning = ParseWarning::at(3, 7, WarningKind::UnknownProperty, "unknown property `glow`");
        assert_eq!(warning.to_string(), "line 3, column 7: unknown property `glow`");
    }
}
