// SPDX-License-Identifier: AGPL-3.0-or-later
//! Converter configuration
//!
//! Everything defaults to sensible values; a host may override any part from a
//! TOML file:
//!
//! ```toml
//! [style]
//! link_color = "#1155cc"
//!
//! [export]
//! video_hosts = ["youtube.com", "vimeo.com"]
//!
//! [import]
//! monospace_font = "Roboto Mono"
//! ```

use crate::ast::Color;
use crate::traits::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertConfig {
    pub style: StyleConfig,
    pub export: ExportConfig,
    pub import: ImportConfig,
}

impl ConvertConfig {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        Ok(toml::from_str(input)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let input = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_toml_str(&input)?;
        tracing::debug!(path = %path.as_ref().display(), "loaded converter configuration");
        Ok(config)
    }
}

/// Settings shared by both directions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleConfig {
    /// Foreground color the provider gives links by default
    pub link_color: Color,
    /// Font families rendered as `mono`
    pub monospace_fonts: Vec<String>,
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            link_color: Color::rgb(0x11, 0x55, 0xcc),
            monospace_fonts: [
                "Courier New",
                "Consolas",
                "Roboto Mono",
                "Source Code Pro",
                "Inconsolata",
                "Fira Code",
                "Menlo",
                "Monaco",
                "monospace",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

impl StyleConfig {
    pub fn is_monospace(&self, family: &str) -> bool {
        self.monospace_fonts
            .iter()
            .any(|mono| mono.eq_ignore_ascii_case(family.trim()))
    }
}

/// Tree → MEBDF settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Host suffixes whose rich links classify as `video`
    pub video_hosts: Vec<String>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            video_hosts: ["youtube.com", "youtu.be", "vimeo.com", "loom.com"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// MEBDF → mutation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Family written for `mono` spans
    pub monospace_font: String,
    /// Prefix of freshly generated heading ids
    pub heading_id_prefix: String,
    /// Prefix of freshly generated bookmark ids
    pub bookmark_id_prefix: String,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            monospace_font: "Courier New".to_string(),
            heading_id_prefix: "h.".to_string(),
            bookmark_id_prefix: "id.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ConvertConfig::from_toml_str(
            r#"
            [import]
            monospace_font = "Roboto Mono"
            "#,
        )
        .unwrap();
        assert_eq!(config.import.monospace_font, "Roboto Mono");
        assert_eq!(config.import.heading_id_prefix, "h.");
        assert_eq!(config.export, ExportConfig::default());
    }

    #[test]
    fn test_link_color_parses_from_hex() {
        let config = ConvertConfig::from_toml_str("[style]\nlink_color = \"#ff0000\"\n").unwrap();
        assert_eq!(config.style.link_color, Color::rgb(255, 0, 0));
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = ConvertConfig::from_toml_str("[export]\nvideo_hosts = 3\n").unwrap_err();
        assert!(matches!(err, crate::ConversionError::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[export]\nvideo_hosts = [\"example.tv\"]").unwrap();
        let config = ConvertConfig::load(file.path()).unwrap();
        assert_eq!(config.export.video_hosts, vec!["example.tv".to_string()]);
    }

    #[test]
    fn test_monospace_lookup_is_case_insensitive() {
        let style = StyleConfig::default();
        assert!(style.is_monospace("courier new"));
        assert!(!style.is_monospace("Arial"));
    }
}
