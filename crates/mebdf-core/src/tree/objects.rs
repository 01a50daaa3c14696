// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embedded object classification and lookup

use super::{
    BlockContent, InlineContent, ObjectDescriptor, RichLinkProperties, Snapshot, StructuralElement,
};
use crate::ast::ObjectKind;
use crate::config::ExportConfig;
use crate::traits::{ParseWarning, WarningKind};
use std::ops::Range;

/// What an inline element points at, for classification
#[derive(Debug, Clone, Copy)]
pub enum ObjectSource<'a> {
    Embedded(&'a ObjectDescriptor),
    Equation,
    RichLink(&'a RichLinkProperties),
}

/// Classify by priority: chart, drawing, plain image, equation, video link.
/// `None` when nothing matches; callers fall back to `embed`.
pub fn classify_object(source: ObjectSource<'_>, config: &ExportConfig) -> Option<ObjectKind> {
    match source {
        ObjectSource::Embedded(descriptor) => {
            if descriptor.chart_reference.is_some() {
                Some(ObjectKind::Chart)
            } else if descriptor.drawing.is_some() {
                Some(ObjectKind::Drawing)
            } else if descriptor.image.is_some() && descriptor.linked_content.is_none() {
                Some(ObjectKind::Image)
            } else {
                None
            }
        }
        ObjectSource::Equation => Some(ObjectKind::Equation),
        ObjectSource::RichLink(properties) => {
            let video_mime = properties
                .mime_type
                .as_deref()
                .is_some_and(|mime| mime.to_ascii_lowercase().starts_with("video/"));
            if video_mime || is_video_host(&properties.uri, &config.video_hosts) {
                Some(ObjectKind::Video)
            } else {
                Some(ObjectKind::Embed)
            }
        }
    }
}

fn is_video_host(uri: &str, hosts: &[String]) -> bool {
    let Some(host) = uri_host(uri) else {
        return false;
    };
    hosts.iter().any(|suffix| {
        let suffix = suffix.to_ascii_lowercase();
        host == suffix || host.ends_with(&format!(".{suffix}"))
    })
}

fn uri_host(uri: &str) -> Option<String> {
    let rest = uri.split_once("://").map_or(uri, |(_, rest)| rest);
    let authority = rest.split(['/', '?', '#']).next()?;
    let host = authority.rsplit('@').next()?.split(':').next()?;
    (!host.is_empty()).then(|| host.to_ascii_lowercase())
}

/// An embedded object found in the body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedObject {
    /// `None` for equations, which are matched by position
    pub id: Option<String>,
    pub kind: ObjectKind,
    pub start_index: usize,
    pub end_index: usize,
}

/// Every embedded object of a snapshot, in document order, table cells included
#[derive(Debug, Clone, Default)]
pub struct ObjectIndex {
    objects: Vec<LocatedObject>,
    /// Classification warnings keyed by object start index
    warnings: Vec<(usize, ParseWarning)>,
}

impl ObjectIndex {
    pub fn build(snapshot: &Snapshot, config: &ExportConfig) -> Self {
        let mut index = Self::default();
        index.collect(snapshot, &snapshot.body, config);
        index
    }

    fn collect(&mut self, snapshot: &Snapshot, body: &[StructuralElement], config: &ExportConfig) {
        for element in body {
            match &element.content {
                BlockContent::Paragraph(paragraph) => {
                    for inline in &paragraph.elements {
                        let classified =
                            self.classify_element(snapshot, inline.start_index, &inline.content, config);
                        if let Some((id, kind)) = classified {
                            self.objects.push(LocatedObject {
                                id,
                                kind,
                                start_index: inline.start_index,
                                end_index: inline.end_index,
                            });
                        }
                    }
                }
                BlockContent::Table(table) => {
                    for cell in table.rows.iter().flat_map(|row| &row.cells) {
                        self.collect(snapshot, &cell.content, config);
                    }
                }
                BlockContent::SectionBreak(_) => {}
            }
        }
    }

    fn classify_element(
        &mut self,
        snapshot: &Snapshot,
        start_index: usize,
        content: &InlineContent,
        config: &ExportConfig,
    ) -> Option<(Option<String>, ObjectKind)> {
        match content {
            InlineContent::InlineObject(object) => {
                let kind = snapshot
                    .objects
                    .get(&object.object_id)
                    .and_then(|descriptor| classify_object(ObjectSource::Embedded(descriptor), config));
                let kind = kind.unwrap_or_else(|| {
                    tracing::warn!(object_id = %object.object_id, "unclassifiable embedded object");
                    self.warnings.push((
                        start_index,
                        ParseWarning::new(
                            WarningKind::UnclassifiedObject,
                            format!("object {} could not be classified, treating it as embed", object.object_id),
                        ),
                    ));
                    ObjectKind::Embed
                });
                Some((Some(object.object_id.clone()), kind))
            }
            InlineContent::RichLink(link) => {
                let kind = classify_object(ObjectSource::RichLink(&link.properties), config)
                    .unwrap_or(ObjectKind::Embed);
                Some((Some(link.rich_link_id.clone()), kind))
            }
            InlineContent::Equation(_) => Some((None, ObjectKind::Equation)),
            InlineContent::TextRun(_) | InlineContent::Opaque(_) => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &LocatedObject> {
        self.objects.iter()
    }

    pub fn by_id(&self, id: &str) -> Option<&LocatedObject> {
        self.objects.iter().find(|object| object.id.as_deref() == Some(id))
    }

    /// The object starting at `start_index`
    pub fn at(&self, start_index: usize) -> Option<&LocatedObject> {
        self.objects
            .iter()
            .find(|object| object.start_index == start_index)
    }

    /// Classification warnings for objects starting inside `range`
    pub fn warnings_in(&self, range: Range<usize>) -> impl Iterator<Item = &ParseWarning> {
        self.warnings
            .iter()
            .filter(move |(start, _)| range.contains(start))
            .map(|(_, warning)| warning)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::ImageProperties;
    use serde_json::json;

    fn rich_link(uri: &str, mime: Option<&str>) -> RichLinkProperties {
        RichLinkProperties {
            uri: uri.to_string(),
            title: None,
            mime_type: mime.map(String::from),
        }
    }

    #[test]
    fn test_classification_priority() {
        let config = ExportConfig::default();
        let everything = ObjectDescriptor {
            chart_reference: Some(json!({"spreadsheetId": "s1"})),
            drawing: Some(json!({})),
            image: Some(ImageProperties::default()),
            ..ObjectDescriptor::default()
        };
        assert_eq!(
            classify_object(ObjectSource::Embedded(&everything), &config),
            Some(ObjectKind::Chart)
        );

        let drawing = ObjectDescriptor {
            drawing: Some(json!({})),
            image: Some(ImageProperties::default()),
            ..ObjectDescriptor::default()
        };
        assert_eq!(
            classify_object(ObjectSource::Embedded(&drawing), &config),
            Some(ObjectKind::Drawing)
        );
    }

    #[test]
    fn test_linked_image_is_not_plain_image() {
        let config = ExportConfig::default();
        let linked = ObjectDescriptor {
            image: Some(ImageProperties::default()),
            linked_content: Some(json!({"sheetsChartReference": {}})),
            ..ObjectDescriptor::default()
        };
        assert_eq!(classify_object(ObjectSource::Embedded(&linked), &config), None);
    }

    #[test]
    fn test_video_links() {
        let config = ExportConfig::default();
        let youtube = rich_link("https://www.youtube.com/watch?v=abc", None);
        let clip = rich_link("https://files.example.com/clip", Some("video/mp4"));
        let doc = rich_link("https://docs.example.com/d/1", Some("application/pdf"));
        let lookalike = rich_link("https://notyoutube.com/watch", None);
        assert_eq!(classify_object(ObjectSource::RichLink(&youtube), &config), Some(ObjectKind::Video));
        assert_eq!(classify_object(ObjectSource::RichLink(&clip), &config), Some(ObjectKind::Video));
        assert_eq!(classify_object(ObjectSource::RichLink(&doc), &config), Some(ObjectKind::Embed));
        assert_eq!(
            classify_object(ObjectSource::RichLink(&lookalike), &config),
            Some(ObjectKind::Embed)
        );
    }

    #[test]
    fn test_uri_host() {
        assert_eq!(uri_host("https://user@Vimeo.com:443/x").as_deref(), Some("vimeo.com"));
        assert_eq!(uri_host("youtu.be/abc").as_deref(), Some("youtu.be"));
        assert_eq!(uri_host("https:///nohost"), None);
    }

    #[test]
    fn test_index_falls_back_to_embed() {
        let snapshot = Snapshot::from_json(
            r#"{"body": [{"startIndex": 0, "endIndex": 3, "paragraph": {"elements": [
                {"startIndex": 0, "endIndex": 1, "inlineObject": {"objectId": "ghost"}},
                {"startIndex": 1, "endIndex": 2, "equation": {}},
                {"startIndex": 2, "endIndex": 3, "textRun": {"content": "\n"}}
            ]}}]}"#,
        )
        .unwrap();
        let index = ObjectIndex::build(&snapshot, &ExportConfig::default());
        assert_eq!(index.by_id("ghost").map(|o| o.kind), Some(ObjectKind::Embed));
        assert_eq!(index.at(1).map(|o| o.kind), Some(ObjectKind::Equation));
        let warnings: Vec<&ParseWarning> = index.warnings_in(0..3).collect();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, WarningKind::UnclassifiedObject);
        assert_eq!(index.warnings_in(1..3).count(), 0);
    }
}
