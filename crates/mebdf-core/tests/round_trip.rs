// SPDX-License-Identifier: AGPL-3.0-or-later
//! Export, edit, import and replay across whole documents

use mebdf_core::tree::replay;
use mebdf_core::writer::MutationOp;
use mebdf_core::{
    export, export_section, import, import_section, parse, serialize, ConvertConfig, InMemoryTabs, Session,
    Snapshot,
};
use pretty_assertions::assert_eq;

const REPORT: &str = "# {^ h.1}Report\n\
{!font:Georgia}\n\
Intro with **bold**, *italic* and [a link](https://example.test).\n\
- first\n\
  1. nested\n\
| Name | Value |\n\
| --- | --- |\n\
| a | {!color:red}1{/!} |\n\
See [the top](#^h.1) {^= obj1 image} and {^= equation}\n\
{!align:center}\n\
closing{^ id.1}";

#[test]
fn test_rich_document_reimports_without_ops() {
    let config = ConvertConfig::default();
    let snapshot = Snapshot::from_mebdf(REPORT, &config);
    let exported = export(&snapshot, &config).content;

    // export is a fixed point of build-then-export
    let rebuilt = Snapshot::from_mebdf(&exported, &config);
    assert_eq!(export(&rebuilt, &config).content, exported);

    let result = import(&snapshot, &exported, &config).unwrap();
    assert_eq!(result.mutation_ops, vec![]);
    assert_eq!(result.preserved_object_ids, vec!["obj1".to_string()]);
    assert!(result.warnings.is_empty());
}

#[test]
fn test_serialized_text_parses_back_to_the_same_tree() {
    let parsed = parse(REPORT);
    assert!(parsed.is_clean());
    let again = parse(&serialize(&parsed.document));
    assert_eq!(again.document, parsed.document);
}

#[test]
fn test_editing_one_section_leaves_the_rest_byte_identical() {
    let config = ConvertConfig::default();
    let text = "opening line\n# {^ a}Alpha\nalpha body\n## {^ b}Beta\nbeta body\n# {^ c}Gamma\ngamma body";
    let snapshot = Snapshot::from_mebdf(text, &config);
    let before: Vec<String> = ["", "a", "c"]
        .iter()
        .map(|id| export_section(&snapshot, id, &config).unwrap().content)
        .collect();

    let result = import_section(&snapshot, "b", "## {^ b}Beta\nnew **bold** body\nand a second line", &config)
        .unwrap();
    assert!(result.mutation_ops.iter().any(MutationOp::is_text_op));
    let applied = replay::apply(&snapshot, &result.mutation_ops).unwrap();

    assert_eq!(
        export_section(&applied, "b", &config).unwrap().content,
        "## {^ b}Beta\nnew **bold** body\nand a second line"
    );
    // section a contains b, so only the preamble and c are untouched
    assert_eq!(export_section(&applied, "", &config).unwrap().content, before[0]);
    assert_eq!(export_section(&applied, "c", &config).unwrap().content, before[2]);
    assert!(export_section(&applied, "a", &config)
        .unwrap()
        .content
        .starts_with("# {^ a}Alpha\nalpha body\n## {^ b}Beta"));
    assert_ne!(export_section(&applied, "a", &config).unwrap().content, before[1]);
}

#[test]
fn test_session_round_trip() {
    let tabs = InMemoryTabs::new();
    tabs.insert(Snapshot::from_mebdf("# {^ h.1}Plan\ndraft", &ConvertConfig::default()))
        .unwrap();
    let mut session = Session::new(tabs.clone(), tabs, ConvertConfig::default());

    let first = session.write("t.0", "# {^ h.1}Plan\nfinal\n## {^}Next steps").unwrap();
    assert!(!first.mutation_ops.is_empty());
    assert_eq!(
        session.read("t.0").unwrap().content,
        "# {^ h.1}Plan\nfinal\n## {^ h.2}Next steps"
    );

    // writing the exported text back is a no-op
    let current = session.read("t.0").unwrap().content;
    let second = session.write("t.0", &current).unwrap();
    assert_eq!(second.mutation_ops, vec![]);

    let hierarchy = session.hierarchy("t.0").unwrap();
    assert_eq!(hierarchy.content, "# {^ h.1}Plan\n## {^ h.2}Next steps");
}

const LINKED: &str = r##"{"body": [
    {"startIndex": 0, "endIndex": 4, "paragraph": {"elements": [
        {"startIndex": 0, "endIndex": 4, "textRun": {"content": "Top\n"}}
    ], "style": {"namedStyleType": "HEADING_1", "headingId": "h.1"}}},
    {"startIndex": 4, "endIndex": 28, "paragraph": {"elements": [
        {"startIndex": 4, "endIndex": 8, "textRun": {"content": "See "}},
        {"startIndex": 8, "endIndex": 12, "textRun": {"content": "docs", "style": {
            "bold": true, "underline": true, "foregroundColor": "#1155cc",
            "link": {"url": "https://docs.example.test"}}}},
        {"startIndex": 12, "endIndex": 13, "textRun": {"content": " "}},
        {"startIndex": 13, "endIndex": 14, "richLink": {"richLinkId": "rl1",
            "properties": {"uri": "https://www.youtube.com/watch?v=abc"}}},
        {"startIndex": 14, "endIndex": 19, "textRun": {"content": " and "}},
        {"startIndex": 19, "endIndex": 22, "textRun": {"content": "top", "style": {
            "italic": true, "underline": true, "foregroundColor": "#ff0000",
            "link": {"headingId": "h.1"}}}},
        {"startIndex": 22, "endIndex": 23, "textRun": {"content": " "}},
        {"startIndex": 23, "endIndex": 27, "textRun": {"content": "mark", "style": {
            "underline": true, "foregroundColor": "#1155cc", "link": {"bookmarkId": "bm"}}}},
        {"startIndex": 27, "endIndex": 28, "textRun": {"content": "\n"}}
    ]}},
    {"startIndex": 28, "endIndex": 32, "paragraph": {"elements": [
        {"startIndex": 28, "endIndex": 32, "textRun": {"content": "end\n"}}
    ]}}
],
"namedPositions": [
    {"id": "bm", "kind": "bookmark", "index": 5},
    {"id": "c1", "kind": "comment", "index": 30}
]}"##;

#[test]
fn test_provider_links_and_anchors_reimport_without_ops() {
    let config = ConvertConfig::default();
    let snapshot = Snapshot::from_json(LINKED).unwrap();
    let exported = export(&snapshot, &config).content;
    for part in [
        "# {^ h.1}Top\n",
        "S{^ bm}ee ",
        "](https://docs.example.test)",
        "{^= rl1 video}",
        "](#^h.1)",
        "](#^bm)",
        "en{^ c1}d",
    ] {
        assert!(exported.contains(part), "{part:?} missing from {exported:?}");
    }

    let result = import(&snapshot, &exported, &config).unwrap();
    assert_eq!(result.mutation_ops, vec![]);
    assert_eq!(result.preserved_object_ids, vec!["rl1".to_string()]);
    assert!(result.warnings.is_empty());

    // an edit between the links leaves every target and anchor in place
    let edited = exported.replacen(" and ", " or ", 1);
    let result = import(&snapshot, &edited, &config).unwrap();
    assert!(result.mutation_ops.iter().all(|op| !matches!(op, MutationOp::CreateAnchor { .. })));
    let applied = replay::apply(&snapshot, &result.mutation_ops).unwrap();
    assert_eq!(export(&applied, &config).content, edited);
}
