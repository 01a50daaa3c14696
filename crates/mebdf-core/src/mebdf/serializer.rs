// SPDX-License-Identifier: AGPL-3.0-or-later
//! MEBDF serializer: AST → text
//!
//! The output reparses to the same AST for anything the parser produces.

use super::props;
use super::tokenizer::ordered_marker_len;
use crate::ast::{
    AnchorId, Block, BlockFormattingState, Document, Inline, LinkTarget, ListKind, TableRow,
};

/// Render a document, one line per block, lines joined by `\n`
pub fn serialize(doc: &Document) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut state = BlockFormattingState::default();
    let mut counters: Vec<u32> = Vec::new();
    let mut previous_was_table = false;

    for block in &doc.blocks {
        match block {
            Block::BlockFormatting { state: next } => {
                if let Some(body) = props::format_block_transition(&state, next) {
                    lines.push(format!("{{!{body}}}"));
                    previous_was_table = false;
                }
                state = next.clone();
                continue;
            }
            Block::Paragraph { content } => {
                lines.push(paragraph_line(content));
                counters.clear();
            }
            Block::Heading {
                level,
                anchor,
                content,
            } => {
                let mut line = "#".repeat((*level).clamp(1, 6) as usize);
                line.push(' ');
                if let Some(anchor) = anchor {
                    render_anchor(&mut line, anchor);
                }
                render_inlines(&mut line, content, false);
                lines.push(line);
                counters.clear();
            }
            Block::ListItem {
                kind,
                depth,
                content,
            } => {
                let depth = *depth as usize;
                counters.resize(depth + 1, 0);
                let mut line = "  ".repeat(depth);
                match kind {
                    ListKind::Bullet => {
                        counters[depth] = 0;
                        line.push_str("- ");
                    }
                    ListKind::Ordered => {
                        counters[depth] += 1;
                        line.push_str(&format!("{}. ", counters[depth]));
                    }
                }
                render_inlines(&mut line, content, false);
                lines.push(line);
            }
            Block::Table { rows } => {
                if previous_was_table {
                    // A no-op directive keeps adjacent tables apart
                    lines.push(format!("{{!{}}}", props::format_block_state(&state)));
                }
                render_table(&mut lines, rows);
                counters.clear();
            }
        }
        previous_was_table = matches!(block, Block::Table { .. });
    }

    lines.join("\n")
}

/// Render inline content as MEBDF
pub fn serialize_inlines(inlines: &[Inline]) -> String {
    let mut output = String::new();
    render_inlines(&mut output, inlines, false);
    output
}

/// A paragraph line, with line-start constructs escaped
fn paragraph_line(content: &[Inline]) -> String {
    let mut line = String::new();
    render_inlines(&mut line, content, false);

    let indent = line.len() - line.trim_start_matches([' ', '\t']).len();
    let rest = &line[indent..];
    let escape_at = if indent == 0 && (rest.starts_with('#') || rest.starts_with('|')) {
        Some(indent)
    } else if rest.starts_with("- ") {
        Some(indent)
    } else {
        ordered_marker_len(rest).map(|len| indent + len - 2)
    };
    if let Some(at) = escape_at {
        line.insert(at, '\\');
    }
    line
}

fn render_table(lines: &mut Vec<String>, rows: &[TableRow]) {
    let Some((header, body)) = rows.split_first() else {
        return;
    };
    lines.push(render_row(header));
    let columns = header.cells.len().max(1);
    lines.push(format!("|{}", " --- |".repeat(columns)));
    for row in body {
        lines.push(render_row(row));
    }
}

fn render_row(row: &TableRow) -> String {
    let mut line = String::from("|");
    for cell in &row.cells {
        line.push(' ');
        for (i, paragraph) in cell.paragraphs.iter().enumerate() {
            if i > 0 {
                line.push_str("<br>");
            }
            render_inlines(&mut line, paragraph, true);
        }
        line.push_str(" |");
    }
    line
}

fn render_inlines(output: &mut String, inlines: &[Inline], table: bool) {
    for inline in inlines {
        render_inline(output, inline, table);
    }
}

fn render_inline(output: &mut String, inline: &Inline, table: bool) {
    match inline {
        Inline::Text { content } => escape_text(output, content, table),

        Inline::Strong { content } => {
            output.push_str("**");
            render_inlines(output, content, table);
            output.push_str("**");
        }

        Inline::Emphasis { content } => {
            output.push('*');
            render_inlines(output, content, table);
            output.push('*');
        }

        Inline::Link { target, content } => {
            output.push('[');
            render_inlines(output, content, table);
            output.push_str("](");
            match target {
                LinkTarget::Anchor(id) => {
                    output.push_str("#^");
                    output.push_str(id);
                }
                LinkTarget::Url(url) => {
                    let url = url.replace(')', "%29");
                    match url.strip_prefix("#^") {
                        Some(rest) => {
                            output.push_str("#%5E");
                            output.push_str(rest);
                        }
                        None => output.push_str(&url),
                    }
                }
            }
            output.push(')');
        }

        Inline::Formatted { format, content } => {
            output.push_str("{!");
            output.push_str(&props::format_inline(format));
            output.push('}');
            render_inlines(output, content, table);
            output.push_str("{/!}");
        }

        Inline::Anchor { id } => render_anchor(output, id),

        Inline::Object { id, kind } => {
            output.push_str("{^= ");
            if let Some(id) = id {
                output.push_str(id);
                output.push(' ');
            }
            output.push_str(kind.label());
            output.push('}');
        }
    }
}

fn render_anchor(output: &mut String, anchor: &AnchorId) {
    match anchor {
        AnchorId::Existing(id) => {
            output.push_str("{^ ");
            output.push_str(id);
            output.push('}');
        }
        AnchorId::Proposed => output.push_str("{^}"),
    }
}

fn escape_text(output: &mut String, text: &str, table: bool) {
    for c in text.chars() {
        let special = matches!(c, '\\' | '*' | '[' | ']' | '{' | '}')
            || (table && matches!(c, '|' | '<' | '-'));
        if special {
            output.push('\\');
        }
        output.push(c);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Alignment, Color, NamedStyle, ObjectKind, TableCell, TextFormatting};
    use crate::mebdf::parse;
    use pretty_assertions::assert_eq;

    fn roundtrip(input: &str) -> String {
        serialize(&parse(input).document)
    }

    #[test]
    fn test_canonical_input_roundtrips_verbatim() {
        let input = "# {^ h1}Title\nBody with **bold**, *italic* and [a link](https://x.test)\n## {^ h2}Sec\nMore";
        assert_eq!(roundtrip(input), input);
    }

    #[test]
    fn test_inline_span_canonical_order() {
        assert_eq!(
            roundtrip("{!underline ,highlight:#ffff00}x{/!}"),
            "{!underline, highlight:yellow}x{/!}"
        );
    }

    #[test]
    fn test_escapes_specials() {
        let doc = Document::new(vec![Block::Paragraph {
            content: vec![Inline::text("a*b [c] {d} \\")],
        }]);
        assert_eq!(serialize(&doc), r"a\*b \[c\] \{d\} \\");
    }

    #[test]
    fn test_escapes_line_start_constructs() {
        let para = |text: &str| Block::Paragraph {
            content: vec![Inline::text(text)],
        };
        let doc = Document::new(vec![
            para("# not a heading"),
            para("- not a list"),
            para("2024. was a year"),
            para("| not a table"),
            para("  - indented"),
        ]);
        assert_eq!(
            serialize(&doc),
            "\\# not a heading\n\\- not a list\n2024\\. was a year\n\\| not a table\n  \\- indented"
        );
    }

    #[test]
    fn test_ordered_numbering_per_depth() {
        let item = |kind, depth| Block::ListItem {
            kind,
            depth,
            content: vec![Inline::text("x")],
        };
        let doc = Document::new(vec![
            item(ListKind::Ordered, 0),
            item(ListKind::Ordered, 1),
            item(ListKind::Ordered, 1),
            item(ListKind::Ordered, 0),
            item(ListKind::Bullet, 1),
        ]);
        assert_eq!(serialize(&doc), "1. x\n  1. x\n  2. x\n2. x\n  - x");
    }

    #[test]
    fn test_block_directives_reset_and_delta() {
        let centered = BlockFormattingState {
            alignment: Some(Alignment::Center),
            ..BlockFormattingState::default()
        };
        let doc = Document::new(vec![
            Block::BlockFormatting {
                state: centered.clone(),
            },
            Block::Paragraph {
                content: vec![Inline::text("a")],
            },
            Block::BlockFormatting {
                state: BlockFormattingState {
                    color: Some(Color::rgb(255, 0, 0)),
                    ..centered
                },
            },
            Block::Paragraph {
                content: vec![Inline::text("b")],
            },
            Block::BlockFormatting {
                state: BlockFormattingState::baseline(NamedStyle::Subtitle),
            },
        ]);
        assert_eq!(
            serialize(&doc),
            "{!align:center}\na\n{!color:red}\nb\n{!Subtitle}"
        );
    }

    #[test]
    fn test_table_rendering() {
        let cell = |text: &str| TableCell {
            paragraphs: vec![vec![Inline::text(text)]],
        };
        let doc = Document::new(vec![Block::Table {
            rows: vec![
                TableRow {
                    cells: vec![cell("a|b"), cell("c")],
                },
                TableRow {
                    cells: vec![
                        TableCell {
                            paragraphs: vec![vec![Inline::text("1")], vec![Inline::text("2")]],
                        },
                        cell("-"),
                    ],
                },
            ],
        }]);
        assert_eq!(
            serialize(&doc),
            "| a\\|b | c |\n| --- | --- |\n| 1<br>2 | \\- |"
        );
    }

    #[test]
    fn test_adjacent_tables_stay_apart() {
        let input = "| a |\n| --- |\n{!Normal text}\n| b |\n| --- |";
        let parsed = parse(input).document;
        assert_eq!(parsed.blocks.len(), 2);
        assert_eq!(parse(&serialize(&parsed)).document, parsed);
    }

    #[test]
    fn test_objects_and_anchors() {
        let doc = Document::new(vec![Block::Paragraph {
            content: vec![
                Inline::Anchor {
                    id: AnchorId::Existing("kix.1".into()),
                },
                Inline::Object {
                    id: Some("obj1".into()),
                    kind: ObjectKind::Chart,
                },
                Inline::Object {
                    id: None,
                    kind: ObjectKind::Equation,
                },
                Inline::Anchor {
                    id: AnchorId::Proposed,
                },
            ],
        }]);
        assert_eq!(serialize(&doc), "{^ kix.1}{^= obj1 chart}{^= equation}{^}");
    }

    #[test]
    fn test_formatted_and_link_nesting() {
        let doc = Document::new(vec![Block::Paragraph {
            content: vec![Inline::Link {
                target: LinkTarget::Anchor("h.2".into()),
                content: vec![Inline::Formatted {
                    format: TextFormatting {
                        mono: Some(true),
                        ..TextFormatting::default()
                    },
                    content: vec![Inline::text("see")],
                }],
            }],
        }]);
        assert_eq!(serialize(&doc), "[{!mono}see{/!}](#^h.2)");
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use crate::mebdf::parse;
    use proptest::prelude::*;

    /// Fragments that exercise every construct, including broken ones
    fn fragment() -> impl Strategy<Value = &'static str> {
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
            Just("](#^h.1)"),
            Just("{^ a}"),
            Just("{^}"),
            Just("{^= obj image}"),
            Just("{^= equation}"),
            Just("\n"),
            Just("\n# "),
            Just("\n- "),
            Just("\n  1. "),
            Just("\n| "),
            Just(" | "),
            Just("<br>"),
            Just("\n| --- |"),
            Just("\n{!Title}"),
            Just("\n{!align:center}"),
            Just("\n{!Normal text}"),
            Just("#"),
            Just("-"),
        ]
    }

    proptest! {
        // Property: parse(serialize(parse(x))) == parse(x)
        #[test]
        fn prop_parse_serialize_idempotent(parts in proptest::collection::vec(fragment(), 0..24)) {
            let input: String = parts.concat();
            let first = parse(&input).document;
            let second = parse(&serialize(&first)).document;
            prop_assert_eq!(second, first);
        }
    }
}
