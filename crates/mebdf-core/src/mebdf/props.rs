// SPDX-License-Identifier: AGPL-3.0-or-later
//! Directive property lists: parsing `{!...}` bodies and printing them back

use crate::ast::{Alignment, BlockFormattingState, Color, NamedStyle, TextFormatting};
use crate::traits::WarningKind;

/// Why a property list was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropError {
    pub kind: WarningKind,
    pub message: String,
}

impl PropError {
    fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

const INLINE_KEYS: [&str; 7] = ["bold", "italic", "underline", "mono", "highlight", "color", "font"];
const BLOCK_KEYS: [&str; 11] = [
    "font",
    "weight",
    "size",
    "color",
    "align",
    "indent",
    "indent-first",
    "space-above",
    "space-below",
    "line-spacing",
    "line_spacing",
];

/// One `key[:value]` item
struct Item<'a> {
    key: String,
    value: Option<&'a str>,
}

fn items(raw: &str) -> Result<Vec<Item<'_>>, PropError> {
    if raw.trim().is_empty() {
        return Err(PropError::new(WarningKind::MalformedDirective, "empty directive"));
    }
    raw.split(',')
        .map(|item| {
            let item = item.trim();
            if item.is_empty() {
                return Err(PropError::new(
                    WarningKind::MalformedDirective,
                    format!("empty property in `{raw}`"),
                ));
            }
            Ok(match item.split_once(':') {
                Some((key, value)) => Item {
                    key: key.trim().to_ascii_lowercase(),
                    value: Some(value.trim()),
                },
                None => Item {
                    key: item.to_ascii_lowercase(),
                    value: None,
                },
            })
        })
        .collect()
}

fn parse_bool(key: &str, value: Option<&str>) -> Result<bool, PropError> {
    match value.map(str::to_ascii_lowercase).as_deref() {
        None | Some("true") => Ok(true),
        Some("false") => Ok(false),
        Some(other) => Err(PropError::new(
            WarningKind::InvalidValue,
            format!("`{key}` expects true or false, got `{other}`"),
        )),
    }
}

fn require<'v>(key: &str, value: Option<&'v str>) -> Result<&'v str, PropError> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(PropError::new(
            WarningKind::InvalidValue,
            format!("`{key}` needs a value"),
        )),
    }
}

fn parse_color(key: &str, value: &str) -> Result<Color, PropError> {
    value
        .parse()
        .map_err(|e: String| PropError::new(WarningKind::InvalidValue, format!("`{key}`: {e}")))
}

/// `12`, `12pt`, `150%`
fn parse_number(key: &str, value: &str) -> Result<f64, PropError> {
    let number = value
        .strip_suffix("pt")
        .or_else(|| value.strip_suffix('%'))
        .unwrap_or(value)
        .trim();
    match number.parse::<f64>() {
        Ok(n) if n.is_finite() && n >= 0.0 => Ok(n),
        _ => Err(PropError::new(
            WarningKind::InvalidValue,
            format!("`{key}` expects a non-negative number, got `{value}`"),
        )),
    }
}

fn is_clear(value: &str) -> bool {
    value.eq_ignore_ascii_case("false")
}

/// Parse the body of an inline `{!...}` span
pub fn parse_inline(raw: &str) -> Result<TextFormatting, PropError> {
    let mut format = TextFormatting::default();
    for item in items(raw)? {
        let key = item.key.as_str();
        match key {
            "bold" => format.bold = Some(parse_bool(key, item.value)?),
            "italic" => format.italic = Some(parse_bool(key, item.value)?),
            "underline" => format.underline = Some(parse_bool(key, item.value)?),
            "mono" => format.mono = Some(parse_bool(key, item.value)?),
            "highlight" | "color" | "font" => {
                let value = require(key, item.value)?;
                if is_clear(value) || value.eq_ignore_ascii_case("true") {
                    return Err(PropError::new(
                        WarningKind::InvalidValue,
                        format!("`{key}` cannot be switched on or off inside a span"),
                    ));
                }
                match key {
                    "highlight" => format.highlight = Some(parse_color(key, value)?),
                    "color" => format.color = Some(parse_color(key, value)?),
                    _ => format.font = Some(value.to_string()),
                }
            }
            _ if BLOCK_KEYS.contains(&key) || NamedStyle::from_label(key).is_some() => {
                return Err(PropError::new(
                    WarningKind::UnknownProperty,
                    format!("`{key}` is only valid in a standalone block directive"),
                ));
            }
            _ => {
                return Err(PropError::new(
                    WarningKind::UnknownProperty,
                    format!("unknown property `{key}`"),
                ));
            }
        }
    }
    Ok(format)
}

/// Setting on one block field; `None` clears it
#[derive(Debug, Clone, PartialEq)]
enum BlockSetting {
    Font(Option<String>),
    Weight(Option<u16>),
    Size(Option<f64>),
    Color(Option<Color>),
    Align(Option<Alignment>),
    Indent(Option<f64>),
    IndentFirst(Option<f64>),
    SpaceAbove(Option<f64>),
    SpaceBelow(Option<f64>),
    LineSpacing(Option<f64>),
}

/// A parsed standalone directive
#[derive(Debug, Clone, PartialEq)]
pub struct BlockDirective {
    reset: Option<NamedStyle>,
    settings: Vec<BlockSetting>,
}

impl BlockDirective {
    /// The state after applying this directive to `state`
    pub fn apply(&self, state: &BlockFormattingState) -> BlockFormattingState {
        let mut next = match self.reset {
            Some(named) => BlockFormattingState::baseline(named),
            None => state.clone(),
        };
        for setting in &self.settings {
            match setting.clone() {
                BlockSetting::Font(v) => next.font = v,
                BlockSetting::Weight(v) => next.weight = v,
                BlockSetting::Size(v) => next.size = v,
                BlockSetting::Color(v) => next.color = v,
                BlockSetting::Align(v) => next.alignment = v,
                BlockSetting::Indent(v) => next.indent_start = v,
                BlockSetting::IndentFirst(v) => next.indent_first_line = v,
                BlockSetting::SpaceAbove(v) => next.space_above = v,
                BlockSetting::SpaceBelow(v) => next.space_below = v,
                BlockSetting::LineSpacing(v) => next.line_spacing = v,
            }
        }
        next
    }
}

/// Parse the body of a standalone `{!...}` line.
///
/// Only block keys and named styles are accepted here. Span keys such as
/// `mono` or `bold` describe characters, so a line like `{!mono}` is rejected
/// with [`WarningKind::InlineOnlyProperty`] and stays literal text; write
/// `{!mono}text{/!}` instead.
pub fn parse_block(raw: &str) -> Result<BlockDirective, PropError> {
    let mut directive = BlockDirective {
        reset: None,
        settings: Vec::new(),
    };
    for (position, item) in items(raw)?.into_iter().enumerate() {
        let key = item.key.as_str();
        if item.value.is_none() {
            if let Some(named) = NamedStyle::from_label(key) {
                if position != 0 {
                    return Err(PropError::new(
                        WarningKind::MalformedDirective,
                        format!("named style `{}` must come first", named.label()),
                    ));
                }
                directive.reset = Some(named);
                continue;
            }
        }
        let value = match item.value {
            Some(v) => v,
            None if INLINE_KEYS.contains(&key) => {
                return Err(PropError::new(
                    WarningKind::InlineOnlyProperty,
                    format!("`{key}` is only valid inside an inline span"),
                ));
            }
            None if BLOCK_KEYS.contains(&key) => {
                return Err(PropError::new(
                    WarningKind::InvalidValue,
                    format!("`{key}` needs a value"),
                ));
            }
            None => {
                return Err(PropError::new(
                    WarningKind::UnknownProperty,
                    format!("unknown property `{key}`"),
                ));
            }
        };
        let clear = is_clear(value);
        let number = |key: &str| -> Result<Option<f64>, PropError> {
            if clear {
                Ok(None)
            } else {
                parse_number(key, value).map(Some)
            }
        };
        let setting = match key {
            "font" => BlockSetting::Font((!clear).then(|| value.to_string())),
            "weight" => BlockSetting::Weight(if clear {
                None
            } else {
                match value.parse::<u16>() {
                    Ok(w) if (1..=1000).contains(&w) => Some(w),
                    _ => {
                        return Err(PropError::new(
                            WarningKind::InvalidValue,
                            format!("`weight` expects 1-1000, got `{value}`"),
                        ))
                    }
                }
            }),
            "size" => BlockSetting::Size(number(key)?),
            "color" => BlockSetting::Color(if clear {
                None
            } else {
                Some(parse_color(key, value)?)
            }),
            "align" => BlockSetting::Align(if clear {
                None
            } else {
                Some(Alignment::from_label(value).ok_or_else(|| {
                    PropError::new(
                        WarningKind::InvalidValue,
                        format!("`align` expects left, center, right or justify, got `{value}`"),
                    )
                })?)
            }),
            "indent" => BlockSetting::Indent(number(key)?),
            "indent-first" => BlockSetting::IndentFirst(number(key)?),
            "space-above" => BlockSetting::SpaceAbove(number(key)?),
            "space-below" => BlockSetting::SpaceBelow(number(key)?),
            "line-spacing" | "line_spacing" => match number(key)? {
                Some(n) if n == 0.0 => {
                    return Err(PropError::new(
                        WarningKind::InvalidValue,
                        "`line-spacing` must be positive",
                    ))
                }
                n => BlockSetting::LineSpacing(n),
            },
            _ if INLINE_KEYS.contains(&key) => {
                return Err(PropError::new(
                    WarningKind::InlineOnlyProperty,
                    format!("`{key}` is only valid inside an inline span"),
                ));
            }
            _ => {
                return Err(PropError::new(
                    WarningKind::UnknownProperty,
                    format!("unknown property `{key}`"),
                ));
            }
        };
        directive.settings.push(setting);
    }
    Ok(directive)
}

/// Canonical body of an inline span
pub fn format_inline(format: &TextFormatting) -> String {
    let mut parts = Vec::new();
    let flags = [
        ("bold", format.bold),
        ("italic", format.italic),
        ("underline", format.underline),
        ("mono", format.mono),
    ];
    for (key, value) in flags {
        match value {
            Some(true) => parts.push(key.to_string()),
            Some(false) => parts.push(format!("{key}:false")),
            None => {}
        }
    }
    if let Some(color) = format.highlight {
        parts.push(format!("highlight:{color}"));
    }
    if let Some(color) = format.color {
        parts.push(format!("color:{color}"));
    }
    if let Some(font) = &format.font {
        parts.push(format!("font:{font}"));
    }
    parts.join(", ")
}

fn block_fields(state: &BlockFormattingState) -> [(&'static str, Option<String>); 10] {
    let num = |v: Option<f64>| v.map(|n| n.to_string());
    [
        ("font", state.font.clone()),
        ("weight", state.weight.map(|w| w.to_string())),
        ("size", num(state.size)),
        ("color", state.color.map(|c| c.to_string())),
        ("align", state.alignment.map(|a| a.label().to_string())),
        ("indent", num(state.indent_start)),
        ("indent-first", num(state.indent_first_line)),
        ("space-above", num(state.space_above)),
        ("space-below", num(state.space_below)),
        ("line-spacing", num(state.line_spacing)),
    ]
}

/// Reset-form body that establishes `state` from any starting state
pub fn format_block_state(state: &BlockFormattingState) -> String {
    let mut parts = vec![state.named_style.label().to_string()];
    for (key, value) in block_fields(state) {
        if let Some(value) = value {
            parts.push(format!("{key}:{value}"));
        }
    }
    parts.join(", ")
}

/// Body of the standalone directive taking `from` to `to`, or `None` when
/// nothing changes. Uses the reset form when the named style changes or `to`
/// is a bare baseline, the delta form otherwise.
pub fn format_block_transition(
    from: &BlockFormattingState,
    to: &BlockFormattingState,
) -> Option<String> {
    if from == to {
        return None;
    }
    if from.named_style != to.named_style || to.is_baseline() {
        return Some(format_block_state(to));
    }
    let parts: Vec<String> = block_fields(from)
        .into_iter()
        .zip(block_fields(to))
        .filter(|((_, old), (_, new))| old != new)
        .map(|((key, _), (_, new))| match new {
            Some(value) => format!("{key}:{value}"),
            None => format!("{key}:false"),
        })
        .collect();
    Some(parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_combined_inline_props() {
        let format = parse_inline("highlight:yellow, underline").unwrap();
        assert_eq!(format.highlight, Some(Color::rgb(255, 255, 0)));
        assert_eq!(format.underline, Some(true));
        assert_eq!(format.bold, None);
    }

    #[test]
    fn test_inline_whitespace_insignificant() {
        assert_eq!(
            parse_inline(" mono ,color : red ").unwrap(),
            parse_inline("mono,color:red").unwrap()
        );
    }

    #[test]
    fn test_block_rejects_span_keys() {
        assert_eq!(parse_block("mono").unwrap_err().kind, WarningKind::InlineOnlyProperty);
        assert_eq!(parse_block("align:center, bold").unwrap_err().kind, WarningKind::InlineOnlyProperty);
        assert_eq!(parse_block("glow:3").unwrap_err().kind, WarningKind::UnknownProperty);
    }

    #[test]
    fn test_inline_rejects_block_keys() {
        let err = parse_inline("size:12").unwrap_err();
        assert_eq!(err.kind, WarningKind::UnknownProperty);
    }

    #[test]
    fn test_inline_valued_key_cannot_clear() {
        let err = parse_inline("color:false").unwrap_err();
        assert_eq!(err.kind, WarningKind::InvalidValue);
    }

    #[test]
    fn test_inline_bad_color() {
        assert_eq!(
            parse_inline("highlight:sunset").unwrap_err().kind,
            WarningKind::InvalidValue
        );
    }

    #[test]
    fn test_empty_and_trailing_comma_are_malformed() {
        assert_eq!(parse_inline("").unwrap_err().kind, WarningKind::MalformedDirective);
        assert_eq!(
            parse_inline("bold,").unwrap_err().kind,
            WarningKind::MalformedDirective
        );
    }

    #[test]
    fn test_block_reset_then_props() {
        let directive = parse_block("title, align:center").unwrap();
        let running = BlockFormattingState {
            size: Some(14.0),
            ..BlockFormattingState::default()
        };
        let next = directive.apply(&running);
        assert_eq!(next.named_style, NamedStyle::Title);
        assert_eq!(next.alignment, Some(Alignment::Center));
        assert_eq!(next.size, None);
    }

    #[test]
    fn test_block_delta_and_clear() {
        let running = BlockFormattingState {
            size: Some(14.0),
            alignment: Some(Alignment::Right),
            ..BlockFormattingState::default()
        };
        let next = parse_block("size:false, space-above:12pt")
            .unwrap()
            .apply(&running);
        assert_eq!(next.size, None);
        assert_eq!(next.space_above, Some(12.0));
        assert_eq!(next.alignment, Some(Alignment::Right));
    }

    #[test]
    fn test_named_style_must_lead() {
        assert_eq!(
            parse_block("align:left, Title").unwrap_err().kind,
            WarningKind::MalformedDirective
        );
    }

    #[test]
    fn test_format_inline_canonical_order() {
        let format = TextFormatting {
            font: Some("Georgia".into()),
            underline: Some(true),
            highlight: Some(Color::rgb(255, 255, 0)),
            bold: Some(false),
            ..TextFormatting::default()
        };
        assert_eq!(
            format_inline(&format),
            "bold:false, underline, highlight:yellow, font:Georgia"
        );
    }

    #[test]
    fn test_transition_forms() {
        let normal = BlockFormattingState::default();
        let centered = BlockFormattingState {
            alignment: Some(Alignment::Center),
            ..normal.clone()
        };
        let title = BlockFormattingState::baseline(NamedStyle::Title);

        assert_eq!(format_block_transition(&normal, &normal), None);
        assert_eq!(
            format_block_transition(&normal, &centered).as_deref(),
            Some("align:center")
        );
        assert_eq!(
            format_block_transition(&centered, &normal).as_deref(),
            Some("Normal text")
        );
        assert_eq!(
            format_block_transition(&centered, &title).as_deref(),
            Some("Title")
        );
        let sized = BlockFormattingState {
            size: Some(10.5),
            alignment: Some(Alignment::Center),
            ..normal.clone()
        };
        assert_eq!(
            format_block_transition(&sized, &centered).as_deref(),
            Some("size:false")
        );
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn state_strategy() -> impl Strategy<Value = BlockFormattingState> {
        (
            prop_oneof![
                Just(NamedStyle::NormalText),
                Just(NamedStyle::Title),
                Just(NamedStyle::Subtitle)
            ],
            proptest::option::of(prop_oneof![Just("Arial".to_string()), Just("Georgia".to_string())]),
            proptest::option::of(prop_oneof![Just(400u16), Just(700u16)]),
            proptest::option::of(1u32..100u32),
            proptest::option::of(prop_oneof![Just(Alignment::Center), Just(Alignment::Justify)]),
            proptest::option::of(0u32..50u32),
            proptest::option::of(50u32..300u32),
        )
            .prop_map(|(named_style, font, weight, size, alignment, indent, spacing)| {
                BlockFormattingState {
                    named_style,
                    font,
                    weight,
                    size: size.map(|s| f64::from(s) / 2.0),
                    alignment,
                    indent_start: indent.map(f64::from),
                    line_spacing: spacing.map(f64::from),
                    ..BlockFormattingState::default()
                }
            })
    }

    proptest! {
        // Property: the printed transition takes `from` exactly to `to`
        #[test]
        fn prop_transition_reaches_target(from in state_strategy(), to in state_strategy()) {
            match format_block_transition(&from, &to) {
                None => prop_assert_eq!(&from, &to),
                Some(body) => {
                    let directive = parse_block(&body).unwrap();
                    prop_assert_eq!(directive.apply(&from), to);
                }
            }
        }
    }
}
