//! Card-to-deck-row transformation.
//!
//! A pure, deterministic projection from [`ExtractedCard`] to [`DeckRow`]:
//! field mapping, cloze-markup normalization, delimiter escaping, and tag
//! construction. No I/O, no shared state; the only failure mode is a
//! malformed input card, which is reported per card and never aborts its
//! siblings.

use crate::backend::ExtractedCard;
use crate::error::ConversionError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

/// Field delimiter of the deck table.
pub const DECK_DELIMITER: char = '|';

/// Header row written once per deck file.
pub const DECK_HEADER: &str = "content|context|tags";

/// One finalized deck record: content, context, and its ordered tag set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeckRow {
    pub content: String,
    pub context: String,
    /// Ordered tags: importance token first, then the prefixed document tag.
    pub tags: Vec<String>,
}

/// Convert one extracted card into a deck row.
///
/// Tags are built as `[importance, tag_prefix + document_stem]`; empty
/// components are dropped rather than emitted as empty tags. An empty
/// `content` field marks the card malformed.
pub fn to_deck_row(
    card: &ExtractedCard,
    tag_prefix: &str,
    document_stem: &str,
) -> Result<DeckRow, ConversionError> {
    if card.content.trim().is_empty() {
        return Err(ConversionError {
            reason: "card has empty content".into(),
        });
    }

    let mut tags = Vec::with_capacity(2);
    let importance = tag_token(&card.importance);
    if !importance.is_empty() {
        tags.push(importance);
    }
    let document_tag = tag_token(&format!("{tag_prefix}{document_stem}"));
    if !document_tag.is_empty() {
        tags.push(document_tag);
    }

    Ok(DeckRow {
        content: normalize_cloze(&card.content),
        context: normalize_cloze(&card.context),
        tags,
    })
}

/// Spaces are tag separators in most deck formats; a multi-word token must
/// stay one tag.
fn tag_token(value: &str) -> String {
    value.trim().replace(' ', "_")
}

static RE_BAD_CLOZE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{c(\d+):([^:])").unwrap());

/// Normalize cloze deletions written as `{{c1:answer}}` to `{{c1::answer}}`.
///
/// Models produce the single-colon form often enough that importers would
/// otherwise show the markup literally. Already-correct `{{c1::...}}` is
/// left untouched.
pub fn normalize_cloze(text: &str) -> String {
    RE_BAD_CLOZE.replace_all(text, "{{c${1}::${2}").into_owned()
}

/// Escape one field for the delimited table: quote when it contains the
/// delimiter, a quote, or a line break, doubling embedded quotes.
fn escape_field(field: &str) -> String {
    if field.contains(DECK_DELIMITER)
        || field.contains('"')
        || field.contains('\n')
        || field.contains('\r')
    {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Render one row as a delimited line (no trailing newline).
pub fn render_row(row: &DeckRow) -> String {
    let tags = row.tags.join(" ");
    format!(
        "{}{DECK_DELIMITER}{}{DECK_DELIMITER}{}",
        escape_field(&row.content),
        escape_field(&row.context),
        escape_field(&tags),
    )
}

/// Write a deck file: header row plus one line per row, `\n` line endings.
///
/// Output is byte-deterministic for identical input ordering.
pub fn write_deck(path: &Path, rows: &[DeckRow]) -> std::io::Result<()> {
    let mut file = std::fs::File::create(path)?;
    writeln!(file, "{DECK_HEADER}")?;
    for row in rows {
        writeln!(file, "{}", render_row(row))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(content: &str, context: &str, importance: &str) -> ExtractedCard {
        ExtractedCard {
            content: content.into(),
            context: context.into(),
            importance: importance.into(),
        }
    }

    #[test]
    fn maps_fields_and_builds_tags() {
        let row = to_deck_row(
            &card("What is the krebs cycle?", "Slide 12", "high yield"),
            "Bio_",
            "lecture_03",
        )
        .unwrap();

        assert_eq!(row.content, "What is the krebs cycle?");
        assert_eq!(row.context, "Slide 12");
        assert_eq!(row.tags, vec!["high_yield", "Bio_lecture_03"]);
    }

    #[test]
    fn empty_tag_prefix_uses_bare_stem() {
        let row = to_deck_row(&card("Q", "", "low"), "", "deck").unwrap();
        assert_eq!(row.tags, vec!["low", "deck"]);
    }

    #[test]
    fn empty_importance_is_dropped_not_emitted() {
        let row = to_deck_row(&card("Q", "", ""), "", "deck").unwrap();
        assert_eq!(row.tags, vec!["deck"]);
    }

    #[test]
    fn empty_content_is_malformed() {
        let err = to_deck_row(&card("   ", "ctx", "high"), "", "deck").unwrap_err();
        assert!(err.reason.contains("empty content"));
    }

    #[test]
    fn cloze_single_colon_is_normalized() {
        assert_eq!(
            normalize_cloze("The {{c1:mitochondria}} is the powerhouse"),
            "The {{c1::mitochondria}} is the powerhouse"
        );
    }

    #[test]
    fn cloze_double_colon_is_untouched() {
        let text = "The {{c1::mitochondria}} and {{c12::ATP}}";
        assert_eq!(normalize_cloze(text), text);
    }

    #[test]
    fn cloze_multi_digit_index() {
        assert_eq!(normalize_cloze("{{c10:answer}}"), "{{c10::answer}}");
    }

    #[test]
    fn delimiter_in_field_is_quoted() {
        let row = DeckRow {
            content: "a | b".into(),
            context: "plain".into(),
            tags: vec!["t".into()],
        };
        assert_eq!(render_row(&row), "\"a | b\"|plain|t");
    }

    #[test]
    fn quotes_are_doubled() {
        let row = DeckRow {
            content: "say \"hi\"".into(),
            context: String::new(),
            tags: vec![],
        };
        assert_eq!(render_row(&row), "\"say \"\"hi\"\"\"||");
    }

    #[test]
    fn deck_file_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("deck.csv");
        let rows = vec![
            DeckRow {
                content: "Q1".into(),
                context: "c1".into(),
                tags: vec!["high".into(), "doc".into()],
            },
            DeckRow {
                content: "Q2".into(),
                context: String::new(),
                tags: vec!["doc".into()],
            },
        ];
        write_deck(&path, &rows).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "content|context|tags\nQ1|c1|high doc\nQ2||doc\n");
    }
}
