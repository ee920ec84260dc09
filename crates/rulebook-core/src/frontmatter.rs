//! Rule documents: markdown with a small `key: value` frontmatter block.
//!
//! ```text
//! ---
//! fileTypes: ["*.ts", "*.tsx"]
//! folders: ["src/components"]
//! intent: style
//! priority: 5
//! ---
//!
//! Prefer function components.
//! ```
//!
//! This is not YAML. Only `fileTypes`, `folders`, `intent` and `priority` are read,
//! and values are written without escaping, so values containing line breaks,
//! `---`, `"` or `,` do not survive a round trip. `check_representable` rejects
//! them before they are written.

use crate::RuleMetadata;

const DELIMITER: &str = "---";

/// Body and metadata of a document that carried a frontmatter block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRule {
    pub content: String,
    pub metadata: RuleMetadata,
}

/// Parse a rule document. Returns None when the document has no frontmatter
/// or the frontmatter lacks `fileTypes` or `folders`.
pub fn parse(document: &str) -> Option<ParsedRule> {
    if !document.starts_with(DELIMITER) {
        return None;
    }
    let end = DELIMITER.len() + document[DELIMITER.len()..].find(DELIMITER)?;

    let metadata = parse_frontmatter(document[DELIMITER.len()..end].trim())?;
    let content = document[end + DELIMITER.len()..].trim().to_string();

    Some(ParsedRule { content, metadata })
}

/// Serialize a rule body and its metadata into a document that `parse` reads back.
pub fn format(content: &str, metadata: &RuleMetadata) -> String {
    let mut lines = vec![
        format_list("fileTypes", &metadata.file_types),
        format_list("folders", &metadata.folders),
    ];
    if let Some(intent) = metadata.intent.as_deref().filter(|i| !i.trim().is_empty()) {
        lines.push(format!("intent: {}", intent.trim()));
    }
    if let Some(priority) = metadata.priority {
        lines.push(format!("priority: {}", priority));
    }
    format!("{DELIMITER}\n{}\n{DELIMITER}\n\n{}\n", lines.join("\n"), content)
}

/// Characters and sequences that `format` cannot write inside a value without
/// changing what `parse` reads back.
const UNREPRESENTABLE: [&str; 5] = ["\n", "\r", DELIMITER, "\"", ","];

/// Check that every metadata value survives `format` followed by `parse`.
/// Intent is expected to be trimmed already.
pub fn check_representable(metadata: &RuleMetadata) -> Result<(), &'static str> {
    let unrepresentable = |value: &str| UNREPRESENTABLE.iter().any(|s| value.contains(s));

    if metadata.file_types.iter().any(|v| unrepresentable(v)) {
        return Err("fileTypes must not contain line breaks, '---', '\"' or ','");
    }
    if metadata.folders.iter().any(|v| unrepresentable(v)) {
        return Err("folders must not contain line breaks, '---', '\"' or ','");
    }
    if let Some(intent) = &metadata.intent {
        if unrepresentable(intent) {
            return Err("intent must not contain line breaks, '---', '\"' or ','");
        }
        if strip_quotes(intent) != intent {
            return Err("intent must not be wrapped in quotes");
        }
    }
    Ok(())
}

fn format_list(key: &str, items: &[String]) -> String {
    let quoted: Vec<String> = items.iter().map(|item| format!("\"{}\"", item)).collect();
    format!("{}: [{}]", key, quoted.join(", "))
}

#[derive(Default)]
struct Fields {
    file_types: Option<Vec<String>>,
    folders: Option<Vec<String>>,
    intent: Option<String>,
    priority: Option<i64>,
}

fn parse_frontmatter(text: &str) -> Option<RuleMetadata> {
    let mut fields = Fields::default();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "fileTypes" => {
                if let Some(items) = parse_list(value) {
                    fields.file_types = Some(items);
                }
            }
            "folders" => {
                if let Some(items) = parse_list(value) {
                    fields.folders = Some(items);
                }
            }
            "intent" => {
                let intent = strip_quotes(value).trim();
                fields.intent = (!intent.is_empty()).then(|| intent.to_string());
            }
            "priority" => fields.priority = parse_priority(value),
            _ => {}
        }
    }

    Some(RuleMetadata {
        file_types: fields.file_types?,
        folders: fields.folders?,
        intent: fields.intent,
        priority: fields.priority,
    })
}

/// `["a", 'b', c]` -> `[a, b, c]`. None unless the value is bracketed.
fn parse_list(value: &str) -> Option<Vec<String>> {
    let inner = value.strip_prefix('[')?.strip_suffix(']')?.trim();
    if inner.is_empty() {
        return Some(Vec::new());
    }
    Some(
        inner
            .split(',')
            .map(|item| strip_quotes(item.trim()).to_string())
            .collect(),
    )
}

fn strip_quotes(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.starts_with(quote) && value.ends_with(quote) {
            return value.get(1..value.len() - 1).unwrap_or("");
        }
    }
    value
}

/// Reads the leading integer of the value ("12abc" is 12). Anything else is no priority.
fn parse_priority(value: &str) -> Option<i64> {
    let sign_len = usize::from(value.starts_with(['+', '-']));
    let digit_len = value[sign_len..]
        .bytes()
        .take_while(u8::is_ascii_digit)
        .count();
    if digit_len == 0 {
        return None;
    }
    value[..sign_len + digit_len].parse().ok()
}
