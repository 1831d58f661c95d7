//! Line-oriented settings codec.
//!
//! Format: `key = "value"` per line, `;` or `#` comment lines, blank lines.
//! Section headers are tolerated and ignored. Only string values exist.

use std::collections::HashMap;
use tracing::warn;

use crate::store::SettingDef;

const RULE: &str = "; ------------------------------";

const CAUTION: &str = "Adjust to your needs. Caution: Syntax errors and other breaking changes \
might result in the whole file being overwritten by default values! You may want to backup \
this file before changing.";

/// Parse settings text into a key/value map. Malformed lines are skipped; a
/// key that appears twice keeps its last value.
pub fn parse(content: &str) -> HashMap<String, String> {
    let mut values = HashMap::new();

    for (index, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }
        if line.starts_with('[') && line.ends_with(']') {
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            warn!("Ignoring settings line {}: {}", index + 1, line);
            continue;
        };

        let key = key.trim();
        if key.is_empty() || key.contains(char::is_whitespace) {
            warn!("Ignoring settings line {}: invalid key", index + 1);
            continue;
        }

        match parse_value(value.trim()) {
            Some(value) => {
                values.insert(key.to_string(), value);
            }
            None => warn!("Ignoring settings line {}: unterminated quote", index + 1),
        }
    }

    values
}

fn parse_value(raw: &str) -> Option<String> {
    let Some(quoted) = raw.strip_prefix('"') else {
        // Unquoted: anything after ';' is a comment
        let value = raw.split(';').next().unwrap_or("");
        return Some(value.trim().to_string());
    };

    let mut value = String::with_capacity(quoted.len());
    let mut chars = quoted.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => return Some(value),
            '\\' => match chars.next()? {
                'n' => value.push('\n'),
                other => value.push(other),
            },
            other => value.push(other),
        }
    }
    None
}

fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            other => quoted.push(other),
        }
    }
    quoted.push('"');
    quoted
}

/// Render every declared key in declaration order, each preceded by its
/// description when one is registered.
pub fn render(header: &str, defs: &[SettingDef], values: &HashMap<&'static str, String>) -> String {
    let mut content = format!("; {}. {}\n{}\n\n", header, CAUTION, RULE);

    for def in defs {
        if !def.description.is_empty() {
            content.push_str("; ");
            content.push_str(def.description);
            content.push('\n');
        }
        let value = values.get(def.key).map(String::as_str).unwrap_or(def.default);
        content.push_str(def.key);
        content.push_str(" = ");
        content.push_str(&quote(value));
        content.push_str("\n\n");
    }

    content
}
