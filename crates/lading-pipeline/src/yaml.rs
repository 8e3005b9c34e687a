//! Byte-preserving edits of a single YAML scalar.
//!
//! Re-serializing a document through a YAML library would reorder keys and
//! drop comments, so the edit is done on the text: the value span of the
//! addressed key is replaced and every other byte is left as it was.

use lading_core::{PipelineError, Result};

/// Outcome of [`set_scalar`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalarEdit {
    pub content: String,
    /// The value before the edit, without quotes.
    pub previous: String,
}

/// Replace the scalar at dotted `key_path` (e.g. `image.tag`) with `value`.
///
/// Block mappings only; keys inside sequences are not addressed. A quoted
/// value keeps its quote style. Fails with `ConfigField` when the key is
/// absent or does not hold an inline scalar.
pub fn set_scalar(content: &str, key_path: &str, value: &str) -> Result<ScalarEdit> {
    let wanted: Vec<&str> = key_path.split('.').filter(|s| !s.is_empty()).collect();
    if wanted.is_empty() {
        return Err(PipelineError::ConfigField("empty key path".to_string()));
    }

    let mut stack: Vec<(usize, String)> = Vec::new();
    let mut offset = 0usize;

    for line in content.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();

        let body = line.trim_end_matches(['\n', '\r']);
        let trimmed = body.trim_start_matches(' ');
        let indent = body.len() - trimmed.len();

        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if trimmed == "---" || trimmed.starts_with("--- ") {
            stack.clear();
            continue;
        }

        while stack.last().is_some_and(|(i, _)| *i >= indent) {
            stack.pop();
        }

        if trimmed.starts_with("- ") || trimmed == "-" {
            // Sequence item: nothing below it is addressable.
            stack.push((indent, "-".to_string()));
            continue;
        }

        let Some((key, after_colon)) = split_key(trimmed) else {
            continue;
        };
        stack.push((indent, key.clone()));

        let matches = stack.len() == wanted.len()
            && stack.iter().zip(&wanted).all(|((_, k), w)| k == w);
        if !matches {
            continue;
        }

        let value_start_in_trimmed = trimmed.len() - after_colon.len();
        let (lead, span) = scalar_span(after_colon);
        let raw = &after_colon[lead..lead + span];
        if raw.is_empty() || raw.starts_with(['|', '>', '{', '[', '&', '*']) {
            return Err(PipelineError::ConfigField(format!(
                "'{key_path}' does not hold an inline scalar"
            )));
        }

        let (previous, replacement) = requote(raw, value);
        let abs_start = line_start + indent + value_start_in_trimmed + lead;
        let abs_end = abs_start + span;

        let mut out = String::with_capacity(content.len() + value.len());
        out.push_str(&content[..abs_start]);
        out.push_str(&replacement);
        out.push_str(&content[abs_end..]);
        return Ok(ScalarEdit {
            content: out,
            previous,
        });
    }

    Err(PipelineError::ConfigField(format!(
        "'{key_path}' not found"
    )))
}

/// Split `key: rest` into the unquoted key and everything after the colon.
fn split_key(trimmed: &str) -> Option<(String, &str)> {
    let (key, rest) = if let Some(q) = trimmed.chars().next().filter(|c| *c == '"' || *c == '\'') {
        let close = trimmed[1..].find(q)? + 1;
        let rest = trimmed[close + 1..].strip_prefix(':')?;
        (trimmed[1..close].to_string(), rest)
    } else {
        let idx = trimmed
            .char_indices()
            .find(|(i, c)| {
                *c == ':' && matches!(trimmed[i + 1..].chars().next(), None | Some(' ') | Some('\t'))
            })
            .map(|(i, _)| i)?;
        (trimmed[..idx].trim_end().to_string(), &trimmed[idx + 1..])
    };
    Some((key, rest))
}

/// Leading whitespace length and length of the scalar after the colon,
/// excluding any trailing comment and whitespace.
fn scalar_span(after_colon: &str) -> (usize, usize) {
    let lead = after_colon.len() - after_colon.trim_start().len();
    let value = &after_colon[lead..];

    let end = match value.chars().next() {
        Some(q @ ('"' | '\'')) => value[1..].find(q).map(|i| i + 2).unwrap_or(value.len()),
        _ => value
            .find(" #")
            .or_else(|| value.find("\t#"))
            .unwrap_or(value.len()),
    };
    (lead, value[..end].trim_end().len())
}

/// Unquoted previous value and the replacement in the same quote style.
fn requote(raw: &str, value: &str) -> (String, String) {
    match raw.chars().next() {
        Some(q @ ('"' | '\'')) if raw.len() >= 2 && raw.ends_with(q) => (
            raw[1..raw.len() - 1].to_string(),
            format!("{q}{value}{q}"),
        ),
        _ => (raw.to_string(), value.to_string()),
    }
}

/// Read the scalar at `key_path` through a real YAML parser.
pub fn read_scalar(content: &str, key_path: &str) -> Result<Option<String>> {
    let doc: serde_yaml::Value = serde_yaml::from_str(content)
        .map_err(|e| PipelineError::ConfigField(format!("document is not valid YAML: {e}")))?;

    let mut node = &doc;
    for key in key_path.split('.').filter(|s| !s.is_empty()) {
        match node.get(key) {
            Some(next) => node = next,
            None => return Ok(None),
        }
    }
    Ok(match node {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALUES: &str = "\
# Web frontend
replicaCount: 3
image:
  repository: registry.local/shop/web   # pinned
  tag: 2.3.0-0f0f0f0 # managed by lading
  pullPolicy: IfNotPresent
sidecar:
  image:
    tag: 1.0.0
";

    #[test]
    fn test_replaces_only_the_addressed_value() {
        let edit = set_scalar(VALUES, "image.tag", "2.3.1-a1b2c3d").unwrap();
        assert_eq!(edit.previous, "2.3.0-0f0f0f0");
        assert_eq!(
            edit.content,
            VALUES.replace("tag: 2.3.0-0f0f0f0 #", "tag: 2.3.1-a1b2c3d #")
        );
    }

    #[test]
    fn test_nested_path_is_exact() {
        let edit = set_scalar(VALUES, "sidecar.image.tag", "1.0.1").unwrap();
        assert_eq!(edit.previous, "1.0.0");
        assert!(edit.content.contains("  tag: 2.3.0-0f0f0f0 # managed by lading"));
        assert!(edit.content.ends_with("    tag: 1.0.1\n"));
    }

    #[test]
    fn test_quote_style_is_kept() {
        let doc = "image:\n  tag: \"1.0.0-abcdef0\"\n";
        let edit = set_scalar(doc, "image.tag", "1.0.1-1234567").unwrap();
        assert_eq!(edit.content, "image:\n  tag: \"1.0.1-1234567\"\n");
        assert_eq!(edit.previous, "1.0.0-abcdef0");

        let doc = "image:\n  'tag': '1.0.0'\n";
        let edit = set_scalar(doc, "image.tag", "2.0.0").unwrap();
        assert_eq!(edit.content, "image:\n  'tag': '2.0.0'\n");
    }

    #[test]
    fn test_crlf_line_endings_preserved() {
        let doc = "image:\r\n  tag: 1.0.0\r\n  pullPolicy: Always\r\n";
        let edit = set_scalar(doc, "image.tag", "1.0.1").unwrap();
        assert_eq!(edit.content, "image:\r\n  tag: 1.0.1\r\n  pullPolicy: Always\r\n");
    }

    #[test]
    fn test_missing_key_is_an_error() {
        let err = set_scalar(VALUES, "image.digest", "x").unwrap_err();
        assert!(matches!(err, PipelineError::ConfigField(_)));
    }

    #[test]
    fn test_mapping_value_is_an_error() {
        let err = set_scalar(VALUES, "image", "x").unwrap_err();
        assert!(err.to_string().contains("inline scalar"));
    }

    #[test]
    fn test_sequence_items_are_not_addressed() {
        let doc = "containers:\n  - name: web\n    tag: 1.0.0\ntag: 9.9.9\n";
        let edit = set_scalar(doc, "tag", "1.0.1").unwrap();
        assert_eq!(edit.content, "containers:\n  - name: web\n    tag: 1.0.0\ntag: 1.0.1\n");
    }

    #[test]
    fn test_read_scalar_agrees_with_edit() {
        let edit = set_scalar(VALUES, "image.tag", "2.3.1-a1b2c3d").unwrap();
        assert_eq!(
            read_scalar(&edit.content, "image.tag").unwrap().as_deref(),
            Some("2.3.1-a1b2c3d")
        );
        assert_eq!(read_scalar(VALUES, "image.missing").unwrap(), None);
    }
}
