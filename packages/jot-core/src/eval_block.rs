//! Eval-block parser (C5): finds `<eval .../>` tags immediately followed by a
//! fenced code block, and computes the content hash the approval store keys
//! block approvals on.

use std::collections::BTreeMap;

use regex::Regex;

use crate::ast::{is_fence_marker, open_fence_marker};

/// A single `<eval .../>` tag paired with the fenced code block it precedes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalBlock {
    pub name: Option<String>,
    pub lang: String,
    /// Every attribute on the tag, including `name` and `lang`.
    pub params: BTreeMap<String, String>,
    pub code: String,
    /// Byte offset of the `<eval` tag's opening `<`.
    pub tag_offset: usize,
    /// Byte offset immediately past the closing fence line.
    pub block_end: usize,
}

impl EvalBlock {
    /// The content hash the approval store keys this block's approval on:
    /// BLAKE3 over `lang`, a null byte, the canonicalized params, a null byte,
    /// and the code, where canonicalization joins `key=value` pairs (params
    /// sorted by key) with `\n`.
    pub fn content_hash(&self) -> String {
        hash_block(&self.lang, &self.params, &self.code)
    }
}

/// Computes the content hash for a block's constituent parts without
/// requiring a parsed [`EvalBlock`].
pub fn hash_block(lang: &str, params: &BTreeMap<String, String>, code: &str) -> String {
    let canonical = params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("\n");

    let mut hasher = blake3::Hasher::new();
    hasher.update(lang.as_bytes());
    hasher.update(&[0u8]);
    hasher.update(canonical.as_bytes());
    hasher.update(&[0u8]);
    hasher.update(code.as_bytes());
    hasher.finalize().to_hex().to_string()
}

fn parse_attributes(attrs: &str) -> BTreeMap<String, String> {
    let re = Regex::new(r#"([A-Za-z_][A-Za-z0-9_-]*)\s*=\s*"([^"]*)""#)
        .expect("static regex is valid");
    re.captures_iter(attrs)
        .map(|cap| (cap[1].to_string(), cap[2].to_string()))
        .collect()
}

/// Finds every `<eval .../>` tag in `bytes` that is immediately followed
/// (modulo blank lines) by a fenced code block, returning each as an
/// [`EvalBlock`]. A tag with no following fence is silently skipped: it is
/// not an eval block, just a stray inline tag.
pub fn find_eval_blocks(bytes: &[u8]) -> Vec<EvalBlock> {
    let text = std::str::from_utf8(bytes).unwrap_or_default();
    let tag_re = Regex::new(r"^<eval\b([^>]*?)/?>\s*$").expect("static regex is valid");

    let mut blocks = Vec::new();
    let mut pending: Option<(usize, BTreeMap<String, String>)> = None;
    let mut fence: Option<(char, usize, usize, usize, String, BTreeMap<String, String>)> = None;
    let mut offset = 0usize;

    for raw_line in text.split_inclusive('\n') {
        let line = raw_line.strip_suffix('\n').unwrap_or(raw_line);
        let line = line.strip_suffix('\r').unwrap_or(line);
        let trimmed = line.trim();
        let line_len = raw_line.len();

        if let Some((fence_char, fence_len, tag_offset, code_start, lang, attrs)) = fence.take() {
            if is_fence_marker(trimmed, fence_char, fence_len) {
                let code = text[code_start..offset].to_string();
                let name = attrs.get("name").cloned();
                blocks.push(EvalBlock {
                    name,
                    lang,
                    params: attrs,
                    code,
                    tag_offset,
                    block_end: offset + line_len,
                });
            } else {
                fence = Some((fence_char, fence_len, tag_offset, code_start, lang, attrs));
            }
            offset += line_len;
            continue;
        }

        if let Some((tag_offset, attrs)) = pending.take() {
            if trimmed.is_empty() {
                pending = Some((tag_offset, attrs));
            } else if let Some((fence_char, fence_len)) = open_fence_marker(trimmed) {
                let info = trimmed[fence_len..].trim();
                let lang = info.split_whitespace().next().unwrap_or("").to_string();
                fence = Some((fence_char, fence_len, tag_offset, offset + line_len, lang, attrs));
            }
            offset += line_len;
            continue;
        }

        if let Some(caps) = tag_re.captures(trimmed) {
            let attrs = parse_attributes(&caps[1]);
            pending = Some((offset, attrs));
        }

        offset += line_len;
    }

    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_single_eval_block() {
        let doc = "# Build\n\n<eval name=\"hello\" lang=\"python\" />\n```python\nprint(\"hi\")\n```\n";
        let blocks = find_eval_blocks(doc.as_bytes());
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].name.as_deref(), Some("hello"));
        assert_eq!(blocks[0].lang, "python");
        assert_eq!(blocks[0].code, "print(\"hi\")\n");
    }

    #[test]
    fn tag_without_following_fence_is_not_a_block() {
        let doc = "<eval name=\"orphan\" lang=\"bash\" />\n\nSome prose.\n";
        assert!(find_eval_blocks(doc.as_bytes()).is_empty());
    }

    #[test]
    fn blank_lines_between_tag_and_fence_are_tolerated() {
        let doc = "<eval lang=\"bash\" />\n\n\n```bash\necho hi\n```\n";
        let blocks = find_eval_blocks(doc.as_bytes());
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].code, "echo hi\n");
    }

    #[test]
    fn hash_changes_when_code_changes_but_not_when_params_reorder() {
        let mut params_a = BTreeMap::new();
        params_a.insert("name".to_string(), "x".to_string());
        params_a.insert("lang".to_string(), "bash".to_string());

        let mut params_b = BTreeMap::new();
        params_b.insert("lang".to_string(), "bash".to_string());
        params_b.insert("name".to_string(), "x".to_string());

        let h1 = hash_block("bash", &params_a, "echo hi\n");
        let h2 = hash_block("bash", &params_b, "echo hi\n");
        assert_eq!(h1, h2);

        let h3 = hash_block("bash", &params_a, "echo bye\n");
        assert_ne!(h1, h3);
    }
}
