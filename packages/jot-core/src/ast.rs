//! Markdown AST & offset index (C1).
//!
//! This is deliberately not a tree: every other component in this crate operates
//! on raw document bytes and byte offsets directly, so the only thing this module
//! produces is a flat, ordered list of [`Heading`]s annotated with their path and
//! byte offset, plus the handful of byte-range queries built on top of that list
//! (subtree end lookup, heading-level shifting). Fence tracking is shared by both,
//! since neither heading recognition nor the level-shift transform may touch a
//! line that happens to fall inside a fenced code block.

/// A single ATX heading (`^#{1..6} `) found while scanning a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading {
    /// Heading depth, `1..=6`.
    pub level: u8,
    /// The heading's text, trimmed, with the leading `#`s and the following space removed.
    pub text: String,
    /// Byte offset of the leading `#` on the heading's line.
    pub offset: usize,
    /// Ancestor path from the document root down to and including this heading.
    pub path: Vec<String>,
}

/// One line of a document together with the byte offset its first byte sits at,
/// and whether that line falls inside a fenced code block.
pub(crate) struct ScannedLine<'a> {
    pub(crate) start: usize,
    pub(crate) text: &'a str,
    pub(crate) in_fence: bool,
}

/// Walks `bytes` line by line, tracking entry/exit of fenced code blocks so that
/// callers can skip lines that are merely quoted inside a fence (e.g. a line
/// beginning with `#` inside a ```` ``` ```` block is not a heading).
///
/// A fence opens on a line whose trimmed content starts with a run of three or
/// more backticks or tildes, and closes on the next line whose trimmed content is
/// a run of the same character at least as long.
pub(crate) fn scan_lines(bytes: &[u8]) -> Vec<ScannedLine<'_>> {
    let text = std::str::from_utf8(bytes).unwrap_or_default();
    let mut lines = Vec::new();
    let mut fence: Option<(char, usize)> = None;
    let mut offset = 0usize;

    for raw_line in text.split_inclusive('\n') {
        let line = raw_line.strip_suffix('\n').unwrap_or(raw_line);
        let line = line.strip_suffix('\r').unwrap_or(line);
        let trimmed = line.trim_start();
        let in_fence_before = fence.is_some();

        if let Some((fence_char, fence_len)) = fence {
            if is_fence_marker(trimmed, fence_char, fence_len) {
                fence = None;
            }
        } else if let Some((fence_char, fence_len)) = open_fence_marker(trimmed) {
            fence = Some((fence_char, fence_len));
        }

        lines.push(ScannedLine {
            start: offset,
            text: line,
            in_fence: in_fence_before,
        });
        offset += raw_line.len();
    }

    lines
}

pub(crate) fn open_fence_marker(trimmed: &str) -> Option<(char, usize)> {
    let fence_char = trimmed.chars().next()?;
    if fence_char != '`' && fence_char != '~' {
        return None;
    }
    let run_len = trimmed.chars().take_while(|&c| c == fence_char).count();
    if run_len >= 3 {
        Some((fence_char, run_len))
    } else {
        None
    }
}

pub(crate) fn is_fence_marker(trimmed: &str, fence_char: char, min_len: usize) -> bool {
    let run_len = trimmed.chars().take_while(|&c| c == fence_char).count();
    run_len >= min_len && trimmed.chars().take(run_len).all(|c| c == fence_char)
}

/// Checks whether `line` is an ATX heading (`^#{1..6} `), returning its level and
/// trimmed text if so.
fn parse_atx_heading(line: &str) -> Option<(u8, String)> {
    let hashes = line.chars().take_while(|&c| c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &line[hashes..];
    // ATX headings require a space (or end of line, for an empty heading) after the hashes.
    if !rest.is_empty() && !rest.starts_with(' ') && !rest.starts_with('\t') {
        return None;
    }
    Some((hashes as u8, rest.trim().to_string()))
}

/// Walks the document in order, maintaining a level-indexed stack, and returns
/// every heading found with its path populated: on a new heading at level
/// *L*, the stack is popped to depth *L*-1, the heading's text pushed, and
/// the resulting stack snapshot recorded as its path.
pub fn find_all_headings(bytes: &[u8]) -> Vec<Heading> {
    let mut headings = Vec::new();
    let mut stack: Vec<String> = Vec::new();

    for line in scan_lines(bytes) {
        if line.in_fence {
            continue;
        }
        let Some((level, text)) = parse_atx_heading(line.text) else {
            continue;
        };

        let depth = level as usize;
        if stack.len() >= depth {
            stack.truncate(depth - 1);
        }
        stack.push(text.clone());

        headings.push(Heading {
            level,
            text,
            offset: line.start,
            path: stack.clone(),
        });
    }

    headings
}

/// Given a heading already present in `headings` (by offset), returns the byte
/// offset of the first subsequent heading with `level <= heading.level`, or the
/// length of the document if there is none.
pub fn find_subtree_end(headings: &[Heading], heading: &Heading, doc_len: usize) -> usize {
    let Some(index) = headings.iter().position(|h| h.offset == heading.offset) else {
        return doc_len;
    };
    headings[index + 1..]
        .iter()
        .find(|h| h.level <= heading.level)
        .map(|h| h.offset)
        .unwrap_or(doc_len)
}

/// Shifts every ATX heading's level by `delta`, clamping the result to `[1, 6]`.
/// Lines inside fenced code blocks, and non-heading lines, pass through unchanged.
pub fn shift_heading_levels(bytes: &[u8], delta: i8) -> Vec<u8> {
    if delta == 0 {
        return bytes.to_vec();
    }

    let text = std::str::from_utf8(bytes).unwrap_or_default();
    let mut out = String::with_capacity(text.len());
    let mut fence: Option<(char, usize)> = None;

    for raw_line in text.split_inclusive('\n') {
        let (line, newline) = match raw_line.strip_suffix('\n') {
            Some(l) => (l, "\n"),
            None => (raw_line, ""),
        };
        let trimmed = line.trim_start();
        let was_in_fence = fence.is_some();

        if let Some((fence_char, fence_len)) = fence {
            if is_fence_marker(trimmed, fence_char, fence_len) {
                fence = None;
            }
        } else if let Some((fence_char, fence_len)) = open_fence_marker(trimmed) {
            fence = Some((fence_char, fence_len));
        }

        if !was_in_fence {
            if let Some((level, rest)) = parse_atx_heading(line) {
                let new_level = (level as i8 + delta).clamp(1, 6) as usize;
                out.push_str(&"#".repeat(new_level));
                if !rest.is_empty() {
                    out.push(' ');
                    out.push_str(&rest);
                }
                out.push_str(newline);
                continue;
            }
        }

        out.push_str(line);
        out.push_str(newline);
    }

    out.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_headings_and_paths() {
        let doc = b"# Main Topic\n\nIntro.\n\n## Subtopic\n\nBody.\n\n### Deep\n\nMore.\n\n# Another\n\nX.\n";
        let headings = find_all_headings(doc);
        assert_eq!(headings.len(), 4);
        assert_eq!(headings[0].path, vec!["Main Topic"]);
        assert_eq!(headings[1].path, vec!["Main Topic", "Subtopic"]);
        assert_eq!(headings[2].path, vec!["Main Topic", "Subtopic", "Deep"]);
        assert_eq!(headings[3].path, vec!["Another"]);
    }

    #[test]
    fn ignores_hashes_inside_fences() {
        let doc = b"# Real\n\n```\n# not a heading\n```\n\n## Also Real\n";
        let headings = find_all_headings(doc);
        assert_eq!(headings.len(), 2);
        assert_eq!(headings[0].text, "Real");
        assert_eq!(headings[1].text, "Also Real");
    }

    #[test]
    fn subtree_end_stops_at_equal_or_lower_level() {
        let doc = b"# A\n\n## B\n\nBody.\n\n## C\n\n# D\n";
        let headings = find_all_headings(doc);
        let b = &headings[1];
        let end = find_subtree_end(&headings, b, doc.len());
        assert_eq!(&doc[end..], b"## C\n\n# D\n");
    }

    #[test]
    fn subtree_end_is_doc_len_when_no_following_heading() {
        let doc = b"# A\n\nBody.\n";
        let headings = find_all_headings(doc);
        let end = find_subtree_end(&headings, &headings[0], doc.len());
        assert_eq!(end, doc.len());
    }

    #[test]
    fn shift_clamps_and_skips_fences() {
        let doc = b"# One\n\n```\n# inside fence\n```\n\n###### Six\n";
        let shifted = shift_heading_levels(doc, 2);
        let shifted_str = std::str::from_utf8(&shifted).unwrap();
        assert!(shifted_str.starts_with("### One\n"));
        assert!(shifted_str.contains("# inside fence\n"));
        assert!(shifted_str.contains("###### Six\n"));
    }

    #[test]
    fn shift_is_an_involution() {
        let doc = b"## A\n\nBody.\n\n### B\n\nMore.\n";
        let up = shift_heading_levels(doc, 2);
        let back = shift_heading_levels(&up, -2);
        assert_eq!(back, doc);
    }
}
