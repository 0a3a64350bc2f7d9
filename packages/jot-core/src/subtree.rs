//! Subtree operator (C3): extraction, destination resolution, heading-level
//! renormalization, and missing-heading scaffolding — the pure, I/O-free
//! computations that [`crate::refile`] composes into an actual file mutation.

use crate::ast::{find_subtree_end, shift_heading_levels, Heading};
use crate::selector::{navigate, Selector};

/// A heading and everything up to the next heading of equal or lower level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subtree {
    pub heading: String,
    pub level: u8,
    pub start_offset: usize,
    pub end_offset: usize,
    pub content: Vec<u8>,
}

/// Extracts the subtree rooted at `heading` from `bytes`. `headings` must be the
/// full heading list for `bytes` (as produced by [`crate::ast::find_all_headings`]),
/// since subtree end depends on the headings that follow.
pub fn extract(bytes: &[u8], heading: &Heading, headings: &[Heading]) -> Subtree {
    let end = find_subtree_end(headings, heading, bytes.len());
    Subtree {
        heading: heading.text.clone(),
        level: heading.level,
        start_offset: heading.offset,
        end_offset: end,
        content: bytes[heading.offset..end].to_vec(),
    }
}

/// Where a refiled subtree should land in a destination document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    /// Byte offset in the destination document to splice the prepared content into.
    pub insert_offset: usize,
    /// Heading lines that must be scaffolded in before the subtree itself, outermost first.
    pub create_path: Vec<String>,
    /// The level the refiled subtree's root heading should end up at.
    pub target_level: u8,
}

/// Resolves where `selector` points inside a destination document, computing the
/// insertion offset, any missing heading path that must be scaffolded, and the
/// target level the incoming subtree should be renormalized to.
pub fn resolve_destination(
    dest_bytes: &[u8],
    dest_headings: &[Heading],
    selector: &Selector,
    prepend: bool,
) -> Destination {
    let nav = navigate(dest_headings, selector);

    if let Some(target) = nav.target_heading {
        let target_level = target.level.saturating_add(1);
        let insert_offset = if prepend {
            offset_after_line(dest_bytes, target.offset)
        } else {
            let end = find_subtree_end(dest_headings, &target, dest_bytes.len());
            trim_trailing_newlines(dest_bytes, end)
        };
        return Destination {
            insert_offset,
            create_path: Vec::new(),
            target_level,
        };
    }

    if let Some(parent) = nav.parent_heading {
        let end = find_subtree_end(dest_headings, &parent, dest_bytes.len());
        let insert_offset = trim_trailing_newlines(dest_bytes, end);
        let create_path = nav.missing_segments;
        let target_level = parent
            .level
            .saturating_add(create_path.len() as u8)
            .saturating_add(1);
        return Destination {
            insert_offset,
            create_path,
            target_level,
        };
    }

    // No heading in the destination matches any prefix of the selector at
    // all, so the whole path has to be scaffolded from scratch. Treat
    // `skip_levels` as the (virtual) level of an implicit parent one step
    // above the first scaffolded segment, the same way a real partial-match
    // parent above does it, so the created headings nest strictly under one
    // another instead of landing beside the subtree they're meant to contain.
    let target_level = if selector.segments.is_empty() {
        2
    } else {
        selector
            .skip_levels
            .saturating_add(selector.segments.len() as u8)
            .saturating_add(1)
    };
    Destination {
        insert_offset: dest_bytes.len(),
        create_path: selector.segments.clone(),
        target_level,
    }
}

/// Shifts every heading in `content` by `target_level - subtree_level`.
pub fn renormalize(content: &[u8], subtree_level: u8, target_level: u8) -> Vec<u8> {
    let delta = target_level as i16 - subtree_level as i16;
    shift_heading_levels(content, delta.clamp(i8::MIN as i16, i8::MAX as i16) as i8)
}

/// Generates heading lines for `create_path`, outermost first, each one level
/// deeper than the last, ending one level above `target_level`. The starting
/// level is floored at 1 as a whole (rather than clamping each computed level
/// independently), so a path that would otherwise start below level 1 still
/// comes out as a strictly nested run of headings instead of collapsing
/// several of them onto level 1.
pub fn build_scaffold(create_path: &[String], target_level: u8) -> Vec<u8> {
    let mut out = Vec::new();
    let start_level = target_level.saturating_sub(create_path.len() as u8).max(1);
    for (index, title) in create_path.iter().enumerate() {
        let level = (start_level as usize + index).min(6);
        out.extend(std::iter::repeat(b'#').take(level));
        out.push(b' ');
        out.extend(title.as_bytes());
        out.push(b'\n');
    }
    out
}

/// Returns the offset immediately after the line starting at `line_start`
/// (i.e. just past its terminating `\n`), or the end of the document if that
/// line has no terminating newline.
fn offset_after_line(bytes: &[u8], line_start: usize) -> usize {
    match bytes[line_start..].iter().position(|&b| b == b'\n') {
        Some(rel) => line_start + rel + 1,
        None => bytes.len(),
    }
}

/// Walks `end` backward over trailing `\n` bytes, giving the end of a
/// subtree with its trailing newlines trimmed off.
pub(crate) fn trim_trailing_newlines(bytes: &[u8], end: usize) -> usize {
    let mut e = end;
    while e > 0 && bytes[e - 1] == b'\n' {
        e -= 1;
    }
    e
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::find_all_headings;

    #[test]
    fn extracts_subtree_content_byte_for_byte() {
        let doc = b"# Main Topic\n\nIntro.\n\n## Subtopic\n\nBody.\n\n### Deep\n\nMore.\n\n# Another\n\nX.\n";
        let headings = find_all_headings(doc);
        let subtopic = headings.iter().find(|h| h.text == "Subtopic").unwrap();
        let subtree = extract(doc, subtopic, &headings);
        assert_eq!(
            subtree.content,
            b"## Subtopic\n\nBody.\n\n### Deep\n\nMore.\n"
        );
    }

    #[test]
    fn extraction_round_trips() {
        let doc = b"# A\n\n## B\n\nBody.\n\n## C\n\nMore.\n".to_vec();
        let headings = find_all_headings(&doc);
        let b = headings.iter().find(|h| h.text == "B").unwrap();
        let subtree = extract(&doc, b, &headings);
        let mut rebuilt = doc[..subtree.start_offset].to_vec();
        rebuilt.extend(&subtree.content);
        rebuilt.extend(&doc[subtree.end_offset..]);
        assert_eq!(rebuilt, doc);
    }

    #[test]
    fn scaffold_renders_outermost_first() {
        let scaffold = build_scaffold(&["Archive".to_string(), "Old".to_string()], 4);
        assert_eq!(scaffold, b"## Archive\n### Old\n");
    }

    #[test]
    fn missing_path_builds_scaffold() {
        let dest = b"# Work\n";
        let headings = find_all_headings(dest);
        let selector = Selector::parse("work.md#archive/old").unwrap();
        let destination = resolve_destination(dest, &headings, &selector, false);
        assert_eq!(destination.create_path, vec!["archive", "old"]);
        assert_eq!(destination.target_level, 3);
        assert_eq!(destination.insert_offset, dest.len());

        let scaffold = build_scaffold(&destination.create_path, destination.target_level);
        assert_eq!(scaffold, b"# archive\n## old\n");
    }

    #[test]
    fn scaffold_with_no_headroom_still_nests_instead_of_collapsing() {
        // target_level - create_path.len() would be 0 here; every level must
        // still come out strictly increasing rather than every entry clamping
        // down to the same level-1 heading.
        let scaffold = build_scaffold(&["Archive".to_string(), "Old".to_string()], 2);
        assert_eq!(scaffold, b"# Archive\n## Old\n");
    }

    #[test]
    fn destination_resolution_targets_child_level_of_matched_heading() {
        let dest = b"# Work\n\n## Projects\n\nExisting.\n";
        let headings = find_all_headings(dest);
        let selector = Selector::parse("dst.md#projects").unwrap();
        let destination = resolve_destination(dest, &headings, &selector, false);
        assert_eq!(destination.target_level, 3);
        assert!(destination.create_path.is_empty());
    }
}
