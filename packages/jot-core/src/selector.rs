//! Path resolver (C2).
//!
//! Parses `file#seg1/seg2/...` selectors and matches them against the heading
//! paths produced by [`crate::ast::find_all_headings`], using case-insensitive
//! substring matching with consecutive (no-gap) segments and skip-levels.

use crate::ast::Heading;
use crate::error::Error;

/// A parsed `file#[/]*seg(/seg)*` selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    /// Everything before the first `#` (or the whole string, if there is no `#`).
    pub file: String,
    /// Number of consecutive leading `/` characters in the fragment. Instructs the
    /// matcher to ignore that many leading levels of a heading's path before
    /// attempting to match.
    pub skip_levels: u8,
    /// The remaining `/`-separated tokens after the skip-level slashes.
    pub segments: Vec<String>,
}

impl Selector {
    /// Parses a selector string: the file part is everything
    /// before the first `#`; the fragment's leading run of `/` becomes
    /// `skip_levels`, and the remainder is split on `/` into `segments`. An empty
    /// fragment (no `#`, or `#` followed by nothing) means the file itself, with
    /// no segments. Empty segments within the body (e.g. `a//b`) are errors.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let (file, fragment) = match raw.split_once('#') {
            Some((file, fragment)) => (file.to_string(), fragment),
            None => (raw.to_string(), ""),
        };

        let skip_levels = fragment.chars().take_while(|&c| c == '/').count();
        let remainder = &fragment[skip_levels..];

        let segments = if remainder.is_empty() {
            Vec::new()
        } else {
            remainder
                .split('/')
                .map(|segment| {
                    if segment.is_empty() {
                        Err(Error::selector(raw, "empty segment in selector fragment"))
                    } else {
                        Ok(segment.to_string())
                    }
                })
                .collect::<Result<Vec<_>, _>>()?
        };

        if skip_levels > u8::MAX as usize {
            return Err(Error::selector(raw, "too many leading skip-level slashes"));
        }

        Ok(Self {
            file,
            skip_levels: skip_levels as u8,
            segments,
        })
    }
}

/// The outcome of navigating a selector's segments against a document's headings.
#[derive(Debug, Clone, Default)]
pub struct NavigationResult {
    /// Set when all of `selector.segments` matched consecutively, ending on this heading.
    pub target_heading: Option<Heading>,
    /// Set when only a prefix of `selector.segments` matched; this is the deepest
    /// heading that prefix ends on.
    pub parent_heading: Option<Heading>,
    /// The prefix of `selector.segments` that was matched (equal to all of them,
    /// when `target_heading` is set).
    pub found_segments: Vec<String>,
    /// The suffix of `selector.segments` left unmatched (empty when `target_heading` is set).
    pub missing_segments: Vec<String>,
}

/// Navigates `selector` against `headings`: for each heading, find the best
/// starting position `p >= skip_levels` in its path from which `segments`
/// match consecutively (case-insensitive substring) as far as possible.
/// Headings that match all segments are full matches; the deepest one wins
/// full-match ties, and document order breaks ties of equal depth. Absent a
/// full match, the heading with the longest partial match becomes
/// `parent_heading` (ties broken the same way).
///
/// An empty `segments` list names the document itself — an empty fragment
/// after `#` means the file itself, or its top level — so it never matches a
/// heading.
pub fn navigate(headings: &[Heading], selector: &Selector) -> NavigationResult {
    if selector.segments.is_empty() {
        return NavigationResult::default();
    }

    let skip = selector.skip_levels as usize;
    let mut best_full: Option<(usize, usize)> = None; // (depth, heading index)
    let mut best_partial: Option<(usize, usize, usize)> = None; // (match_len, depth, heading index)

    for (index, heading) in headings.iter().enumerate() {
        let match_len = best_consecutive_match(&heading.path, skip, &selector.segments);
        if match_len == 0 {
            continue;
        }
        let depth = heading.path.len();

        if match_len == selector.segments.len() {
            let should_replace = match best_full {
                Some((best_depth, _)) => depth > best_depth,
                None => true,
            };
            if should_replace {
                best_full = Some((depth, index));
            }
        } else {
            let should_replace = match best_partial {
                Some((best_len, best_depth, _)) => {
                    match_len > best_len || (match_len == best_len && depth > best_depth)
                }
                None => true,
            };
            if should_replace {
                best_partial = Some((match_len, depth, index));
            }
        }
    }

    if let Some((_, index)) = best_full {
        return NavigationResult {
            target_heading: Some(headings[index].clone()),
            parent_heading: None,
            found_segments: selector.segments.clone(),
            missing_segments: Vec::new(),
        };
    }

    if let Some((match_len, _, index)) = best_partial {
        return NavigationResult {
            target_heading: None,
            parent_heading: Some(headings[index].clone()),
            found_segments: selector.segments[..match_len].to_vec(),
            missing_segments: selector.segments[match_len..].to_vec(),
        };
    }

    NavigationResult {
        target_heading: None,
        parent_heading: None,
        found_segments: Vec::new(),
        missing_segments: selector.segments.clone(),
    }
}

/// For the path `path`, finds the maximum `k` such that there exists some start
/// position `p >= skip` with `segments[i]` a case-insensitive substring of
/// `path[p + i]` for every `i` in `[0, k)`.
fn best_consecutive_match(path: &[String], skip: usize, segments: &[String]) -> usize {
    if skip >= path.len() {
        return 0;
    }

    let mut best = 0;
    for start in skip..path.len() {
        let mut matched = 0;
        while start + matched < path.len() && matched < segments.len() {
            let haystack = path[start + matched].to_lowercase();
            let needle = segments[matched].to_lowercase();
            if haystack.contains(&needle) {
                matched += 1;
            } else {
                break;
            }
        }
        if matched > best {
            best = matched;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::find_all_headings;

    #[test]
    fn parses_plain_file_with_no_fragment() {
        let selector = Selector::parse("inbox.md").unwrap();
        assert_eq!(selector.file, "inbox.md");
        assert_eq!(selector.skip_levels, 0);
        assert!(selector.segments.is_empty());
    }

    #[test]
    fn parses_segments_and_skip_levels() {
        let selector = Selector::parse("work.md#//archive/old").unwrap();
        assert_eq!(selector.file, "work.md");
        assert_eq!(selector.skip_levels, 2);
        assert_eq!(selector.segments, vec!["archive", "old"]);
    }

    #[test]
    fn rejects_empty_inner_segment() {
        let err = Selector::parse("file.md#a//b").unwrap_err();
        assert!(matches!(err, Error::Selector { .. }));
    }

    #[test]
    fn matches_case_insensitive_substrings() {
        let doc = b"# Test Heading\n\n## Two - ASDF\n\nBody.\n";
        let headings = find_all_headings(doc);
        let selector = Selector::parse("f.md#test heading/two - asdf").unwrap();
        let result = navigate(&headings, &selector);
        assert!(result.target_heading.is_some());
        assert_eq!(result.target_heading.unwrap().text, "Two - ASDF");
    }

    #[test]
    fn deepest_full_match_wins_document_order_breaks_ties() {
        let doc = b"# Projects\n\n## Foo\n\n# Other\n\n## Projects\n\n### Foo\n";
        let headings = find_all_headings(doc);
        let selector = Selector::parse("f.md#foo").unwrap();
        let result = navigate(&headings, &selector);
        // The nested "### Foo" under "Other > Projects" is deeper than the sibling "## Foo".
        let target = result.target_heading.unwrap();
        assert_eq!(target.path, vec!["Other", "Projects", "Foo"]);
    }

    #[test]
    fn partial_match_reports_missing_suffix() {
        let doc = b"# Work\n";
        let headings = find_all_headings(doc);
        let selector = Selector::parse("work.md#work/archive/old").unwrap();
        let result = navigate(&headings, &selector);
        assert!(result.target_heading.is_none());
        let parent = result.parent_heading.unwrap();
        assert_eq!(parent.text, "Work");
        assert_eq!(result.missing_segments, vec!["archive", "old"]);
    }

    #[test]
    fn no_match_at_all_reports_full_missing_list() {
        let doc = b"# Unrelated\n";
        let headings = find_all_headings(doc);
        let selector = Selector::parse("work.md#archive/old").unwrap();
        let result = navigate(&headings, &selector);
        assert!(result.target_heading.is_none());
        assert!(result.parent_heading.is_none());
        assert_eq!(result.missing_segments, vec!["archive", "old"]);
    }

    #[test]
    fn empty_segments_selects_the_document_itself() {
        let doc = b"# Work\n\n## Projects\n";
        let headings = find_all_headings(doc);
        let selector = Selector::parse("work.md#").unwrap();
        let result = navigate(&headings, &selector);
        assert!(result.target_heading.is_none());
        assert!(result.parent_heading.is_none());
    }
}
