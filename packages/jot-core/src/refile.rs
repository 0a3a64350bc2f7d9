//! Refile executor (C4): moves a subtree from one heading to another, within a
//! single document or across two, composing [`crate::ast`] and [`crate::subtree`]
//! into an actual file mutation.

use std::path::{Path, PathBuf};

use regex::Regex;

use crate::ast::find_all_headings;
use crate::error::Error;
use crate::fsutil::write_atomic;
use crate::selector::{navigate, Selector};
use crate::subtree::{build_scaffold, extract, renormalize, resolve_destination};

/// A single refile operation: move the subtree `source_selector` names in
/// `source_path` to just inside (or after) `dest_selector` in `dest_path`.
#[derive(Debug, Clone)]
pub struct RefileRequest {
    pub source_path: PathBuf,
    pub source_selector: Selector,
    pub dest_path: PathBuf,
    pub dest_selector: Selector,
    /// Insert right after the destination heading's own line rather than at the
    /// end of its subtree.
    pub prepend: bool,
    /// Replaces the extracted subtree's content before renormalization and
    /// insertion, when set. This is how a `pre-refile` hook's transformed-
    /// content channel takes effect: the hook's stdout stands in for what
    /// was actually read from `source_path`.
    pub content_override: Option<Vec<u8>>,
}

/// Executes a refile request, reading and writing the underlying file(s)
/// directly. Cross-file refiles read-mutate-write the source, then the
/// destination; a refile within a single file is a single offset-adjusted
/// splice so the same read of the document drives both ends.
pub fn execute(request: &RefileRequest) -> Result<(), Error> {
    if same_file(&request.source_path, &request.dest_path) {
        execute_same_file(request)
    } else {
        execute_cross_file(request)
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

fn execute_cross_file(request: &RefileRequest) -> Result<(), Error> {
    let source_bytes = std::fs::read(&request.source_path)?;
    let source_headings = find_all_headings(&source_bytes);
    let source_nav = navigate(&source_headings, &request.source_selector);
    let target = source_nav.target_heading.ok_or_else(|| Error::NotFound {
        file: request.source_path.display().to_string(),
        selector: format!("{:?}", request.source_selector.segments),
    })?;

    let subtree = extract(&source_bytes, &target, &source_headings);
    let content = request.content_override.as_deref().unwrap_or(&subtree.content);

    let mut remaining = source_bytes[..subtree.start_offset].to_vec();
    remaining.extend(&source_bytes[subtree.end_offset..]);
    let remaining = normalize_spacing(&remaining);
    write_atomic(&request.source_path, &remaining)?;

    let dest_bytes = std::fs::read(&request.dest_path).unwrap_or_default();
    let dest_headings = find_all_headings(&dest_bytes);
    let destination = resolve_destination(
        &dest_bytes,
        &dest_headings,
        &request.dest_selector,
        request.prepend,
    );

    let renormalized = renormalize(content, subtree.level, destination.target_level);
    let scaffold = build_scaffold(&destination.create_path, destination.target_level);
    let mut prepared = scaffold;
    prepared.extend(renormalized);

    let new_dest = splice_with_spacing(&dest_bytes, destination.insert_offset, &prepared);
    write_atomic(&request.dest_path, &new_dest)?;

    Ok(())
}

fn execute_same_file(request: &RefileRequest) -> Result<(), Error> {
    let bytes = std::fs::read(&request.source_path)?;
    let headings = find_all_headings(&bytes);

    let source_nav = navigate(&headings, &request.source_selector);
    let target = source_nav.target_heading.ok_or_else(|| Error::NotFound {
        file: request.source_path.display().to_string(),
        selector: format!("{:?}", request.source_selector.segments),
    })?;
    let subtree = extract(&bytes, &target, &headings);

    let destination = resolve_destination(&bytes, &headings, &request.dest_selector, request.prepend);

    if destination.insert_offset >= subtree.start_offset && destination.insert_offset < subtree.end_offset {
        return Err(Error::validation(
            "destination",
            "cannot refile a subtree into its own contents",
        ));
    }

    let content = request.content_override.as_deref().unwrap_or(&subtree.content);
    let renormalized = renormalize(content, subtree.level, destination.target_level);
    let scaffold = build_scaffold(&destination.create_path, destination.target_level);
    let mut prepared = scaffold;
    prepared.extend(renormalized);

    let removed_len = subtree.end_offset - subtree.start_offset;
    let mut without_subtree = bytes[..subtree.start_offset].to_vec();
    without_subtree.extend(&bytes[subtree.end_offset..]);

    let adjusted_insert_offset = if destination.insert_offset >= subtree.end_offset {
        destination.insert_offset - removed_len
    } else {
        destination.insert_offset
    };

    let new_bytes = splice_with_spacing(&without_subtree, adjusted_insert_offset, &prepared);
    write_atomic(&request.source_path, &new_bytes)?;

    Ok(())
}

/// Splices `prepared` into `doc` at `insert_offset`, separating it from
/// surrounding content with a blank line, then applies canonical spacing
/// normalization to the whole result.
pub(crate) fn splice_with_spacing(doc: &[u8], insert_offset: usize, prepared: &[u8]) -> Vec<u8> {
    let mut out = doc[..insert_offset].to_vec();
    if !out.is_empty() {
        if !out.ends_with(b"\n") {
            out.push(b'\n');
        }
        out.push(b'\n');
    }
    out.extend(prepared);
    if !out.ends_with(b"\n") {
        out.push(b'\n');
    }
    let rest = &doc[insert_offset..];
    if !rest.is_empty() {
        out.push(b'\n');
        out.extend(rest);
    }
    normalize_spacing(&out)
}

/// Collapses runs of three or more consecutive newlines down to exactly two,
/// the canonical spacing rule every refile leaves a document in.
pub(crate) fn normalize_spacing(bytes: &[u8]) -> Vec<u8> {
    let text = String::from_utf8_lossy(bytes);
    let re = Regex::new(r"\n{3,}").expect("static regex is valid");
    re.replace_all(&text, "\n\n").into_owned().into_bytes()
}
