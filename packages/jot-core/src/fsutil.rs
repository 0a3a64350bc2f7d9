//! Small filesystem helpers shared by every component that mutates a document.

use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::Error;

/// Writes `contents` to `path` atomically: the new content is written to a
/// temporary file in `path`'s parent directory, then renamed into place, so a
/// reader never observes a partially written document.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), Error> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(parent)?;
    std::io::Write::write_all(&mut tmp, contents)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_atomic_replaces_existing_file_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.md");
        std::fs::write(&path, b"old").unwrap();
        write_atomic(&path, b"new").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"new");
    }

    #[test]
    fn write_atomic_creates_a_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.md");
        write_atomic(&path, b"content").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"content");
    }
}
