//! Tangle engine (C10): groups eval blocks tagged `tangle="true" file="..."`
//! by destination file and writes each group's concatenated code out.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use crate::error::Error;
use crate::eval_block::find_eval_blocks;
use crate::fsutil::write_atomic;

/// Groups every tangled block in `doc_bytes` by its `file` parameter,
/// concatenating code in document order, and preserving the order the
/// destination files first appear in.
pub fn tangle(doc_bytes: &[u8]) -> IndexMap<String, String> {
    let mut groups: IndexMap<String, String> = IndexMap::new();

    for block in find_eval_blocks(doc_bytes) {
        let is_tangled = block
            .params
            .get("tangle")
            .map(|value| value == "true")
            .unwrap_or(false);
        if !is_tangled {
            continue;
        }
        let Some(file) = block.params.get("file") else {
            continue;
        };

        let entry = groups.entry(file.clone()).or_default();
        let trimmed_len = entry.trim_end_matches('\n').len();
        let had_content = trimmed_len > 0;
        entry.truncate(trimmed_len);
        if had_content {
            entry.push('\n');
        }
        entry.push_str(&block.code);
    }

    groups
}

/// Tangles `doc_bytes` and writes each resulting file atomically, resolved
/// relative to `workspace_root`, creating parent directories as needed.
/// Returns the paths written, in the same order [`tangle`] produced them.
pub fn write_tangled_files(workspace_root: &Path, doc_bytes: &[u8]) -> Result<Vec<PathBuf>, Error> {
    let groups = tangle(doc_bytes);
    let mut written = Vec::with_capacity(groups.len());

    for (relative, code) in groups {
        let path = workspace_root.join(&relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        write_atomic(&path, code.as_bytes())?;
        written.push(path);
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn groups_blocks_by_destination_file_in_document_order() {
        let doc = concat!(
            "<eval lang=\"python\" tangle=\"true\" file=\"build.py\" />\n",
            "```python\nprint(1)\n```\n\n",
            "<eval lang=\"python\" tangle=\"true\" file=\"build.py\" />\n",
            "```python\nprint(2)\n```\n\n",
            "<eval lang=\"bash\" tangle=\"true\" file=\"run.sh\" />\n",
            "```bash\necho hi\n```\n",
        );
        let groups = tangle(doc.as_bytes());
        let keys: Vec<_> = groups.keys().collect();
        assert_eq!(keys, vec!["build.py", "run.sh"]);
        assert_eq!(groups["build.py"], "print(1)\nprint(2)\n");
    }

    #[test]
    fn non_tangled_blocks_are_ignored() {
        let doc = "<eval lang=\"python\" />\n```python\nprint(1)\n```\n";
        assert!(tangle(doc.as_bytes()).is_empty());
    }

    #[test]
    fn writes_tangled_files_to_the_workspace_root() {
        let dir = tempdir().unwrap();
        let doc = "<eval lang=\"bash\" tangle=\"true\" file=\"scripts/run.sh\" />\n```bash\necho hi\n```\n";
        let written = write_tangled_files(dir.path(), doc.as_bytes()).unwrap();
        assert_eq!(written.len(), 1);
        let content = std::fs::read_to_string(&written[0]).unwrap();
        assert_eq!(content, "echo hi\n");
    }
}
