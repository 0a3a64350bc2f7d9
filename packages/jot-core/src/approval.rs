//! Approval store (C6): tracks which eval blocks (and whole documents) a user
//! has approved to run, and under what policy, persisted as JSON under a
//! process-global configuration directory.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::fsutil::write_atomic;

/// The policy under which a block or document was approved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Approved for its current content hash only; any change revokes it implicitly.
    Hash,
    /// Never satisfied automatically — the caller must re-prompt every run.
    Prompt,
    /// Approved unconditionally, regardless of future content changes.
    Always,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockApproval {
    pub content_hash: String,
    pub mode: Mode,
    pub approved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentApproval {
    pub mode: Mode,
    pub approved_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    blocks: IndexMap<String, BlockApproval>,
    #[serde(default)]
    documents: IndexMap<String, DocumentApproval>,
}

/// The persisted table of block and document approvals for a workspace.
pub struct ApprovalStore {
    path: PathBuf,
    data: StoreFile,
}

impl ApprovalStore {
    /// Loads the store from `path`, treating a missing file as an empty store.
    pub fn load(path: PathBuf) -> Result<Self, Error> {
        let data = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreFile::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, data })
    }

    /// The default path: `<config dir>/jot/approvals.json`.
    pub fn default_path() -> Result<PathBuf, Error> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| Error::validation("config_dir", "no configuration directory for this platform"))?;
        Ok(config_dir.join("jot").join("approvals.json"))
    }

    /// Loads the store from [`Self::default_path`].
    pub fn load_default() -> Result<Self, Error> {
        Self::load(Self::default_path()?)
    }

    fn save(&self) -> Result<(), Error> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec_pretty(&self.data)?;
        write_atomic(&self.path, &bytes)
    }

    /// Approves a block identified by `(file, name)` for `content_hash` under `mode`.
    pub fn approve_block(
        &mut self,
        file: &str,
        name: &str,
        content_hash: &str,
        mode: Mode,
    ) -> Result<(), Error> {
        self.data.blocks.insert(
            block_key(file, name),
            BlockApproval {
                content_hash: content_hash.to_string(),
                mode,
                approved_at: Utc::now(),
            },
        );
        self.save()
    }

    /// Approves an entire document identified by `file` under `mode`.
    pub fn approve_document(&mut self, file: &str, mode: Mode) -> Result<(), Error> {
        self.data.documents.insert(
            file.to_string(),
            DocumentApproval {
                mode,
                approved_at: Utc::now(),
            },
        );
        self.save()
    }

    /// Returns whether `(file, name)` at `content_hash` is currently approved
    /// to run: a document-level `always` approval satisfies any block in that
    /// document; a block-level `always` approval satisfies that block
    /// regardless of hash; a block-level `hash` approval only satisfies a
    /// matching hash; everything else (including no record, and `prompt`
    /// mode) must be re-prompted.
    pub fn check_approval(&self, file: &str, name: &str, content_hash: &str) -> bool {
        if let Some(doc) = self.data.documents.get(file) {
            if doc.mode == Mode::Always {
                return true;
            }
        }

        match self.data.blocks.get(&block_key(file, name)) {
            Some(record) => match record.mode {
                Mode::Always => true,
                Mode::Hash => record.content_hash == content_hash,
                Mode::Prompt => false,
            },
            None => false,
        }
    }

    /// Removes a block's approval, if any.
    pub fn revoke_block(&mut self, file: &str, name: &str) -> Result<(), Error> {
        self.data.blocks.shift_remove(&block_key(file, name));
        self.save()
    }

    /// Removes a document's approval, if any.
    pub fn revoke_document(&mut self, file: &str) -> Result<(), Error> {
        self.data.documents.shift_remove(file);
        self.save()
    }

    /// Lists every block approval, in insertion order, as `(key, record)` pairs.
    pub fn list_block_approvals(&self) -> Vec<(&str, &BlockApproval)> {
        self.data
            .blocks
            .iter()
            .map(|(k, v)| (k.as_str(), v))
            .collect()
    }

    /// Lists every document approval, in insertion order, as `(file, record)` pairs.
    pub fn list_document_approvals(&self) -> Vec<(&str, &DocumentApproval)> {
        self.data
            .documents
            .iter()
            .map(|(k, v)| (k.as_str(), v))
            .collect()
    }
}

fn block_key(file: &str, name: &str) -> String {
    format!("{file}::{name}")
}

/// Normalizes a path to the string key the store uses to identify a document.
pub fn file_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store_at(dir: &Path) -> ApprovalStore {
        ApprovalStore::load(dir.join("approvals.json")).unwrap()
    }

    #[test]
    fn hash_mode_invalidates_on_code_change() {
        let dir = tempdir().unwrap();
        let mut store = store_at(dir.path());

        store
            .approve_block("notes.md", "build", "hash-v1", Mode::Hash)
            .unwrap();
        assert!(store.check_approval("notes.md", "build", "hash-v1"));
        assert!(!store.check_approval("notes.md", "build", "hash-v2"));
    }

    #[test]
    fn always_mode_survives_hash_changes() {
        let dir = tempdir().unwrap();
        let mut store = store_at(dir.path());

        store
            .approve_block("notes.md", "build", "hash-v1", Mode::Always)
            .unwrap();
        assert!(store.check_approval("notes.md", "build", "hash-v2"));
    }

    #[test]
    fn document_level_always_approval_covers_every_block() {
        let dir = tempdir().unwrap();
        let mut store = store_at(dir.path());

        store.approve_document("notes.md", Mode::Always).unwrap();
        assert!(store.check_approval("notes.md", "anything", "whatever-hash"));
    }

    #[test]
    fn unapproved_block_is_not_approved() {
        let dir = tempdir().unwrap();
        let store = store_at(dir.path());
        assert!(!store.check_approval("notes.md", "build", "hash-v1"));
    }

    #[test]
    fn revoking_a_block_clears_its_approval() {
        let dir = tempdir().unwrap();
        let mut store = store_at(dir.path());

        store
            .approve_block("notes.md", "build", "hash-v1", Mode::Hash)
            .unwrap();
        store.revoke_block("notes.md", "build").unwrap();
        assert!(!store.check_approval("notes.md", "build", "hash-v1"));
    }

    #[test]
    fn store_persists_across_reloads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("approvals.json");

        let mut store = ApprovalStore::load(path.clone()).unwrap();
        store
            .approve_block("notes.md", "build", "hash-v1", Mode::Hash)
            .unwrap();
        drop(store);

        let reloaded = ApprovalStore::load(path).unwrap();
        assert!(reloaded.check_approval("notes.md", "build", "hash-v1"));
    }
}
