//! Workspace configuration: the `.jot/config.json` a workspace root carries,
//! and the handful of paths derived from it that every other component
//! resolves selectors' `file` parts against.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// The on-disk shape of `.jot/config.json`. Every field has a sensible
/// default, so an absent or partial config file is always valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Path, relative to the workspace root, of the catch-all capture file.
    pub inbox: String,
    /// Directory, relative to the workspace root, holding the bulk of the workspace's documents.
    pub lib_dir: String,
    /// Selector naming where refiled/archived material lands by default.
    pub archive_location: String,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            inbox: "inbox.md".to_string(),
            lib_dir: "lib".to_string(),
            archive_location: "archive.md".to_string(),
        }
    }
}

/// A workspace root together with its parsed configuration.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub root: PathBuf,
    pub config: WorkspaceConfig,
}

impl Workspace {
    /// Opens the workspace at `root`, loading `.jot/config.json` if present
    /// and falling back to [`WorkspaceConfig::default`] otherwise.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, Error> {
        let root = root.into();
        let config = match std::fs::read(root.join(".jot").join("config.json")) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => WorkspaceConfig::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { root, config })
    }

    pub fn inbox_path(&self) -> PathBuf {
        self.root.join(&self.config.inbox)
    }

    pub fn lib_dir(&self) -> PathBuf {
        self.root.join(&self.config.lib_dir)
    }

    pub fn jot_dir(&self) -> PathBuf {
        self.root.join(".jot")
    }

    /// Resolves a selector's `file` part to an absolute path: `lib_dir` is
    /// searched first, then the workspace root itself.
    pub fn resolve_file(&self, file: &str) -> PathBuf {
        let in_lib = self.lib_dir().join(file);
        if in_lib.exists() {
            in_lib
        } else {
            self.root.join(file)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_config_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let workspace = Workspace::open(dir.path()).unwrap();
        assert_eq!(workspace.config.inbox, "inbox.md");
        assert_eq!(workspace.inbox_path(), dir.path().join("inbox.md"));
    }

    #[test]
    fn loads_partial_config_with_defaults_filled_in() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".jot")).unwrap();
        std::fs::write(
            dir.path().join(".jot").join("config.json"),
            r#"{"inbox": "capture.md"}"#,
        )
        .unwrap();

        let workspace = Workspace::open(dir.path()).unwrap();
        assert_eq!(workspace.config.inbox, "capture.md");
        assert_eq!(workspace.config.lib_dir, "lib");
    }

    #[test]
    fn resolve_file_prefers_lib_dir_over_root() {
        let dir = tempdir().unwrap();
        let workspace = Workspace::open(dir.path()).unwrap();
        std::fs::create_dir_all(workspace.lib_dir()).unwrap();
        std::fs::write(workspace.lib_dir().join("notes.md"), b"# Notes\n").unwrap();

        let resolved = workspace.resolve_file("notes.md");
        assert_eq!(resolved, workspace.lib_dir().join("notes.md"));
    }
}
