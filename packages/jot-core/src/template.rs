//! Template engine (C8): YAML front matter, `$(...)` shell interpolation
//! gated behind approval, and insertion of the rendered body into a
//! destination document.

use std::path::Path;
use std::process::Command;

use regex::Regex;
use serde::Deserialize;

use crate::approval::ApprovalStore;
use crate::error::Error;
use crate::fsutil::write_atomic;
use crate::refile::{normalize_spacing, splice_with_spacing};

/// Where a rendered capture lands in its destination file (the `refileMode` key).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefileMode {
    /// Append to the end of the destination file. Default.
    #[default]
    Append,
    /// Insert at the very start of the destination file.
    Prepend,
    /// Don't write the destination file at all; the caller handles placement itself.
    None,
}

/// The YAML front matter a capture template may carry, ahead of its body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplateFrontMatter {
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub refile_mode: Option<RefileMode>,
    #[serde(default)]
    pub name: Option<String>,
}

/// A template split into its parsed front matter and the body that follows.
#[derive(Debug, Clone)]
pub struct ParsedTemplate {
    pub front_matter: TemplateFrontMatter,
    pub body: String,
}

/// Splits `raw` into front matter and body. Front matter is a leading
/// `---\n` ... `\n---` block parsed as YAML; its absence just means an empty
/// (default) front matter and the whole input as body.
pub fn parse_template(raw: &str) -> Result<ParsedTemplate, Error> {
    if let Some(rest) = raw.strip_prefix("---\n") {
        if let Some(end) = rest.find("\n---") {
            let yaml = &rest[..end];
            let after = &rest[end + "\n---".len()..];
            let body = after.strip_prefix('\n').unwrap_or(after);
            let front_matter: TemplateFrontMatter = serde_yaml::from_str(yaml)?;
            return Ok(ParsedTemplate {
                front_matter,
                body: body.to_string(),
            });
        }
    }

    Ok(ParsedTemplate {
        front_matter: TemplateFrontMatter::default(),
        body: raw.to_string(),
    })
}

/// Renders every `$(...)` shell interpolation in `body`. Each command is
/// gated behind an approval check keyed on `template_key` and the command's
/// own hash; an approved command's stdout (trimmed of trailing newlines)
/// replaces the interpolation, and an unapproved one is left as the literal
/// `$(...)` text rather than failing the whole render.
pub fn render(body: &str, template_key: &str, store: &ApprovalStore) -> String {
    let re = Regex::new(r"\$\(([^()]*)\)").expect("static regex is valid");

    re.replace_all(body, |caps: &regex::Captures| {
        let command = caps[1].trim();
        let hash = blake3::hash(command.as_bytes()).to_hex().to_string();

        if store.check_approval(template_key, command, &hash) {
            run_shell(command).unwrap_or_else(|_| caps[0].to_string())
        } else {
            caps[0].to_string()
        }
    })
    .into_owned()
}

fn run_shell(command: &str) -> Result<String, Error> {
    let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string());
    let output = Command::new(shell).arg("-c").arg(command).output()?;
    Ok(String::from_utf8_lossy(&output.stdout)
        .trim_end()
        .to_string())
}

/// Writes `rendered_body` into the document at `dest_path` (creating it if
/// absent) per `mode`: appended to the end, inserted at the very start, or
/// not written at all (`RefileMode::None`, a no-op here — the caller is
/// expected to have already placed the content itself), separated from
/// existing content by a blank line and normalized per the same spacing
/// rule [`crate::refile`] uses.
pub fn append_to_destination(
    dest_path: &Path,
    rendered_body: &str,
    mode: RefileMode,
) -> Result<(), Error> {
    if mode == RefileMode::None {
        return Ok(());
    }

    let existing = std::fs::read(dest_path).unwrap_or_default();
    let insert_offset = match mode {
        RefileMode::Append => existing.len(),
        RefileMode::Prepend => 0,
        RefileMode::None => unreachable!("handled above"),
    };
    let spliced = splice_with_spacing(&existing, insert_offset, rendered_body.as_bytes());
    write_atomic(dest_path, &normalize_spacing(&spliced))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::Mode;
    use tempfile::tempdir;

    #[test]
    fn parses_front_matter_and_body() {
        let raw = "---\ndestination: work.md\nrefile_mode: prepend\n---\n# Captured\n\nBody.\n";
        let parsed = parse_template(raw).unwrap();
        assert_eq!(parsed.front_matter.destination.as_deref(), Some("work.md"));
        assert_eq!(parsed.front_matter.refile_mode, Some(RefileMode::Prepend));
        assert_eq!(parsed.body, "# Captured\n\nBody.\n");
    }

    #[test]
    fn missing_front_matter_yields_defaults() {
        let parsed = parse_template("# Just a body\n").unwrap();
        assert!(parsed.front_matter.destination.is_none());
        assert_eq!(parsed.body, "# Just a body\n");
    }

    #[test]
    fn unapproved_interpolation_falls_back_to_literal_text() {
        let dir = tempdir().unwrap();
        let store = ApprovalStore::load(dir.path().join("approvals.json")).unwrap();
        let rendered = render("Today is $(date).", "capture.md", &store);
        assert_eq!(rendered, "Today is $(date).");
    }

    #[test]
    fn approved_interpolation_runs_the_command() {
        let dir = tempdir().unwrap();
        let mut store = ApprovalStore::load(dir.path().join("approvals.json")).unwrap();
        let hash = blake3::hash(b"echo hi").to_hex().to_string();
        store
            .approve_block("capture.md", "echo hi", &hash, Mode::Hash)
            .unwrap();
        let rendered = render("Say: $(echo hi)", "capture.md", &store);
        assert_eq!(rendered, "Say: hi");
    }

    #[test]
    fn append_creates_destination_when_absent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("inbox.md");
        append_to_destination(&path, "## Captured\n\nBody.", RefileMode::Append).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("## Captured"));
    }

    #[test]
    fn prepend_mode_inserts_before_existing_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("inbox.md");
        std::fs::write(&path, "# Existing\n").unwrap();
        append_to_destination(&path, "## New", RefileMode::Prepend).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.find("## New").unwrap() < content.find("# Existing").unwrap());
    }

    #[test]
    fn none_mode_does_not_touch_the_destination() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("inbox.md");
        std::fs::write(&path, "# Existing\n").unwrap();
        append_to_destination(&path, "## New", RefileMode::None).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "# Existing\n");
    }
}
