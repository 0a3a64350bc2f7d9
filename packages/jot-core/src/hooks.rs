//! Hook dispatcher (C9): runs user-provided executables under
//! `<workspace>/.jot/hooks/<event>` around mutating operations. `pre-*` hooks
//! run synchronously and can abort the operation (or rewrite its content via
//! stdout); `post-*` hooks are best-effort and only ever warn on failure.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use crate::error::Error;

const HOOK_TIMEOUT: Duration = Duration::from_secs(30);
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// The lifecycle events a hook can be registered against. `PreTangle` and
/// `PostTangle` extend the named set: tangling writes files to the workspace
/// just like refiling or capturing does, so it gets the same abort/best-effort
/// treatment even though the name isn't spelled out alongside the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookEvent {
    PreRefile,
    PostRefile,
    PreCapture,
    PostCapture,
    PreArchive,
    PostArchive,
    PreEval,
    PostEval,
    PreTangle,
    PostTangle,
    WorkspaceChange,
}

impl HookEvent {
    /// The filename this event's hook is looked up under.
    pub fn file_name(self) -> &'static str {
        match self {
            Self::PreRefile => "pre-refile",
            Self::PostRefile => "post-refile",
            Self::PreCapture => "pre-capture",
            Self::PostCapture => "post-capture",
            Self::PreArchive => "pre-archive",
            Self::PostArchive => "post-archive",
            Self::PreEval => "pre-eval",
            Self::PostEval => "post-eval",
            Self::PreTangle => "pre-tangle",
            Self::PostTangle => "post-tangle",
            Self::WorkspaceChange => "workspace-change",
        }
    }

    /// Whether this event runs before the operation it's named for (and can
    /// therefore abort it), as opposed to after (best-effort only).
    /// `workspace-change` has no "before" to block, so it is always
    /// best-effort, the same as a `post-*` hook.
    pub fn is_pre(self) -> bool {
        matches!(
            self,
            Self::PreRefile
                | Self::PreCapture
                | Self::PreArchive
                | Self::PreEval
                | Self::PreTangle
        )
    }
}

fn hook_path(workspace_root: &Path, event: HookEvent) -> PathBuf {
    workspace_root.join(".jot").join("hooks").join(event.file_name())
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|meta| meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Runs the hook for `event`, if one is registered and executable, returning
/// the transformed content a `pre-*` hook supplied on stdout (if any). A
/// `pre-*` hook that exits non-zero or times out aborts the operation with
/// [`Error::HookAborted`]; a `post-*` hook that does the same only logs a
/// warning and is otherwise ignored. `no_verify` suppresses every `pre-*`
/// hook (the operation proceeds as if none were registered); it has no
/// effect on `post-*` hooks.
pub fn dispatch(
    workspace_root: &Path,
    event: HookEvent,
    env: &[(String, String)],
    no_verify: bool,
) -> Result<Option<String>, Error> {
    if no_verify && event.is_pre() {
        return Ok(None);
    }

    let path = hook_path(workspace_root, event);
    if !path.exists() || !is_executable(&path) {
        return Ok(None);
    }

    let mut cmd = Command::new(&path);
    cmd.current_dir(workspace_root);
    for (key, value) in env {
        cmd.env(key, value);
    }
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn()?;
    let start = Instant::now();

    let status = loop {
        if let Some(status) = child.try_wait()? {
            break Some(status);
        }
        if start.elapsed() >= HOOK_TIMEOUT {
            let _ = child.kill();
            let _ = child.wait();
            break None;
        }
        std::thread::sleep(POLL_INTERVAL);
    };

    let mut stdout = String::new();
    let mut stderr = String::new();
    if let Some(mut out) = child.stdout.take() {
        let _ = out.read_to_string(&mut stdout);
    }
    if let Some(mut err) = child.stderr.take() {
        let _ = err.read_to_string(&mut stderr);
    }

    let exit_code = match status {
        None => {
            if event.is_pre() {
                return Err(Error::HookAborted {
                    event: event.file_name().to_string(),
                    code: -1,
                });
            }
            tracing::warn!(hook = event.file_name(), "hook timed out, ignoring");
            return Ok(None);
        }
        Some(status) => status.code().unwrap_or(-1),
    };

    if exit_code != 0 {
        if event.is_pre() {
            return Err(Error::HookAborted {
                event: event.file_name().to_string(),
                code: exit_code,
            });
        }
        tracing::warn!(
            hook = event.file_name(),
            code = exit_code,
            stderr = %stderr.trim(),
            "hook exited non-zero, ignoring"
        );
        return Ok(None);
    }

    if event.is_pre() && !stdout.is_empty() {
        Ok(Some(stdout))
    } else {
        Ok(None)
    }
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::tempdir;

    fn install_hook(workspace: &Path, event: HookEvent, script: &str) {
        let dir = workspace.join(".jot").join("hooks");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(event.file_name());
        std::fs::write(&path, script).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
    }

    #[test]
    fn pre_refile_abort_blocks_mutation() {
        let dir = tempdir().unwrap();
        install_hook(dir.path(), HookEvent::PreRefile, "#!/bin/sh\nexit 1\n");

        let result = dispatch(dir.path(), HookEvent::PreRefile, &[], false);
        assert!(matches!(result, Err(Error::HookAborted { code: 1, .. })));
    }

    #[test]
    fn no_verify_suppresses_pre_hooks() {
        let dir = tempdir().unwrap();
        install_hook(dir.path(), HookEvent::PreRefile, "#!/bin/sh\nexit 1\n");

        let result = dispatch(dir.path(), HookEvent::PreRefile, &[], true);
        assert!(result.unwrap().is_none());
    }

    #[test]
    fn post_hook_failure_only_warns() {
        let dir = tempdir().unwrap();
        install_hook(dir.path(), HookEvent::PostRefile, "#!/bin/sh\nexit 3\n");

        let result = dispatch(dir.path(), HookEvent::PostRefile, &[], false);
        assert!(result.unwrap().is_none());
    }

    #[test]
    fn pre_hook_stdout_becomes_transformed_content() {
        let dir = tempdir().unwrap();
        install_hook(
            dir.path(),
            HookEvent::PreCapture,
            "#!/bin/sh\necho 'transformed content'\n",
        );

        let result = dispatch(dir.path(), HookEvent::PreCapture, &[], false).unwrap();
        assert_eq!(result.unwrap().trim(), "transformed content");
    }

    #[test]
    fn missing_hook_is_a_no_op() {
        let dir = tempdir().unwrap();
        let result = dispatch(dir.path(), HookEvent::PreRefile, &[], false);
        assert!(result.unwrap().is_none());
    }
}
