//! Evaluator dispatcher (C7): resolves a block's language to either a
//! built-in interpreter or an external `jot-eval-<lang>` executable on
//! `PATH`, and runs it under a deadline with an approval check first.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use which::which;

use crate::approval::ApprovalStore;
use crate::error::Error;
use crate::eval_block::EvalBlock;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const POLL_INTERVAL: Duration = Duration::from_millis(25);
const SIGTERM_GRACE: Duration = Duration::from_millis(200);

const BUILTIN_LANGS: &[&str] = &[
    "python",
    "python3",
    "bash",
    "sh",
    "node",
    "javascript",
    "js",
    "go",
];

/// Which interpreter runs a block's code.
#[derive(Debug, Clone)]
pub enum Evaluator {
    /// One of the languages this crate shells out to a real interpreter for.
    Builtin(String),
    /// A `jot-eval-<lang>` executable found on `PATH`.
    External(PathBuf),
}

/// Resolves `lang` to an evaluator: a built-in if `lang` is one of the
/// languages this crate knows how to run directly, otherwise a
/// `jot-eval-<lang>` binary on `PATH`, if one exists.
pub fn resolve(lang: &str) -> Option<Evaluator> {
    if BUILTIN_LANGS.contains(&lang) {
        return Some(Evaluator::Builtin(lang.to_string()));
    }
    which(format!("jot-eval-{lang}")).ok().map(Evaluator::External)
}

/// The environment a block runs in: working directory, per-run timeout, and
/// extra environment variables (conventionally `JOT_EVAL_*`).
#[derive(Debug, Clone)]
pub struct EvalContext {
    pub cwd: PathBuf,
    pub timeout: Duration,
    pub env: Vec<(String, String)>,
}

impl EvalContext {
    pub fn new(cwd: PathBuf) -> Self {
        Self {
            cwd,
            timeout: DEFAULT_TIMEOUT,
            env: Vec::new(),
        }
    }

    /// Builds a context from a block's own `cwd`, `timeout`, and `env`
    /// parameters, falling back to `workspace_root` and the default
    /// 30-second timeout when a block doesn't set them. `cwd` is resolved
    /// relative to `workspace_root` if it isn't already absolute.
    pub fn from_params(workspace_root: &std::path::Path, params: &BTreeMap<String, String>) -> Self {
        let cwd = match params.get("cwd") {
            Some(raw) => {
                let candidate = PathBuf::from(raw);
                if candidate.is_absolute() {
                    candidate
                } else {
                    workspace_root.join(candidate)
                }
            }
            None => workspace_root.to_path_buf(),
        };

        let timeout = params
            .get("timeout")
            .and_then(|raw| parse_duration(raw))
            .unwrap_or(DEFAULT_TIMEOUT);

        let env = params
            .get("env")
            .map(|raw| {
                raw.split(',')
                    .filter_map(|pair| pair.split_once('='))
                    .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                    .collect()
            })
            .unwrap_or_default();

        Self { cwd, timeout, env }
    }
}

/// Parses a duration like `30s`, `200ms`, `2m`, or a bare integer (seconds).
/// Returns `None` for anything that doesn't parse, leaving the caller to fall
/// back to the default timeout rather than failing the whole run over a
/// malformed `timeout` parameter.
fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let digits_end = raw.find(|c: char| !c.is_ascii_digit()).unwrap_or(raw.len());
    if digits_end == 0 {
        return None;
    }
    let value: u64 = raw[..digits_end].parse().ok()?;
    let unit = raw[digits_end..].trim();
    match unit {
        "" | "s" => Some(Duration::from_secs(value)),
        "ms" => Some(Duration::from_millis(value)),
        "m" => Some(Duration::from_secs(value * 60)),
        _ => None,
    }
}

/// The captured result of running a block.
#[derive(Debug, Clone)]
pub struct EvalOutcome {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl EvalOutcome {
    /// The combined stdout+stderr capture a `results=output` region (the
    /// default) is rendered from.
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}{}", self.stdout, self.stderr)
        }
    }
}

/// Checks that `block` is approved to run in `file`, resolves its evaluator,
/// and runs it. This is the entry point [`crate::hooks`] and the CLI drive;
/// [`run`] is available directly for callers that have already satisfied the
/// approval check themselves.
pub fn evaluate(
    block: &EvalBlock,
    file: &str,
    store: &ApprovalStore,
    ctx: &EvalContext,
) -> Result<EvalOutcome, Error> {
    let name = block.name.as_deref().unwrap_or_default();
    let hash = block.content_hash();
    if !store.check_approval(file, name, &hash) {
        return Err(Error::ApprovalRequired {
            block_name: name.to_string(),
        });
    }

    let evaluator = resolve(&block.lang).ok_or_else(|| Error::EvaluatorNotFound {
        lang: block.lang.clone(),
    })?;
    run(&evaluator, &block.code, name, &block.params, ctx)
}

/// Runs `code` under `evaluator`, polling for completion with
/// [`Child::try_wait`] rather than blocking, so a run that exceeds
/// `ctx.timeout` can be killed instead of hung on forever.
///
/// The child's environment is the inherited environment, plus
/// `params["env"]` parsed as comma-separated `K=V` pairs, plus the
/// `JOT_EVAL_*` variables every evaluator can rely on: `JOT_EVAL_CODE`,
/// `JOT_EVAL_CWD`, `JOT_EVAL_TIMEOUT` (milliseconds), `JOT_EVAL_ARGS`,
/// `JOT_EVAL_ENV`, and `JOT_EVAL_BLOCK_NAME`.
pub fn run(
    evaluator: &Evaluator,
    code: &str,
    block_name: &str,
    params: &BTreeMap<String, String>,
    ctx: &EvalContext,
) -> Result<EvalOutcome, Error> {
    let (mut child, _temp_guard) = spawn(evaluator, code, block_name, params, ctx)?;
    let start = Instant::now();

    // Drain stdout/stderr on their own threads as the child runs, rather than
    // waiting until it exits: a child that writes more than the OS pipe
    // buffer can hold would otherwise block on that write forever, since
    // nothing reads the other end until after the poll loop below returns.
    let stdout_reader = child.stdout.take().map(spawn_pipe_reader);
    let stderr_reader = child.stderr.take().map(spawn_pipe_reader);

    let status = loop {
        if let Some(status) = child.try_wait()? {
            break Some(status);
        }
        if start.elapsed() >= ctx.timeout {
            kill_child(&mut child);
            let _ = child.wait();
            break None;
        }
        std::thread::sleep(POLL_INTERVAL);
    };

    let stdout = join_pipe_reader(stdout_reader);
    let stderr = join_pipe_reader(stderr_reader);

    match status {
        Some(status) => Ok(EvalOutcome {
            stdout,
            stderr,
            exit_code: status.code(),
        }),
        None => Err(Error::Timeout {
            block_name: block_name.to_string(),
            timeout_ms: ctx.timeout.as_millis() as u64,
        }),
    }
}

/// Spawns a thread that reads `pipe` to EOF, returning everything captured
/// once the writing end closes (the child exiting or being killed).
fn spawn_pipe_reader(mut pipe: impl Read + Send + 'static) -> std::thread::JoinHandle<String> {
    std::thread::spawn(move || {
        let mut buf = String::new();
        let _ = pipe.read_to_string(&mut buf);
        buf
    })
}

/// Joins a reader thread started by [`spawn_pipe_reader`], treating a
/// missing handle (no pipe was attached) or a panicked reader as empty output.
fn join_pipe_reader(reader: Option<std::thread::JoinHandle<String>>) -> String {
    reader.and_then(|handle| handle.join().ok()).unwrap_or_default()
}

/// Builds the fixed `JOT_EVAL_*` variables plus whatever `params["env"]`
/// contributes, parsed as comma-separated `K=V` pairs.
fn eval_env_vars(
    code: &str,
    block_name: &str,
    params: &BTreeMap<String, String>,
    ctx: &EvalContext,
) -> Vec<(String, String)> {
    let args = params.get("args").cloned().unwrap_or_default();
    let env_param = params.get("env").cloned().unwrap_or_default();

    let mut vars: Vec<(String, String)> = env_param
        .split(',')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();

    vars.push(("JOT_EVAL_CODE".to_string(), code.to_string()));
    vars.push((
        "JOT_EVAL_CWD".to_string(),
        ctx.cwd.display().to_string(),
    ));
    vars.push((
        "JOT_EVAL_TIMEOUT".to_string(),
        ctx.timeout.as_millis().to_string(),
    ));
    vars.push(("JOT_EVAL_ARGS".to_string(), args));
    vars.push(("JOT_EVAL_ENV".to_string(), env_param));
    vars.push(("JOT_EVAL_BLOCK_NAME".to_string(), block_name.to_string()));
    vars
}

fn spawn(
    evaluator: &Evaluator,
    code: &str,
    block_name: &str,
    params: &BTreeMap<String, String>,
    ctx: &EvalContext,
) -> Result<(Child, Option<tempfile::TempDir>), Error> {
    let eval_vars = eval_env_vars(code, block_name, params, ctx);
    match evaluator {
        Evaluator::Builtin(lang) => spawn_builtin(lang, code, &eval_vars, ctx),
        Evaluator::External(path) => {
            let mut cmd = Command::new(path);
            cmd.current_dir(&ctx.cwd);
            for (key, value) in &ctx.env {
                cmd.env(key, value);
            }
            for (key, value) in &eval_vars {
                cmd.env(key, value);
            }
            cmd.stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped());
            let mut child = cmd.spawn()?;
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(code.as_bytes())?;
            }
            Ok((child, None))
        }
    }
}

fn spawn_builtin(
    lang: &str,
    code: &str,
    eval_vars: &[(String, String)],
    ctx: &EvalContext,
) -> Result<(Child, Option<tempfile::TempDir>), Error> {
    let (mut cmd, guard) = match lang {
        "python" | "python3" => {
            let mut cmd = Command::new("python3");
            cmd.arg("-c").arg(code);
            (cmd, None)
        }
        "bash" | "sh" => {
            let mut cmd = Command::new(lang);
            cmd.arg("-c").arg(code);
            (cmd, None)
        }
        "node" | "javascript" | "js" => {
            let mut cmd = Command::new("node");
            cmd.arg("-e").arg(code);
            (cmd, None)
        }
        "go" => {
            let dir = tempfile::Builder::new().prefix("jot-eval-go").tempdir()?;
            let file = dir.path().join("main.go");
            std::fs::write(&file, code)?;
            let mut cmd = Command::new("go");
            cmd.arg("run").arg(&file);
            (cmd, Some(dir))
        }
        _ => unreachable!("resolve() only ever produces Builtin for a language in BUILTIN_LANGS"),
    };

    cmd.current_dir(&ctx.cwd);
    for (key, value) in &ctx.env {
        cmd.env(key, value);
    }
    for (key, value) in eval_vars {
        cmd.env(key, value);
    }
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    Ok((cmd.spawn()?, guard))
}

#[cfg(unix)]
fn kill_child(child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    if let Ok(pid) = i32::try_from(child.id()) {
        let _ = kill(Pid::from_raw(pid), Signal::SIGTERM);
    }
    std::thread::sleep(SIGTERM_GRACE);
    if matches!(child.try_wait(), Ok(None)) {
        let _ = child.kill();
    }
}

#[cfg(not(unix))]
fn kill_child(child: &mut Child) {
    let _ = child.kill();
}
