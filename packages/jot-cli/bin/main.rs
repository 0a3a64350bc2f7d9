#![cfg(feature = "cli")]

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use jot_cli::{CaptureResult, EvalResult, RefileResult, TangleResult};
use jot_core::approval::{ApprovalStore, Mode as ApprovalMode};
use jot_core::eval_block::find_eval_blocks;
use jot_core::evaluator::{evaluate, EvalContext};
use jot_core::hooks::{dispatch, HookEvent};
use jot_core::refile::{execute as refile_execute, RefileRequest};
use jot_core::results::{parse_results_spec, upsert_region, ResultStream};
use jot_core::selector::Selector;
use jot_core::tangle::write_tangled_files;
use jot_core::template::{append_to_destination, parse_template, render};
use jot_core::workspace::Workspace;
use jot_core::write_atomic;

fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let opts = Options::parse();
    let workspace =
        Workspace::open(&opts.workspace).with_context(|| "failed to open workspace")?;

    match opts.command {
        Command::Refile {
            source,
            dest,
            prepend,
            no_verify,
        } => run_refile(&workspace, &source, &dest, prepend, no_verify),
        Command::Eval { command } => match command {
            EvalCommand::Run {
                file,
                name,
                no_verify,
            } => run_eval(&workspace, &file, name.as_deref(), no_verify),
            EvalCommand::Approve { file, name, mode } => approve(&file, &name, mode.into()),
            EvalCommand::Revoke { file, name } => revoke(&file, name.as_deref()),
            EvalCommand::List => list_approvals(),
        },
        Command::Capture { template, no_verify } => run_capture(&workspace, &template, no_verify),
        Command::Archive { source, no_verify } => run_archive(&workspace, &source, no_verify),
        Command::Tangle { file } => run_tangle(&workspace, &file),
    }
}

fn run_refile(
    workspace: &Workspace,
    source: &str,
    dest: &str,
    prepend: bool,
    no_verify: bool,
) -> Result<(), anyhow::Error> {
    let source_selector = Selector::parse(source)?;
    let dest_selector = Selector::parse(dest)?;
    let source_path = workspace.resolve_file(&source_selector.file);
    let dest_path = workspace.resolve_file(&dest_selector.file);

    let hook_env = [
        ("JOT_REFILE_SOURCE".to_string(), source.to_string()),
        ("JOT_REFILE_DEST".to_string(), dest.to_string()),
    ];
    let content_override = dispatch(&workspace.root, HookEvent::PreRefile, &hook_env, no_verify)
        .with_context(|| "pre-refile hook aborted the operation")?
        .map(String::into_bytes);

    let request = RefileRequest {
        source_path,
        source_selector,
        dest_path,
        dest_selector,
        prepend,
        content_override,
    };
    refile_execute(&request).with_context(|| "refile failed")?;

    let _ = dispatch(&workspace.root, HookEvent::PostRefile, &hook_env, no_verify);

    let result = RefileResult {
        source: source.to_string(),
        destination: dest.to_string(),
    };
    println!("{}", serde_json::to_string(&result)?);
    Ok(())
}

fn run_eval(
    workspace: &Workspace,
    file: &str,
    name: Option<&str>,
    no_verify: bool,
) -> Result<(), anyhow::Error> {
    let path = workspace.resolve_file(file);
    let bytes = std::fs::read(&path).with_context(|| format!("failed to read {file}"))?;
    let blocks = find_eval_blocks(&bytes);

    let targets: Vec<_> = blocks
        .iter()
        .filter(|b| name.map(|n| b.name.as_deref() == Some(n)).unwrap_or(true))
        .collect();
    if targets.is_empty() {
        anyhow::bail!("no eval block named {:?} found in {file}", name);
    }

    let store = ApprovalStore::load_default().with_context(|| "failed to load approval store")?;
    let mut text = String::from_utf8_lossy(&bytes).into_owned();
    let mut results = Vec::with_capacity(targets.len());

    // Blocks are run in document order, each against the document as it
    // stands after the previous block's results were spliced in, since
    // every preceding splice shifts the byte offsets a later block's own
    // `<eval>` tag was originally found at.
    for target in targets {
        let block_name = target.name.clone().unwrap_or_default();
        let hook_env = [("JOT_EVAL_CODE".to_string(), target.code.clone())];
        dispatch(&workspace.root, HookEvent::PreEval, &hook_env, no_verify)
            .with_context(|| "pre-eval hook aborted the operation")?;

        let ctx = EvalContext::from_params(&workspace.root, &target.params);
        match evaluate(target, file, &store, &ctx) {
            Ok(outcome) => {
                let (stream, format, mode) =
                    parse_results_spec(target.params.get("results").map(String::as_str), &target.lang);
                let content = match stream {
                    ResultStream::Output => outcome.combined_output(),
                    ResultStream::Value => outcome.stdout.trim().to_string(),
                };
                // Re-locate the block in the document as it stands now: an
                // earlier block's results splice may have shifted every
                // subsequent byte offset, so `target.tag_offset` (computed
                // against the original bytes) can no longer be trusted.
                // `(name, lang, code)` is stable across that splice, since
                // only the region *below* a block is ever rewritten.
                let refreshed = find_eval_blocks(text.as_bytes());
                let anchor = refreshed
                    .iter()
                    .find(|b| b.name == target.name && b.lang == target.lang && b.code == target.code)
                    .map(|b| b.block_end)
                    .unwrap_or(text.len());
                text = upsert_region(&text, &block_name, &format, &content, anchor, mode);

                let _ = dispatch(&workspace.root, HookEvent::PostEval, &hook_env, no_verify);
                results.push(EvalResult {
                    block: block_name,
                    exit_code: outcome.exit_code,
                    stdout: outcome.stdout,
                    stderr: outcome.stderr,
                    error: None,
                });
            }
            Err(err) => {
                results.push(EvalResult {
                    block: block_name,
                    exit_code: None,
                    stdout: String::new(),
                    stderr: String::new(),
                    error: Some(err.to_string()),
                });
            }
        }
    }

    write_atomic(&path, text.as_bytes())?;

    println!("{}", serde_json::to_string(&results)?);
    Ok(())
}

fn approve(file: &str, name: &str, mode: ApprovalMode) -> Result<(), anyhow::Error> {
    let path = PathBuf::from(file);
    let bytes = std::fs::read(&path).with_context(|| format!("failed to read {file}"))?;
    let blocks = find_eval_blocks(&bytes);
    let block = blocks
        .iter()
        .find(|b| b.name.as_deref() == Some(name))
        .ok_or_else(|| anyhow::anyhow!("no eval block named '{name}' found in {file}"))?;

    let mut store = ApprovalStore::load_default()?;
    store.approve_block(file, name, &block.content_hash(), mode)?;
    println!("approved '{name}' in {file}");
    Ok(())
}

fn revoke(file: &str, name: Option<&str>) -> Result<(), anyhow::Error> {
    let mut store = ApprovalStore::load_default()?;
    match name {
        Some(name) => {
            store.revoke_block(file, name)?;
            println!("revoked '{name}' in {file}");
        }
        None => {
            store.revoke_document(file)?;
            println!("revoked document approval for {file}");
        }
    }
    Ok(())
}

fn list_approvals() -> Result<(), anyhow::Error> {
    let store = ApprovalStore::load_default()?;
    for (key, record) in store.list_block_approvals() {
        println!("{key}\t{:?}\t{}", record.mode, record.approved_at);
    }
    for (file, record) in store.list_document_approvals() {
        println!("{file}\t{:?}\t{} (document)", record.mode, record.approved_at);
    }
    Ok(())
}

fn run_capture(workspace: &Workspace, template: &str, no_verify: bool) -> Result<(), anyhow::Error> {
    let raw = std::fs::read_to_string(template)
        .with_context(|| format!("failed to read template {template}"))?;
    let parsed = parse_template(&raw)?;

    let hook_env = [("JOT_TEMPLATE_NAME".to_string(), template.to_string())];
    let transformed = dispatch(&workspace.root, HookEvent::PreCapture, &hook_env, no_verify)
        .with_context(|| "pre-capture hook aborted the operation")?;

    let store = ApprovalStore::load_default()?;
    // A pre-capture hook's stdout, if any, replaces the template's own body
    // outright rather than being rendered itself — the hook has already
    // produced the final text it wants captured.
    let rendered = match transformed {
        Some(content) => content,
        None => render(&parsed.body, template, &store),
    };

    let destination = parsed
        .front_matter
        .destination
        .clone()
        .unwrap_or_else(|| workspace.config.inbox.clone());
    let dest_path = workspace.resolve_file(&destination);
    let refile_mode = parsed.front_matter.refile_mode.unwrap_or_default();
    append_to_destination(&dest_path, &rendered, refile_mode)?;

    let _ = dispatch(&workspace.root, HookEvent::PostCapture, &hook_env, no_verify);

    let result = CaptureResult {
        destination: destination.clone(),
    };
    println!("{}", serde_json::to_string(&result)?);
    Ok(())
}

/// Refiles `source` to the workspace's configured `archive_location`,
/// firing `pre-archive`/`post-archive` instead of the plain refile hooks.
fn run_archive(
    workspace: &Workspace,
    source: &str,
    no_verify: bool,
) -> Result<(), anyhow::Error> {
    let source_selector = Selector::parse(source)?;
    let dest_selector = Selector::parse(&workspace.config.archive_location)?;
    let source_path = workspace.resolve_file(&source_selector.file);
    let dest_path = workspace.resolve_file(&dest_selector.file);

    let hook_env = [
        ("JOT_REFILE_SOURCE".to_string(), source.to_string()),
        (
            "JOT_REFILE_DEST".to_string(),
            workspace.config.archive_location.clone(),
        ),
    ];
    let content_override = dispatch(&workspace.root, HookEvent::PreArchive, &hook_env, no_verify)
        .with_context(|| "pre-archive hook aborted the operation")?
        .map(String::into_bytes);

    let request = RefileRequest {
        source_path,
        source_selector,
        dest_path,
        dest_selector,
        prepend: false,
        content_override,
    };
    refile_execute(&request).with_context(|| "archive failed")?;

    let _ = dispatch(&workspace.root, HookEvent::PostArchive, &hook_env, no_verify);

    let result = RefileResult {
        source: source.to_string(),
        destination: workspace.config.archive_location.clone(),
    };
    println!("{}", serde_json::to_string(&result)?);
    Ok(())
}

fn run_tangle(workspace: &Workspace, file: &str) -> Result<(), anyhow::Error> {
    let path = workspace.resolve_file(file);
    let bytes = std::fs::read(&path).with_context(|| format!("failed to read {file}"))?;

    dispatch(&workspace.root, HookEvent::PreTangle, &[], false)
        .with_context(|| "pre-tangle hook aborted the operation")?;

    let written = write_tangled_files(&workspace.root, &bytes).with_context(|| "tangle failed")?;

    let _ = dispatch(&workspace.root, HookEvent::PostTangle, &[], false);

    let result = TangleResult {
        written: written
            .iter()
            .map(|p| p.display().to_string())
            .collect(),
    };
    println!("{}", serde_json::to_string(&result)?);
    Ok(())
}

/// Operates on a workspace of plain Markdown files: refiling subtrees, running
/// and approving eval blocks, expanding capture templates, and tangling code.
#[derive(Parser, Debug)]
struct Options {
    #[command(subcommand)]
    command: Command,
    /// The workspace root to operate in.
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Moves a subtree from one heading to another, within or across files.
    Refile {
        /// Selector naming the subtree to move, e.g. `inbox.md#task one`.
        source: String,
        /// Selector naming where to move it, e.g. `work.md#projects`.
        dest: String,
        /// Insert right after the destination heading instead of at the end of its subtree.
        #[arg(long)]
        prepend: bool,
        /// Suppress pre-* hooks for this operation.
        #[arg(long)]
        no_verify: bool,
    },
    /// Runs, approves, revokes, or lists eval blocks.
    Eval {
        #[command(subcommand)]
        command: EvalCommand,
    },
    /// Expands a capture template into the workspace.
    Capture {
        /// Path to the template file.
        template: String,
        /// Suppress pre-* hooks for this operation.
        #[arg(long)]
        no_verify: bool,
    },
    /// Moves a subtree to the workspace's configured archive location.
    Archive {
        /// Selector naming the subtree to archive, e.g. `inbox.md#done task`.
        source: String,
        /// Suppress pre-* hooks for this operation.
        #[arg(long)]
        no_verify: bool,
    },
    /// Tangles a document's tagged eval blocks out to their destination files.
    Tangle {
        /// Selector naming the file to tangle (no heading fragment needed).
        file: String,
    },
}

#[derive(Subcommand, Debug)]
enum EvalCommand {
    /// Runs an eval block and splices its output into the document's results region.
    Run {
        file: String,
        #[arg(short, long)]
        name: Option<String>,
        #[arg(long)]
        no_verify: bool,
    },
    /// Approves a block to run under the given mode.
    Approve {
        file: String,
        name: String,
        #[arg(short, long, default_value = "hash")]
        mode: ModeArg,
    },
    /// Revokes a block's (or, with no `--name`, a whole document's) approval.
    Revoke {
        file: String,
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Lists every current approval.
    List,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Hash,
    Prompt,
    Always,
}

impl From<ModeArg> for ApprovalMode {
    fn from(value: ModeArg) -> Self {
        match value {
            ModeArg::Hash => ApprovalMode::Hash,
            ModeArg::Prompt => ApprovalMode::Prompt,
            ModeArg::Always => ApprovalMode::Always,
        }
    }
}
