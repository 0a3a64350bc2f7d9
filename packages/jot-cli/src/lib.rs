//! Thin re-exports and result envelopes for the `jot` binary. Everything that
//! actually does something lives in `jot-core`; this crate only wires it up
//! to a command line and shapes what gets printed back.

pub use jot_core::{approval, ast, error, eval_block, evaluator, hooks, refile, results, selector, subtree, tangle, template, workspace};

use serde::Serialize;

/// Printed (as JSON) after a successful `jot refile`.
#[derive(Debug, Serialize)]
pub struct RefileResult {
    pub source: String,
    pub destination: String,
}

/// One block's outcome from a `jot eval run`. A run without `--name` drives
/// every eval block in the file and reports each independently, collecting
/// per-block errors into the returned list — a failure in one block never
/// prevents the others from running.
#[derive(Debug, Serialize)]
pub struct EvalResult {
    pub block: String,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Printed (as JSON) after a successful `jot capture`.
#[derive(Debug, Serialize)]
pub struct CaptureResult {
    pub destination: String,
}

/// Printed (as JSON) after a successful `jot tangle`.
#[derive(Debug, Serialize)]
pub struct TangleResult {
    pub written: Vec<String>,
}
