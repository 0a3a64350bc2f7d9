use thiserror::Error;

/// Errors that can occur while operating on a workspace, a single document, or the
/// approval/hook/evaluator machinery built on top of it.
///
/// There is deliberately one flat error type for the whole crate rather than one
/// per component: callers surface these uniformly regardless of which component
/// raised them (see the taxonomy this mirrors).
#[derive(Debug, Error)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to (de)serialize json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to parse yaml front matter: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("malformed selector '{selector}': {reason}")]
    Selector { selector: String, reason: String },

    #[error("no heading found matching '{selector}' in {file}")]
    NotFound { file: String, selector: String },

    #[error("block '{block_name}' requires approval before it can run")]
    ApprovalRequired { block_name: String },

    #[error("{event} hook aborted the operation (exit code {code})")]
    HookAborted { event: String, code: i32 },

    #[error("evaluator for block '{block_name}' exceeded its timeout of {timeout_ms}ms")]
    Timeout { block_name: String, timeout_ms: u64 },

    #[error(
        "no evaluator found for language '{lang}' (not a built-in, and no jot-eval-{lang} on PATH)"
    )]
    EvaluatorNotFound { lang: String },

    #[error("invalid value for '{field}': {reason}")]
    Validation { field: String, reason: String },
}

impl Error {
    pub(crate) fn selector(selector: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Selector {
            selector: selector.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
