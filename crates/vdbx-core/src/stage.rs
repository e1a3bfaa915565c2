//! Stage Trait: one step of a command's processing
use serde_json::Value;
use thiserror::Error;
use vdbx_policy::Verdict;

use crate::context::ExecutionContext;

/// A result row
pub type Row = Value;

/// Contract for every processing step the runner drives
pub trait Stage: Send + Sync {
    /// Unique stage id (e.g. "policy.gate.v1")
    fn id(&self) -> &'static str;

    /// Whether output depends only on input (default: true)
    fn deterministic(&self) -> bool {
        true
    }

    /// Transform `rows` in the scope of `ctx`
    fn run(&self, rows: &[Row], ctx: &ExecutionContext) -> Result<Vec<Row>, StageError>;
}

#[derive(Error, Debug)]
pub enum StageError {
    /// Recorded as a warning; the stage's input passes through unchanged
    #[error("RECOVERABLE: {0:#}")]
    Recoverable(anyhow::Error),

    #[error("FATAL: {0}")]
    Fatal(String),

    #[error("ACCESS: {resource}: {verdict}")]
    AccessDenied { resource: String, verdict: Verdict },

    #[error("VALIDATION: {0}")]
    Validation(String),
}

impl StageError {
    pub fn recoverable(error: impl Into<anyhow::Error>) -> Self {
        StageError::Recoverable(error.into())
    }

    pub fn is_recoverable(&self) -> bool {
        matches!(self, StageError::Recoverable(_))
    }
}
