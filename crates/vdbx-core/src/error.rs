//! Unified Error Model
use thiserror::Error;

use crate::stage::StageError;

/// Failure to construct an execution context
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    #[error("CTX/MISSING: {0} is required")]
    MissingField(&'static str),

    #[error("CTX/BATCH: processor batch size must be positive, got {0}")]
    InvalidBatchSize(usize),

    #[error("CTX/TZ: unrecognized time zone {0:?}")]
    InvalidTimeZone(String),
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Context(#[from] ContextError),

    #[error("STAGE/{stage}: {source}")]
    Stage {
        stage: String,
        #[source]
        source: StageError,
    },

    #[error("CONFIG/{0}")]
    Config(String),

    #[error("CONFIG/PARSE: {0}")]
    ConfigParse(#[from] serde_yaml::Error),
}
