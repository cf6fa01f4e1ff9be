use thiserror::Error;

/// Everything that can go wrong in one pipeline invocation. All variants are
/// fatal to the invoking cell's pipeline; there is no retry path because the
/// inputs are static files.
#[derive(Error, Debug)]
pub enum BattdegError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("missing required column(s): {}", .missing.join(", "))]
    SchemaError { missing: Vec<String> },
    #[error("failed to parse {file} line {line}: {reason}")]
    Parse {
        file: String,
        /// 1-based line number in the source file, counting the header.
        line: usize,
        reason: String,
    },
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("failed to parse settings: {0}")]
    Settings(#[from] serde_json::Error),
}

impl BattdegError {
    pub fn schema<S: Into<String>>(missing: Vec<S>) -> Self {
        BattdegError::SchemaError {
            missing: missing.into_iter().map(Into::into).collect(),
        }
    }
}
