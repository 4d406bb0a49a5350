use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the reel engine.
///
/// `Validation` is raised before a job starts and never reaches the job
/// state machine. Everything else raised from inside a stage is terminal for
/// the job, except tagging failures, which the analyze stage downgrades.
#[derive(Debug, Error)]
pub enum ReelError {
    #[error("Invalid job request: {0}")]
    Validation(String),

    #[error("No candidate windows: {0}")]
    NoCandidates(String),

    #[error("Empty timeline")]
    EmptyTimeline,

    #[error("Missing proxy for {0}")]
    MissingProxy(String),

    #[error("{tool} failed: {message}")]
    ExternalTool { tool: String, message: String },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ReelError {
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        ReelError::ExternalTool {
            tool: tool.into(),
            message: message.into(),
        }
    }
}

pub type ReelResult<T> = Result<T, ReelError>;
