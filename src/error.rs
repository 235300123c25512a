//! Error types for the expectation pipeline

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnsureError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error(
        "Missing route parameter '{param}' for {file_path}. \
         Supply it in a comment, e.g. `// ensureUI: with {param} 123 the page shows ...`"
    )]
    MissingRouteParam { param: String, file_path: String },

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Timeout after {timeout_ms}ms waiting for: {what}")]
    Timeout { what: String, timeout_ms: u64 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl EnsureError {
    /// Collapse a browser-driver failure into an execution error.
    pub fn execution(err: impl std::fmt::Display) -> Self {
        EnsureError::Execution(err.to_string())
    }
}

pub type EnsureResult<T> = Result<T, EnsureError>;
