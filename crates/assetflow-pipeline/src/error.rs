//! Errors raised by the pipelines.

use std::path::Path;

/// Errors that can occur while running a pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Failed to read {path}: {message}")]
    ReadError { path: String, message: String },

    #[error("Failed to write {path}: {message}")]
    WriteError { path: String, message: String },

    #[error("Invalid glob pattern {pattern}: {message}")]
    GlobError { pattern: String, message: String },

    #[error("Missing input: {0}")]
    MissingInput(String),

    #[error("Include error in {path}: {message}")]
    IncludeError { path: String, message: String },

    #[error("Stylesheet error: {0}")]
    StyleError(String),

    #[error("Script error in {path}: {message}")]
    ScriptError { path: String, message: String },

    #[error("Image error in {path}: {message}")]
    ImageError { path: String, message: String },

    #[error("Font error in {path}: {message}")]
    FontError { path: String, message: String },

    #[error("Sprite error: {0}")]
    SpriteError(String),
}

impl PipelineError {
    pub(crate) fn read(path: &Path, err: impl std::fmt::Display) -> Self {
        Self::ReadError {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }

    pub(crate) fn write(path: &Path, err: impl std::fmt::Display) -> Self {
        Self::WriteError {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }
}
