// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

use crate::types::ExecutionId;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid submission: {0}")]
    InvalidSubmission(String),

    #[error("Failed to launch load tool: {0}")]
    LaunchFailed(String),

    #[error("Execution not found: {0}")]
    NotFound(ExecutionId),

    #[error("Batch engine is no longer running")]
    EngineStopped,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, EngineError>;
