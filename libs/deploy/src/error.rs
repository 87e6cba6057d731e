//! Error types for configuration validation and deployment.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::format::ConfigFormat;

/// A configuration file that cannot be deployed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read {path}: {message}")]
    Unreadable { path: String, message: String },

    /// Extension is neither `.json` nor `.toml`.
    #[error("unsupported configuration format: {0}")]
    UnsupportedFormat(String),

    /// Content does not parse. Line and column are 1-based.
    #[error("{format} syntax error at line {line}, column {column}: {message}")]
    Syntax {
        format: ConfigFormat,
        line: usize,
        column: usize,
        message: String,
    },
}

/// Failures while storing versions or invoking the deployment target.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeployError {
    /// A version with this label already exists. Retrying later yields a new label.
    #[error("configuration version '{0}' already exists")]
    VersionExists(String),

    #[error("version store I/O error at {path}: {message}")]
    Io { path: String, message: String },

    /// The deployment target refused or failed the configuration.
    #[error("deployment failed: {0}")]
    Invocation(String),
}

impl DeployError {
    pub(crate) fn io(path: &Path, err: std::io::Error) -> Self {
        DeployError::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }
}
