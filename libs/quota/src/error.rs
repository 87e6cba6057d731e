//! Error types for quota storage and allocation.

use std::path::PathBuf;

use thiserror::Error;

/// Errors loading, saving or refreshing quota data.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QuotaError {
    /// The quota table file does not exist. Fatal: the engine cannot start.
    #[error("quota file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// Reading a backing file failed.
    #[error("failed to read {path}: {message}")]
    Read { path: String, message: String },

    /// A backing file is not structurally valid.
    #[error("failed to parse {path}: {message}")]
    Parse { path: String, message: String },

    /// Writing a backing file failed.
    #[error("failed to write {path}: {message}")]
    Write { path: String, message: String },

    /// The external refresh source could not provide a table.
    #[error("quota source unavailable: {0}")]
    SourceUnavailable(String),
}

impl QuotaError {
    /// Returns true for errors that must stop the process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, QuotaError::ConfigNotFound(_))
    }
}

/// Why an allocation request was refused.
///
/// These are outcomes, not faults: the ledger logs the reason and leaves its
/// state untouched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AllocationRejected {
    /// A parameter was empty or the amount was not positive.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// No quota entry for the region/SKU pair.
    #[error("no quota for SKU '{sku}' in region '{region}'")]
    UnknownQuota { region: String, sku: String },

    /// The SKU's quota is not assigned to the role.
    #[error("role '{role}' is not assigned to SKU '{sku}' in region '{region}'")]
    RoleNotAssigned {
        region: String,
        sku: String,
        role: String,
    },

    /// Not enough capacity left.
    #[error("insufficient quota in {region}/{sku}: requested {requested}, available {available}")]
    InsufficientQuota {
        region: String,
        sku: String,
        requested: i64,
        available: i64,
    },

    /// The region failed its health check.
    #[error("region '{0}' is unhealthy")]
    RegionUnhealthy(String),

    /// The allocation log could not be written; nothing was committed.
    #[error("failed to persist allocation: {0}")]
    Persistence(String),
}

impl AllocationRejected {
    /// Returns true if the caller supplied bad input.
    pub fn is_invalid_parameters(&self) -> bool {
        matches!(self, AllocationRejected::InvalidParameters(_))
    }
}
