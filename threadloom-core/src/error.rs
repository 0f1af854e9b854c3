//! Error types for Threadloom operations

use std::time::Duration;
use thiserror::Error;

/// Key-value store errors.
///
/// These never escape the storage crate's degradable client; every
/// policy component sees a tri-state outcome instead.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store operation {operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    #[error("Store connection failed: {reason}")]
    Connection { reason: String },

    #[error("Store backend error: {reason}")]
    Backend { reason: String },

    #[error("Store is offline")]
    Offline,
}

/// Validation errors for caller-supplied input.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Text is empty after whitespace normalization")]
    EmptyText,

    #[error("Invalid max length {max_length}: must be at least {minimum}")]
    InvalidMaxLength { max_length: usize, minimum: usize },

    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Incompatible options: {option_a} and {option_b}")]
    IncompatibleOptions { option_a: String, option_b: String },
}

/// Entitlement grant errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GrantError {
    #[error("Grant {grant_id} for {identity} could not be recorded: store unavailable")]
    StoreUnavailable { identity: String, grant_id: String },

    #[error("Grant id must not be empty")]
    EmptyGrantId,
}

/// Master error type for all Threadloom errors.
#[derive(Debug, Clone, Error)]
pub enum ThreadloomError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Grant error: {0}")]
    Grant(#[from] GrantError),
}

/// Result type alias for Threadloom operations.
pub type ThreadloomResult<T> = Result<T, ThreadloomError>;

// =============================================================================
// TESTS
// =============================================================================
