//! Error types for Tangles shared types

use thiserror::Error;

/// Result type alias for Tangles common operations
pub type Result<T> = std::result::Result<T, TanglesError>;

/// Validation errors raised while constructing shared domain values
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TanglesError {
    #[error("Invalid source reference: {0}")]
    InvalidSourceRef(String),

    #[error("Invalid image extension: {0}")]
    InvalidExtension(String),
}
