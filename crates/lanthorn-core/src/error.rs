//! Error types for Lanthorn

use thiserror::Error;

/// Main error type for Lanthorn domain operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LanthornError {
    #[error("Association type not recognised: {0}")]
    UnknownAssociationType(String),

    #[error("Invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },
}
