//! Domain error types
//!
//! Identifier validation failures; richer error taxonomies live with the
//! ports they belong to.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid identity value (empty or malformed user id)
    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),

    /// ID parsing error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),
}
