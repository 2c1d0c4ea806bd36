//! Domain entities and business logic
//!
//! This module contains the core domain types for Pocketsync:
//! - Newtypes for type-safe identifiers
//! - The cached record snapshot and its freshness watermark
//! - Pending actions and photo upload entries queued in the outboxes
//! - Domain-specific error types

pub mod action;
pub mod errors;
pub mod newtypes;
pub mod record;

// Re-export commonly used types
pub use action::{ActionKind, PendingAction, PhotoOp, PhotoUploadEntry};
pub use errors::DomainError;
pub use newtypes::{ActionId, IdentityId};
pub use record::{CachedRecord, FieldPatch, Readiness, UPDATED_AT_FIELD};
