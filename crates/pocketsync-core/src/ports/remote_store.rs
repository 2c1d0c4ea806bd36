//! Remote store port (driven/secondary port)
//!
//! Generic contract for the authoritative row-oriented data service: single-row
//! select, patch-style update, insert with idempotent-upsert semantics, blob
//! upload, and a live-change subscription. The engine never talks HTTP itself;
//! it speaks this port and lets the adapter crate own the wire format.

use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

/// A remote row: column name to scalar/array value
pub type Row = serde_json::Map<String, Value>;

/// Equality filter selecting rows where `column == value`.
///
/// The sync core only ever addresses rows by owning identity, so a single
/// equality predicate is the whole query language.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    /// Column to compare
    pub column: String,
    /// Value the column must equal
    pub value: Value,
}

impl Filter {
    /// Creates an equality filter
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }
}

/// Errors that can occur when communicating with the remote store
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Network-level failure, rate limiting, or a server-side (5xx) error.
    /// The action stays queued and is retried on the next flush.
    #[error("Transient remote error: {0}")]
    Transient(String),

    /// Insert hit a uniqueness constraint; a racing writer already created
    /// the row, so upsert-style callers treat this as success
    #[error("Unique constraint violation: {0}")]
    UniqueViolation(String),

    /// Permanent rejection (validation or authorization); retrying the same
    /// payload will not succeed
    #[error("Rejected by remote store ({status}): {message}")]
    Rejected {
        /// HTTP-style status code reported by the adapter
        status: u16,
        /// Server-provided reason
        message: String,
    },

    /// The response could not be parsed or was structurally malformed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl RemoteError {
    /// Returns true if the error is worth retrying on a later flush
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Transient(_))
    }

    /// Returns true if the error is a uniqueness violation (upsert success)
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, RemoteError::UniqueViolation(_))
    }

    /// Returns true for permanent rejections that should count against
    /// an action's bounded-retry budget
    pub fn is_permanent_rejection(&self) -> bool {
        matches!(self, RemoteError::Rejected { .. })
    }
}

/// Port trait for the authoritative remote store
#[async_trait::async_trait]
pub trait IRemoteStore: Send + Sync {
    /// Fetches at most one row matching the filter
    async fn select_one(&self, table: &str, filter: &Filter) -> Result<Option<Row>, RemoteError>;

    /// Patches matching rows, returning the number of rows affected.
    /// Zero affected rows means the row does not exist yet.
    async fn update(&self, table: &str, filter: &Filter, patch: &Row)
        -> Result<u64, RemoteError>;

    /// Inserts a new row. A [`RemoteError::UniqueViolation`] means a racing
    /// writer already satisfied the intent.
    async fn insert(&self, table: &str, row: &Row) -> Result<(), RemoteError>;

    /// Uploads bytes to blob storage, returning the resulting reference
    /// (URL or path) to store in the photo-list field
    async fn upload_blob(
        &self,
        bucket: &str,
        path: &str,
        bytes: &[u8],
    ) -> Result<String, RemoteError>;

    /// Subscribes to live row changes matching the filter.
    ///
    /// Rows arrive on the returned channel as the server pushes them; the
    /// channel closes when the subscription ends. Push deliveries are always
    /// at least as fresh as anything computed locally, so consumers apply
    /// them unconditionally.
    async fn subscribe(&self, table: &str, filter: &Filter)
        -> Result<mpsc::Receiver<Row>, RemoteError>;
}
