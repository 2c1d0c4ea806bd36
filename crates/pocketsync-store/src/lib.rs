//! Pocketsync Store - Durable local state
//!
//! Everything the sync core persists locally lives behind this crate:
//! - The durable key-value adapters ([`SqliteKeyValueStore`], [`MemoryKeyValueStore`])
//! - The per-identity record cache ([`RecordCache`])
//! - The FIFO pending-action outbox ([`ActionOutbox`])
//! - The photo upload outbox ([`PhotoOutbox`])
//! - The debounced, local-only draft pad ([`DraftPad`])
//!
//! ## Architecture
//!
//! This crate implements the `IKeyValueStore` port from `pocketsync-core`
//! and builds the cache/outbox components on top of that port, so any
//! durable string store can back them. It is a driven (secondary) adapter
//! in the hexagonal architecture.
//!
//! Expected conditions never cross this crate's boundary as errors: a
//! missing key or an undecodable document reads back as "no value".

pub mod cache;
pub mod draft;
pub mod kv;
pub mod outbox;
pub mod photo_outbox;
pub mod pool;

pub use cache::RecordCache;
pub use draft::DraftPad;
pub use kv::{MemoryKeyValueStore, SqliteKeyValueStore};
pub use outbox::{ActionOutbox, DrainOutcome};
pub use photo_outbox::{PhotoDrainOutcome, PhotoOutbox};
pub use pool::StorePool;

/// Errors raised while opening the durable store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Failed to establish a database connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}
