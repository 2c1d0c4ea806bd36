//! Pocketsync Engine - Sync orchestration
//!
//! The driving side of the hexagon: this crate owns WHEN things happen.
//! It composes the durable store (`pocketsync-store`) and the remote port
//! (`pocketsync-core::ports::IRemoteStore`, implemented by
//! `pocketsync-remote`) into the offline-first data flow:
//!
//! - [`SyncCoordinator`] - optimistic local apply, outbox flush with
//!   upsert delivery, timestamp-gated pull, unconditional push apply
//! - [`IdentityGuard`] - clears persisted state before a different
//!   identity can read it
//! - [`spawn_connectivity_watcher`] - turns reachability edges into
//!   flush/refresh triggers
//! - [`MinGapLimiter`] - collapses trigger bursts into one effective call
//! - [`SignedUrlCache`] - session-scoped display URLs for photo references
//!
//! ## Threading model
//!
//! Everything is `Send + Sync` and shared through `Arc`; the coordinator
//! serializes flushes with an atomic guard rather than a queue, so any
//! number of triggers can fire concurrently and exactly one does work.

pub mod connectivity;
pub mod coordinator;
pub mod identity;
pub mod limiter;
pub mod telemetry;
pub mod url_cache;

pub use connectivity::spawn_connectivity_watcher;
pub use coordinator::{FlushOutcome, SyncCoordinator};
pub use identity::{BindOutcome, ClearOnRebind, IdentityGuard};
pub use limiter::MinGapLimiter;
pub use url_cache::SignedUrlCache;
