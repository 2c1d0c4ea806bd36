//! Durable key-value store port (driven/secondary port)
//!
//! The smallest persistence contract the sync core needs: string values by
//! key, surviving process restart. The local cache, both outboxes, the draft
//! pad and the identity marker are all built on top of this port.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific
//!   (SQLite, flat files, platform preference stores) and don't need
//!   domain-level classification.
//! - Expected conditions (missing key) are `Ok(None)`, never errors.
//! - Higher layers treat undecodable values as cache misses; this port
//!   only moves strings.

/// Port trait for durable key-value storage
#[async_trait::async_trait]
pub trait IKeyValueStore: Send + Sync {
    /// Returns the value stored under `key`, or `None` if absent
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;

    /// Stores `value` under `key`, overwriting any previous value
    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;

    /// Removes `key` if present; removing an absent key is not an error
    async fn remove(&self, key: &str) -> anyhow::Result<()>;
}

/// Persisted key layout, one family per identity.
///
/// Everything except [`last_bound_identity`](keys::LAST_BOUND_IDENTITY) is
/// scoped by the owning user id, so an identity switch can clear one family
/// without touching another.
pub mod keys {
    use crate::domain::IdentityId;

    /// Marker recording which identity the persisted families belong to;
    /// compared against the live session on cold start
    pub const LAST_BOUND_IDENTITY: &str = "last_bound_identity";

    /// Serialized [`CachedRecord`](crate::domain::CachedRecord) document
    pub fn record(identity: &IdentityId) -> String {
        format!("record:{identity}")
    }

    /// Freshness watermark, stored separately so a corrupt record document
    /// still leaves a comparable timestamp
    pub fn record_updated_at(identity: &IdentityId) -> String {
        format!("record_updated_at:{identity}")
    }

    /// Pending-action outbox (JSON array, FIFO)
    pub fn outbox(identity: &IdentityId) -> String {
        format!("outbox:{identity}")
    }

    /// Photo upload outbox (JSON array, FIFO)
    pub fn photo_outbox(identity: &IdentityId) -> String {
        format!("photo_outbox:{identity}")
    }

    /// Debounced local-only draft; never replayed to the server
    pub fn draft(identity: &IdentityId) -> String {
        format!("draft:{identity}")
    }
}
