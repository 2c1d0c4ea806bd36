//! Local record cache
//!
//! Persists the per-identity [`CachedRecord`] snapshot plus its `updated_at`
//! watermark over the key-value port. The watermark is stored under its own
//! key so a corrupt record document still leaves a comparable timestamp for
//! the pull-side conflict rule.
//!
//! No network access happens here, and expected conditions (missing key,
//! undecodable JSON) read back as `None` rather than erroring.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use pocketsync_core::domain::{CachedRecord, IdentityId};
use pocketsync_core::ports::{keys, IKeyValueStore};

/// Cache of the per-identity record snapshot and watermark
pub struct RecordCache {
    kv: Arc<dyn IKeyValueStore>,
}

impl RecordCache {
    /// Creates a cache over the given key-value store
    pub fn new(kv: Arc<dyn IKeyValueStore>) -> Self {
        Self { kv }
    }

    /// Reads the cached record for `identity`.
    ///
    /// Returns `None` when nothing is cached or when the stored document
    /// fails to deserialize; a decode failure is a cache miss, so callers
    /// fall back to a server fetch instead of handling an error.
    pub async fn read(&self, identity: &IdentityId) -> Option<CachedRecord> {
        let stored = match self.kv.get(&keys::record(identity)).await {
            Ok(value) => value?,
            Err(err) => {
                warn!(identity = %identity, error = %err, "Failed to read cached record");
                return None;
            }
        };

        match serde_json::from_str::<CachedRecord>(&stored) {
            Ok(record) if record.identity() == identity => Some(record),
            Ok(record) => {
                // A record persisted under the wrong owner is a leak, not a miss.
                warn!(
                    expected = %identity,
                    found = %record.identity(),
                    "Cached record owned by a different identity, ignoring"
                );
                None
            }
            Err(err) => {
                warn!(identity = %identity, error = %err, "Malformed cached record, treating as miss");
                None
            }
        }
    }

    /// Reads just the watermark for `identity`.
    ///
    /// An unparseable stored timestamp reads as `None`, which makes the
    /// next pull accept the server value.
    pub async fn watermark(&self, identity: &IdentityId) -> Option<DateTime<Utc>> {
        let stored = self
            .kv
            .get(&keys::record_updated_at(identity))
            .await
            .ok()??;

        DateTime::parse_from_rfc3339(&stored)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    }

    /// Writes the record for `identity` as a total overwrite of the stored
    /// document, persisting the watermark alongside.
    pub async fn write(&self, identity: &IdentityId, record: &CachedRecord) -> anyhow::Result<()> {
        let document = serde_json::to_string(record)?;
        self.kv.set(&keys::record(identity), &document).await?;
        self.kv
            .set(
                &keys::record_updated_at(identity),
                &record.updated_at().to_rfc3339(),
            )
            .await?;

        debug!(identity = %identity, updated_at = %record.updated_at(), "Cached record written");
        Ok(())
    }

    /// Removes the record and watermark for `identity`
    pub async fn clear(&self, identity: &IdentityId) -> anyhow::Result<()> {
        self.kv.remove(&keys::record(identity)).await?;
        self.kv.remove(&keys::record_updated_at(identity)).await?;
        debug!(identity = %identity, "Cached record cleared");
        Ok(())
    }
}
