//! Identity guard
//!
//! Prevents the one persisted-state bug that matters most in a multi-account
//! app: user B seeing user A's cached data. The durable store keeps a marker
//! recording which identity its key families belong to; binding a different
//! identity clears the previous owner's families BEFORE the new session
//! reads anything.
//!
//! Session-scoped caches that live outside the durable store register
//! through [`ClearOnRebind`] and are emptied in the same pass.

use std::sync::Arc;

use tracing::{debug, info};

use pocketsync_core::domain::IdentityId;
use pocketsync_core::ports::{keys, IKeyValueStore};
use pocketsync_store::{ActionOutbox, PhotoOutbox, RecordCache};

/// In-memory state that must not survive an identity switch
pub trait ClearOnRebind: Send + Sync {
    /// Drops everything scoped to the previous identity
    fn clear_for_rebind(&self);
}

/// What a bind found in the durable store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindOutcome {
    /// First bind on this device, nothing to clear
    FirstBind,
    /// The marker already matched; persisted state is reusable
    SameIdentity,
    /// A different identity owned the store; its families were cleared
    /// before the marker moved
    SwitchedFrom(IdentityId),
}

/// Guards the durable store against cross-identity leakage
pub struct IdentityGuard {
    kv: Arc<dyn IKeyValueStore>,
    session_caches: Vec<Arc<dyn ClearOnRebind>>,
}

impl IdentityGuard {
    /// Creates a guard over the durable store
    pub fn new(kv: Arc<dyn IKeyValueStore>) -> Self {
        Self {
            kv,
            session_caches: Vec::new(),
        }
    }

    /// Registers a session-scoped cache to empty on every switch
    pub fn register(&mut self, cache: Arc<dyn ClearOnRebind>) {
        self.session_caches.push(cache);
    }

    /// Binds `identity` as the owner of the persisted state.
    ///
    /// Call on session start, before any component reads the store. If a
    /// different identity was bound previously, every one of its key families
    /// is cleared first, so a crash mid-clear can only leave LESS stale data,
    /// never serve it.
    pub async fn bind(&self, identity: &IdentityId) -> anyhow::Result<BindOutcome> {
        let previous = self
            .kv
            .get(keys::LAST_BOUND_IDENTITY)
            .await?
            .and_then(|raw| raw.parse::<IdentityId>().ok());

        let outcome = match previous {
            None => BindOutcome::FirstBind,
            Some(ref prev) if prev == identity => {
                debug!(identity = %identity, "Identity marker matches, keeping persisted state");
                return Ok(BindOutcome::SameIdentity);
            }
            Some(prev) => {
                info!(from = %prev, to = %identity, "Identity switch, clearing persisted state");
                self.clear_families(&prev).await?;
                for cache in &self.session_caches {
                    cache.clear_for_rebind();
                }
                BindOutcome::SwitchedFrom(prev)
            }
        };

        // Marker moves only after the clears have landed
        self.kv
            .set(keys::LAST_BOUND_IDENTITY, identity.as_str())
            .await?;
        Ok(outcome)
    }

    /// Unbinds entirely (sign-out): clears the bound identity's families
    /// and the marker itself
    pub async fn unbind(&self) -> anyhow::Result<()> {
        if let Some(raw) = self.kv.get(keys::LAST_BOUND_IDENTITY).await? {
            if let Ok(identity) = raw.parse::<IdentityId>() {
                self.clear_families(&identity).await?;
            }
        }
        for cache in &self.session_caches {
            cache.clear_for_rebind();
        }
        self.kv.remove(keys::LAST_BOUND_IDENTITY).await?;
        info!("Identity unbound, persisted state cleared");
        Ok(())
    }

    /// Clears every durable key family owned by `identity`
    async fn clear_families(&self, identity: &IdentityId) -> anyhow::Result<()> {
        RecordCache::new(self.kv.clone()).clear(identity).await?;
        ActionOutbox::new(self.kv.clone(), identity.clone(), u32::MAX)
            .clear()
            .await?;
        PhotoOutbox::new(self.kv.clone(), identity.clone())
            .clear()
            .await?;
        self.kv.remove(&keys::draft(identity)).await?;
        Ok(())
    }
}
