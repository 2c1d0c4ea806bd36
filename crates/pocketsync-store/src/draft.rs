//! Local-only draft pad
//!
//! Holds in-progress edits (a half-written bio, an unconfirmed form) under
//! `draft:<uid>` so an app restart restores them. Drafts are never enqueued
//! and never replayed to the server; they exist purely so typed-but-unsaved
//! text survives process death.
//!
//! Staging is debounced: rapid keystrokes accumulate in memory and hit the
//! durable store only once the configured quiet period has passed (or on an
//! explicit flush, typically at shutdown).

use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use pocketsync_core::domain::{FieldPatch, IdentityId};
use pocketsync_core::ports::{keys, IKeyValueStore};

/// Debounced, per-identity draft storage
pub struct DraftPad {
    kv: Arc<dyn IKeyValueStore>,
    identity: IdentityId,
    debounce: Duration,
    /// Staged-but-not-yet-persisted edits, with the time of the last stage.
    /// Lock discipline: never held across an await point.
    pending: Mutex<Option<(FieldPatch, Instant)>>,
}

impl DraftPad {
    /// Creates a draft pad for `identity` with the given quiet period
    pub fn new(kv: Arc<dyn IKeyValueStore>, identity: IdentityId, debounce: Duration) -> Self {
        Self {
            kv,
            identity,
            debounce,
            pending: Mutex::new(None),
        }
    }

    /// Stages edits in memory, merging over anything already staged.
    ///
    /// Restarts the quiet period; nothing is persisted until [`poll`]
    /// observes the period elapsed or [`flush`] is called.
    ///
    /// [`poll`]: DraftPad::poll
    /// [`flush`]: DraftPad::flush
    pub fn stage(&self, patch: FieldPatch) {
        let mut pending = self.pending.lock().expect("draft mutex poisoned");
        match pending.as_mut() {
            Some((staged, touched)) => {
                for (field, value) in patch {
                    staged.insert(field, value);
                }
                *touched = Instant::now();
            }
            None => *pending = Some((patch, Instant::now())),
        }
    }

    /// Persists the staged draft if the quiet period has elapsed.
    ///
    /// Intended to be driven by a periodic tick. Returns whether a write
    /// happened.
    pub async fn poll(&self) -> anyhow::Result<bool> {
        let ready = {
            let mut pending = self.pending.lock().expect("draft mutex poisoned");
            let quiet = matches!(
                pending.as_ref(),
                Some((_, touched)) if touched.elapsed() >= self.debounce
            );
            if quiet {
                pending.take().map(|(patch, _)| patch)
            } else {
                None
            }
        };

        match ready {
            Some(patch) => {
                self.persist(&patch).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Persists any staged draft immediately, ignoring the quiet period.
    /// Call on shutdown so the last keystrokes are not lost.
    pub async fn flush(&self) -> anyhow::Result<()> {
        let staged = {
            let mut pending = self.pending.lock().expect("draft mutex poisoned");
            pending.take().map(|(patch, _)| patch)
        };

        if let Some(patch) = staged {
            self.persist(&patch).await?;
        }
        Ok(())
    }

    /// Reads the persisted draft; missing or undecodable data reads as `None`
    pub async fn load(&self) -> Option<FieldPatch> {
        let stored = match self.kv.get(&keys::draft(&self.identity)).await {
            Ok(Some(value)) => value,
            Ok(None) => return None,
            Err(err) => {
                warn!(identity = %self.identity, error = %err, "Failed to read draft");
                return None;
            }
        };

        match serde_json::from_str(&stored) {
            Ok(patch) => Some(patch),
            Err(err) => {
                warn!(identity = %self.identity, error = %err, "Malformed draft, discarding");
                None
            }
        }
    }

    /// Drops the staged and persisted draft (submit, discard, or identity
    /// switch)
    pub async fn clear(&self) -> anyhow::Result<()> {
        self.pending.lock().expect("draft mutex poisoned").take();
        self.kv.remove(&keys::draft(&self.identity)).await?;
        debug!(identity = %self.identity, "Draft cleared");
        Ok(())
    }

    async fn persist(&self, patch: &FieldPatch) -> anyhow::Result<()> {
        // The staged draft merges over whatever an earlier session persisted,
        // so reopening the form mid-edit does not lose older fields.
        let mut merged = self.load().await.unwrap_or_default();
        for (field, value) in patch {
            merged.insert(field.clone(), value.clone());
        }

        let document = serde_json::to_string(&merged)?;
        self.kv.set(&keys::draft(&self.identity), &document).await?;
        debug!(identity = %self.identity, fields = merged.len(), "Draft persisted");
        Ok(())
    }
}
