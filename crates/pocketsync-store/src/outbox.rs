//! Pending-action outbox
//!
//! An ordered, durable queue of not-yet-confirmed field mutations, persisted
//! as a JSON array under `outbox:<uid>`. Insertion order is preserved across
//! restarts, and a drain retains failed sends in their original relative
//! order for the next externally triggered flush.
//!
//! ## Failure policy
//!
//! A failed send is not retried in a tight loop; it waits for the next
//! flush trigger (manual save, connectivity transition, periodic nudge).
//! Transient failures leave an action untouched. Permanent rejections count
//! against a bounded budget; once exhausted the action is *parked*: it stays
//! persisted and visible through [`ActionOutbox::rejected`], but the
//! automatic drain skips it until the caller acknowledges and removes it.
//!
//! ## Concurrency
//!
//! Enqueues keep landing while a drain's sends are in flight (the
//! coordinator flushes on a detached task). Every read-modify-write of the
//! persisted queue runs under one lock, and a drain never persists its
//! pre-send snapshot: it re-reads the live queue under that lock and removes
//! only the actions it actually delivered, so a mid-drain enqueue survives.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, warn};

use pocketsync_core::domain::{ActionId, ActionKind, FieldPatch, IdentityId, PendingAction};
use pocketsync_core::ports::remote_store::RemoteError;
use pocketsync_core::ports::{keys, IKeyValueStore};

/// Summary of one drain pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainOutcome {
    /// Actions delivered and removed from the queue
    pub sent: usize,
    /// Actions retained for a later flush (transient failures and
    /// not-yet-exhausted rejections)
    pub retained: usize,
    /// Actions newly parked this pass (rejection budget exhausted)
    pub parked: usize,
}

/// Durable FIFO queue of [`PendingAction`]s, scoped to one identity.
///
/// The queue is bound to its owning identity at construction; switching
/// identity constructs a fresh outbox over the new key rather than mixing
/// actions across identities.
pub struct ActionOutbox {
    kv: Arc<dyn IKeyValueStore>,
    identity: IdentityId,
    max_rejections: u32,
    /// Serializes read-modify-write cycles on the persisted queue. Never
    /// held while a send is in flight, only around load-and-persist pairs.
    write_lock: tokio::sync::Mutex<()>,
}

impl ActionOutbox {
    /// Creates an outbox for `identity` with the given rejection budget
    pub fn new(kv: Arc<dyn IKeyValueStore>, identity: IdentityId, max_rejections: u32) -> Self {
        Self {
            kv,
            identity,
            max_rejections,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Appends an action to the durable queue and returns its id.
    ///
    /// Never touches the network.
    pub async fn enqueue(&self, kind: ActionKind, patch: FieldPatch) -> anyhow::Result<ActionId> {
        let action = PendingAction::new(kind, patch);
        let id = action.id();

        let _guard = self.write_lock.lock().await;
        let mut queue = self.load().await;
        queue.push(action);
        self.persist(&queue).await?;

        debug!(
            identity = %self.identity,
            action_id = %id,
            kind = kind.name(),
            queued = queue.len(),
            "Action enqueued"
        );
        Ok(id)
    }

    /// Drains the queue in order, calling `sender` for each active action.
    ///
    /// - Success removes the action.
    /// - A transient failure retains it, in original relative order.
    /// - A permanent rejection increments its budget; exhausting the budget
    ///   parks it out of future automatic drains.
    /// - A uniqueness violation means a racing writer already satisfied the
    ///   intent, so the action counts as sent.
    ///
    /// Callers guard against concurrent drains (see the coordinator's flush
    /// guard); concurrent enqueues are handled here. Actions enqueued while
    /// a send was in flight stay queued but are not part of this pass's
    /// outcome counts.
    pub async fn drain<F, Fut>(&self, mut sender: F) -> anyhow::Result<DrainOutcome>
    where
        F: FnMut(PendingAction) -> Fut,
        Fut: Future<Output = Result<(), RemoteError>>,
    {
        let snapshot = self.load().await;
        if snapshot.is_empty() {
            return Ok(DrainOutcome::default());
        }

        let mut outcome = DrainOutcome::default();
        let mut sent_ids: Vec<ActionId> = Vec::new();
        let mut rewritten: Vec<PendingAction> = Vec::new();

        for mut action in snapshot {
            if action.rejections() >= self.max_rejections {
                // Parked: awaiting explicit acknowledgement, not resent.
                continue;
            }

            match sender(action.clone()).await {
                Ok(()) => {
                    outcome.sent += 1;
                    sent_ids.push(action.id());
                }
                Err(err) if err.is_unique_violation() => {
                    debug!(
                        action_id = %action.id(),
                        "Uniqueness violation during send, intent already satisfied"
                    );
                    outcome.sent += 1;
                    sent_ids.push(action.id());
                }
                Err(err) if err.is_permanent_rejection() => {
                    action.record_rejection();
                    if action.rejections() >= self.max_rejections {
                        warn!(
                            action_id = %action.id(),
                            rejections = action.rejections(),
                            error = %err,
                            "Action parked after repeated permanent rejections"
                        );
                        outcome.parked += 1;
                    } else {
                        debug!(
                            action_id = %action.id(),
                            rejections = action.rejections(),
                            error = %err,
                            "Action rejected, retained for retry"
                        );
                        outcome.retained += 1;
                    }
                    rewritten.push(action);
                }
                Err(err) => {
                    debug!(
                        action_id = %action.id(),
                        error = %err,
                        "Send failed, action retained"
                    );
                    outcome.retained += 1;
                }
            }
        }

        // Persist against the live queue, not the pre-send snapshot: drop
        // what was delivered, carry rejection counts forward, and keep
        // anything enqueued while the sends were in flight.
        let _guard = self.write_lock.lock().await;
        let queue: Vec<PendingAction> = self
            .load()
            .await
            .into_iter()
            .filter(|action| !sent_ids.contains(&action.id()))
            .map(|action| {
                rewritten
                    .iter()
                    .find(|r| r.id() == action.id())
                    .cloned()
                    .unwrap_or(action)
            })
            .collect();
        self.persist(&queue).await?;

        debug!(
            identity = %self.identity,
            sent = outcome.sent,
            retained = outcome.retained,
            parked = outcome.parked,
            "Outbox drained"
        );
        Ok(outcome)
    }

    /// Number of actions still eligible for automatic sending
    pub async fn len(&self) -> usize {
        self.load()
            .await
            .iter()
            .filter(|a| a.rejections() < self.max_rejections)
            .count()
    }

    /// Returns true if no active actions are queued
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// All queued actions in order, parked ones included
    pub async fn actions(&self) -> Vec<PendingAction> {
        self.load().await
    }

    /// Actions parked after exhausting their rejection budget
    pub async fn rejected(&self) -> Vec<PendingAction> {
        self.load()
            .await
            .into_iter()
            .filter(|a| a.rejections() >= self.max_rejections)
            .collect()
    }

    /// Removes one action by id (the acknowledge-rejection path).
    /// Returns whether anything was removed.
    pub async fn remove(&self, id: ActionId) -> anyhow::Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut queue = self.load().await;
        let before = queue.len();
        queue.retain(|a| a.id() != id);
        let removed = queue.len() != before;
        if removed {
            self.persist(&queue).await?;
        }
        Ok(removed)
    }

    /// Destroys the queue entirely (identity switch / sign-out)
    pub async fn clear(&self) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().await;
        self.kv.remove(&keys::outbox(&self.identity)).await?;
        debug!(identity = %self.identity, "Outbox cleared");
        Ok(())
    }

    /// Loads the persisted queue; missing or undecodable data reads as empty
    async fn load(&self) -> Vec<PendingAction> {
        let stored = match self.kv.get(&keys::outbox(&self.identity)).await {
            Ok(Some(value)) => value,
            Ok(None) => return Vec::new(),
            Err(err) => {
                warn!(identity = %self.identity, error = %err, "Failed to read outbox");
                return Vec::new();
            }
        };

        match serde_json::from_str(&stored) {
            Ok(queue) => queue,
            Err(err) => {
                warn!(identity = %self.identity, error = %err, "Malformed outbox, starting empty");
                Vec::new()
            }
        }
    }

    /// Persists the queue back in one write
    async fn persist(&self, queue: &[PendingAction]) -> anyhow::Result<()> {
        if queue.is_empty() {
            self.kv.remove(&keys::outbox(&self.identity)).await
        } else {
            let document = serde_json::to_string(queue)?;
            self.kv.set(&keys::outbox(&self.identity), &document).await
        }
    }
}
