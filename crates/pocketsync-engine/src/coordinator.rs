//! Sync coordinator
//!
//! Orchestrates the offline-first data flow for one bound identity:
//!
//! ```text
//!   update_patch ──► in-memory merge ──► cache write ──► outbox enqueue
//!                                                             │
//!                                 flush (opportunistic) ◄─────┘
//!                                     │
//!                        update ► insert on 0 rows  (push: server row is
//!                                                    overwritten, LWW)
//!
//!   refresh ──► select_one ──► supersedes? ──► cache + in-memory overwrite
//!   push sub ──► rows ────────► unconditional cache + in-memory overwrite
//! ```
//!
//! A local mutation is applied optimistically and durably BEFORE any network
//! attempt, so the UI never waits on the wire and process death never loses
//! an edit. Flush and refresh are reentrancy-guarded and min-gap limited;
//! a trigger that loses the race simply does nothing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use pocketsync_core::config::{Config, RemoteConfig, SyncConfig};
use pocketsync_core::domain::{
    ActionId, ActionKind, CachedRecord, FieldPatch, IdentityId, PendingAction, PhotoUploadEntry,
    Readiness,
};
use pocketsync_core::domain::UPDATED_AT_FIELD;
use pocketsync_core::ports::remote_store::{Filter, RemoteError, Row};
use pocketsync_core::ports::{IKeyValueStore, IRemoteStore};
use pocketsync_store::{ActionOutbox, DrainOutcome, PhotoDrainOutcome, PhotoOutbox, RecordCache};

use crate::limiter::MinGapLimiter;

/// Summary of one flush attempt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushOutcome {
    /// False when the attempt lost the reentrancy guard or the min gap
    pub ran: bool,
    /// Field-action drain summary
    pub actions: DrainOutcome,
    /// Photo drain summary
    pub photos: PhotoDrainOutcome,
}

impl FlushOutcome {
    fn skipped() -> Self {
        Self::default()
    }
}

/// Per-identity orchestrator of cache, outboxes and remote store
pub struct SyncCoordinator {
    identity: IdentityId,
    remote: Arc<dyn IRemoteStore>,
    cache: RecordCache,
    outbox: ActionOutbox,
    photo_outbox: PhotoOutbox,
    sync_cfg: SyncConfig,
    remote_cfg: RemoteConfig,

    /// The record visible to callers. Tokio mutex because cache writes
    /// happen under it.
    record: Mutex<Option<CachedRecord>>,
    /// Broadcasts every visible-record change to presentation layers
    record_tx: watch::Sender<Option<CachedRecord>>,

    /// Reentrancy guard: at most one flush runs at a time
    flushing: AtomicBool,
    flush_gap: MinGapLimiter,
    refresh_gap: MinGapLimiter,
    /// True once a refresh or a fully drained flush confirmed the visible
    /// value against the server this session
    confirmed: AtomicBool,
}

impl SyncCoordinator {
    /// Creates a coordinator for `identity` over the given adapters.
    ///
    /// The in-memory record starts empty; call [`hydrate`](Self::hydrate)
    /// before first display to restore the cached snapshot.
    pub fn new(
        kv: Arc<dyn IKeyValueStore>,
        remote: Arc<dyn IRemoteStore>,
        identity: IdentityId,
        config: &Config,
    ) -> Self {
        let (record_tx, _) = watch::channel(None);
        Self {
            cache: RecordCache::new(kv.clone()),
            outbox: ActionOutbox::new(kv.clone(), identity.clone(), config.sync.max_rejections),
            photo_outbox: PhotoOutbox::new(kv, identity.clone()),
            identity,
            remote,
            sync_cfg: config.sync.clone(),
            remote_cfg: config.remote.clone(),
            record: Mutex::new(None),
            record_tx,
            flushing: AtomicBool::new(false),
            flush_gap: MinGapLimiter::new(config.sync.flush_min_gap()),
            refresh_gap: MinGapLimiter::new(config.sync.refresh_min_gap()),
            confirmed: AtomicBool::new(false),
        }
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Loads the cached snapshot into memory. Call once on session start;
    /// a cache miss leaves the record empty and readiness at `NoData`.
    pub async fn hydrate(&self) {
        if let Some(cached) = self.cache.read(&self.identity).await {
            debug!(identity = %self.identity, updated_at = %cached.updated_at(), "Hydrated from cache");
            let mut record = self.record.lock().await;
            *record = Some(cached.clone());
            let _ = self.record_tx.send(Some(cached));
        }
    }

    /// The currently visible record, if any
    pub async fn current_value(&self) -> Option<CachedRecord> {
        self.record.lock().await.clone()
    }

    /// Subscribes to visible-record changes
    pub fn watch_record(&self) -> watch::Receiver<Option<CachedRecord>> {
        self.record_tx.subscribe()
    }

    /// Freshness of the visible record
    pub async fn readiness(&self) -> Readiness {
        if self.record.lock().await.is_none() {
            return Readiness::NoData;
        }
        if !self.outbox.is_empty().await || !self.confirmed.load(Ordering::SeqCst) {
            return Readiness::CachedStale;
        }
        Readiness::Fresh
    }

    /// Actions parked after exhausting their rejection budget, awaiting
    /// user acknowledgement
    pub async fn rejected_actions(&self) -> Vec<PendingAction> {
        self.outbox.rejected().await
    }

    /// Discards one parked action; the associated edit stays visible
    /// locally until the next pull or push overwrites it
    pub async fn acknowledge_rejected(&self, id: ActionId) -> anyhow::Result<bool> {
        self.outbox.remove(id).await
    }

    /// Number of actions still awaiting delivery
    pub async fn pending_actions(&self) -> usize {
        self.outbox.len().await
    }

    /// Number of photo uploads still awaiting delivery
    pub async fn pending_photos(&self) -> usize {
        self.photo_outbox.len().await
    }

    // ------------------------------------------------------------------
    // Local mutations
    // ------------------------------------------------------------------

    /// Applies a field patch locally and queues it for delivery.
    ///
    /// The merge, the cache write and the enqueue all complete before any
    /// network attempt; the flush that follows is opportunistic and its
    /// failure changes nothing about what the caller sees.
    pub async fn update_patch(
        self: &Arc<Self>,
        kind: ActionKind,
        patch: FieldPatch,
    ) -> anyhow::Result<ActionId> {
        {
            let mut slot = self.record.lock().await;
            let record = slot.get_or_insert_with(|| CachedRecord::new(self.identity.clone()));
            record.merge_patch(&patch);
            self.cache.write(&self.identity, record).await?;
            let _ = self.record_tx.send(Some(record.clone()));
        }

        self.confirmed.store(false, Ordering::SeqCst);
        let id = self.outbox.enqueue(kind, patch).await?;
        self.spawn_flush();
        Ok(id)
    }

    /// Queues a new photo for upload and appends it to the photo list once
    /// the bytes land
    pub async fn add_photo(
        self: &Arc<Self>,
        file_base_name: impl Into<String>,
        bytes: Vec<u8>,
    ) -> anyhow::Result<ActionId> {
        let id = self.photo_outbox.enqueue_add(file_base_name, bytes).await?;
        self.confirmed.store(false, Ordering::SeqCst);
        self.spawn_flush();
        Ok(id)
    }

    /// Queues a replacement for the photo at `index`
    pub async fn replace_photo(
        self: &Arc<Self>,
        index: usize,
        file_base_name: impl Into<String>,
        bytes: Vec<u8>,
    ) -> anyhow::Result<ActionId> {
        let id = self
            .photo_outbox
            .enqueue_replace(index, file_base_name, bytes)
            .await?;
        self.confirmed.store(false, Ordering::SeqCst);
        self.spawn_flush();
        Ok(id)
    }

    fn spawn_flush(self: &Arc<Self>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(err) = this.flush().await {
                warn!(error = %err, "Opportunistic flush failed");
            }
        });
    }

    // ------------------------------------------------------------------
    // Flush (local -> remote)
    // ------------------------------------------------------------------

    /// Drains both outboxes toward the remote store.
    ///
    /// Safe to call from any trigger at any frequency: a concurrent flush
    /// or one inside the min gap returns immediately with `ran == false`.
    pub async fn flush(&self) -> anyhow::Result<FlushOutcome> {
        if self
            .flushing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Flush already in progress, skipping");
            return Ok(FlushOutcome::skipped());
        }

        let result = self.flush_locked().await;
        self.flushing.store(false, Ordering::SeqCst);
        if result.is_err() {
            // The slot was spent on a failed attempt; reopen it so the next
            // trigger is not refused.
            self.flush_gap.reset();
        }
        result
    }

    async fn flush_locked(&self) -> anyhow::Result<FlushOutcome> {
        if !self.flush_gap.try_acquire() {
            debug!("Flush inside min gap, skipping");
            return Ok(FlushOutcome::skipped());
        }

        let actions = self.outbox.drain(|action| self.send_action(action)).await?;

        let photos = self
            .photo_outbox
            .drain(
                |entry| self.upload_photo(entry),
                |entry, reference| self.apply_photo_reference(entry, reference),
            )
            .await?;

        if actions.retained == 0
            && photos.retained == 0
            && self.outbox.is_empty().await
            && self.photo_outbox.is_empty().await
        {
            self.confirmed.store(true, Ordering::SeqCst);
        }

        info!(
            identity = %self.identity,
            sent = actions.sent,
            retained = actions.retained,
            parked = actions.parked,
            photos_uploaded = photos.uploaded,
            photos_retained = photos.retained,
            "Flush completed"
        );
        Ok(FlushOutcome {
            ran: true,
            actions,
            photos,
        })
    }

    /// Delivers one action as an upsert: patch the identity's row, insert
    /// it when the patch matched nothing. The local value always overwrites
    /// the server's; ordering is resolved on the pull side by timestamp.
    async fn send_action(&self, action: PendingAction) -> Result<(), RemoteError> {
        let mut row: Row = action.patch().clone();
        row.insert(
            UPDATED_AT_FIELD.to_string(),
            Value::String(action.created_at().to_rfc3339()),
        );

        let filter = self.identity_filter();
        let affected = self
            .remote
            .update(&self.remote_cfg.table, &filter, &row)
            .await?;
        if affected > 0 {
            return Ok(());
        }

        // No row yet for this identity: create it from the full local state
        // so the first insert carries every field, not just this patch.
        let full_row = {
            let slot = self.record.lock().await;
            match slot.as_ref() {
                Some(record) => record.to_row(&self.remote_cfg.identity_column),
                None => {
                    let mut row = row;
                    row.insert(
                        self.remote_cfg.identity_column.clone(),
                        Value::String(self.identity.to_string()),
                    );
                    row
                }
            }
        };

        match self.remote.insert(&self.remote_cfg.table, &full_row).await {
            Ok(()) => Ok(()),
            // A racing writer created the row first; the intent is satisfied.
            Err(err) if err.is_unique_violation() => Ok(()),
            Err(err) => Err(err),
        }
    }

    async fn upload_photo(&self, entry: PhotoUploadEntry) -> Result<String, RemoteError> {
        let path = format!(
            "{}/{}_{}",
            self.identity,
            entry.id(),
            entry.file_base_name()
        );
        self.remote
            .upload_blob(&self.remote_cfg.blob_bucket, &path, entry.bytes())
            .await
    }

    /// Second phase of a photo delivery: weave the uploaded reference into
    /// the photo list, remotely first, then locally. A remote failure keeps
    /// the entry queued so the reference is applied on a later pass.
    async fn apply_photo_reference(
        &self,
        entry: PhotoUploadEntry,
        reference: String,
    ) -> anyhow::Result<()> {
        let photo_field = self.sync_cfg.photo_field.clone();

        let mut slot = self.record.lock().await;
        let record = slot.get_or_insert_with(|| CachedRecord::new(self.identity.clone()));
        let mut pictures = record.string_list(&photo_field);
        entry.apply_reference(&mut pictures, reference);

        let mut row = Row::new();
        row.insert(
            photo_field.clone(),
            Value::Array(pictures.iter().cloned().map(Value::String).collect()),
        );
        row.insert(
            UPDATED_AT_FIELD.to_string(),
            Value::String(chrono::Utc::now().to_rfc3339()),
        );

        let filter = self.identity_filter();
        let affected = self
            .remote
            .update(&self.remote_cfg.table, &filter, &row)
            .await?;
        if affected == 0 {
            let mut insert_row = row;
            insert_row.insert(
                self.remote_cfg.identity_column.clone(),
                Value::String(self.identity.to_string()),
            );
            match self.remote.insert(&self.remote_cfg.table, &insert_row).await {
                Ok(()) | Err(RemoteError::UniqueViolation(_)) => {}
                Err(err) => return Err(err.into()),
            }
        }

        // Remote accepted the list; make it visible locally.
        record.set_string_list(&photo_field, pictures);
        self.cache.write(&self.identity, record).await?;
        let _ = self.record_tx.send(Some(record.clone()));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Refresh and server-initiated writes (remote -> local)
    // ------------------------------------------------------------------

    /// Pulls the identity's row and applies it if strictly newer than the
    /// local watermark.
    ///
    /// A refresh that cannot reach the server is an expected condition in
    /// an offline-first client: it logs and leaves the cached value in
    /// place rather than erroring.
    pub async fn refresh(&self) -> anyhow::Result<Readiness> {
        if !self.refresh_gap.try_acquire() {
            debug!("Refresh inside min gap, skipping");
            return Ok(self.readiness().await);
        }

        let filter = self.identity_filter();
        let row = match self.remote.select_one(&self.remote_cfg.table, &filter).await {
            Ok(row) => row,
            Err(err) => {
                warn!(error = %err, "Refresh failed, keeping cached value");
                self.refresh_gap.reset();
                return Ok(self.readiness().await);
            }
        };

        if let Some(fields) = row {
            let incoming = CachedRecord::from_server_fields(self.identity.clone(), fields);
            self.apply_from_pull(incoming).await?;
        }

        if self.outbox.is_empty().await {
            self.confirmed.store(true, Ordering::SeqCst);
        }
        Ok(self.readiness().await)
    }

    /// Applies a pulled record iff it supersedes the local watermark.
    /// Returns whether the local state changed.
    pub async fn apply_from_pull(&self, incoming: CachedRecord) -> anyhow::Result<bool> {
        let mut slot = self.record.lock().await;

        let local_watermark = match slot.as_ref() {
            Some(record) => Some(record.updated_at()),
            None => self.cache.watermark(&self.identity).await,
        };

        if !incoming.supersedes(local_watermark) {
            debug!(
                incoming = %incoming.updated_at(),
                "Pulled record not newer than local, keeping local"
            );
            return Ok(false);
        }

        self.cache.write(&self.identity, &incoming).await?;
        *slot = Some(incoming.clone());
        let _ = self.record_tx.send(Some(incoming));
        debug!(identity = %self.identity, "Pulled record applied");
        Ok(true)
    }

    /// Applies a server-pushed row unconditionally: push deliveries are
    /// always at least as fresh as anything computed locally.
    pub async fn apply_from_push(&self, fields: Row) -> anyhow::Result<()> {
        let incoming = CachedRecord::from_server_fields(self.identity.clone(), fields);

        let mut slot = self.record.lock().await;
        self.cache.write(&self.identity, &incoming).await?;
        *slot = Some(incoming.clone());
        let _ = self.record_tx.send(Some(incoming));
        debug!(identity = %self.identity, "Pushed record applied");
        Ok(())
    }

    /// Opens the live-change subscription and applies pushed rows until the
    /// server closes the stream
    pub async fn start_push_subscription(self: &Arc<Self>) -> anyhow::Result<JoinHandle<()>> {
        let mut rows = self
            .remote
            .subscribe(&self.remote_cfg.table, &self.identity_filter())
            .await?;

        let this = Arc::clone(self);
        Ok(tokio::spawn(async move {
            while let Some(row) = rows.recv().await {
                if let Err(err) = this.apply_from_push(row).await {
                    warn!(error = %err, "Failed to apply pushed record");
                }
            }
            debug!(identity = %this.identity, "Push subscription closed");
        }))
    }

    fn identity_filter(&self) -> Filter {
        Filter::eq(
            self.remote_cfg.identity_column.clone(),
            self.identity.as_str(),
        )
    }
}
