//! Photo upload outbox
//!
//! A durable FIFO queue of [`PhotoUploadEntry`]s persisted under
//! `photo_outbox:<uid>`, payload bytes embedded in the stored JSON. Photos
//! travel separately from field patches because their delivery is two-phased:
//! first the bytes go to blob storage, then the resulting reference is woven
//! into the record's photo-list field.
//!
//! An entry leaves the queue only after BOTH phases succeed; a failure at
//! either phase retains the entry for the next flush, in its original
//! relative order.
//!
//! As with the action outbox, enqueues can land while a drain's uploads are
//! in flight. Queue writes are serialized on one lock and a drain removes
//! only the entries it delivered from the live queue, never persisting its
//! pre-upload snapshot wholesale.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, warn};

use pocketsync_core::domain::{ActionId, IdentityId, PhotoUploadEntry};
use pocketsync_core::ports::remote_store::RemoteError;
use pocketsync_core::ports::{keys, IKeyValueStore};

/// Summary of one photo drain pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhotoDrainOutcome {
    /// Entries fully delivered (bytes uploaded AND reference applied)
    pub uploaded: usize,
    /// Entries retained for a later flush
    pub retained: usize,
}

/// Durable FIFO queue of photo uploads, scoped to one identity
pub struct PhotoOutbox {
    kv: Arc<dyn IKeyValueStore>,
    identity: IdentityId,
    /// Serializes read-modify-write cycles on the persisted queue. Never
    /// held across an upload, only around load-and-persist pairs.
    write_lock: tokio::sync::Mutex<()>,
}

impl PhotoOutbox {
    /// Creates a photo outbox for `identity`
    pub fn new(kv: Arc<dyn IKeyValueStore>, identity: IdentityId) -> Self {
        Self {
            kv,
            identity,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Queues an append of a new photo
    pub async fn enqueue_add(
        &self,
        file_base_name: impl Into<String>,
        bytes: Vec<u8>,
    ) -> anyhow::Result<ActionId> {
        self.enqueue(PhotoUploadEntry::add(file_base_name, bytes))
            .await
    }

    /// Queues a replacement of the photo at `index`
    pub async fn enqueue_replace(
        &self,
        index: usize,
        file_base_name: impl Into<String>,
        bytes: Vec<u8>,
    ) -> anyhow::Result<ActionId> {
        self.enqueue(PhotoUploadEntry::replace(index, file_base_name, bytes))
            .await
    }

    async fn enqueue(&self, entry: PhotoUploadEntry) -> anyhow::Result<ActionId> {
        let id = entry.id();
        let _guard = self.write_lock.lock().await;
        let mut queue = self.load().await;
        queue.push(entry);
        self.persist(&queue).await?;

        debug!(
            identity = %self.identity,
            entry_id = %id,
            queued = queue.len(),
            "Photo upload enqueued"
        );
        Ok(id)
    }

    /// Drains the queue in order through a two-phase delivery.
    ///
    /// `upload` sends the payload to blob storage and returns the resulting
    /// reference; `apply` weaves that reference into the photo-list field.
    /// An entry is removed only after both phases succeed. A failure in
    /// either phase retains the entry; later entries are still attempted,
    /// so one bad payload cannot wedge the queue.
    pub async fn drain<U, UFut, A, AFut>(
        &self,
        mut upload: U,
        mut apply: A,
    ) -> anyhow::Result<PhotoDrainOutcome>
    where
        U: FnMut(PhotoUploadEntry) -> UFut,
        UFut: Future<Output = Result<String, RemoteError>>,
        A: FnMut(PhotoUploadEntry, String) -> AFut,
        AFut: Future<Output = anyhow::Result<()>>,
    {
        let snapshot = self.load().await;
        if snapshot.is_empty() {
            return Ok(PhotoDrainOutcome::default());
        }

        let mut outcome = PhotoDrainOutcome::default();
        let mut delivered: Vec<ActionId> = Vec::new();

        for entry in snapshot {
            let reference = match upload(entry.clone()).await {
                Ok(reference) => reference,
                Err(err) => {
                    debug!(
                        entry_id = %entry.id(),
                        error = %err,
                        "Photo upload failed, entry retained"
                    );
                    outcome.retained += 1;
                    continue;
                }
            };

            match apply(entry.clone(), reference).await {
                Ok(()) => {
                    outcome.uploaded += 1;
                    delivered.push(entry.id());
                }
                Err(err) => {
                    // Bytes landed but the record update did not; keep the
                    // entry so the reference gets applied on the next pass.
                    warn!(
                        entry_id = %entry.id(),
                        error = %err,
                        "Photo reference not applied, entry retained"
                    );
                    outcome.retained += 1;
                }
            }
        }

        // Remove delivered entries from the live queue under the write lock
        // so an enqueue that landed mid-upload is kept, not overwritten.
        let _guard = self.write_lock.lock().await;
        let queue: Vec<PhotoUploadEntry> = self
            .load()
            .await
            .into_iter()
            .filter(|entry| !delivered.contains(&entry.id()))
            .collect();
        self.persist(&queue).await?;

        debug!(
            identity = %self.identity,
            uploaded = outcome.uploaded,
            retained = outcome.retained,
            "Photo outbox drained"
        );
        Ok(outcome)
    }

    /// Number of queued uploads
    pub async fn len(&self) -> usize {
        self.load().await.len()
    }

    /// Returns true if nothing is queued
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// All queued entries in order
    pub async fn entries(&self) -> Vec<PhotoUploadEntry> {
        self.load().await
    }

    /// Destroys the queue entirely (identity switch / sign-out)
    pub async fn clear(&self) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().await;
        self.kv.remove(&keys::photo_outbox(&self.identity)).await?;
        debug!(identity = %self.identity, "Photo outbox cleared");
        Ok(())
    }

    /// Loads the persisted queue; missing or undecodable data reads as empty
    async fn load(&self) -> Vec<PhotoUploadEntry> {
        let stored = match self.kv.get(&keys::photo_outbox(&self.identity)).await {
            Ok(Some(value)) => value,
            Ok(None) => return Vec::new(),
            Err(err) => {
                warn!(identity = %self.identity, error = %err, "Failed to read photo outbox");
                return Vec::new();
            }
        };

        match serde_json::from_str(&stored) {
            Ok(queue) => queue,
            Err(err) => {
                warn!(
                    identity = %self.identity,
                    error = %err,
                    "Malformed photo outbox, starting empty"
                );
                Vec::new()
            }
        }
    }

    /// Persists the queue back in one write
    async fn persist(&self, queue: &[PhotoUploadEntry]) -> anyhow::Result<()> {
        if queue.is_empty() {
            self.kv.remove(&keys::photo_outbox(&self.identity)).await
        } else {
            let document = serde_json::to_string(queue)?;
            self.kv
                .set(&keys::photo_outbox(&self.identity), &document)
                .await
        }
    }
}
