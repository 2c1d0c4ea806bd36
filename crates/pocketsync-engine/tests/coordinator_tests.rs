//! End-to-end tests of the sync coordinator over an in-memory store and a
//! scriptable fake remote
//!
//! The fake remote can be toggled offline, reject specific fields, and fail
//! specific blob uploads, which lets each test script exactly one failure
//! mode and observe how the outboxes and the visible record respond.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::{mpsc, watch};

use pocketsync_core::config::{Config, SyncConfig};
use pocketsync_core::domain::{ActionKind, FieldPatch, IdentityId, Readiness};
use pocketsync_core::ports::remote_store::{Filter, IRemoteStore, RemoteError, Row};
use pocketsync_engine::{spawn_connectivity_watcher, IdentityGuard, SyncCoordinator};
use pocketsync_store::MemoryKeyValueStore;

// ============================================================================
// Fake remote
// ============================================================================

#[derive(Default)]
struct FakeRemote {
    /// One row per identity, keyed by whatever column inserts carry
    rows: Mutex<Vec<Row>>,
    /// When false, every call fails with a transient error
    online: AtomicBool,
    /// Patches touching any of these fields are rejected with a 422
    rejected_fields: Mutex<HashSet<String>>,
    /// Blob paths containing this substring fail to upload
    failing_upload: Mutex<Option<String>>,
    /// Every patch row accepted by update(), in arrival order
    update_log: Mutex<Vec<Row>>,
    /// Every accepted blob path
    uploads: Mutex<Vec<String>>,
    push_tx: Mutex<Option<mpsc::Sender<Row>>>,
}

impl FakeRemote {
    fn online() -> Arc<Self> {
        let remote = Self::default();
        remote.online.store(true, Ordering::SeqCst);
        Arc::new(remote)
    }

    fn offline() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    fn reject_field(&self, field: &str) {
        self.rejected_fields.lock().unwrap().insert(field.into());
    }

    fn fail_uploads_containing(&self, needle: Option<&str>) {
        *self.failing_upload.lock().unwrap() = needle.map(str::to_owned);
    }

    fn check_online(&self) -> Result<(), RemoteError> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RemoteError::Transient("network unreachable".into()))
        }
    }

    fn row_field(&self, filter: &Filter, field: &str) -> Option<Value> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|row| row.get(&filter.column) == Some(&filter.value))
            .and_then(|row| row.get(field).cloned())
    }

    fn seed_row(&self, row: Row) {
        self.rows.lock().unwrap().push(row);
    }

    fn logged_updates(&self, field: &str) -> Vec<Value> {
        self.update_log
            .lock()
            .unwrap()
            .iter()
            .filter_map(|row| row.get(field).cloned())
            .collect()
    }

    async fn push(&self, row: Row) {
        let tx = self.push_tx.lock().unwrap().clone();
        tx.expect("no subscription open").send(row).await.unwrap();
    }
}

#[async_trait::async_trait]
impl IRemoteStore for FakeRemote {
    async fn select_one(&self, _table: &str, filter: &Filter) -> Result<Option<Row>, RemoteError> {
        self.check_online()?;
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|row| row.get(&filter.column) == Some(&filter.value))
            .cloned())
    }

    async fn update(&self, _table: &str, filter: &Filter, patch: &Row) -> Result<u64, RemoteError> {
        self.check_online()?;

        let rejected = self.rejected_fields.lock().unwrap();
        if let Some(field) = patch.keys().find(|k| rejected.contains(*k)) {
            return Err(RemoteError::Rejected {
                status: 422,
                message: format!("field {field} failed validation"),
            });
        }
        drop(rejected);

        let mut rows = self.rows.lock().unwrap();
        match rows
            .iter_mut()
            .find(|row| row.get(&filter.column) == Some(&filter.value))
        {
            Some(row) => {
                for (k, v) in patch {
                    row.insert(k.clone(), v.clone());
                }
                self.update_log.lock().unwrap().push(patch.clone());
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn insert(&self, _table: &str, row: &Row) -> Result<(), RemoteError> {
        self.check_online()?;

        let mut rows = self.rows.lock().unwrap();
        let exists = rows
            .iter()
            .any(|existing| existing.get("user_id") == row.get("user_id"));
        if exists {
            return Err(RemoteError::UniqueViolation("user_id".into()));
        }
        rows.push(row.clone());
        self.update_log.lock().unwrap().push(row.clone());
        Ok(())
    }

    async fn upload_blob(
        &self,
        bucket: &str,
        path: &str,
        _bytes: &[u8],
    ) -> Result<String, RemoteError> {
        self.check_online()?;

        if let Some(needle) = self.failing_upload.lock().unwrap().as_deref() {
            if path.contains(needle) {
                return Err(RemoteError::Transient("upload interrupted".into()));
            }
        }

        let reference = format!("{bucket}/{path}");
        self.uploads.lock().unwrap().push(reference.clone());
        Ok(reference)
    }

    async fn subscribe(
        &self,
        _table: &str,
        _filter: &Filter,
    ) -> Result<mpsc::Receiver<Row>, RemoteError> {
        self.check_online()?;
        let (tx, rx) = mpsc::channel(8);
        *self.push_tx.lock().unwrap() = Some(tx);
        Ok(rx)
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn test_config() -> Config {
    Config {
        sync: SyncConfig {
            refresh_min_gap_secs: 0,
            flush_min_gap_secs: 0,
            draft_debounce_ms: 0,
            max_rejections: 2,
            photo_field: "pictures".to_string(),
        },
        ..Config::default()
    }
}

fn identity(value: &str) -> IdentityId {
    IdentityId::new(value).unwrap()
}

fn coordinator(remote: Arc<FakeRemote>, uid: &str) -> Arc<SyncCoordinator> {
    Arc::new(SyncCoordinator::new(
        Arc::new(MemoryKeyValueStore::new()),
        remote,
        identity(uid),
        &test_config(),
    ))
}

fn bio_patch(text: &str) -> FieldPatch {
    let mut patch = FieldPatch::new();
    patch.insert("bio".to_string(), json!(text));
    patch
}

/// Lets the opportunistic flush spawned by a local mutation settle
async fn settle() {
    tokio::time::sleep(Duration::from_millis(30)).await;
}

// ============================================================================
// Local-first behavior
// ============================================================================

#[tokio::test]
async fn test_update_while_offline_is_visible_and_queued() {
    let remote = FakeRemote::offline();
    let sync = coordinator(remote, "user-1");

    sync.update_patch(ActionKind::UpdateProfile, bio_patch("written offline"))
        .await
        .unwrap();
    settle().await;

    let record = sync.current_value().await.unwrap();
    assert_eq!(record.field("bio"), Some(&json!("written offline")));
    assert_eq!(sync.pending_actions().await, 1);
    assert_eq!(sync.readiness().await, Readiness::CachedStale);
}

#[tokio::test]
async fn test_readiness_starts_at_no_data() {
    let sync = coordinator(FakeRemote::offline(), "user-1");
    assert_eq!(sync.readiness().await, Readiness::NoData);
    assert!(sync.current_value().await.is_none());
}

#[tokio::test]
async fn test_flush_after_reconnect_delivers_and_confirms() {
    let remote = FakeRemote::offline();
    let sync = coordinator(remote.clone(), "user-1");

    sync.update_patch(ActionKind::UpdateProfile, bio_patch("hello"))
        .await
        .unwrap();
    settle().await;
    assert_eq!(sync.pending_actions().await, 1);

    remote.set_online(true);
    let outcome = sync.flush().await.unwrap();

    assert!(outcome.ran);
    assert_eq!(outcome.actions.sent, 1);
    assert_eq!(sync.pending_actions().await, 0);
    assert_eq!(sync.readiness().await, Readiness::Fresh);

    // Row was created via the insert fallback and carries the field
    let filter = Filter::eq("user_id", "user-1");
    assert_eq!(remote.row_field(&filter, "bio"), Some(json!("hello")));
}

#[tokio::test]
async fn test_flush_is_idempotent_per_action() {
    let remote = FakeRemote::online();
    let sync = coordinator(remote.clone(), "user-1");

    sync.update_patch(ActionKind::UpdateProfile, bio_patch("once"))
        .await
        .unwrap();
    settle().await;

    // Pile on extra triggers; the action must not be delivered again
    sync.flush().await.unwrap();
    sync.flush().await.unwrap();
    sync.refresh().await.unwrap();
    sync.flush().await.unwrap();

    assert_eq!(remote.logged_updates("bio"), vec![json!("once")]);
}

#[tokio::test]
async fn test_flush_preserves_enqueue_order() {
    let remote = FakeRemote::offline();
    let sync = coordinator(remote.clone(), "user-1");

    for text in ["first", "second", "third"] {
        sync.update_patch(ActionKind::UpdateProfile, bio_patch(text))
            .await
            .unwrap();
    }
    settle().await;

    remote.set_online(true);
    sync.flush().await.unwrap();

    assert_eq!(
        remote.logged_updates("bio"),
        vec![json!("first"), json!("second"), json!("third")]
    );
}

// ============================================================================
// Pull and push
// ============================================================================

fn server_row(uid: &str, bio: &str, updated_at: &str) -> Row {
    let mut row = Row::new();
    row.insert("user_id".to_string(), json!(uid));
    row.insert("bio".to_string(), json!(bio));
    row.insert("updated_at".to_string(), json!(updated_at));
    row
}

#[tokio::test]
async fn test_refresh_applies_newer_server_record() {
    let remote = FakeRemote::offline();
    remote.seed_row(server_row("user-1", "from server", "2099-01-01T00:00:00Z"));

    let sync = coordinator(remote.clone(), "user-1");
    sync.update_patch(ActionKind::UpdateProfile, bio_patch("local"))
        .await
        .unwrap();
    settle().await;

    remote.set_online(true);
    sync.refresh().await.unwrap();
    let record = sync.current_value().await.unwrap();
    assert_eq!(record.field("bio"), Some(&json!("from server")));
}

#[tokio::test]
async fn test_refresh_keeps_local_when_server_is_older() {
    let remote = FakeRemote::offline();
    remote.seed_row(server_row("user-1", "stale", "2001-01-01T00:00:00Z"));

    let sync = coordinator(remote.clone(), "user-1");
    // Local edit stamped now, far newer than the seeded row
    sync.update_patch(ActionKind::UpdateProfile, bio_patch("local wins"))
        .await
        .unwrap();
    settle().await;

    remote.set_online(true);
    sync.refresh().await.unwrap();
    let record = sync.current_value().await.unwrap();
    assert_eq!(record.field("bio"), Some(&json!("local wins")));
}

#[tokio::test]
async fn test_refresh_offline_keeps_cached_value() {
    let remote = FakeRemote::offline();
    let sync = coordinator(remote, "user-1");

    sync.update_patch(ActionKind::UpdateProfile, bio_patch("cached"))
        .await
        .unwrap();
    settle().await;

    let readiness = sync.refresh().await.unwrap();
    assert_eq!(readiness, Readiness::CachedStale);
    let record = sync.current_value().await.unwrap();
    assert_eq!(record.field("bio"), Some(&json!("cached")));
}

#[tokio::test]
async fn test_push_overwrites_even_when_older() {
    let remote = FakeRemote::online();
    let sync = coordinator(remote, "user-1");

    sync.update_patch(ActionKind::UpdateProfile, bio_patch("local"))
        .await
        .unwrap();
    settle().await;

    // Server-initiated write with an ancient watermark still wins
    let mut pushed = Row::new();
    pushed.insert("bio".to_string(), json!("pushed"));
    pushed.insert("updated_at".to_string(), json!("2001-01-01T00:00:00Z"));
    sync.apply_from_push(pushed).await.unwrap();

    let record = sync.current_value().await.unwrap();
    assert_eq!(record.field("bio"), Some(&json!("pushed")));
}

#[tokio::test]
async fn test_push_subscription_applies_rows() {
    let remote = FakeRemote::online();
    let sync = coordinator(remote.clone(), "user-1");

    let handle = sync.start_push_subscription().await.unwrap();
    remote
        .push(server_row("user-1", "live update", "2099-01-01T00:00:00Z"))
        .await;
    settle().await;

    let record = sync.current_value().await.unwrap();
    assert_eq!(record.field("bio"), Some(&json!("live update")));

    // Dropping the sender ends the task cleanly
    *remote.push_tx.lock().unwrap() = None;
    handle.await.unwrap();
}

// ============================================================================
// Connectivity-triggered retry
// ============================================================================

#[tokio::test]
async fn test_reconnect_edge_flushes_queued_actions() {
    let remote = FakeRemote::offline();
    let sync = coordinator(remote.clone(), "user-1");

    sync.update_patch(ActionKind::UpdateProfile, bio_patch("queued"))
        .await
        .unwrap();
    settle().await;
    assert_eq!(sync.pending_actions().await, 1);

    let (tx, rx) = watch::channel(false);
    let watcher = spawn_connectivity_watcher(rx, sync.clone());

    remote.set_online(true);
    tx.send(true).unwrap();
    settle().await;

    assert_eq!(sync.pending_actions().await, 0);
    let filter = Filter::eq("user_id", "user-1");
    assert_eq!(remote.row_field(&filter, "bio"), Some(json!("queued")));

    drop(tx);
    watcher.await.unwrap();
}

#[tokio::test]
async fn test_staying_online_does_not_retrigger() {
    let remote = FakeRemote::online();
    let sync = coordinator(remote.clone(), "user-1");

    let (tx, rx) = watch::channel(true);
    let watcher = spawn_connectivity_watcher(rx, sync.clone());

    // online -> online edges are not transitions
    tx.send(true).unwrap();
    tx.send(true).unwrap();
    settle().await;

    assert!(remote.update_log.lock().unwrap().is_empty());
    drop(tx);
    watcher.await.unwrap();
}

// ============================================================================
// Rejections
// ============================================================================

#[tokio::test]
async fn test_rejected_action_parks_after_budget_and_can_be_acknowledged() {
    let remote = FakeRemote::online();
    remote.seed_row(server_row("user-1", "", "2001-01-01T00:00:00Z"));
    remote.reject_field("bio");

    let sync = coordinator(remote.clone(), "user-1");
    let id = sync
        .update_patch(ActionKind::UpdateProfile, bio_patch("invalid"))
        .await
        .unwrap();
    settle().await;

    // max_rejections is 2 in the test config
    sync.flush().await.unwrap();
    sync.flush().await.unwrap();

    assert_eq!(sync.pending_actions().await, 0);
    let rejected = sync.rejected_actions().await;
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].id(), id);

    assert!(sync.acknowledge_rejected(id).await.unwrap());
    assert!(sync.rejected_actions().await.is_empty());
}

// ============================================================================
// Photos
// ============================================================================

#[tokio::test]
async fn test_photo_upload_appends_reference() {
    let remote = FakeRemote::online();
    remote.seed_row(server_row("user-1", "x", "2001-01-01T00:00:00Z"));

    let sync = coordinator(remote.clone(), "user-1");
    sync.hydrate().await;
    sync.add_photo("avatar.jpg", vec![1, 2, 3]).await.unwrap();
    settle().await;
    sync.flush().await.unwrap();

    assert_eq!(sync.pending_photos().await, 0);
    let record = sync.current_value().await.unwrap();
    let pictures = record.string_list("pictures");
    assert_eq!(pictures.len(), 1);
    assert!(pictures[0].contains("avatar.jpg"));

    // The rewritten list also reached the server row
    let filter = Filter::eq("user_id", "user-1");
    let remote_pictures = remote.row_field(&filter, "pictures").unwrap();
    assert_eq!(remote_pictures.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_photo_partial_failure_keeps_failed_entry_queued() {
    let remote = FakeRemote::offline();
    remote.seed_row(server_row("user-1", "x", "2001-01-01T00:00:00Z"));

    let sync = coordinator(remote.clone(), "user-1");
    for name in ["one.jpg", "two.jpg", "three.jpg"] {
        sync.add_photo(name, vec![1]).await.unwrap();
    }
    settle().await;

    remote.set_online(true);
    remote.fail_uploads_containing(Some("two.jpg"));
    sync.flush().await.unwrap();

    // First and third landed; second stayed queued in order
    let record = sync.current_value().await.unwrap();
    let pictures = record.string_list("pictures");
    assert_eq!(pictures.len(), 2);
    assert!(pictures[0].contains("one.jpg"));
    assert!(pictures[1].contains("three.jpg"));
    assert_eq!(sync.pending_photos().await, 1);

    // Once the fault clears, the retained entry goes through
    remote.fail_uploads_containing(None);
    sync.flush().await.unwrap();
    assert_eq!(sync.pending_photos().await, 0);
    let record = sync.current_value().await.unwrap();
    assert_eq!(record.string_list("pictures").len(), 3);
}

#[tokio::test]
async fn test_replace_photo_with_stale_index_appends() {
    let remote = FakeRemote::online();
    remote.seed_row(server_row("user-1", "x", "2001-01-01T00:00:00Z"));

    let sync = coordinator(remote, "user-1");
    sync.replace_photo(4, "swap.jpg", vec![1]).await.unwrap();
    settle().await;
    sync.flush().await.unwrap();

    // Index 4 does not exist in an empty list, so the reference appends
    let record = sync.current_value().await.unwrap();
    let pictures = record.string_list("pictures");
    assert_eq!(pictures.len(), 1);
    assert!(pictures[0].contains("swap.jpg"));
}

// ============================================================================
// Identity isolation and hydration
// ============================================================================

#[tokio::test]
async fn test_identities_are_isolated_on_a_shared_store() {
    let kv = Arc::new(MemoryKeyValueStore::new());
    let remote = FakeRemote::offline();
    let config = test_config();

    let sync_a = Arc::new(SyncCoordinator::new(
        kv.clone(),
        remote.clone(),
        identity("user-a"),
        &config,
    ));
    let sync_b = Arc::new(SyncCoordinator::new(
        kv,
        remote,
        identity("user-b"),
        &config,
    ));

    sync_a
        .update_patch(ActionKind::UpdateProfile, bio_patch("a's data"))
        .await
        .unwrap();
    settle().await;

    assert!(sync_b.current_value().await.is_none());
    sync_b.hydrate().await;
    assert!(sync_b.current_value().await.is_none());
    assert_eq!(sync_b.pending_actions().await, 0);
}

#[tokio::test]
async fn test_hydrate_restores_cached_record_across_sessions() {
    let kv = Arc::new(MemoryKeyValueStore::new());
    let remote = FakeRemote::offline();
    let config = test_config();

    let first = Arc::new(SyncCoordinator::new(
        kv.clone(),
        remote.clone(),
        identity("user-1"),
        &config,
    ));
    first
        .update_patch(ActionKind::UpdateProfile, bio_patch("persisted"))
        .await
        .unwrap();
    settle().await;
    drop(first);

    // A new coordinator over the same store (a restart)
    let second = Arc::new(SyncCoordinator::new(
        kv,
        remote,
        identity("user-1"),
        &config,
    ));
    assert!(second.current_value().await.is_none());
    second.hydrate().await;

    let record = second.current_value().await.unwrap();
    assert_eq!(record.field("bio"), Some(&json!("persisted")));
    // The queued action survived too
    assert_eq!(second.pending_actions().await, 1);
}

#[tokio::test]
async fn test_identity_switch_then_hydrate_sees_nothing() {
    let kv = Arc::new(MemoryKeyValueStore::new());
    let remote = FakeRemote::offline();
    let config = test_config();
    let guard = IdentityGuard::new(kv.clone());

    guard.bind(&identity("user-a")).await.unwrap();
    let sync_a = Arc::new(SyncCoordinator::new(
        kv.clone(),
        remote.clone(),
        identity("user-a"),
        &config,
    ));
    sync_a
        .update_patch(ActionKind::UpdateProfile, bio_patch("secret"))
        .await
        .unwrap();
    settle().await;
    drop(sync_a);

    guard.bind(&identity("user-b")).await.unwrap();

    // Even a coordinator re-bound to user-a finds the store cleared
    let sync_a_again = Arc::new(SyncCoordinator::new(
        kv,
        remote,
        identity("user-a"),
        &config,
    ));
    sync_a_again.hydrate().await;
    assert!(sync_a_again.current_value().await.is_none());
    assert_eq!(sync_a_again.pending_actions().await, 0);
}

// ============================================================================
// Record watch channel
// ============================================================================

#[tokio::test]
async fn test_watch_sees_local_and_pushed_changes() {
    let remote = FakeRemote::offline();
    let sync = coordinator(remote, "user-1");
    let mut rx = sync.watch_record();

    assert!(rx.borrow().is_none());

    sync.update_patch(ActionKind::UpdateProfile, bio_patch("v1"))
        .await
        .unwrap();
    rx.changed().await.unwrap();
    assert_eq!(
        rx.borrow().as_ref().unwrap().field("bio"),
        Some(&json!("v1"))
    );

    let mut pushed = Row::new();
    pushed.insert("bio".to_string(), json!("v2"));
    sync.apply_from_push(pushed).await.unwrap();
    rx.changed().await.unwrap();
    assert_eq!(
        rx.borrow().as_ref().unwrap().field("bio"),
        Some(&json!("v2"))
    );
}
