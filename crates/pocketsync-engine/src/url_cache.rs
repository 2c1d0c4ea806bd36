//! Session-scoped signed URL cache
//!
//! Photo references stored in the record are stable blob paths; displaying
//! them requires a short-lived signed URL minted by the storage service. This
//! cache keeps minted URLs for their validity window so scrolling back and
//! forth does not re-mint on every view.
//!
//! The cache is session-scoped and never persisted. It implements
//! [`ClearOnRebind`](crate::identity::ClearOnRebind) so an identity switch
//! empties it along with the durable families.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::identity::ClearOnRebind;

/// In-memory map of blob reference to signed URL with expiry
pub struct SignedUrlCache {
    ttl: Duration,
    /// Lock discipline: held only for the map operation, never across await
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl SignedUrlCache {
    /// Creates a cache whose entries expire after `ttl`
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached signed URL for `reference` if still valid
    pub fn get(&self, reference: &str) -> Option<String> {
        let mut entries = self.entries.lock().expect("url cache mutex poisoned");
        if let Some((url, minted)) = entries.get(reference) {
            if minted.elapsed() < self.ttl {
                return Some(url.clone());
            }
        }
        // Expired or absent; evict so the map does not grow with dead entries
        entries.remove(reference);
        None
    }

    /// Stores a freshly minted signed URL for `reference`
    pub fn put(&self, reference: impl Into<String>, signed_url: impl Into<String>) {
        self.entries
            .lock()
            .expect("url cache mutex poisoned")
            .insert(reference.into(), (signed_url.into(), Instant::now()));
    }

    /// Drops every cached URL
    pub fn clear(&self) {
        self.entries
            .lock()
            .expect("url cache mutex poisoned")
            .clear();
    }

    /// Number of cached URLs, expired entries included until next access
    pub fn len(&self) -> usize {
        self.entries.lock().expect("url cache mutex poisoned").len()
    }

    /// Returns true if nothing is cached
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ClearOnRebind for SignedUrlCache {
    fn clear_for_rebind(&self) {
        self.clear();
    }
}
