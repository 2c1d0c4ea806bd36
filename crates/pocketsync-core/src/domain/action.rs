//! Outbox entry types
//!
//! Defines the two kinds of durable, not-yet-confirmed mutations:
//! [`PendingAction`] (field patches against the record) and
//! [`PhotoUploadEntry`] (media payloads bound for blob storage). Both are
//! FIFO-ordered and persisted as JSON arrays under identity-scoped keys.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::ActionId;
use super::record::FieldPatch;

// ============================================================================
// PendingAction
// ============================================================================

/// The closed set of non-photo mutations the outbox can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// A patch against profile fields
    UpdateProfile,
    /// A patch against preference fields
    UpdatePreferences,
}

impl ActionKind {
    /// Returns the kind name as a string
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::UpdateProfile => "update_profile",
            ActionKind::UpdatePreferences => "update_preferences",
        }
    }
}

/// A queued, not-yet-confirmed field mutation awaiting remote delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAction {
    /// Unique id, returned to the caller on enqueue
    id: ActionId,
    /// What the patch targets
    kind: ActionKind,
    /// Opaque field patch; never contains binary data
    patch: FieldPatch,
    /// When the action was enqueued
    created_at: DateTime<Utc>,
    /// Consecutive permanent rejections observed for this action.
    /// Transient failures never increment this.
    #[serde(default)]
    rejections: u32,
}

impl PendingAction {
    /// Creates a new pending action with a fresh id, stamped now
    pub fn new(kind: ActionKind, patch: FieldPatch) -> Self {
        Self {
            id: ActionId::new(),
            kind,
            patch,
            created_at: Utc::now(),
            rejections: 0,
        }
    }

    /// Returns the action id
    pub fn id(&self) -> ActionId {
        self.id
    }

    /// Returns the action kind
    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    /// Returns the field patch
    pub fn patch(&self) -> &FieldPatch {
        &self.patch
    }

    /// Returns when the action was enqueued
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns how many consecutive permanent rejections this action has seen
    pub fn rejections(&self) -> u32 {
        self.rejections
    }

    /// Records one permanent rejection
    pub fn record_rejection(&mut self) {
        self.rejections += 1;
    }
}

// ============================================================================
// PhotoUploadEntry
// ============================================================================

/// What a photo upload does to the photo-list field once its bytes land
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhotoOp {
    /// Append the resulting reference to the photo list
    Add,
    /// Overwrite the reference at `target_index`; falls back to append
    /// when earlier entries have changed the list length
    Replace {
        /// Position in the photo list to overwrite
        target_index: usize,
    },
}

/// A queued media upload with its payload embedded.
///
/// Created when a UI flow finishes local crop/compress; consumed by the
/// flush routine, which uploads the bytes, derives the resulting reference,
/// and rewrites the photo-list field. Entries that fail to upload remain
/// queued, never silently dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoUploadEntry {
    /// Unique id, returned to the caller on enqueue
    id: ActionId,
    /// Add or replace semantics
    op: PhotoOp,
    /// Base name used to derive the blob path (no directories)
    file_base_name: String,
    /// Encoded image payload; base64 in the persisted JSON
    #[serde(with = "payload_base64")]
    bytes: Vec<u8>,
    /// When the entry was enqueued
    created_at: DateTime<Utc>,
}

impl PhotoUploadEntry {
    /// Creates an add entry
    pub fn add(file_base_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            id: ActionId::new(),
            op: PhotoOp::Add,
            file_base_name: file_base_name.into(),
            bytes,
            created_at: Utc::now(),
        }
    }

    /// Creates a replace entry targeting `index` in the photo list
    pub fn replace(index: usize, file_base_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            id: ActionId::new(),
            op: PhotoOp::Replace {
                target_index: index,
            },
            file_base_name: file_base_name.into(),
            bytes,
            created_at: Utc::now(),
        }
    }

    /// Returns the entry id
    pub fn id(&self) -> ActionId {
        self.id
    }

    /// Returns the add/replace operation
    pub fn op(&self) -> PhotoOp {
        self.op
    }

    /// Returns the file base name
    pub fn file_base_name(&self) -> &str {
        &self.file_base_name
    }

    /// Returns the payload bytes
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns when the entry was enqueued
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Applies the resulting upload reference to a photo list.
    ///
    /// Add appends; Replace overwrites `target_index` or appends when the
    /// index is out of range because earlier entries changed the list length.
    pub fn apply_reference(&self, pictures: &mut Vec<String>, reference: String) {
        match self.op {
            PhotoOp::Add => pictures.push(reference),
            PhotoOp::Replace { target_index } => {
                if target_index < pictures.len() {
                    pictures[target_index] = reference;
                } else {
                    pictures.push(reference);
                }
            }
        }
    }
}

/// Base64 (standard alphabet) serde helpers for the embedded photo payload
mod payload_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
