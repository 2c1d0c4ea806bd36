//! CachedRecord domain entity
//!
//! The [`CachedRecord`] is the per-identity snapshot of the user's
//! profile/preferences data. It pairs a field map with the `updated_at`
//! watermark used by the pull-side conflict rule.
//!
//! ## Write paths
//!
//! ```text
//!   update_patch (local)  ──► merge_patch()        stamps updated_at = now
//!   apply_from_push       ──► from_server_fields() carries server updated_at
//!   apply_from_pull       ──► from_server_fields() + supersedes() check
//! ```
//!
//! Invariant: at most one CachedRecord per identity is resident at a time;
//! the owning identity is fixed at construction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::newtypes::IdentityId;

/// A patch or snapshot of record fields: field name to scalar/array value.
///
/// Non-photo payloads never contain binary data; photo bytes travel through
/// the photo upload outbox instead.
pub type FieldPatch = serde_json::Map<String, Value>;

/// Column carrying the freshness watermark in remote rows and field maps
pub const UPDATED_AT_FIELD: &str = "updated_at";

// ============================================================================
// Readiness
// ============================================================================

/// Freshness of the locally visible record, exposed to presentation layers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    /// Nothing cached and nothing fetched yet
    NoData,
    /// A cached snapshot is visible but unconfirmed sends are queued
    /// or no successful refresh has happened this session
    CachedStale,
    /// The last refresh or push confirmed the visible value
    Fresh,
}

impl Readiness {
    /// Returns true if some value is visible to the caller
    pub fn has_data(&self) -> bool {
        !matches!(self, Readiness::NoData)
    }

    /// Returns true if the visible value is confirmed by the server
    pub fn is_fresh(&self) -> bool {
        matches!(self, Readiness::Fresh)
    }
}

// ============================================================================
// CachedRecord
// ============================================================================

/// Per-identity snapshot of profile/preferences fields plus its watermark
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedRecord {
    /// Owning user id; key families in the durable store are scoped by this
    identity: IdentityId,
    /// Field name to scalar/array value
    fields: FieldPatch,
    /// Freshness watermark; refreshed on every local write, carried verbatim
    /// from the server on pull/push writes
    updated_at: DateTime<Utc>,
}

impl CachedRecord {
    /// Creates an empty record for `identity`, stamped now
    pub fn new(identity: IdentityId) -> Self {
        Self {
            identity,
            fields: FieldPatch::new(),
            updated_at: Utc::now(),
        }
    }

    /// Reconstructs a record from stored parts without re-stamping
    pub fn from_parts(identity: IdentityId, fields: FieldPatch, updated_at: DateTime<Utc>) -> Self {
        Self {
            identity,
            fields,
            updated_at,
        }
    }

    /// Builds a record from a server row's field map.
    ///
    /// The server's own `updated_at` is extracted from the map when present
    /// and parseable; otherwise the record is stamped now, which makes the
    /// server value win any comparison against a missing local watermark.
    pub fn from_server_fields(identity: IdentityId, mut fields: FieldPatch) -> Self {
        let updated_at = fields
            .remove(UPDATED_AT_FIELD)
            .and_then(|v| v.as_str().map(str::to_owned))
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        Self {
            identity,
            fields,
            updated_at,
        }
    }

    // --- Getters ---

    /// Returns the owning identity
    pub fn identity(&self) -> &IdentityId {
        &self.identity
    }

    /// Returns the field map
    pub fn fields(&self) -> &FieldPatch {
        &self.fields
    }

    /// Returns a single field value
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Returns the freshness watermark
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    // --- Mutators ---

    /// Merges a local patch into the record and stamps `updated_at = now()`.
    ///
    /// This is the optimistic-apply path; only local mutations come through
    /// here. Pull/push writes replace the record wholesale instead.
    pub fn merge_patch(&mut self, patch: &FieldPatch) {
        for (name, value) in patch {
            self.fields.insert(name.clone(), value.clone());
        }
        self.updated_at = Utc::now();
    }

    /// Decides the pull-side conflict rule: the pulled record (self)
    /// supersedes the local state iff the local watermark is missing or
    /// strictly older than the server's.
    pub fn supersedes(&self, local_watermark: Option<DateTime<Utc>>) -> bool {
        match local_watermark {
            Some(local) => self.updated_at > local,
            None => true,
        }
    }

    // --- Photo list helpers ---

    /// Reads a string-array field (the photo-list field), tolerating
    /// missing or non-array values as empty
    pub fn string_list(&self, field: &str) -> Vec<String> {
        self.fields
            .get(field)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_owned))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Overwrites a string-array field and stamps `updated_at = now()`
    pub fn set_string_list(&mut self, field: &str, values: Vec<String>) {
        self.fields.insert(
            field.to_string(),
            Value::Array(values.into_iter().map(Value::String).collect()),
        );
        self.updated_at = Utc::now();
    }

    /// Serializes the record into a remote row: all fields plus the
    /// watermark and the identity under the given column name
    pub fn to_row(&self, identity_column: &str) -> FieldPatch {
        let mut row = self.fields.clone();
        row.insert(
            identity_column.to_string(),
            Value::String(self.identity.to_string()),
        );
        row.insert(
            UPDATED_AT_FIELD.to_string(),
            Value::String(self.updated_at.to_rfc3339()),
        );
        row
    }
}
