//! Pocketsync Remote - HTTP adapter for the remote store port
//!
//! Implements `pocketsync_core::ports::IRemoteStore` against a
//! PostgREST-style row API plus a blob storage endpoint:
//!
//! - `GET    /{table}?{col}=eq.{val}&limit=1`  - single-row select
//! - `PATCH  /{table}?{col}=eq.{val}`          - patch, returns affected rows
//! - `POST   /{table}`                         - insert (409 on duplicates)
//! - `POST   /storage/{bucket}/{path}`         - blob upload
//! - `GET    /{table}/stream?{col}=eq.{val}`   - newline-delimited JSON
//!   change stream
//!
//! The adapter owns all wire concerns: auth headers, status-code
//! classification into `RemoteError`, and the NDJSON framing of the change
//! stream. Nothing above this crate ever sees an HTTP status.

pub mod client;

pub use client::HttpRemoteStore;
