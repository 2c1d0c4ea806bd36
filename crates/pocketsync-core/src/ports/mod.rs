//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the domain core
//! depends on, but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IKeyValueStore`] - Durable key-value storage backing the local cache,
//!   both outboxes, and the identity marker
//! - [`IRemoteStore`] - Row-oriented authoritative remote store with blob
//!   storage and a live-change stream

pub mod key_value_store;
pub mod remote_store;

pub use key_value_store::{keys, IKeyValueStore};
pub use remote_store::{Filter, IRemoteStore, RemoteError, Row};
