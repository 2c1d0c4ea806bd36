//! Pocketsync Core - Domain logic and business rules
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `CachedRecord`, `PendingAction`, `PhotoUploadEntry`
//! - **Port definitions** - Traits for adapters: `IKeyValueStore`, `IRemoteStore`
//! - **Conflict rules** - server-wins-on-push, timestamp-wins-on-pull
//!
//! # Architecture
//!
//! This crate follows the hexagonal (ports & adapters) architecture pattern.
//! The domain module contains pure business logic with no external dependencies.
//! Ports define trait interfaces that adapter crates implement: the durable
//! key-value store behind the local cache and outboxes, and the row-oriented
//! remote store that is authoritative for synced data.

pub mod config;
pub mod domain;
pub mod ports;
