//! Partitioned response cache.
//!
//! This module provides the storage side of the proxy:
//!
//! - Request-identity keys (method, normalized URL, vary headers) hashed with SHA-256
//! - The [`CacheStore`] backend trait with [`Caches`]/[`Partition`] handles
//! - A persistent SQLite backend (WAL mode, automatic migrations)
//! - An in-memory backend

pub mod connection;
pub mod entries;
pub mod hash;
pub mod memory;
pub mod migrations;
pub mod store;

pub use crate::Error;

pub use connection::CacheDb;
pub use hash::RequestKey;
pub use memory::MemoryStore;
pub use store::{CacheStore, Caches, Entry, Partition};
