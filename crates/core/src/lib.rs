//! Core of offgrid, a request-interception cache proxy.
//!
//! This crate provides:
//! - Partitioned response cache with SQLite and in-memory backends
//! - Request/response types and the [`Fetcher`](http::Fetcher) seam
//! - Request classification and retrieval strategies
//! - Generation install/activation lifecycle and signal hooks
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod worker;

pub use cache::{CacheDb, CacheStore, Caches, MemoryStore, RequestKey};
pub use config::{AppConfig, CacheConfig, ConfigError, InstallPolicy};
pub use error::Error;
pub use http::{Destination, Fetcher, Request, RequestMode, Response, ResponseKind};
pub use worker::{LifecycleState, ResourceClass, Worker};
