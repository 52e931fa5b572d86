//! Cache inspection tools.
//!
//! Read-only views over the partitions of the configured store.

pub mod get;
pub mod list;

pub use get::{CacheGetParams, get_impl};
pub use list::list_impl;
