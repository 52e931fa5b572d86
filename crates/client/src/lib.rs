//! Network side of offgrid.
//!
//! Provides [`FetchClient`], the reqwest-backed implementation of the core
//! [`Fetcher`](offgrid_core::Fetcher) trait.

pub mod fetch;

pub use fetch::{FetchClient, FetchConfig};
