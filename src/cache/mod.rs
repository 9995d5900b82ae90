//! Key-addressed cache of read results.
//!
//! This module provides:
//! - `QueryKey`: stable hashing of (resource, parameters) pairs
//! - `ApiQueryKey`: the reads this program issues
//! - `QueryCache`: an injectable, cloneable store with per-key invalidation

mod key;
mod store;

pub use key::{ApiQueryKey, QueryKey};
pub use store::QueryCache;
