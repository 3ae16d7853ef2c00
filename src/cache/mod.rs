//! Offline cache and sync module.
//!
//! This module keeps the client usable without a live network:
//!
//! - `store`: named cache sets on disk, one JSON snapshot per request key
//! - `manager`: versioned install/activate lifecycle and the
//!   cache-first / network-first / fallback strategies
//! - `sync`: the pending-mutation queue and attendance replay
//!
//! The static set is populated once per cache version at install time;
//! the dynamic set fills lazily from live responses and also holds
//! queued attendance mutations until they replay.

pub mod manager;
pub mod store;
pub mod sync;

pub use manager::{CacheError, CacheLifecycle, CacheManager, RequestClass};
pub use store::{CacheEntry, CacheStore, RequestSnapshot, ResponseSnapshot};
pub use sync::{MutationOutcome, SyncReport};
