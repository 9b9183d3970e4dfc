//! Response cache for deterministic chat completions.
//!
//! Identical non-streaming requests with no positive temperature are
//! answered from memory instead of hitting the upstream again.
//!
//! - Keys: [`CacheKey`], a 16-hex-char SHA-256 fingerprint of `model`,
//!   `messages`, `temperature` and `max_tokens`
//! - Expiry: entries older than the TTL (since last read or write) are
//!   purged lazily on lookup
//! - Capacity: at `max_entries`, inserting a new key evicts the least
//!   recently touched entry
//!
//! Nothing is persisted across restarts.

mod key;
mod store;

pub use key::CacheKey;
pub use store::{CacheEntry, CacheStats, ResponseCache};
