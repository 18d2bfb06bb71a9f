//! Cache module - per-key TTL entries held in memory.
//!
//! ## Architecture
//!
//! - `CacheTier` - Named TTL presets picked by call sites
//! - `CacheEntry` - Type-erased in-memory entry with its own expiry
//! - `SerializedEntry` - JSON envelope exchanged with persistent stores
//! - `MemoryCache` - Bounded Moka container, freshness checked on read
//!
//! ## Usage
//!
//! ```rust
//! use std::time::Duration;
//! use flightdeck::cache::{CacheEntry, CacheTier, MemoryCache};
//!
//! let cache = MemoryCache::new(1_000);
//! cache.insert("user:42", CacheEntry::new(42u64, CacheTier::Long.into(), false));
//!
//! let hit = cache.get_fresh("user:42").and_then(|e| e.value::<u64>());
//! assert_eq!(hit, Some(42));
//! ```

mod entry;
mod memory;
mod tier;

pub use entry::{CacheEntry, SerializedEntry};
pub use memory::MemoryCache;
pub use tier::CacheTier;

pub(crate) use entry::{ErasedValue, now_millis};
