//! # Caching System Module
//!
//! This module provides the keyed cache that holds the local replica of
//! server-authoritative storefront data.
//!
//! ## Architecture
//! 1. **Key Registry**: deterministic, hierarchical keys for every cacheable query
//! 2. **Policy Table**: named staleness tiers (fresh window, gc window, refetch rules)
//! 3. **Entries**: per-key value, error, timestamps and in-flight fetch
//! 4. **Store**: fetch deduplication, stale-while-revalidate reads, invalidation,
//!    subscriptions and eviction
//!
//! ## Usage Example
//! ```rust,ignore
//! use storefront_sync::caching::{keys, CacheStore, PolicyTable, StoreConfig};
//!
//! let store: CacheStore<String> = CacheStore::new(PolicyTable::default(), StoreConfig::default());
//! let key = keys::categories::list();
//!
//! let categories = store
//!     .query(key, keys::categories::TIER, || async { Ok("categories".to_string()) })
//!     .await?;
//! ```

pub mod entry;
pub mod key;
pub mod policy;
pub mod store;

pub use entry::{CacheRead, EntryState};
pub use key::{keys, KeyFilter, ParamValue, Params, QueryKey};
pub use policy::{PolicyTable, RefetchOnMount, StalenessTier, TierName};
pub use store::{
    CacheEvent, CacheEventKind, CacheStats, CacheStore, Hold, Listener, StoreConfig,
    Subscription,
};
