//! # Storefront Sync - Core Library Crate
//!
//! The client-side data synchronization layer of an e-commerce storefront. It keeps a
//! local replica of server-authoritative commerce state (carts, catalog pages,
//! categories, orders, shipping options) coherent across concurrent user actions,
//! background refreshes and speculative reads.
//!
//! ## Components
//! - **Cache Key Registry** (`caching::key`): deterministic keys for every cacheable query
//! - **Staleness Policy Table** (`caching::policy`): named freshness and eviction tiers
//! - **Cache Store** (`caching::store`): deduplicated fetches, stale-while-revalidate
//!   reads, invalidation, subscriptions and eviction
//! - **Optimistic Mutation Controller** (`mutation`): speculative cart writes with
//!   snapshot and rollback
//! - **Prefetch Scheduler** (`prefetch`): priority-ordered, cancellable speculative
//!   fetching of adjacent catalog pages
//!
//! ## Data Flow
//! The presentation layer asks the [`StorefrontSync`] session for a keyed query; the
//! store serves fresh data, serves stale data while refreshing it in the background,
//! or awaits a new fetch through the [`RemoteDataService`]. Cart mutations go through
//! the mutation controller, which writes a speculative cart into the store, calls the
//! remote service and reconciles on completion. The prefetch scheduler independently
//! primes the store with pages the shopper is likely to open next.
//!
//! ### Re-exports
//! Commonly used types are re-exported at the crate root so users can write
//! `use storefront_sync::{StorefrontSync, SyncConfig};`.

/// Error types and configuration shared by every component
pub mod core;

/// Cache keys, staleness tiers, entries and the cache store
pub mod caching;

/// Commerce entities, the remote data service trait and cart id storage
pub mod commerce;

/// Optimistic cart mutations with snapshot and rollback
pub mod mutation;

/// Speculative prefetching of catalog pages
pub mod prefetch;

/// Structured logging setup
pub mod observability;

/// Session object wiring the components together
pub mod session;

pub use crate::core::config::SyncConfig;
pub use crate::core::error::{SyncError, SyncResult};
pub use caching::{
    keys, CacheEvent, CacheEventKind, CacheRead, CacheStore, EntryState, KeyFilter, Params,
    PolicyTable, QueryKey, StalenessTier, StoreConfig, TierName,
};
pub use commerce::{CartIdStore, CommerceCache, CommerceData, RemoteDataService};
pub use mutation::{CartOperation, MutationController, MutationEvent, MutationPhase};
pub use prefetch::{PageContext, PrefetchConfig, PrefetchPriority, PrefetchScheduler};
pub use session::StorefrontSync;
