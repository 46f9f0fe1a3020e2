//! # Prefetch Module
//!
//! Speculative fetching of the catalog pages adjacent to the one being viewed.
//!
//! ## Priority bands
//! - **High** (no delay): the next page
//! - **Medium** (`medium_delay`): the page after next
//! - **Low** (`low_delay`): the previous, first and last pages

pub mod plan;
pub mod scheduler;

pub use plan::{plan_prefetches, PageContext, PlannedPrefetch, PrefetchConfig, PrefetchPriority};
pub use scheduler::{PrefetchScheduler, PrefetchStats, PrefetchTask, TaskId, ViewId};
