//! # Prefetch Planning
//!
//! Pure computation of the catalog pages worth fetching ahead of the shopper,
//! grouped in priority bands relative to the page currently shown.

use crate::caching::key::{keys, QueryKey};
use crate::commerce::types::{ProductListParams, ProductPage};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

/// Prefetch priority bands (higher number = higher priority)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrefetchPriority {
    /// Previous, first and last pages
    Low = 1,
    /// Page after next
    Medium = 2,
    /// Next page
    High = 3,
}

impl fmt::Display for PrefetchPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrefetchPriority::Low => write!(f, "low"),
            PrefetchPriority::Medium => write!(f, "medium"),
            PrefetchPriority::High => write!(f, "high"),
        }
    }
}

/// Prefetch configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefetchConfig {
    /// Enable speculative prefetching
    pub enabled: bool,

    /// Delay before the page after next is fetched
    #[serde(with = "humantime_serde")]
    pub medium_delay: Duration,

    /// Delay before previous, first and last pages are fetched
    #[serde(with = "humantime_serde")]
    pub low_delay: Duration,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            medium_delay: Duration::from_millis(300),
            low_delay: Duration::from_millis(1000),
        }
    }
}

impl PrefetchConfig {
    /// Delay applied to a band
    pub fn delay_for(&self, priority: PrefetchPriority) -> Duration {
        match priority {
            PrefetchPriority::High => Duration::ZERO,
            PrefetchPriority::Medium => self.medium_delay,
            PrefetchPriority::Low => self.low_delay,
        }
    }
}

/// The listing view the shopper is looking at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageContext {
    /// Filters and the current page
    pub params: ProductListParams,
    pub total_pages: u32,
}

impl PageContext {
    pub fn new(params: ProductListParams, total_pages: u32) -> Self {
        Self {
            params,
            total_pages,
        }
    }

    /// Context for a listing page that was just loaded
    pub fn from_page(params: ProductListParams, page: &ProductPage) -> Self {
        Self::new(params, page.total_pages())
    }

    pub fn current_page(&self) -> u32 {
        self.params.page
    }

    pub fn has_next(&self) -> bool {
        self.params.page < self.total_pages
    }

    pub fn has_previous(&self) -> bool {
        self.params.page > 1
    }
}

/// One page the planner wants fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedPrefetch {
    pub page: u32,
    pub params: ProductListParams,
    pub key: QueryKey,
    pub priority: PrefetchPriority,
    pub delay: Duration,
}

/// Plan the prefetches for a view, highest priority first
///
/// Each page appears at most once, in its highest band, and the current page is
/// never planned.
pub fn plan_prefetches(context: &PageContext, config: &PrefetchConfig) -> Vec<PlannedPrefetch> {
    if !config.enabled || context.total_pages == 0 {
        return Vec::new();
    }

    let current = context.current_page();
    let total = context.total_pages;
    let in_bounds = |page: u32| page >= 1 && page <= total;

    let mut bands: Vec<(PrefetchPriority, Vec<u32>)> = Vec::with_capacity(3);
    bands.push((
        PrefetchPriority::High,
        [current.saturating_add(1)]
            .into_iter()
            .filter(|page| context.has_next() && in_bounds(*page))
            .collect(),
    ));
    bands.push((
        PrefetchPriority::Medium,
        [current.saturating_add(2)]
            .into_iter()
            .filter(|page| in_bounds(*page))
            .collect(),
    ));

    let mut low = Vec::with_capacity(3);
    if context.has_previous() {
        low.push(current - 1);
    }
    low.push(1);
    low.push(total);
    bands.push((PrefetchPriority::Low, low));

    let mut seen = HashSet::from([current]);
    let mut planned = Vec::new();
    for (priority, pages) in bands {
        for page in pages {
            if !in_bounds(page) || !seen.insert(page) {
                continue;
            }
            let params = context.params.with_page(page);
            planned.push(PlannedPrefetch {
                page,
                key: keys::products::list(&params),
                params,
                priority,
                delay: config.delay_for(priority),
            });
        }
    }

    planned.sort_by(|a, b| b.priority.cmp(&a.priority));
    planned
}
