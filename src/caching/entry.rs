//! # Cache Entries
//!
//! One entry per cache key, owned exclusively by the [`CacheStore`](super::CacheStore).
//! Entry state is derived at query time from the entry's timestamps and its tier, so
//! no timer is needed to move an entry from fresh to stale.

use super::key::QueryKey;
use super::policy::{StalenessTier, TierName};
use crate::core::error::{SyncError, SyncResult};
use futures::future::{BoxFuture, Shared};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// Shared handle to the single in-flight fetch of a key
pub(crate) type InFlight<V> = Shared<BoxFuture<'static, SyncResult<V>>>;

/// Lifecycle state of an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    /// Known key, no data and no fetch yet
    Empty,
    /// First fetch in progress, nothing to show yet
    Fetching,
    /// Data within its stale window
    Fresh,
    /// Data past its stale window, or explicitly invalidated
    Stale,
    /// The latest fetch failed
    Error,
}

/// Result of a synchronous read
#[derive(Debug, Clone)]
pub struct CacheRead<V> {
    /// Last known value, if any (kept through refreshes and failures)
    pub value: Option<V>,

    /// Error of the latest failed fetch
    pub error: Option<SyncError>,

    /// Derived entry state
    pub state: EntryState,

    /// Whether the caller should refresh
    pub is_stale: bool,

    /// Whether a fetch is currently running for this key
    pub is_fetching: bool,
}

impl<V> CacheRead<V> {
    /// Whether there is nothing at all to show
    pub fn is_empty(&self) -> bool {
        self.value.is_none()
    }
}

/// A cached value together with its bookkeeping
pub(crate) struct CacheEntry<V> {
    pub(crate) key: QueryKey,
    pub(crate) tier_name: TierName,
    pub(crate) tier: StalenessTier,
    pub(crate) value: Option<V>,
    pub(crate) error: Option<SyncError>,
    pub(crate) created_at: Instant,
    /// Time of the last successful fetch or write
    pub(crate) fetched_at: Option<Instant>,
    pub(crate) failed_at: Option<Instant>,
    pub(crate) invalidated: bool,
    pub(crate) in_flight: Option<InFlight<V>>,
    /// Bumped by every direct write; fetches started before a write never overwrite it
    pub(crate) version: u64,
    /// Bumped by every invalidation
    pub(crate) invalidations: u64,
}

impl<V: Clone> CacheEntry<V> {
    pub(crate) fn new(key: QueryKey, tier_name: TierName, tier: StalenessTier, now: Instant) -> Self {
        Self {
            key,
            tier_name,
            tier,
            value: None,
            error: None,
            created_at: now,
            fetched_at: None,
            failed_at: None,
            invalidated: false,
            in_flight: None,
            version: 0,
            invalidations: 0,
        }
    }

    /// Stale window applied to error entries
    fn error_window(&self, error_stale_window: Duration) -> Duration {
        self.tier.stale_window.min(error_stale_window)
    }

    /// Whether the entry's data (or error) should be refreshed
    pub(crate) fn is_stale_at(&self, now: Instant, error_stale_window: Duration) -> bool {
        if self.invalidated {
            return true;
        }

        if self.error.is_some() {
            return match self.failed_at {
                Some(failed_at) => {
                    now.saturating_duration_since(failed_at) > self.error_window(error_stale_window)
                }
                None => true,
            };
        }

        match self.fetched_at {
            Some(fetched_at) => self.tier.is_stale(now.saturating_duration_since(fetched_at)),
            None => true,
        }
    }

    pub(crate) fn state_at(&self, now: Instant, error_stale_window: Duration) -> EntryState {
        if self.in_flight.is_some() && self.value.is_none() && self.error.is_none() {
            return EntryState::Fetching;
        }

        if self.error.is_some() {
            return EntryState::Error;
        }

        if self.value.is_none() {
            return EntryState::Empty;
        }

        if self.is_stale_at(now, error_stale_window) {
            EntryState::Stale
        } else {
            EntryState::Fresh
        }
    }

    pub(crate) fn snapshot(&self, now: Instant, error_stale_window: Duration) -> CacheRead<V> {
        CacheRead {
            value: self.value.clone(),
            error: self.error.clone(),
            state: self.state_at(now, error_stale_window),
            is_stale: self.is_stale_at(now, error_stale_window),
            is_fetching: self.in_flight.is_some(),
        }
    }

    /// Most recent moment the entry received data or an error
    pub(crate) fn last_activity(&self) -> Instant {
        [self.fetched_at, self.failed_at]
            .into_iter()
            .flatten()
            .max()
            .unwrap_or(self.created_at)
    }

    pub(crate) fn is_expired_at(&self, now: Instant) -> bool {
        self.tier
            .is_expired(now.saturating_duration_since(self.last_activity()))
    }

    /// Direct write of an authoritative or speculative value
    pub(crate) fn put(&mut self, value: V, now: Instant) {
        self.value = Some(value);
        self.error = None;
        self.failed_at = None;
        self.fetched_at = Some(now);
        self.invalidated = false;
        self.version += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caching::policy::RefetchOnMount;

    fn tier(stale_ms: u64) -> StalenessTier {
        StalenessTier::new(
            Duration::from_millis(stale_ms),
            Duration::from_secs(60),
            false,
            RefetchOnMount::IfStale,
        )
    }

    fn entry(stale_ms: u64, now: Instant) -> CacheEntry<u32> {
        CacheEntry::new(
            crate::caching::key::keys::categories::list(),
            TierName::Static,
            tier(stale_ms),
            now,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_transitions() {
        let t0 = Instant::now();
        let mut entry = entry(1000, t0);
        assert_eq!(entry.state_at(t0, Duration::from_secs(5)), EntryState::Empty);

        entry.put(7, t0);
        let window = Duration::from_secs(5);
        assert_eq!(entry.state_at(t0 + Duration::from_millis(999), window), EntryState::Fresh);
        assert_eq!(entry.state_at(t0 + Duration::from_millis(1001), window), EntryState::Stale);

        entry.invalidated = true;
        assert_eq!(entry.state_at(t0, window), EntryState::Stale);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_entries_use_short_window() {
        let t0 = Instant::now();
        let mut entry = entry(60_000, t0);
        entry.error = Some(SyncError::network("reset"));
        entry.failed_at = Some(t0);

        let window = Duration::from_secs(2);
        assert_eq!(entry.state_at(t0, window), EntryState::Error);
        assert!(!entry.is_stale_at(t0 + Duration::from_secs(1), window));
        assert!(entry.is_stale_at(t0 + Duration::from_millis(2001), window));
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_activity_tracks_latest_event() {
        let t0 = Instant::now();
        let mut entry = entry(1000, t0);
        assert_eq!(entry.last_activity(), t0);

        let t1 = t0 + Duration::from_secs(3);
        entry.put(1, t1);
        assert_eq!(entry.last_activity(), t1);
        assert!(!entry.is_expired_at(t1 + Duration::from_secs(60)));
        assert!(entry.is_expired_at(t1 + Duration::from_secs(61)));
    }
}
