//! # Staleness Policy Table
//!
//! Named cache tiers, each defining how long data stays fresh, how long it is kept
//! around once nobody is looking at it, and when it should be refetched. The table
//! is process-wide configuration and is never mutated after the store is built.

use crate::core::error::{SyncError, SyncResult};
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Tier names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierName {
    /// Rarely changing data such as categories
    Static,
    /// Catalog listings and product details
    #[serde(alias = "semiStatic")]
    SemiStatic,
    /// Data that changes with other user actions (shipping options)
    Dynamic,
    /// Inventory-like data that should always be revalidated
    Realtime,
    /// Data scoped to the current shopper (cart, customer, orders)
    User,
    /// Never served from cache without a fetch
    NoCache,
}

impl TierName {
    pub const ALL: [TierName; 6] = [
        TierName::Static,
        TierName::SemiStatic,
        TierName::Dynamic,
        TierName::Realtime,
        TierName::User,
        TierName::NoCache,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TierName::Static => "static",
            TierName::SemiStatic => "semi_static",
            TierName::Dynamic => "dynamic",
            TierName::Realtime => "realtime",
            TierName::User => "user",
            TierName::NoCache => "no_cache",
        }
    }
}

impl fmt::Display for TierName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// When a newly mounted view should refetch its query
///
/// Serialized as `false`, `true` or `"always"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefetchOnMount {
    /// Only fetch when there is no data at all
    Never,
    /// Fetch when the cached data is stale
    #[default]
    IfStale,
    /// Fetch on every mount, even when fresh
    Always,
}

impl Serialize for RefetchOnMount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RefetchOnMount::Never => serializer.serialize_bool(false),
            RefetchOnMount::IfStale => serializer.serialize_bool(true),
            RefetchOnMount::Always => serializer.serialize_str("always"),
        }
    }
}

impl<'de> Deserialize<'de> for RefetchOnMount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Flag(bool),
            Word(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Flag(false) => Ok(RefetchOnMount::Never),
            Raw::Flag(true) => Ok(RefetchOnMount::IfStale),
            Raw::Word(word) if word == "always" => Ok(RefetchOnMount::Always),
            Raw::Word(word) => Err(de::Error::custom(format!(
                "invalid refetch_on_mount value '{}', expected true, false or \"always\"",
                word
            ))),
        }
    }
}

/// Freshness and eviction windows for one tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StalenessTier {
    /// Age after which an entry is served as stale and refreshed in the background
    #[serde(with = "humantime_serde")]
    pub stale_window: Duration,

    /// Age after which an unobserved entry is evicted
    #[serde(with = "humantime_serde")]
    pub gc_window: Duration,

    /// Refetch subscribed queries when the storefront regains focus
    pub refetch_on_focus: bool,

    /// Refetch policy for newly mounted views
    pub refetch_on_mount: RefetchOnMount,
}

impl StalenessTier {
    pub const fn new(
        stale_window: Duration,
        gc_window: Duration,
        refetch_on_focus: bool,
        refetch_on_mount: RefetchOnMount,
    ) -> Self {
        Self {
            stale_window,
            gc_window,
            refetch_on_focus,
            refetch_on_mount,
        }
    }

    /// An entry of this age is stale once it is strictly older than the window
    pub fn is_stale(&self, age: Duration) -> bool {
        age > self.stale_window
    }

    /// An entry of this age may be garbage collected
    pub fn is_expired(&self, age: Duration) -> bool {
        age > self.gc_window
    }

    /// Default windows for each tier
    pub fn default_for(name: TierName) -> Self {
        const SECOND: u64 = 1;
        const MINUTE: u64 = 60 * SECOND;
        const HOUR: u64 = 60 * MINUTE;

        match name {
            TierName::Static => Self::new(
                Duration::from_secs(HOUR),
                Duration::from_secs(24 * HOUR),
                false,
                RefetchOnMount::IfStale,
            ),
            TierName::SemiStatic => Self::new(
                Duration::from_secs(5 * MINUTE),
                Duration::from_secs(30 * MINUTE),
                false,
                RefetchOnMount::IfStale,
            ),
            TierName::Dynamic => Self::new(
                Duration::from_secs(30 * SECOND),
                Duration::from_secs(5 * MINUTE),
                true,
                RefetchOnMount::IfStale,
            ),
            TierName::Realtime => Self::new(
                Duration::ZERO,
                Duration::from_secs(MINUTE),
                true,
                RefetchOnMount::Always,
            ),
            TierName::User => Self::new(
                Duration::ZERO,
                Duration::from_secs(5 * MINUTE),
                true,
                RefetchOnMount::Always,
            ),
            TierName::NoCache => Self::new(
                Duration::ZERO,
                Duration::ZERO,
                true,
                RefetchOnMount::Always,
            ),
        }
    }
}

/// Mapping from tier name to its windows
///
/// Tiers missing from a deserialized table keep their defaults, so lookups never fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyTable {
    tiers: HashMap<TierName, StalenessTier>,
}

impl PolicyTable {
    /// Build a table from explicit overrides on top of the defaults
    pub fn with_overrides(overrides: HashMap<TierName, StalenessTier>) -> Self {
        let mut table = Self::default();
        table.tiers.extend(overrides);
        table
    }

    /// Builder-style override of a single tier
    pub fn with_tier(mut self, name: TierName, tier: StalenessTier) -> Self {
        self.tiers.insert(name, tier);
        self
    }

    /// Look up a tier
    pub fn tier(&self, name: TierName) -> StalenessTier {
        self.tiers
            .get(&name)
            .copied()
            .unwrap_or_else(|| StalenessTier::default_for(name))
    }

    /// Iterate tiers in a stable order
    pub fn iter(&self) -> impl Iterator<Item = (TierName, StalenessTier)> + '_ {
        TierName::ALL.iter().map(move |name| (*name, self.tier(*name)))
    }

    /// Validate the table
    pub fn validate(&self) -> SyncResult<()> {
        for (name, tier) in self.iter() {
            if tier.gc_window < tier.stale_window {
                return Err(SyncError::config(format!(
                    "tier '{}' has gc_window {:?} shorter than stale_window {:?}",
                    name, tier.gc_window, tier.stale_window
                )));
            }
        }
        Ok(())
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self {
            tiers: TierName::ALL
                .iter()
                .map(|name| (*name, StalenessTier::default_for(*name)))
                .collect(),
        }
    }
}

impl Serialize for PolicyTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;

        let mut map = serializer.serialize_map(Some(TierName::ALL.len()))?;
        for (name, tier) in self.iter() {
            map.serialize_entry(&name, &tier)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for PolicyTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let overrides = HashMap::<TierName, StalenessTier>::deserialize(deserializer)?;
        Ok(PolicyTable::with_overrides(overrides))
    }
}
