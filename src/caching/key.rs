//! # Cache Key Registry
//!
//! Deterministic, hierarchical cache keys for every cacheable storefront query.
//!
//! A key is the ordered tuple `(namespace, entity, operation, params)`. Parameter
//! records are normalized before serialization:
//! - record fields are ordered by name
//! - lists keep their order
//! - absent values, empty lists and empty nested records are dropped
//!
//! so two logically identical queries always address the same entry, no matter
//! which call site built them or in which order the parameters were inserted.

use crate::caching::policy::TierName;
use crate::commerce::types::ProductListParams;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A single parameter value
///
/// Only these shapes can be used as query parameters, so malformed parameter
/// records are rejected by the compiler rather than at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// An optional parameter that was not provided
    Absent,
    Bool(bool),
    Int(i64),
    Str(String),
    /// Ordered list; order is significant
    List(Vec<ParamValue>),
    /// Nested record, normalized recursively
    Record(Params),
}

impl ParamValue {
    fn normalize(self) -> Option<ParamValue> {
        match self {
            ParamValue::Absent => None,
            ParamValue::List(items) => {
                if items.is_empty() {
                    return None;
                }
                // Absent list elements keep their slot so positions stay meaningful
                let items = items
                    .into_iter()
                    .map(|item| item.normalize().unwrap_or(ParamValue::Absent))
                    .collect();
                Some(ParamValue::List(items))
            }
            ParamValue::Record(params) => {
                let params = params.normalized();
                if params.is_empty() {
                    None
                } else {
                    Some(ParamValue::Record(params))
                }
            }
            other => Some(other),
        }
    }

    fn to_json(&self) -> serde_json::Value {
        match self {
            ParamValue::Absent => serde_json::Value::Null,
            ParamValue::Bool(value) => serde_json::Value::Bool(*value),
            ParamValue::Int(value) => serde_json::Value::from(*value),
            ParamValue::Str(value) => serde_json::Value::String(value.clone()),
            ParamValue::List(items) => {
                serde_json::Value::Array(items.iter().map(ParamValue::to_json).collect())
            }
            ParamValue::Record(params) => params.to_json(),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Int(value as i64)
    }
}

impl From<u32> for ParamValue {
    fn from(value: u32) -> Self {
        ParamValue::Int(value as i64)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Str(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Str(value)
    }
}

impl From<&String> for ParamValue {
    fn from(value: &String) -> Self {
        ParamValue::Str(value.clone())
    }
}

impl From<Params> for ParamValue {
    fn from(value: Params) -> Self {
        ParamValue::Record(value)
    }
}

impl<T: Into<ParamValue>> From<Vec<T>> for ParamValue {
    fn from(values: Vec<T>) -> Self {
        ParamValue::List(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => value.into(),
            None => ParamValue::Absent,
        }
    }
}

/// A parameter record
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Params(BTreeMap<String, ParamValue>);

impl Params {
    /// Create an empty parameter record
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with<K: Into<String>, V: Into<ParamValue>>(mut self, key: K, value: V) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert or replace a parameter
    pub fn insert<K: Into<String>, V: Into<ParamValue>>(&mut self, key: K, value: V) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Drop absent values, empty lists and empty nested records
    pub fn normalized(self) -> Params {
        Params(
            self.0
                .into_iter()
                .filter_map(|(key, value)| value.normalize().map(|value| (key, value)))
                .collect(),
        )
    }

    fn to_json(&self) -> serde_json::Value {
        // serde_json's default map is ordered by key, which gives the canonical form
        let map: serde_json::Map<String, serde_json::Value> = self
            .0
            .iter()
            .map(|(key, value)| (key.clone(), value.to_json()))
            .collect();
        serde_json::Value::Object(map)
    }

    /// Canonical JSON form of the record
    pub fn canonical(&self) -> String {
        self.to_json().to_string()
    }
}

/// Percent-escape the separator so distinct parts never serialize alike
fn escape_part(part: &str) -> Cow<'_, str> {
    if part.contains(['%', ':']) {
        Cow::Owned(part.replace('%', "%25").replace(':', "%3A"))
    } else {
        Cow::Borrowed(part)
    }
}

/// Immutable, canonical cache key
#[derive(Clone)]
pub struct QueryKey {
    namespace: String,
    entity: String,
    operation: String,
    params: Params,
    serialized: String,
}

impl QueryKey {
    /// Build a key from its four parts
    ///
    /// Pure and total: deep-equal inputs always produce the same serialized key.
    pub fn build(namespace: &str, entity: &str, operation: &str, params: Params) -> Self {
        let params = params.normalized();
        let serialized = format!(
            "{}:{}:{}:{}",
            escape_part(namespace),
            escape_part(entity),
            escape_part(operation),
            params.canonical()
        );

        Self {
            namespace: namespace.to_string(),
            entity: entity.to_string(),
            operation: operation.to_string(),
            params,
            serialized,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn as_str(&self) -> &str {
        &self.serialized
    }

    /// Short, fixed-length digest of the key for log fields
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.serialized.as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl PartialEq for QueryKey {
    fn eq(&self, other: &Self) -> bool {
        self.serialized == other.serialized
    }
}

impl Eq for QueryKey {}

impl Hash for QueryKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.serialized.hash(state);
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialized)
    }
}

impl fmt::Debug for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QueryKey({})", self.serialized)
    }
}

/// Selects cache keys for invalidation
#[derive(Clone)]
pub enum KeyFilter {
    /// Every key in the store
    All,

    /// A single key
    Exact(QueryKey),

    /// Every key under a namespace
    Namespace(String),

    /// Every key for an entity within a namespace
    Entity { namespace: String, entity: String },

    /// Every parameterization of one operation
    Operation {
        namespace: String,
        entity: String,
        operation: String,
    },

    /// Arbitrary predicate over keys
    Predicate(Arc<dyn Fn(&QueryKey) -> bool + Send + Sync>),
}

impl KeyFilter {
    pub fn entity(namespace: &str, entity: &str) -> Self {
        Self::Entity {
            namespace: namespace.to_string(),
            entity: entity.to_string(),
        }
    }

    pub fn operation(namespace: &str, entity: &str, operation: &str) -> Self {
        Self::Operation {
            namespace: namespace.to_string(),
            entity: entity.to_string(),
            operation: operation.to_string(),
        }
    }

    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&QueryKey) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(f))
    }

    /// Check whether a key is selected by this filter
    pub fn matches(&self, key: &QueryKey) -> bool {
        match self {
            KeyFilter::All => true,
            KeyFilter::Exact(exact) => exact == key,
            KeyFilter::Namespace(namespace) => key.namespace == *namespace,
            KeyFilter::Entity { namespace, entity } => {
                key.namespace == *namespace && key.entity == *entity
            }
            KeyFilter::Operation {
                namespace,
                entity,
                operation,
            } => {
                key.namespace == *namespace
                    && key.entity == *entity
                    && key.operation == *operation
            }
            KeyFilter::Predicate(predicate) => predicate(key),
        }
    }
}

impl From<QueryKey> for KeyFilter {
    fn from(key: QueryKey) -> Self {
        KeyFilter::Exact(key)
    }
}

impl fmt::Debug for KeyFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyFilter::All => f.write_str("All"),
            KeyFilter::Exact(key) => f.debug_tuple("Exact").field(key).finish(),
            KeyFilter::Namespace(namespace) => f.debug_tuple("Namespace").field(namespace).finish(),
            KeyFilter::Entity { namespace, entity } => f
                .debug_struct("Entity")
                .field("namespace", namespace)
                .field("entity", entity)
                .finish(),
            KeyFilter::Operation {
                namespace,
                entity,
                operation,
            } => f
                .debug_struct("Operation")
                .field("namespace", namespace)
                .field("entity", entity)
                .field("operation", operation)
                .finish(),
            KeyFilter::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// Key constructors for every cacheable storefront query
///
/// Each submodule also names the tier its queries are cached under.
pub mod keys {
    use super::*;

    /// Namespace for anonymous storefront data
    pub const STORE: &str = "store";

    /// Namespace for data scoped to the signed-in customer
    pub const CUSTOMER: &str = "customer";

    pub mod products {
        use super::*;

        pub const ENTITY: &str = "products";
        pub const TIER: TierName = TierName::SemiStatic;

        pub fn list(params: &ProductListParams) -> QueryKey {
            QueryKey::build(STORE, ENTITY, "list", params.to_params())
        }

        pub fn detail(handle: &str) -> QueryKey {
            QueryKey::build(STORE, ENTITY, "detail", Params::new().with("handle", handle))
        }

        pub fn all() -> KeyFilter {
            KeyFilter::entity(STORE, ENTITY)
        }
    }

    pub mod categories {
        use super::*;

        pub const ENTITY: &str = "categories";
        pub const TIER: TierName = TierName::Static;

        pub fn list() -> QueryKey {
            QueryKey::build(STORE, ENTITY, "list", Params::new())
        }

        pub fn detail(handle: &str) -> QueryKey {
            QueryKey::build(STORE, ENTITY, "detail", Params::new().with("handle", handle))
        }
    }

    pub mod cart {
        use super::*;

        pub const ENTITY: &str = "cart";
        pub const TIER: TierName = TierName::User;
        pub const SHIPPING_OPTIONS_TIER: TierName = TierName::Dynamic;

        pub fn detail(cart_id: &str) -> QueryKey {
            QueryKey::build(STORE, ENTITY, "detail", Params::new().with("id", cart_id))
        }

        pub fn shipping_options(cart_id: &str) -> QueryKey {
            QueryKey::build(
                STORE,
                ENTITY,
                "shipping_options",
                Params::new().with("id", cart_id),
            )
        }

        /// Every query that belongs to one cart
        pub fn scope(cart_id: &str) -> KeyFilter {
            let cart_id = cart_id.to_string();
            KeyFilter::predicate(move |key| {
                key.namespace() == STORE
                    && key.entity() == ENTITY
                    && key.params().get("id") == Some(&ParamValue::Str(cart_id.clone()))
            })
        }
    }

    pub mod orders {
        use super::*;

        pub const ENTITY: &str = "orders";
        pub const TIER: TierName = TierName::User;

        pub fn list(params: Params) -> QueryKey {
            QueryKey::build(CUSTOMER, ENTITY, "list", params)
        }

        pub fn detail(order_id: &str) -> QueryKey {
            QueryKey::build(CUSTOMER, ENTITY, "detail", Params::new().with("id", order_id))
        }
    }

    pub mod customer {
        use super::*;

        pub const ENTITY: &str = "customer";
        pub const TIER: TierName = TierName::User;

        pub fn me() -> QueryKey {
            QueryKey::build(CUSTOMER, ENTITY, "me", Params::new())
        }
    }
}
