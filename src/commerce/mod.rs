//! # Commerce Module
//!
//! Domain entities held in the cache, the remote commerce API the layer consumes,
//! and storage for the shopper's cart id.

pub mod cart_id;
pub mod remote;
pub mod types;

use crate::caching::CacheStore;

pub use cart_id::{CartIdStore, FileCartIdStore, MemoryCartIdStore};
pub use remote::{AddLineItemRequest, CartUpdate, RemoteDataService};
pub use types::{
    Address, Cart, Category, CommerceData, Customer, LineItem, Order, OrderListParams, Product,
    ProductListParams, ProductPage, ProductVariant, ShippingMethod, ShippingOption,
};

/// Cache store holding storefront data
pub type CommerceCache = CacheStore<CommerceData>;
