//! # Remote Data Service
//!
//! The seam between the synchronization layer and the commerce API. Implementations
//! perform the actual network calls; the cache store, mutation controller and prefetch
//! scheduler only ever talk to this trait.

use super::types::{
    Address, Cart, Category, Customer, Order, OrderListParams, Product, ProductListParams,
    ProductPage, ShippingOption,
};
use crate::core::error::SyncResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Request body for adding a line item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddLineItemRequest {
    pub variant_id: String,
    pub quantity: u32,
}

/// Partial cart update; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipping_address: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub billing_address: Option<Address>,
}

/// Commerce API consumed by the synchronization layer
///
/// Every cart operation returns the full server-side cart after the change.
/// A missing resource is reported as [`SyncError::NotFound`](crate::core::error::SyncError::NotFound).
#[async_trait]
pub trait RemoteDataService: Send + Sync {
    /// List products; `abort` is cancelled when the caller no longer wants the result
    async fn list_products(
        &self,
        params: &ProductListParams,
        abort: CancellationToken,
    ) -> SyncResult<ProductPage>;

    async fn retrieve_product(&self, handle: &str) -> SyncResult<Product>;

    async fn list_categories(&self) -> SyncResult<Vec<Category>>;

    async fn retrieve_cart(&self, cart_id: &str) -> SyncResult<Cart>;

    async fn add_line_item(&self, cart_id: &str, request: &AddLineItemRequest)
        -> SyncResult<Cart>;

    async fn update_line_item(&self, cart_id: &str, line_id: &str, quantity: u32)
        -> SyncResult<Cart>;

    async fn remove_line_item(&self, cart_id: &str, line_id: &str) -> SyncResult<Cart>;

    async fn update_cart(&self, cart_id: &str, update: &CartUpdate) -> SyncResult<Cart>;

    async fn add_shipping_method(&self, cart_id: &str, option_id: &str) -> SyncResult<Cart>;

    async fn list_shipping_options(&self, cart_id: &str) -> SyncResult<Vec<ShippingOption>>;

    async fn list_orders(&self, params: &OrderListParams) -> SyncResult<Vec<Order>>;

    async fn retrieve_order(&self, order_id: &str) -> SyncResult<Order>;

    async fn retrieve_customer(&self) -> SyncResult<Customer>;
}
