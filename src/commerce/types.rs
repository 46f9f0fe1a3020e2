//! # Commerce Types
//!
//! Entities returned by the commerce API and cached by the synchronization layer.
//! Money amounts are integer minor units (cents) in the cart's currency.

use crate::caching::key::Params;
use crate::core::error::{SyncError, SyncResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A line in the shopping cart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: String,
    pub variant_id: String,
    pub title: String,
    pub quantity: u32,
    pub unit_price: i64,
}

impl LineItem {
    pub fn total(&self) -> i64 {
        self.unit_price * self.quantity as i64
    }
}

/// Postal address used for shipping and billing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub first_name: String,
    pub last_name: String,
    pub company: Option<String>,
    pub address_1: String,
    pub address_2: Option<String>,
    pub city: String,
    pub province: Option<String>,
    pub postal_code: String,
    pub country_code: String,
    pub phone: Option<String>,
}

impl Address {
    /// Check required fields
    ///
    /// `field_prefix` names the address in the error, e.g. `shipping_address`.
    pub fn validate(&self, field_prefix: &str) -> SyncResult<()> {
        let required = [
            ("first_name", &self.first_name),
            ("last_name", &self.last_name),
            ("address_1", &self.address_1),
            ("city", &self.city),
            ("postal_code", &self.postal_code),
            ("country_code", &self.country_code),
        ];

        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(SyncError::validation(
                    format!("{}.{}", field_prefix, field),
                    "is required",
                ));
            }
        }

        if self.country_code.len() != 2 {
            return Err(SyncError::validation(
                format!("{}.country_code", field_prefix),
                "must be a two-letter ISO country code",
            ));
        }

        Ok(())
    }
}

/// Shipping method selected on a cart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingMethod {
    pub option_id: String,
    pub name: String,
    pub amount: i64,
}

/// Shipping option available for a cart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingOption {
    pub id: String,
    pub name: String,
    pub amount: i64,
}

/// Shopping cart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub id: String,
    pub email: Option<String>,
    pub region_id: Option<String>,
    pub currency_code: String,
    pub line_items: Vec<LineItem>,
    pub shipping_address: Option<Address>,
    pub billing_address: Option<Address>,
    pub shipping_method: Option<ShippingMethod>,
    pub subtotal: i64,
    pub shipping_total: i64,
    pub total: i64,
    /// Server-side revision, bumped by every confirmed change
    pub version: u64,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Cart {
    /// Create an empty cart
    pub fn new<S: Into<String>>(id: S, currency_code: S) -> Self {
        Self {
            id: id.into(),
            email: None,
            region_id: None,
            currency_code: currency_code.into(),
            line_items: Vec::new(),
            shipping_address: None,
            billing_address: None,
            shipping_method: None,
            subtotal: 0,
            shipping_total: 0,
            total: 0,
            version: 0,
            updated_at: None,
        }
    }

    /// Recompute subtotal and total from line items and the shipping method
    pub fn recalculate_totals(&mut self) {
        self.subtotal = self.line_items.iter().map(LineItem::total).sum();
        self.shipping_total = self
            .shipping_method
            .as_ref()
            .map(|method| method.amount)
            .unwrap_or(0);
        self.total = self.subtotal + self.shipping_total;
    }

    /// Whether the stored totals match the line items
    pub fn totals_are_consistent(&self) -> bool {
        let mut expected = self.clone();
        expected.recalculate_totals();
        expected.subtotal == self.subtotal
            && expected.shipping_total == self.shipping_total
            && expected.total == self.total
    }

    pub fn line_item(&self, line_id: &str) -> Option<&LineItem> {
        self.line_items.iter().find(|item| item.id == line_id)
    }

    pub fn line_item_for_variant(&self, variant_id: &str) -> Option<&LineItem> {
        self.line_items
            .iter()
            .find(|item| item.variant_id == variant_id)
    }

    /// Total number of units in the cart
    pub fn item_count(&self) -> u32 {
        self.line_items.iter().map(|item| item.quantity).sum()
    }
}

/// Product variant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductVariant {
    pub id: String,
    pub title: String,
    pub price: i64,
    pub inventory_quantity: Option<i64>,
}

/// Catalog product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub handle: String,
    pub title: String,
    pub description: Option<String>,
    pub thumbnail: Option<String>,
    pub variants: Vec<ProductVariant>,
}

/// One page of a product listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPage {
    pub items: Vec<Product>,
    /// Total number of products matching the query
    pub count: u32,
    pub offset: u32,
    pub limit: u32,
}

impl ProductPage {
    /// Number of pages for the listing's page size
    pub fn total_pages(&self) -> u32 {
        if self.limit == 0 {
            return 0;
        }
        self.count.div_ceil(self.limit)
    }
}

/// Parameters of a paginated, filtered product listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductListParams {
    /// One-based page number
    pub page: u32,
    pub limit: u32,
    pub q: Option<String>,
    pub category_id: Vec<String>,
    pub collection_id: Vec<String>,
    pub order: Option<String>,
    pub region_id: Option<String>,
}

impl Default for ProductListParams {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 12,
            q: None,
            category_id: Vec::new(),
            collection_id: Vec::new(),
            order: None,
            region_id: None,
        }
    }
}

impl ProductListParams {
    /// Same filters, different page
    pub fn with_page(&self, page: u32) -> Self {
        Self {
            page,
            ..self.clone()
        }
    }

    /// Zero-based offset of the first product on the page
    pub fn offset(&self) -> u32 {
        self.page.saturating_sub(1) * self.limit
    }

    /// Parameter record used for the cache key
    pub fn to_params(&self) -> Params {
        Params::new()
            .with("page", self.page)
            .with("limit", self.limit)
            .with("q", self.q.clone())
            .with("category_id", self.category_id.clone())
            .with("collection_id", self.collection_id.clone())
            .with("order", self.order.clone())
            .with("region_id", self.region_id.clone())
    }
}

/// Product category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub handle: String,
    pub name: String,
    pub parent_category_id: Option<String>,
}

/// Placed order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub display_id: u64,
    pub status: String,
    pub email: String,
    pub items: Vec<LineItem>,
    pub total: i64,
    pub created_at: DateTime<Utc>,
}

/// Parameters of the customer's order history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderListParams {
    pub limit: u32,
    pub offset: u32,
}

impl Default for OrderListParams {
    fn default() -> Self {
        Self {
            limit: 10,
            offset: 0,
        }
    }
}

impl OrderListParams {
    pub fn to_params(&self) -> Params {
        Params::new()
            .with("limit", self.limit)
            .with("offset", self.offset)
    }
}

/// Signed-in customer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Every kind of value held in the storefront cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommerceData {
    Cart(Cart),
    ProductPage(ProductPage),
    Product(Product),
    Categories(Vec<Category>),
    Category(Category),
    ShippingOptions(Vec<ShippingOption>),
    Orders(Vec<Order>),
    Order(Order),
    Customer(Customer),
}

impl CommerceData {
    pub fn as_cart(&self) -> Option<&Cart> {
        match self {
            CommerceData::Cart(cart) => Some(cart),
            _ => None,
        }
    }

    pub fn into_cart(self) -> Option<Cart> {
        match self {
            CommerceData::Cart(cart) => Some(cart),
            _ => None,
        }
    }

    pub fn into_product_page(self) -> Option<ProductPage> {
        match self {
            CommerceData::ProductPage(page) => Some(page),
            _ => None,
        }
    }

    pub fn into_product(self) -> Option<Product> {
        match self {
            CommerceData::Product(product) => Some(product),
            _ => None,
        }
    }

    pub fn into_categories(self) -> Option<Vec<Category>> {
        match self {
            CommerceData::Categories(categories) => Some(categories),
            _ => None,
        }
    }

    pub fn into_shipping_options(self) -> Option<Vec<ShippingOption>> {
        match self {
            CommerceData::ShippingOptions(options) => Some(options),
            _ => None,
        }
    }

    pub fn into_orders(self) -> Option<Vec<Order>> {
        match self {
            CommerceData::Orders(orders) => Some(orders),
            _ => None,
        }
    }

    pub fn into_order(self) -> Option<Order> {
        match self {
            CommerceData::Order(order) => Some(order),
            _ => None,
        }
    }

    pub fn into_customer(self) -> Option<Customer> {
        match self {
            CommerceData::Customer(customer) => Some(customer),
            _ => None,
        }
    }
}
