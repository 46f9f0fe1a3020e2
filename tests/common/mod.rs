//! Scripted in-memory commerce API shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use storefront_sync::commerce::{
    AddLineItemRequest, Address, Cart, CartUpdate, Category, Customer, LineItem, Order,
    OrderListParams, Product, ProductListParams, ProductPage, ProductVariant, RemoteDataService,
    ShippingMethod, ShippingOption,
};
use storefront_sync::{SyncError, SyncResult};
use tokio_util::sync::CancellationToken;

pub const CART_ID: &str = "cart_01";
pub const PRICE: i64 = 2500;

/// Commerce API backed by in-memory state, with per-operation latency and
/// scripted failures
pub struct ScriptedRemote {
    products: Vec<Product>,
    carts: Mutex<HashMap<String, Cart>>,
    shipping_options: Vec<ShippingOption>,
    next_line: Mutex<u32>,
    latency: Mutex<HashMap<&'static str, VecDeque<Duration>>>,
    failures: Mutex<HashMap<&'static str, VecDeque<SyncError>>>,
    calls: Mutex<Vec<(&'static str, String)>>,
}

impl ScriptedRemote {
    /// Catalog of `product_count` products and one cart holding one line
    pub fn new(product_count: usize) -> Arc<Self> {
        let products = (1..=product_count)
            .map(|n| Product {
                id: format!("prod_{}", n),
                handle: format!("product-{}", n),
                title: format!("Product {}", n),
                description: None,
                thumbnail: None,
                variants: vec![ProductVariant {
                    id: format!("variant_{}", n),
                    title: "Default".to_string(),
                    price: PRICE,
                    inventory_quantity: Some(10),
                }],
            })
            .collect();

        let mut cart = Cart::new(CART_ID, "usd");
        cart.line_items.push(LineItem {
            id: "line_1".to_string(),
            variant_id: "variant_1".to_string(),
            title: "Product 1".to_string(),
            quantity: 1,
            unit_price: PRICE,
        });
        cart.recalculate_totals();

        Arc::new(Self {
            products,
            carts: Mutex::new(HashMap::from([(CART_ID.to_string(), cart)])),
            shipping_options: vec![
                ShippingOption {
                    id: "so_standard".to_string(),
                    name: "Standard".to_string(),
                    amount: 500,
                },
                ShippingOption {
                    id: "so_express".to_string(),
                    name: "Express".to_string(),
                    amount: 1500,
                },
            ],
            next_line: Mutex::new(2),
            latency: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Delay the next call of `operation`
    pub fn delay_next(&self, operation: &'static str, delay: Duration) {
        self.latency
            .lock()
            .entry(operation)
            .or_default()
            .push_back(delay);
    }

    /// Fail the next call of `operation`
    pub fn fail_next(&self, operation: &'static str, error: SyncError) {
        self.failures
            .lock()
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    pub fn calls(&self, operation: &str) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter(|(op, _)| *op == operation)
            .map(|(_, detail)| detail.clone())
            .collect()
    }

    pub fn call_count(&self, operation: &str) -> usize {
        self.calls(operation).len()
    }

    pub fn server_cart(&self) -> Cart {
        self.carts.lock()[CART_ID].clone()
    }

    async fn enter(&self, operation: &'static str, detail: String) -> SyncResult<()> {
        self.calls.lock().push((operation, detail));
        let failure = self
            .failures
            .lock()
            .get_mut(operation)
            .and_then(VecDeque::pop_front);
        let delay = self
            .latency
            .lock()
            .get_mut(operation)
            .and_then(VecDeque::pop_front);

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn change_cart<F>(&self, cart_id: &str, change: F) -> SyncResult<Cart>
    where
        F: FnOnce(&mut Cart, &mut u32),
    {
        let mut carts = self.carts.lock();
        let cart = carts
            .get_mut(cart_id)
            .ok_or_else(|| SyncError::not_found(format!("cart {}", cart_id)))?;
        let mut next_line = self.next_line.lock();
        change(cart, &mut next_line);
        cart.version += 1;
        cart.updated_at = Some(Utc::now());
        cart.recalculate_totals();
        Ok(cart.clone())
    }
}

#[async_trait]
impl RemoteDataService for ScriptedRemote {
    async fn list_products(
        &self,
        params: &ProductListParams,
        abort: CancellationToken,
    ) -> SyncResult<ProductPage> {
        tokio::select! {
            result = self.enter("list_products", format!("page={}", params.page)) => result?,
            _ = abort.cancelled() => return Err(SyncError::Cancelled),
        }

        let offset = params.offset() as usize;
        let items = self
            .products
            .iter()
            .skip(offset)
            .take(params.limit as usize)
            .cloned()
            .collect();
        Ok(ProductPage {
            items,
            count: self.products.len() as u32,
            offset: params.offset(),
            limit: params.limit,
        })
    }

    async fn retrieve_product(&self, handle: &str) -> SyncResult<Product> {
        self.enter("retrieve_product", handle.to_string()).await?;
        self.products
            .iter()
            .find(|p| p.handle == handle)
            .cloned()
            .ok_or_else(|| SyncError::not_found(format!("product {}", handle)))
    }

    async fn list_categories(&self) -> SyncResult<Vec<Category>> {
        self.enter("list_categories", String::new()).await?;
        Ok(vec![Category {
            id: "pcat_shirts".to_string(),
            handle: "shirts".to_string(),
            name: "Shirts".to_string(),
            parent_category_id: None,
        }])
    }

    async fn retrieve_cart(&self, cart_id: &str) -> SyncResult<Cart> {
        self.enter("retrieve_cart", cart_id.to_string()).await?;
        self.carts
            .lock()
            .get(cart_id)
            .cloned()
            .ok_or_else(|| SyncError::not_found(format!("cart {}", cart_id)))
    }

    async fn add_line_item(&self, cart_id: &str, request: &AddLineItemRequest) -> SyncResult<Cart> {
        self.enter("add_line_item", request.variant_id.clone()).await?;
        let product = self
            .products
            .iter()
            .find(|p| p.variants.iter().any(|v| v.id == request.variant_id))
            .cloned();
        let request = request.clone();
        self.change_cart(cart_id, move |cart, next_line| {
            if let Some(item) = cart
                .line_items
                .iter_mut()
                .find(|i| i.variant_id == request.variant_id)
            {
                item.quantity += request.quantity;
                return;
            }
            let id = format!("line_{}", next_line);
            *next_line += 1;
            cart.line_items.push(LineItem {
                id,
                title: product.map(|p| p.title).unwrap_or_default(),
                variant_id: request.variant_id,
                quantity: request.quantity,
                unit_price: PRICE,
            });
        })
    }

    async fn update_line_item(&self, cart_id: &str, line_id: &str, quantity: u32) -> SyncResult<Cart> {
        self.enter("update_line_item", format!("{}={}", line_id, quantity))
            .await?;
        self.change_cart(cart_id, |cart, _| {
            if let Some(item) = cart.line_items.iter_mut().find(|i| i.id == line_id) {
                item.quantity = quantity;
            }
        })
    }

    async fn remove_line_item(&self, cart_id: &str, line_id: &str) -> SyncResult<Cart> {
        self.enter("remove_line_item", line_id.to_string()).await?;
        self.change_cart(cart_id, |cart, _| cart.line_items.retain(|i| i.id != line_id))
    }

    async fn update_cart(&self, cart_id: &str, update: &CartUpdate) -> SyncResult<Cart> {
        self.enter("update_cart", cart_id.to_string()).await?;
        let update = update.clone();
        self.change_cart(cart_id, move |cart, _| {
            if let Some(email) = update.email {
                cart.email = Some(email);
            }
            if let Some(address) = update.shipping_address {
                cart.shipping_address = Some(address);
            }
            if let Some(address) = update.billing_address {
                cart.billing_address = Some(address);
            }
        })
    }

    async fn add_shipping_method(&self, cart_id: &str, option_id: &str) -> SyncResult<Cart> {
        self.enter("add_shipping_method", option_id.to_string()).await?;
        let option = self
            .shipping_options
            .iter()
            .find(|o| o.id == option_id)
            .cloned()
            .ok_or_else(|| SyncError::not_found(format!("shipping option {}", option_id)))?;
        self.change_cart(cart_id, move |cart, _| {
            cart.shipping_method = Some(ShippingMethod {
                option_id: option.id,
                name: option.name,
                amount: option.amount,
            });
        })
    }

    async fn list_shipping_options(&self, cart_id: &str) -> SyncResult<Vec<ShippingOption>> {
        self.enter("list_shipping_options", cart_id.to_string()).await?;
        Ok(self.shipping_options.clone())
    }

    async fn list_orders(&self, params: &OrderListParams) -> SyncResult<Vec<Order>> {
        self.enter("list_orders", format!("offset={}", params.offset)).await?;
        Ok(Vec::new())
    }

    async fn retrieve_order(&self, order_id: &str) -> SyncResult<Order> {
        self.enter("retrieve_order", order_id.to_string()).await?;
        Err(SyncError::not_found(format!("order {}", order_id)))
    }

    async fn retrieve_customer(&self) -> SyncResult<Customer> {
        self.enter("retrieve_customer", String::new()).await?;
        Err(SyncError::not_found("customer"))
    }
}

/// Complete, valid address
pub fn address() -> Address {
    Address {
        first_name: "Ada".to_string(),
        last_name: "Lovelace".to_string(),
        address_1: "12 Analytical Row".to_string(),
        city: "London".to_string(),
        postal_code: "N1 9GU".to_string(),
        country_code: "gb".to_string(),
        ..Default::default()
    }
}
