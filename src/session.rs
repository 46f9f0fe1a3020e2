//! # Storefront Session
//!
//! Wires the cache store, mutation controller and prefetch scheduler around one
//! remote data service. This is the surface the presentation layer talks to: it
//! issues keyed queries, cart mutations and view changes, and subscribes to the
//! store for change notifications.

use crate::caching::entry::EntryState;
use crate::caching::key::{keys, QueryKey};
use crate::caching::policy::TierName;
use crate::caching::store::{CacheEvent, Subscription};
use crate::commerce::cart_id::CartIdStore;
use crate::commerce::remote::RemoteDataService;
use crate::commerce::types::{
    Cart, Category, CommerceData, Customer, Order, OrderListParams, Product, ProductListParams,
    ProductPage, ShippingOption,
};
use crate::commerce::CommerceCache;
use crate::core::config::SyncConfig;
use crate::core::error::{SyncError, SyncResult};
use crate::mutation::{CartOperation, MutationController};
use crate::prefetch::{PageContext, PrefetchScheduler};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Re-runs the query that populated a key
type Refetcher = Arc<dyn Fn() -> BoxFuture<'static, SyncResult<CommerceData>> + Send + Sync>;

/// One storefront session
pub struct StorefrontSync {
    config: SyncConfig,
    store: CommerceCache,
    remote: Arc<dyn RemoteDataService>,
    mutations: MutationController,
    prefetcher: PrefetchScheduler,
    cart_ids: Arc<dyn CartIdStore>,
    refetchers: DashMap<QueryKey, (TierName, Refetcher)>,
    gc_task: Mutex<Option<JoinHandle<()>>>,
    started_at: DateTime<Utc>,
}

impl StorefrontSync {
    /// Build a session from validated configuration
    pub fn new(
        config: SyncConfig,
        remote: Arc<dyn RemoteDataService>,
        cart_ids: Arc<dyn CartIdStore>,
    ) -> SyncResult<Self> {
        config.validate()?;

        let store = CommerceCache::new(config.staleness.clone(), config.store.clone());
        let mutations = MutationController::new(store.clone(), remote.clone());
        let prefetcher =
            PrefetchScheduler::new(store.clone(), remote.clone(), config.prefetch.clone());

        info!("Storefront sync session created");
        Ok(Self {
            config,
            store,
            remote,
            mutations,
            prefetcher,
            cart_ids,
            refetchers: DashMap::new(),
            gc_task: Mutex::new(None),
            started_at: Utc::now(),
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn store(&self) -> &CommerceCache {
        &self.store
    }

    pub fn mutations(&self) -> &MutationController {
        &self.mutations
    }

    pub fn prefetcher(&self) -> &PrefetchScheduler {
        &self.prefetcher
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Start the background eviction sweep (idempotent)
    pub fn start_gc(&self) {
        let mut task = self.gc_task.lock();
        if task.is_none() {
            *task = Some(self.store.start_gc_sweeper());
        }
    }

    /// Subscribe to changes of one key
    pub fn subscribe<F>(&self, key: QueryKey, listener: F) -> Subscription<CommerceData>
    where
        F: Fn(&CacheEvent) + Send + Sync + 'static,
    {
        self.store.subscribe(key, listener)
    }

    /// Product listing page
    pub async fn products(&self, params: &ProductListParams) -> SyncResult<Option<ProductPage>> {
        let remote = self.remote.clone();
        let request = params.clone();
        let data = self
            .query_with(keys::products::list(params), keys::products::TIER, move || {
                let remote = remote.clone();
                let request = request.clone();
                async move {
                    remote
                        .list_products(&request, CancellationToken::new())
                        .await
                        .map(CommerceData::ProductPage)
                }
            })
            .await?;
        Ok(data.and_then(CommerceData::into_product_page))
    }

    /// Product listing page the shopper is viewing; schedules prefetches around it
    pub async fn view_products(&self, params: &ProductListParams) -> SyncResult<Option<ProductPage>> {
        let page = self.products(params).await?;
        if let Some(page) = &page {
            self.prefetcher
                .schedule_prefetches(&PageContext::from_page(params.clone(), page));
        }
        Ok(page)
    }

    pub async fn product(&self, handle: &str) -> SyncResult<Option<Product>> {
        let remote = self.remote.clone();
        let handle_owned = handle.to_string();
        let data = self
            .query_with(keys::products::detail(handle), keys::products::TIER, move || {
                let remote = remote.clone();
                let handle = handle_owned.clone();
                async move { remote.retrieve_product(&handle).await.map(CommerceData::Product) }
            })
            .await?;
        Ok(data.and_then(CommerceData::into_product))
    }

    pub async fn categories(&self) -> SyncResult<Vec<Category>> {
        let remote = self.remote.clone();
        let data = self
            .query_with(keys::categories::list(), keys::categories::TIER, move || {
                let remote = remote.clone();
                async move { remote.list_categories().await.map(CommerceData::Categories) }
            })
            .await?;
        Ok(data.and_then(CommerceData::into_categories).unwrap_or_default())
    }

    /// The shopper's cart
    ///
    /// A stored cart id the server no longer knows is forgotten.
    pub async fn cart(&self) -> SyncResult<Option<Cart>> {
        let cart_id = match self.cart_ids.load().await? {
            Some(cart_id) => cart_id,
            None => return Ok(None),
        };

        let remote = self.remote.clone();
        let id = cart_id.clone();
        let data = self
            .query_with(keys::cart::detail(&cart_id), keys::cart::TIER, move || {
                let remote = remote.clone();
                let id = id.clone();
                async move { remote.retrieve_cart(&id).await.map(CommerceData::Cart) }
            })
            .await?;

        match data.and_then(CommerceData::into_cart) {
            Some(cart) => Ok(Some(cart)),
            None => {
                info!(cart_id = %cart_id, "Stored cart no longer exists, forgetting it");
                self.cart_ids.clear().await?;
                Ok(None)
            }
        }
    }

    pub async fn shipping_options(&self, cart_id: &str) -> SyncResult<Vec<ShippingOption>> {
        let remote = self.remote.clone();
        let id = cart_id.to_string();
        let data = self
            .query_with(
                keys::cart::shipping_options(cart_id),
                keys::cart::SHIPPING_OPTIONS_TIER,
                move || {
                    let remote = remote.clone();
                    let id = id.clone();
                    async move {
                        remote
                            .list_shipping_options(&id)
                            .await
                            .map(CommerceData::ShippingOptions)
                    }
                },
            )
            .await?;
        Ok(data.and_then(CommerceData::into_shipping_options).unwrap_or_default())
    }

    pub async fn orders(&self, params: &OrderListParams) -> SyncResult<Vec<Order>> {
        let remote = self.remote.clone();
        let request = params.clone();
        let data = self
            .query_with(keys::orders::list(params.to_params()), keys::orders::TIER, move || {
                let remote = remote.clone();
                let request = request.clone();
                async move { remote.list_orders(&request).await.map(CommerceData::Orders) }
            })
            .await?;
        Ok(data.and_then(CommerceData::into_orders).unwrap_or_default())
    }

    pub async fn order(&self, order_id: &str) -> SyncResult<Option<Order>> {
        let remote = self.remote.clone();
        let id = order_id.to_string();
        let data = self
            .query_with(keys::orders::detail(order_id), keys::orders::TIER, move || {
                let remote = remote.clone();
                let id = id.clone();
                async move { remote.retrieve_order(&id).await.map(CommerceData::Order) }
            })
            .await?;
        Ok(data.and_then(CommerceData::into_order))
    }

    pub async fn customer(&self) -> SyncResult<Option<Customer>> {
        let remote = self.remote.clone();
        let data = self
            .query_with(keys::customer::me(), keys::customer::TIER, move || {
                let remote = remote.clone();
                async move { remote.retrieve_customer().await.map(CommerceData::Customer) }
            })
            .await?;
        Ok(data.and_then(CommerceData::into_customer))
    }

    /// Apply an optimistic mutation to the shopper's cart
    pub async fn mutate_cart(&self, operation: CartOperation) -> SyncResult<Cart> {
        let cart_id = self
            .cart_ids
            .load()
            .await?
            .ok_or_else(|| SyncError::not_found("cart"))?;
        self.mutations.mutate(&cart_id, operation).await
    }

    /// Remember a newly created cart
    pub async fn use_cart(&self, cart: Cart) -> SyncResult<()> {
        self.cart_ids.save(&cart.id).await?;
        self.store.write(
            keys::cart::detail(&cart.id),
            CommerceData::Cart(cart),
            keys::cart::TIER,
        );
        Ok(())
    }

    /// Forget the shopper's cart, e.g. once checkout completed
    pub async fn forget_cart(&self) -> SyncResult<()> {
        if let Some(cart_id) = self.cart_ids.load().await? {
            self.store.remove(&keys::cart::detail(&cart_id));
            self.store.remove(&keys::cart::shipping_options(&cart_id));
            self.cart_ids.clear().await?;
            info!(cart_id = %cart_id, "Cart forgotten");
        }
        Ok(())
    }

    /// Refresh stale subscribed queries when the storefront regains focus
    ///
    /// Returns the number of refreshes started.
    pub fn refetch_on_focus(&self) -> usize {
        // Drop refetchers of evicted keys
        self.refetchers
            .retain(|key, _| self.store.state(key) != EntryState::Empty);

        let mut started = 0;
        for (key, tier) in self.store.keys_to_refetch_on_focus() {
            let refetcher = match self.refetchers.get(&key) {
                Some(entry) => entry.value().1.clone(),
                None => continue,
            };
            debug!(key = %key, tier = %tier, "Refetching on focus");
            // Runs on its own task; nobody waits for it here
            drop(self.store.refresh(key, tier, move || refetcher()));
            started += 1;
        }
        started
    }

    /// Cancel prefetches and stop background work
    pub fn shutdown(&self) {
        self.prefetcher.shutdown();
        if let Some(task) = self.gc_task.lock().take() {
            task.abort();
        }
        info!("Storefront sync session shut down");
    }

    async fn query_with<F, Fut>(
        &self,
        key: QueryKey,
        tier: TierName,
        make: F,
    ) -> SyncResult<Option<CommerceData>>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = SyncResult<CommerceData>> + Send + 'static,
    {
        let refetcher: Refetcher = Arc::new(move || make().boxed());
        self.refetchers
            .insert(key.clone(), (tier, refetcher.clone()));
        self.store.query(key, tier, move || refetcher()).await
    }
}

impl Drop for StorefrontSync {
    fn drop(&mut self) {
        if let Some(task) = self.gc_task.lock().take() {
            task.abort();
        }
    }
}
