//! # Session Integration Tests
//!
//! Read path of the storefront session against the scripted commerce API:
//! deduplication, "no data" for missing resources, focus refetching and eviction.

mod common;

use common::{ScriptedRemote, CART_ID};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use storefront_sync::commerce::{Cart, CartIdStore, MemoryCartIdStore, ProductListParams};
use storefront_sync::{
    keys, CacheEventKind, EntryState, StorefrontSync, SyncConfig, SyncError,
};
use tokio::time::{sleep, Instant};

fn create_session() -> (Arc<StorefrontSync>, Arc<ScriptedRemote>, Arc<MemoryCartIdStore>) {
    let remote = ScriptedRemote::new(24);
    let cart_ids = Arc::new(MemoryCartIdStore::new());
    let session = StorefrontSync::new(SyncConfig::default(), remote.clone(), cart_ids.clone())
        .expect("default config is valid");
    (Arc::new(session), remote, cart_ids)
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_reads_share_one_request() {
    let (session, remote, _) = create_session();
    remote.delay_next("list_categories", Duration::from_millis(50));

    let (first, second, third) = tokio::join!(
        session.categories(),
        session.categories(),
        session.categories()
    );

    assert_eq!(first.unwrap().len(), 1);
    assert_eq!(second.unwrap(), third.unwrap());
    assert_eq!(remote.call_count("list_categories"), 1);
    assert_eq!(session.store().stats().dedup_joins, 2);
}

#[tokio::test]
async fn test_missing_product_is_no_data() {
    let (session, remote, _) = create_session();

    assert!(session.product("product-3").await.unwrap().is_some());
    assert!(session.product("no-such-product").await.unwrap().is_none());
    assert_eq!(
        session
            .store()
            .state(&keys::products::detail("no-such-product")),
        EntryState::Error
    );

    // The error entry answers repeated reads until its window passes
    assert!(session.product("no-such-product").await.unwrap().is_none());
    assert_eq!(remote.call_count("retrieve_product"), 2);
}

#[tokio::test]
async fn test_network_errors_are_surfaced() {
    let (session, remote, _) = create_session();
    remote.fail_next("list_categories", SyncError::network("unreachable"));

    let err = session.categories().await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(session.store().stats().failures, 1);
}

#[tokio::test]
async fn test_unknown_cart_id_is_forgotten() {
    let (session, remote, cart_ids) = create_session();
    cart_ids.save("cart_gone").await.unwrap();

    assert!(session.cart().await.unwrap().is_none());
    assert_eq!(cart_ids.load().await.unwrap(), None);
    assert_eq!(remote.calls("retrieve_cart"), vec!["cart_gone".to_string()]);

    cart_ids.save(CART_ID).await.unwrap();
    let cart = session.cart().await.unwrap().unwrap();
    assert_eq!(cart.id, CART_ID);
}

#[tokio::test]
async fn test_forget_cart_drops_cached_cart() {
    let (session, remote, cart_ids) = create_session();
    session.use_cart(remote.server_cart()).await.unwrap();
    session.shipping_options(CART_ID).await.unwrap();

    session.forget_cart().await.unwrap();
    assert_eq!(cart_ids.load().await.unwrap(), None);
    assert!(session.store().peek(&keys::cart::detail(CART_ID)).is_none());
    assert!(session
        .store()
        .peek(&keys::cart::shipping_options(CART_ID))
        .is_none());
}

#[tokio::test(start_paused = true)]
async fn test_focus_refetches_stale_subscribed_queries() {
    let (session, remote, _) = create_session();
    session.use_cart(remote.server_cart()).await.unwrap();
    session.cart().await.unwrap();
    session.categories().await.unwrap();

    let events = Arc::new(Mutex::new(Vec::new()));
    let recorded = events.clone();
    let _cart_subscription = session.subscribe(keys::cart::detail(CART_ID), move |event| {
        recorded.lock().push(event.kind);
    });
    let _categories_subscription = session.subscribe(keys::categories::list(), |_| {});

    // Cart data is stale immediately; categories stay fresh for an hour
    sleep(Duration::from_secs(1)).await;
    assert_eq!(session.refetch_on_focus(), 1);
    sleep(Duration::from_millis(1)).await;

    assert_eq!(
        events.lock().as_slice(),
        &[CacheEventKind::Fetching, CacheEventKind::Fetched]
    );
    assert_eq!(remote.call_count("list_categories"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_eviction_spares_subscribed_entries() {
    let (session, remote, _) = create_session();
    let listing = ProductListParams::default();
    session.products(&listing).await.unwrap();
    session.categories().await.unwrap();

    let subscription = session.subscribe(keys::products::list(&listing), |_| {});

    // Past the semi-static gc window (30m) but inside the static one (24h)
    sleep(Duration::from_secs(31 * 60)).await;
    assert!(session.store().evict(Instant::now()).is_empty());

    subscription.unsubscribe();
    let evicted = session.store().evict(Instant::now());
    assert_eq!(evicted, vec![keys::products::list(&listing)]);
    assert!(session.store().peek(&keys::categories::list()).is_some());

    // An evicted page is fetched again on the next read
    session.products(&listing).await.unwrap();
    assert_eq!(remote.call_count("list_products"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_gc_sweeper_runs_in_background() {
    let (session, _remote, _) = create_session();
    session.start_gc();
    session.start_gc();
    session.products(&ProductListParams::default()).await.unwrap();

    sleep(Duration::from_secs(32 * 60)).await;
    assert_eq!(session.store().stats().entries, 0);
    assert_eq!(session.store().stats().evictions, 1);
    session.shutdown();
}

#[tokio::test]
async fn test_use_cart_seeds_cache() {
    let (session, remote, _) = create_session();
    let cart: Cart = remote.server_cart();
    session.use_cart(cart.clone()).await.unwrap();

    assert_eq!(session.cart().await.unwrap(), Some(cart));
}
