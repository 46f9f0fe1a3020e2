//! # Optimistic Mutation Integration Tests
//!
//! Cart mutations through a full session against the scripted commerce API:
//! rollback, overlapping mutations and dependent-key invalidation.

mod common;

use common::{address, ScriptedRemote, CART_ID, PRICE};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use storefront_sync::commerce::{Cart, MemoryCartIdStore};
use storefront_sync::{
    keys, CacheEventKind, CartOperation, CommerceData, EntryState, MutationPhase,
    StorefrontSync, SyncConfig, SyncError,
};
use tokio::time::sleep;
use tokio_test::{assert_err, assert_ok};

async fn create_session() -> (Arc<StorefrontSync>, Arc<ScriptedRemote>) {
    let remote = ScriptedRemote::new(40);
    let session = StorefrontSync::new(
        SyncConfig::default(),
        remote.clone(),
        Arc::new(MemoryCartIdStore::new()),
    )
    .expect("default config is valid");

    session.use_cart(remote.server_cart()).await.unwrap();
    (Arc::new(session), remote)
}

fn cached_cart(session: &StorefrontSync) -> Cart {
    session
        .store()
        .peek(&keys::cart::detail(CART_ID))
        .and_then(CommerceData::into_cart)
        .expect("cart is cached")
}

fn set_quantity(quantity: u32) -> CartOperation {
    CartOperation::UpdateLineItem {
        line_id: "line_1".to_string(),
        quantity,
    }
}

fn add_variant(variant: &str) -> CartOperation {
    CartOperation::AddLineItem {
        variant_id: variant.to_string(),
        quantity: 1,
        title: variant.to_string(),
        unit_price: PRICE,
    }
}

fn spawn_mutation(
    session: &Arc<StorefrontSync>,
    operation: CartOperation,
) -> tokio::task::JoinHandle<Result<Cart, SyncError>> {
    let session = session.clone();
    tokio::spawn(async move { session.mutate_cart(operation).await })
}

#[tokio::test]
async fn test_failed_mutation_restores_visible_cart() {
    let (session, remote) = create_session().await;
    let before = cached_cart(&session);
    let mut events = session.mutations().subscribe();

    remote.fail_next("update_line_item", SyncError::network("connection reset"));
    let err = assert_err!(session.mutate_cart(set_quantity(4)).await);

    assert_eq!(err, SyncError::network("connection reset"));
    assert_eq!(cached_cart(&session), before);
    assert_eq!(cached_cart(&session).total, PRICE);
    assert_eq!(session.mutations().outstanding(CART_ID), 0);

    let mut phases = Vec::new();
    while let Ok(event) = events.try_recv() {
        phases.push(event.phase);
    }
    assert_eq!(
        phases,
        vec![
            MutationPhase::Snapshotting,
            MutationPhase::Speculating,
            MutationPhase::RollingBack,
            MutationPhase::Idle,
        ]
    );
}

#[tokio::test]
async fn test_successful_mutation_shows_server_cart() {
    let (session, remote) = create_session().await;
    let cart = assert_ok!(session.mutate_cart(add_variant("variant_2")).await);

    assert_eq!(cart, remote.server_cart());
    assert_eq!(cached_cart(&session), cart);
    assert_eq!(cart.line_items.len(), 2);
    assert_eq!(cart.line_items[1].id, "line_2");
    assert_eq!(cart.total, 2 * PRICE);
}

#[tokio::test(start_paused = true)]
async fn test_rollback_replays_outstanding_mutations() {
    let (session, remote) = create_session().await;
    let original = cached_cart(&session);

    remote.delay_next("update_line_item", Duration::from_millis(100));
    remote.delay_next("add_line_item", Duration::from_millis(50));
    remote.fail_next("add_line_item", SyncError::conflict("inventory changed"));

    let first = spawn_mutation(&session, set_quantity(3));
    sleep(Duration::from_millis(1)).await;
    let second = spawn_mutation(&session, add_variant("variant_2"));
    sleep(Duration::from_millis(10)).await;

    // Both speculative changes are visible
    let speculative = cached_cart(&session);
    assert_eq!(speculative.line_items.len(), 2);
    assert_eq!(speculative.line_items[0].quantity, 3);
    assert_eq!(speculative.total, 4 * PRICE);
    assert_eq!(session.mutations().outstanding(CART_ID), 2);
    assert_eq!(session.mutations().snapshot(CART_ID), Some(original.clone()));

    // The add fails; the quantity change stays visible on top of the snapshot
    sleep(Duration::from_millis(50)).await;
    assert_eq!(
        second.await.unwrap(),
        Err(SyncError::conflict("inventory changed"))
    );
    let rolled_back = cached_cart(&session);
    assert_eq!(rolled_back.line_items.len(), 1);
    assert_eq!(rolled_back.line_items[0].quantity, 3);
    assert_eq!(rolled_back.total, 3 * PRICE);
    assert!(rolled_back.totals_are_consistent());
    assert_eq!(session.mutations().outstanding(CART_ID), 1);

    // Then the quantity change confirms
    let confirmed = first.await.unwrap().unwrap();
    assert_eq!(confirmed.line_items[0].quantity, 3);
    assert_eq!(cached_cart(&session), remote.server_cart());
    assert_eq!(session.mutations().outstanding(CART_ID), 0);
    assert!(session.mutations().snapshot(CART_ID).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_reads_during_mutation_keep_speculative_cart() {
    let (session, remote) = create_session().await;
    let key = keys::cart::detail(CART_ID);
    let _subscription = session.subscribe(key.clone(), |_| {});

    remote.delay_next("update_line_item", Duration::from_millis(100));
    remote.delay_next("add_line_item", Duration::from_millis(50));

    let first = spawn_mutation(&session, set_quantity(3));
    sleep(Duration::from_millis(1)).await;
    assert!(session.store().is_held(&key));

    // Foreground read and focus refetch while the mutation is in flight
    let served = session.cart().await.unwrap().unwrap();
    assert_eq!(served.line_items[0].quantity, 3);
    assert_eq!(session.refetch_on_focus(), 0);
    sleep(Duration::from_millis(5)).await;

    assert_eq!(cached_cart(&session).line_items[0].quantity, 3);
    assert_eq!(remote.call_count("retrieve_cart"), 0);

    // A second mutation builds on the first one's speculative cart
    let second = spawn_mutation(&session, add_variant("variant_2"));
    sleep(Duration::from_millis(1)).await;
    let speculative = cached_cart(&session);
    assert_eq!(speculative.line_items.len(), 2);
    assert_eq!(speculative.line_items[0].quantity, 3);
    assert_eq!(speculative.line_items[1].variant_id, "variant_2");
    assert!(speculative.line_items[1]
        .id
        .starts_with(storefront_sync::mutation::PROVISIONAL_LINE_PREFIX));
    assert_eq!(speculative.total, 4 * PRICE);

    assert_ok!(second.await.unwrap());
    assert_ok!(first.await.unwrap());
    let confirmed = cached_cart(&session);
    assert_eq!(confirmed, remote.server_cart());
    assert_eq!(confirmed.line_items[0].quantity, 3);
    assert_eq!(confirmed.line_items.len(), 2);
    assert!(!session.store().is_held(&key));
    assert_eq!(session.mutations().outstanding(CART_ID), 0);
}

#[tokio::test(start_paused = true)]
async fn test_rollback_after_confirm_reconciles_with_server() {
    let (session, remote) = create_session().await;

    remote.delay_next("update_cart", Duration::from_millis(10));
    remote.delay_next("update_line_item", Duration::from_millis(50));
    remote.fail_next("update_line_item", SyncError::network("timeout"));

    let email = spawn_mutation(
        &session,
        CartOperation::SetEmail {
            email: "ada@example.com".to_string(),
        },
    );
    sleep(Duration::from_millis(1)).await;
    let quantity = spawn_mutation(&session, set_quantity(5));

    assert!(email.await.unwrap().is_ok());
    assert!(quantity.await.unwrap().is_err());

    // Restored to the pre-first snapshot and marked for reconciliation
    let key = keys::cart::detail(CART_ID);
    assert_eq!(session.store().state(&key), EntryState::Stale);
    assert_eq!(cached_cart(&session).line_items[0].quantity, 1);

    // The next read serves the snapshot and refreshes in the background
    let served = session.cart().await.unwrap().unwrap();
    assert_eq!(served.email, None);
    sleep(Duration::from_millis(1)).await;
    let reconciled = cached_cart(&session);
    assert_eq!(reconciled, remote.server_cart());
    assert_eq!(reconciled.email.as_deref(), Some("ada@example.com"));
}

#[tokio::test(start_paused = true)]
async fn test_overlapping_mutations_last_completion_wins() {
    let (session, remote) = create_session().await;

    remote.delay_next("update_line_item", Duration::from_millis(100));
    remote.delay_next("update_cart", Duration::from_millis(10));

    let quantity = spawn_mutation(&session, set_quantity(3));
    sleep(Duration::from_millis(1)).await;
    let email = spawn_mutation(
        &session,
        CartOperation::SetEmail {
            email: "ada@example.com".to_string(),
        },
    );

    let after_email = email.await.unwrap().unwrap();
    assert_eq!(after_email.version, 1);
    assert_eq!(cached_cart(&session), after_email);

    let after_quantity = quantity.await.unwrap().unwrap();
    assert_eq!(after_quantity.version, 2);
    assert_eq!(cached_cart(&session), after_quantity);
    assert_eq!(after_quantity.line_items[0].quantity, 3);
    assert_eq!(after_quantity.email.as_deref(), Some("ada@example.com"));
}

#[tokio::test]
async fn test_validation_failure_is_never_speculative() {
    let (session, remote) = create_session().await;
    let kinds = Arc::new(Mutex::new(Vec::new()));
    let recorded = kinds.clone();
    let _subscription = session.subscribe(keys::cart::detail(CART_ID), move |event| {
        recorded.lock().push(event.kind);
    });

    let err = session
        .mutate_cart(CartOperation::SetShippingAddress {
            address: storefront_sync::commerce::Address {
                city: String::new(),
                ..address()
            },
        })
        .await
        .unwrap_err();

    assert_eq!(
        err,
        SyncError::validation("shipping_address.city", "is required")
    );
    assert!(!kinds.lock().contains(&CacheEventKind::Written));
    assert_eq!(remote.call_count("update_cart"), 0);
}

#[tokio::test]
async fn test_confirmed_address_refreshes_shipping_options() {
    let (session, remote) = create_session().await;

    let options = session.shipping_options(CART_ID).await.unwrap();
    assert_eq!(options.len(), 2);
    session.shipping_options(CART_ID).await.unwrap();
    assert_eq!(remote.call_count("list_shipping_options"), 1);

    session
        .mutate_cart(CartOperation::SetShippingAddress { address: address() })
        .await
        .unwrap();
    assert_eq!(
        session
            .store()
            .state(&keys::cart::shipping_options(CART_ID)),
        EntryState::Stale
    );

    // Stale options are served while the refresh runs
    session.shipping_options(CART_ID).await.unwrap();
    sleep(Duration::from_millis(10)).await;
    assert_eq!(remote.call_count("list_shipping_options"), 2);
}

#[tokio::test]
async fn test_shipping_method_updates_totals() {
    let (session, _remote) = create_session().await;
    let options = session.shipping_options(CART_ID).await.unwrap();
    let express = options
        .into_iter()
        .find(|o| o.id == "so_express")
        .unwrap();

    let cart = session
        .mutate_cart(CartOperation::SetShippingMethod { option: express })
        .await
        .unwrap();
    assert_eq!(cart.shipping_total, 1500);
    assert_eq!(cart.total, PRICE + 1500);
}

#[tokio::test]
async fn test_mutation_without_cart() {
    let remote = ScriptedRemote::new(4);
    let session = StorefrontSync::new(
        SyncConfig::default(),
        remote.clone(),
        Arc::new(MemoryCartIdStore::new()),
    )
    .unwrap();

    assert!(session.cart().await.unwrap().is_none());
    let err = session.mutate_cart(set_quantity(2)).await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(remote.call_count("update_line_item"), 0);
}
