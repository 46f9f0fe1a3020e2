//! # Optimistic Mutation Controller
//!
//! Applies cart mutations speculatively to the cache, performs them against the
//! commerce API, and either confirms the server result or rolls the cart back.
//!
//! ## Phases
//! `Idle → Snapshotting → Speculating → (Confirmed | RollingBack) → Idle`
//!
//! ## Overlapping mutations
//! The snapshot of a cart is taken before its first outstanding mutation and kept
//! until the last one settles. A failed mutation restores that snapshot and replays
//! the speculative transforms of the mutations still outstanding, in request order.
//! Remote calls run concurrently; the last to complete determines the cached cart.
//! While any mutation is outstanding the cart key is held in the store, so background
//! refreshes cannot replace the speculative cart.

use super::operations::CartOperation;
use crate::caching::key::keys;
use crate::caching::store::Hold;
use crate::commerce::remote::RemoteDataService;
use crate::commerce::types::{Cart, CommerceData};
use crate::commerce::CommerceCache;
use crate::core::error::{SyncError, SyncResult};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Mutation lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationPhase {
    Idle,
    Snapshotting,
    Speculating,
    Confirmed,
    RollingBack,
}

/// Phase transition of one mutation, broadcast to subscribers
#[derive(Debug, Clone)]
pub struct MutationEvent {
    pub mutation_id: Uuid,
    pub cart_id: String,
    pub operation: &'static str,
    pub phase: MutationPhase,
    pub error: Option<SyncError>,
    pub timestamp: DateTime<Utc>,
}

/// A mutation whose remote call has not settled
#[derive(Debug, Clone)]
struct Outstanding {
    id: Uuid,
    operation: CartOperation,
}

/// Per-cart bookkeeping while mutations are outstanding
#[derive(Debug)]
struct CartLedger {
    /// Cart as it was before the first outstanding mutation
    snapshot: Cart,
    /// Outstanding mutations in request order
    outstanding: Vec<Outstanding>,
    /// Whether any mutation confirmed since the snapshot was taken
    confirmed_since_snapshot: bool,
    /// Keeps fetch results off the cart key; released with the ledger
    _hold: Hold<CommerceData>,
}

/// Optimistic mutation controller for carts
///
/// The ledger lock is held while speculative values are written to the store, so
/// cache listeners must not call back into the controller synchronously.
pub struct MutationController {
    store: CommerceCache,
    remote: Arc<dyn RemoteDataService>,
    ledgers: Mutex<HashMap<String, CartLedger>>,
    events: broadcast::Sender<MutationEvent>,
}

impl MutationController {
    /// Create a new controller over an explicitly constructed store
    pub fn new(store: CommerceCache, remote: Arc<dyn RemoteDataService>) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            store,
            remote,
            ledgers: Mutex::new(HashMap::new()),
            events,
        }
    }

    /// Subscribe to phase transitions
    pub fn subscribe(&self) -> broadcast::Receiver<MutationEvent> {
        self.events.subscribe()
    }

    /// Number of mutations in flight for a cart
    pub fn outstanding(&self, cart_id: &str) -> usize {
        self.ledgers
            .lock()
            .get(cart_id)
            .map(|ledger| ledger.outstanding.len())
            .unwrap_or(0)
    }

    /// Rollback target held for a cart, if any mutation is outstanding
    pub fn snapshot(&self, cart_id: &str) -> Option<Cart> {
        self.ledgers
            .lock()
            .get(cart_id)
            .map(|ledger| ledger.snapshot.clone())
    }

    /// Apply `operation` to the cart optimistically and perform it remotely
    ///
    /// Returns the server cart on success. On failure the cart is rolled back and
    /// the error returned; validation errors are returned before anything is written.
    pub async fn mutate(&self, cart_id: &str, operation: CartOperation) -> SyncResult<Cart> {
        let mutation_id = Uuid::new_v4();
        let key = keys::cart::detail(cart_id);

        self.emit(mutation_id, cart_id, &operation, MutationPhase::Snapshotting, None);
        let loaded = match self.current_cart(cart_id).await {
            Ok(cart) => cart,
            Err(e) => {
                self.emit(mutation_id, cart_id, &operation, MutationPhase::Idle, Some(e.clone()));
                return Err(e);
            }
        };

        let speculative = {
            let mut ledgers = self.ledgers.lock();

            // The cached cart may have moved on while it was being loaded
            let current = self
                .store
                .peek(&key)
                .and_then(CommerceData::into_cart)
                .unwrap_or(loaded);

            if let Err(e) = operation.validate(&current) {
                drop(ledgers);
                debug!(
                    cart_id = %cart_id,
                    operation = operation.name(),
                    error = %e,
                    "Mutation rejected by validation"
                );
                self.emit(mutation_id, cart_id, &operation, MutationPhase::Idle, Some(e.clone()));
                return Err(e);
            }

            let ledger = ledgers
                .entry(cart_id.to_string())
                .or_insert_with(|| CartLedger {
                    snapshot: current.clone(),
                    outstanding: Vec::new(),
                    confirmed_since_snapshot: false,
                    _hold: self.store.hold(key.clone()),
                });
            ledger.outstanding.push(Outstanding {
                id: mutation_id,
                operation: operation.clone(),
            });

            let speculative = operation.apply(&current);
            self.store.write(
                key.clone(),
                CommerceData::Cart(speculative.clone()),
                keys::cart::TIER,
            );
            speculative
        };

        debug!(
            cart_id = %cart_id,
            mutation_id = %mutation_id,
            operation = operation.name(),
            total = speculative.total,
            "Speculative cart written"
        );
        self.emit(mutation_id, cart_id, &operation, MutationPhase::Speculating, None);

        match operation.execute(self.remote.as_ref(), cart_id).await {
            Ok(server_cart) => {
                self.confirm(mutation_id, cart_id, &operation, server_cart.clone());
                Ok(server_cart)
            }
            Err(e) => {
                self.roll_back(mutation_id, cart_id, &operation, &e);
                Err(e)
            }
        }
    }

    /// Cart currently cached (even if stale or speculative), fetched when absent
    async fn current_cart(&self, cart_id: &str) -> SyncResult<Cart> {
        let key = keys::cart::detail(cart_id);
        if let Some(cart) = self.store.peek(&key).and_then(CommerceData::into_cart) {
            return Ok(cart);
        }

        let remote = self.remote.clone();
        let id = cart_id.to_string();
        let data = self
            .store
            .fetch(key, keys::cart::TIER, move || async move {
                remote.retrieve_cart(&id).await.map(CommerceData::Cart)
            })
            .await?;

        data.into_cart()
            .ok_or_else(|| SyncError::unknown(format!("cached value for cart '{}' is not a cart", cart_id)))
    }

    fn confirm(&self, mutation_id: Uuid, cart_id: &str, operation: &CartOperation, server_cart: Cart) {
        let key = keys::cart::detail(cart_id);
        let still_outstanding = {
            let mut ledgers = self.ledgers.lock();
            let remaining = match ledgers.get_mut(cart_id) {
                Some(ledger) => {
                    ledger.outstanding.retain(|m| m.id != mutation_id);
                    ledger.confirmed_since_snapshot = true;
                    ledger.outstanding.len()
                }
                None => 0,
            };
            if remaining == 0 {
                ledgers.remove(cart_id);
            }

            self.store
                .write(key, CommerceData::Cart(server_cart), keys::cart::TIER);
            remaining
        };

        for dependent in operation.dependent_keys(cart_id) {
            self.store.invalidate(dependent);
        }

        info!(
            cart_id = %cart_id,
            mutation_id = %mutation_id,
            operation = operation.name(),
            still_outstanding,
            "Cart mutation confirmed"
        );
        self.emit(mutation_id, cart_id, operation, MutationPhase::Confirmed, None);
        self.emit(mutation_id, cart_id, operation, MutationPhase::Idle, None);
    }

    fn roll_back(&self, mutation_id: Uuid, cart_id: &str, operation: &CartOperation, error: &SyncError) {
        self.emit(
            mutation_id,
            cart_id,
            operation,
            MutationPhase::RollingBack,
            Some(error.clone()),
        );

        let key = keys::cart::detail(cart_id);
        let reconcile = {
            let mut ledgers = self.ledgers.lock();
            match ledgers.get_mut(cart_id) {
                Some(ledger) => {
                    ledger.outstanding.retain(|m| m.id != mutation_id);

                    let restored = ledger
                        .outstanding
                        .iter()
                        .fold(ledger.snapshot.clone(), |cart, pending| {
                            pending.operation.apply(&cart)
                        });
                    let reconcile = ledger.confirmed_since_snapshot;

                    if ledger.outstanding.is_empty() {
                        ledgers.remove(cart_id);
                    }

                    self.store
                        .restore(key.clone(), CommerceData::Cart(restored), keys::cart::TIER);
                    reconcile
                }
                None => false,
            }
        };

        if reconcile {
            self.store.invalidate(key);
        }

        warn!(
            cart_id = %cart_id,
            mutation_id = %mutation_id,
            operation = operation.name(),
            error = %error,
            reconcile,
            "Cart mutation failed, rolled back"
        );
        self.emit(mutation_id, cart_id, operation, MutationPhase::Idle, Some(error.clone()));
    }

    fn emit(
        &self,
        mutation_id: Uuid,
        cart_id: &str,
        operation: &CartOperation,
        phase: MutationPhase,
        error: Option<SyncError>,
    ) {
        debug!(
            cart_id = %cart_id,
            mutation_id = %mutation_id,
            operation = operation.name(),
            phase = ?phase,
            "Mutation phase"
        );

        // No receivers is fine
        let _ = self.events.send(MutationEvent {
            mutation_id,
            cart_id: cart_id.to_string(),
            operation: operation.name(),
            phase,
            error,
            timestamp: Utc::now(),
        });
    }
}
