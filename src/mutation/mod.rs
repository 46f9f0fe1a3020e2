//! # Mutation Module
//!
//! Optimistic cart mutations: the operations a storefront can perform on a cart and
//! the controller that applies them speculatively with snapshot and rollback.

pub mod controller;
pub mod operations;

pub use controller::{MutationController, MutationEvent, MutationPhase};
pub use operations::{CartOperation, PROVISIONAL_LINE_PREFIX};
