//! # Cart Operations
//!
//! Every cart mutation the storefront can issue, with:
//! - validation against the current (possibly speculative) cart
//! - a pure transform producing the speculative cart
//! - the remote call that performs it
//! - the dependent cache keys it invalidates once confirmed

use crate::caching::key::{keys, QueryKey};
use crate::commerce::remote::{AddLineItemRequest, CartUpdate, RemoteDataService};
use crate::commerce::types::{Address, Cart, LineItem, ShippingMethod, ShippingOption};
use crate::core::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};

/// Prefix of line ids assigned to speculatively added items
pub const PROVISIONAL_LINE_PREFIX: &str = "provisional_";

/// Cart mutation intent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CartOperation {
    AddLineItem {
        variant_id: String,
        quantity: u32,
        /// Display data for the speculative line
        title: String,
        unit_price: i64,
    },
    /// Quantity 0 removes the line
    UpdateLineItem { line_id: String, quantity: u32 },
    RemoveLineItem { line_id: String },
    SetShippingAddress { address: Address },
    SetBillingAddress { address: Address },
    SetEmail { email: String },
    SetShippingMethod { option: ShippingOption },
}

impl CartOperation {
    pub fn name(&self) -> &'static str {
        match self {
            CartOperation::AddLineItem { .. } => "add_line_item",
            CartOperation::UpdateLineItem { .. } => "update_line_item",
            CartOperation::RemoveLineItem { .. } => "remove_line_item",
            CartOperation::SetShippingAddress { .. } => "set_shipping_address",
            CartOperation::SetBillingAddress { .. } => "set_billing_address",
            CartOperation::SetEmail { .. } => "set_email",
            CartOperation::SetShippingMethod { .. } => "set_shipping_method",
        }
    }

    /// Reject input the server would refuse, before anything is written
    pub fn validate(&self, cart: &Cart) -> SyncResult<()> {
        match self {
            CartOperation::AddLineItem {
                variant_id,
                quantity,
                ..
            } => {
                if variant_id.trim().is_empty() {
                    return Err(SyncError::validation("variant_id", "is required"));
                }
                if *quantity == 0 {
                    return Err(SyncError::validation("quantity", "must be at least 1"));
                }
                Ok(())
            }
            CartOperation::UpdateLineItem { line_id, .. }
            | CartOperation::RemoveLineItem { line_id } => {
                if line_id.starts_with(PROVISIONAL_LINE_PREFIX) {
                    return Err(SyncError::validation(
                        "line_id",
                        "line item is not confirmed yet",
                    ));
                }
                match cart.line_item(line_id) {
                    Some(_) => Ok(()),
                    None => Err(SyncError::validation(
                        "line_id",
                        format!("no line item '{}' in cart", line_id),
                    )),
                }
            }
            CartOperation::SetShippingAddress { address } => address.validate("shipping_address"),
            CartOperation::SetBillingAddress { address } => address.validate("billing_address"),
            CartOperation::SetEmail { email } => validate_email(email),
            CartOperation::SetShippingMethod { option } => {
                if option.id.trim().is_empty() {
                    return Err(SyncError::validation("option_id", "is required"));
                }
                Ok(())
            }
        }
    }

    /// Speculative result of the operation
    ///
    /// Pure and total: lines that no longer exist are left alone, so the transform can
    /// be replayed on top of an older snapshot. Totals are recalculated.
    pub fn apply(&self, cart: &Cart) -> Cart {
        let mut next = cart.clone();

        match self {
            CartOperation::AddLineItem {
                variant_id,
                quantity,
                title,
                unit_price,
            } => {
                match next
                    .line_items
                    .iter_mut()
                    .find(|item| &item.variant_id == variant_id)
                {
                    Some(item) => item.quantity += quantity,
                    None => next.line_items.push(LineItem {
                        id: format!("{}{}", PROVISIONAL_LINE_PREFIX, variant_id),
                        variant_id: variant_id.clone(),
                        title: title.clone(),
                        quantity: *quantity,
                        unit_price: *unit_price,
                    }),
                }
            }
            CartOperation::UpdateLineItem {
                line_id,
                quantity: 0,
            }
            | CartOperation::RemoveLineItem { line_id } => {
                next.line_items.retain(|item| &item.id != line_id);
            }
            CartOperation::UpdateLineItem { line_id, quantity } => {
                if let Some(item) = next.line_items.iter_mut().find(|item| &item.id == line_id) {
                    item.quantity = *quantity;
                }
            }
            CartOperation::SetShippingAddress { address } => {
                next.shipping_address = Some(address.clone());
            }
            CartOperation::SetBillingAddress { address } => {
                next.billing_address = Some(address.clone());
            }
            CartOperation::SetEmail { email } => {
                next.email = Some(email.trim().to_string());
            }
            CartOperation::SetShippingMethod { option } => {
                next.shipping_method = Some(ShippingMethod {
                    option_id: option.id.clone(),
                    name: option.name.clone(),
                    amount: option.amount,
                });
            }
        }

        next.recalculate_totals();
        next
    }

    /// Perform the operation against the commerce API
    pub async fn execute(
        &self,
        remote: &dyn RemoteDataService,
        cart_id: &str,
    ) -> SyncResult<Cart> {
        match self {
            CartOperation::AddLineItem {
                variant_id,
                quantity,
                ..
            } => {
                let request = AddLineItemRequest {
                    variant_id: variant_id.clone(),
                    quantity: *quantity,
                };
                remote.add_line_item(cart_id, &request).await
            }
            CartOperation::UpdateLineItem { line_id, quantity: 0 } => {
                remote.remove_line_item(cart_id, line_id).await
            }
            CartOperation::UpdateLineItem { line_id, quantity } => {
                remote.update_line_item(cart_id, line_id, *quantity).await
            }
            CartOperation::RemoveLineItem { line_id } => {
                remote.remove_line_item(cart_id, line_id).await
            }
            CartOperation::SetShippingAddress { address } => {
                let update = CartUpdate {
                    shipping_address: Some(address.clone()),
                    ..Default::default()
                };
                remote.update_cart(cart_id, &update).await
            }
            CartOperation::SetBillingAddress { address } => {
                let update = CartUpdate {
                    billing_address: Some(address.clone()),
                    ..Default::default()
                };
                remote.update_cart(cart_id, &update).await
            }
            CartOperation::SetEmail { email } => {
                let update = CartUpdate {
                    email: Some(email.trim().to_string()),
                    ..Default::default()
                };
                remote.update_cart(cart_id, &update).await
            }
            CartOperation::SetShippingMethod { option } => {
                remote.add_shipping_method(cart_id, &option.id).await
            }
        }
    }

    /// Keys whose data depends on the cart contents this operation changes
    pub fn dependent_keys(&self, cart_id: &str) -> Vec<QueryKey> {
        match self {
            CartOperation::SetEmail { .. } => Vec::new(),
            _ => vec![keys::cart::shipping_options(cart_id)],
        }
    }
}

fn validate_email(email: &str) -> SyncResult<()> {
    let email = email.trim();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(SyncError::validation("email", "is not a valid email address"))
    }
}
