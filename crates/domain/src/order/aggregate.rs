//! Order aggregate: the order plus its items, shipping and payment.
//!
//! Children carry their owning order's id as a plain value; nothing holds a
//! reference back to its parent.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::{Money, OrderId, OrderItemId, PaymentId, ProductId, ShippingId, UserId};
use serde::{Deserialize, Serialize};

use super::{PaymentMethod, PaymentStatus, ShippingDetails, totals};
use crate::error::ValidationErrors;

/// Order aggregate root as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    /// Items in insertion order.
    pub items: Vec<OrderItem>,
    pub shipping: OrderShipping,
    /// Absent until the first payment update.
    pub payment: Option<OrderPayment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Returns the recomputed items total.
    pub fn total_amount(&self) -> Result<Money, ValidationErrors> {
        totals::order_total(&self.items)
    }

    /// Returns true if `user_id` placed this order.
    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.user_id == user_id
    }
}

/// A line of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    /// Price per unit captured when the line was written.
    pub unit_price: Money,
    pub quantity: u32,
    pub note: Option<String>,
}

/// Shipping record of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderShipping {
    pub id: ShippingId,
    pub order_id: OrderId,
    pub details: ShippingDetails,
}

/// Payment record of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPayment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub amount: Money,
    pub transaction_ref: Option<String>,
    pub paid_at: DateTime<Utc>,
}

/// A validated order ready to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub user_id: UserId,
    pub items: Vec<NewOrderItem>,
    pub shipping: ShippingDetails,
}

impl NewOrder {
    /// Requested quantity per product, in ascending product id order.
    ///
    /// Stock is taken in this order so concurrent orders lock products
    /// in the same sequence. A total beyond `u32::MAX` saturates, which no
    /// stock level can satisfy.
    pub fn quantities_by_product(&self) -> Vec<(ProductId, u32)> {
        let mut totals = BTreeMap::new();
        for item in &self.items {
            *totals.entry(item.product_id).or_insert(0u64) += u64::from(item.quantity);
        }
        totals
            .into_iter()
            .map(|(product_id, total)| (product_id, u32::try_from(total).unwrap_or(u32::MAX)))
            .collect()
    }
}

/// A validated line of a new order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderItem {
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
    pub note: Option<String>,
}

/// Validated replacement quantity and price for an existing item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemUpdate {
    pub quantity: u32,
    pub unit_price: Money,
}
