//! Derived order totals. Nothing here is persisted; totals are recomputed
//! from the items every time an order is shaped for a response.

use common::Money;

use super::{NewOrderItem, OrderItem};
use crate::error::ValidationErrors;

/// Message reported when an order's items total leaves the `Money` range.
pub const TOTAL_OUT_OF_RANGE: &str = "total amount is out of range";

/// Sum of `unit_price * quantity` over `(unit_price, quantity)` lines, or
/// `None` if any step overflows.
pub fn checked_total(lines: impl IntoIterator<Item = (Money, u32)>) -> Option<Money> {
    lines
        .into_iter()
        .try_fold(Money::zero(), |total, (unit_price, quantity)| {
            total.checked_add(unit_price.checked_multiply(quantity)?)
        })
}

/// Sum of `unit_price * quantity` over the items.
pub fn order_total(items: &[OrderItem]) -> Result<Money, ValidationErrors> {
    checked_total(items.iter().map(|item| (item.unit_price, item.quantity)))
        .ok_or_else(|| ValidationErrors::single("items", TOTAL_OUT_OF_RANGE))
}

/// Same sum over lines that are not stored yet.
pub fn new_order_total(items: &[NewOrderItem]) -> Option<Money> {
    checked_total(items.iter().map(|item| (item.unit_price, item.quantity)))
}

/// Returns true if `amount` settles an order whose items total `order_total`.
pub fn payment_matches(amount: Money, order_total: Money) -> bool {
    amount == order_total
}
