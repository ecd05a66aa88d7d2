//! Shared identifier and money types.

pub mod money;
pub mod types;

pub use money::Money;
pub use types::{OrderId, OrderItemId, PaymentId, ProductId, ShippingId, UserId};
