//! Order aggregate and related types.

mod aggregate;
mod commands;
pub mod payment;
pub mod totals;
mod value_objects;

pub use aggregate::{ItemUpdate, NewOrder, NewOrderItem, Order, OrderItem, OrderPayment, OrderShipping};
pub use commands::{
    CreateOrder, MAX_QUANTITY, DeleteOrderItem, OrderLine, ShippingRequest, UpdateOrderItem, UpdateOrderPayment,
};
pub use payment::{PaymentStatus, PaymentTransitionError, PaymentUpdate, validate_transition};
pub use value_objects::{PaymentMethod, ShippingDetails, ShippingMethod, UnknownVariant};
