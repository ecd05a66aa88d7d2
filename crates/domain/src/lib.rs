//! Domain layer for the order-processing system.
//!
//! This crate holds the rules that need no I/O:
//! - the Order aggregate data model (order, items, shipping, payment)
//! - request commands and their field validation
//! - totals recomputation
//! - the payment status state machine

pub mod error;
pub mod order;

pub use error::{DomainError, ValidationErrors};
pub use order::{
    CreateOrder, DeleteOrderItem, ItemUpdate, MAX_QUANTITY, NewOrder, NewOrderItem, Order,
    OrderItem, OrderLine, OrderPayment, OrderShipping, PaymentMethod, PaymentStatus,
    PaymentTransitionError, PaymentUpdate, ShippingDetails, ShippingMethod, ShippingRequest,
    UnknownVariant, UpdateOrderItem, UpdateOrderPayment, validate_transition,
};
