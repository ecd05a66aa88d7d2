//! Order lifecycle coordination.
//!
//! [`OrderCoordinator`] is the public face of the order core. It validates
//! commands, checks the caller's access, moves stock and mutates the order
//! aggregate inside one store transaction per operation, and returns an
//! [`OrderResponse`] projection.

pub mod caller;
pub mod coordinator;
pub mod error;
pub mod response;
pub mod retry;

pub use caller::{Caller, Role};
pub use coordinator::OrderCoordinator;
pub use error::{Result, ServiceError};
pub use response::{
    OrderItemResponse, OrderPaymentResponse, OrderResponse, OrderShippingResponse, ProductResponse,
};
pub use retry::RetryPolicy;
