//! Order service error types.

use common::{OrderId, ProductId};
use domain::{DomainError, PaymentTransitionError, ValidationErrors};
use store::StoreError;
use thiserror::Error;

/// Errors returned by [`OrderCoordinator`](crate::OrderCoordinator) operations.
///
/// Every error aborts the operation's transaction; nothing partial is
/// committed.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Malformed or missing request fields.
    #[error("{0}")]
    Validation(ValidationErrors),

    /// A referenced product does not exist.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// The order or order item does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Requested quantity exceeds available stock.
    #[error(
        "Insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// Illegal payment transition or amount mismatch.
    #[error("{0}")]
    BadRequest(String),

    /// The caller neither owns the order nor is an admin.
    #[error("Access to order {0} is forbidden")]
    Forbidden(OrderId),

    /// Storage conflicts persisted through every retry.
    #[error("Operation conflicted with concurrent updates after {attempts} attempts")]
    Conflict { attempts: u32 },

    /// Unexpected failure; the detail is not meant for callers.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Storage conflict eligible for retry. Never escapes the coordinator.
    #[error("Transient storage conflict: {0}")]
    Transient(String),
}

impl ServiceError {
    /// Stable machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "VALIDATION_ERROR",
            ServiceError::ProductNotFound(_) => "PRODUCT_NOT_FOUND",
            ServiceError::NotFound(_) => "NOT_FOUND",
            ServiceError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            ServiceError::BadRequest(_) => "BAD_REQUEST",
            ServiceError::Forbidden(_) => "FORBIDDEN",
            ServiceError::Conflict { .. } => "CONFLICT",
            ServiceError::Internal(_) | ServiceError::Transient(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns true if the whole operation may be retried in a fresh
    /// transaction.
    pub fn is_transient(&self) -> bool {
        matches!(self, ServiceError::Transient(_))
    }
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::ProductNotFound(id) => ServiceError::ProductNotFound(id),
            StoreError::InsufficientStock {
                product_id,
                requested,
                available,
            } => ServiceError::InsufficientStock {
                product_id,
                requested,
                available,
            },
            StoreError::OrderNotFound(_) | StoreError::OrderItemNotFound { .. } => {
                ServiceError::NotFound(e.to_string())
            }
            StoreError::EmptyOrder => {
                ServiceError::Validation(ValidationErrors::single("items", e.to_string()))
            }
            StoreError::Conflict(message) => ServiceError::Transient(message),
            other => ServiceError::Internal(other.to_string()),
        }
    }
}

impl From<DomainError> for ServiceError {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::Validation(errors) => ServiceError::Validation(errors),
            DomainError::Payment(err) => ServiceError::BadRequest(err.to_string()),
        }
    }
}

impl From<ValidationErrors> for ServiceError {
    fn from(e: ValidationErrors) -> Self {
        DomainError::from(e).into()
    }
}

impl From<PaymentTransitionError> for ServiceError {
    fn from(e: PaymentTransitionError) -> Self {
        DomainError::from(e).into()
    }
}

/// Convenience type alias for service results.
pub type Result<T> = std::result::Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use common::{Money, OrderItemId};
    use domain::PaymentStatus;

    use super::*;

    #[test]
    fn test_store_errors_map_to_kinds() {
        let cases = [
            (StoreError::ProductNotFound(ProductId::new(1)), "PRODUCT_NOT_FOUND"),
            (StoreError::OrderNotFound(OrderId::new(1)), "NOT_FOUND"),
            (
                StoreError::OrderItemNotFound {
                    order_id: OrderId::new(1),
                    item_id: OrderItemId::new(2),
                },
                "NOT_FOUND",
            ),
            (
                StoreError::InsufficientStock {
                    product_id: ProductId::new(1),
                    requested: 3,
                    available: 2,
                },
                "INSUFFICIENT_STOCK",
            ),
            (StoreError::EmptyOrder, "VALIDATION_ERROR"),
            (StoreError::Corrupt("bad".to_string()), "INTERNAL_ERROR"),
        ];

        for (store_error, kind) in cases {
            assert_eq!(ServiceError::from(store_error).kind(), kind);
        }
    }

    #[test]
    fn test_only_conflicts_are_transient() {
        assert!(ServiceError::from(StoreError::Conflict("deadlock".to_string())).is_transient());
        assert!(!ServiceError::from(StoreError::EmptyOrder).is_transient());
        assert!(!ServiceError::Conflict { attempts: 3 }.is_transient());
    }

    #[test]
    fn test_payment_errors_are_bad_requests() {
        let err: ServiceError = PaymentTransitionError::AmountMismatch {
            amount: Money::from_cents(1),
            order_total: Money::from_cents(2),
        }
        .into();
        assert_eq!(err.kind(), "BAD_REQUEST");

        let err: ServiceError = PaymentTransitionError::IllegalTransition {
            from: PaymentStatus::Paid,
            to: PaymentStatus::Pending,
        }
        .into();
        assert!(err.to_string().contains("PAID"));
    }
}
