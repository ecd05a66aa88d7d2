use common::{OrderId, OrderItemId, ProductId};
use domain::UnknownVariant;
use thiserror::Error;

/// SQLSTATE codes treated as serialization conflicts: serialization_failure,
/// deadlock_detected, lock_not_available.
const CONFLICT_SQLSTATES: [&str; 3] = ["40001", "40P01", "55P03"];

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The referenced product does not exist in the catalog.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// Taking the requested quantity would drive stock negative.
    #[error(
        "Insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// The order does not exist.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The item does not exist within the given order.
    #[error("Order item {item_id} not found in order {order_id}")]
    OrderItemNotFound {
        order_id: OrderId,
        item_id: OrderItemId,
    },

    /// An order must be inserted with at least one item.
    #[error("Order must contain at least one item")]
    EmptyOrder,

    /// The transaction lost a lock or serialization race and may be retried.
    #[error("Storage conflict: {0}")]
    Conflict(String),

    /// A stored row holds a value the domain model cannot represent.
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    /// Returns true if retrying the whole transaction may succeed.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = e
            && let Some(code) = db_err.code()
            && CONFLICT_SQLSTATES.contains(&&*code)
        {
            return StoreError::Conflict(db_err.message().to_string());
        }
        StoreError::Database(e)
    }
}

impl From<UnknownVariant> for StoreError {
    fn from(e: UnknownVariant) -> Self {
        StoreError::Corrupt(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
