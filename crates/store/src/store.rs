use async_trait::async_trait;
use common::{Money, OrderId, OrderItemId, ProductId, UserId};
use domain::{ItemUpdate, NewOrder, Order, OrderItem, OrderPayment, PaymentUpdate};

use crate::Result;

/// Catalog view of a product as seen inside a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductSnapshot {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    /// Current catalog price; order lines keep their own snapshot price.
    pub unit_price: Money,
    /// Units currently available for sale.
    pub available: u32,
}

/// Outcome of rewriting an order line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemChange {
    /// The item after the update.
    pub item: OrderItem,
    pub previous_quantity: u32,
    /// `new - old` quantity; positive values must be taken from stock,
    /// negative values returned to it.
    pub delta: i64,
}

/// Per-product stock reads and atomic adjustments.
///
/// Implemented on a transaction handle so stock moves commit or roll back
/// together with the order mutation that caused them.
#[async_trait]
pub trait StockLedger: Send {
    /// Returns true if at least `quantity` units are available.
    ///
    /// Unknown products report `false`.
    async fn check_availability(&mut self, product_id: ProductId, quantity: u32) -> Result<bool>;

    /// Takes `quantity` units, returning the remaining stock.
    ///
    /// Fails with `ProductNotFound` or `InsufficientStock`; stock never goes
    /// negative, also under concurrent decrements of the same product.
    async fn decrement(&mut self, product_id: ProductId, quantity: u32) -> Result<u32>;

    /// Returns `quantity` units to stock.
    ///
    /// Returns `None` without failing when the product no longer exists.
    async fn increment(&mut self, product_id: ProductId, quantity: u32) -> Result<Option<u32>>;

    /// Reads the catalog entry of a product.
    async fn product_snapshot(&mut self, product_id: ProductId) -> Result<Option<ProductSnapshot>>;
}

/// Persistence of the Order / OrderItem / OrderShipping / OrderPayment graph.
#[async_trait]
pub trait OrderAggregateStore: Send {
    /// Inserts the order, its items and its shipping record as one unit.
    ///
    /// Fails with `EmptyOrder` if there are no items.
    async fn insert_order(&mut self, order: NewOrder) -> Result<Order>;

    /// Loads an order without locking it.
    async fn load_order(&mut self, order_id: OrderId) -> Result<Option<Order>>;

    /// Loads an order and holds it against concurrent mutation until the
    /// transaction ends.
    async fn load_order_for_update(&mut self, order_id: OrderId) -> Result<Option<Order>>;

    /// Deletes an item scoped to its order and returns it.
    async fn remove_item(&mut self, order_id: OrderId, item_id: OrderItemId) -> Result<OrderItem>;

    /// Rewrites an item's quantity and price, reporting the quantity delta.
    async fn update_item(
        &mut self,
        order_id: OrderId,
        item_id: OrderItemId,
        update: ItemUpdate,
    ) -> Result<ItemChange>;

    /// Creates the order's payment record, or updates it in place.
    async fn upsert_payment(
        &mut self,
        order_id: OrderId,
        payment: PaymentUpdate,
    ) -> Result<OrderPayment>;

    /// Counts the orders placed by a user.
    async fn count_orders_for_user(&mut self, user_id: UserId) -> Result<u64>;
}

/// A unit of work spanning stock and order mutations.
///
/// Dropping a transaction without calling [`commit`](Self::commit) rolls it back.
#[async_trait]
pub trait StoreTransaction: StockLedger + OrderAggregateStore + Send {
    /// Makes every change of this transaction visible atomically.
    async fn commit(self) -> Result<()>;

    /// Discards every change of this transaction.
    async fn rollback(self) -> Result<()>;
}

/// Entry point to the persistent state. All implementations must be
/// thread-safe (Send + Sync).
#[async_trait]
pub trait Store: Send + Sync {
    type Transaction: StoreTransaction + 'static;

    /// Opens a new transaction.
    async fn begin(&self) -> Result<Self::Transaction>;
}
