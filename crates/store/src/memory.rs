use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use common::{Money, OrderId, OrderItemId, PaymentId, ProductId, ShippingId, UserId};
use domain::{ItemUpdate, NewOrder, Order, OrderItem, OrderPayment, OrderShipping, PaymentUpdate};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    ItemChange, ProductSnapshot, Result, StoreError,
    store::{OrderAggregateStore, StockLedger, Store, StoreTransaction},
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    products: BTreeMap<ProductId, ProductSnapshot>,
    orders: BTreeMap<OrderId, Order>,
    last_product_id: i64,
    last_order_id: i64,
    last_item_id: i64,
    last_shipping_id: i64,
    last_payment_id: i64,
}

impl MemoryState {
    fn order_mut(&mut self, order_id: OrderId) -> Result<&mut Order> {
        self.orders
            .get_mut(&order_id)
            .ok_or(StoreError::OrderNotFound(order_id))
    }
}

/// In-memory store implementation for testing and local runs.
///
/// Transactions are serialized: `begin` takes an exclusive lock on the whole
/// state and works on a private copy that `commit` swaps in. One open
/// transaction blocks every other caller store-wide, so this store is only
/// fit for tests and the demo runtime, never for concurrent production load.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<MemoryState>>,
    injected_conflicts: Arc<AtomicU32>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a product to the catalog and returns its id.
    pub async fn insert_product(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        unit_price: Money,
        available: u32,
    ) -> ProductId {
        let mut state = self.state.lock().await;
        state.last_product_id += 1;
        let id = ProductId::new(state.last_product_id);
        state.products.insert(
            id,
            ProductSnapshot {
                id,
                name: name.into(),
                description: description.into(),
                unit_price,
                available,
            },
        );
        id
    }

    /// Deletes a product from the catalog. Existing order lines keep
    /// referring to its id.
    pub async fn remove_product(&self, product_id: ProductId) -> bool {
        self.state
            .lock()
            .await
            .products
            .remove(&product_id)
            .is_some()
    }

    /// Changes a product's catalog price.
    pub async fn set_price(&self, product_id: ProductId, unit_price: Money) {
        if let Some(product) = self.state.lock().await.products.get_mut(&product_id) {
            product.unit_price = unit_price;
        }
    }

    /// Returns the committed stock of a product.
    pub async fn stock_of(&self, product_id: ProductId) -> Option<u32> {
        self.state
            .lock()
            .await
            .products
            .get(&product_id)
            .map(|product| product.available)
    }

    /// Returns the number of committed orders.
    pub async fn order_count(&self) -> usize {
        self.state.lock().await.orders.len()
    }

    /// Makes the next `count` commits fail with a conflict, discarding
    /// their changes.
    pub fn inject_conflicts(&self, count: u32) {
        self.injected_conflicts.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl Store for InMemoryStore {
    type Transaction = InMemoryTransaction;

    /// Waits until no other transaction is open.
    async fn begin(&self) -> Result<InMemoryTransaction> {
        let guard = self.state.clone().lock_owned().await;
        let working = (*guard).clone();
        Ok(InMemoryTransaction {
            guard,
            working,
            injected_conflicts: self.injected_conflicts.clone(),
        })
    }
}

/// Transaction over [`InMemoryStore`].
pub struct InMemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    injected_conflicts: Arc<AtomicU32>,
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn commit(self) -> Result<()> {
        let injected = self
            .injected_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::Conflict("injected commit conflict".to_string()));
        }

        let mut guard = self.guard;
        *guard = self.working;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl StockLedger for InMemoryTransaction {
    async fn check_availability(&mut self, product_id: ProductId, quantity: u32) -> Result<bool> {
        Ok(self
            .working
            .products
            .get(&product_id)
            .is_some_and(|product| product.available >= quantity))
    }

    async fn decrement(&mut self, product_id: ProductId, quantity: u32) -> Result<u32> {
        let product = self
            .working
            .products
            .get_mut(&product_id)
            .ok_or(StoreError::ProductNotFound(product_id))?;

        if product.available < quantity {
            return Err(StoreError::InsufficientStock {
                product_id,
                requested: quantity,
                available: product.available,
            });
        }

        product.available -= quantity;
        Ok(product.available)
    }

    async fn increment(&mut self, product_id: ProductId, quantity: u32) -> Result<Option<u32>> {
        Ok(self.working.products.get_mut(&product_id).map(|product| {
            product.available = product.available.saturating_add(quantity);
            product.available
        }))
    }

    async fn product_snapshot(&mut self, product_id: ProductId) -> Result<Option<ProductSnapshot>> {
        Ok(self.working.products.get(&product_id).cloned())
    }
}

#[async_trait]
impl OrderAggregateStore for InMemoryTransaction {
    async fn insert_order(&mut self, order: NewOrder) -> Result<Order> {
        if order.items.is_empty() {
            return Err(StoreError::EmptyOrder);
        }

        let state = &mut self.working;
        let now = Utc::now();

        state.last_order_id += 1;
        let order_id = OrderId::new(state.last_order_id);

        let mut items = Vec::with_capacity(order.items.len());
        for item in order.items {
            state.last_item_id += 1;
            items.push(OrderItem {
                id: OrderItemId::new(state.last_item_id),
                order_id,
                product_id: item.product_id,
                unit_price: item.unit_price,
                quantity: item.quantity,
                note: item.note,
            });
        }

        state.last_shipping_id += 1;
        let shipping = OrderShipping {
            id: ShippingId::new(state.last_shipping_id),
            order_id,
            details: order.shipping,
        };

        let created = Order {
            id: order_id,
            user_id: order.user_id,
            items,
            shipping,
            payment: None,
            created_at: now,
            updated_at: now,
        };
        state.orders.insert(order_id, created.clone());
        Ok(created)
    }

    async fn load_order(&mut self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.working.orders.get(&order_id).cloned())
    }

    async fn load_order_for_update(&mut self, order_id: OrderId) -> Result<Option<Order>> {
        // The transaction already holds the whole store exclusively.
        self.load_order(order_id).await
    }

    async fn remove_item(&mut self, order_id: OrderId, item_id: OrderItemId) -> Result<OrderItem> {
        let order = self.working.order_mut(order_id)?;
        let position = order
            .items
            .iter()
            .position(|item| item.id == item_id)
            .ok_or(StoreError::OrderItemNotFound { order_id, item_id })?;

        let removed = order.items.remove(position);
        order.updated_at = Utc::now();
        Ok(removed)
    }

    async fn update_item(
        &mut self,
        order_id: OrderId,
        item_id: OrderItemId,
        update: ItemUpdate,
    ) -> Result<ItemChange> {
        let order = self.working.order_mut(order_id)?;
        let item = order
            .items
            .iter_mut()
            .find(|item| item.id == item_id)
            .ok_or(StoreError::OrderItemNotFound { order_id, item_id })?;

        let previous_quantity = item.quantity;
        item.quantity = update.quantity;
        item.unit_price = update.unit_price;
        let item = item.clone();
        order.updated_at = Utc::now();

        Ok(ItemChange {
            delta: i64::from(update.quantity) - i64::from(previous_quantity),
            item,
            previous_quantity,
        })
    }

    async fn upsert_payment(
        &mut self,
        order_id: OrderId,
        payment: PaymentUpdate,
    ) -> Result<OrderPayment> {
        if !self.working.orders.contains_key(&order_id) {
            return Err(StoreError::OrderNotFound(order_id));
        }

        let now = Utc::now();
        let existing_id = self.working.orders[&order_id]
            .payment
            .as_ref()
            .map(|existing| existing.id);
        let payment_id = match existing_id {
            Some(id) => id,
            None => {
                self.working.last_payment_id += 1;
                PaymentId::new(self.working.last_payment_id)
            }
        };

        let record = OrderPayment {
            id: payment_id,
            order_id,
            method: payment.method,
            status: payment.status,
            amount: payment.amount,
            transaction_ref: payment.transaction_ref,
            paid_at: payment.paid_at.unwrap_or(now),
        };

        let order = self.working.order_mut(order_id)?;
        order.payment = Some(record.clone());
        order.updated_at = now;
        Ok(record)
    }

    async fn count_orders_for_user(&mut self, user_id: UserId) -> Result<u64> {
        Ok(self
            .working
            .orders
            .values()
            .filter(|order| order.user_id == user_id)
            .count() as u64)
    }
}
