//! Order coordinator: runs each order operation as one store transaction.

use std::collections::HashMap;
use std::future::Future;
use std::time::Instant;

use common::OrderId;
use domain::{
    CreateOrder, DeleteOrderItem, ItemUpdate, NewOrder, Order, PaymentUpdate, UpdateOrderItem,
    UpdateOrderPayment, order::totals, validate_transition,
};
use store::{OrderAggregateStore, StockLedger, Store, StoreError, StoreTransaction};

use crate::caller::Caller;
use crate::error::{Result, ServiceError};
use crate::response::OrderResponse;
use crate::retry::RetryPolicy;

/// Stock units moved by a committed operation.
#[derive(Debug, Default, Clone, Copy)]
struct StockMove {
    taken: u64,
    restored: u64,
}

/// Public entry point for order operations.
///
/// Every operation opens its own transaction, so stock and the order
/// aggregate change together or not at all. Storage conflicts are retried
/// according to the [`RetryPolicy`]; business failures never are.
pub struct OrderCoordinator<S: Store> {
    store: S,
    retry: RetryPolicy,
}

impl<S: Store> OrderCoordinator<S> {
    /// Creates a coordinator with the default retry policy.
    pub fn new(store: S) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Places a new order owned by the caller, taking its quantities from
    /// stock.
    #[tracing::instrument(skip(self, command), fields(user_id = %caller.user_id))]
    pub async fn create_order(&self, caller: &Caller, command: CreateOrder) -> Result<OrderResponse> {
        observe("create_order", async move {
            let order = command.validate(caller.user_id)?;
            self.retry
                .run("create_order", || self.create_order_once(&order))
                .await
        })
        .await
    }

    /// Returns the current projection of an order.
    #[tracing::instrument(skip(self), fields(user_id = %caller.user_id))]
    pub async fn get_order_by_id(&self, caller: &Caller, order_id: OrderId) -> Result<OrderResponse> {
        observe("get_order_by_id", async move {
            self.retry
                .run("get_order_by_id", || self.get_order_once(caller, order_id))
                .await
        })
        .await
    }

    /// Removes a line from an order and returns its quantity to stock.
    #[tracing::instrument(
        skip(self, command),
        fields(user_id = %caller.user_id, order_id = %command.order_id, item_id = %command.order_item_id)
    )]
    pub async fn delete_order_item(
        &self,
        caller: &Caller,
        command: DeleteOrderItem,
    ) -> Result<OrderResponse> {
        observe("delete_order_item", async move {
            self.retry
                .run("delete_order_item", || self.delete_item_once(caller, command))
                .await
        })
        .await
    }

    /// Rewrites a line's quantity and price, moving the quantity difference
    /// into or out of stock.
    #[tracing::instrument(
        skip(self, command),
        fields(user_id = %caller.user_id, order_id = %command.order_id, item_id = %command.order_item_id)
    )]
    pub async fn update_order_item(
        &self,
        caller: &Caller,
        command: UpdateOrderItem,
    ) -> Result<OrderResponse> {
        observe("update_order_item", async move {
            let update = command.validate()?;
            self.retry
                .run("update_order_item", || {
                    self.update_item_once(caller, &command, update)
                })
                .await
        })
        .await
    }

    /// Attaches or updates the payment of an order.
    #[tracing::instrument(
        skip(self, command),
        fields(user_id = %caller.user_id, order_id = %command.order_id, status = %command.status)
    )]
    pub async fn update_order_payment(
        &self,
        caller: &Caller,
        command: UpdateOrderPayment,
    ) -> Result<OrderResponse> {
        observe("update_order_payment", async move {
            let update = command.validate()?;
            self.retry
                .run("update_order_payment", || {
                    self.update_payment_once(caller, command.order_id, &update)
                })
                .await
        })
        .await
    }

    async fn create_order_once(&self, order: &NewOrder) -> Result<OrderResponse> {
        let mut tx = self.store.begin().await?;
        let outcome = Self::place_order(&mut tx, order.clone()).await;
        let response = finish(tx, outcome).await?;
        metrics::counter!("orders_created_total").increment(1);
        tracing::info!(order_id = %response.id, items = response.order_items.len(), "Order created");
        Ok(response)
    }

    async fn get_order_once(&self, caller: &Caller, order_id: OrderId) -> Result<OrderResponse> {
        let mut tx = self.store.begin().await?;
        let outcome = Self::read_order(&mut tx, caller, order_id).await;
        finish(tx, outcome.map(|response| (response, StockMove::default()))).await
    }

    async fn delete_item_once(
        &self,
        caller: &Caller,
        command: DeleteOrderItem,
    ) -> Result<OrderResponse> {
        let mut tx = self.store.begin().await?;
        let outcome = Self::remove_line(&mut tx, caller, command).await;
        finish(tx, outcome).await
    }

    async fn update_item_once(
        &self,
        caller: &Caller,
        command: &UpdateOrderItem,
        update: ItemUpdate,
    ) -> Result<OrderResponse> {
        let mut tx = self.store.begin().await?;
        let outcome = Self::rewrite_line(&mut tx, caller, command, update).await;
        finish(tx, outcome).await
    }

    async fn update_payment_once(
        &self,
        caller: &Caller,
        order_id: OrderId,
        update: &PaymentUpdate,
    ) -> Result<OrderResponse> {
        let mut tx = self.store.begin().await?;
        let outcome = Self::apply_payment(&mut tx, caller, order_id, update.clone()).await;
        finish(tx, outcome.map(|response| (response, StockMove::default()))).await
    }

    async fn place_order(
        tx: &mut S::Transaction,
        order: NewOrder,
    ) -> Result<(OrderResponse, StockMove)> {
        // Ascending product order keeps concurrent multi-product orders from
        // deadlocking on product rows.
        let quantities = order.quantities_by_product();

        let mut snapshots = Vec::with_capacity(quantities.len());
        for &(product_id, _) in &quantities {
            let product = tx
                .product_snapshot(product_id)
                .await?
                .ok_or(ServiceError::ProductNotFound(product_id))?;
            snapshots.push(product);
        }

        for (&(product_id, quantity), product) in quantities.iter().zip(&snapshots) {
            if !tx.check_availability(product_id, quantity).await? {
                return Err(ServiceError::InsufficientStock {
                    product_id,
                    requested: quantity,
                    available: product.available,
                });
            }
        }

        let mut taken = 0u64;
        for &(product_id, quantity) in &quantities {
            let remaining = tx.decrement(product_id, quantity).await?;
            tracing::debug!(%product_id, quantity, remaining, "Stock decremented");
            taken += u64::from(quantity);
        }

        let order = tx.insert_order(order).await?;
        let response = Self::project(tx, &order).await?;
        Ok((
            response,
            StockMove {
                taken,
                restored: 0,
            },
        ))
    }

    async fn read_order(
        tx: &mut S::Transaction,
        caller: &Caller,
        order_id: OrderId,
    ) -> Result<OrderResponse> {
        let order = tx
            .load_order(order_id)
            .await?
            .ok_or_else(|| order_not_found(order_id))?;
        authorize(caller, &order)?;
        Self::project(tx, &order).await
    }

    async fn remove_line(
        tx: &mut S::Transaction,
        caller: &Caller,
        command: DeleteOrderItem,
    ) -> Result<(OrderResponse, StockMove)> {
        let order = Self::lock_order(tx, caller, command.order_id).await?;

        let removed = tx.remove_item(order.id, command.order_item_id).await?;
        let restored = match tx.increment(removed.product_id, removed.quantity).await? {
            Some(remaining) => {
                tracing::debug!(product_id = %removed.product_id, quantity = removed.quantity, remaining, "Stock restored");
                u64::from(removed.quantity)
            }
            None => {
                tracing::debug!(product_id = %removed.product_id, "Product no longer exists, stock not restored");
                0
            }
        };

        let response = Self::reload(tx, order.id).await?;
        Ok((response, StockMove { taken: 0, restored }))
    }

    async fn rewrite_line(
        tx: &mut S::Transaction,
        caller: &Caller,
        command: &UpdateOrderItem,
        update: ItemUpdate,
    ) -> Result<(OrderResponse, StockMove)> {
        let order = Self::lock_order(tx, caller, command.order_id).await?;

        let change = tx
            .update_item(order.id, command.order_item_id, update)
            .await?;
        let product_id = change.item.product_id;
        let units = stock_units(change.delta)?;

        let mut movement = StockMove::default();
        if change.delta > 0 {
            let remaining = tx.decrement(product_id, units).await?;
            tracing::debug!(%product_id, quantity = units, remaining, "Stock decremented");
            movement.taken = u64::from(units);
        } else if change.delta < 0
            && let Some(remaining) = tx.increment(product_id, units).await?
        {
            tracing::debug!(%product_id, quantity = units, remaining, "Stock restored");
            movement.restored = u64::from(units);
        }

        let response = Self::reload(tx, order.id).await?;
        Ok((response, movement))
    }

    async fn apply_payment(
        tx: &mut S::Transaction,
        caller: &Caller,
        order_id: OrderId,
        mut update: PaymentUpdate,
    ) -> Result<OrderResponse> {
        let order = Self::lock_order(tx, caller, order_id).await?;
        let order_total = totals::order_total(&order.items)?;

        validate_transition(order.payment.as_ref(), &update, order_total)?;

        // Re-sending the current status keeps the recorded timestamp.
        if update.paid_at.is_none()
            && let Some(current) = &order.payment
            && current.status == update.status
        {
            update.paid_at = Some(current.paid_at);
        }

        let previous = order.payment.as_ref().map(|payment| payment.status);
        let payment = tx.upsert_payment(order.id, update).await?;
        tracing::info!(
            order_id = %order.id,
            from = ?previous,
            to = %payment.status,
            "Payment updated"
        );

        Self::reload(tx, order.id).await
    }

    async fn lock_order(
        tx: &mut S::Transaction,
        caller: &Caller,
        order_id: OrderId,
    ) -> Result<Order> {
        let order = tx
            .load_order_for_update(order_id)
            .await?
            .ok_or_else(|| order_not_found(order_id))?;
        authorize(caller, &order)?;
        Ok(order)
    }

    async fn reload(tx: &mut S::Transaction, order_id: OrderId) -> Result<OrderResponse> {
        let order = tx
            .load_order(order_id)
            .await?
            .ok_or_else(|| order_not_found(order_id))?;
        Self::project(tx, &order).await
    }

    async fn project(tx: &mut S::Transaction, order: &Order) -> Result<OrderResponse> {
        let mut products = HashMap::new();
        for item in &order.items {
            if products.contains_key(&item.product_id) {
                continue;
            }
            if let Some(product) = tx.product_snapshot(item.product_id).await? {
                products.insert(item.product_id, product);
            }
        }

        let number_of_orders = tx.count_orders_for_user(order.user_id).await?;
        Ok(OrderResponse::assemble(order, &products, number_of_orders)?)
    }
}

/// Commits on success and rolls back on failure, then records stock
/// metrics for what was actually committed.
async fn finish<T: StoreTransaction>(
    tx: T,
    outcome: Result<(OrderResponse, StockMove)>,
) -> Result<OrderResponse> {
    match outcome {
        Ok((response, movement)) => {
            tx.commit().await?;
            if movement.taken > 0 {
                metrics::counter!("stock_units_decremented_total").increment(movement.taken);
            }
            if movement.restored > 0 {
                metrics::counter!("stock_units_restored_total").increment(movement.restored);
            }
            Ok(response)
        }
        Err(error) => {
            if let Err(rollback_error) = tx.rollback().await {
                tracing::warn!(error = %rollback_error, "Rollback failed");
            }
            Err(error)
        }
    }
}

async fn observe<T>(
    operation: &'static str,
    future: impl Future<Output = Result<T>>,
) -> Result<T> {
    let start = Instant::now();
    let result = future.await;

    let outcome = match &result {
        Ok(_) => "success",
        Err(error) => {
            match error {
                ServiceError::Internal(detail) => {
                    tracing::error!(operation, error = %detail, "Order operation failed");
                }
                other => tracing::debug!(operation, error = %other, "Order operation rejected"),
            }
            error.kind()
        }
    };

    metrics::counter!("order_operations_total", "operation" => operation, "outcome" => outcome)
        .increment(1);
    metrics::histogram!("order_operation_duration_seconds", "operation" => operation)
        .record(start.elapsed().as_secs_f64());

    result
}

fn authorize(caller: &Caller, order: &Order) -> Result<()> {
    if caller.can_access(order) {
        Ok(())
    } else {
        tracing::warn!(order_id = %order.id, caller = %caller.user_id, "Order access denied");
        Err(ServiceError::Forbidden(order.id))
    }
}

fn order_not_found(order_id: OrderId) -> ServiceError {
    StoreError::OrderNotFound(order_id).into()
}

fn stock_units(delta: i64) -> Result<u32> {
    u32::try_from(delta.unsigned_abs())
        .map_err(|_| ServiceError::Internal(format!("quantity delta {delta} out of range")))
}

#[cfg(test)]
mod tests {
    use common::{Money, OrderItemId, ProductId};
    use domain::{OrderLine, PaymentMethod, PaymentStatus, ShippingRequest};
    use store::InMemoryStore;

    use super::*;

    fn shipping() -> ShippingRequest {
        ShippingRequest {
            recipient_name: "John Doe".to_string(),
            recipient_phone: "0123456789".to_string(),
            address_line1: "123 Main St".to_string(),
            city: "Hanoi".to_string(),
            postal_code: "12345".to_string(),
            country: "Vietnam".to_string(),
            shipping_fee: Money::from_dollars(10),
            ..Default::default()
        }
    }

    async fn setup() -> (OrderCoordinator<InMemoryStore>, ProductId) {
        let store = InMemoryStore::new();
        let product = store
            .insert_product("Laptop", "High-performance laptop", Money::from_cents(99_999), 10)
            .await;
        (OrderCoordinator::new(store), product)
    }

    #[tokio::test]
    async fn test_create_order_owned_by_caller() {
        let (coordinator, laptop) = setup().await;
        let caller = Caller::user(42);

        let response = coordinator
            .create_order(
                &caller,
                CreateOrder::new(vec![OrderLine::new(laptop, 2, Money::from_dollars(50))], shipping()),
            )
            .await
            .unwrap();

        assert_eq!(response.user_id, caller.user_id);
        assert_eq!(response.number_of_orders, 1);
        assert_eq!(response.order_items[0].product.as_ref().unwrap().quantity, 8);
    }

    #[tokio::test]
    async fn test_unknown_product_reported_before_stock() {
        let (coordinator, laptop) = setup().await;
        let missing = ProductId::new(999);

        let err = coordinator
            .create_order(
                &Caller::user(1),
                CreateOrder::new(
                    vec![
                        OrderLine::new(laptop, 50, Money::zero()),
                        OrderLine::new(missing, 1, Money::zero()),
                    ],
                    shipping(),
                ),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::ProductNotFound(id) if id == missing));
        assert_eq!(coordinator.store().stock_of(laptop).await, Some(10));
    }

    #[tokio::test]
    async fn test_duplicate_lines_checked_against_combined_quantity() {
        let (coordinator, laptop) = setup().await;

        let err = coordinator
            .create_order(
                &Caller::user(1),
                CreateOrder::new(
                    vec![
                        OrderLine::new(laptop, 6, Money::zero()),
                        OrderLine::new(laptop, 5, Money::zero()),
                    ],
                    shipping(),
                ),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ServiceError::InsufficientStock {
                requested: 11,
                available: 10,
                ..
            }
        ));
        assert_eq!(coordinator.store().stock_of(laptop).await, Some(10));
    }

    #[tokio::test]
    async fn test_not_found_takes_precedence_over_forbidden() {
        let (coordinator, _) = setup().await;

        let err = coordinator
            .get_order_by_id(&Caller::user(1), OrderId::new(12345))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "NOT_FOUND");

        let err = coordinator
            .delete_order_item(
                &Caller::user(1),
                DeleteOrderItem::new(OrderId::new(12345), OrderItemId::new(1)),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_other_users_are_forbidden_but_admins_allowed() {
        let (coordinator, laptop) = setup().await;
        let owner = Caller::user(1);
        let order = coordinator
            .create_order(
                &owner,
                CreateOrder::new(vec![OrderLine::new(laptop, 1, Money::zero())], shipping()),
            )
            .await
            .unwrap();

        let err = coordinator
            .update_order_item(
                &Caller::user(2),
                UpdateOrderItem::new(order.id, order.order_items[0].id, 5, Money::zero()),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(id) if id == order.id));
        assert_eq!(coordinator.store().stock_of(laptop).await, Some(9));

        let seen = coordinator
            .get_order_by_id(&Caller::admin(99), order.id)
            .await
            .unwrap();
        assert_eq!(seen.id, order.id);
    }

    #[tokio::test]
    async fn test_repeated_paid_keeps_timestamp() {
        let (coordinator, laptop) = setup().await;
        let caller = Caller::user(1);
        let order = coordinator
            .create_order(
                &caller,
                CreateOrder::new(vec![OrderLine::new(laptop, 2, Money::from_dollars(50))], shipping()),
            )
            .await
            .unwrap();

        let paid = UpdateOrderPayment::new(
            order.id,
            PaymentMethod::CreditCard,
            PaymentStatus::Paid,
            Money::from_dollars(100),
        )
        .with_transaction_ref("TX123");

        let first = coordinator
            .update_order_payment(&caller, paid.clone())
            .await
            .unwrap();
        let second = coordinator
            .update_order_payment(&caller, paid)
            .await
            .unwrap();

        assert_eq!(first.order_payment, second.order_payment);
    }

    #[tokio::test]
    async fn test_invalid_update_rejected_before_touching_store() {
        let (coordinator, laptop) = setup().await;
        let caller = Caller::user(1);
        let order = coordinator
            .create_order(
                &caller,
                CreateOrder::new(vec![OrderLine::new(laptop, 1, Money::zero())], shipping()),
            )
            .await
            .unwrap();

        let err = coordinator
            .update_order_item(
                &caller,
                UpdateOrderItem::new(order.id, order.order_items[0].id, 0, Money::zero()),
            )
            .await
            .unwrap_err();

        match err {
            ServiceError::Validation(errors) => {
                assert_eq!(errors.fields()["quantity"], "must be at least 1");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }
}
