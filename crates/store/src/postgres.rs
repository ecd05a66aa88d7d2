use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Money, OrderId, OrderItemId, PaymentId, ProductId, ShippingId, UserId};
use domain::{
    ItemUpdate, NewOrder, Order, OrderItem, OrderPayment, OrderShipping, PaymentUpdate,
    ShippingDetails,
};
use sqlx::{PgPool, Postgres, Row, postgres::PgRow};

use crate::{
    ItemChange, ProductSnapshot, Result, StoreError,
    store::{OrderAggregateStore, StockLedger, Store, StoreTransaction},
};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

/// PostgreSQL-backed store implementation.
///
/// Stock decrements are single conditional `UPDATE`s, and order mutations
/// lock the order row, so concurrent transactions either serialize or fail
/// with [`StoreError::Conflict`] once the lock timeout expires.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Sets how long a transaction waits for a row lock before giving up.
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Creates or replaces a catalog entry.
    pub async fn upsert_product(
        &self,
        id: ProductId,
        name: &str,
        description: &str,
        unit_price: Money,
        available: u32,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, description, price_cents, quantity)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name,
                description = EXCLUDED.description,
                price_cents = EXCLUDED.price_cents,
                quantity = EXCLUDED.quantity,
                updated_at = NOW()
            "#,
        )
        .bind(id.value())
        .bind(name)
        .bind(description)
        .bind(unit_price.cents())
        .bind(to_db_quantity(available)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Deletes a catalog entry. Order lines referring to it are kept.
    pub async fn delete_product(&self, id: ProductId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id.value())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Returns the committed stock of a product.
    pub async fn stock_of(&self, id: ProductId) -> Result<Option<u32>> {
        let quantity: Option<i32> = sqlx::query_scalar("SELECT quantity FROM products WHERE id = $1")
            .bind(id.value())
            .fetch_optional(&self.pool)
            .await?;
        quantity.map(|q| from_db_quantity(q, "products.quantity")).transpose()
    }
}

#[async_trait]
impl Store for PostgresStore {
    type Transaction = PostgresTransaction;

    async fn begin(&self) -> Result<PostgresTransaction> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", self.lock_timeout.as_millis()))
            .execute(&mut *tx)
            .await?;
        Ok(PostgresTransaction { tx })
    }
}

/// Transaction over [`PostgresStore`]. Dropping it rolls back.
pub struct PostgresTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

impl PostgresTransaction {
    async fn fetch_order(&mut self, order_id: OrderId, for_update: bool) -> Result<Option<Order>> {
        let sql = if for_update {
            "SELECT id, user_id, created_at, updated_at FROM orders WHERE id = $1 FOR UPDATE"
        } else {
            "SELECT id, user_id, created_at, updated_at FROM orders WHERE id = $1"
        };
        let Some(row) = sqlx::query(sql)
            .bind(order_id.value())
            .fetch_optional(&mut *self.tx)
            .await?
        else {
            return Ok(None);
        };

        let items = sqlx::query(
            r#"
            SELECT id, order_id, product_id, price_cents, quantity, note
            FROM order_items
            WHERE order_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(order_id.value())
        .fetch_all(&mut *self.tx)
        .await?
        .into_iter()
        .map(row_to_item)
        .collect::<Result<Vec<_>>>()?;

        let shipping_row = sqlx::query(
            r#"
            SELECT id, order_id, recipient_name, recipient_phone, address_line1, address_line2,
                   city, postal_code, country, shipping_method, shipping_fee_cents
            FROM order_shipping
            WHERE order_id = $1
            "#,
        )
        .bind(order_id.value())
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| StoreError::Corrupt(format!("order {order_id} has no shipping record")))?;

        let payment = sqlx::query(
            r#"
            SELECT id, order_id, payment_method, payment_status, amount_cents, transaction_ref, paid_at
            FROM order_payments
            WHERE order_id = $1
            "#,
        )
        .bind(order_id.value())
        .fetch_optional(&mut *self.tx)
        .await?
        .map(row_to_payment)
        .transpose()?;

        Ok(Some(Order {
            id: OrderId::new(row.try_get("id")?),
            user_id: UserId::new(row.try_get("user_id")?),
            items,
            shipping: row_to_shipping(shipping_row)?,
            payment,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        }))
    }

    async fn order_exists(&mut self, order_id: OrderId) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT id FROM orders WHERE id = $1")
            .bind(order_id.value())
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(found.is_some())
    }

    async fn touch_order(&mut self, order_id: OrderId) -> Result<()> {
        sqlx::query("UPDATE orders SET updated_at = NOW() WHERE id = $1")
            .bind(order_id.value())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn item_not_found(&mut self, order_id: OrderId, item_id: OrderItemId) -> StoreError {
        match self.order_exists(order_id).await {
            Ok(true) => StoreError::OrderItemNotFound { order_id, item_id },
            Ok(false) => StoreError::OrderNotFound(order_id),
            Err(e) => e,
        }
    }
}

#[async_trait]
impl StoreTransaction for PostgresTransaction {
    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl StockLedger for PostgresTransaction {
    async fn check_availability(&mut self, product_id: ProductId, quantity: u32) -> Result<bool> {
        Ok(self
            .product_snapshot(product_id)
            .await?
            .is_some_and(|product| product.available >= quantity))
    }

    async fn decrement(&mut self, product_id: ProductId, quantity: u32) -> Result<u32> {
        let remaining: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE products
            SET quantity = quantity - $2, updated_at = NOW()
            WHERE id = $1 AND quantity >= $2
            RETURNING quantity
            "#,
        )
        .bind(product_id.value())
        .bind(i64::from(quantity))
        .fetch_optional(&mut *self.tx)
        .await?;

        if let Some(remaining) = remaining {
            return from_db_quantity(remaining, "products.quantity");
        }

        match self.product_snapshot(product_id).await? {
            Some(product) => Err(StoreError::InsufficientStock {
                product_id,
                requested: quantity,
                available: product.available,
            }),
            None => Err(StoreError::ProductNotFound(product_id)),
        }
    }

    async fn increment(&mut self, product_id: ProductId, quantity: u32) -> Result<Option<u32>> {
        let restored: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE products
            SET quantity = quantity + $2, updated_at = NOW()
            WHERE id = $1
            RETURNING quantity
            "#,
        )
        .bind(product_id.value())
        .bind(i64::from(quantity))
        .fetch_optional(&mut *self.tx)
        .await?;

        restored
            .map(|q| from_db_quantity(q, "products.quantity"))
            .transpose()
    }

    async fn product_snapshot(&mut self, product_id: ProductId) -> Result<Option<ProductSnapshot>> {
        let row = sqlx::query(
            "SELECT id, name, description, price_cents, quantity FROM products WHERE id = $1",
        )
        .bind(product_id.value())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(|row| -> Result<ProductSnapshot> {
            Ok(ProductSnapshot {
                id: ProductId::new(row.try_get("id")?),
                name: row.try_get("name")?,
                description: row.try_get("description")?,
                unit_price: Money::from_cents(row.try_get("price_cents")?),
                available: from_db_quantity(row.try_get("quantity")?, "products.quantity")?,
            })
        })
        .transpose()
    }
}

#[async_trait]
impl OrderAggregateStore for PostgresTransaction {
    async fn insert_order(&mut self, order: NewOrder) -> Result<Order> {
        if order.items.is_empty() {
            return Err(StoreError::EmptyOrder);
        }

        let row = sqlx::query(
            "INSERT INTO orders (user_id) VALUES ($1) RETURNING id, created_at, updated_at",
        )
        .bind(order.user_id.value())
        .fetch_one(&mut *self.tx)
        .await?;
        let order_id = OrderId::new(row.try_get("id")?);
        let created_at: DateTime<Utc> = row.try_get("created_at")?;
        let updated_at: DateTime<Utc> = row.try_get("updated_at")?;

        let mut items = Vec::with_capacity(order.items.len());
        for item in order.items {
            let item_id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO order_items (order_id, product_id, price_cents, quantity, note)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id
                "#,
            )
            .bind(order_id.value())
            .bind(item.product_id.value())
            .bind(item.unit_price.cents())
            .bind(to_db_quantity(item.quantity)?)
            .bind(&item.note)
            .fetch_one(&mut *self.tx)
            .await?;

            items.push(OrderItem {
                id: OrderItemId::new(item_id),
                order_id,
                product_id: item.product_id,
                unit_price: item.unit_price,
                quantity: item.quantity,
                note: item.note,
            });
        }

        let details = order.shipping;
        let shipping_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO order_shipping (
                order_id, recipient_name, recipient_phone, address_line1, address_line2,
                city, postal_code, country, shipping_method, shipping_fee_cents
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id
            "#,
        )
        .bind(order_id.value())
        .bind(&details.recipient_name)
        .bind(&details.recipient_phone)
        .bind(&details.address_line1)
        .bind(&details.address_line2)
        .bind(&details.city)
        .bind(&details.postal_code)
        .bind(&details.country)
        .bind(details.shipping_method.as_str())
        .bind(details.shipping_fee.cents())
        .fetch_one(&mut *self.tx)
        .await?;

        tracing::debug!(%order_id, items = items.len(), "Inserted order");

        Ok(Order {
            id: order_id,
            user_id: order.user_id,
            items,
            shipping: OrderShipping {
                id: ShippingId::new(shipping_id),
                order_id,
                details,
            },
            payment: None,
            created_at,
            updated_at,
        })
    }

    async fn load_order(&mut self, order_id: OrderId) -> Result<Option<Order>> {
        self.fetch_order(order_id, false).await
    }

    async fn load_order_for_update(&mut self, order_id: OrderId) -> Result<Option<Order>> {
        self.fetch_order(order_id, true).await
    }

    async fn remove_item(&mut self, order_id: OrderId, item_id: OrderItemId) -> Result<OrderItem> {
        let row = sqlx::query(
            r#"
            DELETE FROM order_items
            WHERE id = $1 AND order_id = $2
            RETURNING id, order_id, product_id, price_cents, quantity, note
            "#,
        )
        .bind(item_id.value())
        .bind(order_id.value())
        .fetch_optional(&mut *self.tx)
        .await?;

        match row {
            Some(row) => {
                self.touch_order(order_id).await?;
                row_to_item(row)
            }
            None => Err(self.item_not_found(order_id, item_id).await),
        }
    }

    async fn update_item(
        &mut self,
        order_id: OrderId,
        item_id: OrderItemId,
        update: ItemUpdate,
    ) -> Result<ItemChange> {
        let previous: Option<i32> = sqlx::query_scalar(
            "SELECT quantity FROM order_items WHERE id = $1 AND order_id = $2 FOR UPDATE",
        )
        .bind(item_id.value())
        .bind(order_id.value())
        .fetch_optional(&mut *self.tx)
        .await?;

        let Some(previous) = previous else {
            return Err(self.item_not_found(order_id, item_id).await);
        };
        let previous_quantity = from_db_quantity(previous, "order_items.quantity")?;

        let row = sqlx::query(
            r#"
            UPDATE order_items
            SET quantity = $3, price_cents = $4
            WHERE id = $1 AND order_id = $2
            RETURNING id, order_id, product_id, price_cents, quantity, note
            "#,
        )
        .bind(item_id.value())
        .bind(order_id.value())
        .bind(to_db_quantity(update.quantity)?)
        .bind(update.unit_price.cents())
        .fetch_one(&mut *self.tx)
        .await?;
        self.touch_order(order_id).await?;

        Ok(ItemChange {
            item: row_to_item(row)?,
            previous_quantity,
            delta: i64::from(update.quantity) - i64::from(previous_quantity),
        })
    }

    async fn upsert_payment(
        &mut self,
        order_id: OrderId,
        payment: PaymentUpdate,
    ) -> Result<OrderPayment> {
        if !self.order_exists(order_id).await? {
            return Err(StoreError::OrderNotFound(order_id));
        }

        let row = sqlx::query(
            r#"
            INSERT INTO order_payments
                (order_id, payment_method, payment_status, amount_cents, transaction_ref, paid_at)
            VALUES ($1, $2, $3, $4, $5, COALESCE($6, NOW()))
            ON CONFLICT (order_id) DO UPDATE
            SET payment_method = EXCLUDED.payment_method,
                payment_status = EXCLUDED.payment_status,
                amount_cents = EXCLUDED.amount_cents,
                transaction_ref = EXCLUDED.transaction_ref,
                paid_at = EXCLUDED.paid_at
            RETURNING id, order_id, payment_method, payment_status, amount_cents, transaction_ref, paid_at
            "#,
        )
        .bind(order_id.value())
        .bind(payment.method.as_str())
        .bind(payment.status.as_str())
        .bind(payment.amount.cents())
        .bind(&payment.transaction_ref)
        .bind(payment.paid_at)
        .fetch_one(&mut *self.tx)
        .await?;
        self.touch_order(order_id).await?;

        row_to_payment(row)
    }

    async fn count_orders_for_user(&mut self, user_id: UserId) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE user_id = $1")
            .bind(user_id.value())
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(count.max(0) as u64)
    }
}

fn row_to_item(row: PgRow) -> Result<OrderItem> {
    Ok(OrderItem {
        id: OrderItemId::new(row.try_get("id")?),
        order_id: OrderId::new(row.try_get("order_id")?),
        product_id: ProductId::new(row.try_get("product_id")?),
        unit_price: Money::from_cents(row.try_get("price_cents")?),
        quantity: from_db_quantity(row.try_get("quantity")?, "order_items.quantity")?,
        note: row.try_get("note")?,
    })
}

fn row_to_shipping(row: PgRow) -> Result<OrderShipping> {
    let method: String = row.try_get("shipping_method")?;
    Ok(OrderShipping {
        id: ShippingId::new(row.try_get("id")?),
        order_id: OrderId::new(row.try_get("order_id")?),
        details: ShippingDetails {
            recipient_name: row.try_get("recipient_name")?,
            recipient_phone: row.try_get("recipient_phone")?,
            address_line1: row.try_get("address_line1")?,
            address_line2: row.try_get("address_line2")?,
            city: row.try_get("city")?,
            postal_code: row.try_get("postal_code")?,
            country: row.try_get("country")?,
            shipping_method: method.parse()?,
            shipping_fee: Money::from_cents(row.try_get("shipping_fee_cents")?),
        },
    })
}

fn row_to_payment(row: PgRow) -> Result<OrderPayment> {
    let method: String = row.try_get("payment_method")?;
    let status: String = row.try_get("payment_status")?;
    Ok(OrderPayment {
        id: PaymentId::new(row.try_get("id")?),
        order_id: OrderId::new(row.try_get("order_id")?),
        method: method.parse()?,
        status: status.parse()?,
        amount: Money::from_cents(row.try_get("amount_cents")?),
        transaction_ref: row.try_get("transaction_ref")?,
        paid_at: row.try_get("paid_at")?,
    })
}

fn to_db_quantity(quantity: u32) -> Result<i32> {
    i32::try_from(quantity)
        .map_err(|_| StoreError::Corrupt(format!("quantity {quantity} exceeds column range")))
}

fn from_db_quantity(quantity: i32, column: &str) -> Result<u32> {
    u32::try_from(quantity)
        .map_err(|_| StoreError::Corrupt(format!("negative value {quantity} in {column}")))
}
