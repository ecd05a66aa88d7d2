//! Order commands as received from callers, with their field validation.
//!
//! Each command validates into the typed input the store consumes. Numeric
//! fields stay wide (`i64`) until validated so out-of-range values are
//! reported per field instead of failing deserialization.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::{Money, OrderId, OrderItemId, ProductId, UserId};

use crate::error::ValidationErrors;

use super::{
    ItemUpdate, NewOrder, NewOrderItem, PaymentMethod, PaymentStatus, PaymentUpdate,
    ShippingDetails, ShippingMethod, totals,
};

/// Largest quantity one line, or all lines of one product, may request.
/// Stock columns are 32-bit signed integers.
pub const MAX_QUANTITY: u32 = i32::MAX as u32;

/// One requested line of a new order.
#[derive(Debug, Clone)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub quantity: i64,
    pub price: Money,
    pub note: Option<String>,
}

impl OrderLine {
    pub fn new(product_id: impl Into<ProductId>, quantity: i64, price: Money) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
            price,
            note: None,
        }
    }
}

/// Shipping details as submitted.
#[derive(Debug, Clone, Default)]
pub struct ShippingRequest {
    pub recipient_name: String,
    pub recipient_phone: String,
    pub address_line1: String,
    pub address_line2: Option<String>,
    pub city: String,
    pub postal_code: String,
    pub country: String,
    pub shipping_method: ShippingMethod,
    pub shipping_fee: Money,
}

/// Command to place a new order.
#[derive(Debug, Clone)]
pub struct CreateOrder {
    pub items: Vec<OrderLine>,
    pub shipping: Option<ShippingRequest>,
}

impl CreateOrder {
    pub fn new(items: Vec<OrderLine>, shipping: ShippingRequest) -> Self {
        Self {
            items,
            shipping: Some(shipping),
        }
    }

    /// Validates the command into an insertable order owned by `user_id`.
    pub fn validate(self, user_id: UserId) -> Result<NewOrder, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.items.is_empty() {
            errors.add("items", "must contain at least one item");
        }

        let mut items = Vec::with_capacity(self.items.len());
        for (index, line) in self.items.into_iter().enumerate() {
            let prefix = format!("items[{index}]");
            let quantity = check_quantity(&mut errors, &format!("{prefix}.quantity"), line.quantity);
            check_price(&mut errors, &format!("{prefix}.price"), line.price);
            if let Some(quantity) = quantity {
                items.push(NewOrderItem {
                    product_id: line.product_id,
                    quantity,
                    unit_price: line.price,
                    note: line.note.filter(|note| !note.trim().is_empty()),
                });
            }
        }

        let mut per_product: BTreeMap<ProductId, u64> = BTreeMap::new();
        for item in &items {
            *per_product.entry(item.product_id).or_default() += u64::from(item.quantity);
        }
        for (product_id, quantity) in per_product {
            if quantity > u64::from(MAX_QUANTITY) {
                errors.add(
                    "items",
                    format!("total quantity of product {product_id} must be at most {MAX_QUANTITY}"),
                );
            }
        }
        if totals::new_order_total(&items).is_none() {
            errors.add("items", totals::TOTAL_OUT_OF_RANGE);
        }

        let shipping = match self.shipping {
            Some(shipping) => Some(validate_shipping(&mut errors, shipping)),
            None => {
                errors.add("shipping", "is required");
                None
            }
        };

        errors.into_result()?;
        match shipping {
            Some(shipping) => Ok(NewOrder {
                user_id,
                items,
                shipping,
            }),
            None => Err(ValidationErrors::single("shipping", "is required")),
        }
    }
}

fn validate_shipping(errors: &mut ValidationErrors, shipping: ShippingRequest) -> ShippingDetails {
    let required = [
        ("shipping.recipientName", &shipping.recipient_name),
        ("shipping.recipientPhone", &shipping.recipient_phone),
        ("shipping.addressLine1", &shipping.address_line1),
        ("shipping.city", &shipping.city),
        ("shipping.postalCode", &shipping.postal_code),
        ("shipping.country", &shipping.country),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            errors.add(field, "must not be blank");
        }
    }
    check_price(errors, "shipping.shippingFee", shipping.shipping_fee);

    ShippingDetails {
        recipient_name: shipping.recipient_name.trim().to_string(),
        recipient_phone: shipping.recipient_phone.trim().to_string(),
        address_line1: shipping.address_line1.trim().to_string(),
        address_line2: shipping
            .address_line2
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty()),
        city: shipping.city.trim().to_string(),
        postal_code: shipping.postal_code.trim().to_string(),
        country: shipping.country.trim().to_string(),
        shipping_method: shipping.shipping_method,
        shipping_fee: shipping.shipping_fee,
    }
}

/// Command to remove a line from an order.
#[derive(Debug, Clone, Copy)]
pub struct DeleteOrderItem {
    pub order_id: OrderId,
    pub order_item_id: OrderItemId,
}

impl DeleteOrderItem {
    pub fn new(order_id: OrderId, order_item_id: OrderItemId) -> Self {
        Self {
            order_id,
            order_item_id,
        }
    }
}

/// Command to change the quantity and price of an order line.
#[derive(Debug, Clone, Copy)]
pub struct UpdateOrderItem {
    pub order_id: OrderId,
    pub order_item_id: OrderItemId,
    pub quantity: i64,
    pub price: Money,
}

impl UpdateOrderItem {
    pub fn new(order_id: OrderId, order_item_id: OrderItemId, quantity: i64, price: Money) -> Self {
        Self {
            order_id,
            order_item_id,
            quantity,
            price,
        }
    }

    pub fn validate(&self) -> Result<ItemUpdate, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let quantity = check_quantity(&mut errors, "quantity", self.quantity);
        check_price(&mut errors, "price", self.price);
        errors.into_result()?;

        match quantity {
            Some(quantity) => Ok(ItemUpdate {
                quantity,
                unit_price: self.price,
            }),
            None => Err(ValidationErrors::single("quantity", "must be at least 1")),
        }
    }
}

/// Command to attach or update an order's payment.
#[derive(Debug, Clone)]
pub struct UpdateOrderPayment {
    pub order_id: OrderId,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub amount: Money,
    pub transaction_ref: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl UpdateOrderPayment {
    pub fn new(order_id: OrderId, method: PaymentMethod, status: PaymentStatus, amount: Money) -> Self {
        Self {
            order_id,
            method,
            status,
            amount,
            transaction_ref: None,
            paid_at: None,
        }
    }

    /// Sets the external transaction reference.
    pub fn with_transaction_ref(mut self, transaction_ref: impl Into<String>) -> Self {
        self.transaction_ref = Some(transaction_ref.into());
        self
    }

    pub fn validate(&self) -> Result<PaymentUpdate, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        check_price(&mut errors, "paymentAmount", self.amount);
        errors.into_result()?;

        Ok(PaymentUpdate {
            method: self.method,
            status: self.status,
            amount: self.amount,
            transaction_ref: self
                .transaction_ref
                .as_ref()
                .map(|reference| reference.trim().to_string())
                .filter(|reference| !reference.is_empty()),
            paid_at: self.paid_at,
        })
    }
}

fn check_quantity(errors: &mut ValidationErrors, field: &str, quantity: i64) -> Option<u32> {
    if quantity < 1 {
        errors.add(field, "must be at least 1");
        return None;
    }
    match u32::try_from(quantity) {
        Ok(quantity) if quantity <= MAX_QUANTITY => Some(quantity),
        _ => {
            errors.add(field, format!("must be at most {MAX_QUANTITY}"));
            None
        }
    }
}

fn check_price(errors: &mut ValidationErrors, field: &str, price: Money) {
    if price.is_negative() {
        errors.add(field, "must not be negative");
    }
}
