//! Read projection of an order returned by every coordinator operation.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::{
    Money, OrderId, OrderItemId, PaymentId, ProductId, ShippingId, UserId, money::major_units,
};
use domain::{
    Order, OrderItem, OrderPayment, OrderShipping, PaymentMethod, PaymentStatus, ShippingMethod,
    ValidationErrors,
};
use serde::{Deserialize, Serialize};
use store::ProductSnapshot;

/// Snapshot of an order after the last committed mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: OrderId,
    pub user_id: UserId,
    pub order_items: Vec<OrderItemResponse>,
    pub order_shipping: OrderShippingResponse,
    /// Orders placed by the owning user at response time.
    pub number_of_orders: u64,
    pub order_payment: Option<OrderPaymentResponse>,
    /// Recomputed items total.
    #[serde(with = "major_units")]
    pub total_amount: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemResponse {
    pub id: OrderItemId,
    pub order_id: OrderId,
    /// `None` once the product has been removed from the catalog.
    pub product: Option<ProductResponse>,
    /// Snapshot price of the line.
    #[serde(with = "major_units")]
    pub price: Money,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Current catalog view of a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductResponse {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    #[serde(with = "major_units")]
    pub price: Money,
    /// Units in stock.
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderShippingResponse {
    pub id: ShippingId,
    pub order_id: OrderId,
    pub recipient_name: String,
    pub recipient_phone: String,
    pub address_line1: String,
    pub address_line2: Option<String>,
    pub city: String,
    pub postal_code: String,
    pub country: String,
    pub shipping_method: ShippingMethod,
    #[serde(with = "major_units")]
    pub shipping_fee: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPaymentResponse {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    #[serde(with = "major_units")]
    pub payment_amount: Money,
    pub transaction_ref: Option<String>,
    pub payment_timestamp: DateTime<Utc>,
}

impl OrderResponse {
    /// Builds the projection from a loaded order and the catalog entries of
    /// its products. Products missing from `products` render as `null`.
    ///
    /// Fails if the items total does not fit in [`Money`].
    pub fn assemble(
        order: &Order,
        products: &HashMap<ProductId, ProductSnapshot>,
        number_of_orders: u64,
    ) -> Result<Self, ValidationErrors> {
        Ok(Self {
            id: order.id,
            user_id: order.user_id,
            order_items: order
                .items
                .iter()
                .map(|item| OrderItemResponse::assemble(item, products.get(&item.product_id)))
                .collect(),
            order_shipping: OrderShippingResponse::from(&order.shipping),
            number_of_orders,
            order_payment: order.payment.as_ref().map(OrderPaymentResponse::from),
            total_amount: order.total_amount()?,
        })
    }
}

impl OrderItemResponse {
    fn assemble(item: &OrderItem, product: Option<&ProductSnapshot>) -> Self {
        Self {
            id: item.id,
            order_id: item.order_id,
            product: product.map(ProductResponse::from),
            price: item.unit_price,
            quantity: item.quantity,
            note: item.note.clone(),
        }
    }
}

impl From<&ProductSnapshot> for ProductResponse {
    fn from(product: &ProductSnapshot) -> Self {
        Self {
            id: product.id,
            name: product.name.clone(),
            description: product.description.clone(),
            price: product.unit_price,
            quantity: product.available,
        }
    }
}

impl From<&OrderShipping> for OrderShippingResponse {
    fn from(shipping: &OrderShipping) -> Self {
        let details = &shipping.details;
        Self {
            id: shipping.id,
            order_id: shipping.order_id,
            recipient_name: details.recipient_name.clone(),
            recipient_phone: details.recipient_phone.clone(),
            address_line1: details.address_line1.clone(),
            address_line2: details.address_line2.clone(),
            city: details.city.clone(),
            postal_code: details.postal_code.clone(),
            country: details.country.clone(),
            shipping_method: details.shipping_method,
            shipping_fee: details.shipping_fee,
        }
    }
}

impl From<&OrderPayment> for OrderPaymentResponse {
    fn from(payment: &OrderPayment) -> Self {
        Self {
            id: payment.id,
            order_id: payment.order_id,
            payment_method: payment.method,
            payment_status: payment.status,
            payment_amount: payment.amount,
            transaction_ref: payment.transaction_ref.clone(),
            payment_timestamp: payment.paid_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use domain::ShippingDetails;
    use serde_json::json;

    use super::*;

    fn order() -> Order {
        let order_id = OrderId::new(3);
        Order {
            id: order_id,
            user_id: UserId::new(9),
            items: vec![
                OrderItem {
                    id: OrderItemId::new(1),
                    order_id,
                    product_id: ProductId::new(1),
                    unit_price: Money::from_cents(5000),
                    quantity: 2,
                    note: Some("gift".to_string()),
                },
                OrderItem {
                    id: OrderItemId::new(2),
                    order_id,
                    product_id: ProductId::new(2),
                    unit_price: Money::from_cents(1050),
                    quantity: 1,
                    note: None,
                },
            ],
            shipping: OrderShipping {
                id: ShippingId::new(4),
                order_id,
                details: ShippingDetails {
                    recipient_name: "John Doe".to_string(),
                    recipient_phone: "0123456789".to_string(),
                    address_line1: "123 Main St".to_string(),
                    address_line2: None,
                    city: "Hanoi".to_string(),
                    postal_code: "12345".to_string(),
                    country: "Vietnam".to_string(),
                    shipping_method: ShippingMethod::Express,
                    shipping_fee: Money::from_dollars(10),
                },
            },
            payment: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_response_shape() {
        let mut products = HashMap::new();
        products.insert(
            ProductId::new(1),
            ProductSnapshot {
                id: ProductId::new(1),
                name: "Laptop".to_string(),
                description: "Fast".to_string(),
                unit_price: Money::from_cents(99_999),
                available: 8,
            },
        );

        let response = OrderResponse::assemble(&order(), &products, 2).unwrap();
        let value = serde_json::to_value(&response).unwrap();

        assert_eq!(value["id"], json!(3));
        assert_eq!(value["userId"], json!(9));
        assert_eq!(value["numberOfOrders"], json!(2));
        assert_eq!(value["totalAmount"], json!(110.5));
        assert_eq!(value["orderPayment"], json!(null));

        let first = &value["orderItems"][0];
        assert_eq!(first["orderId"], json!(3));
        assert_eq!(first["price"], json!(50.0));
        assert_eq!(first["note"], json!("gift"));
        assert_eq!(first["product"]["price"], json!(999.99));
        assert_eq!(first["product"]["quantity"], json!(8));

        let second = &value["orderItems"][1];
        assert_eq!(second["product"], json!(null));
        assert!(second.get("note").is_none());

        assert_eq!(value["orderShipping"]["shippingMethod"], json!("EXPRESS"));
        assert_eq!(value["orderShipping"]["shippingFee"], json!(10.0));
    }

    #[test]
    fn test_payment_projection() {
        let mut order = order();
        let paid_at = Utc::now();
        order.payment = Some(OrderPayment {
            id: PaymentId::new(5),
            order_id: order.id,
            method: PaymentMethod::CreditCard,
            status: PaymentStatus::Paid,
            amount: Money::from_cents(11_050),
            transaction_ref: Some("TX123".to_string()),
            paid_at,
        });

        let response = OrderResponse::assemble(&order, &HashMap::new(), 1).unwrap();
        let value = serde_json::to_value(&response).unwrap();
        let payment = &value["orderPayment"];

        assert_eq!(payment["paymentMethod"], json!("CREDIT_CARD"));
        assert_eq!(payment["paymentStatus"], json!("PAID"));
        assert_eq!(payment["paymentAmount"], json!(110.5));
        assert_eq!(payment["transactionRef"], json!("TX123"));
        assert_eq!(response.order_payment.unwrap().payment_timestamp, paid_at);
    }
}
