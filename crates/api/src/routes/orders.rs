//! Order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use chrono::{DateTime, Utc};
use common::{Money, OrderId, OrderItemId, ProductId};
use domain::{
    CreateOrder, DeleteOrderItem, OrderLine, PaymentMethod, PaymentStatus, ShippingMethod,
    ShippingRequest, UpdateOrderItem, UpdateOrderPayment, ValidationErrors,
};
use orders::{OrderCoordinator, OrderResponse};
use serde::Deserialize;
use store::Store;

use crate::auth::AuthenticatedUser;
use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S: Store> {
    pub coordinator: OrderCoordinator<S>,
}

impl<S: Store> AppState<S> {
    pub fn new(coordinator: OrderCoordinator<S>) -> Self {
        Self { coordinator }
    }
}

// -- Request types --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[serde(default, alias = "orderItems")]
    pub items: Vec<OrderItemRequest>,
    #[serde(default, alias = "orderShipping")]
    pub shipping: Option<ShippingBody>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemRequest {
    pub product_id: Option<i64>,
    pub quantity: Option<i64>,
    pub price: Option<f64>,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ShippingBody {
    pub recipient_name: String,
    pub recipient_phone: String,
    pub address_line1: String,
    pub address_line2: Option<String>,
    pub city: String,
    pub postal_code: String,
    pub country: String,
    pub shipping_method: ShippingMethod,
    pub shipping_fee: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOrderItemRequest {
    pub order_id: Option<i64>,
    pub order_item_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrderItemRequest {
    pub order_id: Option<i64>,
    pub order_item_id: Option<i64>,
    pub quantity: Option<i64>,
    pub price: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePaymentRequest {
    pub payment_method: Option<PaymentMethod>,
    pub payment_status: Option<PaymentStatus>,
    pub payment_amount: Option<f64>,
    #[serde(default)]
    pub transaction_ref: Option<String>,
    #[serde(default)]
    pub payment_timestamp: Option<DateTime<Utc>>,
}

// -- Request conversion --

fn required<T>(errors: &mut ValidationErrors, field: &str, value: Option<T>) -> Option<T> {
    if value.is_none() {
        errors.add(field, "is required");
    }
    value
}

fn money(errors: &mut ValidationErrors, field: &str, value: Option<f64>) -> Option<Money> {
    let value = required(errors, field, value)?;
    let money = Money::from_major(value);
    if money.is_none() {
        errors.add(field, "must be a finite number");
    }
    money
}

impl CreateOrderRequest {
    fn into_command(self) -> Result<CreateOrder, ApiError> {
        let mut errors = ValidationErrors::new();

        let mut items = Vec::with_capacity(self.items.len());
        for (index, item) in self.items.into_iter().enumerate() {
            let product_id = required(&mut errors, &format!("items[{index}].productId"), item.product_id);
            let quantity = required(&mut errors, &format!("items[{index}].quantity"), item.quantity);
            let price = money(&mut errors, &format!("items[{index}].price"), item.price);
            if let (Some(product_id), Some(quantity), Some(price)) = (product_id, quantity, price) {
                items.push(OrderLine {
                    product_id: ProductId::new(product_id),
                    quantity,
                    price,
                    note: item.note,
                });
            }
        }

        let shipping = self.shipping.map(|body| {
            let shipping_fee = money(&mut errors, "shipping.shippingFee", body.shipping_fee);
            ShippingRequest {
                recipient_name: body.recipient_name,
                recipient_phone: body.recipient_phone,
                address_line1: body.address_line1,
                address_line2: body.address_line2,
                city: body.city,
                postal_code: body.postal_code,
                country: body.country,
                shipping_method: body.shipping_method,
                shipping_fee: shipping_fee.unwrap_or_default(),
            }
        });

        errors.into_result()?;
        Ok(CreateOrder { items, shipping })
    }
}

impl DeleteOrderItemRequest {
    fn into_command(self) -> Result<DeleteOrderItem, ApiError> {
        let mut errors = ValidationErrors::new();
        let order_id = required(&mut errors, "orderId", self.order_id);
        let order_item_id = required(&mut errors, "orderItemId", self.order_item_id);
        errors.into_result()?;

        match (order_id, order_item_id) {
            (Some(order_id), Some(order_item_id)) => Ok(DeleteOrderItem::new(
                OrderId::new(order_id),
                OrderItemId::new(order_item_id),
            )),
            _ => Err(ValidationErrors::single("orderId", "is required").into()),
        }
    }
}

impl UpdateOrderItemRequest {
    fn into_command(self) -> Result<UpdateOrderItem, ApiError> {
        let mut errors = ValidationErrors::new();
        let order_id = required(&mut errors, "orderId", self.order_id);
        let order_item_id = required(&mut errors, "orderItemId", self.order_item_id);
        let quantity = required(&mut errors, "quantity", self.quantity);
        let price = money(&mut errors, "price", self.price);
        errors.into_result()?;

        match (order_id, order_item_id, quantity, price) {
            (Some(order_id), Some(order_item_id), Some(quantity), Some(price)) => {
                Ok(UpdateOrderItem::new(
                    OrderId::new(order_id),
                    OrderItemId::new(order_item_id),
                    quantity,
                    price,
                ))
            }
            _ => Err(ValidationErrors::single("orderItemId", "is required").into()),
        }
    }
}

impl UpdatePaymentRequest {
    fn into_command(self, order_id: OrderId) -> Result<UpdateOrderPayment, ApiError> {
        let mut errors = ValidationErrors::new();
        let method = required(&mut errors, "paymentMethod", self.payment_method);
        let status = required(&mut errors, "paymentStatus", self.payment_status);
        let amount = money(&mut errors, "paymentAmount", self.payment_amount);
        errors.into_result()?;

        match (method, status, amount) {
            (Some(method), Some(status), Some(amount)) => Ok(UpdateOrderPayment {
                order_id,
                method,
                status,
                amount,
                transaction_ref: self.transaction_ref,
                paid_at: self.payment_timestamp,
            }),
            _ => Err(ValidationErrors::single("paymentStatus", "is required").into()),
        }
    }
}

// -- Handlers --

/// POST /orders — place an order for the caller.
#[tracing::instrument(skip(state, payload))]
pub async fn create<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedUser(caller): AuthenticatedUser,
    payload: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<Json<OrderResponse>, ApiError> {
    let Json(request) = payload?;
    let command = request.into_command()?;
    let order = state.coordinator.create_order(&caller, command).await?;
    Ok(Json(order))
}

/// GET /orders/{order_id} — read an order.
#[tracing::instrument(skip(state, path))]
pub async fn get<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedUser(caller): AuthenticatedUser,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<OrderResponse>, ApiError> {
    let Path(order_id) = path?;
    let order = state
        .coordinator
        .get_order_by_id(&caller, OrderId::new(order_id))
        .await?;
    Ok(Json(order))
}

/// DELETE /orders/items — remove a line and restore its stock.
#[tracing::instrument(skip(state, payload))]
pub async fn delete_item<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedUser(caller): AuthenticatedUser,
    payload: Result<Json<DeleteOrderItemRequest>, JsonRejection>,
) -> Result<Json<OrderResponse>, ApiError> {
    let Json(request) = payload?;
    let command = request.into_command()?;
    let order = state.coordinator.delete_order_item(&caller, command).await?;
    Ok(Json(order))
}

/// PUT /orders/items — change a line's quantity and price.
#[tracing::instrument(skip(state, payload))]
pub async fn update_item<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedUser(caller): AuthenticatedUser,
    payload: Result<Json<UpdateOrderItemRequest>, JsonRejection>,
) -> Result<Json<OrderResponse>, ApiError> {
    let Json(request) = payload?;
    let command = request.into_command()?;
    let order = state.coordinator.update_order_item(&caller, command).await?;
    Ok(Json(order))
}

/// PUT /orders/{order_id}/payment — attach or update the payment.
#[tracing::instrument(skip(state, path, payload))]
pub async fn update_payment<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedUser(caller): AuthenticatedUser,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<UpdatePaymentRequest>, JsonRejection>,
) -> Result<Json<OrderResponse>, ApiError> {
    let Path(order_id) = path?;
    let Json(request) = payload?;
    let command = request.into_command(OrderId::new(order_id))?;
    let order = state
        .coordinator
        .update_order_payment(&caller, command)
        .await?;
    Ok(Json(order))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn parse<T: for<'de> Deserialize<'de>>(value: serde_json::Value) -> T {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_create_request_accepts_aliases() {
        let request: CreateOrderRequest = parse(json!({
            "orderItems": [{"productId": 1, "quantity": 2, "price": 50.0, "note": "gift"}],
            "orderShipping": {
                "recipientName": "John Doe",
                "recipientPhone": "0123456789",
                "addressLine1": "123 Main St",
                "city": "Hanoi",
                "postalCode": "12345",
                "country": "Vietnam",
                "shippingMethod": "EXPRESS",
                "shippingFee": 10.0
            }
        }));

        let command = request.into_command().unwrap();
        assert_eq!(command.items.len(), 1);
        assert_eq!(command.items[0].price, Money::from_cents(5000));
        assert_eq!(command.items[0].note.as_deref(), Some("gift"));
        let shipping = command.shipping.unwrap();
        assert_eq!(shipping.shipping_method, ShippingMethod::Express);
        assert_eq!(shipping.shipping_fee, Money::from_dollars(10));
    }

    #[test]
    fn test_missing_item_fields_reported() {
        let request: CreateOrderRequest = parse(json!({
            "items": [{"productId": 1}],
            "shipping": {}
        }));

        let err = request.into_command().unwrap_err();
        let ApiError::Service(orders::ServiceError::Validation(errors)) = err else {
            panic!("expected validation error");
        };
        assert_eq!(errors.fields()["items[0].quantity"], "is required");
        assert_eq!(errors.fields()["items[0].price"], "is required");
        assert_eq!(errors.fields()["shipping.shippingFee"], "is required");
    }

    #[test]
    fn test_payment_request_requires_status() {
        let request: UpdatePaymentRequest = parse(json!({
            "paymentMethod": "CREDIT_CARD",
            "paymentAmount": 100.0
        }));
        let err = request.into_command(OrderId::new(1)).unwrap_err();
        assert_eq!(err.kind(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_payment_timestamp_parsed() {
        let request: UpdatePaymentRequest = parse(json!({
            "paymentMethod": "BANK_TRANSFER",
            "paymentStatus": "PAID",
            "paymentAmount": 100.0,
            "transactionRef": "TX123",
            "paymentTimestamp": "2024-05-01T10:00:00Z"
        }));
        let command = request.into_command(OrderId::new(9)).unwrap();
        assert_eq!(command.order_id, OrderId::new(9));
        assert_eq!(command.status, PaymentStatus::Paid);
        assert_eq!(
            command.paid_at.unwrap().to_rfc3339(),
            "2024-05-01T10:00:00+00:00"
        );
    }

    #[test]
    fn test_delete_request_requires_both_ids() {
        let request: DeleteOrderItemRequest = parse(json!({"orderId": 1}));
        let err = request.into_command().unwrap_err();
        assert_eq!(err.kind(), "VALIDATION_ERROR");
    }
}
