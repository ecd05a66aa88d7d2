//! Value objects for the order domain.

use common::Money;
use serde::{Deserialize, Serialize};

/// Delivery option chosen at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShippingMethod {
    #[default]
    Standard,
    Express,
    Overnight,
}

impl ShippingMethod {
    /// Returns the wire/storage name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ShippingMethod::Standard => "STANDARD",
            ShippingMethod::Express => "EXPRESS",
            ShippingMethod::Overnight => "OVERNIGHT",
        }
    }
}

impl std::fmt::Display for ShippingMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ShippingMethod {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STANDARD" => Ok(ShippingMethod::Standard),
            "EXPRESS" => Ok(ShippingMethod::Express),
            "OVERNIGHT" => Ok(ShippingMethod::Overnight),
            other => Err(UnknownVariant::new("shipping method", other)),
        }
    }
}

/// How the customer pays. Payment-gateway integration lives elsewhere;
/// this only records what the caller reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    CreditCard,
    DebitCard,
    BankTransfer,
    CashOnDelivery,
}

impl PaymentMethod {
    /// Returns the wire/storage name.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::CreditCard => "CREDIT_CARD",
            PaymentMethod::DebitCard => "DEBIT_CARD",
            PaymentMethod::BankTransfer => "BANK_TRANSFER",
            PaymentMethod::CashOnDelivery => "CASH_ON_DELIVERY",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREDIT_CARD" => Ok(PaymentMethod::CreditCard),
            "DEBIT_CARD" => Ok(PaymentMethod::DebitCard),
            "BANK_TRANSFER" => Ok(PaymentMethod::BankTransfer),
            "CASH_ON_DELIVERY" => Ok(PaymentMethod::CashOnDelivery),
            other => Err(UnknownVariant::new("payment method", other)),
        }
    }
}

/// A stored enum column held a value this build does not know.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Recipient and delivery details of an order.
///
/// Address fields are replaced as a whole, never patched field by field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingDetails {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shipping_method_round_trips_through_str() {
        for method in [
            ShippingMethod::Standard,
            ShippingMethod::Express,
            ShippingMethod::Overnight,
        ] {
            assert_eq!(method.as_str().parse::<ShippingMethod>().unwrap(), method);
        }
    }

    #[test]
    fn test_payment_method_wire_names() {
        let json = serde_json::to_string(&PaymentMethod::CashOnDelivery).unwrap();
        assert_eq!(json, "\"CASH_ON_DELIVERY\"");

        let parsed: PaymentMethod = serde_json::from_str("\"CREDIT_CARD\"").unwrap();
        assert_eq!(parsed, PaymentMethod::CreditCard);
    }

    #[test]
    fn test_unknown_payment_method() {
        let err = "PAYPAL".parse::<PaymentMethod>().unwrap_err();
        assert_eq!(err.to_string(), "unknown payment method: PAYPAL");
    }
}
