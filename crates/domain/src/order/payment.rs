//! Payment status state machine.

use chrono::{DateTime, Utc};
use common::Money;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{OrderPayment, PaymentMethod, totals, value_objects::UnknownVariant};

/// Status of an order's payment.
///
/// State transitions:
/// ```text
/// Pending ──► Paid ──► Refunded
///    │
///    └──────► Failed
/// ```
/// `Paid`, `Refunded` and `Failed` are terminal: a payment never moves back
/// out of them, except `Paid ──► Refunded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Refunded,
    Failed,
}

impl PaymentStatus {
    /// Returns true if a payment in this state may be moved to `next`.
    ///
    /// Re-applying the current status is always allowed.
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        if *self == next {
            return true;
        }
        match self {
            PaymentStatus::Pending => true,
            PaymentStatus::Paid => next == PaymentStatus::Refunded,
            PaymentStatus::Refunded | PaymentStatus::Failed => false,
        }
    }

    /// Returns the wire/storage name.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Paid => "PAID",
            PaymentStatus::Refunded => "REFUNDED",
            PaymentStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(PaymentStatus::Pending),
            "PAID" => Ok(PaymentStatus::Paid),
            "REFUNDED" => Ok(PaymentStatus::Refunded),
            "FAILED" => Ok(PaymentStatus::Failed),
            other => Err(UnknownVariant::new("payment status", other)),
        }
    }
}

/// Validated payment fields to attach to an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentUpdate {
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub amount: Money,
    pub transaction_ref: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

/// A payment update rejected by the state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaymentTransitionError {
    /// The payment is in a terminal state that cannot move to the target.
    #[error("Invalid payment transition: cannot move from {from} to {to}")]
    IllegalTransition {
        from: PaymentStatus,
        to: PaymentStatus,
    },

    /// A payment marked paid must cover the order total exactly.
    #[error("Payment amount {amount} does not match order total {order_total}")]
    AmountMismatch { amount: Money, order_total: Money },
}

/// Checks that `update` may be applied on top of `current`.
///
/// `order_total` is the freshly recomputed items total of the order.
pub fn validate_transition(
    current: Option<&OrderPayment>,
    update: &PaymentUpdate,
    order_total: Money,
) -> Result<(), PaymentTransitionError> {
    if let Some(current) = current
        && !current.status.can_transition_to(update.status)
    {
        return Err(PaymentTransitionError::IllegalTransition {
            from: current.status,
            to: update.status,
        });
    }

    if update.status == PaymentStatus::Paid && !totals::payment_matches(update.amount, order_total) {
        return Err(PaymentTransitionError::AmountMismatch {
            amount: update.amount,
            order_total,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use common::{OrderId, PaymentId};

    use super::*;

    fn update(status: PaymentStatus, cents: i64) -> PaymentUpdate {
        PaymentUpdate {
            method: PaymentMethod::CreditCard,
            status,
            amount: Money::from_cents(cents),
            transaction_ref: Some("TX123".to_string()),
            paid_at: None,
        }
    }

    fn existing(status: PaymentStatus) -> OrderPayment {
        OrderPayment {
            id: PaymentId::new(1),
            order_id: OrderId::new(1),
            method: PaymentMethod::CreditCard,
            status,
            amount: Money::from_cents(10_000),
            transaction_ref: None,
            paid_at: Utc::now(),
        }
    }

    #[test]
    fn test_pending_can_go_anywhere() {
        for next in [
            PaymentStatus::Pending,
            PaymentStatus::Paid,
            PaymentStatus::Refunded,
            PaymentStatus::Failed,
        ] {
            assert!(PaymentStatus::Pending.can_transition_to(next));
        }
    }

    #[test]
    fn test_paid_only_moves_to_refunded() {
        assert!(PaymentStatus::Paid.can_transition_to(PaymentStatus::Paid));
        assert!(PaymentStatus::Paid.can_transition_to(PaymentStatus::Refunded));
        assert!(!PaymentStatus::Paid.can_transition_to(PaymentStatus::Pending));
        assert!(!PaymentStatus::Paid.can_transition_to(PaymentStatus::Failed));
    }

    #[test]
    fn test_refunded_and_failed_are_final() {
        for terminal in [PaymentStatus::Refunded, PaymentStatus::Failed] {
            assert!(terminal.can_transition_to(terminal));
            assert!(!terminal.can_transition_to(PaymentStatus::Pending));
            assert!(!terminal.can_transition_to(PaymentStatus::Paid));
        }
        assert!(!PaymentStatus::Failed.can_transition_to(PaymentStatus::Refunded));
    }

    #[test]
    fn test_first_payment_accepts_any_status() {
        let result = validate_transition(
            None,
            &update(PaymentStatus::Failed, 0),
            Money::from_cents(10_000),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_paid_requires_matching_amount() {
        let err = validate_transition(
            None,
            &update(PaymentStatus::Paid, 9_999),
            Money::from_cents(10_000),
        )
        .unwrap_err();
        assert_eq!(
            err,
            PaymentTransitionError::AmountMismatch {
                amount: Money::from_cents(9_999),
                order_total: Money::from_cents(10_000),
            }
        );

        assert!(
            validate_transition(
                None,
                &update(PaymentStatus::Paid, 10_000),
                Money::from_cents(10_000)
            )
            .is_ok()
        );
    }

    #[test]
    fn test_paid_back_to_pending_rejected() {
        let current = existing(PaymentStatus::Paid);
        let err = validate_transition(
            Some(&current),
            &update(PaymentStatus::Pending, 10_000),
            Money::from_cents(10_000),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            PaymentTransitionError::IllegalTransition {
                from: PaymentStatus::Paid,
                to: PaymentStatus::Pending
            }
        ));
    }

    #[test]
    fn test_repeated_paid_is_idempotent() {
        let current = existing(PaymentStatus::Paid);
        let result = validate_transition(
            Some(&current),
            &update(PaymentStatus::Paid, 10_000),
            Money::from_cents(10_000),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(serde_json::to_string(&PaymentStatus::Paid).unwrap(), "\"PAID\"");
        assert_eq!("REFUNDED".parse::<PaymentStatus>().unwrap(), PaymentStatus::Refunded);
        assert!("SETTLED".parse::<PaymentStatus>().is_err());
    }
}
