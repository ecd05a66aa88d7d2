use serde::{Deserialize, Serialize};

macro_rules! integer_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw database identity.
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            /// Returns the raw identity value.
            pub const fn value(&self) -> i64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

integer_id!(
    /// Opaque identity of an authenticated user, supplied by the auth layer.
    UserId
);

integer_id!(
    /// Identity of an order aggregate.
    OrderId
);

integer_id!(
    /// Identity of a single line within an order.
    OrderItemId
);

integer_id!(
    /// Identity of a catalog product.
    ProductId
);

integer_id!(
    /// Identity of an order's shipping record.
    ShippingId
);

integer_id!(
    /// Identity of an order's payment record.
    PaymentId
);
