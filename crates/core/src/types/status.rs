//! Status enums for orders, shipments and payments.

use serde::{Deserialize, Serialize};

/// Checkout state of an order.
///
/// Orders start in `Cart` and walk through the checkout steps until they are
/// `Complete`. Anything past completion (cancellation, returns) still counts
/// as a completed order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "storefront.order_state", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    #[default]
    Cart,
    Address,
    Delivery,
    Payment,
    Confirm,
    Complete,
    Canceled,
    AwaitingReturn,
    Returned,
}

impl OrderState {
    /// Whether an order in this state has been checked out.
    ///
    /// Incomplete orders are the only ones a shopper can keep editing, and the
    /// only ones eligible for merging.
    #[must_use]
    pub const fn is_complete(self) -> bool {
        matches!(
            self,
            Self::Complete | Self::Canceled | Self::AwaitingReturn | Self::Returned
        )
    }

    /// Whether the order has left the cart but not yet completed.
    #[must_use]
    pub const fn is_checkout(self) -> bool {
        matches!(
            self,
            Self::Address | Self::Delivery | Self::Payment | Self::Confirm
        )
    }

    /// The state's name as stored and rendered.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cart => "cart",
            Self::Address => "address",
            Self::Delivery => "delivery",
            Self::Payment => "payment",
            Self::Confirm => "confirm",
            Self::Complete => "complete",
            Self::Canceled => "canceled",
            Self::AwaitingReturn => "awaiting_return",
            Self::Returned => "returned",
        }
    }
}

impl std::fmt::Display for OrderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shipment state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "storefront.shipment_state", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentState {
    #[default]
    Pending,
    Ready,
    Shipped,
    Canceled,
}

/// Payment state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "storefront.payment_state", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    /// Created during checkout, not yet sent to a gateway.
    #[default]
    Checkout,
    Pending,
    Completed,
    Failed,
    Void,
}
