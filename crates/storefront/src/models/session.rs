//! Session-related types.
//!
//! Types stored in the server-side session.

use core::fmt;

use serde::{Deserialize, Serialize};

use parcel_core::{Email, UserId};

/// Session-stored user identity.
///
/// Minimal data stored in the session to identify the logged-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    /// User's database ID.
    pub id: UserId,
    /// User's email address.
    pub email: Email,
}

/// Card data a payment gateway needs to finish a payment.
///
/// Held in the session only; never written to the orders database.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensitivePaymentDetails {
    /// Client-side encrypted card payload.
    pub encrypted_data: String,
}

impl fmt::Debug for SensitivePaymentDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SensitivePaymentDetails")
            .field("encrypted_data", &"[REDACTED]")
            .finish()
    }
}

/// Session keys.
pub mod keys {
    /// Key for storing the current logged-in user.
    pub const CURRENT_USER: &str = "current_user";

    /// Key for payment details captured during checkout, by payment method.
    pub const SENSITIVE_PAYMENT_DETAILS: &str = "sensitive_payment_details";
}
