//! Checkout payment parameters.
//!
//! Payment forms post card data encrypted client-side under each payment's
//! `source_attributes`. Gateways need that data once more when the payment
//! is processed, but it must never reach the orders database: it is pulled
//! out of the parameters and parked in the server-side session, and payment
//! rows are created from what is left.

use core::fmt;
use std::collections::HashMap;

use parcel_core::PaymentMethodId;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use tower_sessions::Session;

use crate::models::SensitivePaymentDetails;
use crate::models::session::keys;

/// Body of a checkout payment submission.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckoutParams {
    #[serde(default)]
    pub order: Option<CheckoutOrderParams>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckoutOrderParams {
    #[serde(default)]
    pub payments_attributes: Option<Vec<PaymentAttributes>>,
}

/// One payment in a checkout submission.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentAttributes {
    /// Forms post ids as strings, API clients as numbers.
    #[serde(deserialize_with = "payment_method_id")]
    pub payment_method_id: PaymentMethodId,
    /// Decimal string, e.g. `"19.99"`.
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub source_attributes: Option<SourceAttributes>,
}

/// Payment source fields, including the sensitive card payload.
#[derive(Clone, Default, Deserialize)]
pub struct SourceAttributes {
    #[serde(default)]
    pub encrypted_data: Option<String>,
}

impl fmt::Debug for SourceAttributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceAttributes")
            .field(
                "encrypted_data",
                &self.encrypted_data.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// A payment to create, without its source attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    pub payment_method_id: PaymentMethodId,
    pub amount: Option<Decimal>,
}

fn payment_method_id<'de, D>(deserializer: D) -> Result<PaymentMethodId, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(i32),
        Text(String),
    }

    match RawId::deserialize(deserializer)? {
        RawId::Number(id) => Ok(PaymentMethodId::new(id)),
        RawId::Text(text) => text.parse().map_err(serde::de::Error::custom),
    }
}

/// Sensitive source attributes keyed by payment method.
///
/// `None` when the parameters carry no order, no payments, or no payment
/// with source attributes.
#[must_use]
pub fn sensitive_payment_details(
    params: &CheckoutParams,
) -> Option<HashMap<PaymentMethodId, SensitivePaymentDetails>> {
    let payments = params.order.as_ref()?.payments_attributes.as_ref()?;

    let details: HashMap<_, _> = payments
        .iter()
        .filter_map(|payment| {
            let encrypted_data = payment.source_attributes.as_ref()?.encrypted_data.clone()?;
            Some((
                payment.payment_method_id,
                SensitivePaymentDetails { encrypted_data },
            ))
        })
        .collect();

    (!details.is_empty()).then_some(details)
}

/// Park the sensitive payment details in the session and return them.
///
/// # Errors
///
/// Returns the session error if the session store cannot be written.
pub async fn persist_sensitive_payment_details(
    session: &Session,
    params: &CheckoutParams,
) -> Result<Option<HashMap<PaymentMethodId, SensitivePaymentDetails>>, tower_sessions::session::Error>
{
    let Some(details) = sensitive_payment_details(params) else {
        return Ok(None);
    };

    session
        .insert(keys::SENSITIVE_PAYMENT_DETAILS, &details)
        .await?;
    tracing::debug!(payment_methods = details.len(), "Stored sensitive payment details");

    Ok(Some(details))
}

/// The payments to create, with source attributes dropped.
#[must_use]
pub fn strip_sensitive_attributes(params: &CheckoutParams) -> Vec<PaymentRequest> {
    params
        .order
        .as_ref()
        .and_then(|order| order.payments_attributes.as_ref())
        .map(|payments| {
            payments
                .iter()
                .map(|payment| PaymentRequest {
                    payment_method_id: payment.payment_method_id,
                    amount: payment.amount,
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use tower_sessions::MemoryStore;

    use super::*;

    type StoredDetails = HashMap<PaymentMethodId, SensitivePaymentDetails>;

    fn params(value: serde_json::Value) -> CheckoutParams {
        serde_json::from_value(value).unwrap()
    }

    fn card_params() -> CheckoutParams {
        params(json!({
            "order": {
                "payments_attributes": [
                    {
                        "payment_method_id": "7",
                        "amount": "19.99",
                        "source_attributes": { "encrypted_data": "TEST" }
                    }
                ]
            }
        }))
    }

    #[test]
    fn test_details_keyed_by_payment_method() {
        let details = sensitive_payment_details(&card_params()).unwrap();
        assert_eq!(details.len(), 1);
        assert_eq!(details[&PaymentMethodId::new(7)].encrypted_data, "TEST");
    }

    #[test]
    fn test_numeric_payment_method_id() {
        let params = params(json!({
            "order": { "payments_attributes": [
                { "payment_method_id": 3, "source_attributes": { "encrypted_data": "x" } }
            ] }
        }));
        let details = sensitive_payment_details(&params).unwrap();
        assert!(details.contains_key(&PaymentMethodId::new(3)));
    }

    #[test]
    fn test_empty_params_yield_none() {
        assert!(sensitive_payment_details(&params(json!({}))).is_none());
        assert!(sensitive_payment_details(&params(json!({ "order": {} }))).is_none());
        let without_source = params(json!({
            "order": { "payments_attributes": [ { "payment_method_id": 1 } ] }
        }));
        assert!(sensitive_payment_details(&without_source).is_none());
    }

    #[test]
    fn test_strip_keeps_payment_rows_only() {
        let payments = strip_sensitive_attributes(&card_params());
        assert_eq!(
            payments,
            vec![PaymentRequest {
                payment_method_id: PaymentMethodId::new(7),
                amount: Some(Decimal::new(1999, 2)),
            }]
        );
        assert!(strip_sensitive_attributes(&params(json!({}))).is_empty());
    }

    #[test]
    fn test_source_attributes_debug_is_redacted() {
        let debug = format!("{:?}", card_params());
        assert!(!debug.contains("TEST"));
    }

    #[tokio::test]
    async fn test_persist_stores_details_in_session() {
        let session = Session::new(None, Arc::new(MemoryStore::default()), None);

        let returned = persist_sensitive_payment_details(&session, &card_params())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(returned[&PaymentMethodId::new(7)].encrypted_data, "TEST");

        let stored: StoredDetails = session
            .get(keys::SENSITIVE_PAYMENT_DETAILS)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored[&PaymentMethodId::new(7)].encrypted_data, "TEST");
    }

    #[tokio::test]
    async fn test_persist_without_details_leaves_session_untouched() {
        let session = Session::new(None, Arc::new(MemoryStore::default()), None);

        let returned = persist_sensitive_payment_details(&session, &params(json!({})))
            .await
            .unwrap();

        assert!(returned.is_none());
        let stored: Option<StoredDetails> =
            session.get(keys::SENSITIVE_PAYMENT_DETAILS).await.unwrap();
        assert!(stored.is_none());
    }
}
