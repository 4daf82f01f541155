//! Payment method and payment repository.

use rand::Rng;
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;

use parcel_core::{OrderId, PaymentId, PaymentMethodId, PaymentState};

use super::RepositoryError;

/// A way of paying, e.g. "Credit Card".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct PaymentMethod {
    pub id: PaymentMethodId,
    pub name: String,
}

/// A payment against an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Payment {
    pub id: PaymentId,
    pub number: String,
    pub order_id: OrderId,
    pub payment_method_id: PaymentMethodId,
    pub amount: Decimal,
    pub state: PaymentState,
}

/// Repository for payments.
pub struct PaymentRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> PaymentRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Payment methods shoppers can choose.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn active_methods(&self) -> Result<Vec<PaymentMethod>, RepositoryError> {
        Ok(sqlx::query_as::<_, PaymentMethod>(
            "SELECT id, name FROM storefront.payment_method WHERE active ORDER BY id",
        )
        .fetch_all(self.pool)
        .await?)
    }

    /// Add a payment method.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn create_method(&self, name: &str) -> Result<PaymentMethod, RepositoryError> {
        Ok(sqlx::query_as::<_, PaymentMethod>(
            "INSERT INTO storefront.payment_method (name) VALUES ($1) RETURNING id, name",
        )
        .bind(name)
        .fetch_one(self.pool)
        .await?)
    }

    /// Create a checkout-state payment.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the payment method is unknown or inactive.
    pub async fn create(
        &self,
        order_id: OrderId,
        payment_method_id: PaymentMethodId,
        amount: Decimal,
    ) -> Result<Payment, RepositoryError> {
        let number = format!("P{:08}", rand::rng().random_range(0..100_000_000_u32));

        sqlx::query_as::<_, Payment>(
            r"
            INSERT INTO storefront.payment (number, order_id, payment_method_id, amount)
            SELECT $1, $2, pm.id, $4
            FROM storefront.payment_method pm
            WHERE pm.id = $3 AND pm.active
            RETURNING id, number, order_id, payment_method_id, amount, state
            ",
        )
        .bind(number)
        .bind(order_id)
        .bind(payment_method_id)
        .bind(amount)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| RepositoryError::from_unique(e, "payment number"))?
        .ok_or(RepositoryError::NotFound)
    }
}
