//! Variant repository.

use parcel_core::{Currency, VariantId};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;

use super::RepositoryError;

/// A purchasable variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Variant {
    pub id: VariantId,
    pub sku: String,
    pub name: String,
    pub price: Decimal,
    pub currency: Currency,
}

/// Repository for variant lookups.
pub struct VariantRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> VariantRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a variant by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: VariantId) -> Result<Option<Variant>, RepositoryError> {
        Ok(sqlx::query_as::<_, Variant>(
            "SELECT id, sku, name, price, currency FROM storefront.variant WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?)
    }

    /// Insert or update a variant by SKU.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn upsert(
        &self,
        sku: &str,
        name: &str,
        price: Decimal,
        currency: Currency,
    ) -> Result<Variant, RepositoryError> {
        Ok(sqlx::query_as::<_, Variant>(
            r"
            INSERT INTO storefront.variant (sku, name, price, currency)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (sku) DO UPDATE
                SET name = EXCLUDED.name, price = EXCLUDED.price, currency = EXCLUDED.currency
            RETURNING id, sku, name, price, currency
            ",
        )
        .bind(sku)
        .bind(name)
        .bind(price)
        .bind(currency)
        .fetch_one(self.pool)
        .await?)
    }
}
