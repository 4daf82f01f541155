//! Store repository.

use parcel_core::{Currency, StoreId};
use sqlx::PgPool;

use super::RepositoryError;
use crate::models::Store;

#[derive(sqlx::FromRow)]
struct StoreRow {
    id: StoreId,
    name: String,
    code: String,
    hosts: Vec<String>,
    default_currency: Currency,
    is_default: bool,
}

impl From<StoreRow> for Store {
    fn from(row: StoreRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            code: row.code,
            hosts: row.hosts,
            default_currency: row.default_currency,
            is_default: row.is_default,
        }
    }
}

/// Repository for store lookups.
pub struct StoreRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> StoreRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// The store answering on `host`, else the default store.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn for_host(&self, host: &str) -> Result<Option<Store>, RepositoryError> {
        let row = sqlx::query_as::<_, StoreRow>(
            r"
            SELECT id, name, code, hosts, default_currency, is_default
            FROM storefront.store
            WHERE $1 = ANY(hosts) OR is_default
            ORDER BY ($1 = ANY(hosts)) DESC
            LIMIT 1
            ",
        )
        .bind(host)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Store::from))
    }

    /// Create a store; the first default store wins.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the code is taken.
    pub async fn create(
        &self,
        name: &str,
        code: &str,
        hosts: &[String],
        default_currency: Currency,
        is_default: bool,
    ) -> Result<Store, RepositoryError> {
        let row = sqlx::query_as::<_, StoreRow>(
            r"
            INSERT INTO storefront.store (name, code, hosts, default_currency, is_default)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, name, code, hosts, default_currency, is_default
            ",
        )
        .bind(name)
        .bind(code)
        .bind(hosts)
        .bind(default_currency)
        .bind(is_default)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::from_unique(e, "store"))?;

        Ok(row.into())
    }
}
