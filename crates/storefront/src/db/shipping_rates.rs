//! Shipment and shipping rate repository.
//!
//! Rates are read with their shipping method (soft-deleted methods
//! included, so old orders keep their names), the tax rate that applies to
//! them and the tax entries recorded for them.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use sqlx::PgPool;

use parcel_core::{
    Currency, OrderId, OrderState, ShipmentId, ShipmentRef, ShipmentState, ShippingMethod,
    ShippingMethodId, ShippingRate, ShippingRateId, ShippingRateTax, ShippingRateTaxId,
    TaxCategoryId, TaxRate, TaxRateId,
};

use super::RepositoryError;

#[derive(sqlx::FromRow)]
struct RateRow {
    id: ShippingRateId,
    cost: Decimal,
    selected: bool,
    shipment_id: ShipmentId,
    order_id: OrderId,
    shipment_number: String,
    currency: Currency,
    method_id: ShippingMethodId,
    method_name: String,
    method_code: Option<String>,
    method_tax_category_id: Option<TaxCategoryId>,
    method_deleted_at: Option<DateTime<Utc>>,
    tax_rate_id: Option<TaxRateId>,
    tax_rate_name: Option<String>,
    tax_rate_amount: Option<Decimal>,
    tax_rate_included: Option<bool>,
    tax_rate_show_in_label: Option<bool>,
    tax_rate_category_id: Option<TaxCategoryId>,
}

impl RateRow {
    fn into_rate(self, taxes: Vec<ShippingRateTax>) -> ShippingRate {
        let tax_rate = match (
            self.tax_rate_id,
            self.tax_rate_name,
            self.tax_rate_amount,
            self.tax_rate_included,
            self.tax_rate_show_in_label,
        ) {
            (Some(id), Some(name), Some(amount), Some(included), Some(show)) => Some(TaxRate {
                id,
                name,
                amount,
                included_in_price: included,
                show_rate_in_label: show,
                tax_category_id: self.tax_rate_category_id,
            }),
            _ => None,
        };

        ShippingRate {
            id: self.id,
            shipment: ShipmentRef {
                id: self.shipment_id,
                order_id: self.order_id,
                number: self.shipment_number,
                currency: self.currency,
            },
            shipping_method: ShippingMethod {
                id: self.method_id,
                name: self.method_name,
                code: self.method_code,
                tax_category_id: self.method_tax_category_id,
                deleted_at: self.method_deleted_at,
            },
            tax_rate,
            cost: self.cost,
            selected: self.selected,
            taxes,
        }
    }
}

#[derive(sqlx::FromRow)]
struct RateTaxRow {
    id: ShippingRateTaxId,
    shipping_rate_id: ShippingRateId,
    tax_rate_id: TaxRateId,
    amount: Decimal,
}

impl From<RateTaxRow> for ShippingRateTax {
    fn from(row: RateTaxRow) -> Self {
        Self {
            id: row.id,
            shipping_rate_id: row.shipping_rate_id,
            tax_rate_id: row.tax_rate_id,
            amount: row.amount,
        }
    }
}

#[derive(sqlx::FromRow)]
struct MethodRow {
    id: ShippingMethodId,
    flat_rate: Decimal,
    tax_rate_id: Option<TaxRateId>,
    tax_rate_name: Option<String>,
    tax_rate_amount: Option<Decimal>,
    tax_rate_included: Option<bool>,
    tax_rate_show_in_label: Option<bool>,
    tax_rate_category_id: Option<TaxCategoryId>,
}

impl MethodRow {
    fn tax_rate(&self) -> Option<TaxRate> {
        Some(TaxRate {
            id: self.tax_rate_id?,
            name: self.tax_rate_name.clone()?,
            amount: self.tax_rate_amount?,
            included_in_price: self.tax_rate_included?,
            show_rate_in_label: self.tax_rate_show_in_label?,
            tax_category_id: self.tax_rate_category_id,
        })
    }
}

/// A shipment of an order.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Shipment {
    pub id: ShipmentId,
    pub number: String,
    pub order_id: OrderId,
    pub state: ShipmentState,
    pub cost: Decimal,
}

/// Repository for shipments and their rates.
pub struct ShippingRateRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ShippingRateRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// An order's shipments.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn shipments(&self, order_id: OrderId) -> Result<Vec<Shipment>, RepositoryError> {
        Ok(sqlx::query_as::<_, Shipment>(
            r"
            SELECT id, number, order_id, state, cost
            FROM storefront.shipment
            WHERE order_id = $1
            ORDER BY id
            ",
        )
        .bind(order_id)
        .fetch_all(self.pool)
        .await?)
    }

    /// Start a shipment for an order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn create_shipment(&self, order_id: OrderId) -> Result<Shipment, RepositoryError> {
        let number = format!("H{:011}", rand::rng().random_range(0..100_000_000_000_u64));

        Ok(sqlx::query_as::<_, Shipment>(
            r"
            INSERT INTO storefront.shipment (number, order_id)
            VALUES ($1, $2)
            RETURNING id, number, order_id, state, cost
            ",
        )
        .bind(number)
        .bind(order_id)
        .fetch_one(self.pool)
        .await?)
    }

    /// All rates for an order's shipments, with methods, tax rates and taxes.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn for_order(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<ShippingRate>, RepositoryError> {
        let rows = sqlx::query_as::<_, RateRow>(
            r"
            SELECT sr.id, sr.cost, sr.selected,
                   s.id AS shipment_id, s.order_id, s.number AS shipment_number,
                   o.currency,
                   sm.id AS method_id, sm.name AS method_name, sm.code AS method_code,
                   sm.tax_category_id AS method_tax_category_id,
                   sm.deleted_at AS method_deleted_at,
                   tr.id AS tax_rate_id, tr.name AS tax_rate_name, tr.amount AS tax_rate_amount,
                   tr.included_in_price AS tax_rate_included,
                   tr.show_rate_in_label AS tax_rate_show_in_label,
                   tr.tax_category_id AS tax_rate_category_id
            FROM storefront.shipping_rate sr
            JOIN storefront.shipment s ON s.id = sr.shipment_id
            JOIN storefront.order o ON o.id = s.order_id
            JOIN storefront.shipping_method sm ON sm.id = sr.shipping_method_id
            LEFT JOIN storefront.tax_rate tr ON tr.id = sr.tax_rate_id
            WHERE s.order_id = $1
            ORDER BY s.id, sr.cost, sr.id
            ",
        )
        .bind(order_id)
        .fetch_all(self.pool)
        .await?;

        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let rate_ids: Vec<i32> = rows.iter().map(|row| row.id.as_i32()).collect();
        let taxes = sqlx::query_as::<_, RateTaxRow>(
            r"
            SELECT id, shipping_rate_id, tax_rate_id, amount
            FROM storefront.shipping_rate_tax
            WHERE shipping_rate_id = ANY($1)
            ORDER BY id
            ",
        )
        .bind(&rate_ids)
        .fetch_all(self.pool)
        .await?;

        let mut by_rate: HashMap<ShippingRateId, Vec<ShippingRateTax>> = HashMap::new();
        for tax in taxes {
            by_rate
                .entry(tax.shipping_rate_id)
                .or_default()
                .push(tax.into());
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let taxes = by_rate.remove(&row.id).unwrap_or_default();
                row.into_rate(taxes)
            })
            .collect())
    }

    /// Re-quote a shipment: drop its rates and add one per active shipping
    /// method, selecting the cheapest.
    ///
    /// Each rate is taxed by the first tax rate in its method's tax category
    /// and records the tax it carries.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a write fails.
    pub async fn refresh_rates(&self, shipment_id: ShipmentId) -> Result<usize, RepositoryError> {
        let methods = sqlx::query_as::<_, MethodRow>(
            r"
            SELECT sm.id, sm.flat_rate,
                   tr.id AS tax_rate_id, tr.name AS tax_rate_name, tr.amount AS tax_rate_amount,
                   tr.included_in_price AS tax_rate_included,
                   tr.show_rate_in_label AS tax_rate_show_in_label,
                   tr.tax_category_id AS tax_rate_category_id
            FROM storefront.shipping_method sm
            LEFT JOIN LATERAL (
                SELECT * FROM storefront.tax_rate t
                WHERE t.tax_category_id = sm.tax_category_id
                ORDER BY t.id
                LIMIT 1
            ) tr ON TRUE
            WHERE sm.deleted_at IS NULL
            ORDER BY sm.flat_rate, sm.id
            ",
        )
        .fetch_all(self.pool)
        .await?;

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM storefront.shipping_rate WHERE shipment_id = $1")
            .bind(shipment_id)
            .execute(&mut *tx)
            .await?;

        for (index, method) in methods.iter().enumerate() {
            let tax_rate = method.tax_rate();
            let rate_id: ShippingRateId = sqlx::query_scalar(
                r"
                INSERT INTO storefront.shipping_rate
                    (shipment_id, shipping_method_id, tax_rate_id, cost, selected)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id
                ",
            )
            .bind(shipment_id)
            .bind(method.id)
            .bind(tax_rate.as_ref().map(|rate| rate.id))
            .bind(method.flat_rate)
            .bind(index == 0)
            .fetch_one(&mut *tx)
            .await?;

            if let Some(rate) = tax_rate {
                let amount = rate.compute_shipping_rate(method.flat_rate);
                if !amount.is_zero() {
                    sqlx::query(
                        r"
                        INSERT INTO storefront.shipping_rate_tax (shipping_rate_id, tax_rate_id, amount)
                        VALUES ($1, $2, $3)
                        ",
                    )
                    .bind(rate_id)
                    .bind(rate.id)
                    .bind(amount)
                    .execute(&mut *tx)
                    .await?;
                }
            }
        }

        if let Some(cheapest) = methods.first() {
            update_shipment_cost(&mut tx, shipment_id, cheapest.flat_rate).await?;
        }

        tx.commit().await?;
        tracing::debug!(
            shipment_id = %shipment_id,
            rates = methods.len(),
            "Refreshed shipping rates"
        );
        Ok(methods.len())
    }

    /// Select one of an order's rates for its shipment.
    ///
    /// The shipment takes the rate's cost and the order's totals follow.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the rate does not belong to the order.
    pub async fn select_rate(
        &self,
        order_id: OrderId,
        rate_id: ShippingRateId,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let (shipment_id, cost): (ShipmentId, Decimal) = sqlx::query_as(
            r"
            SELECT sr.shipment_id, sr.cost
            FROM storefront.shipping_rate sr
            JOIN storefront.shipment s ON s.id = sr.shipment_id
            WHERE sr.id = $1 AND s.order_id = $2
            FOR UPDATE OF s
            ",
        )
        .bind(rate_id)
        .bind(order_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        // One selected rate per shipment (partial unique index)
        sqlx::query(
            "UPDATE storefront.shipping_rate SET selected = FALSE WHERE shipment_id = $1 AND selected",
        )
        .bind(shipment_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE storefront.shipping_rate SET selected = TRUE WHERE id = $1")
            .bind(rate_id)
            .execute(&mut *tx)
            .await?;

        update_shipment_cost(&mut tx, shipment_id, cost).await?;

        sqlx::query(
            r"
            UPDATE storefront.order
            SET state = $2, updated_at = NOW()
            WHERE id = $1 AND state = $3
            ",
        )
        .bind(order_id)
        .bind(OrderState::Payment)
        .bind(OrderState::Delivery)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Remove all of a shipment's rates; their tax entries go with them.
    ///
    /// The shipment's cost drops to zero and the order's totals follow.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the delete fails.
    pub async fn delete_for_shipment(
        &self,
        shipment_id: ShipmentId,
    ) -> Result<u64, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("DELETE FROM storefront.shipping_rate WHERE shipment_id = $1")
            .bind(shipment_id)
            .execute(&mut *tx)
            .await?;
        update_shipment_cost(&mut tx, shipment_id, Decimal::ZERO).await?;

        tx.commit().await?;
        Ok(result.rows_affected())
    }
}

/// Set a shipment's cost and recompute its order's shipment and grand totals.
async fn update_shipment_cost(
    tx: &mut sqlx::PgConnection,
    shipment_id: ShipmentId,
    cost: Decimal,
) -> Result<(), RepositoryError> {
    sqlx::query("UPDATE storefront.shipment SET cost = $2 WHERE id = $1")
        .bind(shipment_id)
        .bind(cost)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        r"
        UPDATE storefront.order o
        SET shipment_total = totals.shipment_total,
            total = o.item_total + totals.shipment_total,
            updated_at = NOW()
        FROM (
            SELECT order_id, SUM(cost) AS shipment_total
            FROM storefront.shipment
            WHERE order_id = (SELECT order_id FROM storefront.shipment WHERE id = $1)
            GROUP BY order_id
        ) totals
        WHERE o.id = totals.order_id
        ",
    )
    .bind(shipment_id)
    .execute(&mut *tx)
    .await?;

    Ok(())
}
