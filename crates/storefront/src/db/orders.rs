//! Order repository.
//!
//! Orders are read together with their line items. Writes that touch more
//! than one row (merging, saving cart contents) run in a transaction with
//! the affected orders locked.

use std::collections::HashMap;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgExecutor, PgPool};

use parcel_core::order::generate_number;
use parcel_core::{
    Currency, Email, LineItem, LineItemId, NewOrder, Order, OrderId, OrderState, PaymentState,
    StoreId, UserId, VariantId,
};

use super::RepositoryError;
use crate::services::current_order::{OrderParams, OrderStore};

/// Attempts at finding an unused order number.
const NUMBER_ATTEMPTS: usize = 5;

macro_rules! order_columns {
    () => {
        "id, number, guest_token, store_id, user_id, created_by_id, email, currency, state, \
         item_total, shipment_total, total, last_ip_address, completed_at, created_at, updated_at"
    };
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: OrderId,
    number: String,
    guest_token: Option<String>,
    store_id: StoreId,
    user_id: Option<UserId>,
    created_by_id: Option<UserId>,
    email: Option<String>,
    currency: Currency,
    state: OrderState,
    item_total: Decimal,
    shipment_total: Decimal,
    total: Decimal,
    last_ip_address: Option<String>,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self, line_items: Vec<LineItem>) -> Result<Order, RepositoryError> {
        let email = self
            .email
            .as_deref()
            .map(Email::parse_optional)
            .transpose()
            .map_err(|e| RepositoryError::DataCorruption(format!("invalid order email: {e}")))?
            .flatten();
        let last_ip_address = self
            .last_ip_address
            .as_deref()
            .map(str::parse::<IpAddr>)
            .transpose()
            .map_err(|e| RepositoryError::DataCorruption(format!("invalid order ip: {e}")))?;

        Ok(Order {
            id: Some(self.id),
            number: self.number,
            guest_token: self.guest_token,
            store_id: Some(self.store_id),
            user_id: self.user_id,
            created_by_id: self.created_by_id,
            email,
            currency: self.currency,
            state: self.state,
            line_items,
            item_total: self.item_total,
            shipment_total: self.shipment_total,
            total: self.total,
            last_ip_address,
            completed_at: self.completed_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct LineItemRow {
    id: LineItemId,
    order_id: OrderId,
    variant_id: VariantId,
    quantity: i32,
    price: Decimal,
}

/// `PostgreSQL`-backed [`OrderStore`].
#[derive(Clone, Copy)]
pub struct PgOrderStore<'a> {
    pool: &'a PgPool,
}

impl<'a> PgOrderStore<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Persist an order's line items and totals.
    ///
    /// Lines no longer on the order are deleted; the rest are inserted or
    /// have their quantity updated.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` for an unsaved order.
    pub async fn save_contents(&self, order: &Order) -> Result<Order, RepositoryError> {
        let id = order.id.ok_or(RepositoryError::NotFound)?;
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT id FROM storefront.order WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(RepositoryError::NotFound)?;

        write_contents(&mut tx, id, order).await?;
        let saved = fetch_locked(&mut tx, &[id])
            .await?
            .remove(&id)
            .ok_or(RepositoryError::NotFound)?;

        tx.commit().await?;
        Ok(saved)
    }

    /// Get an order by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(concat!(
            "SELECT ",
            order_columns!(),
            " FROM storefront.order WHERE id = $1"
        ))
        .bind(id)
        .fetch_all(self.pool)
        .await?;

        Ok(with_line_items(self.pool, rows).await?.into_iter().next())
    }

    /// Move an order to a checkout state.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order does not exist or has
    /// already completed.
    pub async fn set_state(&self, id: OrderId, state: OrderState) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE storefront.order
            SET state = $2, updated_at = NOW()
            WHERE id = $1 AND completed_at IS NULL
            ",
        )
        .bind(id)
        .bind(state)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

impl OrderStore for PgOrderStore<'_> {
    async fn find_incomplete(
        &self,
        params: &OrderParams,
    ) -> Result<Option<Order>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(concat!(
            "SELECT ",
            order_columns!(),
            r"
            FROM storefront.order
            WHERE completed_at IS NULL
              AND currency = $1
              AND guest_token IS NOT DISTINCT FROM $2
              AND store_id = $3
              AND user_id IS NOT DISTINCT FROM $4
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "
        ))
        .bind(params.currency)
        .bind(params.guest_token.as_deref())
        .bind(params.store_id)
        .bind(params.user_id)
        .fetch_all(self.pool)
        .await?;

        Ok(with_line_items(self.pool, rows).await?.into_iter().next())
    }

    async fn incomplete_for_user(
        &self,
        user_id: UserId,
        store_id: StoreId,
    ) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(concat!(
            "SELECT ",
            order_columns!(),
            r"
            FROM storefront.order
            WHERE completed_at IS NULL AND user_id = $1 AND store_id = $2
            ORDER BY created_at DESC, id DESC
            "
        ))
        .bind(user_id)
        .bind(store_id)
        .fetch_all(self.pool)
        .await?;

        with_line_items(self.pool, rows).await
    }

    async fn create(&self, new: NewOrder) -> Result<Order, RepositoryError> {
        let email = new.email.as_ref().map(Email::as_str);

        for _ in 0..NUMBER_ATTEMPTS {
            let result = sqlx::query_as::<_, OrderRow>(concat!(
                r"
                INSERT INTO storefront.order
                    (number, guest_token, store_id, user_id, created_by_id, email, currency)
                VALUES ($1, $2, $3, $4, $4, $5, $6)
                RETURNING ",
                order_columns!()
            ))
            .bind(generate_number())
            .bind(new.guest_token.as_deref())
            .bind(new.store_id)
            .bind(new.user_id)
            .bind(email)
            .bind(new.currency)
            .fetch_one(self.pool)
            .await;

            match result {
                Ok(row) => return row.into_order(Vec::new()),
                Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                    tracing::debug!("Order number collision, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(RepositoryError::Conflict(
            "could not allocate an order number".to_owned(),
        ))
    }

    async fn save_user(&self, order: &Order) -> Result<(), RepositoryError> {
        let id = order.id.ok_or(RepositoryError::NotFound)?;

        let result = sqlx::query(
            r"
            UPDATE storefront.order
            SET user_id = $2, email = $3, created_by_id = $4, updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(order.user_id)
        .bind(order.email.as_ref().map(Email::as_str))
        .bind(order.created_by_id)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn merge(
        &self,
        into: OrderId,
        other: OrderId,
        user: Option<UserId>,
    ) -> Result<Order, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let mut locked = fetch_locked(&mut tx, &[into, other]).await?;
        let mut target = locked.remove(&into).ok_or(RepositoryError::NotFound)?;
        let source = locked.remove(&other).ok_or(RepositoryError::NotFound)?;

        let state_before = target.state;
        target
            .merge(&source, user)
            .map_err(|e| RepositoryError::Conflict(e.to_string()))?;

        if target.state != state_before {
            restart_checkout(&mut tx, into).await?;
        }

        // Delete first so the source's lines don't collide with the upserts.
        sqlx::query("DELETE FROM storefront.order WHERE id = $1")
            .bind(other)
            .execute(&mut *tx)
            .await?;

        write_contents(&mut tx, into, &target).await?;

        sqlx::query(
            r"
            UPDATE storefront.order
            SET user_id = $2, created_by_id = $3, state = $4, updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(into)
        .bind(target.user_id)
        .bind(target.created_by_id)
        .bind(target.state)
        .execute(&mut *tx)
        .await?;

        let merged = fetch_locked(&mut tx, &[into])
            .await?
            .remove(&into)
            .ok_or(RepositoryError::NotFound)?;

        tx.commit().await?;
        Ok(merged)
    }

    async fn record_ip(&self, order_id: OrderId, ip: IpAddr) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE storefront.order SET last_ip_address = $2 WHERE id = $1")
            .bind(order_id)
            .bind(ip.to_string())
            .execute(self.pool)
            .await?;
        Ok(())
    }
}

/// Load and lock orders by id, with their line items.
async fn fetch_locked(
    tx: &mut sqlx::PgConnection,
    ids: &[OrderId],
) -> Result<HashMap<OrderId, Order>, RepositoryError> {
    let raw_ids: Vec<i32> = ids.iter().map(OrderId::as_i32).collect();

    let rows = sqlx::query_as::<_, OrderRow>(concat!(
        "SELECT ",
        order_columns!(),
        " FROM storefront.order WHERE id = ANY($1) ORDER BY id FOR UPDATE"
    ))
    .bind(&raw_ids)
    .fetch_all(&mut *tx)
    .await?;

    Ok(with_line_items(&mut *tx, rows)
        .await?
        .into_iter()
        .filter_map(|order| order.id.map(|id| (id, order)))
        .collect())
}

/// Drop an order's shipments (their rates and rate taxes cascade) and void
/// its checkout payments.
async fn restart_checkout(tx: &mut sqlx::PgConnection, id: OrderId) -> Result<(), RepositoryError> {
    let shipments = sqlx::query("DELETE FROM storefront.shipment WHERE order_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    let payments = sqlx::query(
        "UPDATE storefront.payment SET state = $2 WHERE order_id = $1 AND state = $3",
    )
    .bind(id)
    .bind(PaymentState::Void)
    .bind(PaymentState::Checkout)
    .execute(&mut *tx)
    .await?;

    tracing::debug!(
        order_id = %id,
        shipments = shipments.rows_affected(),
        payments = payments.rows_affected(),
        "Restarted checkout"
    );
    Ok(())
}

/// Replace an order's stored lines with `order`'s and update its totals.
async fn write_contents(
    tx: &mut sqlx::PgConnection,
    id: OrderId,
    order: &Order,
) -> Result<(), RepositoryError> {
    let variants: Vec<i32> = order
        .line_items
        .iter()
        .map(|item| item.variant_id.as_i32())
        .collect();

    sqlx::query(
        "DELETE FROM storefront.line_item WHERE order_id = $1 AND NOT (variant_id = ANY($2))",
    )
    .bind(id)
    .bind(&variants)
    .execute(&mut *tx)
    .await?;

    for item in &order.line_items {
        sqlx::query(
            r"
            INSERT INTO storefront.line_item (order_id, variant_id, quantity, price)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (order_id, variant_id) DO UPDATE SET quantity = EXCLUDED.quantity
            ",
        )
        .bind(id)
        .bind(item.variant_id)
        .bind(item.quantity)
        .bind(item.price)
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query(
        r"
        UPDATE storefront.order
        SET item_total = $2, shipment_total = $3, total = $4, updated_at = NOW()
        WHERE id = $1
        ",
    )
    .bind(id)
    .bind(order.item_total)
    .bind(order.shipment_total)
    .bind(order.total)
    .execute(&mut *tx)
    .await?;

    Ok(())
}

/// Attach line items to order rows, preserving row order.
async fn with_line_items<'e, E: PgExecutor<'e>>(
    executor: E,
    rows: Vec<OrderRow>,
) -> Result<Vec<Order>, RepositoryError> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<i32> = rows.iter().map(|row| row.id.as_i32()).collect();
    let items = sqlx::query_as::<_, LineItemRow>(
        r"
        SELECT id, order_id, variant_id, quantity, price
        FROM storefront.line_item
        WHERE order_id = ANY($1)
        ORDER BY id
        ",
    )
    .bind(&ids)
    .fetch_all(executor)
    .await?;

    let mut by_order: HashMap<OrderId, Vec<LineItem>> = HashMap::new();
    for item in items {
        by_order.entry(item.order_id).or_default().push(LineItem {
            id: Some(item.id),
            variant_id: item.variant_id,
            quantity: item.quantity,
            price: item.price,
        });
    }

    rows.into_iter()
        .map(|row| {
            let lines = by_order.remove(&row.id).unwrap_or_default();
            row.into_order(lines)
        })
        .collect()
}
