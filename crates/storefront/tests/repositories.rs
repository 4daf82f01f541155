//! Database tests for the order and shipping rate repositories.
//!
//! These tests require a `PostgreSQL` server reachable through
//! `DATABASE_URL`; each test gets a fresh database with the storefront
//! migrations applied.
//!
//! Run with: cargo test -p parcel-storefront --test repositories -- --ignored

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use rust_decimal::Decimal;
use sqlx::PgPool;

use parcel_core::{
    Currency, Email, Locale, NewOrder, Order, OrderState, PaymentState, ShippingMethodId, StoreId,
    TaxCategoryId, UserId, VariantId,
};
use parcel_storefront::db::payments::PaymentRepository;
use parcel_storefront::db::shipping_rates::ShippingRateRepository;
use parcel_storefront::db::stores::StoreRepository;
use parcel_storefront::db::users::UserRepository;
use parcel_storefront::db::variants::VariantRepository;
use parcel_storefront::db::{PgOrderStore, RepositoryError};
use parcel_storefront::services::current_order::{OrderParams, OrderStore};

const TOKEN: &str = "guest-token-abc";

// ============================================================================
// Fixtures
// ============================================================================

async fn store(pool: &PgPool) -> StoreId {
    StoreRepository::new(pool)
        .create("Test", "test", &["localhost".to_owned()], Currency::USD, true)
        .await
        .unwrap()
        .id
}

async fn user(pool: &PgPool, email: &str) -> UserId {
    UserRepository::new(pool)
        .create_with_password(&Email::parse(email).unwrap(), "not-a-real-hash")
        .await
        .unwrap()
        .id
}

async fn variant(pool: &PgPool, sku: &str, cents: i64) -> VariantId {
    VariantRepository::new(pool)
        .upsert(sku, sku, Decimal::new(cents, 2), Currency::USD)
        .await
        .unwrap()
        .id
}

/// Standard (5.00) and Express (15.00) shipping, taxed at 10%.
async fn shipping_methods(pool: &PgPool) -> (ShippingMethodId, ShippingMethodId) {
    let category: TaxCategoryId = sqlx::query_scalar(
        "INSERT INTO storefront.tax_category (name) VALUES ('Shipping') RETURNING id",
    )
    .fetch_one(pool)
    .await
    .unwrap();

    sqlx::query(
        r"
        INSERT INTO storefront.tax_rate (name, amount, included_in_price, show_rate_in_label, tax_category_id)
        VALUES ('Sales Tax', 0.1, FALSE, TRUE, $1)
        ",
    )
    .bind(category)
    .execute(pool)
    .await
    .unwrap();

    let mut ids = Vec::new();
    for (name, cents) in [("Standard", 500), ("Express", 1_500)] {
        let id: ShippingMethodId = sqlx::query_scalar(
            r"
            INSERT INTO storefront.shipping_method (name, code, flat_rate, tax_category_id)
            VALUES ($1, LOWER($1), $2, $3)
            RETURNING id
            ",
        )
        .bind(name)
        .bind(Decimal::new(cents, 2))
        .bind(category)
        .fetch_one(pool)
        .await
        .unwrap();
        ids.push(id);
    }
    (ids[0], ids[1])
}

async fn order(
    orders: &PgOrderStore<'_>,
    store_id: StoreId,
    guest_token: Option<&str>,
    user_id: Option<UserId>,
) -> Order {
    orders
        .create(NewOrder {
            currency: Currency::USD,
            guest_token: guest_token.map(str::to_owned),
            store_id,
            user_id,
            email: None,
        })
        .await
        .unwrap()
}

async fn with_items(
    orders: &PgOrderStore<'_>,
    mut order: Order,
    items: &[(VariantId, i32, i64)],
) -> Order {
    for &(variant_id, quantity, cents) in items {
        order
            .add_item(variant_id, quantity, Decimal::new(cents, 2))
            .unwrap();
    }
    orders.save_contents(&order).await.unwrap()
}

async fn rate_tax_count(pool: &PgPool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM storefront.shipping_rate_tax")
        .fetch_one(pool)
        .await
        .unwrap()
}

// ============================================================================
// Current order lookup
// ============================================================================

#[sqlx::test(migrations = "./migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_find_incomplete_matches_absent_user_and_token(pool: PgPool) {
    let store_id = store(&pool).await;
    let user_id = user(&pool, "shopper@example.com").await;
    let orders = PgOrderStore::new(&pool);

    let guest = order(&orders, store_id, Some(TOKEN), None).await;
    let account = order(&orders, store_id, None, Some(user_id)).await;

    let params = |guest_token: Option<&str>, user_id: Option<UserId>| OrderParams {
        currency: Currency::USD,
        guest_token: guest_token.map(str::to_owned),
        store_id,
        user_id,
    };

    let found = orders.find_incomplete(&params(Some(TOKEN), None)).await.unwrap();
    assert_eq!(found.unwrap().id, guest.id);

    let found = orders.find_incomplete(&params(None, Some(user_id))).await.unwrap();
    assert_eq!(found.unwrap().id, account.id);

    // An absent user or token matches only orders without one
    assert!(
        orders
            .find_incomplete(&params(Some(TOKEN), Some(user_id)))
            .await
            .unwrap()
            .is_none()
    );
    assert!(orders.find_incomplete(&params(None, None)).await.unwrap().is_none());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_find_incomplete_skips_other_currency_and_completed(pool: PgPool) {
    let store_id = store(&pool).await;
    let orders = PgOrderStore::new(&pool);

    let completed = order(&orders, store_id, Some(TOKEN), None).await;
    sqlx::query("UPDATE storefront.order SET completed_at = NOW(), state = 'complete' WHERE id = $1")
        .bind(completed.id.unwrap())
        .execute(&pool)
        .await
        .unwrap();

    let params = OrderParams {
        currency: Currency::EUR,
        guest_token: Some(TOKEN.to_owned()),
        store_id,
        user_id: None,
    };
    assert!(orders.find_incomplete(&params).await.unwrap().is_none());

    let params = OrderParams {
        currency: Currency::USD,
        ..params
    };
    assert!(orders.find_incomplete(&params).await.unwrap().is_none());
}

// ============================================================================
// Merging
// ============================================================================

#[sqlx::test(migrations = "./migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_merge_folds_lines_and_deletes_source(pool: PgPool) {
    let store_id = store(&pool).await;
    let user_id = user(&pool, "shopper@example.com").await;
    let tee = variant(&pool, "TEE", 2_500).await;
    let mug = variant(&pool, "MUG", 1_800).await;
    let orders = PgOrderStore::new(&pool);

    let guest = order(&orders, store_id, Some(TOKEN), None).await;
    let guest = with_items(&orders, guest, &[(tee, 1, 2_500)]).await;
    let previous = order(&orders, store_id, None, Some(user_id)).await;
    let previous = with_items(&orders, previous, &[(tee, 2, 2_500), (mug, 1, 1_800)]).await;

    let merged = orders
        .merge(guest.id.unwrap(), previous.id.unwrap(), Some(user_id))
        .await
        .unwrap();

    assert_eq!(merged.user_id, Some(user_id));
    assert_eq!(merged.created_by_id, Some(user_id));
    assert_eq!(merged.item_count(), 4);
    assert_eq!(merged.line_items.len(), 2);
    assert_eq!(merged.item_total, Decimal::new(9_300, 2));
    assert_eq!(merged.total, Decimal::new(9_300, 2));
    assert!(orders.get(previous.id.unwrap()).await.unwrap().is_none());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_merge_sends_checkout_back_to_cart(pool: PgPool) {
    let store_id = store(&pool).await;
    let user_id = user(&pool, "shopper@example.com").await;
    let tee = variant(&pool, "TEE", 1_000).await;
    let mug = variant(&pool, "MUG", 2_000).await;
    shipping_methods(&pool).await;
    let orders = PgOrderStore::new(&pool);
    let rates = ShippingRateRepository::new(&pool);

    let guest = order(&orders, store_id, Some(TOKEN), None).await;
    let guest = with_items(&orders, guest, &[(tee, 1, 1_000)]).await;
    let guest_id = guest.id.unwrap();
    let shipment = rates.create_shipment(guest_id).await.unwrap();
    rates.refresh_rates(shipment.id).await.unwrap();
    orders.set_state(guest_id, OrderState::Payment).await.unwrap();

    let payments = PaymentRepository::new(&pool);
    let method = payments.create_method("Credit Card").await.unwrap();
    let payment = payments
        .create(guest_id, method.id, Decimal::new(1_500, 2))
        .await
        .unwrap();

    let priced = orders.get(guest_id).await.unwrap().unwrap();
    assert_eq!(priced.shipment_total, Decimal::new(500, 2));

    let previous = order(&orders, store_id, None, Some(user_id)).await;
    let previous = with_items(&orders, previous, &[(mug, 3, 2_000)]).await;

    let merged = orders
        .merge(guest_id, previous.id.unwrap(), Some(user_id))
        .await
        .unwrap();

    assert_eq!(merged.state, OrderState::Cart);
    assert_eq!(merged.item_count(), 4);
    assert_eq!(merged.shipment_total, Decimal::ZERO);
    assert_eq!(merged.total, Decimal::new(7_000, 2));
    assert!(rates.shipments(guest_id).await.unwrap().is_empty());
    assert!(rates.for_order(guest_id).await.unwrap().is_empty());
    assert_eq!(rate_tax_count(&pool).await, 0);

    let state: PaymentState =
        sqlx::query_scalar("SELECT state FROM storefront.payment WHERE id = $1")
            .bind(payment.id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(state, PaymentState::Void);
}

// ============================================================================
// Shipping rates
// ============================================================================

#[sqlx::test(migrations = "./migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_refresh_rates_selects_cheapest_with_taxes(pool: PgPool) {
    let store_id = store(&pool).await;
    let tee = variant(&pool, "TEE", 1_000).await;
    let (standard, _) = shipping_methods(&pool).await;
    let orders = PgOrderStore::new(&pool);
    let rates = ShippingRateRepository::new(&pool);

    let cart = order(&orders, store_id, Some(TOKEN), None).await;
    let cart = with_items(&orders, cart, &[(tee, 1, 1_000)]).await;
    let order_id = cart.id.unwrap();
    let shipment = rates.create_shipment(order_id).await.unwrap();

    assert_eq!(rates.refresh_rates(shipment.id).await.unwrap(), 2);

    let quoted = rates.for_order(order_id).await.unwrap();
    assert_eq!(quoted.len(), 2);
    let selected: Vec<_> = quoted.iter().filter(|rate| rate.selected).collect();
    assert_eq!(selected.len(), 1);
    assert_eq!(selected[0].shipping_method.id, standard);
    assert_eq!(selected[0].tax_total(), Decimal::new(50, 2));
    assert_eq!(
        selected[0].display_price(Locale::En),
        "$5.00 (+ $0.50 Sales Tax)"
    );
    assert_eq!(rate_tax_count(&pool).await, 2);

    let order = orders.get(order_id).await.unwrap().unwrap();
    assert_eq!(order.shipment_total, Decimal::new(500, 2));
    assert_eq!(order.total, Decimal::new(1_500, 2));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_select_rate_moves_selection_and_totals(pool: PgPool) {
    let store_id = store(&pool).await;
    let tee = variant(&pool, "TEE", 1_000).await;
    let (_, express) = shipping_methods(&pool).await;
    let orders = PgOrderStore::new(&pool);
    let rates = ShippingRateRepository::new(&pool);

    let cart = order(&orders, store_id, Some(TOKEN), None).await;
    let cart = with_items(&orders, cart, &[(tee, 1, 1_000)]).await;
    let order_id = cart.id.unwrap();
    let shipment = rates.create_shipment(order_id).await.unwrap();
    rates.refresh_rates(shipment.id).await.unwrap();
    orders.set_state(order_id, OrderState::Delivery).await.unwrap();

    let express_rate = rates
        .for_order(order_id)
        .await
        .unwrap()
        .into_iter()
        .find(|rate| rate.shipping_method.id == express)
        .unwrap();

    rates.select_rate(order_id, express_rate.id).await.unwrap();

    let quoted = rates.for_order(order_id).await.unwrap();
    let selected: Vec<_> = quoted.iter().filter(|rate| rate.selected).collect();
    assert_eq!(selected.len(), 1);
    assert_eq!(selected[0].id, express_rate.id);

    let order = orders.get(order_id).await.unwrap().unwrap();
    assert_eq!(order.state, OrderState::Payment);
    assert_eq!(order.shipment_total, Decimal::new(1_500, 2));
    assert_eq!(order.total, Decimal::new(2_500, 2));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_select_rate_of_another_order_is_not_found(pool: PgPool) {
    let store_id = store(&pool).await;
    shipping_methods(&pool).await;
    let orders = PgOrderStore::new(&pool);
    let rates = ShippingRateRepository::new(&pool);

    let mine = order(&orders, store_id, Some(TOKEN), None).await;
    let theirs = order(&orders, store_id, Some("someone-else"), None).await;
    let shipment = rates.create_shipment(theirs.id.unwrap()).await.unwrap();
    rates.refresh_rates(shipment.id).await.unwrap();
    let their_rate = rates.for_order(theirs.id.unwrap()).await.unwrap()[0].id;

    assert!(matches!(
        rates.select_rate(mine.id.unwrap(), their_rate).await,
        Err(RepositoryError::NotFound)
    ));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_delete_for_shipment_cascades_taxes_and_zeroes_cost(pool: PgPool) {
    let store_id = store(&pool).await;
    let tee = variant(&pool, "TEE", 1_000).await;
    shipping_methods(&pool).await;
    let orders = PgOrderStore::new(&pool);
    let rates = ShippingRateRepository::new(&pool);

    let cart = order(&orders, store_id, Some(TOKEN), None).await;
    let cart = with_items(&orders, cart, &[(tee, 1, 1_000)]).await;
    let order_id = cart.id.unwrap();
    let shipment = rates.create_shipment(order_id).await.unwrap();
    rates.refresh_rates(shipment.id).await.unwrap();
    assert_eq!(rate_tax_count(&pool).await, 2);

    assert_eq!(rates.delete_for_shipment(shipment.id).await.unwrap(), 2);

    assert!(rates.for_order(order_id).await.unwrap().is_empty());
    assert_eq!(rate_tax_count(&pool).await, 0);
    let order = orders.get(order_id).await.unwrap().unwrap();
    assert_eq!(order.shipment_total, Decimal::ZERO);
    assert_eq!(order.total, Decimal::new(1_000, 2));
    assert_eq!(rates.shipments(order_id).await.unwrap()[0].cost, Decimal::ZERO);
}
