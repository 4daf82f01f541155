//! Seed the storefront database with a runnable catalog.
//!
//! Creates a default store, a few variants, a sales tax, two shipping
//! methods and a card payment method. Running it again leaves existing rows
//! alone.
//!
//! # Usage
//!
//! ```bash
//! parcel-cli seed --host localhost --currency USD
//! ```

use rust_decimal::Decimal;
use sqlx::PgPool;

use parcel_core::{Currency, TaxCategoryId};
use parcel_storefront::db::RepositoryError;
use parcel_storefront::db::payments::PaymentRepository;
use parcel_storefront::db::stores::StoreRepository;
use parcel_storefront::db::variants::VariantRepository;

use super::{CliError, connect};

/// Name of the seeded shipping tax category.
const SHIPPING_TAX_CATEGORY: &str = "Shipping";

/// Name of the seeded card payment method.
const CARD_PAYMENT_METHOD: &str = "Credit Card";

/// Seed the database.
///
/// # Errors
///
/// Returns `CliError` if the currency is unknown or a write fails.
pub async fn run(host: &str, currency: &str) -> Result<(), CliError> {
    let currency: Currency = currency
        .parse()
        .map_err(|e| CliError::InvalidArgument(format!("currency: {e}")))?;
    let pool = connect().await?;

    seed_store(&pool, host, currency).await?;
    seed_variants(&pool, currency).await?;
    let tax_category = seed_tax(&pool).await?;
    seed_shipping_methods(&pool, tax_category).await?;
    seed_payment_method(&pool).await?;

    tracing::info!("Seeding complete!");
    Ok(())
}

async fn seed_store(pool: &PgPool, host: &str, currency: Currency) -> Result<(), CliError> {
    match StoreRepository::new(pool)
        .create("Parcel", "default", &[host.to_owned()], currency, true)
        .await
    {
        Ok(store) => tracing::info!(store_id = %store.id, host, "Created default store"),
        Err(RepositoryError::Conflict(_)) => tracing::info!("Default store already exists"),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

async fn seed_variants(pool: &PgPool, currency: Currency) -> Result<(), CliError> {
    let variants = VariantRepository::new(pool);
    for (sku, name, cents) in [
        ("TEE-BLK-M", "Black Tee (M)", 2_500),
        ("TEE-WHT-M", "White Tee (M)", 2_500),
        ("MUG-001", "Enamel Mug", 1_800),
    ] {
        let variant = variants
            .upsert(sku, name, Decimal::new(cents, 2), currency)
            .await?;
        tracing::info!(variant_id = %variant.id, sku, "Seeded variant");
    }
    Ok(())
}

async fn seed_tax(pool: &PgPool) -> Result<TaxCategoryId, CliError> {
    let category: TaxCategoryId = sqlx::query_scalar(
        r"
        INSERT INTO storefront.tax_category (name)
        VALUES ($1)
        ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
        RETURNING id
        ",
    )
    .bind(SHIPPING_TAX_CATEGORY)
    .fetch_one(pool)
    .await?;

    sqlx::query(
        r"
        INSERT INTO storefront.tax_rate (name, amount, included_in_price, show_rate_in_label, tax_category_id)
        SELECT 'Sales Tax', 0.08, FALSE, TRUE, $1
        WHERE NOT EXISTS (
            SELECT 1 FROM storefront.tax_rate WHERE tax_category_id = $1
        )
        ",
    )
    .bind(category)
    .execute(pool)
    .await?;

    tracing::info!(tax_category_id = %category, "Seeded shipping tax");
    Ok(category)
}

async fn seed_shipping_methods(pool: &PgPool, tax_category: TaxCategoryId) -> Result<(), CliError> {
    for (name, code, cents) in [("Standard", "standard", 500), ("Express", "express", 1_500)] {
        sqlx::query(
            r"
            INSERT INTO storefront.shipping_method (name, code, flat_rate, tax_category_id)
            SELECT $1, $2, $3, $4
            WHERE NOT EXISTS (
                SELECT 1 FROM storefront.shipping_method WHERE code = $2 AND deleted_at IS NULL
            )
            ",
        )
        .bind(name)
        .bind(code)
        .bind(Decimal::new(cents, 2))
        .bind(tax_category)
        .execute(pool)
        .await?;
        tracing::info!(code, "Seeded shipping method");
    }
    Ok(())
}

async fn seed_payment_method(pool: &PgPool) -> Result<(), CliError> {
    let payments = PaymentRepository::new(pool);
    if payments
        .active_methods()
        .await?
        .iter()
        .any(|method| method.name == CARD_PAYMENT_METHOD)
    {
        tracing::info!("Payment method already exists");
        return Ok(());
    }

    let method = payments.create_method(CARD_PAYMENT_METHOD).await?;
    tracing::info!(payment_method_id = %method.id, "Created payment method");
    Ok(())
}
