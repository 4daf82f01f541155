//! Cart route handlers.
//!
//! The cart is the shopper's current order. Reads never create one; the
//! first add-to-cart does. Any change to the cart re-quotes its shipments
//! and sends checkout back to the cart step.

use axum::{Json, extract::State};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use parcel_core::{Currency, LineItem, Money, Order, OrderState, VariantId};

use crate::db::PgOrderStore;
use crate::db::shipping_rates::ShippingRateRepository;
use crate::db::variants::VariantRepository;
use crate::error::{AppError, Result};
use crate::services::{CurrentOrder, OrderContext};
use crate::state::AppState;

// =============================================================================
// Request Types
// =============================================================================

/// Add-to-cart request.
#[derive(Debug, Deserialize)]
pub struct AddToCartRequest {
    pub variant_id: VariantId,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
}

const fn default_quantity() -> i32 {
    1
}

/// Quantity change request; zero removes the line.
#[derive(Debug, Deserialize)]
pub struct UpdateCartRequest {
    pub variant_id: VariantId,
    pub quantity: i32,
}

/// Line removal request.
#[derive(Debug, Deserialize)]
pub struct RemoveFromCartRequest {
    pub variant_id: VariantId,
}

// =============================================================================
// Views
// =============================================================================

/// A cart line as rendered to clients.
#[derive(Debug, Clone, Serialize)]
pub struct LineItemView {
    pub variant_id: VariantId,
    pub quantity: i32,
    pub price: Decimal,
    pub amount: Decimal,
    pub display_amount: String,
}

impl LineItemView {
    fn new(item: &LineItem, currency: Currency) -> Self {
        let amount = item.amount();
        Self {
            variant_id: item.variant_id,
            quantity: item.quantity,
            price: item.price,
            amount,
            display_amount: Money::new(amount, currency).to_string(),
        }
    }
}

/// An order as rendered to clients.
///
/// `number` is absent for an empty, unsaved cart.
#[derive(Debug, Clone, Serialize)]
pub struct OrderView {
    pub number: Option<String>,
    pub state: OrderState,
    pub currency: Currency,
    pub item_count: i32,
    pub line_items: Vec<LineItemView>,
    pub item_total: Decimal,
    pub shipment_total: Decimal,
    pub total: Decimal,
    pub display_item_total: String,
    pub display_total: String,
}

impl From<&Order> for OrderView {
    fn from(order: &Order) -> Self {
        Self {
            number: order.is_persisted().then(|| order.number.clone()),
            state: order.state,
            currency: order.currency,
            item_count: order.item_count(),
            line_items: order
                .line_items
                .iter()
                .map(|item| LineItemView::new(item, order.currency))
                .collect(),
            item_total: order.item_total,
            shipment_total: order.shipment_total,
            total: order.total,
            display_item_total: order.display_item_total().to_string(),
            display_total: order.display_total().to_string(),
        }
    }
}

/// Item count badge.
#[derive(Debug, Serialize)]
pub struct CartCount {
    pub count: i32,
}

// =============================================================================
// Helpers
// =============================================================================

/// Persist a changed cart.
///
/// Shipments are re-quoted (or cleared, for an empty cart) and an order
/// already in checkout goes back to the cart step.
async fn save_cart(state: &AppState, store: &PgOrderStore<'_>, order: &Order) -> Result<Order> {
    let saved = store.save_contents(order).await?;
    let Some(id) = saved.id else {
        return Ok(saved);
    };

    let rates = ShippingRateRepository::new(state.pool());
    let shipments = rates.shipments(id).await?;
    for shipment in &shipments {
        if saved.line_items.is_empty() {
            rates.delete_for_shipment(shipment.id).await?;
        } else {
            rates.refresh_rates(shipment.id).await?;
        }
    }

    let restart_checkout = saved.state != OrderState::Cart;
    if restart_checkout {
        store.set_state(id, OrderState::Cart).await?;
    }

    if shipments.is_empty() && !restart_checkout {
        return Ok(saved);
    }
    store
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Order not found".to_owned()))
}

/// The current order for a cart change that needs an existing cart.
async fn existing_cart(current: &mut CurrentOrder<'_, PgOrderStore<'_>>) -> Result<Order> {
    current
        .current_order(false)
        .await?
        .ok_or_else(|| AppError::NotFound("No cart".to_owned()))
}

// =============================================================================
// Handlers
// =============================================================================

/// Show the cart.
#[instrument(skip(state))]
pub async fn show(State(state): State<AppState>, ctx: OrderContext) -> Result<Json<OrderView>> {
    let store = PgOrderStore::new(state.pool());
    let mut current = CurrentOrder::new(&store, ctx);

    let order = current.simple_current_order().await?;
    Ok(Json(OrderView::from(&order)))
}

/// Item count for the cart badge.
#[instrument(skip(state))]
pub async fn count(State(state): State<AppState>, ctx: OrderContext) -> Result<Json<CartCount>> {
    let store = PgOrderStore::new(state.pool());
    let mut current = CurrentOrder::new(&store, ctx);

    let order = current.simple_current_order().await?;
    Ok(Json(CartCount {
        count: order.item_count(),
    }))
}

/// Add a variant to the cart, creating the cart if necessary.
#[instrument(skip(state))]
pub async fn add(
    State(state): State<AppState>,
    ctx: OrderContext,
    Json(request): Json<AddToCartRequest>,
) -> Result<Json<OrderView>> {
    let variant = VariantRepository::new(state.pool())
        .get(request.variant_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Variant not found".to_owned()))?;

    let store = PgOrderStore::new(state.pool());
    let mut current = CurrentOrder::new(&store, ctx);

    if variant.currency != current.current_currency() {
        return Err(AppError::BadRequest(format!(
            "variant is priced in {}",
            variant.currency
        )));
    }

    let mut order = current
        .current_order(true)
        .await?
        .ok_or_else(|| AppError::Internal("order was not created".to_owned()))?;
    order.add_item(variant.id, request.quantity, variant.price)?;

    let saved = save_cart(&state, &store, &order).await?;
    tracing::info!(
        number = %saved.number,
        variant_id = %variant.id,
        quantity = request.quantity,
        "Added to cart"
    );

    current.replace(saved.clone());
    Ok(Json(OrderView::from(&saved)))
}

/// Change a line's quantity.
#[instrument(skip(state))]
pub async fn update(
    State(state): State<AppState>,
    ctx: OrderContext,
    Json(request): Json<UpdateCartRequest>,
) -> Result<Json<OrderView>> {
    let store = PgOrderStore::new(state.pool());
    let mut current = CurrentOrder::new(&store, ctx);

    let mut order = existing_cart(&mut current).await?;
    if !order.set_quantity(request.variant_id, request.quantity)? {
        return Err(AppError::NotFound("Line item not found".to_owned()));
    }

    let saved = save_cart(&state, &store, &order).await?;
    current.replace(saved.clone());
    Ok(Json(OrderView::from(&saved)))
}

/// Remove a line from the cart.
#[instrument(skip(state))]
pub async fn remove(
    State(state): State<AppState>,
    ctx: OrderContext,
    Json(request): Json<RemoveFromCartRequest>,
) -> Result<Json<OrderView>> {
    let store = PgOrderStore::new(state.pool());
    let mut current = CurrentOrder::new(&store, ctx);

    let mut order = existing_cart(&mut current).await?;
    if !order.set_quantity(request.variant_id, 0)? {
        return Err(AppError::NotFound("Line item not found".to_owned()));
    }

    let saved = save_cart(&state, &store, &order).await?;
    current.replace(saved.clone());
    Ok(Json(OrderView::from(&saved)))
}
