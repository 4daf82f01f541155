//! Checkout route handlers.
//!
//! Checkout walks the current order through delivery (choosing a shipping
//! rate) and payment. Card data posted with the payment step is parked in
//! the session and never reaches the payments table.

use axum::{Json, extract::State};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;

use parcel_core::{
    Locale, Money, Order, OrderId, OrderState, ShipmentState, ShippingRate, ShippingRateId,
};

use crate::db::PgOrderStore;
use crate::db::payments::{Payment, PaymentMethod, PaymentRepository};
use crate::db::shipping_rates::{Shipment, ShippingRateRepository};
use crate::error::{AppError, Result};
use crate::routes::cart::OrderView;
use crate::services::payment::{
    CheckoutParams, persist_sensitive_payment_details, strip_sensitive_attributes,
};
use crate::services::{CurrentOrder, OrderContext};
use crate::state::AppState;

// =============================================================================
// Views
// =============================================================================

/// A shipping option as shown to the shopper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShippingRateView {
    pub id: ShippingRateId,
    pub name: String,
    pub code: Option<String>,
    pub cost: Decimal,
    pub tax_total: Decimal,
    pub selected: bool,
    pub display_price: String,
}

impl ShippingRateView {
    fn new(rate: &ShippingRate, locale: Locale) -> Self {
        Self {
            id: rate.id,
            name: rate.name().to_owned(),
            code: rate.shipping_method_code().map(str::to_owned),
            cost: rate.cost,
            tax_total: rate.tax_total(),
            selected: rate.selected,
            display_price: rate.display_price(locale),
        }
    }
}

/// A shipment and its shipping options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShipmentView {
    pub number: String,
    pub state: ShipmentState,
    pub cost: Decimal,
    pub display_cost: String,
    pub rates: Vec<ShippingRateView>,
}

/// Checkout page data.
#[derive(Debug, Serialize)]
pub struct CheckoutView {
    pub order: OrderView,
    pub shipments: Vec<ShipmentView>,
    pub payment_methods: Vec<PaymentMethod>,
}

/// Result of the payment step.
#[derive(Debug, Serialize)]
pub struct PaymentView {
    pub order: OrderView,
    pub payments: Vec<Payment>,
}

/// Delivery step request.
#[derive(Debug, Deserialize)]
pub struct SelectRateRequest {
    pub shipping_rate_id: ShippingRateId,
}

/// Pair each shipment with its rates, in shipment order.
fn shipment_views(
    order: &Order,
    shipments: &[Shipment],
    rates: &[ShippingRate],
    locale: Locale,
) -> Vec<ShipmentView> {
    shipments
        .iter()
        .map(|shipment| ShipmentView {
            number: shipment.number.clone(),
            state: shipment.state,
            cost: shipment.cost,
            display_cost: Money::new(shipment.cost, order.currency).to_string(),
            rates: rates
                .iter()
                .filter(|rate| rate.shipment.id == shipment.id)
                .map(|rate| ShippingRateView::new(rate, locale))
                .collect(),
        })
        .collect()
}

// =============================================================================
// Helpers
// =============================================================================

/// The current order, which must exist and hold items.
async fn checkout_order(current: &mut CurrentOrder<'_, PgOrderStore<'_>>) -> Result<Order> {
    let order = current
        .current_order(false)
        .await?
        .ok_or_else(|| AppError::NotFound("No cart".to_owned()))?;
    if order.line_items.is_empty() {
        return Err(AppError::BadRequest("Cart is empty".to_owned()));
    }
    Ok(order)
}

fn persisted_id(order: &Order) -> Result<OrderId> {
    order
        .id
        .ok_or_else(|| AppError::Internal("current order is not persisted".to_owned()))
}

async fn reload(store: &PgOrderStore<'_>, id: OrderId) -> Result<Order> {
    store
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Order not found".to_owned()))
}

// =============================================================================
// Handlers
// =============================================================================

/// Show checkout: the order, its shipping options and payment methods.
///
/// Ties the order to the logged-in user and quotes shipping on first visit.
#[instrument(skip(state))]
pub async fn show(State(state): State<AppState>, ctx: OrderContext) -> Result<Json<CheckoutView>> {
    let store = PgOrderStore::new(state.pool());
    let mut current = CurrentOrder::new(&store, ctx);

    current.associate_user().await?;
    let order = checkout_order(&mut current).await?;
    let id = persisted_id(&order)?;

    let rates = ShippingRateRepository::new(state.pool());
    let mut shipments = rates.shipments(id).await?;
    if shipments.is_empty() {
        let shipment = rates.create_shipment(id).await?;
        rates.refresh_rates(shipment.id).await?;
        shipments = rates.shipments(id).await?;
    }

    if matches!(order.state, OrderState::Cart | OrderState::Address) {
        store.set_state(id, OrderState::Delivery).await?;
    }

    let order = reload(&store, id).await?;
    let shipping_rates = rates.for_order(id).await?;
    let payment_methods = PaymentRepository::new(state.pool()).active_methods().await?;

    Ok(Json(CheckoutView {
        shipments: shipment_views(&order, &shipments, &shipping_rates, state.config().locale),
        order: OrderView::from(&order),
        payment_methods,
    }))
}

/// Choose a shipping rate.
#[instrument(skip(state))]
pub async fn delivery(
    State(state): State<AppState>,
    ctx: OrderContext,
    Json(request): Json<SelectRateRequest>,
) -> Result<Json<OrderView>> {
    let store = PgOrderStore::new(state.pool());
    let mut current = CurrentOrder::new(&store, ctx);

    let order = checkout_order(&mut current).await?;
    let id = persisted_id(&order)?;

    ShippingRateRepository::new(state.pool())
        .select_rate(id, request.shipping_rate_id)
        .await?;
    tracing::info!(
        number = %order.number,
        shipping_rate_id = %request.shipping_rate_id,
        "Selected shipping rate"
    );

    let order = reload(&store, id).await?;
    current.replace(order.clone());
    Ok(Json(OrderView::from(&order)))
}

/// Submit payments.
///
/// Sensitive source attributes go to the session; payments are created from
/// the rest. A payment without an amount covers the order total.
#[instrument(skip(state, session, params))]
pub async fn payment(
    State(state): State<AppState>,
    ctx: OrderContext,
    session: Session,
    Json(params): Json<CheckoutParams>,
) -> Result<Json<PaymentView>> {
    let store = PgOrderStore::new(state.pool());
    let mut current = CurrentOrder::new(&store, ctx);

    let order = checkout_order(&mut current).await?;
    let id = persisted_id(&order)?;
    if !matches!(order.state, OrderState::Payment | OrderState::Confirm) {
        return Err(AppError::BadRequest(
            "Choose a delivery option first".to_owned(),
        ));
    }

    let requests = strip_sensitive_attributes(&params);
    if requests.is_empty() {
        return Err(AppError::BadRequest("No payment given".to_owned()));
    }

    if let Some(details) = persist_sensitive_payment_details(&session, &params).await? {
        tracing::debug!(payment_methods = details.len(), "Captured payment details");
    }

    let payments_repo = PaymentRepository::new(state.pool());
    let mut payments = Vec::with_capacity(requests.len());
    for request in requests {
        let amount = request.amount.unwrap_or(order.total);
        payments.push(
            payments_repo
                .create(id, request.payment_method_id, amount)
                .await?,
        );
    }

    store.set_state(id, OrderState::Confirm).await?;
    tracing::info!(number = %order.number, payments = payments.len(), "Created payments");

    let order = reload(&store, id).await?;
    Ok(Json(PaymentView {
        order: OrderView::from(&order),
        payments,
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use parcel_core::{
        Currency, NewOrder, ShipmentId, ShipmentRef, ShippingMethod, ShippingMethodId, StoreId,
        TaxRate, TaxRateId,
    };

    use super::*;

    fn order() -> Order {
        let mut order = Order::new(NewOrder {
            currency: Currency::USD,
            guest_token: None,
            store_id: StoreId::new(1),
            user_id: None,
            email: None,
        });
        order.id = Some(OrderId::new(9));
        order
    }

    fn shipment(id: i32, cost: Decimal) -> Shipment {
        Shipment {
            id: ShipmentId::new(id),
            number: format!("H{id:011}"),
            order_id: OrderId::new(9),
            state: ShipmentState::Pending,
            cost,
        }
    }

    fn rate(id: i32, shipment_id: i32, cost: Decimal, selected: bool) -> ShippingRate {
        ShippingRate {
            id: ShippingRateId::new(id),
            shipment: ShipmentRef {
                id: ShipmentId::new(shipment_id),
                order_id: OrderId::new(9),
                number: format!("H{shipment_id:011}"),
                currency: Currency::USD,
            },
            shipping_method: ShippingMethod {
                id: ShippingMethodId::new(id),
                name: format!("Method {id}"),
                code: None,
                tax_category_id: None,
                deleted_at: None,
            },
            tax_rate: Some(TaxRate {
                id: TaxRateId::new(1),
                name: "Sales Tax".to_owned(),
                amount: Decimal::new(10, 2),
                included_in_price: false,
                show_rate_in_label: true,
                tax_category_id: None,
            }),
            cost,
            selected,
            taxes: Vec::new(),
        }
    }

    #[test]
    fn test_rates_grouped_by_shipment() {
        let shipments = [shipment(1, Decimal::new(500, 2)), shipment(2, Decimal::ZERO)];
        let rates = [
            rate(10, 1, Decimal::new(500, 2), true),
            rate(11, 1, Decimal::new(1500, 2), false),
            rate(12, 2, Decimal::new(800, 2), true),
        ];

        let views = shipment_views(&order(), &shipments, &rates, Locale::En);

        assert_eq!(views.len(), 2);
        assert_eq!(views[0].display_cost, "$5.00");
        assert_eq!(views[0].rates.len(), 2);
        assert_eq!(views[1].rates.len(), 1);
        assert_eq!(views[1].rates[0].id, ShippingRateId::new(12));
    }

    #[test]
    fn test_rate_view_uses_display_price() {
        let view = ShippingRateView::new(&rate(10, 1, Decimal::new(1000, 2), true), Locale::En);
        assert_eq!(view.display_price, "$10.00 (+ $1.00 Sales Tax)");
        assert!(view.selected);
    }
}
