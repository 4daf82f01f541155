//! HTTP route handlers for storefront.
//!
//! All endpoints speak JSON.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                 - Liveness check
//! GET  /health/ready           - Readiness check (database)
//!
//! # Cart
//! GET  /cart                   - Current order (empty when there is none)
//! GET  /cart/count             - Item count
//! POST /cart/add               - Add a variant, creating the order if needed
//! POST /cart/update            - Set a line's quantity (0 removes)
//! POST /cart/remove            - Remove a line
//!
//! # Checkout
//! GET  /checkout               - Order, shipping options, payment methods
//! POST /checkout/delivery      - Select a shipping rate
//! POST /checkout/payment       - Submit payments
//!
//! # Auth
//! POST /auth/register          - Create an account and log in
//! POST /auth/login             - Log in, handing over the guest cart
//! POST /auth/logout            - Log out
//! GET  /auth/me                - Logged-in user
//! ```

pub mod auth;
pub mod cart;
pub mod checkout;

use axum::{
    Router,
    routing::{get, post},
};

use crate::config::StorefrontConfig;
use crate::middleware::{
    GuestTokenSigner, api_rate_limiter, auth_rate_limiter, guest_token_middleware,
};
use crate::state::AppState;

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me))
        .layer(auth_rate_limiter())
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show))
        .route("/count", get(cart::count))
        .route("/add", post(cart::add))
        .route("/update", post(cart::update))
        .route("/remove", post(cart::remove))
}

/// Create the checkout routes router.
pub fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(checkout::show))
        .route("/delivery", post(checkout::delivery))
        .route("/payment", post(checkout::payment))
}

/// Create all shopper-facing routes.
///
/// Every route sees a guest token; cart and checkout share one rate limit.
pub fn routes(config: &StorefrontConfig) -> Router<AppState> {
    let signer = GuestTokenSigner::new(config.session_secret.clone(), config.is_secure());
    let api_limiter = api_rate_limiter();

    Router::new()
        .nest("/cart", cart_routes().layer(api_limiter.clone()))
        .nest("/checkout", checkout_routes().layer(api_limiter))
        .nest("/auth", auth_routes())
        .layer(axum::middleware::from_fn_with_state(
            signer,
            guest_token_middleware,
        ))
}
