//! Authentication route handlers.
//!
//! Password login and registration. Logging in hands the guest cart over to
//! the account: the guest's current order is tied to the user and the
//! user's other incomplete orders in the store are merged into it.

use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;

use crate::db::PgOrderStore;
use crate::error::{Result, clear_sentry_user, set_sentry_user};
use crate::middleware::{RequireAuth, clear_current_user, set_current_user};
use crate::models::{CurrentUser, User};
use crate::routes::cart::OrderView;
use crate::services::auth::AuthService;
use crate::services::{CurrentOrder, OrderContext};
use crate::state::AppState;

/// Login or registration credentials.
#[derive(Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// The logged-in user and their cart after handover.
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub user: CurrentUser,
    pub order: OrderView,
    /// Number of the user's older carts folded into `order`.
    pub merged_orders: usize,
}

/// Log `user` in and hand the guest cart over to them.
async fn start_session(
    state: &AppState,
    mut ctx: OrderContext,
    session: &Session,
    user: User,
) -> Result<SessionView> {
    // Resolve the cart as the guest it belonged to
    ctx.user = None;
    let store = PgOrderStore::new(state.pool());
    let mut current = CurrentOrder::new(&store, ctx);
    current.current_order(false).await?;

    let current_user = CurrentUser {
        id: user.id,
        email: user.email,
    };
    set_current_user(session, &current_user).await?;
    set_sentry_user(&current_user.id, Some(current_user.email.as_str()));

    current.adopt_user(current_user.clone());
    current.associate_user().await?;
    let merged_orders = current.set_current_order().await?;
    let order = current.simple_current_order().await?;

    tracing::info!(
        user_id = %current_user.id,
        merged_orders,
        "User logged in"
    );

    Ok(SessionView {
        user: current_user,
        order: OrderView::from(&order),
        merged_orders,
    })
}

/// Log in with email and password.
#[instrument(skip(state, session, credentials))]
pub async fn login(
    State(state): State<AppState>,
    ctx: OrderContext,
    session: Session,
    Json(credentials): Json<Credentials>,
) -> Result<Json<SessionView>> {
    let user = AuthService::new(state.pool())
        .login_with_password(&credentials.email, &credentials.password)
        .await
        .inspect_err(|e| tracing::warn!("Login failed: {e}"))?;

    Ok(Json(start_session(&state, ctx, &session, user).await?))
}

/// Create an account and log in.
#[instrument(skip(state, session, credentials))]
pub async fn register(
    State(state): State<AppState>,
    ctx: OrderContext,
    session: Session,
    Json(credentials): Json<Credentials>,
) -> Result<(StatusCode, Json<SessionView>)> {
    let user = AuthService::new(state.pool())
        .register_with_password(&credentials.email, &credentials.password)
        .await?;
    tracing::info!(user_id = %user.id, "User registered");

    let view = start_session(&state, ctx, &session, user).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// Log out.
#[instrument(skip(session))]
pub async fn logout(session: Session) -> Result<StatusCode> {
    clear_current_user(&session).await?;
    clear_sentry_user();
    Ok(StatusCode::NO_CONTENT)
}

/// The logged-in user.
pub async fn me(RequireAuth(user): RequireAuth) -> Json<CurrentUser> {
    Json(user)
}
