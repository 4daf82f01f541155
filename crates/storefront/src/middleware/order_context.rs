//! Extractor for the facts the current order is resolved from.

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};

use crate::error::AppError;
use crate::middleware::auth::OptionalAuth;
use crate::middleware::client_ip::ClientIp;
use crate::middleware::guest_token::GuestToken;
use crate::services::OrderContext;
use crate::state::AppState;

/// Host the request was addressed to.
fn request_host(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .or_else(|| parts.uri.host())
}

impl FromRequestParts<AppState> for OrderContext {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let host = request_host(parts).unwrap_or_default().to_owned();
        let store = state.current_store(&host).await?;

        let GuestToken(token) = GuestToken::from_request_parts(parts, state).await?;
        let Ok(OptionalAuth(user)) = OptionalAuth::from_request_parts(parts, state).await;
        let Ok(ClientIp(ip)) = ClientIp::from_request_parts(parts, state).await;

        Ok(Self {
            store_id: store.id,
            currency: state.config().currency,
            guest_token: Some(token),
            user,
            ip,
        })
    }
}
