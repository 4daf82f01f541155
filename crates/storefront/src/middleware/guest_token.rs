//! Guest token cookie.
//!
//! Anonymous shoppers are tied to their order by a random token kept in a
//! long-lived `guest_token` cookie. The cookie value is
//! `<token>--<mac>`, where `mac` is the base64url HMAC-SHA256 of the token
//! keyed by the session secret, so tokens cannot be guessed or forged.
//! A missing or tampered cookie is replaced with a fresh token.

use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderValue, header, request::Parts},
    middleware::Next,
    response::Response,
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use tower_sessions::cookie::{Cookie, SameSite, time::Duration};

use crate::error::AppError;

/// Cookie name for the guest token.
pub const GUEST_TOKEN_COOKIE: &str = "guest_token";

/// Cookie lifetime (20 years; the cookie is effectively permanent).
const GUEST_TOKEN_MAX_AGE_DAYS: i64 = 20 * 365;

/// Separator between token and signature.
const SIGNATURE_SEPARATOR: &str = "--";

/// Length of a base64url (unpadded) HMAC-SHA256 signature.
const SIGNATURE_LEN: usize = 43;

type HmacSha256 = Hmac<Sha256>;

/// The request's guest token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestToken(pub String);

impl<S> FromRequestParts<S> for GuestToken
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Self>()
            .cloned()
            .ok_or_else(|| AppError::Internal("guest token middleware not installed".to_owned()))
    }
}

/// Signing key and cookie settings for guest tokens.
#[derive(Clone)]
pub struct GuestTokenSigner {
    key: Arc<SecretString>,
    secure: bool,
}

impl GuestTokenSigner {
    #[must_use]
    pub fn new(secret: SecretString, secure: bool) -> Self {
        Self {
            key: Arc::new(secret),
            secure,
        }
    }

    fn mac(&self, token: &str) -> Option<HmacSha256> {
        let Ok(mut mac) = HmacSha256::new_from_slice(self.key.expose_secret().as_bytes()) else {
            return None;
        };
        mac.update(token.as_bytes());
        Some(mac)
    }

    /// Cookie value for a token.
    #[must_use]
    pub fn sign(&self, token: &str) -> String {
        let signature = self
            .mac(token)
            .map(|mac| URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
            .unwrap_or_default();
        format!("{token}{SIGNATURE_SEPARATOR}{signature}")
    }

    /// The token in a cookie value, if the signature checks out.
    #[must_use]
    pub fn verify(&self, value: &str) -> Option<String> {
        // The token alphabet includes '-', so split at the fixed signature length.
        let token_len = value
            .len()
            .checked_sub(SIGNATURE_SEPARATOR.len() + SIGNATURE_LEN)?;
        let token = value.get(..token_len).filter(|token| !token.is_empty())?;
        let signature = value.get(token_len..)?.strip_prefix(SIGNATURE_SEPARATOR)?;
        let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;
        // verify_slice compares in constant time
        self.mac(token)?.verify_slice(&signature).ok()?;
        Some(token.to_owned())
    }

    fn cookie(&self, token: &str) -> Cookie<'static> {
        Cookie::build((GUEST_TOKEN_COOKIE, self.sign(token)))
            .path("/")
            .max_age(Duration::days(GUEST_TOKEN_MAX_AGE_DAYS))
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .build()
    }
}

/// A new random guest token: 16 random bytes, base64url without padding.
#[must_use]
pub fn generate_token() -> String {
    let mut bytes = [0_u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Middleware that resolves the guest token and exposes it as [`GuestToken`].
///
/// Sets the cookie on the response when a token had to be minted.
pub async fn guest_token_middleware(
    State(signer): State<GuestTokenSigner>,
    mut request: Request,
    next: Next,
) -> Response {
    let existing = request
        .headers()
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .filter(|cookie| cookie.name() == GUEST_TOKEN_COOKIE)
        .find_map(|cookie| signer.verify(cookie.value()));

    let (token, minted) = match existing {
        Some(token) => (token, false),
        None => (generate_token(), true),
    };

    request.extensions_mut().insert(GuestToken(token.clone()));
    let mut response = next.run(request).await;

    if minted {
        tracing::debug!("Issued guest token");
        if let Ok(value) = HeaderValue::from_str(&signer.cookie(&token).to_string()) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }

    response
}
