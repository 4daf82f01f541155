//! Shopper account commands.
//!
//! # Usage
//!
//! ```bash
//! parcel-cli user create -e shopper@example.com -p 'correct horse battery'
//! ```

use parcel_core::UserId;
use parcel_storefront::services::auth::AuthService;

use super::{CliError, connect};

/// Create a password account.
///
/// # Errors
///
/// Returns `CliError::Auth` if the email is invalid or taken, or the
/// password is too weak.
pub async fn create(email: &str, password: &str) -> Result<UserId, CliError> {
    let pool = connect().await?;

    let user = AuthService::new(&pool)
        .register_with_password(email, password)
        .await?;

    tracing::info!("User created successfully! ID: {}, Email: {}", user.id, user.email);
    Ok(user.id)
}
