//! Store domain type.

use parcel_core::{Currency, StoreId};
use serde::Serialize;

/// A storefront served from one or more hosts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Store {
    pub id: StoreId,
    pub name: String,
    /// Unique short code, e.g. `"main"`.
    pub code: String,
    /// Host names the store answers on.
    pub hosts: Vec<String>,
    pub default_currency: Currency,
    /// Used when no store matches the request host.
    pub is_default: bool,
}
