//! Business logic services for storefront.
//!
//! # Services
//!
//! - `auth` - Password accounts
//! - `current_order` - Resolving, creating and merging the shopper's order
//! - `payment` - Checkout payment parameters and sensitive card data

pub mod auth;
pub mod current_order;
pub mod payment;

pub use current_order::{CurrentOrder, OrderContext, OrderParams, OrderStore};
