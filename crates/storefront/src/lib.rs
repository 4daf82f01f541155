//! Parcel storefront library.
//!
//! Order-session handling for the storefront HTTP API: finding and creating
//! the shopper's current order, folding guest carts into accounts, checkout
//! shipping and payment steps.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
