//! Parcel Core - Shared domain types.
//!
//! This crate provides the order-management domain used by the other Parcel
//! components:
//! - `storefront` - Public-facing cart and checkout service
//! - `cli` - Command-line tools for migrations, seeding and user management
//!
//! # Architecture
//!
//! The core crate contains only types and pure domain rules - no I/O, no
//! database access, no HTTP. Persistence lives in the storefront's
//! repositories, which load rows into these types.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for ids, emails, money and statuses
//! - [`i18n`] - Locale-dependent labels
//! - [`tax`] - Tax rates and the default tax calculator
//! - [`shipping`] - Shipping methods, shipping rates and display pricing
//! - [`order`] - Orders, line items, user association and merging

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod i18n;
pub mod order;
pub mod shipping;
pub mod tax;
pub mod types;

pub use i18n::{Label, Locale};
pub use order::{LineItem, NewOrder, Order, OrderError};
pub use shipping::{ShipmentRef, ShippingMethod, ShippingRate, ShippingRateTax};
pub use tax::TaxRate;
pub use types::*;
