//! Domain models for storefront.
//!
//! Order, shipping and money types live in `parcel_core`; these are the
//! storefront-only records.

pub mod session;
pub mod store;
pub mod user;

pub use session::{CurrentUser, SensitivePaymentDetails};
pub use store::Store;
pub use user::User;
