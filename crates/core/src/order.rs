//! Orders and line items.
//!
//! An order is the shopper's cart until checkout completes it. Anonymous
//! shoppers are tied to their order by a guest token; logged-in shoppers by
//! their user id. This module holds the rules that do not need a database:
//! item counting, totals, user association and folding one order into another.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{
    Currency, Email, LineItemId, Money, OrderId, OrderState, StoreId, UserId, VariantId,
};

/// Errors raised by order rules.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderError {
    /// An order cannot be merged into itself.
    #[error("cannot merge order {0} into itself")]
    MergeIntoSelf(OrderId),
    /// Line items must have a positive quantity.
    #[error("quantity must be positive, got {0}")]
    InvalidQuantity(i32),
    /// The orders use different currencies.
    #[error("cannot combine {0} and {1} orders")]
    CurrencyMismatch(Currency, Currency),
}

/// A quantity of one variant in an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    /// `None` until persisted.
    pub id: Option<LineItemId>,
    pub variant_id: VariantId,
    pub quantity: i32,
    /// Unit price at the time the item was added.
    pub price: Decimal,
}

impl LineItem {
    /// Price times quantity.
    #[must_use]
    pub fn amount(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

/// Attributes of an order about to be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub currency: Currency,
    pub guest_token: Option<String>,
    pub store_id: StoreId,
    pub user_id: Option<UserId>,
    pub email: Option<Email>,
}

/// A shopper's order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// `None` for an order that has not been saved.
    pub id: Option<OrderId>,
    pub number: String,
    pub guest_token: Option<String>,
    pub store_id: Option<StoreId>,
    pub user_id: Option<UserId>,
    pub created_by_id: Option<UserId>,
    pub email: Option<Email>,
    pub currency: Currency,
    pub state: OrderState,
    pub line_items: Vec<LineItem>,
    pub item_total: Decimal,
    pub shipment_total: Decimal,
    pub total: Decimal,
    pub last_ip_address: Option<IpAddr>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Build an unsaved cart-state order with no items.
    ///
    /// The creating user, when known, is also recorded as `created_by`.
    #[must_use]
    pub fn new(new: NewOrder) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            number: generate_number(),
            guest_token: new.guest_token,
            store_id: Some(new.store_id),
            user_id: new.user_id,
            created_by_id: new.user_id,
            email: new.email,
            currency: new.currency,
            state: OrderState::Cart,
            line_items: Vec::new(),
            item_total: Decimal::ZERO,
            shipment_total: Decimal::ZERO,
            total: Decimal::ZERO,
            last_ip_address: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// An unsaved, storeless order standing in for "no cart yet".
    #[must_use]
    pub fn empty(currency: Currency) -> Self {
        let mut order = Self::new(NewOrder {
            currency,
            guest_token: None,
            store_id: StoreId::new(0),
            user_id: None,
            email: None,
        });
        order.store_id = None;
        order.number = String::new();
        order
    }

    #[must_use]
    pub const fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    /// Whether checkout has completed.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some() || self.state.is_complete()
    }

    /// Total number of units across all line items.
    #[must_use]
    pub fn item_count(&self) -> i32 {
        self.line_items.iter().map(|item| item.quantity).sum()
    }

    /// Whether the order still needs to be tied to a user: it has no user, or
    /// no email to reach the shopper at.
    #[must_use]
    pub const fn needs_user_association(&self) -> bool {
        self.user_id.is_none() || self.email.is_none()
    }

    /// Tie the order to a user, taking over the user's email.
    ///
    /// `created_by` is only filled in when it was unknown.
    pub fn associate_user(&mut self, user_id: UserId, email: Option<Email>) {
        self.user_id = Some(user_id);
        self.email = email;
        if self.created_by_id.is_none() {
            self.created_by_id = Some(user_id);
        }
        self.touch();
    }

    /// Add units of a variant, merging with an existing line for it.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::InvalidQuantity` if `quantity` is not positive.
    pub fn add_item(
        &mut self,
        variant_id: VariantId,
        quantity: i32,
        price: Decimal,
    ) -> Result<(), OrderError> {
        if quantity <= 0 {
            return Err(OrderError::InvalidQuantity(quantity));
        }

        match self
            .line_items
            .iter_mut()
            .find(|item| item.variant_id == variant_id)
        {
            Some(item) => item.quantity += quantity,
            None => self.line_items.push(LineItem {
                id: None,
                variant_id,
                quantity,
                price,
            }),
        }

        self.recalculate();
        Ok(())
    }

    /// Set a variant's quantity; zero removes the line.
    ///
    /// Returns whether the order contained the variant.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::InvalidQuantity` if `quantity` is negative.
    pub fn set_quantity(&mut self, variant_id: VariantId, quantity: i32) -> Result<bool, OrderError> {
        if quantity < 0 {
            return Err(OrderError::InvalidQuantity(quantity));
        }
        let Some(index) = self
            .line_items
            .iter()
            .position(|item| item.variant_id == variant_id)
        else {
            return Ok(false);
        };

        if quantity == 0 {
            self.line_items.remove(index);
        } else if let Some(item) = self.line_items.get_mut(index) {
            item.quantity = quantity;
        }
        self.recalculate();
        Ok(true)
    }

    /// Fold `other`'s line items into this order.
    ///
    /// Lines for a variant this order already has add their quantities; the
    /// rest move over unchanged. When `user` is given the order is assigned
    /// to that user. The caller is responsible for deleting `other`.
    ///
    /// An order in checkout that gains items goes back to the cart with its
    /// shipping cleared, since its shipments were quoted for other contents.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::MergeIntoSelf` if both orders are the same saved
    /// order, or `OrderError::CurrencyMismatch` if their currencies differ.
    pub fn merge(&mut self, other: &Self, user: Option<UserId>) -> Result<(), OrderError> {
        if let (Some(id), Some(other_id)) = (self.id, other.id)
            && id == other_id
        {
            return Err(OrderError::MergeIntoSelf(id));
        }
        if self.currency != other.currency {
            return Err(OrderError::CurrencyMismatch(self.currency, other.currency));
        }

        for incoming in &other.line_items {
            match self
                .line_items
                .iter_mut()
                .find(|item| item.variant_id == incoming.variant_id)
            {
                Some(existing) => existing.quantity += incoming.quantity,
                None => self.line_items.push(incoming.clone()),
            }
        }

        if let Some(user_id) = user {
            self.user_id = Some(user_id);
            if self.created_by_id.is_none() {
                self.created_by_id = Some(user_id);
            }
        }

        if !other.line_items.is_empty() {
            self.restart_checkout();
        }

        self.recalculate();
        Ok(())
    }

    /// Send an order in checkout back to the cart, dropping its shipping
    /// total. Returns whether the state changed.
    pub fn restart_checkout(&mut self) -> bool {
        if !self.state.is_checkout() {
            return false;
        }
        self.state = OrderState::Cart;
        self.shipment_total = Decimal::ZERO;
        self.recalculate();
        true
    }

    /// Recompute the item total and order total from the line items.
    pub fn recalculate(&mut self) {
        self.item_total = self.line_items.iter().map(LineItem::amount).sum();
        self.total = self.item_total + self.shipment_total;
        self.touch();
    }

    #[must_use]
    pub const fn display_item_total(&self) -> Money {
        Money::new(self.item_total, self.currency)
    }

    #[must_use]
    pub const fn display_total(&self) -> Money {
        Money::new(self.total, self.currency)
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Generate an order number: `R` followed by nine random digits.
#[must_use]
pub fn generate_number() -> String {
    let n: u32 = rand::rng().random_range(0..1_000_000_000);
    format!("R{n:09}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn new_order(user: Option<UserId>) -> Order {
        Order::new(NewOrder {
            currency: Currency::USD,
            guest_token: Some("token".to_owned()),
            store_id: StoreId::new(1),
            user_id: user,
            email: None,
        })
    }

    fn saved(mut order: Order, id: i32) -> Order {
        order.id = Some(OrderId::new(id));
        order
    }

    #[test]
    fn test_new_order_is_empty_cart() {
        let order = new_order(Some(UserId::new(5)));
        assert_eq!(order.item_count(), 0);
        assert_eq!(order.state, OrderState::Cart);
        assert_eq!(order.created_by_id, Some(UserId::new(5)));
        assert!(!order.is_persisted());
        assert!(!order.is_completed());
    }

    #[test]
    fn test_empty_order() {
        let order = Order::empty(Currency::EUR);
        assert_eq!(order.item_count(), 0);
        assert_eq!(order.store_id, None);
        assert_eq!(order.currency, Currency::EUR);
        assert_eq!(order.display_total().to_string(), "€0.00");
    }

    #[test]
    fn test_generate_number_format() {
        let number = generate_number();
        assert_eq!(number.len(), 10);
        assert!(number.starts_with('R'));
        assert!(number.chars().skip(1).all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_add_item_merges_same_variant() {
        let mut order = new_order(None);
        order.add_item(VariantId::new(1), 2, Decimal::new(500, 2)).unwrap();
        order.add_item(VariantId::new(1), 1, Decimal::new(500, 2)).unwrap();
        order.add_item(VariantId::new(2), 1, Decimal::new(250, 2)).unwrap();

        assert_eq!(order.line_items.len(), 2);
        assert_eq!(order.item_count(), 4);
        assert_eq!(order.item_total, Decimal::new(1750, 2));
        assert_eq!(order.total, Decimal::new(1750, 2));
    }

    #[test]
    fn test_add_item_rejects_non_positive_quantity() {
        let mut order = new_order(None);
        assert_eq!(
            order.add_item(VariantId::new(1), 0, Decimal::ONE).unwrap_err(),
            OrderError::InvalidQuantity(0)
        );
    }

    #[test]
    fn test_set_quantity_and_remove() {
        let mut order = new_order(None);
        order.add_item(VariantId::new(1), 2, Decimal::ONE).unwrap();
        assert!(order.set_quantity(VariantId::new(1), 5).unwrap());
        assert_eq!(order.item_count(), 5);
        assert!(order.set_quantity(VariantId::new(1), 0).unwrap());
        assert_eq!(order.item_count(), 0);
        assert!(!order.set_quantity(VariantId::new(9), 1).unwrap());
        assert!(order.set_quantity(VariantId::new(1), -1).is_err());
    }

    #[test]
    fn test_needs_user_association() {
        let mut order = new_order(None);
        assert!(order.needs_user_association());

        order.user_id = Some(UserId::new(1));
        assert!(order.needs_user_association(), "blank email still needs association");

        order.email = Some(Email::parse("shopper@example.com").unwrap());
        assert!(!order.needs_user_association());
    }

    #[test]
    fn test_associate_user_keeps_existing_creator() {
        let mut order = new_order(None);
        order.created_by_id = Some(UserId::new(99));
        let email = Email::parse("shopper@example.com").unwrap();

        order.associate_user(UserId::new(1), Some(email.clone()));

        assert_eq!(order.user_id, Some(UserId::new(1)));
        assert_eq!(order.email, Some(email));
        assert_eq!(order.created_by_id, Some(UserId::new(99)));
    }

    #[test]
    fn test_merge_folds_line_items() {
        let mut current = saved(new_order(None), 1);
        current.add_item(VariantId::new(1), 1, Decimal::new(1000, 2)).unwrap();

        let mut other = saved(new_order(None), 2);
        other.add_item(VariantId::new(1), 2, Decimal::new(1000, 2)).unwrap();
        other.add_item(VariantId::new(2), 1, Decimal::new(300, 2)).unwrap();

        current.merge(&other, Some(UserId::new(7))).unwrap();

        assert_eq!(current.line_items.len(), 2);
        assert_eq!(current.item_count(), 4);
        assert_eq!(current.item_total, Decimal::new(3300, 2));
        assert_eq!(current.user_id, Some(UserId::new(7)));
    }

    #[test]
    fn test_merge_restarts_checkout() {
        let mut current = saved(new_order(None), 1);
        current.add_item(VariantId::new(1), 1, Decimal::new(1000, 2)).unwrap();
        current.shipment_total = Decimal::new(500, 2);
        current.state = OrderState::Payment;
        current.recalculate();

        let mut other = saved(new_order(None), 2);
        other.add_item(VariantId::new(2), 3, Decimal::new(2000, 2)).unwrap();

        current.merge(&other, None).unwrap();

        assert_eq!(current.state, OrderState::Cart);
        assert_eq!(current.item_count(), 4);
        assert_eq!(current.shipment_total, Decimal::ZERO);
        assert_eq!(current.total, Decimal::new(7000, 2));
    }

    #[test]
    fn test_merge_of_empty_order_keeps_checkout() {
        let mut current = saved(new_order(None), 1);
        current.add_item(VariantId::new(1), 1, Decimal::new(1000, 2)).unwrap();
        current.shipment_total = Decimal::new(500, 2);
        current.state = OrderState::Delivery;
        current.recalculate();

        current.merge(&saved(new_order(None), 2), None).unwrap();

        assert_eq!(current.state, OrderState::Delivery);
        assert_eq!(current.total, Decimal::new(1500, 2));
    }

    #[test]
    fn test_restart_checkout_leaves_cart_alone() {
        let mut order = new_order(None);
        assert!(!order.restart_checkout());
        order.state = OrderState::Confirm;
        assert!(order.restart_checkout());
        assert_eq!(order.state, OrderState::Cart);
    }

    #[test]
    fn test_merge_into_self_is_rejected() {
        let mut order = saved(new_order(None), 1);
        let same = order.clone();
        assert_eq!(
            order.merge(&same, None).unwrap_err(),
            OrderError::MergeIntoSelf(OrderId::new(1))
        );
    }

    #[test]
    fn test_merge_rejects_currency_mismatch() {
        let mut order = saved(new_order(None), 1);
        let mut other = saved(new_order(None), 2);
        other.currency = Currency::EUR;
        assert!(matches!(
            order.merge(&other, None),
            Err(OrderError::CurrencyMismatch(Currency::USD, Currency::EUR))
        ));
    }

    #[test]
    fn test_totals_include_shipping() {
        let mut order = new_order(None);
        order.shipment_total = Decimal::new(500, 2);
        order.add_item(VariantId::new(1), 1, Decimal::new(1000, 2)).unwrap();
        assert_eq!(order.total, Decimal::new(1500, 2));
        assert_eq!(order.display_item_total().to_string(), "$10.00");
    }
}
