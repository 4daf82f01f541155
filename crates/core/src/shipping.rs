//! Shipping methods and shipping rates.
//!
//! A shipment gets one [`ShippingRate`] per shipping method that can deliver
//! it; the shopper selects one during checkout. A rate records the cost of
//! its method for that shipment and renders the price shown to the shopper,
//! including the tax the rate's tax rate puts on it.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::i18n::{Label, Locale};
use crate::tax::TaxRate;
use crate::types::{
    Currency, Money, OrderId, ShipmentId, ShippingMethodId, ShippingRateId, ShippingRateTaxId,
    TaxCategoryId, TaxRateId,
};

/// A way of delivering shipments, e.g. "UPS Ground".
///
/// Methods are soft-deleted: rates created before a method was retired still
/// resolve it, so historical orders keep their shipping names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingMethod {
    pub id: ShippingMethodId,
    pub name: String,
    pub code: Option<String>,
    pub tax_category_id: Option<TaxCategoryId>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl ShippingMethod {
    /// Whether the method has been retired.
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// The parts of the owning shipment a rate needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentRef {
    pub id: ShipmentId,
    pub order_id: OrderId,
    pub number: String,
    /// The order's currency.
    pub currency: Currency,
}

/// A tax line entry owned by a shipping rate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingRateTax {
    pub id: ShippingRateTaxId,
    pub shipping_rate_id: ShippingRateId,
    pub tax_rate_id: TaxRateId,
    pub amount: Decimal,
}

/// The cost of one shipping method for one shipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingRate {
    pub id: ShippingRateId,
    pub shipment: ShipmentRef,
    pub shipping_method: ShippingMethod,
    pub tax_rate: Option<TaxRate>,
    pub cost: Decimal,
    /// Whether this is the rate chosen for the shipment.
    pub selected: bool,
    pub taxes: Vec<ShippingRateTax>,
}

impl ShippingRate {
    /// The order the shipment belongs to.
    #[must_use]
    pub const fn order_id(&self) -> OrderId {
        self.shipment.order_id
    }

    #[must_use]
    pub const fn currency(&self) -> Currency {
        self.shipment.currency
    }

    /// The shipping method's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shipping_method.name
    }

    #[must_use]
    pub const fn tax_category_id(&self) -> Option<TaxCategoryId> {
        self.shipping_method.tax_category_id
    }

    #[must_use]
    pub fn shipping_method_code(&self) -> Option<&str> {
        self.shipping_method.code.as_deref()
    }

    /// The rate's cost.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.cost
    }

    /// Shipping rates carry no promotions, so this is the plain amount.
    #[must_use]
    pub const fn discounted_amount(&self) -> Decimal {
        self.amount()
    }

    #[must_use]
    pub const fn display_amount(&self) -> Money {
        Money::new(self.amount(), self.currency())
    }

    /// The cost before any tax annotation.
    #[must_use]
    pub const fn display_base_price(&self) -> Money {
        self.display_amount()
    }

    /// Tax the rate's tax rate puts on the cost, zero without a tax rate.
    #[must_use]
    pub fn calculate_tax_amount(&self) -> Decimal {
        self.tax_rate
            .as_ref()
            .map_or(Decimal::ZERO, |rate| rate.compute_shipping_rate(self.cost))
    }

    #[must_use]
    pub const fn display_tax_amount(&self, amount: Decimal) -> Money {
        Money::new(amount, self.currency())
    }

    /// Sum of the tax entries recorded for this rate.
    #[must_use]
    pub fn tax_total(&self) -> Decimal {
        self.taxes.iter().map(|tax| tax.amount).sum()
    }

    /// The price shown to the shopper.
    ///
    /// When the tax rate asks to be shown in labels and the computed tax is
    /// nonzero, the base price gets a suffix:
    ///
    /// - tax included in the price: `"$10.00 (incl. $0.91 VAT)"`, or
    ///   `"(excl. ...)"` with the absolute amount when the tax is negative
    /// - tax added on top: `"$10.00 (+ $1.00 Sales Tax)"`
    #[must_use]
    pub fn display_price(&self, locale: Locale) -> String {
        let mut price = self.display_base_price().to_string();

        let Some(tax_rate) = self.tax_rate.as_ref().filter(|r| r.show_rate_in_label) else {
            return price;
        };

        let tax_amount = self.calculate_tax_amount();
        if tax_amount.is_zero() {
            return price;
        }

        if tax_rate.included_in_price {
            if tax_amount.is_sign_positive() {
                let amount = format!("{} {}", self.display_tax_amount(tax_amount), tax_rate.name);
                price.push_str(&format!(" ({} {amount})", locale.t(Label::Incl)));
            } else {
                let amount = format!("{} {}", self.display_tax_amount(-tax_amount), tax_rate.name);
                price.push_str(&format!(" ({} {amount})", locale.t(Label::Excl)));
            }
        } else {
            let amount = format!("{} {}", self.display_tax_amount(tax_amount), tax_rate.name);
            price.push_str(&format!(" (+ {amount})"));
        }

        price
    }

    /// Same as [`display_price`](Self::display_price).
    #[must_use]
    pub fn display_cost(&self, locale: Locale) -> String {
        self.display_price(locale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tax::tests::tax_rate;

    fn rate(cost: Decimal, tax_rate: Option<TaxRate>) -> ShippingRate {
        ShippingRate {
            id: ShippingRateId::new(1),
            shipment: ShipmentRef {
                id: ShipmentId::new(1),
                order_id: OrderId::new(9),
                number: "H12345678".to_owned(),
                currency: Currency::USD,
            },
            shipping_method: ShippingMethod {
                id: ShippingMethodId::new(3),
                name: "UPS Ground".to_owned(),
                code: Some("ups_ground".to_owned()),
                tax_category_id: Some(TaxCategoryId::new(1)),
                deleted_at: None,
            },
            tax_rate,
            cost,
            selected: false,
            taxes: Vec::new(),
        }
    }

    fn ten_dollars() -> Decimal {
        Decimal::new(10, 0)
    }

    #[test]
    fn test_display_price_without_tax_rate() {
        let rate = rate(ten_dollars(), None);
        assert_eq!(rate.display_price(Locale::En), "$10.00");
    }

    #[test]
    fn test_display_price_with_zero_tax() {
        let rate = rate(Decimal::ZERO, Some(tax_rate(Decimal::new(1, 1), false)));
        assert_eq!(rate.display_price(Locale::En), "$0.00");

        let rate = rate_with(ten_dollars(), Decimal::ZERO, true);
        assert_eq!(rate.display_price(Locale::En), "$10.00");
    }

    #[test]
    fn test_display_price_hidden_label() {
        let mut tax = tax_rate(Decimal::new(1, 1), false);
        tax.show_rate_in_label = false;
        let rate = rate(ten_dollars(), Some(tax));
        assert_eq!(rate.display_price(Locale::En), "$10.00");
    }

    #[test]
    fn test_display_price_included_positive() {
        let rate = rate_with(ten_dollars(), Decimal::new(1, 1), true);
        assert_eq!(rate.display_price(Locale::En), "$10.00 (incl. $0.91 VAT)");
    }

    #[test]
    fn test_display_price_included_negative() {
        let rate = rate_with(ten_dollars(), Decimal::new(-1, 1), true);
        assert_eq!(rate.display_price(Locale::En), "$10.00 (excl. $1.11 VAT)");
    }

    #[test]
    fn test_display_price_additive() {
        let rate = rate_with(ten_dollars(), Decimal::new(1, 1), false);
        assert_eq!(rate.display_price(Locale::En), "$10.00 (+ $1.00 VAT)");
    }

    #[test]
    fn test_display_price_additive_negative_keeps_sign() {
        let rate = rate_with(ten_dollars(), Decimal::new(-1, 1), false);
        assert_eq!(rate.display_price(Locale::En), "$10.00 (+ -$1.00 VAT)");
    }

    #[test]
    fn test_display_price_localized() {
        let rate = rate_with(ten_dollars(), Decimal::new(1, 1), true);
        assert_eq!(rate.display_price(Locale::De), "$10.00 (inkl. $0.91 VAT)");
        assert_eq!(rate.display_cost(Locale::De), rate.display_price(Locale::De));
    }

    #[test]
    fn test_delegation() {
        let mut rate = rate(ten_dollars(), None);
        assert_eq!(rate.order_id(), OrderId::new(9));
        assert_eq!(rate.currency(), Currency::USD);
        assert_eq!(rate.name(), "UPS Ground");
        assert_eq!(rate.shipping_method_code(), Some("ups_ground"));
        assert_eq!(rate.tax_category_id(), Some(TaxCategoryId::new(1)));
        assert_eq!(rate.amount(), ten_dollars());
        assert_eq!(rate.discounted_amount(), ten_dollars());

        rate.shipping_method.deleted_at = Some(Utc::now());
        assert!(rate.shipping_method.is_deleted());
        assert_eq!(rate.name(), "UPS Ground");
    }

    #[test]
    fn test_tax_total_sums_entries() {
        let mut rate = rate(ten_dollars(), None);
        assert_eq!(rate.tax_total(), Decimal::ZERO);
        for (id, cents) in [(1, 50), (2, 41)] {
            rate.taxes.push(ShippingRateTax {
                id: ShippingRateTaxId::new(id),
                shipping_rate_id: rate.id,
                tax_rate_id: TaxRateId::new(id),
                amount: Decimal::new(cents, 2),
            });
        }
        assert_eq!(rate.tax_total(), Decimal::new(91, 2));
    }

    fn rate_with(cost: Decimal, tax: Decimal, included: bool) -> ShippingRate {
        rate(cost, Some(tax_rate(tax, included)))
    }
}
