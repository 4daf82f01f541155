//! Tax rates and the default tax calculator.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::types::{TaxCategoryId, TaxRateId};

/// A tax rate applied to items of one tax category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxRate {
    pub id: TaxRateId,
    /// Shown next to tax amounts, e.g. "VAT".
    pub name: String,
    /// Rate as a fraction: `0.2` is 20%. Negative rates refund tax.
    pub amount: Decimal,
    /// Whether prices already contain this tax.
    pub included_in_price: bool,
    /// Whether display prices mention this tax.
    pub show_rate_in_label: bool,
    pub tax_category_id: Option<TaxCategoryId>,
}

impl TaxRate {
    /// Tax owed on a shipping cost under this rate.
    ///
    /// For a tax-inclusive rate the tax is backed out of the cost
    /// (`cost / (1 + rate) * rate`); otherwise it is charged on top
    /// (`cost * rate`). Both are rounded to cents.
    #[must_use]
    pub fn compute_shipping_rate(&self, cost: Decimal) -> Decimal {
        if self.included_in_price {
            let divisor = Decimal::ONE + self.amount;
            if divisor.is_zero() {
                return Decimal::ZERO;
            }
            round_to_two_places(cost / divisor * self.amount)
        } else {
            round_to_two_places(cost * self.amount)
        }
    }
}

fn round_to_two_places(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn tax_rate(amount: Decimal, included_in_price: bool) -> TaxRate {
        TaxRate {
            id: TaxRateId::new(1),
            name: "VAT".to_owned(),
            amount,
            included_in_price,
            show_rate_in_label: true,
            tax_category_id: Some(TaxCategoryId::new(1)),
        }
    }

    #[test]
    fn test_additive_rate() {
        let rate = tax_rate(Decimal::new(1, 1), false);
        assert_eq!(rate.compute_shipping_rate(Decimal::new(10, 0)), Decimal::new(100, 2));
    }

    #[test]
    fn test_included_rate_backs_tax_out_of_cost() {
        // 10.00 / 1.1 * 0.1 = 0.9090.. -> 0.91
        let rate = tax_rate(Decimal::new(1, 1), true);
        assert_eq!(rate.compute_shipping_rate(Decimal::new(10, 0)), Decimal::new(91, 2));
    }

    #[test]
    fn test_negative_included_rate() {
        // 10.00 / 0.9 * -0.1 = -1.111.. -> -1.11
        let rate = tax_rate(Decimal::new(-1, 1), true);
        assert_eq!(rate.compute_shipping_rate(Decimal::new(10, 0)), Decimal::new(-111, 2));
    }

    #[test]
    fn test_zero_cost() {
        let rate = tax_rate(Decimal::new(2, 1), false);
        assert_eq!(rate.compute_shipping_rate(Decimal::ZERO), Decimal::ZERO);
    }

    #[test]
    fn test_degenerate_included_rate() {
        let rate = tax_rate(Decimal::NEGATIVE_ONE, true);
        assert_eq!(rate.compute_shipping_rate(Decimal::new(10, 0)), Decimal::ZERO);
    }
}
