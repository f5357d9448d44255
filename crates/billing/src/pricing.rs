//! Unit prices and invoice arithmetic.

use std::collections::HashMap;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::{BillingError, Result};

/// VAT applied to every invoice.
pub const TAX_RATE: Decimal = Decimal::from_parts(19, 0, 0, false, 2);

/// Price per ton for products missing from the standard table.
pub const DEFAULT_UNIT_PRICE: Decimal = Decimal::from_parts(2_000_000, 0, 0, false, 0);

/// Decimal places kept for a unit price.
pub const PRICE_SCALE: u32 = 2;

/// Exclusive upper bound of a unit price: 10^16.
pub const MAX_UNIT_PRICE: Decimal = Decimal::from_parts(0x6fc1_0000, 0x0023_86f2, 0, false, 0);

/// Exclusive upper bound of any invoice amount: 10^18.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(0xa764_0000, 0x0de0_b6b3, 0, false, 0);

const STANDARD_PRICES: &[(&str, i64)] = &[
    ("RICE", 2_500_000),
    ("ARROZ", 2_500_000),
    ("CORN", 1_800_000),
    ("MAIZ", 1_800_000),
    ("SOY", 3_200_000),
    ("SOYA", 3_200_000),
    ("COFFEE", 8_500_000),
    ("CAFE", 8_500_000),
];

/// Maps a product to its unit price.
pub trait PricingPolicy: Send + Sync {
    fn unit_price(&self, product: &str) -> Decimal;
}

/// Fixed price list keyed by upper-cased, trimmed product name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticPriceTable {
    prices: HashMap<String, Decimal>,
    default_price: Decimal,
}

impl StaticPriceTable {
    /// An empty table that prices everything at `default_price`.
    pub fn new(default_price: Decimal) -> Self {
        Self {
            prices: HashMap::new(),
            default_price,
        }
    }

    /// Adds or replaces the price of `product`.
    pub fn with_price(mut self, product: &str, price: Decimal) -> Self {
        self.prices.insert(Self::key(product), price);
        self
    }

    pub fn default_price(&self) -> Decimal {
        self.default_price
    }

    fn key(product: &str) -> String {
        product.trim().to_uppercase()
    }
}

impl Default for StaticPriceTable {
    /// The standard price list, in both English and Spanish product names.
    fn default() -> Self {
        STANDARD_PRICES
            .iter()
            .fold(Self::new(DEFAULT_UNIT_PRICE), |table, &(product, price)| {
                table.with_price(product, Decimal::from(price))
            })
    }
}

impl PricingPolicy for StaticPriceTable {
    fn unit_price(&self, product: &str) -> Decimal {
        self.prices
            .get(&Self::key(product))
            .copied()
            .unwrap_or(self.default_price)
    }
}

/// Money amounts of an invoice.
///
/// Each amount is rounded to cents, midpoint away from zero. Tax is taken
/// from the rounded subtotal, so `total == subtotal + tax_amount` exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceComputation {
    pub subtotal: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
}

impl InvoiceComputation {
    /// Fails with `AmountOutOfRange` when an amount overflows or reaches
    /// [`MAX_AMOUNT`].
    pub fn compute(quantity: Decimal, unit_price: Decimal) -> Result<Self> {
        let out_of_range = || BillingError::AmountOutOfRange {
            quantity,
            unit_price,
        };

        let subtotal = round_money(quantity.checked_mul(unit_price).ok_or_else(out_of_range)?);
        let tax_amount = round_money(subtotal.checked_mul(TAX_RATE).ok_or_else(out_of_range)?);
        let total = subtotal.checked_add(tax_amount).ok_or_else(out_of_range)?;
        if total.abs() >= MAX_AMOUNT {
            return Err(out_of_range());
        }

        Ok(Self {
            subtotal,
            tax_rate: TAX_RATE,
            tax_amount,
            total,
        })
    }
}

/// Returns true if `price` is below [`MAX_UNIT_PRICE`] and has no
/// significant digit past [`PRICE_SCALE`] places.
pub fn price_in_range(price: Decimal) -> bool {
    price.abs() < MAX_UNIT_PRICE && price.normalize().scale() <= PRICE_SCALE
}

fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn standard_prices_ignore_case_and_whitespace() {
        let table = StaticPriceTable::default();
        assert_eq!(table.unit_price("arroz"), Decimal::from(2_500_000));
        assert_eq!(table.unit_price(" Rice "), Decimal::from(2_500_000));
        assert_eq!(table.unit_price("maiz"), Decimal::from(1_800_000));
        assert_eq!(table.unit_price("SOYA"), Decimal::from(3_200_000));
        assert_eq!(table.unit_price("coffee"), Decimal::from(8_500_000));
    }

    #[test]
    fn unknown_product_uses_default() {
        let table = StaticPriceTable::default();
        assert_eq!(table.unit_price("quinoa"), Decimal::from(2_000_000));
        assert_eq!(table.default_price(), DEFAULT_UNIT_PRICE);
    }

    #[test]
    fn custom_table() {
        let table = StaticPriceTable::new(Decimal::ONE).with_price("wheat", Decimal::TEN);
        assert_eq!(table.unit_price("WHEAT"), Decimal::TEN);
        assert_eq!(table.unit_price("rice"), Decimal::ONE);
    }

    #[test]
    fn ten_tons_of_rice() {
        let c = InvoiceComputation::compute(Decimal::from(10), Decimal::from(2_500_000)).unwrap();
        assert_eq!(c.subtotal, Decimal::from(25_000_000));
        assert_eq!(c.tax_amount, Decimal::from(4_750_000));
        assert_eq!(c.total, Decimal::from(29_750_000));
        assert_eq!(c.tax_rate, dec("0.19"));
    }

    #[test]
    fn rounds_each_amount_to_cents() {
        let c = InvoiceComputation::compute(dec("0.333"), Decimal::ONE).unwrap();
        assert_eq!(c.subtotal, dec("0.33"));
        assert_eq!(c.tax_amount, dec("0.06"));
        assert_eq!(c.total, dec("0.39"));
    }

    #[test]
    fn midpoint_rounds_away_from_zero() {
        let c = InvoiceComputation::compute(dec("0.005"), Decimal::ONE).unwrap();
        assert_eq!(c.subtotal, dec("0.01"));
    }

    #[test]
    fn overflowing_amounts_are_rejected() {
        let huge = dec("10000000000000000000000000");
        let err = InvoiceComputation::compute(huge, Decimal::from(2_500_000)).unwrap_err();
        assert!(matches!(err, BillingError::AmountOutOfRange { .. }));
        assert_eq!(err.kind(), common::ErrorKind::Validation);

        // Representable, but wider than the amount columns.
        assert!(InvoiceComputation::compute(dec("99999999999999"), dec("9999999")).is_err());
    }

    #[test]
    fn price_bounds() {
        assert!(price_in_range(dec("2500000")));
        assert!(price_in_range(dec("0.50")));
        assert!(!price_in_range(dec("0.005")));
        assert!(!price_in_range(MAX_UNIT_PRICE));
        assert_eq!(MAX_UNIT_PRICE, Decimal::from(10_000_000_000_000_000_i64));
        assert_eq!(MAX_AMOUNT, Decimal::from(1_000_000_000_000_000_000_i64));
    }

    #[test]
    fn total_is_quantity_times_price_times_vat_for_whole_cents() {
        let c = InvoiceComputation::compute(dec("12.5"), Decimal::from(1_800_000)).unwrap();
        assert_eq!(
            c.total,
            dec("12.5") * Decimal::from(1_800_000) * dec("1.19")
        );
    }
}
