//! Range of harvest quantities that every service stores exactly.
//!
//! Quantities live in `NUMERIC(18, 4)` columns on both the registry and the
//! billing side, so an event never carries a value one side would round.

use rust_decimal::Decimal;

/// Decimal places kept for a quantity.
pub const QUANTITY_SCALE: u32 = 4;

/// Exclusive upper bound of a quantity: 10^14.
pub const MAX_QUANTITY: Decimal = Decimal::from_parts(0x107a_4000, 0x5af3, 0, false, 0);

/// Returns true if `quantity` is below [`MAX_QUANTITY`] in magnitude and has
/// no significant digit past [`QUANTITY_SCALE`] places.
///
/// Positivity is checked separately by each service.
pub fn quantity_in_range(quantity: Decimal) -> bool {
    quantity.abs() < MAX_QUANTITY && quantity.normalize().scale() <= QUANTITY_SCALE
}
