//! Money calculation utilities using rust_decimal for precision
//!
//! All arithmetic is done in `Decimal`, then converted to `f64` for
//! storage/serialization, rounded to 2 dp half away from zero.

use rust_decimal::prelude::*;

/// Rounding strategy for monetary values (2 decimal places, half-up)
const DECIMAL_PLACES: u32 = 2;

/// Convert f64 to Decimal. NaN and infinities become zero.
#[inline]
pub fn to_decimal(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or_default()
}

/// Convert Decimal back to f64 for storage, rounded to 2 decimal places
#[inline]
pub fn to_f64(value: Decimal) -> f64 {
    value
        .round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
        .to_f64()
        .unwrap_or_default()
}

/// `unit_price × quantity`
pub fn line_total(unit_price: f64, quantity: u32) -> Decimal {
    to_decimal(unit_price) * Decimal::from(quantity)
}

/// Sum of `(unit_price, quantity)` pairs
pub fn subtotal<I>(lines: I) -> Decimal
where
    I: IntoIterator<Item = (f64, u32)>,
{
    lines
        .into_iter()
        .map(|(price, qty)| line_total(price, qty))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulation_is_exact() {
        // 0.1 * 3 drifts in f64
        let total = subtotal([(0.1, 1), (0.1, 1), (0.1, 1)]);
        assert_eq!(to_f64(total), 0.3);
    }

    #[test]
    fn rounding_half_up() {
        assert_eq!(to_f64(Decimal::new(1005, 3)), 1.01);
        assert_eq!(to_f64(Decimal::new(-1005, 3)), -1.01);
    }

    #[test]
    fn non_finite_becomes_zero() {
        assert_eq!(to_decimal(f64::NAN), Decimal::ZERO);
        assert_eq!(to_decimal(f64::INFINITY), Decimal::ZERO);
    }

    #[test]
    fn line_total_multiplies() {
        assert_eq!(to_f64(line_total(45.5, 3)), 136.5);
        assert_eq!(to_f64(subtotal([(45.5, 3), (20.0, 2)])), 176.5);
    }
}
