//! Money helpers with two-decimal precision.
//!
//! CRITICAL: Never use floating-point for money calculations.
//! All amounts are `rust_decimal::Decimal` in rand, rounded to cents.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Number of decimal places carried by every stored amount.
pub const MONEY_SCALE: u32 = 2;

/// One cent; the tolerance used when deciding whether a balance is settled.
pub const CENT: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Largest amount or balance a `NUMERIC(14,2)` column holds: 999 999 999 999.99.
pub const MAX_MONEY: Decimal = Decimal::from_parts(276_447_231, 23_283, 0, false, 2);

/// True if `amount` fits the stored money range.
#[must_use]
pub fn within_money_range(amount: Decimal) -> bool {
    amount.abs() <= MAX_MONEY
}

/// Rounds to cents using Banker's Rounding.
#[must_use]
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointNearestEven)
}

/// Rounds up to the next cent. Installments use this so a schedule never
/// leaves a sub-cent residue after its last payment.
#[must_use]
pub fn ceil_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::AwayFromZero)
}

/// True if `amount` carries no more than two decimal places.
#[must_use]
pub fn is_whole_cents(amount: Decimal) -> bool {
    amount.normalize().scale() <= MONEY_SCALE
}

/// True if a remaining balance is small enough to count as settled.
#[must_use]
pub fn is_settled(remaining: Decimal) -> bool {
    remaining <= CENT
}

/// A rand amount, rendered as `R1234.50`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(pub Decimal);

impl Money {
    /// Creates a money value rounded to cents.
    #[must_use]
    pub fn new(amount: Decimal) -> Self {
        Self(round_money(amount))
    }

    /// Returns true if the amount is zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Returns true if the amount is negative.
    #[must_use]
    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rounded = round_money(self.0);
        if rounded.is_sign_negative() && !rounded.is_zero() {
            write!(f, "-R{:.2}", rounded.abs())
        } else {
            write!(f, "R{:.2}", rounded.abs())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_round_money_is_bankers() {
        assert_eq!(round_money(dec!(1.005)), dec!(1.00));
        assert_eq!(round_money(dec!(1.015)), dec!(1.02));
        assert_eq!(round_money(dec!(172.2222)), dec!(172.22));
    }

    #[test]
    fn test_ceil_money() {
        assert_eq!(ceil_money(dec!(675)), dec!(675));
        assert_eq!(ceil_money(dec!(33.3333)), dec!(33.34));
    }

    #[test]
    fn test_whole_cents() {
        assert!(is_whole_cents(dec!(10)));
        assert!(is_whole_cents(dec!(10.50)));
        assert!(is_whole_cents(dec!(10.500)));
        assert!(!is_whole_cents(dec!(10.505)));
    }

    #[test]
    fn test_money_range() {
        assert_eq!(MAX_MONEY, dec!(999999999999.99));
        assert!(within_money_range(dec!(999999999999.99)));
        assert!(within_money_range(dec!(-999999999999.99)));
        assert!(!within_money_range(dec!(1000000000000)));
        assert!(!within_money_range(Decimal::MAX));
    }

    #[test]
    fn test_is_settled() {
        assert!(is_settled(dec!(0)));
        assert!(is_settled(dec!(0.01)));
        assert!(!is_settled(dec!(0.02)));
        assert_eq!(CENT, dec!(0.01));
    }

    #[test]
    fn test_money_display() {
        assert_eq!(Money::new(dec!(5400)).to_string(), "R5400.00");
        assert_eq!(Money::new(dec!(-12.5)).to_string(), "-R12.50");
        assert!(Money::new(dec!(-1)).is_negative());
        assert!(Money::new(dec!(0)).is_zero());
    }
}
