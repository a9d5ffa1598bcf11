//! Gross weekly salary.

use classbank_shared::types::round_money;
use rust_decimal::Decimal;

use super::types::Employment;

/// Raise per level above 1.
pub const LEVEL_STEP: Decimal = Decimal::from_parts(7222, 0, 0, false, 4);

/// Premium paid on contract jobs.
pub const CONTRACT_MULTIPLIER: Decimal = Decimal::from_parts(15, 0, 0, false, 1);

/// `base * (1 + (level - 1) * 0.7222) * (1.5 if contractual)`, rounded to cents.
#[must_use]
pub fn gross_salary(employment: &Employment) -> Decimal {
    let steps = Decimal::from(employment.level.max(1) - 1);
    let mut gross = employment.base_pay * (Decimal::ONE + steps * LEVEL_STEP);
    if employment.contractual {
        gross *= CONTRACT_MULTIPLIER;
    }
    round_money(gross)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    fn job(base_pay: Decimal, level: u32, contractual: bool) -> Employment {
        Employment {
            job_title: "Banker".to_string(),
            base_pay,
            level,
            contractual,
        }
    }

    #[rstest]
    #[case(dec!(2000), 1, false, dec!(2000))]
    #[case(dec!(1000), 2, false, dec!(1722.20))]
    #[case(dec!(1000), 3, false, dec!(2444.40))]
    #[case(dec!(1000), 1, true, dec!(1500))]
    #[case(dec!(1000), 2, true, dec!(2583.30))]
    #[case(dec!(100), 0, false, dec!(100))]
    fn test_gross_salary(
        #[case] base: Decimal,
        #[case] level: u32,
        #[case] contractual: bool,
        #[case] expected: Decimal,
    ) {
        assert_eq!(gross_salary(&job(base, level, contractual)), expected);
    }

    #[test]
    fn test_constants() {
        assert_eq!(LEVEL_STEP, dec!(0.7222));
        assert_eq!(CONTRACT_MULTIPLIER, dec!(1.5));
    }
}
