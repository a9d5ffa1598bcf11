//! Progressive marginal tax.

use classbank_shared::types::round_money;
use rust_decimal::Decimal;

use crate::settings::{TaxBracket, TownSettings};

/// Tax on `gross` under marginal brackets sorted by `from`.
///
/// Each bracket taxes the slice of income between its `from` and the next
/// bracket's `from`. Never exceeds `gross`.
#[must_use]
pub fn progressive_tax(gross: Decimal, brackets: &[TaxBracket]) -> Decimal {
    let mut tax = Decimal::ZERO;
    for (i, bracket) in brackets.iter().enumerate() {
        if gross <= bracket.from {
            break;
        }
        let upper = brackets
            .get(i + 1)
            .map_or(gross, |next| next.from.min(gross));
        tax += (upper - bracket.from) * bracket.rate;
    }
    round_money(tax).clamp(Decimal::ZERO, gross.max(Decimal::ZERO))
}

/// Tax owed under a town's settings; zero while taxation is off.
#[must_use]
pub fn tax_for(gross: Decimal, town: &TownSettings) -> Decimal {
    if town.taxation_enabled {
        progressive_tax(gross, &town.tax_brackets)
    } else {
        Decimal::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    fn brackets() -> Vec<TaxBracket> {
        vec![
            TaxBracket {
                from: dec!(0),
                rate: dec!(0),
            },
            TaxBracket {
                from: dec!(1000),
                rate: dec!(0.10),
            },
            TaxBracket {
                from: dec!(3000),
                rate: dec!(0.20),
            },
            TaxBracket {
                from: dec!(6000),
                rate: dec!(0.30),
            },
        ]
    }

    #[rstest]
    #[case(dec!(0), dec!(0))]
    #[case(dec!(800), dec!(0))]
    #[case(dec!(1000), dec!(0))]
    #[case(dec!(2000), dec!(100))]
    #[case(dec!(3000), dec!(200))]
    #[case(dec!(4000), dec!(400))]
    #[case(dec!(8000), dec!(1400))]
    #[case(dec!(1722.22), dec!(72.22))]
    fn test_progressive_tax(#[case] gross: Decimal, #[case] expected: Decimal) {
        assert_eq!(progressive_tax(gross, &brackets()), expected);
    }

    #[test]
    fn test_no_brackets_no_tax() {
        assert_eq!(progressive_tax(dec!(5000), &[]), dec!(0));
    }

    #[test]
    fn test_taxation_disabled() {
        let town = TownSettings {
            taxation_enabled: false,
            tax_brackets: brackets(),
            basic_salary: dec!(150),
        };
        assert_eq!(tax_for(dec!(8000), &town), dec!(0));
    }
}
