/// Currency every derived profit figure is expressed in.
pub const BASE_CURRENCY: &str = "CNY";

/// Currency the resale marketplace settles in.
pub const MARKETPLACE_CURRENCY: &str = "JPY";

/// Parse a stored decimal string.
///
/// Returns `None` for anything that is not a finite number. Surrounding
/// whitespace is ignored.
pub fn parse_decimal(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Convert an amount to the base currency using the rate recorded at entry.
///
/// - `currency == BASE_CURRENCY`: the rate is ignored and the amount returned.
/// - otherwise: `amount * rate`.
///
/// A non-numeric amount or rate yields `0.0`; this never fails, so recomputation
/// over partially filled records stays total.
pub fn convert_to_base(amount: &str, currency: &str, rate: &str) -> f64 {
    let (Some(amount), Some(rate)) = (parse_decimal(amount), parse_decimal(rate)) else {
        return 0.0;
    };
    convert_value(amount, currency, rate)
}

pub(crate) fn convert_value(amount: f64, currency: &str, rate: f64) -> f64 {
    if currency == BASE_CURRENCY {
        amount
    } else {
        amount * rate
    }
}

/// Round half away from zero to `places` decimal places.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    let rounded = (value * factor).round() / factor;
    // normalise -0.0
    if rounded == 0.0 { 0.0 } else { rounded }
}

/// Render a derived amount for storage (`75`, `17.65`, `-3.5`).
pub fn format_amount(value: f64) -> String {
    let value = if value == 0.0 { 0.0 } else { value };
    format!("{value}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn base_currency_ignores_rate() {
        assert_eq!(convert_to_base("300", "CNY", "7.5"), 300.0);
        assert_eq!(convert_to_base("300", "CNY", "garbage"), 0.0);
    }

    #[test]
    fn foreign_currency_multiplies_by_recorded_rate() {
        assert_eq!(convert_to_base("10000", "JPY", "0.05"), 500.0);
        assert_eq!(convert_to_base("10000", "JPY", "0"), 0.0);
    }

    #[test]
    fn invalid_input_converts_to_zero() {
        assert_eq!(convert_to_base("abc", "JPY", "0.05"), 0.0);
        assert_eq!(convert_to_base("100", "JPY", ""), 0.0);
        assert_eq!(convert_to_base("NaN", "JPY", "1"), 0.0);
    }

    #[test]
    fn rounding_is_half_away_from_zero() {
        assert_eq!(round_to(17.647, 1), 17.6);
        assert_eq!(round_to(2.5, 0), 3.0);
        assert_eq!(round_to(-2.5, 0), -3.0);
        assert_eq!(round_to(-0.001, 2), 0.0);
    }

    #[test]
    fn formatted_amounts_use_shortest_form() {
        assert_eq!(format_amount(75.0), "75");
        assert_eq!(format_amount(17.65), "17.65");
        assert_eq!(format_amount(-0.0), "0");
    }

    proptest! {
        #[test]
        fn base_conversion_is_identity(x in -1.0e9f64..1.0e9, r in -1.0e3f64..1.0e3) {
            let amount = x.to_string();
            prop_assert_eq!(convert_to_base(&amount, BASE_CURRENCY, &r.to_string()), x);
        }

        #[test]
        fn foreign_conversion_is_product(x in -1.0e9f64..1.0e9, r in 0.0f64..1.0e3) {
            let got = convert_to_base(&x.to_string(), "JPY", &r.to_string());
            prop_assert_eq!(got, x * r);
        }
    }
}
