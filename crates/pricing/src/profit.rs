//! Profit derivation for a single transaction.

use serde::{Deserialize, Serialize};

use crate::currency::{BASE_CURRENCY, convert_value, parse_decimal, round_to};

/// An ancillary fee (platform fee, packaging, customs...) in its own currency.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeAmount {
    pub amount: String,
    #[serde(default)]
    pub currency: String,
}

/// Priced fields of a transaction, exactly as stored.
///
/// Empty strings mean "not filled in": an empty amount counts as zero, an
/// empty currency as the base currency and an empty rate as `1`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfitInputs {
    pub sold_price: String,
    pub sold_currency: String,
    pub sold_rate: String,
    pub purchase_price: String,
    pub purchase_currency: String,
    pub purchase_rate: String,
    /// Already in base currency.
    pub domestic_shipping: String,
    /// Already in base currency.
    pub international_shipping: String,
    pub other_fees: Vec<FeeAmount>,
}

/// Derived profit figures, in base currency.
///
/// Money is rounded to 2 places, percentages to 1 place. Gross and net profit
/// are identical: no tax is modelled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfitBreakdown {
    pub sold_base: f64,
    pub total_cost: f64,
    pub gross_profit: f64,
    pub net_profit: f64,
    pub profit_margin_percent: f64,
    pub return_on_cost_percent: f64,
}

fn amount_or_zero(raw: &str) -> f64 {
    if raw.trim().is_empty() {
        0.0
    } else {
        parse_decimal(raw).unwrap_or(0.0)
    }
}

fn rate_or_one(raw: &str) -> f64 {
    if raw.trim().is_empty() {
        1.0
    } else {
        parse_decimal(raw).unwrap_or(0.0)
    }
}

fn currency_or_base(raw: &str) -> &str {
    let c = raw.trim();
    if c.is_empty() { BASE_CURRENCY } else { c }
}

impl ProfitInputs {
    /// Sale price in base currency at the recorded rate.
    pub fn sold_base(&self) -> f64 {
        convert_value(
            amount_or_zero(&self.sold_price),
            currency_or_base(&self.sold_currency),
            rate_or_one(&self.sold_rate),
        )
    }

    pub fn purchase_base(&self) -> f64 {
        convert_value(
            amount_or_zero(&self.purchase_price),
            currency_or_base(&self.purchase_currency),
            rate_or_one(&self.purchase_rate),
        )
    }

    /// Fees charged in the sale currency settle at the sale's rate.
    fn fees_base(&self) -> f64 {
        let sold_currency = currency_or_base(&self.sold_currency);
        self.other_fees
            .iter()
            .map(|fee| {
                let currency = currency_or_base(&fee.currency);
                let rate = if currency != BASE_CURRENCY && currency == sold_currency {
                    rate_or_one(&self.sold_rate)
                } else {
                    1.0
                };
                convert_value(amount_or_zero(&fee.amount), currency, rate)
            })
            .sum()
    }

    /// Whether a sale price has been recorded at all.
    pub fn has_sale(&self) -> bool {
        amount_or_zero(&self.sold_price) != 0.0
    }
}

/// Derive gross/net profit and margins from the priced fields.
///
/// Pure: identical inputs always produce identical output.
pub fn calculate_profit(inputs: &ProfitInputs) -> ProfitBreakdown {
    let sold_base = inputs.sold_base();
    let total_cost = inputs.purchase_base()
        + amount_or_zero(&inputs.domestic_shipping)
        + amount_or_zero(&inputs.international_shipping)
        + inputs.fees_base();

    let gross_profit = sold_base - total_cost;
    let net_profit = gross_profit;

    let profit_margin_percent = if sold_base != 0.0 {
        net_profit / sold_base * 100.0
    } else {
        0.0
    };
    let return_on_cost_percent = if total_cost != 0.0 {
        net_profit / total_cost * 100.0
    } else {
        0.0
    };

    ProfitBreakdown {
        sold_base: round_to(sold_base, 2),
        total_cost: round_to(total_cost, 2),
        gross_profit: round_to(gross_profit, 2),
        net_profit: round_to(net_profit, 2),
        profit_margin_percent: round_to(profit_margin_percent, 1),
        return_on_cost_percent: round_to(return_on_cost_percent, 1),
    }
}

/// Decide whether stored profit figures are stale.
///
/// - no sale price yet: nothing to settle, `false`
/// - no stored profit at all: `true`
/// - otherwise `true` iff gross or net moved by more than `0.01`
pub fn should_recalculate(
    inputs: &ProfitInputs,
    current_gross: Option<&str>,
    current_net: Option<&str>,
) -> bool {
    if !inputs.has_sale() {
        return false;
    }

    let present = |v: Option<&str>| v.is_some_and(|s| !s.trim().is_empty());
    if !present(current_gross) && !present(current_net) {
        return true;
    }

    let fresh = calculate_profit(inputs);
    let gross = current_gross.map(amount_or_zero).unwrap_or(0.0);
    let net = current_net.map(amount_or_zero).unwrap_or(0.0);

    (fresh.gross_profit - gross).abs() > 0.01 || (fresh.net_profit - net).abs() > 0.01
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn scenario_a() -> ProfitInputs {
        ProfitInputs {
            sold_price: "10000".into(),
            sold_currency: "JPY".into(),
            sold_rate: "0.05".into(),
            purchase_price: "300".into(),
            purchase_currency: "CNY".into(),
            purchase_rate: "1".into(),
            domestic_shipping: "20".into(),
            international_shipping: "100".into(),
            other_fees: vec![FeeAmount {
                amount: "5".into(),
                currency: "CNY".into(),
            }],
        }
    }

    #[test]
    fn resale_through_marketplace_yields_expected_margins() {
        let p = calculate_profit(&scenario_a());
        assert_eq!(p.sold_base, 500.0);
        assert_eq!(p.total_cost, 425.0);
        assert_eq!(p.gross_profit, 75.0);
        assert_eq!(p.net_profit, 75.0);
        assert_eq!(p.profit_margin_percent, 15.0);
        assert_eq!(p.return_on_cost_percent, 17.6);
    }

    #[test]
    fn fee_in_sale_currency_uses_sale_rate() {
        let mut inputs = scenario_a();
        inputs.other_fees = vec![FeeAmount {
            amount: "1000".into(),
            currency: "JPY".into(),
        }];
        let p = calculate_profit(&inputs);
        // 1000 JPY at the sale's 0.05 = 50
        assert_eq!(p.total_cost, 470.0);
        assert_eq!(p.net_profit, 30.0);
    }

    #[test]
    fn fee_in_unrelated_currency_is_taken_at_face_value() {
        let mut inputs = scenario_a();
        inputs.other_fees = vec![FeeAmount {
            amount: "3".into(),
            currency: "USD".into(),
        }];
        assert_eq!(calculate_profit(&inputs).total_cost, 423.0);
    }

    #[test]
    fn empty_record_yields_zero_everything() {
        let p = calculate_profit(&ProfitInputs::default());
        assert_eq!(p, ProfitBreakdown::default());
    }

    #[test]
    fn margins_are_zero_when_denominators_are_zero() {
        let inputs = ProfitInputs {
            purchase_price: "100".into(),
            ..Default::default()
        };
        let p = calculate_profit(&inputs);
        assert_eq!(p.net_profit, -100.0);
        assert_eq!(p.profit_margin_percent, 0.0);
        assert_eq!(p.return_on_cost_percent, -100.0);
    }

    #[test]
    fn unsold_record_never_needs_recalculation() {
        let mut inputs = scenario_a();
        inputs.sold_price = "0".into();
        assert!(!should_recalculate(&inputs, None, None));
        inputs.sold_price = String::new();
        assert!(!should_recalculate(&inputs, Some("1"), Some("1")));
    }

    #[test]
    fn missing_stored_profit_triggers_recalculation() {
        assert!(should_recalculate(&scenario_a(), None, None));
        assert!(should_recalculate(&scenario_a(), Some(""), Some(" ")));
    }

    #[test]
    fn rounding_noise_does_not_trigger_recalculation() {
        let inputs = scenario_a();
        assert!(!should_recalculate(&inputs, Some("75"), Some("75.005")));
        assert!(should_recalculate(&inputs, Some("75"), Some("74.5")));
        assert!(should_recalculate(&inputs, Some("0"), Some("0")));
    }

    proptest! {
        #[test]
        fn calculation_is_idempotent(
            sold in 0u32..2_000_000,
            rate in 0u32..100,
            purchase in 0u32..100_000,
            ship in 0u32..1_000,
            fees in prop::collection::vec((0u32..10_000, prop::bool::ANY), 0..5),
        ) {
            let inputs = ProfitInputs {
                sold_price: sold.to_string(),
                sold_currency: "JPY".into(),
                sold_rate: format!("0.{rate:02}"),
                purchase_price: purchase.to_string(),
                purchase_currency: "CNY".into(),
                purchase_rate: "1".into(),
                domestic_shipping: ship.to_string(),
                international_shipping: String::new(),
                other_fees: fees
                    .into_iter()
                    .map(|(amount, jpy)| FeeAmount {
                        amount: amount.to_string(),
                        currency: if jpy { "JPY".into() } else { "CNY".into() },
                    })
                    .collect(),
            };
            let first = calculate_profit(&inputs);
            let second = calculate_profit(&inputs);
            prop_assert_eq!(first, second);
            prop_assert_eq!(first.gross_profit, first.net_profit);
        }
    }
}
