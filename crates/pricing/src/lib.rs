//! Monetary conversion and profit derivation (pure, deterministic).
//!
//! Every figure here is reproducible from stored data alone: prices are kept
//! as decimal strings together with the currency and the rate recorded when
//! the price was entered, and nothing in this crate looks up a live rate.

pub mod currency;
pub mod decimal_text;
pub mod profit;

pub use currency::{
    BASE_CURRENCY, MARKETPLACE_CURRENCY, convert_to_base, format_amount, parse_decimal,
    round_to,
};
pub use profit::{FeeAmount, ProfitBreakdown, ProfitInputs, calculate_profit, should_recalculate};
