use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{AggregateRoot, DomainError, DomainResult, ItemId, TransactionId, ValueObject};
use stockledger_pricing::{
    BASE_CURRENCY, FeeAmount, MARKETPLACE_CURRENCY, ProfitBreakdown, ProfitInputs,
    calculate_profit, decimal_text, format_amount, should_recalculate,
};

use crate::status::{OrderStatus, TransitionPolicy};

/// A price exactly as entered: decimal string, currency code and the rate
/// recorded at the time of entry.
///
/// The triple is stored verbatim so that historical figures can be
/// recomputed bit-for-bit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedAmount {
    #[serde(deserialize_with = "decimal_text::text")]
    pub amount: String,
    pub currency: String,
    #[serde(deserialize_with = "decimal_text::text")]
    pub rate: String,
}

impl PricedAmount {
    pub fn new(
        amount: impl Into<String>,
        currency: impl Into<String>,
        rate: impl Into<String>,
    ) -> Self {
        Self {
            amount: amount.into(),
            currency: currency.into(),
            rate: rate.into(),
        }
    }

    /// An amount already in base currency.
    pub fn base(amount: impl Into<String>) -> Self {
        Self::new(amount, BASE_CURRENCY, "1")
    }
}

impl Default for PricedAmount {
    fn default() -> Self {
        Self::base("0")
    }
}

impl ValueObject for PricedAmount {}

/// Ancillary cost attached to a transaction (platform fee, packaging...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtherFee {
    #[serde(rename = "type", default)]
    pub fee_type: String,
    #[serde(deserialize_with = "decimal_text::text")]
    pub amount: String,
    #[serde(default = "default_fee_currency")]
    pub currency: String,
    #[serde(default)]
    pub description: String,
}

fn default_fee_currency() -> String {
    BASE_CURRENCY.to_string()
}

impl ValueObject for OtherFee {}

/// Commercial record of an item: the purchase leg and, later, the sale leg.
///
/// `item_gross_profit` / `item_net_profit` are derived from the priced fields
/// and are refreshed whenever those change; an empty string means "never
/// computed".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: TransactionId,
    pub item_id: ItemId,
    pub order_status: OrderStatus,

    pub purchase_date: DateTime<Utc>,
    pub launch_date: Option<DateTime<Utc>>,
    pub sold_date: Option<DateTime<Utc>>,

    pub purchase_price: PricedAmount,
    pub sold_price: PricedAmount,
    pub domestic_shipping: String,
    pub international_shipping: String,
    pub other_fees: Vec<OtherFee>,

    pub item_gross_profit: String,
    pub item_net_profit: String,

    pub purchase_platform: String,
    pub sold_platform: String,
    pub listing_platforms: Vec<String>,
    pub domestic_tracking_number: Option<String>,
    pub international_tracking_number: Option<String>,
    pub is_return: bool,
    pub return_fee: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl Transaction {
    /// Open a new transaction; every transaction starts in domestic transit.
    pub fn open(
        id: TransactionId,
        item_id: ItemId,
        purchase_date: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            item_id,
            order_status: OrderStatus::InTransitDomestic,
            purchase_date,
            launch_date: None,
            sold_date: None,
            purchase_price: PricedAmount::default(),
            sold_price: PricedAmount::default(),
            domestic_shipping: "0".to_string(),
            international_shipping: "0".to_string(),
            other_fees: Vec::new(),
            item_gross_profit: String::new(),
            item_net_profit: String::new(),
            purchase_platform: String::new(),
            sold_platform: String::new(),
            listing_platforms: Vec::new(),
            domestic_tracking_number: None,
            international_tracking_number: None,
            is_return: false,
            return_fee: "0".to_string(),
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn profit_inputs(&self) -> ProfitInputs {
        ProfitInputs {
            sold_price: self.sold_price.amount.clone(),
            sold_currency: self.sold_price.currency.clone(),
            sold_rate: self.sold_price.rate.clone(),
            purchase_price: self.purchase_price.amount.clone(),
            purchase_currency: self.purchase_price.currency.clone(),
            purchase_rate: self.purchase_price.rate.clone(),
            domestic_shipping: self.domestic_shipping.clone(),
            international_shipping: self.international_shipping.clone(),
            other_fees: self
                .other_fees
                .iter()
                .map(|fee| FeeAmount {
                    amount: fee.amount.clone(),
                    currency: fee.currency.clone(),
                })
                .collect(),
        }
    }

    fn store_profit(&mut self, profit: &ProfitBreakdown) {
        self.item_gross_profit = format_amount(profit.gross_profit);
        self.item_net_profit = format_amount(profit.net_profit);
    }

    /// Recompute the derived profit if the priced inputs moved it.
    ///
    /// Returns whether the stored figures changed.
    pub fn refresh_profit(&mut self) -> bool {
        let inputs = self.profit_inputs();
        let gross = Some(self.item_gross_profit.as_str());
        let net = Some(self.item_net_profit.as_str());
        if !should_recalculate(&inputs, gross, net) {
            return false;
        }
        self.store_profit(&calculate_profit(&inputs));
        true
    }

    /// Write a new status under the given policy.
    pub fn change_status(
        &mut self,
        to: OrderStatus,
        policy: TransitionPolicy,
        now: DateTime<Utc>,
    ) -> DomainResult<bool> {
        policy.check(self.order_status, to)?;
        if self.order_status == to {
            return Ok(false);
        }
        self.order_status = to;
        self.updated_at = now;
        Ok(true)
    }

    /// Settle a sold transaction at the given marketplace rate.
    ///
    /// Only `已售出未结算` can be settled. The sale leg is re-recorded in the
    /// marketplace currency at `rate` and the profit recomputed from it.
    pub fn settle(&mut self, rate: f64, now: DateTime<Utc>) -> DomainResult<ProfitBreakdown> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(DomainError::validation(
                "settlement exchange rate must be a positive number",
            ));
        }
        if self.order_status != OrderStatus::SoldUnsettled {
            return Err(DomainError::invariant(format!(
                "cannot settle transaction {} in status {}",
                self.id, self.order_status
            )));
        }

        self.sold_price.currency = MARKETPLACE_CURRENCY.to_string();
        self.sold_price.rate = format_amount(rate);

        let profit = calculate_profit(&self.profit_inputs());
        self.store_profit(&profit);
        self.order_status = OrderStatus::Completed;
        self.updated_at = now;
        Ok(profit)
    }
}

impl AggregateRoot for Transaction {
    type Id = TransactionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}
