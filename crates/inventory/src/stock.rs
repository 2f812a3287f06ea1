//! Manual stock adjustments (audit-logged corrections of a counted quantity).

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{AdjustmentId, DomainError, DomainResult, ItemId};

/// Reason recorded when the caller gives none.
pub const DEFAULT_ADJUSTMENT_REASON: &str = "手动调整";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustmentType {
    Set,
    Add,
    Subtract,
}

impl AdjustmentType {
    pub fn as_str(self) -> &'static str {
        match self {
            AdjustmentType::Set => "set",
            AdjustmentType::Add => "add",
            AdjustmentType::Subtract => "subtract",
        }
    }
}

impl FromStr for AdjustmentType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "set" => Ok(AdjustmentType::Set),
            "add" => Ok(AdjustmentType::Add),
            "subtract" => Ok(AdjustmentType::Subtract),
            other => Err(DomainError::validation(format!(
                "unknown adjustment type '{other}'"
            ))),
        }
    }
}

/// Compute the stock level after an adjustment.
///
/// `subtract` clamps at zero; any other path that would end below zero is
/// rejected.
pub fn compute_new_stock(kind: AdjustmentType, current: i64, quantity: i64) -> DomainResult<i64> {
    let new_stock = match kind {
        AdjustmentType::Set => Some(quantity),
        AdjustmentType::Add => current.checked_add(quantity),
        AdjustmentType::Subtract => current.checked_sub(quantity).map(|v| v.max(0)),
    }
    .ok_or_else(|| DomainError::validation("stock quantity out of range"))?;

    if new_stock < 0 {
        return Err(DomainError::validation("stock cannot be negative"));
    }
    Ok(new_stock)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockAdjustment {
    pub id: AdjustmentId,
    pub item_id: ItemId,
    pub adjustment_type: AdjustmentType,
    pub quantity: i64,
    pub previous_stock: i64,
    pub new_stock: i64,
    pub reason: String,
    pub remarks: String,
    pub created_at: DateTime<Utc>,
}

impl StockAdjustment {
    pub fn record(
        item_id: ItemId,
        kind: AdjustmentType,
        quantity: i64,
        current: i64,
        reason: Option<String>,
        remarks: Option<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let new_stock = compute_new_stock(kind, current, quantity)?;
        Ok(Self {
            id: AdjustmentId::new(),
            item_id,
            adjustment_type: kind,
            quantity,
            previous_stock: current,
            new_stock,
            reason: reason
                .filter(|r| !r.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_ADJUSTMENT_REASON.to_string()),
            remarks: remarks.unwrap_or_default(),
            created_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtract_clamps_at_zero() {
        assert_eq!(compute_new_stock(AdjustmentType::Subtract, 4, 10).unwrap(), 0);
        assert_eq!(compute_new_stock(AdjustmentType::Subtract, 4, 1).unwrap(), 3);
    }

    #[test]
    fn set_and_add_reject_negative_results() {
        assert!(compute_new_stock(AdjustmentType::Set, 4, -1).is_err());
        assert!(compute_new_stock(AdjustmentType::Add, 4, -5).is_err());
        assert_eq!(compute_new_stock(AdjustmentType::Add, 4, -4).unwrap(), 0);
        assert_eq!(compute_new_stock(AdjustmentType::Set, 4, 9).unwrap(), 9);
    }

    #[test]
    fn unknown_adjustment_type_is_a_validation_error() {
        assert!(matches!("multiply".parse::<AdjustmentType>(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn record_fills_default_reason() {
        let adj = StockAdjustment::record(
            "AB123456".parse().unwrap(),
            AdjustmentType::Add,
            2,
            3,
            None,
            None,
            Utc::now(),
        )
        .unwrap();
        assert_eq!(adj.new_stock, 5);
        assert_eq!(adj.previous_stock, 3);
        assert_eq!(adj.reason, DEFAULT_ADJUSTMENT_REASON);
    }
}
