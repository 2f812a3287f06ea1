//! Order-status lifecycle of a transaction.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, DomainResult};

/// Lifecycle state of a transaction.
///
/// Serialised with the labels the shop floor uses, which are also what is
/// persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    #[default]
    #[serde(rename = "在途（国内）")]
    InTransitDomestic,
    #[serde(rename = "在途（日本）")]
    InTransitAbroad,
    #[serde(rename = "未上架")]
    Unlisted,
    #[serde(rename = "已上架")]
    Listed,
    #[serde(rename = "交易中")]
    InNegotiation,
    #[serde(rename = "已售出未结算")]
    SoldUnsettled,
    #[serde(rename = "已完成")]
    Completed,
    #[serde(rename = "退货中")]
    Returning,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 8] = [
        OrderStatus::InTransitDomestic,
        OrderStatus::InTransitAbroad,
        OrderStatus::Unlisted,
        OrderStatus::Listed,
        OrderStatus::InNegotiation,
        OrderStatus::SoldUnsettled,
        OrderStatus::Completed,
        OrderStatus::Returning,
    ];

    pub fn label(self) -> &'static str {
        match self {
            OrderStatus::InTransitDomestic => "在途（国内）",
            OrderStatus::InTransitAbroad => "在途（日本）",
            OrderStatus::Unlisted => "未上架",
            OrderStatus::Listed => "已上架",
            OrderStatus::InNegotiation => "交易中",
            OrderStatus::SoldUnsettled => "已售出未结算",
            OrderStatus::Completed => "已完成",
            OrderStatus::Returning => "退货中",
        }
    }

    /// Position along the forward chain; `退货中` sits outside it.
    fn rank(self) -> Option<u8> {
        match self {
            OrderStatus::InTransitDomestic => Some(0),
            OrderStatus::InTransitAbroad => Some(1),
            OrderStatus::Unlisted => Some(2),
            OrderStatus::Listed => Some(3),
            OrderStatus::InNegotiation => Some(4),
            OrderStatus::SoldUnsettled => Some(5),
            OrderStatus::Completed => Some(6),
            OrderStatus::Returning => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == OrderStatus::Completed
    }

    /// The goods have physically arrived and have not been settled yet.
    pub fn is_post_receipt(self) -> bool {
        matches!(
            self,
            OrderStatus::Unlisted
                | OrderStatus::Listed
                | OrderStatus::InNegotiation
                | OrderStatus::SoldUnsettled
        )
    }

    /// Counted as stock on hand in aggregate views.
    pub fn is_in_stock(self) -> bool {
        matches!(
            self,
            OrderStatus::Unlisted
                | OrderStatus::Listed
                | OrderStatus::InNegotiation
                | OrderStatus::Returning
        )
    }

    /// Counted as sold in aggregate views.
    pub fn is_sold(self) -> bool {
        matches!(self, OrderStatus::SoldUnsettled | OrderStatus::Completed)
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.label() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown order status '{s}'")))
    }
}

/// How free-form status writes (everything except settlement) are judged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionPolicy {
    /// Any status may be written, except that only settlement completes a
    /// transaction.
    #[default]
    Permissive,
    /// Forward moves along the lifecycle (skipping allowed), returns from any
    /// post-receipt state, and a returned item back to `未上架`.
    Strict,
}

impl TransitionPolicy {
    pub fn check(self, from: OrderStatus, to: OrderStatus) -> DomainResult<()> {
        if from == to {
            return Ok(());
        }
        if to == OrderStatus::Completed {
            return Err(DomainError::invariant(
                "a transaction can only be completed through settlement",
            ));
        }
        if from.is_terminal() && self == TransitionPolicy::Strict {
            return Err(DomainError::invariant(format!(
                "transaction is already {from}"
            )));
        }

        let allowed = match self {
            TransitionPolicy::Permissive => true,
            TransitionPolicy::Strict => match (from, to) {
                (f, OrderStatus::Returning) => f.is_post_receipt(),
                (OrderStatus::Returning, OrderStatus::Unlisted) => true,
                (f, t) => matches!((f.rank(), t.rank()), (Some(a), Some(b)) if b > a),
            },
        };

        if allowed {
            Ok(())
        } else {
            Err(DomainError::invariant(format!(
                "illegal status transition {from} -> {to}"
            )))
        }
    }
}

impl FromStr for TransitionPolicy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "permissive" => Ok(TransitionPolicy::Permissive),
            "strict" => Ok(TransitionPolicy::Strict),
            other => Err(DomainError::validation(format!(
                "unknown transition policy '{other}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use OrderStatus::*;

    #[test]
    fn labels_round_trip() {
        for status in OrderStatus::ALL {
            assert_eq!(status.label().parse::<OrderStatus>().unwrap(), status);
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.label()));
        }
        assert!("shipped".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn completion_is_reserved_for_settlement() {
        for policy in [TransitionPolicy::Permissive, TransitionPolicy::Strict] {
            assert!(policy.check(SoldUnsettled, Completed).is_err());
            assert!(policy.check(Completed, Completed).is_ok());
        }
    }

    #[test]
    fn permissive_policy_allows_backwards_moves() {
        assert!(TransitionPolicy::Permissive.check(Listed, InTransitDomestic).is_ok());
        assert!(TransitionPolicy::Permissive.check(Completed, Listed).is_ok());
    }

    #[test]
    fn strict_policy_follows_the_lifecycle() {
        let strict = TransitionPolicy::Strict;
        assert!(strict.check(InTransitDomestic, InTransitAbroad).is_ok());
        assert!(strict.check(InTransitDomestic, Unlisted).is_ok());
        assert!(strict.check(Listed, SoldUnsettled).is_ok());
        assert!(strict.check(Listed, Unlisted).is_err());
        assert!(strict.check(Completed, Returning).is_err());
    }

    #[test]
    fn strict_policy_handles_returns() {
        let strict = TransitionPolicy::Strict;
        for from in [Unlisted, Listed, InNegotiation, SoldUnsettled] {
            assert!(strict.check(from, Returning).is_ok(), "{from} -> 退货中");
        }
        assert!(strict.check(InTransitDomestic, Returning).is_err());
        assert!(strict.check(Returning, Unlisted).is_ok());
        assert!(strict.check(Returning, Listed).is_err());
    }
}
