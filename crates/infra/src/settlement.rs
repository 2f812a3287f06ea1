//! Batch settlement of sold transactions.
//!
//! Each item settles in its own unit of work; a failing item is counted and
//! skipped, never rolling back items settled before it. The ledger view tags
//! are invalidated once after the whole batch.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use stockledger_core::ItemId;

use crate::cache::CacheTag;
use crate::error::{LedgerError, LedgerResult};
use crate::store::{LedgerStore, LedgerTx, run_in_transaction};
use crate::views::DerivedViews;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementOutcome {
    pub success_count: usize,
    pub error_count: usize,
}

pub struct SettlementOrchestrator {
    store: Arc<dyn LedgerStore>,
    views: Arc<DerivedViews>,
}

impl SettlementOrchestrator {
    pub fn new(store: Arc<dyn LedgerStore>, views: Arc<DerivedViews>) -> Self {
        Self { store, views }
    }

    /// Settle every listed item at `exchange_rate` (marketplace currency to base).
    ///
    /// Fails as a whole only when the request itself is unusable (no items,
    /// non-positive rate); otherwise `success_count + error_count` always
    /// equals `item_ids.len()`.
    #[instrument(skip(self, item_ids), fields(items = item_ids.len()), err)]
    pub async fn settle_batch(
        &self,
        item_ids: &[String],
        exchange_rate: f64,
    ) -> LedgerResult<SettlementOutcome> {
        if item_ids.is_empty() {
            return Err(LedgerError::validation("select at least one item to settle"));
        }
        if !exchange_rate.is_finite() || exchange_rate <= 0.0 {
            return Err(LedgerError::validation(
                "exchange rate must be a positive number",
            ));
        }

        let mut outcome = SettlementOutcome::default();
        for raw_id in item_ids {
            match self.settle_one(raw_id, exchange_rate).await {
                Ok(()) => outcome.success_count += 1,
                Err(err) => {
                    warn!(item_id = %raw_id, error = %err, "item settlement failed");
                    outcome.error_count += 1;
                }
            }
        }

        self.views.invalidate(&CacheTag::LEDGER).await;
        info!(
            success = outcome.success_count,
            errors = outcome.error_count,
            "settlement batch finished"
        );
        Ok(outcome)
    }

    async fn settle_one(&self, raw_id: &str, exchange_rate: f64) -> LedgerResult<()> {
        let item_id: ItemId = raw_id.parse()?;
        let staged_id = item_id.clone();
        let result = run_in_transaction(self.store.as_ref(), move |tx| {
            Box::pin(async move { settle_staged(tx, &staged_id, exchange_rate).await })
        })
        .await;

        match result {
            Err(LedgerError::Conflict(msg)) => Err(self.conflict_outcome(&item_id, msg).await),
            other => other,
        }
    }

    /// A lost race against a delete reads as "not found", anything else stays a conflict.
    async fn conflict_outcome(&self, item_id: &ItemId, msg: String) -> LedgerError {
        match self.store.get_item(item_id).await {
            Ok(Some(item)) if !item.deleted => LedgerError::Conflict(msg),
            Ok(_) => LedgerError::not_found(format!("item {item_id}")),
            Err(err) => err,
        }
    }
}

/// Settle the active transaction of a live item within `tx`.
///
/// The item is rewritten alongside the transaction so a concurrent soft
/// delete fails this unit's version check instead of slipping past it.
async fn settle_staged(
    tx: &mut dyn LedgerTx,
    item_id: &ItemId,
    exchange_rate: f64,
) -> LedgerResult<()> {
    let now = Utc::now();
    let (mut item, active) = tx
        .get_item_with_active(item_id)
        .await?
        .ok_or_else(|| LedgerError::not_found(format!("item {item_id}")))?;
    item.ensure_live()?;
    let mut transaction = active.ok_or_else(|| {
        LedgerError::not_found(format!("active transaction of item {item_id}"))
    })?;

    transaction.settle(exchange_rate, now)?;
    tx.update_transaction(&transaction).await?;
    item.updated_at = now;
    tx.update_item(&item).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use stockledger_core::TransactionId;
    use stockledger_inventory::{
        Item, ItemDetails, OrderStatus, OtherFee, PricedAmount, Transaction,
    };

    use crate::cache::InMemoryViewCache;
    use crate::config::CacheTtls;
    use crate::store::InMemoryLedgerStore;

    struct Fixture {
        store: Arc<InMemoryLedgerStore>,
        orchestrator: SettlementOrchestrator,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryLedgerStore::new());
        let views = Arc::new(DerivedViews::new(
            store.clone(),
            Arc::new(InMemoryViewCache::new()),
            CacheTtls::default(),
        ));
        Fixture {
            orchestrator: SettlementOrchestrator::new(store.clone(), views),
            store,
        }
    }

    async fn seed(store: &InMemoryLedgerStore, id: &str, status: OrderStatus) {
        let now = Utc::now();
        let details = ItemDetails {
            name: format!("item {id}"),
            ..ItemDetails::default()
        };
        let mut item = Item::new(id.parse().unwrap(), details, now).unwrap();
        let mut tx = Transaction::open(TransactionId::new(), item.id.clone(), now, now);
        tx.order_status = status;
        tx.purchase_price = PricedAmount::base("300");
        tx.sold_price = PricedAmount::new("10000", "JPY", "");
        tx.domestic_shipping = "20".to_string();
        tx.international_shipping = "100".to_string();
        tx.other_fees = vec![OtherFee {
            fee_type: "packaging".to_string(),
            amount: "5".to_string(),
            currency: "CNY".to_string(),
            description: String::new(),
        }];
        item.active_transaction_id = Some(tx.id);

        let mut unit = store.begin().await.unwrap();
        unit.insert_item(&item).await.unwrap();
        unit.insert_transaction(&tx).await.unwrap();
        unit.commit().await.unwrap();
    }

    fn ids(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn one_unsettleable_item_does_not_abort_the_batch() {
        let f = fixture();
        seed(&f.store, "AA000001", OrderStatus::SoldUnsettled).await;
        seed(&f.store, "AA000002", OrderStatus::InTransitDomestic).await;
        seed(&f.store, "AA000003", OrderStatus::SoldUnsettled).await;

        let outcome = f
            .orchestrator
            .settle_batch(&ids(&["AA000001", "AA000002", "AA000003"]), 0.05)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            SettlementOutcome {
                success_count: 2,
                error_count: 1
            }
        );

        let settled = f
            .store
            .get_active_transaction(&"AA000001".parse().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(settled.order_status, OrderStatus::Completed);
        assert_eq!(settled.sold_price.currency, "JPY");
        assert_eq!(settled.sold_price.rate, "0.05");
        assert_eq!(settled.item_net_profit, "75");
        assert_eq!(settled.item_gross_profit, "75");

        let untouched = f
            .store
            .get_active_transaction(&"AA000002".parse().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(untouched.order_status, OrderStatus::InTransitDomestic);
        assert_eq!(untouched.version, 1);
    }

    #[tokio::test]
    async fn settling_twice_counts_the_second_run_as_errors() {
        let f = fixture();
        seed(&f.store, "AA000001", OrderStatus::SoldUnsettled).await;
        let batch = ids(&["AA000001"]);

        let first = f.orchestrator.settle_batch(&batch, 0.05).await.unwrap();
        let second = f.orchestrator.settle_batch(&batch, 0.05).await.unwrap();
        assert_eq!(first.success_count, 1);
        assert_eq!(second.error_count, 1);
    }

    #[tokio::test]
    async fn settlement_racing_a_delete_does_not_commit() {
        let f = fixture();
        seed(&f.store, "AA000001", OrderStatus::SoldUnsettled).await;
        let id: ItemId = "AA000001".parse().unwrap();

        let mut settling = f.store.begin().await.unwrap();
        settle_staged(settling.as_mut(), &id, 0.05).await.unwrap();

        let mut deleting = f.store.begin().await.unwrap();
        let mut item = deleting.get_item(&id).await.unwrap().unwrap();
        item.soft_delete(Utc::now()).unwrap();
        deleting.update_item(&item).await.unwrap();
        deleting.commit().await.unwrap();

        assert!(matches!(settling.commit().await, Err(LedgerError::Conflict(_))));
        let active = f.store.get_active_transaction(&id).await.unwrap().unwrap();
        assert_eq!(active.order_status, OrderStatus::SoldUnsettled);

        let err = f
            .orchestrator
            .conflict_outcome(&id, "stale item".to_string())
            .await;
        assert!(matches!(err, LedgerError::NotFound(_)));
    }

    #[tokio::test]
    async fn unusable_requests_are_rejected_up_front() {
        let f = fixture();
        assert!(matches!(
            f.orchestrator.settle_batch(&[], 0.05).await,
            Err(LedgerError::Validation(_))
        ));
        assert!(matches!(
            f.orchestrator.settle_batch(&ids(&["AA000001"]), 0.0).await,
            Err(LedgerError::Validation(_))
        ));
        assert!(matches!(
            f.orchestrator.settle_batch(&ids(&["AA000001"]), f64::NAN).await,
            Err(LedgerError::Validation(_))
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn every_item_is_counted_exactly_once(
            statuses in prop::collection::vec(prop::sample::select(OrderStatus::ALL.to_vec()), 0..6),
            junk in prop::collection::vec("[a-z0-9]{0,9}", 0..3),
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let f = fixture();
                let mut batch = Vec::new();
                for (idx, status) in statuses.iter().enumerate() {
                    let id = format!("PT{idx:06}");
                    seed(&f.store, &id, *status).await;
                    batch.push(id);
                }
                batch.extend(junk);
                batch.push("ZZ999999".to_string());

                let expected_success = statuses
                    .iter()
                    .filter(|s| **s == OrderStatus::SoldUnsettled)
                    .count();
                let outcome = f.orchestrator.settle_batch(&batch, 0.05).await.unwrap();
                assert_eq!(outcome.success_count + outcome.error_count, batch.len());
                assert_eq!(outcome.success_count, expected_success);
            });
        }
    }
}
