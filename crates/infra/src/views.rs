//! Derived aggregate views and the read-through coordinator serving them.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, instrument, warn};

use stockledger_core::{AggregateRoot, ItemId, PositionId, TransactionId, WarehouseId};
use stockledger_inventory::{
    Item, OrderStatus, PricedAmount, Transaction, Warehouse, WarehousePosition,
};
use stockledger_pricing::{parse_decimal, round_to};

use crate::cache::{CacheTag, View, ViewCache};
use crate::config::CacheTtls;
use crate::error::{LedgerError, LedgerResult};
use crate::store::LedgerStore;

/// One row of the `items` view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemSummary {
    pub item_id: ItemId,
    pub name: String,
    pub item_number: String,
    pub item_type: String,
    pub brand: String,
    pub size: String,
    pub condition: String,
    pub color: String,
    pub created_at: DateTime<Utc>,
    pub warehouse_position_id: Option<PositionId>,
    pub position_name: Option<String>,
    pub warehouse_name: Option<String>,
    pub transaction_id: Option<TransactionId>,
    pub order_status: Option<OrderStatus>,
    pub purchase_date: Option<DateTime<Utc>>,
    pub sold_date: Option<DateTime<Utc>>,
    pub purchase_price: Option<PricedAmount>,
    pub sold_price: Option<PricedAmount>,
    pub item_gross_profit: Option<String>,
    pub item_net_profit: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerStats {
    pub total_purchase: f64,
    pub total_sold: f64,
    pub total_profit: f64,
    pub average_profit_rate: f64,
    pub in_stock_count: u64,
    pub sold_count: u64,
    pub total_items: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarehouseStats {
    pub total_warehouses: u64,
    pub total_positions: u64,
    pub total_capacity: u64,
    pub total_used: u64,
    pub full_positions: u64,
    pub usage_rate: f64,
}

/// Non-deleted items with their active transaction, newest first.
pub fn summarize_items(
    items: &[Item],
    transactions: &[Transaction],
    positions: &[WarehousePosition],
    warehouses: &[Warehouse],
) -> Vec<ItemSummary> {
    let by_tx: HashMap<TransactionId, &Transaction> =
        transactions.iter().map(|t| (t.id, t)).collect();
    let by_pos: HashMap<PositionId, &WarehousePosition> =
        positions.iter().map(|p| (*p.id(), p)).collect();
    let by_wh: HashMap<WarehouseId, &Warehouse> = warehouses.iter().map(|w| (w.id, w)).collect();

    let mut rows: Vec<ItemSummary> = items
        .iter()
        .filter(|item| !item.deleted)
        .map(|item| {
            let active = item.active_transaction_id.and_then(|id| by_tx.get(&id).copied());
            let position = item.warehouse_position_id.and_then(|id| by_pos.get(&id).copied());
            let warehouse = position.and_then(|p| by_wh.get(&p.warehouse_id()).copied());
            ItemSummary {
                item_id: item.id.clone(),
                name: item.details.name.clone(),
                item_number: item.details.item_number.clone(),
                item_type: item.details.item_type.clone(),
                brand: item.details.brand.clone(),
                size: item.details.size.clone(),
                condition: item.details.condition.clone(),
                color: item.details.color.clone(),
                created_at: item.created_at,
                warehouse_position_id: item.warehouse_position_id,
                position_name: position.map(|p| p.name().to_string()),
                warehouse_name: warehouse.map(|w| w.name.clone()),
                transaction_id: active.map(|t| t.id),
                order_status: active.map(|t| t.order_status),
                purchase_date: active.map(|t| t.purchase_date),
                sold_date: active.and_then(|t| t.sold_date),
                purchase_price: active.map(|t| t.purchase_price.clone()),
                sold_price: active.map(|t| t.sold_price.clone()),
                item_gross_profit: active.map(|t| t.item_gross_profit.clone()),
                item_net_profit: active.map(|t| t.item_net_profit.clone()),
            }
        })
        .collect();

    rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.item_id.cmp(&b.item_id)));
    rows
}

/// Totals over the active transactions of non-deleted items.
pub fn compute_stats(item_count: usize, transactions: &[Transaction]) -> LedgerStats {
    let mut stats = LedgerStats {
        total_items: item_count as u64,
        ..LedgerStats::default()
    };

    for tx in transactions {
        let inputs = tx.profit_inputs();
        stats.total_purchase += inputs.purchase_base();
        stats.total_sold += inputs.sold_base();
        stats.total_profit += parse_decimal(&tx.item_net_profit).unwrap_or(0.0);
        if tx.order_status.is_in_stock() {
            stats.in_stock_count += 1;
        }
        if tx.order_status.is_sold() {
            stats.sold_count += 1;
        }
    }

    stats.total_purchase = round_to(stats.total_purchase, 2);
    stats.total_sold = round_to(stats.total_sold, 2);
    stats.total_profit = round_to(stats.total_profit, 2);
    stats.average_profit_rate = if stats.total_purchase > 0.0 {
        round_to(stats.total_profit / stats.total_purchase * 100.0, 2)
    } else {
        0.0
    };
    stats
}

/// Distinct `YYYY-MM` purchase months, newest first.
pub fn compute_months(transactions: &[Transaction]) -> Vec<String> {
    let months: BTreeSet<String> = transactions
        .iter()
        .map(|t| t.purchase_date.format("%Y-%m").to_string())
        .collect();
    months.into_iter().rev().collect()
}

pub fn compute_warehouse_stats(
    warehouses: &[Warehouse],
    positions: &[WarehousePosition],
) -> WarehouseStats {
    let total_capacity: u64 = positions.iter().map(|p| u64::from(p.capacity())).sum();
    let total_used: u64 = positions.iter().map(|p| u64::from(p.used())).sum();
    let usage_rate = if total_capacity > 0 {
        round_to(total_used as f64 / total_capacity as f64 * 100.0, 1)
    } else {
        0.0
    };
    WarehouseStats {
        total_warehouses: warehouses.len() as u64,
        total_positions: positions.len() as u64,
        total_capacity,
        total_used,
        full_positions: positions.iter().filter(|p| p.is_full()).count() as u64,
        usage_rate,
    }
}

/// Read-through cache over the derived views.
///
/// Cache failures never fail a read: a broken backend degrades to
/// recomputing on every request.
pub struct DerivedViews {
    store: Arc<dyn LedgerStore>,
    cache: Arc<dyn ViewCache>,
    ttls: CacheTtls,
}

impl DerivedViews {
    pub fn new(store: Arc<dyn LedgerStore>, cache: Arc<dyn ViewCache>, ttls: CacheTtls) -> Self {
        Self { store, cache, ttls }
    }

    fn ttl(&self, view: View) -> Duration {
        let secs = match view {
            View::Items => self.ttls.items_secs,
            View::Stats => self.ttls.stats_secs,
            View::Months => self.ttls.months_secs,
            View::Warehouses => self.ttls.warehouses_secs,
        };
        Duration::from_secs(secs)
    }

    /// Serve `view` from cache, recomputing and storing it on a miss.
    #[instrument(skip(self), fields(view = view.key()), err)]
    pub async fn get(&self, view: View) -> LedgerResult<JsonValue> {
        match self.cache.get(view.key()).await {
            Ok(Some(value)) => {
                debug!("view cache hit");
                return Ok(value);
            }
            Ok(None) => debug!("view cache miss"),
            Err(err) => warn!(error = %err, "view cache read failed"),
        }

        let value = self.compute(view).await?;
        if let Err(err) = self
            .cache
            .set(view.key(), &value, view.tags(), self.ttl(view))
            .await
        {
            warn!(error = %err, "view cache write failed");
        }
        Ok(value)
    }

    async fn compute(&self, view: View) -> LedgerResult<JsonValue> {
        let value = match view {
            View::Items => {
                let items = self.store.list_items().await?;
                let transactions = self.store.list_active_transactions().await?;
                let positions = self.store.list_positions().await?;
                let warehouses = self.store.list_warehouses().await?;
                serde_json::to_value(summarize_items(&items, &transactions, &positions, &warehouses))
            }
            View::Stats => {
                let items = self.store.list_items().await?;
                let transactions = self.store.list_active_transactions().await?;
                serde_json::to_value(compute_stats(items.len(), &transactions))
            }
            View::Months => {
                let transactions = self.store.list_active_transactions().await?;
                serde_json::to_value(compute_months(&transactions))
            }
            View::Warehouses => {
                let warehouses = self.store.list_warehouses().await?;
                let positions = self.store.list_positions().await?;
                serde_json::to_value(compute_warehouse_stats(&warehouses, &positions))
            }
        };
        value.map_err(|e| LedgerError::internal(format!("serialize view {}: {e}", view.key())))
    }

    async fn typed<T: serde::de::DeserializeOwned>(&self, view: View) -> LedgerResult<T> {
        let value = self.get(view).await?;
        serde_json::from_value(value)
            .map_err(|e| LedgerError::internal(format!("decode view {}: {e}", view.key())))
    }

    pub async fn items(&self) -> LedgerResult<Vec<ItemSummary>> {
        self.typed(View::Items).await
    }

    pub async fn stats(&self) -> LedgerResult<LedgerStats> {
        self.typed(View::Stats).await
    }

    pub async fn months(&self) -> LedgerResult<Vec<String>> {
        self.typed(View::Months).await
    }

    pub async fn warehouse_stats(&self) -> LedgerResult<WarehouseStats> {
        self.typed(View::Warehouses).await
    }

    /// Drop every cached view carrying one of `tags`.
    pub async fn invalidate(&self, tags: &[CacheTag]) {
        for tag in tags {
            match self.cache.invalidate(*tag).await {
                Ok(dropped) => debug!(tag = %tag, dropped, "cache tag invalidated"),
                Err(err) => warn!(tag = %tag, error = %err, "cache invalidation failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use stockledger_core::TransactionId;
    use stockledger_inventory::ItemDetails;

    use crate::cache::InMemoryViewCache;
    use crate::store::{InMemoryLedgerStore, LedgerStore};

    fn at(year: i32, month: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, 3, 12, 0, 0).unwrap()
    }

    fn transaction(status: OrderStatus, purchase: &str, sold: &str, net: &str, month: u32) -> Transaction {
        let mut tx = Transaction::open(
            TransactionId::new(),
            "AB000001".parse().unwrap(),
            at(2024, month),
            at(2024, month),
        );
        tx.order_status = status;
        tx.purchase_price = PricedAmount::base(purchase);
        tx.sold_price = PricedAmount::new(sold, "JPY", "0.05");
        tx.item_net_profit = net.to_string();
        tx
    }

    #[test]
    fn stats_split_stock_and_sold() {
        let txs = vec![
            transaction(OrderStatus::Listed, "100", "0", "", 1),
            transaction(OrderStatus::SoldUnsettled, "200", "6000", "100", 2),
            transaction(OrderStatus::Completed, "300", "10000", "200", 2),
            transaction(OrderStatus::InTransitDomestic, "400", "0", "", 3),
        ];
        let stats = compute_stats(4, &txs);
        assert_eq!(stats.total_items, 4);
        assert_eq!(stats.in_stock_count, 1);
        assert_eq!(stats.sold_count, 2);
        assert_eq!(stats.total_purchase, 1000.0);
        assert_eq!(stats.total_sold, 800.0);
        assert_eq!(stats.total_profit, 300.0);
        assert_eq!(stats.average_profit_rate, 30.0);
    }

    #[test]
    fn months_are_distinct_and_newest_first() {
        let txs = vec![
            transaction(OrderStatus::Listed, "1", "0", "", 1),
            transaction(OrderStatus::Listed, "1", "0", "", 11),
            transaction(OrderStatus::Listed, "1", "0", "", 1),
        ];
        assert_eq!(compute_months(&txs), vec!["2024-11".to_string(), "2024-01".to_string()]);
    }

    #[test]
    fn warehouse_usage_rate_has_one_decimal() {
        let wh = Warehouse::new(WarehouseId::new(), "Tokyo", at(2024, 1)).unwrap();
        let mut a = WarehousePosition::new(PositionId::new(), wh.id, "A", 3).unwrap();
        let b = WarehousePosition::new(PositionId::new(), wh.id, "B", 3).unwrap();
        a.occupy().unwrap();
        a.occupy().unwrap();
        a.occupy().unwrap();
        let stats = compute_warehouse_stats(&[wh], &[a, b]);
        assert_eq!(stats.total_capacity, 6);
        assert_eq!(stats.total_used, 3);
        assert_eq!(stats.full_positions, 1);
        assert_eq!(stats.usage_rate, 50.0);
    }

    #[tokio::test]
    async fn invalidation_forces_recompute_within_ttl() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let views = DerivedViews::new(
            store.clone(),
            Arc::new(InMemoryViewCache::new()),
            CacheTtls::default(),
        );
        assert_eq!(views.stats().await.unwrap().total_items, 0);

        // Write behind the coordinator's back: the cached figure stays stale.
        let details = ItemDetails {
            name: "Figure".to_string(),
            ..ItemDetails::default()
        };
        let item = Item::new("AB000001".parse().unwrap(), details, at(2024, 1)).unwrap();
        let mut tx = store.begin().await.unwrap();
        tx.insert_item(&item).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(views.stats().await.unwrap().total_items, 0);

        views.invalidate(&[CacheTag::Stats]).await;
        assert_eq!(views.stats().await.unwrap().total_items, 1);
    }
}
