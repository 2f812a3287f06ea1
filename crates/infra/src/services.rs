//! Ledger write services.
//!
//! Every mutation runs in one unit of work (item, transaction and position
//! counters together) and invalidates the affected view tags only after the
//! unit committed.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use stockledger_core::{ItemId, PositionId, TransactionId, WarehouseId};
use stockledger_inventory::{
    AdjustmentType, Item, ItemDetails, OrderStatus, OtherFee, PricedAmount, StockAdjustment,
    Transaction, TransitionPolicy, Warehouse, WarehousePosition, generate_item_id,
};
use stockledger_pricing::{MARKETPLACE_CURRENCY, decimal_text};

use crate::allocator::move_position;
use crate::cache::CacheTag;
use crate::error::{LedgerError, LedgerResult};
use crate::store::{LedgerStore, LedgerTx, run_in_transaction};
use crate::views::DerivedViews;

const ID_ATTEMPTS: usize = 10;

/// Rate pre-filled on the sale leg of a copied item.
pub const COPY_SALE_RATE: &str = "0.05";

/// Commercial fields shared by create and update requests.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransactionPatch {
    pub order_status: Option<OrderStatus>,
    pub purchase_date: Option<DateTime<Utc>>,
    pub launch_date: Option<DateTime<Utc>>,
    pub sold_date: Option<DateTime<Utc>>,
    pub purchase_price: Option<PricedAmount>,
    pub sold_price: Option<PricedAmount>,
    #[serde(deserialize_with = "decimal_text::opt_text")]
    pub domestic_shipping: Option<String>,
    #[serde(deserialize_with = "decimal_text::opt_text")]
    pub international_shipping: Option<String>,
    pub other_fees: Option<Vec<OtherFee>>,
    pub purchase_platform: Option<String>,
    pub sold_platform: Option<String>,
    pub listing_platforms: Option<Vec<String>>,
    pub domestic_tracking_number: Option<String>,
    pub international_tracking_number: Option<String>,
    pub is_return: Option<bool>,
    #[serde(deserialize_with = "decimal_text::opt_text")]
    pub return_fee: Option<String>,
}

impl TransactionPatch {
    /// Copy every priced/descriptive field that is present. Status is
    /// handled separately because it goes through the transition policy.
    fn apply_fields(&self, tx: &mut Transaction) {
        if let Some(v) = self.purchase_date {
            tx.purchase_date = v;
        }
        if let Some(v) = self.launch_date {
            tx.launch_date = Some(v);
        }
        if let Some(v) = self.sold_date {
            tx.sold_date = Some(v);
        }
        if let Some(v) = &self.purchase_price {
            tx.purchase_price = v.clone();
        }
        if let Some(v) = &self.sold_price {
            tx.sold_price = v.clone();
        }
        if let Some(v) = &self.domestic_shipping {
            tx.domestic_shipping = v.clone();
        }
        if let Some(v) = &self.international_shipping {
            tx.international_shipping = v.clone();
        }
        if let Some(v) = &self.other_fees {
            tx.other_fees = v.clone();
        }
        if let Some(v) = &self.purchase_platform {
            tx.purchase_platform = v.clone();
        }
        if let Some(v) = &self.sold_platform {
            tx.sold_platform = v.clone();
        }
        if let Some(v) = &self.listing_platforms {
            tx.listing_platforms = v.clone();
        }
        if let Some(v) = &self.domestic_tracking_number {
            tx.domestic_tracking_number = Some(v.clone());
        }
        if let Some(v) = &self.international_tracking_number {
            tx.international_tracking_number = Some(v.clone());
        }
        if let Some(v) = self.is_return {
            tx.is_return = v;
        }
        if let Some(v) = &self.return_fee {
            tx.return_fee = v.clone();
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ItemDraft {
    /// Caller-chosen id; generated when absent.
    pub item_id: Option<String>,
    #[serde(flatten)]
    pub details: ItemDetails,
    pub warehouse_position_id: Option<PositionId>,
    #[serde(flatten)]
    pub transaction: TransactionPatch,
}

/// Intake of the item alone; its first transaction is opened by a later
/// update or append.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SkuDraft {
    pub item_id: Option<String>,
    #[serde(flatten)]
    pub details: ItemDetails,
    pub warehouse_position_id: Option<PositionId>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ItemPatch {
    pub details: Option<ItemDetails>,
    pub warehouse_position_id: Option<PositionId>,
    /// Take the item out of its position (ignored when a new position is given).
    pub clear_position: bool,
    #[serde(flatten)]
    pub transaction: TransactionPatch,
}

/// An item with its active transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRecord {
    pub item: Item,
    pub transaction: Option<Transaction>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockAdjustmentRequest {
    pub item_id: String,
    pub adjustment_type: String,
    pub quantity: i64,
    #[serde(default)]
    pub current_stock: i64,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionAction {
    Add,
    Remove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStatusOutcome {
    pub updated_count: usize,
    pub rejected_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WarehouseOverview {
    #[serde(flatten)]
    pub warehouse: Warehouse,
    pub positions: Vec<WarehousePosition>,
}

/// Tags to drop after a write, depending on whether position counters moved.
fn ledger_tags(positions_touched: bool) -> Vec<CacheTag> {
    let mut tags = CacheTag::LEDGER.to_vec();
    if positions_touched {
        tags.push(CacheTag::Warehouses);
    }
    tags
}

/// Pick an id nobody uses yet, or honour the caller's choice.
async fn claim_item_id(tx: &mut dyn LedgerTx, requested: Option<String>) -> LedgerResult<ItemId> {
    if let Some(raw) = requested.filter(|s| !s.trim().is_empty()) {
        let id: ItemId = raw.trim().parse()?;
        if tx.get_item(&id).await?.is_some() {
            return Err(LedgerError::conflict(format!("item {id} already exists")));
        }
        return Ok(id);
    }

    for _ in 0..ID_ATTEMPTS {
        let candidate = generate_item_id(&mut rand::thread_rng())?;
        if tx.get_item(&candidate).await?.is_none() {
            return Ok(candidate);
        }
    }
    Err(LedgerError::conflict(format!(
        "no free item id after {ID_ATTEMPTS} attempts"
    )))
}

async fn load_live(tx: &mut dyn LedgerTx, id: &ItemId) -> LedgerResult<(Item, Option<Transaction>)> {
    let (item, active) = tx
        .get_item_with_active(id)
        .await?
        .ok_or_else(|| LedgerError::not_found(format!("item {id}")))?;
    item.ensure_live()?;
    Ok((item, active))
}

pub struct LedgerService {
    store: Arc<dyn LedgerStore>,
    views: Arc<DerivedViews>,
    policy: TransitionPolicy,
}

impl LedgerService {
    pub fn new(store: Arc<dyn LedgerStore>, views: Arc<DerivedViews>, policy: TransitionPolicy) -> Self {
        Self {
            store,
            views,
            policy,
        }
    }

    pub fn policy(&self) -> TransitionPolicy {
        self.policy
    }

    pub async fn get_item(&self, raw_id: &str) -> LedgerResult<ItemRecord> {
        let id: ItemId = raw_id.parse()?;
        let item = self
            .store
            .get_item(&id)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("item {id}")))?;
        item.ensure_live()?;
        let transaction = self.store.get_active_transaction(&id).await?;
        Ok(ItemRecord { item, transaction })
    }

    /// Intake: a new item and its first transaction (always `在途（国内）`).
    #[instrument(skip(self, draft), err)]
    pub async fn create_item(&self, draft: ItemDraft) -> LedgerResult<ItemRecord> {
        let positioned = draft.warehouse_position_id.is_some();
        let record = run_in_transaction(self.store.as_ref(), move |tx| {
            Box::pin(async move {
                let now = Utc::now();
                let id = claim_item_id(tx, draft.item_id).await?;
                let mut item = Item::new(id.clone(), draft.details, now)?;

                let mut transaction = Transaction::open(
                    TransactionId::new(),
                    id.clone(),
                    draft.transaction.purchase_date.unwrap_or(now),
                    now,
                );
                draft.transaction.apply_fields(&mut transaction);
                transaction.refresh_profit();
                item.active_transaction_id = Some(transaction.id);

                if let Some(target) = draft.warehouse_position_id {
                    move_position(tx, &id, None, Some(target)).await?;
                    item.warehouse_position_id = Some(target);
                }

                item.version = tx.insert_item(&item).await?;
                transaction.version = tx.insert_transaction(&transaction).await?;
                Ok(ItemRecord {
                    item,
                    transaction: Some(transaction),
                })
            })
        })
        .await?;

        self.views.invalidate(&ledger_tags(positioned)).await;
        info!(item_id = %record.item.id, "item created");
        Ok(record)
    }

    /// Intake of an item without any transaction.
    #[instrument(skip(self, draft), err)]
    pub async fn create_sku(&self, draft: SkuDraft) -> LedgerResult<ItemRecord> {
        let positioned = draft.warehouse_position_id.is_some();
        let item = run_in_transaction(self.store.as_ref(), move |tx| {
            Box::pin(async move {
                let now = Utc::now();
                let id = claim_item_id(tx, draft.item_id).await?;
                let mut item = Item::new(id.clone(), draft.details, now)?;

                if let Some(target) = draft.warehouse_position_id {
                    move_position(tx, &id, None, Some(target)).await?;
                    item.warehouse_position_id = Some(target);
                }

                item.version = tx.insert_item(&item).await?;
                Ok(item)
            })
        })
        .await?;

        self.views.invalidate(&ledger_tags(positioned)).await;
        info!(item_id = %item.id, "sku created");
        Ok(ItemRecord {
            item,
            transaction: None,
        })
    }

    /// Open a new transaction for an existing item and make it the active
    /// one. Earlier transactions are kept unchanged as history.
    #[instrument(skip(self, patch), err)]
    pub async fn append_transaction(
        &self,
        raw_id: &str,
        patch: TransactionPatch,
    ) -> LedgerResult<ItemRecord> {
        let id: ItemId = raw_id.parse()?;
        let policy = self.policy;
        let (record, previous) = run_in_transaction(self.store.as_ref(), move |tx| {
            Box::pin(async move {
                let now = Utc::now();
                let (mut item, _) = load_live(tx, &id).await?;
                let previous = item.active_transaction_id;

                let mut transaction = Transaction::open(
                    TransactionId::new(),
                    id.clone(),
                    patch.purchase_date.unwrap_or(now),
                    now,
                );
                if let Some(status) = patch.order_status {
                    transaction.change_status(status, policy, now)?;
                }
                patch.apply_fields(&mut transaction);
                transaction.refresh_profit();
                transaction.version = tx.insert_transaction(&transaction).await?;

                item.active_transaction_id = Some(transaction.id);
                item.updated_at = now;
                item.version = tx.update_item(&item).await?;
                Ok((
                    ItemRecord {
                        item,
                        transaction: Some(transaction),
                    },
                    previous,
                ))
            })
        })
        .await?;

        self.views.invalidate(&CacheTag::LEDGER).await;
        info!(
            item_id = %record.item.id,
            previous = ?previous,
            "transaction appended"
        );
        Ok(record)
    }

    #[instrument(skip(self, patch), err)]
    pub async fn update_item(&self, raw_id: &str, patch: ItemPatch) -> LedgerResult<ItemRecord> {
        let id: ItemId = raw_id.parse()?;
        let policy = self.policy;
        let (record, positions_touched) = run_in_transaction(self.store.as_ref(), move |tx| {
            Box::pin(async move {
                let now = Utc::now();
                let (mut item, active) = load_live(tx, &id).await?;

                if let Some(details) = patch.details {
                    item.update_details(details, now)?;
                }

                let current = item.warehouse_position_id;
                let target = match patch.warehouse_position_id {
                    Some(p) => Some(p),
                    None if patch.clear_position => None,
                    None => current,
                };
                let moved = move_position(tx, &id, current, target).await?;
                item.warehouse_position_id = target;

                let mut transaction = match active {
                    Some(t) => t,
                    None => {
                        let fresh = Transaction::open(TransactionId::new(), id.clone(), now, now);
                        item.active_transaction_id = Some(fresh.id);
                        tx.insert_transaction(&fresh).await?;
                        Transaction {
                            version: 1,
                            ..fresh
                        }
                    }
                };
                if let Some(status) = patch.transaction.order_status {
                    transaction.change_status(status, policy, now)?;
                }
                patch.transaction.apply_fields(&mut transaction);
                transaction.refresh_profit();
                transaction.updated_at = now;
                item.updated_at = now;

                transaction.version = tx.update_transaction(&transaction).await?;
                item.version = tx.update_item(&item).await?;
                Ok((
                    ItemRecord {
                        item,
                        transaction: Some(transaction),
                    },
                    moved.touched_positions(),
                ))
            })
        })
        .await?;

        self.views.invalidate(&ledger_tags(positions_touched)).await;
        Ok(record)
    }

    /// Soft delete; the item's position slot is given back.
    #[instrument(skip(self), err)]
    pub async fn delete_item(&self, raw_id: &str) -> LedgerResult<()> {
        let id: ItemId = raw_id.parse()?;
        let positions_touched = run_in_transaction(self.store.as_ref(), move |tx| {
            Box::pin(async move {
                let (mut item, _) = load_live(tx, &id).await?;
                let moved = move_position(tx, &id, item.warehouse_position_id, None).await?;
                item.warehouse_position_id = None;
                item.soft_delete(Utc::now())?;
                tx.update_item(&item).await?;
                Ok(moved.touched_positions())
            })
        })
        .await?;

        self.views.invalidate(&ledger_tags(positions_touched)).await;
        Ok(())
    }

    /// Duplicate an item's descriptive fields and position under a new id,
    /// with a fresh transaction in `在途（国内）`.
    #[instrument(skip(self), err)]
    pub async fn copy_item(&self, raw_id: &str) -> LedgerResult<ItemRecord> {
        let source_id: ItemId = raw_id.parse()?;
        let record = run_in_transaction(self.store.as_ref(), move |tx| {
            Box::pin(async move {
                let now = Utc::now();
                let (source, source_tx) = load_live(tx, &source_id).await?;
                let id = claim_item_id(tx, None).await?;
                let mut item = source.duplicate(id.clone(), now);

                if let Some(target) = item.warehouse_position_id {
                    move_position(tx, &id, None, Some(target)).await?;
                }

                let purchase_date = source_tx.map(|t| t.purchase_date).unwrap_or(now);
                let mut transaction =
                    Transaction::open(TransactionId::new(), id.clone(), purchase_date, now);
                transaction.sold_price = PricedAmount::new("0", MARKETPLACE_CURRENCY, COPY_SALE_RATE);
                transaction.item_gross_profit = "0".to_string();
                transaction.item_net_profit = "0".to_string();
                item.active_transaction_id = Some(transaction.id);

                item.version = tx.insert_item(&item).await?;
                transaction.version = tx.insert_transaction(&transaction).await?;
                Ok(ItemRecord {
                    item,
                    transaction: Some(transaction),
                })
            })
        })
        .await?;

        let positioned = record.item.warehouse_position_id.is_some();
        self.views.invalidate(&ledger_tags(positioned)).await;
        info!(source = %raw_id, item_id = %record.item.id, "item copied");
        Ok(record)
    }

    /// Write one status to many items; each item is checked against the
    /// transition policy on its own.
    #[instrument(skip(self, item_ids), fields(items = item_ids.len()), err)]
    pub async fn batch_update_status(
        &self,
        item_ids: &[String],
        status: OrderStatus,
    ) -> LedgerResult<BatchStatusOutcome> {
        if item_ids.is_empty() {
            return Err(LedgerError::validation("provide at least one item id"));
        }

        let mut outcome = BatchStatusOutcome::default();
        for raw_id in item_ids {
            match self.update_status(raw_id, status).await {
                Ok(()) => outcome.updated_count += 1,
                Err(err) => {
                    warn!(item_id = %raw_id, error = %err, "status update rejected");
                    outcome.rejected_count += 1;
                }
            }
        }

        self.views.invalidate(&CacheTag::LEDGER).await;
        Ok(outcome)
    }

    async fn update_status(&self, raw_id: &str, status: OrderStatus) -> LedgerResult<()> {
        let id: ItemId = raw_id.parse()?;
        let policy = self.policy;
        run_in_transaction(self.store.as_ref(), move |tx| {
            Box::pin(async move {
                let (_, active) = load_live(tx, &id).await?;
                let mut transaction = active.ok_or_else(|| {
                    LedgerError::not_found(format!("active transaction of item {id}"))
                })?;
                if transaction.change_status(status, policy, Utc::now())? {
                    tx.update_transaction(&transaction).await?;
                }
                Ok(())
            })
        })
        .await
    }

    /// Record a manual stock correction.
    #[instrument(skip(self, request), fields(item_id = %request.item_id), err)]
    pub async fn adjust_stock(&self, request: StockAdjustmentRequest) -> LedgerResult<StockAdjustment> {
        let kind: AdjustmentType = request.adjustment_type.parse()?;
        let item_id: ItemId = request.item_id.parse()?;
        let adjustment = StockAdjustment::record(
            item_id.clone(),
            kind,
            request.quantity,
            request.current_stock,
            request.reason,
            request.remarks,
            Utc::now(),
        )?;

        run_in_transaction(self.store.as_ref(), move |tx| {
            Box::pin(async move {
                if tx.get_item(&item_id).await?.is_none() {
                    return Err(LedgerError::not_found(format!("item {item_id}")));
                }
                tx.insert_stock_adjustment(&adjustment).await?;
                Ok(adjustment)
            })
        })
        .await
    }

    /// Manually occupy or free one slot of a position.
    #[instrument(skip(self), err)]
    pub async fn update_position_usage(
        &self,
        position_id: PositionId,
        action: PositionAction,
    ) -> LedgerResult<WarehousePosition> {
        let position = run_in_transaction(self.store.as_ref(), move |tx| {
            Box::pin(async move {
                match action {
                    PositionAction::Add => tx.increment_position_used(position_id).await,
                    PositionAction::Remove => tx
                        .decrement_position_used(position_id)
                        .await?
                        .ok_or_else(|| {
                            LedgerError::validation("warehouse position is already empty")
                        }),
                }
            })
        })
        .await?;

        self.views.invalidate(&[CacheTag::Warehouses]).await;
        Ok(position)
    }

    #[instrument(skip(self), err)]
    pub async fn create_warehouse(&self, name: String) -> LedgerResult<Warehouse> {
        let warehouse = Warehouse::new(WarehouseId::new(), name, Utc::now())?;
        let stored = warehouse.clone();
        run_in_transaction(self.store.as_ref(), move |tx| {
            Box::pin(async move { tx.insert_warehouse(&stored).await })
        })
        .await?;
        self.views.invalidate(&[CacheTag::Warehouses]).await;
        Ok(warehouse)
    }

    #[instrument(skip(self), err)]
    pub async fn create_position(
        &self,
        warehouse_id: WarehouseId,
        name: String,
        capacity: u32,
    ) -> LedgerResult<WarehousePosition> {
        let position = WarehousePosition::new(PositionId::new(), warehouse_id, name, capacity)?;
        let stored = position.clone();
        run_in_transaction(self.store.as_ref(), move |tx| {
            Box::pin(async move {
                if tx.get_warehouse(warehouse_id).await?.is_none() {
                    return Err(LedgerError::not_found(format!("warehouse {warehouse_id}")));
                }
                tx.insert_position(&stored).await
            })
        })
        .await?;
        self.views.invalidate(&[CacheTag::Warehouses]).await;
        Ok(position)
    }

    pub async fn list_warehouses(&self) -> LedgerResult<Vec<WarehouseOverview>> {
        let mut warehouses = self.store.list_warehouses().await?;
        let positions = self.store.list_positions().await?;
        warehouses.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(warehouses
            .into_iter()
            .map(|warehouse| {
                let mut own: Vec<WarehousePosition> = positions
                    .iter()
                    .filter(|p| p.warehouse_id() == warehouse.id)
                    .cloned()
                    .collect();
                own.sort_by(|a, b| a.name().cmp(b.name()));
                WarehouseOverview {
                    warehouse,
                    positions: own,
                }
            })
            .collect())
    }
}
