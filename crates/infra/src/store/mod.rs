//! Ledger storage boundary.
//!
//! Everything that mutates items, transactions or position counters goes
//! through a [`LedgerTx`]: one atomic unit of work that is either committed as
//! a whole or discarded. Reads that feed derived views go straight to the
//! [`LedgerStore`] and may observe committed state only.

pub mod in_memory;
pub mod postgres;

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use tracing::warn;

use stockledger_core::{ItemId, PositionId, TransactionId, WarehouseId};
use stockledger_inventory::{Item, StockAdjustment, Transaction, Warehouse, WarehousePosition};

use crate::error::LedgerResult;

pub use in_memory::InMemoryLedgerStore;
pub use postgres::PostgresLedgerStore;

/// Shared handle to a ledger backend.
///
/// Implementations must be safe to use from many request handlers at once;
/// units of work on different items/positions must not block each other.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Open a new unit of work.
    async fn begin(&self) -> LedgerResult<Box<dyn LedgerTx>>;

    async fn get_item(&self, id: &ItemId) -> LedgerResult<Option<Item>>;

    /// The transaction an item's `active_transaction_id` points at.
    async fn get_active_transaction(&self, item_id: &ItemId) -> LedgerResult<Option<Transaction>>;

    /// Every item that is not soft-deleted.
    async fn list_items(&self) -> LedgerResult<Vec<Item>>;

    /// Active transactions of every item that is not soft-deleted.
    async fn list_active_transactions(&self) -> LedgerResult<Vec<Transaction>>;

    async fn list_warehouses(&self) -> LedgerResult<Vec<Warehouse>>;

    async fn list_positions(&self) -> LedgerResult<Vec<WarehousePosition>>;

    async fn list_stock_adjustments(&self, item_id: &ItemId) -> LedgerResult<Vec<StockAdjustment>>;
}

/// One atomic unit of work against the ledger.
///
/// Versioned writes (`update_*`) compare the `version` carried by the record
/// against the stored one and fail with `Conflict` on mismatch. Each write
/// returns the version now stored; inserts always store version 1.
#[async_trait]
pub trait LedgerTx: Send {
    async fn get_item(&mut self, id: &ItemId) -> LedgerResult<Option<Item>>;

    async fn get_transaction(&mut self, id: TransactionId) -> LedgerResult<Option<Transaction>>;

    async fn insert_item(&mut self, item: &Item) -> LedgerResult<u64>;

    async fn update_item(&mut self, item: &Item) -> LedgerResult<u64>;

    async fn insert_transaction(&mut self, transaction: &Transaction) -> LedgerResult<u64>;

    async fn update_transaction(&mut self, transaction: &Transaction) -> LedgerResult<u64>;

    async fn get_warehouse(&mut self, id: WarehouseId) -> LedgerResult<Option<Warehouse>>;

    async fn insert_warehouse(&mut self, warehouse: &Warehouse) -> LedgerResult<()>;

    async fn get_position(&mut self, id: PositionId) -> LedgerResult<Option<WarehousePosition>>;

    async fn insert_position(&mut self, position: &WarehousePosition) -> LedgerResult<()>;

    /// Take one slot of a position in a single compare-and-increment.
    ///
    /// Fails with `CapacityExceeded` (naming the position) when it is full and
    /// `NotFound` when it does not exist; neither case mutates anything.
    async fn increment_position_used(&mut self, id: PositionId) -> LedgerResult<WarehousePosition>;

    /// Give back one slot. Returns `None` when the counter is already zero.
    async fn decrement_position_used(
        &mut self,
        id: PositionId,
    ) -> LedgerResult<Option<WarehousePosition>>;

    async fn insert_stock_adjustment(&mut self, adjustment: &StockAdjustment) -> LedgerResult<()>;

    async fn commit(self: Box<Self>) -> LedgerResult<()>;

    async fn rollback(self: Box<Self>) -> LedgerResult<()>;

    /// Load an item together with its active transaction.
    async fn get_item_with_active(
        &mut self,
        id: &ItemId,
    ) -> LedgerResult<Option<(Item, Option<Transaction>)>> {
        let Some(item) = self.get_item(id).await? else {
            return Ok(None);
        };
        let active = match item.active_transaction_id {
            Some(tx_id) => self.get_transaction(tx_id).await?,
            None => None,
        };
        Ok(Some((item, active)))
    }
}

/// Future returned by a unit-of-work body.
pub type TxFuture<'t, T> = Pin<Box<dyn Future<Output = LedgerResult<T>> + Send + 't>>;

/// Run `body` inside one unit of work: commit on `Ok`, roll back on `Err`.
///
/// ```ignore
/// run_in_transaction(store, move |tx| Box::pin(async move {
///     allocator::move_position(tx, &item_id, from, to).await
/// })).await?;
/// ```
pub async fn run_in_transaction<T, F>(store: &dyn LedgerStore, body: F) -> LedgerResult<T>
where
    T: Send,
    F: for<'t> FnOnce(&'t mut dyn LedgerTx) -> TxFuture<'t, T> + Send,
{
    let mut tx = store.begin().await?;
    let result = body(tx.as_mut()).await;
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "rollback failed after {err}");
            }
            Err(err)
        }
    }
}
