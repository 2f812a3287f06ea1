use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard};

use async_trait::async_trait;

use stockledger_core::{AggregateRoot, ExpectedVersion, ItemId, PositionId, TransactionId, WarehouseId};
use stockledger_inventory::{Item, StockAdjustment, Transaction, Warehouse, WarehousePosition};

use super::{LedgerStore, LedgerTx};
use crate::error::{LedgerError, LedgerResult};

#[derive(Debug, Default)]
struct LedgerState {
    items: HashMap<ItemId, Item>,
    transactions: HashMap<TransactionId, Transaction>,
    warehouses: HashMap<WarehouseId, Warehouse>,
    positions: HashMap<PositionId, WarehousePosition>,
    adjustments: Vec<StockAdjustment>,
}

/// In-memory ledger store.
///
/// Units of work are optimistic: reads see committed state plus the unit's
/// own staged writes, and `commit` re-validates every version and position
/// bound under a short write lock before applying anything. Intended for
/// tests/dev.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedgerStore {
    state: Arc<RwLock<LedgerState>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> LedgerResult<RwLockReadGuard<'_, LedgerState>> {
        self.state
            .read()
            .map_err(|_| LedgerError::internal("lock poisoned"))
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn begin(&self) -> LedgerResult<Box<dyn LedgerTx>> {
        Ok(Box::new(InMemoryLedgerTx {
            state: self.state.clone(),
            items: HashMap::new(),
            transactions: HashMap::new(),
            warehouses: HashMap::new(),
            new_positions: HashMap::new(),
            position_deltas: HashMap::new(),
            adjustments: Vec::new(),
        }))
    }

    async fn get_item(&self, id: &ItemId) -> LedgerResult<Option<Item>> {
        Ok(self.read()?.items.get(id).cloned())
    }

    async fn get_active_transaction(&self, item_id: &ItemId) -> LedgerResult<Option<Transaction>> {
        let state = self.read()?;
        Ok(state
            .items
            .get(item_id)
            .and_then(|item| item.active_transaction_id)
            .and_then(|tx_id| state.transactions.get(&tx_id).cloned()))
    }

    async fn list_items(&self) -> LedgerResult<Vec<Item>> {
        let state = self.read()?;
        Ok(state.items.values().filter(|i| !i.deleted).cloned().collect())
    }

    async fn list_active_transactions(&self) -> LedgerResult<Vec<Transaction>> {
        let state = self.read()?;
        Ok(state
            .items
            .values()
            .filter(|i| !i.deleted)
            .filter_map(|i| i.active_transaction_id)
            .filter_map(|tx_id| state.transactions.get(&tx_id).cloned())
            .collect())
    }

    async fn list_warehouses(&self) -> LedgerResult<Vec<Warehouse>> {
        Ok(self.read()?.warehouses.values().cloned().collect())
    }

    async fn list_positions(&self) -> LedgerResult<Vec<WarehousePosition>> {
        Ok(self.read()?.positions.values().cloned().collect())
    }

    async fn list_stock_adjustments(&self, item_id: &ItemId) -> LedgerResult<Vec<StockAdjustment>> {
        let state = self.read()?;
        Ok(state
            .adjustments
            .iter()
            .filter(|a| &a.item_id == item_id)
            .cloned()
            .collect())
    }
}

/// A staged record: the version it must still have at commit (`Any` for
/// inserts, which instead require absence) and its new content.
#[derive(Debug, Clone)]
struct Staged<T> {
    expected: ExpectedVersion,
    insert: bool,
    value: T,
}

struct InMemoryLedgerTx {
    state: Arc<RwLock<LedgerState>>,
    items: HashMap<ItemId, Staged<Item>>,
    transactions: HashMap<TransactionId, Staged<Transaction>>,
    warehouses: HashMap<WarehouseId, Warehouse>,
    new_positions: HashMap<PositionId, WarehousePosition>,
    position_deltas: HashMap<PositionId, i64>,
    adjustments: Vec<StockAdjustment>,
}

impl InMemoryLedgerTx {
    fn read(&self) -> LedgerResult<RwLockReadGuard<'_, LedgerState>> {
        self.state
            .read()
            .map_err(|_| LedgerError::internal("lock poisoned"))
    }

    /// Position as this unit of work sees it (committed counter plus own delta).
    fn effective_position(&self, id: PositionId) -> LedgerResult<Option<WarehousePosition>> {
        let base = match self.new_positions.get(&id) {
            Some(p) => Some(p.clone()),
            None => self.read()?.positions.get(&id).cloned(),
        };
        let Some(base) = base else {
            return Ok(None);
        };
        let delta = self.position_deltas.get(&id).copied().unwrap_or(0);
        apply_delta(&base, delta).map(Some)
    }

    fn stage_update<K, T>(
        staged: &mut HashMap<K, Staged<T>>,
        committed: Option<u64>,
        key: K,
        value: &T,
        version: u64,
        what: &str,
    ) -> LedgerResult<u64>
    where
        K: std::hash::Hash + Eq,
        T: Clone + VersionedRecord,
    {
        let next = version + 1;
        if let Some(existing) = staged.get_mut(&key) {
            if existing.value.stored_version() != version {
                return Err(LedgerError::conflict(format!(
                    "{what} was modified earlier in this unit of work"
                )));
            }
            existing.value = value.clone();
            existing.value.set_version(next);
            return Ok(next);
        }

        let Some(current) = committed else {
            return Err(LedgerError::not_found(what));
        };
        ExpectedVersion::Exact(version).check(current)?;

        let mut value = value.clone();
        value.set_version(next);
        staged.insert(
            key,
            Staged {
                expected: ExpectedVersion::Exact(version),
                insert: false,
                value,
            },
        );
        Ok(next)
    }
}

trait VersionedRecord {
    fn stored_version(&self) -> u64;
    fn set_version(&mut self, version: u64);
}

impl VersionedRecord for Item {
    fn stored_version(&self) -> u64 {
        self.version
    }
    fn set_version(&mut self, version: u64) {
        self.version = version;
    }
}

impl VersionedRecord for Transaction {
    fn stored_version(&self) -> u64 {
        self.version
    }
    fn set_version(&mut self, version: u64) {
        self.version = version;
    }
}

fn apply_delta(position: &WarehousePosition, delta: i64) -> LedgerResult<WarehousePosition> {
    let used = i64::from(position.used()) + delta;
    if used > i64::from(position.capacity()) {
        return Err(LedgerError::capacity_exceeded(position.name()));
    }
    let used = u32::try_from(used).map_err(|_| {
        LedgerError::conflict(format!(
            "position '{}' was released concurrently",
            position.name()
        ))
    })?;
    let version = position.version() + u64::from(delta != 0);
    WarehousePosition::restore(
        *position.id(),
        position.warehouse_id(),
        position.name(),
        position.capacity(),
        used,
        version,
    )
    .map_err(LedgerError::from)
}

#[async_trait]
impl LedgerTx for InMemoryLedgerTx {
    async fn get_item(&mut self, id: &ItemId) -> LedgerResult<Option<Item>> {
        if let Some(staged) = self.items.get(id) {
            return Ok(Some(staged.value.clone()));
        }
        Ok(self.read()?.items.get(id).cloned())
    }

    async fn get_transaction(&mut self, id: TransactionId) -> LedgerResult<Option<Transaction>> {
        if let Some(staged) = self.transactions.get(&id) {
            return Ok(Some(staged.value.clone()));
        }
        Ok(self.read()?.transactions.get(&id).cloned())
    }

    async fn insert_item(&mut self, item: &Item) -> LedgerResult<u64> {
        let exists = self.items.contains_key(&item.id) || self.read()?.items.contains_key(&item.id);
        if exists {
            return Err(LedgerError::conflict(format!("item {} already exists", item.id)));
        }
        let mut value = item.clone();
        value.version = 1;
        self.items.insert(
            item.id.clone(),
            Staged {
                expected: ExpectedVersion::Any,
                insert: true,
                value,
            },
        );
        Ok(1)
    }

    async fn update_item(&mut self, item: &Item) -> LedgerResult<u64> {
        let committed = self.read()?.items.get(&item.id).map(|i| i.version);
        Self::stage_update(
            &mut self.items,
            committed,
            item.id.clone(),
            item,
            item.version,
            &format!("item {}", item.id),
        )
    }

    async fn insert_transaction(&mut self, transaction: &Transaction) -> LedgerResult<u64> {
        let exists = self.transactions.contains_key(&transaction.id)
            || self.read()?.transactions.contains_key(&transaction.id);
        if exists {
            return Err(LedgerError::conflict(format!(
                "transaction {} already exists",
                transaction.id
            )));
        }
        let mut value = transaction.clone();
        value.version = 1;
        self.transactions.insert(
            transaction.id,
            Staged {
                expected: ExpectedVersion::Any,
                insert: true,
                value,
            },
        );
        Ok(1)
    }

    async fn update_transaction(&mut self, transaction: &Transaction) -> LedgerResult<u64> {
        let committed = self
            .read()?
            .transactions
            .get(&transaction.id)
            .map(|t| t.version);
        Self::stage_update(
            &mut self.transactions,
            committed,
            transaction.id,
            transaction,
            transaction.version,
            &format!("transaction {}", transaction.id),
        )
    }

    async fn get_warehouse(&mut self, id: WarehouseId) -> LedgerResult<Option<Warehouse>> {
        if let Some(w) = self.warehouses.get(&id) {
            return Ok(Some(w.clone()));
        }
        Ok(self.read()?.warehouses.get(&id).cloned())
    }

    async fn insert_warehouse(&mut self, warehouse: &Warehouse) -> LedgerResult<()> {
        if self.read()?.warehouses.contains_key(&warehouse.id) {
            return Err(LedgerError::conflict(format!(
                "warehouse {} already exists",
                warehouse.id
            )));
        }
        self.warehouses.insert(warehouse.id, warehouse.clone());
        Ok(())
    }

    async fn get_position(&mut self, id: PositionId) -> LedgerResult<Option<WarehousePosition>> {
        self.effective_position(id)
    }

    async fn insert_position(&mut self, position: &WarehousePosition) -> LedgerResult<()> {
        let id = *position.id();
        if self.read()?.positions.contains_key(&id) {
            return Err(LedgerError::conflict(format!("position {id} already exists")));
        }
        self.new_positions.insert(id, position.clone());
        Ok(())
    }

    async fn increment_position_used(&mut self, id: PositionId) -> LedgerResult<WarehousePosition> {
        let mut position = self
            .effective_position(id)?
            .ok_or_else(|| LedgerError::not_found(format!("warehouse position {id}")))?;
        position.occupy()?;
        *self.position_deltas.entry(id).or_insert(0) += 1;
        Ok(position)
    }

    async fn decrement_position_used(
        &mut self,
        id: PositionId,
    ) -> LedgerResult<Option<WarehousePosition>> {
        let mut position = self
            .effective_position(id)?
            .ok_or_else(|| LedgerError::not_found(format!("warehouse position {id}")))?;
        if position.used() == 0 {
            return Ok(None);
        }
        position.release()?;
        *self.position_deltas.entry(id).or_insert(0) -= 1;
        Ok(Some(position))
    }

    async fn insert_stock_adjustment(&mut self, adjustment: &StockAdjustment) -> LedgerResult<()> {
        self.adjustments.push(adjustment.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> LedgerResult<()> {
        let this = *self;
        let mut state = this
            .state
            .write()
            .map_err(|_| LedgerError::internal("lock poisoned"))?;

        // Validate everything first; nothing is applied unless all checks pass.
        for (id, staged) in &this.items {
            check_staged(staged, state.items.get(id).map(|i| i.version), || {
                format!("item {id}")
            })?;
        }
        for (id, staged) in &this.transactions {
            check_staged(staged, state.transactions.get(id).map(|t| t.version), || {
                format!("transaction {id}")
            })?;
        }
        let mut positions = Vec::with_capacity(this.position_deltas.len());
        for (id, delta) in &this.position_deltas {
            let base = this
                .new_positions
                .get(id)
                .or_else(|| state.positions.get(id))
                .ok_or_else(|| LedgerError::not_found(format!("warehouse position {id}")))?;
            positions.push(apply_delta(base, *delta)?);
        }

        for (id, staged) in this.items {
            state.items.insert(id, staged.value);
        }
        for (id, staged) in this.transactions {
            state.transactions.insert(id, staged.value);
        }
        state.warehouses.extend(this.warehouses);
        state.positions.extend(this.new_positions);
        for position in positions {
            state.positions.insert(*position.id(), position);
        }
        state.adjustments.extend(this.adjustments);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> LedgerResult<()> {
        Ok(())
    }
}

fn check_staged<T>(
    staged: &Staged<T>,
    committed: Option<u64>,
    what: impl FnOnce() -> String,
) -> LedgerResult<()> {
    match (staged.insert, committed) {
        (true, None) => Ok(()),
        (true, Some(_)) => Err(LedgerError::conflict(format!("{} already exists", what()))),
        (false, None) => Err(LedgerError::not_found(what())),
        (false, Some(current)) => staged.expected.check(current).map_err(LedgerError::from),
    }
}
