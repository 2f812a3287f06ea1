//! Postgres-backed ledger store.
//!
//! ## Error Mapping
//!
//! | Postgres code | Scenario | `LedgerError` |
//! |---|---|---|
//! | `23505` | duplicate id on insert | `Conflict` |
//! | `40001` / `40P01` | serialization failure / deadlock | `Conflict` |
//! | `23514` | check constraint (e.g. `used <= capacity`) | `Validation` |
//! | other | | `Internal` |
//!
//! Versioned updates are issued as `UPDATE .. WHERE id = $1 AND version = $n`;
//! zero affected rows means another writer got there first. Position counters
//! move only through single-statement compare-and-increment updates, so no
//! other transaction can slip between the capacity check and the write.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{Postgres, Row, Transaction as SqlxTransaction};
use tracing::instrument;
use uuid::Uuid;

use stockledger_core::{AggregateRoot, ItemId, PositionId, TransactionId, WarehouseId};
use stockledger_inventory::{
    Item, ItemDetails, StockAdjustment, Transaction, Warehouse, WarehousePosition,
};

use super::{LedgerStore, LedgerTx};
use crate::error::{LedgerError, LedgerResult, map_sqlx_error};

const SCHEMA: &str = include_str!("../../migrations/0001_ledger.sql");

const ITEM_COLUMNS: &str = "id, details, deleted, warehouse_position_id, active_transaction_id, \
                            created_at, updated_at, version";
const POSITION_COLUMNS: &str = "id, warehouse_id, name, capacity, used, version";

/// Postgres-backed ledger store.
///
/// `Send + Sync`; all access goes through the sqlx connection pool.
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: Arc<PgPool>,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> LedgerResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the ledger tables if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> LedgerResult<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }
}

fn version_from_row(row: &PgRow) -> LedgerResult<u64> {
    let version: i64 = row.try_get("version")?;
    u64::try_from(version).map_err(|_| LedgerError::internal(format!("negative version {version}")))
}

fn to_db_version(version: u64) -> LedgerResult<i64> {
    i64::try_from(version).map_err(|_| LedgerError::internal(format!("version {version} overflows")))
}

fn item_from_row(row: &PgRow) -> LedgerResult<Item> {
    let id: String = row.try_get("id")?;
    let details: Json<ItemDetails> = row.try_get("details")?;
    let position: Option<Uuid> = row.try_get("warehouse_position_id")?;
    let active: Option<Uuid> = row.try_get("active_transaction_id")?;
    Ok(Item {
        id: id.parse()?,
        details: details.0,
        deleted: row.try_get("deleted")?,
        warehouse_position_id: position.map(PositionId::from_uuid),
        active_transaction_id: active.map(TransactionId::from_uuid),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        version: version_from_row(row)?,
    })
}

fn transaction_from_row(row: &PgRow) -> LedgerResult<Transaction> {
    let body: Json<Transaction> = row.try_get("body")?;
    let mut transaction = body.0;
    transaction.version = version_from_row(row)?;
    Ok(transaction)
}

fn position_from_row(row: &PgRow) -> LedgerResult<WarehousePosition> {
    let capacity: i32 = row.try_get("capacity")?;
    let used: i32 = row.try_get("used")?;
    let to_u32 = |v: i32| {
        u32::try_from(v).map_err(|_| LedgerError::internal(format!("negative counter {v}")))
    };
    Ok(WarehousePosition::restore(
        PositionId::from_uuid(row.try_get("id")?),
        WarehouseId::from_uuid(row.try_get("warehouse_id")?),
        row.try_get::<String, _>("name")?,
        to_u32(capacity)?,
        to_u32(used)?,
        version_from_row(row)?,
    )?)
}

fn warehouse_from_row(row: &PgRow) -> LedgerResult<Warehouse> {
    Ok(Warehouse {
        id: WarehouseId::from_uuid(row.try_get("id")?),
        name: row.try_get("name")?,
        created_at: row.try_get("created_at")?,
    })
}

fn adjustment_from_row(row: &PgRow) -> LedgerResult<StockAdjustment> {
    let id: String = row.try_get("item_id")?;
    let kind: String = row.try_get("adjustment_type")?;
    Ok(StockAdjustment {
        id: stockledger_core::AdjustmentId::from_uuid(row.try_get("id")?),
        item_id: id.parse()?,
        adjustment_type: kind.parse()?,
        quantity: row.try_get("quantity")?,
        previous_stock: row.try_get("previous_stock")?,
        new_stock: row.try_get("new_stock")?,
        reason: row.try_get("reason")?,
        remarks: row.try_get("remarks")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    #[instrument(skip(self), err)]
    async fn begin(&self) -> LedgerResult<Box<dyn LedgerTx>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Ok(Box::new(PostgresLedgerTx { tx }))
    }

    #[instrument(skip(self), fields(item_id = %id), err)]
    async fn get_item(&self, id: &ItemId) -> LedgerResult<Option<Item>> {
        let row = sqlx::query(&format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = $1"))
            .bind(id.as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_item", e))?;
        row.as_ref().map(item_from_row).transpose()
    }

    #[instrument(skip(self), fields(item_id = %item_id), err)]
    async fn get_active_transaction(&self, item_id: &ItemId) -> LedgerResult<Option<Transaction>> {
        let row = sqlx::query(
            r#"
            SELECT t.body, t.version
            FROM transactions t
            JOIN items i ON i.active_transaction_id = t.id
            WHERE i.id = $1
            "#,
        )
        .bind(item_id.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_active_transaction", e))?;
        row.as_ref().map(transaction_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn list_items(&self) -> LedgerResult<Vec<Item>> {
        let rows = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE NOT deleted ORDER BY created_at DESC"
        ))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_items", e))?;
        rows.iter().map(item_from_row).collect()
    }

    #[instrument(skip(self), err)]
    async fn list_active_transactions(&self) -> LedgerResult<Vec<Transaction>> {
        let rows = sqlx::query(
            r#"
            SELECT t.body, t.version
            FROM transactions t
            JOIN items i ON i.active_transaction_id = t.id
            WHERE NOT i.deleted
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_active_transactions", e))?;
        rows.iter().map(transaction_from_row).collect()
    }

    #[instrument(skip(self), err)]
    async fn list_warehouses(&self) -> LedgerResult<Vec<Warehouse>> {
        let rows = sqlx::query("SELECT id, name, created_at FROM warehouses ORDER BY created_at")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_warehouses", e))?;
        rows.iter().map(warehouse_from_row).collect()
    }

    #[instrument(skip(self), err)]
    async fn list_positions(&self) -> LedgerResult<Vec<WarehousePosition>> {
        let rows = sqlx::query(&format!(
            "SELECT {POSITION_COLUMNS} FROM warehouse_positions ORDER BY name"
        ))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_positions", e))?;
        rows.iter().map(position_from_row).collect()
    }

    #[instrument(skip(self), fields(item_id = %item_id), err)]
    async fn list_stock_adjustments(&self, item_id: &ItemId) -> LedgerResult<Vec<StockAdjustment>> {
        let rows = sqlx::query(
            r#"
            SELECT id, item_id, adjustment_type, quantity, previous_stock, new_stock,
                   reason, remarks, created_at
            FROM stock_adjustments
            WHERE item_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(item_id.as_str())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_stock_adjustments", e))?;
        rows.iter().map(adjustment_from_row).collect()
    }
}

/// Tell "stale version" apart from "row missing" after a zero-row update.
fn missed_update(exists: LedgerResult<bool>, what: String) -> LedgerError {
    match exists {
        Ok(true) => LedgerError::conflict(format!("{what} was modified concurrently")),
        Ok(false) => LedgerError::not_found(what),
        Err(e) => e,
    }
}

enum RowKey<'a> {
    Text(&'a str),
    Uuid(Uuid),
}

struct PostgresLedgerTx {
    tx: SqlxTransaction<'static, Postgres>,
}

impl PostgresLedgerTx {
    async fn row_exists(&mut self, sql: &'static str, id: RowKey<'_>) -> LedgerResult<bool> {
        let query = sqlx::query(sql);
        let query = match id {
            RowKey::Text(id) => query.bind(id.to_string()),
            RowKey::Uuid(id) => query.bind(id),
        };
        let row = query
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("row_exists", e))?;
        Ok(row.is_some())
    }

    async fn position_name(&mut self, id: PositionId) -> LedgerResult<Option<String>> {
        let row = sqlx::query("SELECT name FROM warehouse_positions WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("position_name", e))?;
        row.map(|r| r.try_get::<String, _>("name").map_err(LedgerError::from))
            .transpose()
    }
}

#[async_trait]
impl LedgerTx for PostgresLedgerTx {
    async fn get_item(&mut self, id: &ItemId) -> LedgerResult<Option<Item>> {
        let row = sqlx::query(&format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = $1"))
            .bind(id.as_str())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("get_item", e))?;
        row.as_ref().map(item_from_row).transpose()
    }

    async fn get_transaction(&mut self, id: TransactionId) -> LedgerResult<Option<Transaction>> {
        let row = sqlx::query("SELECT body, version FROM transactions WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("get_transaction", e))?;
        row.as_ref().map(transaction_from_row).transpose()
    }

    #[instrument(skip(self, item), fields(item_id = %item.id), err)]
    async fn insert_item(&mut self, item: &Item) -> LedgerResult<u64> {
        sqlx::query(
            r#"
            INSERT INTO items (id, details, deleted, warehouse_position_id, active_transaction_id,
                               created_at, updated_at, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 1)
            "#,
        )
        .bind(item.id.as_str())
        .bind(Json(&item.details))
        .bind(item.deleted)
        .bind(item.warehouse_position_id.map(Uuid::from))
        .bind(item.active_transaction_id.map(Uuid::from))
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_item", e))?;
        Ok(1)
    }

    #[instrument(skip(self, item), fields(item_id = %item.id, version = item.version), err)]
    async fn update_item(&mut self, item: &Item) -> LedgerResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE items
            SET details = $2, deleted = $3, warehouse_position_id = $4,
                active_transaction_id = $5, updated_at = $6, version = version + 1
            WHERE id = $1 AND version = $7
            "#,
        )
        .bind(item.id.as_str())
        .bind(Json(&item.details))
        .bind(item.deleted)
        .bind(item.warehouse_position_id.map(Uuid::from))
        .bind(item.active_transaction_id.map(Uuid::from))
        .bind(item.updated_at)
        .bind(to_db_version(item.version)?)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_item", e))?;

        if result.rows_affected() == 0 {
            let exists = self
                .row_exists("SELECT 1 FROM items WHERE id = $1", RowKey::Text(item.id.as_str()))
                .await;
            return Err(missed_update(exists, format!("item {}", item.id)));
        }
        Ok(item.version + 1)
    }

    #[instrument(skip(self, transaction), fields(transaction_id = %transaction.id), err)]
    async fn insert_transaction(&mut self, transaction: &Transaction) -> LedgerResult<u64> {
        sqlx::query(
            r#"
            INSERT INTO transactions (id, item_id, order_status, body, created_at, updated_at, version)
            VALUES ($1, $2, $3, $4, $5, $6, 1)
            "#,
        )
        .bind(transaction.id.as_uuid())
        .bind(transaction.item_id.as_str())
        .bind(transaction.order_status.label())
        .bind(Json(transaction))
        .bind(transaction.created_at)
        .bind(transaction.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_transaction", e))?;
        Ok(1)
    }

    #[instrument(
        skip(self, transaction),
        fields(transaction_id = %transaction.id, version = transaction.version),
        err
    )]
    async fn update_transaction(&mut self, transaction: &Transaction) -> LedgerResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET order_status = $2, body = $3, updated_at = $4, version = version + 1
            WHERE id = $1 AND version = $5
            "#,
        )
        .bind(transaction.id.as_uuid())
        .bind(transaction.order_status.label())
        .bind(Json(transaction))
        .bind(transaction.updated_at)
        .bind(to_db_version(transaction.version)?)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_transaction", e))?;

        if result.rows_affected() == 0 {
            let exists = self
                .row_exists(
                    "SELECT 1 FROM transactions WHERE id = $1",
                    RowKey::Uuid(*transaction.id.as_uuid()),
                )
                .await;
            return Err(missed_update(exists, format!("transaction {}", transaction.id)));
        }
        Ok(transaction.version + 1)
    }

    async fn get_warehouse(&mut self, id: WarehouseId) -> LedgerResult<Option<Warehouse>> {
        let row = sqlx::query("SELECT id, name, created_at FROM warehouses WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("get_warehouse", e))?;
        row.as_ref().map(warehouse_from_row).transpose()
    }

    async fn insert_warehouse(&mut self, warehouse: &Warehouse) -> LedgerResult<()> {
        sqlx::query("INSERT INTO warehouses (id, name, created_at) VALUES ($1, $2, $3)")
            .bind(warehouse.id.as_uuid())
            .bind(&warehouse.name)
            .bind(warehouse.created_at)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_warehouse", e))?;
        Ok(())
    }

    async fn get_position(&mut self, id: PositionId) -> LedgerResult<Option<WarehousePosition>> {
        let row = sqlx::query(&format!(
            "SELECT {POSITION_COLUMNS} FROM warehouse_positions WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("get_position", e))?;
        row.as_ref().map(position_from_row).transpose()
    }

    async fn insert_position(&mut self, position: &WarehousePosition) -> LedgerResult<()> {
        let capacity = i32::try_from(position.capacity())
            .map_err(|_| LedgerError::validation("position capacity is too large"))?;
        sqlx::query(
            r#"
            INSERT INTO warehouse_positions (id, warehouse_id, name, capacity, used, version)
            VALUES ($1, $2, $3, $4, 0, 1)
            "#,
        )
        .bind(position.id().as_uuid())
        .bind(position.warehouse_id().as_uuid())
        .bind(position.name())
        .bind(capacity)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_position", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(position_id = %id), err)]
    async fn increment_position_used(&mut self, id: PositionId) -> LedgerResult<WarehousePosition> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE warehouse_positions
            SET used = used + 1, version = version + 1
            WHERE id = $1 AND used < capacity
            RETURNING {POSITION_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("increment_position_used", e))?;

        match row {
            Some(row) => position_from_row(&row),
            None => match self.position_name(id).await? {
                Some(name) => Err(LedgerError::capacity_exceeded(name)),
                None => Err(LedgerError::not_found(format!("warehouse position {id}"))),
            },
        }
    }

    #[instrument(skip(self), fields(position_id = %id), err)]
    async fn decrement_position_used(
        &mut self,
        id: PositionId,
    ) -> LedgerResult<Option<WarehousePosition>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE warehouse_positions
            SET used = used - 1, version = version + 1
            WHERE id = $1 AND used > 0
            RETURNING {POSITION_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("decrement_position_used", e))?;

        match row {
            Some(row) => position_from_row(&row).map(Some),
            None => match self.position_name(id).await? {
                Some(_) => Ok(None),
                None => Err(LedgerError::not_found(format!("warehouse position {id}"))),
            },
        }
    }

    async fn insert_stock_adjustment(&mut self, adjustment: &StockAdjustment) -> LedgerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO stock_adjustments (id, item_id, adjustment_type, quantity, previous_stock,
                                           new_stock, reason, remarks, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(adjustment.id.as_uuid())
        .bind(adjustment.item_id.as_str())
        .bind(adjustment.adjustment_type.as_str())
        .bind(adjustment.quantity)
        .bind(adjustment.previous_stock)
        .bind(adjustment.new_stock)
        .bind(&adjustment.reason)
        .bind(&adjustment.remarks)
        .bind(adjustment.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_stock_adjustment", e))?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> LedgerResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn rollback(self: Box<Self>) -> LedgerResult<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}
