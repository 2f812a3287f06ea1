//! Inventory ledger domain (items, transactions, storage positions).
//!
//! This crate contains the business rules of the ledger, implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage).

pub mod item;
pub mod status;
pub mod stock;
pub mod transaction;
pub mod warehouse;

pub use item::{Item, ItemDetails, generate_item_id};
pub use status::{OrderStatus, TransitionPolicy};
pub use stock::{AdjustmentType, DEFAULT_ADJUSTMENT_REASON, StockAdjustment, compute_new_stock};
pub use transaction::{OtherFee, PricedAmount, Transaction};
pub use warehouse::{Warehouse, WarehousePosition};
