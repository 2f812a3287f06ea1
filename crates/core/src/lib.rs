//! `stockledger-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives shared by the ledger crates
//! (identifiers, the domain error model, identity and concurrency traits).

pub mod aggregate;
pub mod error;
pub mod id;
pub mod value_object;

pub use aggregate::{AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::{AdjustmentId, ItemId, PositionId, TransactionId, WarehouseId};
pub use value_object::ValueObject;
