//! Infrastructure layer: storage, allocator, view cache, settlement, config.

pub mod allocator;
pub mod cache;
pub mod config;
pub mod error;
pub mod services;
pub mod settlement;
pub mod store;
pub mod views;


pub use error::{LedgerError, LedgerResult};
