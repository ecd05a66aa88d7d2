//! Transactional persistence for orders and product stock.
//!
//! A [`Store`] hands out transactions that implement both [`StockLedger`]
//! and [`OrderAggregateStore`], so a stock move and the order mutation that
//! caused it always commit or roll back together.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::{InMemoryStore, InMemoryTransaction};
pub use postgres::{PostgresStore, PostgresTransaction};
pub use store::{
    ItemChange, OrderAggregateStore, ProductSnapshot, StockLedger, Store, StoreTransaction,
};
