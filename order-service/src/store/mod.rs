//! Durable order storage.
//!
//! The store is the single source of truth for which orders exist. It owns
//! the uniqueness of `order_uid` and guarantees that an order is either
//! stored with all of its rows or not at all.

use std::future::Future;

use shared::Order;
use thiserror::Error;

mod memory;
mod postgres;

pub use memory::{FailPoint, InMemoryOrderStore, RowCounts};
pub use postgres::{connect, run_migrations, DbPool, PgOrderStore};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("connection pool error: {0}")]
    Pool(String),

    #[error("{field} is not a storable amount: {value}")]
    InvalidAmount { field: &'static str, value: f64 },

    #[error("store call timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("injected failure: {0}")]
    Injected(&'static str),
}

/// Persistence operations for orders.
///
/// Implementations must be thread-safe and must not retry internally; the
/// caller decides what a failure means.
pub trait OrderStore: Send + Sync {
    /// Whether a header row for `order_uid` exists.
    fn order_exists(
        &self,
        order_uid: &str,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Stores every row of `order` in one transaction.
    ///
    /// Returns `Ok(false)` without side effects when the order is already
    /// stored, `Ok(true)` once all rows are committed. On error nothing of the
    /// order remains.
    fn insert_order(&self, order: &Order) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Loads every stored order fully assembled.
    ///
    /// Only a failure to list the headers is an error. Missing or unreadable
    /// delivery, payment or item rows are logged and leave that part empty.
    fn load_all(&self) -> impl Future<Output = Result<Vec<Order>, StoreError>> + Send;
}
