//! Database access layer

pub mod postgres;

use async_trait::async_trait;
use shared::models::Order;
use thiserror::Error;

pub use postgres::PgOrderStore;

/// Why a store operation failed.
///
/// The ingest pipeline retries only [`StoreError::is_transient`] errors;
/// everything else goes straight to the DLQ.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid order id: {0}")]
    InvalidId(#[from] uuid::Error),
    #[error("order not found")]
    NotFound,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Connection-class failures (SQLSTATE class 08) and driver-level
    /// network or pool timeouts are worth retrying; constraint violations
    /// and programming errors are not.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Database(sqlx::Error::Io(_)) => true,
            StoreError::Database(sqlx::Error::PoolTimedOut) => true,
            StoreError::Database(sqlx::Error::Database(db)) => {
                db.code().is_some_and(|code| code.starts_with("08"))
            }
            _ => false,
        }
    }
}

/// Persistent order storage.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Upsert the whole aggregate in one transaction.
    async fn insert_order(&self, order: &Order) -> Result<(), StoreError>;

    /// Load the full aggregate; [`StoreError::NotFound`] when absent.
    async fn get_order_by_id(&self, order_uid: &str) -> Result<Order, StoreError>;

    /// Load every stored order (startup warmup).
    async fn get_all_orders(&self) -> Result<Vec<Order>, StoreError>;
}
