//! Batch persistence: broker consumption, batching, drift statistics, and
//! the storage seam.

pub mod batch;
pub mod config;
pub mod row;

#[cfg(feature = "kafka")]
pub mod consumer;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use batch::{BatchWindow, DriftStats};
pub use config::{PostgresSinkConfig, SinkConfig};
pub use row::{build_row, drift_of, PersistRow, SqlValue};

#[cfg(feature = "kafka")]
pub use consumer::BatchConsumer;

#[cfg(feature = "postgres")]
pub use postgres::PostgresRowSink;

use async_trait::async_trait;

use crate::error::BridgeResult;

/// Submits assembled row batches to storage.
///
/// The implementation owns transactional semantics; the consumer only
/// assembles the batch and hands it over.
#[async_trait]
pub trait RowSink: Send + Sync + 'static {
    /// Inserts all `rows` in one parameterized bulk statement.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails; the caller logs it and drops
    /// the batch (insert failures are not retried).
    async fn insert_rows(&self, rows: &[PersistRow]) -> BridgeResult<()>;
}
