//! Streaming market-data bridge.
//!
//! `feedbridge` moves exchange market data from a WebSocket feed into Kafka
//! and from Kafka into Postgres, in two independent stages:
//!
//! - [`stream::StreamBridge`] maintains the WebSocket connection, normalizes
//!   frames through a configurable [`mapping::Mapper`], and publishes records
//!   through a bounded pool of concurrent sends. Failed publishes land in a
//!   capacity-bounded fallback buffer that a background task resends.
//! - [`sink::BatchConsumer`] reads the published records back off the broker,
//!   batches them by time or size, bulk-inserts them through a
//!   [`sink::RowSink`], and reports per-batch drift statistics (the elapsed
//!   time between production and consumption of each record).
//!
//! Both stages expose atomic counter metrics and shut down cooperatively via
//! a `tokio::sync::watch` channel, draining in-flight work before exiting.

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

pub mod error;
pub mod mapping;
pub mod metrics;
pub mod publish;
pub mod retry;
pub mod sink;
pub mod stream;

pub use error::{BridgeError, BridgeResult};
pub use mapping::{FieldMapping, MappedRecord, Mapper};
pub use metrics::{BridgeMetrics, BridgeMetricsSnapshot, SinkMetrics, SinkMetricsSnapshot};
pub use publish::Publisher;
pub use retry::{BufferedEntry, FallbackBuffer};
pub use stream::{ReconnectPolicy, StreamBridge, StreamConfig};

#[cfg(feature = "kafka")]
pub use publish::KafkaPublisher;

#[cfg(feature = "kafka")]
pub use sink::BatchConsumer;

#[cfg(feature = "postgres")]
pub use sink::PostgresRowSink;
