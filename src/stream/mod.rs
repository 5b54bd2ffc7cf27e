//! Streaming ingestion: connection management and the WebSocket-to-Kafka
//! bridge.

pub mod bridge;
pub mod config;
pub mod connection;

pub use bridge::StreamBridge;
pub use config::{ReconnectConfig, StreamConfig};
pub use connection::{ConnectionState, ReconnectPolicy};
