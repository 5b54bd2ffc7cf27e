//! Broker publishing.
//!
//! [`Publisher`] is the seam between the bridge and the broker client: one
//! async operation, `publish(topic, key, record)`. The bridge, the retry
//! sweep, and the tests all talk to the broker through it.

#[cfg(feature = "kafka")]
pub mod kafka;

#[cfg(feature = "kafka")]
pub use kafka::KafkaPublisher;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::BridgeResult;

/// Publishes normalized records to a broker destination.
#[async_trait]
pub trait Publisher: Send + Sync + 'static {
    /// Publishes one record to `topic` under the routing `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the broker rejects or fails to acknowledge the
    /// message; callers divert the record to the fallback retry buffer.
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        record: &Map<String, Value>,
    ) -> BridgeResult<()>;
}
