//! Kafka publisher backed by rdkafka's `FutureProducer`.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use serde_json::{Map, Value};

use crate::error::BridgeResult;
use crate::publish::Publisher;

/// Default delivery timeout: 5 seconds.
const fn default_delivery_timeout() -> Duration {
    Duration::from_secs(5)
}

/// [`Publisher`] implementation over a Kafka producer.
///
/// Records are serialized to JSON; the routing key is sent as the Kafka
/// message key so records for the same instrument land on one partition.
pub struct KafkaPublisher {
    producer: FutureProducer,
    delivery_timeout: Duration,
}

impl KafkaPublisher {
    /// Creates a publisher connected to `brokers` (comma-separated
    /// `host:port` list) with the default delivery timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the producer cannot be created.
    pub fn new(brokers: &str) -> BridgeResult<Self> {
        Self::with_delivery_timeout(brokers, default_delivery_timeout())
    }

    /// Creates a publisher with an explicit delivery timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the producer cannot be created.
    pub fn with_delivery_timeout(brokers: &str, delivery_timeout: Duration) -> BridgeResult<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set(
                "message.timeout.ms",
                delivery_timeout.as_millis().to_string(),
            )
            .create()?;

        Ok(Self {
            producer,
            delivery_timeout,
        })
    }
}

#[async_trait]
impl Publisher for KafkaPublisher {
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        record: &Map<String, Value>,
    ) -> BridgeResult<()> {
        let payload = serde_json::to_vec(record)?;
        let future_record = FutureRecord::to(topic).key(key).payload(&payload);

        self.producer
            .send(future_record, Timeout::After(self.delivery_timeout))
            .await
            .map_err(|(err, _message)| err)?;

        Ok(())
    }
}

impl std::fmt::Debug for KafkaPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaPublisher")
            .field("delivery_timeout", &self.delivery_timeout)
            .finish_non_exhaustive()
    }
}
