//! Stream bridge configuration.
//!
//! [`StreamConfig`] describes one upstream subscription: the WebSocket URL,
//! the field mapping, routing-key field, destination topics, and the
//! reconnect, concurrency, and fallback-buffer settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::mapping::FieldMapping;

/// Serde helper that encodes a [`Duration`] as a `u64` millisecond count.
pub(crate) mod duration_millis {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    #[allow(clippy::cast_possible_truncation)]
    pub fn serialize<S>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Default bound on concurrently in-flight publishes.
const fn default_max_in_flight() -> usize {
    10
}

/// Default fallback buffer capacity: 10 000 entries.
const fn default_fallback_capacity() -> usize {
    10_000
}

/// Default retry sweep period: 1 second.
const fn default_retry_interval() -> Duration {
    Duration::from_secs(1)
}

/// Default backoff initial delay: 1 second.
const fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

/// Default backoff increment per consecutive failure: 2 seconds.
const fn default_delay_increment() -> Duration {
    Duration::from_secs(2)
}

/// Default backoff cap: 30 seconds.
const fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

/// Configuration for one WebSocket-to-Kafka bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// WebSocket endpoint to subscribe to.
    pub url: String,

    /// Field mapping applied to incoming frames.
    pub mapping: FieldMapping,

    /// Output field whose value becomes the Kafka message key.
    pub key_field: String,

    /// Destination topic for single-stream frames.
    pub topic: String,

    /// Prefix for topics derived from multi-stream envelopes
    /// (destination becomes `"{prefix}-{sub_stream}"`).
    pub topic_prefix: String,

    /// Optional message sent after the WebSocket handshake completes
    /// (e.g., a JSON subscribe payload).
    #[serde(default)]
    pub subscribe_message: Option<String>,

    /// Reconnection backoff settings.
    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// Maximum number of concurrently in-flight publish attempts.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// Fallback retry buffer capacity. Insertion beyond this evicts the
    /// oldest unretried entry.
    #[serde(default = "default_fallback_capacity")]
    pub fallback_capacity: usize,

    /// Period of the background retry sweep.
    #[serde(default = "default_retry_interval", with = "duration_millis")]
    pub retry_interval: Duration,
}

/// Linear-backoff reconnection settings.
///
/// The first failure waits `initial_delay`; each consecutive failure adds
/// `delay_increment`, capped at `max_delay`. A successful connection resets
/// the wait to `initial_delay`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt.
    #[serde(default = "default_initial_delay", with = "duration_millis")]
    pub initial_delay: Duration,

    /// Added to the delay after each consecutive failure.
    #[serde(default = "default_delay_increment", with = "duration_millis")]
    pub delay_increment: Duration,

    /// Upper bound on the delay between attempts.
    #[serde(default = "default_max_delay", with = "duration_millis")]
    pub max_delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: default_initial_delay(),
            delay_increment: default_delay_increment(),
            max_delay: default_max_delay(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::FieldMapping;
    use std::collections::BTreeMap;

    fn minimal_json() -> &'static str {
        r#"{
            "url": "wss://stream.example.com/ws",
            "mapping": {"type": "Flat", "fields": {"symbol": "s"}},
            "key_field": "symbol",
            "topic": "binance-ws-trades",
            "topic_prefix": "binance-ws"
        }"#
    }

    #[test]
    fn test_defaults_applied_from_minimal_json() {
        let cfg: StreamConfig = serde_json::from_str(minimal_json()).unwrap();

        assert_eq!(cfg.max_in_flight, 10);
        assert_eq!(cfg.fallback_capacity, 10_000);
        assert_eq!(cfg.retry_interval, Duration::from_secs(1));
        assert!(cfg.subscribe_message.is_none());
        assert_eq!(cfg.reconnect.initial_delay, Duration::from_secs(1));
        assert_eq!(cfg.reconnect.delay_increment, Duration::from_secs(2));
        assert_eq!(cfg.reconnect.max_delay, Duration::from_secs(30));
    }

    #[test]
    fn test_serde_round_trip() {
        let mut fields = BTreeMap::new();
        fields.insert("symbol".to_string(), "s".to_string());
        let cfg = StreamConfig {
            url: "wss://stream.example.com/ws".into(),
            mapping: FieldMapping::Flat(fields),
            key_field: "symbol".into(),
            topic: "trades".into(),
            topic_prefix: "ws".into(),
            subscribe_message: Some(r#"{"method":"SUBSCRIBE"}"#.into()),
            reconnect: ReconnectConfig::default(),
            max_in_flight: 4,
            fallback_capacity: 100,
            retry_interval: Duration::from_millis(250),
        };

        let json = serde_json::to_string(&cfg).unwrap();
        let deser: StreamConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(deser.max_in_flight, 4);
        assert_eq!(deser.fallback_capacity, 100);
        assert_eq!(deser.retry_interval, Duration::from_millis(250));
        assert_eq!(
            deser.subscribe_message.as_deref(),
            Some(r#"{"method":"SUBSCRIBE"}"#)
        );
    }
}
