//! Frame-to-record mapping.
//!
//! [`Mapper`] projects a raw upstream frame into a [`MappedRecord`]: a
//! normalized JSON object plus the Kafka topic and routing key it should be
//! published under. Field selection is driven by a [`FieldMapping`] from
//! configuration — flat for single-stream subscriptions, keyed by sub-stream
//! identifier for combined-stream subscriptions.
//!
//! Every produced record is stamped with a `produced_time` field (epoch
//! milliseconds at capture time); the persistence consumer uses it to
//! compute end-to-end drift.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{BridgeError, BridgeResult};

/// Name of the capture-time field stamped onto every normalized record.
pub const PRODUCED_TIME_FIELD: &str = "produced_time";

/// Routing key used when the configured key field is absent from a record.
pub const UNKNOWN_KEY: &str = "unknown";

/// Returns the current time as epoch milliseconds.
#[allow(clippy::cast_possible_truncation)]
#[must_use]
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Field mapping from target (output) field names to source field names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "fields")]
pub enum FieldMapping {
    /// Single mapping applied to every frame of a single-stream subscription.
    Flat(BTreeMap<String, String>),

    /// One mapping per sub-stream identifier, for combined-stream
    /// subscriptions delivering `{"stream": "<id>", "data": {...}}` envelopes.
    PerStream(BTreeMap<String, BTreeMap<String, String>>),
}

/// A normalized record paired with its publish destination and routing key.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedRecord {
    /// Kafka topic the record should be published to.
    pub topic: String,
    /// Routing key (string form of the configured key field).
    pub key: String,
    /// Normalized field map, including `produced_time`.
    pub record: Map<String, Value>,
}

/// Projects raw frames into [`MappedRecord`]s.
#[derive(Debug, Clone)]
pub struct Mapper {
    mapping: FieldMapping,
    key_field: String,
    topic: String,
    topic_prefix: String,
}

impl Mapper {
    /// Creates a mapper.
    ///
    /// # Arguments
    ///
    /// * `mapping` - Field mapping (flat or per-sub-stream).
    /// * `key_field` - Output field whose value becomes the routing key.
    /// * `topic` - Destination topic for single-stream frames.
    /// * `topic_prefix` - Prefix for topics derived from sub-stream ids
    ///   (destination becomes `"{prefix}-{sub_stream}"`).
    #[must_use]
    pub fn new(
        mapping: FieldMapping,
        key_field: impl Into<String>,
        topic: impl Into<String>,
        topic_prefix: impl Into<String>,
    ) -> Self {
        Self {
            mapping,
            key_field: key_field.into(),
            topic: topic.into(),
            topic_prefix: topic_prefix.into(),
        }
    }

    /// Maps a raw frame into a [`MappedRecord`] stamped with `produced_time`.
    ///
    /// A frame carrying a `stream` tag is treated as a multi-stream envelope:
    /// the sub-stream identifier is the text after the last `@` in the tag,
    /// the destination is derived from it, and the per-stream mapping keyed
    /// by it is applied to the envelope's `data` object. Any other frame uses
    /// the flat mapping and the preconfigured topic.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Mapping`] on malformed frames: non-object
    /// payloads, an unknown sub-stream, a mapping kind that does not match
    /// the frame shape, or a missing source field. The caller drops the
    /// single offending message; the connection is unaffected.
    pub fn map_frame(&self, frame: &Value, produced_time: i64) -> BridgeResult<MappedRecord> {
        let (topic, fields, data) = match frame.get("stream") {
            Some(tag) => {
                let tag = tag.as_str().ok_or_else(|| {
                    BridgeError::Mapping("stream tag is not a string".into())
                })?;
                let sub_stream = tag.rsplit('@').next().unwrap_or(tag);
                let fields = match &self.mapping {
                    FieldMapping::PerStream(per) => per.get(sub_stream).ok_or_else(|| {
                        BridgeError::Mapping(format!(
                            "no mapping configured for sub-stream '{sub_stream}'"
                        ))
                    })?,
                    FieldMapping::Flat(_) => {
                        return Err(BridgeError::Mapping(format!(
                            "envelope frame for '{sub_stream}' but mapping is flat"
                        )));
                    }
                };
                let data = frame.get("data").and_then(Value::as_object).ok_or_else(|| {
                    BridgeError::Mapping("envelope is missing a 'data' object".into())
                })?;
                (
                    format!("{}-{}", self.topic_prefix, sub_stream),
                    fields,
                    data,
                )
            }
            None => {
                let fields = match &self.mapping {
                    FieldMapping::Flat(flat) => flat,
                    FieldMapping::PerStream(_) => {
                        return Err(BridgeError::Mapping(
                            "single-stream frame but mapping is per-stream".into(),
                        ));
                    }
                };
                let data = frame.as_object().ok_or_else(|| {
                    BridgeError::Mapping("frame is not a JSON object".into())
                })?;
                (self.topic.clone(), fields, data)
            }
        };

        let mut record = Map::with_capacity(fields.len() + 1);
        for (target, source) in fields {
            let value = data.get(source).ok_or_else(|| {
                BridgeError::Mapping(format!("source field '{source}' missing from frame"))
            })?;
            record.insert(target.clone(), value.clone());
        }
        record.insert(PRODUCED_TIME_FIELD.to_string(), Value::from(produced_time));

        let key = match record.get(&self.key_field) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => UNKNOWN_KEY.to_string(),
        };

        Ok(MappedRecord { topic, key, record })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn book_ticker_mapping() -> BTreeMap<String, String> {
        [
            ("symbol", "s"),
            ("bid_price", "b"),
            ("ask_price", "a"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    fn per_stream_mapper() -> Mapper {
        let mut per = BTreeMap::new();
        per.insert("bookTicker".to_string(), book_ticker_mapping());
        Mapper::new(
            FieldMapping::PerStream(per),
            "symbol",
            "binance-ws",
            "binance-ws",
        )
    }

    fn flat_mapper() -> Mapper {
        Mapper::new(
            FieldMapping::Flat(book_ticker_mapping()),
            "symbol",
            "binance-ws-trades",
            "binance-ws",
        )
    }

    #[test]
    fn test_multi_stream_envelope() {
        let frame = json!({
            "stream": "btcusdt@bookTicker",
            "data": {"s": "BTCUSDT", "b": "50000.1", "a": "50001.2"}
        });

        let mapped = per_stream_mapper().map_frame(&frame, 1_000).unwrap();

        assert_eq!(mapped.topic, "binance-ws-bookTicker");
        assert_eq!(mapped.key, "BTCUSDT");
        assert_eq!(mapped.record["symbol"], json!("BTCUSDT"));
        assert_eq!(mapped.record["bid_price"], json!("50000.1"));
        assert_eq!(mapped.record["ask_price"], json!("50001.2"));
        assert_eq!(mapped.record[PRODUCED_TIME_FIELD], json!(1_000));
    }

    #[test]
    fn test_single_stream_uses_flat_mapping_and_configured_topic() {
        let frame = json!({"s": "ETHUSDT", "b": "3000.5", "a": "3000.6"});

        let mapped = flat_mapper().map_frame(&frame, 42).unwrap();

        assert_eq!(mapped.topic, "binance-ws-trades");
        assert_eq!(mapped.key, "ETHUSDT");
        assert_eq!(mapped.record[PRODUCED_TIME_FIELD], json!(42));
    }

    #[test]
    fn test_missing_source_field_is_mapping_error() {
        let frame = json!({"s": "BTCUSDT", "b": "50000.1"}); // no "a"
        let err = flat_mapper().map_frame(&frame, 0).unwrap_err();
        assert!(matches!(err, BridgeError::Mapping(_)));
        assert!(err.to_string().contains('a'));
    }

    #[test]
    fn test_unknown_sub_stream_is_mapping_error() {
        let frame = json!({"stream": "btcusdt@depth", "data": {}});
        let err = per_stream_mapper().map_frame(&frame, 0).unwrap_err();
        assert!(err.to_string().contains("depth"));
    }

    #[test]
    fn test_missing_key_field_defaults_to_unknown() {
        let mapper = Mapper::new(
            FieldMapping::Flat(book_ticker_mapping()),
            "nonexistent",
            "t",
            "t",
        );
        let frame = json!({"s": "BTCUSDT", "b": "1", "a": "2"});
        let mapped = mapper.map_frame(&frame, 0).unwrap();
        assert_eq!(mapped.key, UNKNOWN_KEY);
    }

    #[test]
    fn test_non_string_key_is_stringified() {
        let mut fields = BTreeMap::new();
        fields.insert("update_id".to_string(), "u".to_string());
        let mapper = Mapper::new(FieldMapping::Flat(fields), "update_id", "t", "t");
        let frame = json!({"u": 42});
        let mapped = mapper.map_frame(&frame, 0).unwrap();
        assert_eq!(mapped.key, "42");
    }

    #[test]
    fn test_envelope_with_flat_mapping_is_rejected() {
        let frame = json!({"stream": "btcusdt@bookTicker", "data": {}});
        let err = flat_mapper().map_frame(&frame, 0).unwrap_err();
        assert!(matches!(err, BridgeError::Mapping(_)));
    }

    #[test]
    fn test_non_object_frame_is_rejected() {
        let err = flat_mapper().map_frame(&json!([1, 2, 3]), 0).unwrap_err();
        assert!(matches!(err, BridgeError::Mapping(_)));
    }

    #[test]
    fn test_sub_stream_without_separator_uses_whole_tag() {
        let mut per = BTreeMap::new();
        per.insert("bookTicker".to_string(), book_ticker_mapping());
        let mapper = Mapper::new(FieldMapping::PerStream(per), "symbol", "t", "ws");
        let frame = json!({
            "stream": "bookTicker",
            "data": {"s": "BTCUSDT", "b": "1", "a": "2"}
        });
        let mapped = mapper.map_frame(&frame, 0).unwrap();
        assert_eq!(mapped.topic, "ws-bookTicker");
    }

    #[test]
    fn test_field_mapping_serde_round_trip() {
        let mapping = FieldMapping::Flat(book_ticker_mapping());
        let json = serde_json::to_string(&mapping).unwrap();
        let deser: FieldMapping = serde_json::from_str(&json).unwrap();
        assert!(matches!(deser, FieldMapping::Flat(ref m) if m.len() == 3));
    }
}
