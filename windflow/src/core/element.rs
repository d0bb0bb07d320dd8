use std::collections::HashMap;
use std::convert::TryFrom;

use serde_json::Value;

use crate::core::error::{Error, Result};
use crate::core::watermark::MAX_WATERMARK;
use crate::core::window::Window;
use crate::utils::date_time::{current_timestamp_millis, parse_timestamp};

/// A timestamped event flowing into the engine. Immutable once built; the `with_*` methods are
/// only meant to be chained right after `new`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StreamEvent {
    partition_key: String,
    source: String,
    event_time: u64,
    processing_time: u64,
    payload: Value,
    headers: HashMap<String, String>,
}

impl StreamEvent {
    pub fn new<K, S>(partition_key: K, source: S, event_time: u64, payload: Value) -> Self
    where
        K: ToString,
        S: ToString,
    {
        StreamEvent {
            partition_key: partition_key.to_string(),
            source: source.to_string(),
            event_time,
            processing_time: current_timestamp_millis(),
            payload,
            headers: HashMap::new(),
        }
    }

    pub fn with_processing_time(mut self, processing_time: u64) -> Self {
        self.processing_time = processing_time;
        self
    }

    pub fn with_header<K: ToString, V: ToString>(mut self, key: K, value: V) -> Self {
        self.headers.insert(key.to_string(), value.to_string());
        self
    }

    pub fn partition_key(&self) -> &str {
        self.partition_key.as_str()
    }

    pub fn source(&self) -> &str {
        self.source.as_str()
    }

    pub fn event_time(&self) -> u64 {
        self.event_time
    }

    pub fn processing_time(&self) -> u64 {
        self.processing_time
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(|v| v.as_str())
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Check the event is processable, the failure is isolated to this event.
    pub fn validate(&self) -> Result<()> {
        if self.event_time >= MAX_WATERMARK.timestamp {
            return Err(Error::MalformedEvent(format!(
                "event_time {} out of range, partition_key={}",
                self.event_time, self.partition_key
            )));
        }
        Ok(())
    }

    /// Decode an event from its JSON wire form, see `RawEvent`.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawEvent = serde_json::from_str(json)
            .map_err(|e| Error::MalformedEvent(format!("undecodable event: {}", e)))?;
        StreamEvent::try_from(raw)
    }
}

/// The loosely typed form of an event as produced by an ingestion layer. `event_time` may be
/// epoch millis (number or digit string) or an RFC 3339 date time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RawEvent {
    pub partition_key: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub event_time: Option<Value>,
    #[serde(default)]
    pub processing_time: Option<u64>,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

pub const DEFAULT_SOURCE: &str = "default";

impl TryFrom<RawEvent> for StreamEvent {
    type Error = Error;

    fn try_from(raw: RawEvent) -> Result<Self> {
        let event_time = match &raw.event_time {
            Some(Value::Number(n)) => n.as_u64().ok_or_else(|| {
                Error::MalformedEvent(format!("event_time `{}` is not an epoch millis", n))
            })?,
            Some(Value::String(s)) => parse_timestamp(s.as_str())
                .map_err(|e| Error::MalformedEvent(format!("event_time `{}`: {}", s, e)))?,
            Some(v) => {
                return Err(Error::MalformedEvent(format!(
                    "unsupported event_time type `{}`",
                    v
                )))
            }
            None => return Err(Error::MalformedEvent("missing event_time".to_string())),
        };

        let source = raw.source.unwrap_or_else(|| DEFAULT_SOURCE.to_string());
        let mut event = StreamEvent::new(raw.partition_key, source, event_time, raw.payload);
        if let Some(processing_time) = raw.processing_time {
            event = event.with_processing_time(processing_time);
        }
        event.headers = raw.headers;

        event.validate()?;
        Ok(event)
    }
}

/// One emission of a window's aggregate. `revision` is 0 for the first emission and only grows
/// when the engine runs with `EmitMode::Update`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ProcessingResult {
    pub result_id: String,
    pub partition_key: String,
    pub window_id: String,
    pub window_start: u64,
    pub window_end: u64,
    pub data: Value,
    pub event_count: u64,
    /// the max event time folded into the window
    pub event_time: u64,
    pub processing_time: u64,
    pub revision: u32,
}

impl ProcessingResult {
    pub fn new(
        window: &Window,
        data: Value,
        event_count: u64,
        event_time: u64,
        revision: u32,
    ) -> Self {
        ProcessingResult {
            result_id: uuid::Uuid::new_v4().to_string(),
            partition_key: window.partition_key().to_string(),
            window_id: window.window_id().to_string(),
            window_start: window.start(),
            window_end: window.end(),
            data,
            event_count,
            event_time,
            processing_time: current_timestamp_millis(),
            revision,
        }
    }
}

/// Side channel content: admissible-but-late events and results the sink refused.
#[derive(Clone, Debug)]
pub enum DeadLetter {
    LateEvent { event: StreamEvent, window: Window },
    FailedEmission { result: ProcessingResult, reason: String },
}

#[cfg(test)]
mod tests {
    use std::convert::TryFrom;

    use serde_json::json;

    use crate::core::element::{RawEvent, StreamEvent};
    use crate::core::error::Error;
    use crate::core::watermark::MAX_WATERMARK;

    #[test]
    pub fn from_json_millis_test() {
        let event = StreamEvent::from_json(
            r#"{"partition_key":"k1","source":"s1","event_time":1000,"payload":{"v":1}}"#,
        )
        .unwrap();
        assert_eq!(event.partition_key(), "k1");
        assert_eq!(event.source(), "s1");
        assert_eq!(event.event_time(), 1000);
        assert_eq!(event.payload(), &json!({"v": 1}));
    }

    #[test]
    pub fn from_json_rfc3339_test() {
        let event = StreamEvent::from_json(
            r#"{"partition_key":"k1","event_time":"1970-01-01T00:00:10.500Z","headers":{"a":"b"}}"#,
        )
        .unwrap();
        assert_eq!(event.event_time(), 10500);
        assert_eq!(event.source(), "default");
        assert_eq!(event.header("a"), Some("b"));
    }

    #[test]
    pub fn missing_event_time_test() {
        let raw = RawEvent {
            partition_key: "k1".to_string(),
            source: None,
            event_time: None,
            processing_time: None,
            payload: json!(null),
            headers: Default::default(),
        };
        match StreamEvent::try_from(raw) {
            Err(Error::MalformedEvent(_)) => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    pub fn unparseable_event_time_test() {
        let rt = StreamEvent::from_json(r#"{"partition_key":"k1","event_time":"yesterday"}"#);
        assert!(matches!(rt, Err(Error::MalformedEvent(_))));

        let rt = StreamEvent::from_json(r#"{"partition_key":"k1","event_time":-5}"#);
        assert!(matches!(rt, Err(Error::MalformedEvent(_))));

        let rt = StreamEvent::from_json(r#"{"partition_key":"k1","event_time":[1]}"#);
        assert!(matches!(rt, Err(Error::MalformedEvent(_))));
    }

    #[test]
    pub fn validate_range_test() {
        let event = StreamEvent::new("k", "s", MAX_WATERMARK.timestamp, json!(1));
        assert!(matches!(event.validate(), Err(Error::MalformedEvent(_))));

        let event = StreamEvent::new("k", "s", 0, json!(1));
        assert!(event.validate().is_ok());
    }
}
