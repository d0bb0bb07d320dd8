use serde_json::{json, Value};

use crate::core::element::StreamEvent;
use crate::core::function::{AggregateFunction, NamedFunction};

const EVENT_TIME: &str = "t";
const PAYLOAD: &str = "v";

/// Collects every payload of the window. The result is ordered by event time, then payload, so
/// it does not depend on arrival order.
#[derive(Debug, Default)]
pub struct Collect {}

impl Collect {
    pub fn new() -> Self {
        Collect {}
    }
}

impl AggregateFunction for Collect {
    fn create_accumulator(&self) -> Value {
        Value::Array(Vec::new())
    }

    fn add(&self, accumulator: &mut Value, event: &StreamEvent) {
        let entry = json!({EVENT_TIME: event.event_time(), PAYLOAD: event.payload().clone()});
        match accumulator {
            Value::Array(entries) => entries.push(entry),
            _ => *accumulator = Value::Array(vec![entry]),
        }
    }

    fn merge(&self, accumulator: &mut Value, other: Value) {
        if let Value::Array(others) = other {
            match accumulator {
                Value::Array(entries) => entries.extend(others),
                _ => *accumulator = Value::Array(others),
            }
        }
    }

    fn get_result(&self, accumulator: &Value) -> Value {
        let mut entries = match accumulator {
            Value::Array(entries) => entries.clone(),
            _ => Vec::new(),
        };
        // equal event times fall back to the serialized payload
        entries.sort_by_cached_key(|entry| {
            (
                entry[EVENT_TIME].as_u64().unwrap_or(0),
                entry[PAYLOAD].to_string(),
            )
        });
        Value::Array(
            entries
                .into_iter()
                .map(|mut entry| entry[PAYLOAD].take())
                .collect(),
        )
    }
}

impl NamedFunction for Collect {
    fn name(&self) -> &str {
        "Collect"
    }
}
