use serde_json::Value;

use crate::core::element::StreamEvent;
use crate::core::function::{AggregateFunction, NamedFunction};

/// Sums a numeric payload, or a numeric field of an object payload. Non numeric values count
/// as zero.
#[derive(Debug, Default)]
pub struct Sum {
    field: Option<String>,
}

impl Sum {
    pub fn new() -> Self {
        Sum { field: None }
    }

    pub fn of_field(field: &str) -> Self {
        Sum {
            field: Some(field.to_string()),
        }
    }

    fn value_of(&self, event: &StreamEvent) -> f64 {
        let value = match &self.field {
            Some(field) => event.payload().get(field.as_str()),
            None => Some(event.payload()),
        };
        match value.and_then(|v| v.as_f64()) {
            Some(v) => v,
            None => {
                debug!(
                    "non numeric payload ignored, partition_key={}, event_time={}",
                    event.partition_key(),
                    event.event_time()
                );
                0f64
            }
        }
    }
}

impl AggregateFunction for Sum {
    fn create_accumulator(&self) -> Value {
        Value::from(0f64)
    }

    fn add(&self, accumulator: &mut Value, event: &StreamEvent) {
        let sum = accumulator.as_f64().unwrap_or(0f64) + self.value_of(event);
        *accumulator = Value::from(sum);
    }

    fn merge(&self, accumulator: &mut Value, other: Value) {
        let sum = accumulator.as_f64().unwrap_or(0f64) + other.as_f64().unwrap_or(0f64);
        *accumulator = Value::from(sum);
    }
}

impl NamedFunction for Sum {
    fn name(&self) -> &str {
        "Sum"
    }
}
