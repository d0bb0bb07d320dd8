use serde_json::Value;

use crate::core::element::StreamEvent;
use crate::core::function::{AggregateFunction, NamedFunction};

#[derive(Debug, Default)]
pub struct Count {}

impl Count {
    pub fn new() -> Self {
        Count {}
    }
}

impl AggregateFunction for Count {
    fn create_accumulator(&self) -> Value {
        Value::from(0u64)
    }

    fn add(&self, accumulator: &mut Value, _event: &StreamEvent) {
        let n = accumulator.as_u64().unwrap_or(0);
        *accumulator = Value::from(n + 1);
    }

    fn merge(&self, accumulator: &mut Value, other: Value) {
        let n = accumulator.as_u64().unwrap_or(0) + other.as_u64().unwrap_or(0);
        *accumulator = Value::from(n);
    }
}

impl NamedFunction for Count {
    fn name(&self) -> &str {
        "Count"
    }
}
