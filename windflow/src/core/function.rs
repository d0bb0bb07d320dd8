use std::fmt::Debug;

use serde_json::Value;

use crate::core::element::{ProcessingResult, StreamEvent};

/// Base trait of all user supplied functions.
pub trait NamedFunction {
    fn name(&self) -> &str;
}

/// The associative fold applied to each window.
///
/// `add` and `merge` must be order independent: the engine folds events in arrival order and,
/// for session windows, merges accumulators of windows that grew into each other.
pub trait AggregateFunction: NamedFunction + Debug + Send + Sync {
    fn create_accumulator(&self) -> Value;

    fn add(&self, accumulator: &mut Value, event: &StreamEvent);

    fn merge(&self, accumulator: &mut Value, other: Value);

    fn get_result(&self, accumulator: &Value) -> Value {
        accumulator.clone()
    }
}

/// Downstream consumer of window results. A failure is counted and routed to the dead letter
/// channel; retrying is up to the sink itself.
#[async_trait]
pub trait Sink: NamedFunction + Send + Sync {
    async fn emit(&self, result: &ProcessingResult) -> anyhow::Result<()>;
}
