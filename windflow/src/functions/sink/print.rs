use std::time::Duration;

use crate::core::element::ProcessingResult;
use crate::core::function::{NamedFunction, Sink};
use crate::utils::date_time::fmt_date_time;

pub fn print_sink() -> PrintSink {
    PrintSink::new()
}

pub struct PrintSink {}

impl PrintSink {
    pub fn new() -> Self {
        PrintSink {}
    }
}

#[async_trait]
impl Sink for PrintSink {
    async fn emit(&self, result: &ProcessingResult) -> anyhow::Result<()> {
        println!(
            "partition_key: {}, window: [{}, {}), revision: {}, count: {}, data: {}",
            result.partition_key,
            fmt_date_time(Duration::from_millis(result.window_start), "%T%.3f"),
            fmt_date_time(Duration::from_millis(result.window_end), "%T%.3f"),
            result.revision,
            result.event_count,
            result.data,
        );
        Ok(())
    }
}

impl NamedFunction for PrintSink {
    fn name(&self) -> &str {
        "PrintSink"
    }
}
