use std::time::Duration;

use crate::core::config::EngineConfig;
use crate::core::function::NamedFunction;
use crate::core::watermark::{WatermarkGenerator, WatermarkStrategy};
use crate::functions::watermark::{BoundedOutOfOrdernessWatermarks, WatermarksWithIdleness};

/// Creates one generator per source: bounded out of orderness, optionally wrapped with
/// idleness detection.
#[derive(Debug, Clone)]
pub struct DefaultWatermarkStrategy {
    out_of_orderness: Duration,
    idle_timeout: Option<Duration>,
}

impl DefaultWatermarkStrategy {
    pub fn new() -> Self {
        DefaultWatermarkStrategy {
            out_of_orderness: Duration::from_millis(0),
            idle_timeout: None,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        let strategy = DefaultWatermarkStrategy::new().for_bounded_out_of_orderness(
            Duration::from_millis(config.out_of_orderness_ms()),
        );
        if config.idle_source_timeout_ms() > 0 {
            strategy.wrap_idleness(Duration::from_millis(config.idle_source_timeout_ms()))
        } else {
            strategy
        }
    }

    pub fn for_bounded_out_of_orderness(mut self, out_of_orderness: Duration) -> Self {
        self.out_of_orderness = out_of_orderness;
        self
    }

    pub fn wrap_idleness(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = Some(idle_timeout);
        self
    }
}

impl Default for DefaultWatermarkStrategy {
    fn default() -> Self {
        DefaultWatermarkStrategy::new()
    }
}

impl WatermarkStrategy for DefaultWatermarkStrategy {
    fn create_watermark_generator(&self) -> Box<dyn WatermarkGenerator> {
        let generator: Box<dyn WatermarkGenerator> =
            Box::new(BoundedOutOfOrdernessWatermarks::new(self.out_of_orderness));
        match self.idle_timeout {
            Some(idle_timeout) => Box::new(WatermarksWithIdleness::new(generator, idle_timeout)),
            None => generator,
        }
    }
}

impl NamedFunction for DefaultWatermarkStrategy {
    fn name(&self) -> &str {
        "DefaultWatermarkStrategy"
    }
}
