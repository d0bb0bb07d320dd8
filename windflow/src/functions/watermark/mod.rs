pub mod bounded_out_of_orderness_watermarks;
pub mod default_watermark_strategy;
pub mod watermarks_with_idleness;

pub use bounded_out_of_orderness_watermarks::BoundedOutOfOrdernessWatermarks;
pub use default_watermark_strategy::DefaultWatermarkStrategy;
pub use watermarks_with_idleness::WatermarksWithIdleness;
