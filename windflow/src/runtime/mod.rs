pub mod engine;
pub mod late_data;
pub mod logger;
pub mod processor;
pub mod status;
pub mod timer;
pub mod watermark_tracker;
pub mod worker;

pub use engine::StreamEngine;
pub use status::EngineStatus;
pub use late_data::{Admission, LateDataPolicy};
pub use watermark_tracker::WatermarkTracker;
