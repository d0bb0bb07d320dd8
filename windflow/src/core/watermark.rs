use std::fmt::Debug;

use crate::core::function::NamedFunction;
use crate::utils::date_time::timestamp_str;

/// 9999-12-31, any event time at or beyond it is treated as malformed
pub const MAX_WATERMARK: Watermark = Watermark {
    timestamp: 253402185600000u64,
};
pub const MIN_WATERMARK: Watermark = Watermark { timestamp: 0x0 };
/// Marker returned by a generator whose source has gone idle
pub const IDLE_WATERMARK: Watermark = Watermark {
    timestamp: u64::MAX,
};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Watermark {
    pub(crate) timestamp: u64,
}

impl Watermark {
    pub fn new(timestamp: u64) -> Self {
        Watermark { timestamp }
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn is_idle(&self) -> bool {
        self.timestamp == IDLE_WATERMARK.timestamp
    }

    pub fn is_max(&self) -> bool {
        self.timestamp >= MAX_WATERMARK.timestamp && !self.is_idle()
    }
}

impl std::fmt::Display for Watermark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_idle() {
            write!(f, "Watermark(IDLE)")
        } else {
            write!(f, "Watermark({})", timestamp_str(self.timestamp))
        }
    }
}

/// Per source estimate of event time progress.
pub trait WatermarkGenerator: Debug + Send {
    /// Called for every event, allows the watermark generator to examine and remember the event
    /// timestamps, or to emit a watermark based on the event itself.
    fn on_event(&mut self, event_timestamp: u64, processing_time: u64) -> Option<Watermark>;

    /// Called periodically, and might emit a new watermark, or not. May return `IDLE_WATERMARK`
    /// when the source has seen no events for a while.
    fn on_periodic_emit(&mut self, processing_time: u64) -> Option<Watermark>;

    /// The watermark implied by the events seen so far.
    fn current_watermark(&self) -> Watermark;
}

pub trait WatermarkStrategy: NamedFunction + Debug + Send + Sync {
    fn create_watermark_generator(&self) -> Box<dyn WatermarkGenerator>;
}
