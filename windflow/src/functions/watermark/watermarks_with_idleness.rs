use std::time::Duration;

use crate::core::watermark::{Watermark, WatermarkGenerator, IDLE_WATERMARK};

/// A `WatermarkGenerator` that adds idleness detection to another `WatermarkGenerator`. If no
/// events come within a certain time (timeout duration) then this generator marks the stream as
/// idle, until the next event arrives.
///
/// Reference: `org.apache.flink.api.common.eventtime.WatermarksWithIdleness`
#[derive(Debug)]
pub struct WatermarksWithIdleness {
    watermarks: Box<dyn WatermarkGenerator>,
    idleness_timer: IdlenessTimer,
}

impl WatermarksWithIdleness {
    pub fn new(watermarks: Box<dyn WatermarkGenerator>, idle_timeout: Duration) -> Self {
        WatermarksWithIdleness {
            watermarks,
            idleness_timer: IdlenessTimer::new(idle_timeout),
        }
    }
}

impl WatermarkGenerator for WatermarksWithIdleness {
    fn on_event(&mut self, event_timestamp: u64, processing_time: u64) -> Option<Watermark> {
        self.idleness_timer.activity(processing_time);
        self.watermarks.on_event(event_timestamp, processing_time)
    }

    fn on_periodic_emit(&mut self, processing_time: u64) -> Option<Watermark> {
        if self.idleness_timer.check_if_idle(processing_time) {
            Some(IDLE_WATERMARK)
        } else {
            self.watermarks.on_periodic_emit(processing_time)
        }
    }

    fn current_watermark(&self) -> Watermark {
        self.watermarks.current_watermark()
    }
}

#[derive(Debug)]
pub struct IdlenessTimer {
    last_activity_millis: Option<u64>,
    max_idle_time_millis: u64,
}

impl IdlenessTimer {
    pub fn new(idle_timeout: Duration) -> Self {
        IdlenessTimer {
            last_activity_millis: None,
            max_idle_time_millis: idle_timeout.as_millis() as u64,
        }
    }

    pub fn activity(&mut self, processing_time: u64) {
        // processing times of out of order deliveries may step back, keep the latest
        let last = self.last_activity_millis.unwrap_or(0);
        self.last_activity_millis = Some(last.max(processing_time));
    }

    pub fn check_if_idle(&self, processing_time: u64) -> bool {
        match self.last_activity_millis {
            Some(last) => processing_time.saturating_sub(last) >= self.max_idle_time_millis,
            // registered but never active
            None => true,
        }
    }
}
