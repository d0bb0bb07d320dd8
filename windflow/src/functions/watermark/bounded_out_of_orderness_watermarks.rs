use std::time::Duration;

use crate::core::watermark::{Watermark, WatermarkGenerator, MIN_WATERMARK};

/// `max event time seen - out_of_orderness`, never moving backwards.
#[derive(Debug)]
pub struct BoundedOutOfOrdernessWatermarks {
    max_timestamp: Option<u64>,
    out_of_orderness_millis: u64,
}

impl BoundedOutOfOrdernessWatermarks {
    pub fn new(out_of_orderness: Duration) -> Self {
        BoundedOutOfOrdernessWatermarks {
            max_timestamp: None,
            out_of_orderness_millis: out_of_orderness.as_millis() as u64,
        }
    }
}

impl WatermarkGenerator for BoundedOutOfOrdernessWatermarks {
    fn on_event(&mut self, event_timestamp: u64, _processing_time: u64) -> Option<Watermark> {
        match self.max_timestamp {
            Some(max_timestamp) if max_timestamp >= event_timestamp => None,
            _ => {
                self.max_timestamp = Some(event_timestamp);
                Some(self.current_watermark())
            }
        }
    }

    fn on_periodic_emit(&mut self, _processing_time: u64) -> Option<Watermark> {
        Some(self.current_watermark())
    }

    fn current_watermark(&self) -> Watermark {
        match self.max_timestamp {
            Some(max_timestamp) => {
                Watermark::new(max_timestamp.saturating_sub(self.out_of_orderness_millis))
            }
            None => MIN_WATERMARK,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::core::watermark::{Watermark, WatermarkGenerator, MIN_WATERMARK};
    use crate::functions::watermark::BoundedOutOfOrdernessWatermarks;

    #[test]
    pub fn strictly_ascending_test() {
        let mut generator = BoundedOutOfOrdernessWatermarks::new(Duration::from_millis(0));
        assert_eq!(generator.current_watermark(), MIN_WATERMARK);

        assert_eq!(generator.on_event(1000, 0), Some(Watermark::new(1000)));
        assert_eq!(generator.on_event(500, 0), None);
        assert_eq!(generator.current_watermark(), Watermark::new(1000));
        assert_eq!(generator.on_event(2000, 0), Some(Watermark::new(2000)));
    }

    #[test]
    pub fn out_of_orderness_test() {
        let mut generator = BoundedOutOfOrdernessWatermarks::new(Duration::from_millis(3000));
        generator.on_event(1000, 0);
        assert_eq!(generator.current_watermark(), MIN_WATERMARK);
        generator.on_event(10000, 0);
        assert_eq!(generator.on_periodic_emit(0), Some(Watermark::new(7000)));
    }
}
