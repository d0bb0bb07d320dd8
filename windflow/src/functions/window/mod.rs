use crate::core::element::StreamEvent;
use crate::core::error::{Error, Result};
use crate::core::window::{Window, WindowAssigner, WindowConfig, WindowType};

pub mod session_windows;
pub mod sliding_event_time_windows;
pub mod tumbling_event_time_windows;

pub use session_windows::EventTimeSessionWindows;
pub use sliding_event_time_windows::SlidingEventTimeWindows;
pub use tumbling_event_time_windows::TumblingEventTimeWindows;

/// Build the assigner for `config`, re-checking the config first.
pub fn create_window_assigner(config: &WindowConfig) -> Result<Box<dyn WindowAssigner>> {
    config
        .validate()
        .map_err(|e| Error::InvalidConfig(e.to_string()))?;

    let invalid = || Error::InvalidConfig(format!("incomplete {} config", config.window_type()));
    let assigner: Box<dyn WindowAssigner> = match config.window_type() {
        WindowType::Tumbling => Box::new(TumblingEventTimeWindows::new(config.size_ms())),
        WindowType::Sliding => Box::new(SlidingEventTimeWindows::new(
            config.size_ms(),
            config.slide_ms().ok_or_else(invalid)?,
        )),
        WindowType::Session => Box::new(EventTimeSessionWindows::new(
            config.gap_ms().ok_or_else(invalid)?,
        )),
    };
    Ok(assigner)
}

/// Windows of `event` under `config`. Session windows come back as the event's own proto
/// session `[t, t + gap)`, merging with the partition's live sessions is done by the state store.
pub fn assign(event: &StreamEvent, config: &WindowConfig) -> Result<Vec<Window>> {
    let assigner = create_window_assigner(config)?;
    Ok(assigner.assign_windows(event.partition_key(), event.event_time()))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use crate::core::element::StreamEvent;
    use crate::core::watermark::MAX_WATERMARK;
    use crate::core::window::WindowConfig;
    use crate::functions::window::assign;

    #[test]
    pub fn assign_tumbling_test() {
        let config = WindowConfig::tumbling(Duration::from_millis(10000)).unwrap();
        let event = StreamEvent::new("k1", "s1", 12345, json!(1));

        let windows = assign(&event, &config).unwrap();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].start(), 10000);
        assert_eq!(windows[0].end(), 20000);
        assert_eq!(windows[0].partition_key(), "k1");
    }

    #[test]
    pub fn assign_sliding_test() {
        let config =
            WindowConfig::sliding(Duration::from_millis(10), Duration::from_millis(5)).unwrap();
        let event = StreamEvent::new("k1", "s1", 12, json!(1));

        let windows = assign(&event, &config).unwrap();
        let ranges: Vec<(u64, u64)> = windows.iter().map(|w| (w.start(), w.end())).collect();
        assert_eq!(ranges, vec![(5, 15), (10, 20)]);
    }

    #[test]
    pub fn assign_session_test() {
        let config = WindowConfig::session(Duration::from_millis(3000)).unwrap();
        let event = StreamEvent::new("k1", "s1", 1000, json!(1));

        let windows = assign(&event, &config).unwrap();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].start(), 1000);
        assert_eq!(windows[0].end(), 4000);
    }

    #[test]
    pub fn assign_max_length_test() {
        let max = MAX_WATERMARK.timestamp();
        let event = StreamEvent::new("k1", "s1", max - 1, json!(1));

        let config = WindowConfig::session(Duration::from_millis(max)).unwrap();
        let windows = assign(&event, &config).unwrap();
        assert_eq!(windows[0].start(), max - 1);
        assert_eq!(windows[0].end(), 2 * max - 1);

        let config = WindowConfig::tumbling(Duration::from_millis(max)).unwrap();
        let windows = assign(&event, &config).unwrap();
        assert_eq!((windows[0].start(), windows[0].end()), (0, max));

        let config =
            WindowConfig::sliding(Duration::from_millis(max), Duration::from_millis(max)).unwrap();
        let windows = assign(&event, &config).unwrap();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].end(), max);

        assert!(WindowConfig::session(Duration::from_secs(u64::MAX)).is_err());
    }
}
