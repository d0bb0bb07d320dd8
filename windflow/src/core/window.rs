use std::cmp::{max, min};
use std::convert::TryFrom;
use std::fmt::Debug;
use std::time::Duration;

use crate::core::error::{Error, Result};
use crate::core::function::NamedFunction;
use crate::core::watermark::MAX_WATERMARK;

pub const DEFAULT_ALLOWED_LATENESS_MS: u64 = 5000;

pub trait TWindow: Debug + Clone {
    fn max_timestamp(&self) -> u64;
    fn min_timestamp(&self) -> u64;
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum WindowType {
    Tumbling,
    Sliding,
    Session,
}

impl<'a> TryFrom<&'a str> for WindowType {
    type Error = Error;

    fn try_from(type_str: &'a str) -> Result<Self> {
        let type_str = type_str.to_ascii_lowercase();
        match type_str.as_str() {
            "tumbling" => Ok(WindowType::Tumbling),
            "sliding" => Ok(WindowType::Sliding),
            "session" => Ok(WindowType::Session),
            _ => Err(Error::ConfigValidation(format!(
                "unsupported window type `{}`",
                type_str
            ))),
        }
    }
}

impl std::fmt::Display for WindowType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WindowType::Tumbling => write!(f, "tumbling"),
            WindowType::Sliding => write!(f, "sliding"),
            WindowType::Session => write!(f, "session"),
        }
    }
}

/// Half open time range `[start, end)` in epoch millis.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub struct TimeWindow {
    start: u64,
    end: u64,
}

impl TimeWindow {
    pub fn new(start: u64, end: u64) -> Self {
        TimeWindow { start, end }
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn contains(&self, timestamp: u64) -> bool {
        self.start <= timestamp && timestamp < self.end
    }

    /// Returns `true` if this window intersects the given window.
    pub fn intersects(&self, other: &TimeWindow) -> bool {
        self.start <= other.end && self.end >= other.start
    }

    /// Returns the minimal window covers both this window and the given window.
    pub fn cover(&self, other: &TimeWindow) -> TimeWindow {
        TimeWindow::new(min(self.start, other.start), max(self.end, other.end))
    }

    pub fn get_window_start_with_offset(timestamp: u64, offset: i64, window_size: u64) -> i64 {
        let timestamp = timestamp as i64;
        let window_size = window_size as i64;
        timestamp - (timestamp - offset + window_size) % window_size
    }
}

impl TWindow for TimeWindow {
    fn max_timestamp(&self) -> u64 {
        self.end
    }

    fn min_timestamp(&self) -> u64 {
        self.start
    }
}

/// A window instance of one partition. `window_id` is derived from partition key, window type
/// and start, so the same window always gets the same id.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Window {
    window_id: String,
    window_type: WindowType,
    time_window: TimeWindow,
    partition_key: String,
}

impl Window {
    pub fn new(partition_key: &str, window_type: WindowType, start: u64, end: u64) -> Self {
        Window {
            window_id: Window::window_id_of(partition_key, window_type, start),
            window_type,
            time_window: TimeWindow::new(start, end),
            partition_key: partition_key.to_string(),
        }
    }

    pub fn window_id_of(partition_key: &str, window_type: WindowType, start: u64) -> String {
        format!("{}:{}:{}", partition_key, window_type, start)
    }

    pub fn window_id(&self) -> &str {
        self.window_id.as_str()
    }

    pub fn window_type(&self) -> WindowType {
        self.window_type
    }

    pub fn partition_key(&self) -> &str {
        self.partition_key.as_str()
    }

    pub fn time_window(&self) -> &TimeWindow {
        &self.time_window
    }

    pub fn start(&self) -> u64 {
        self.time_window.start
    }

    pub fn end(&self) -> u64 {
        self.time_window.end
    }

    pub fn contains(&self, timestamp: u64) -> bool {
        self.time_window.contains(timestamp)
    }

    pub fn is_expired(&self, watermark: u64) -> bool {
        watermark >= self.time_window.end
    }

    /// The same partition's window stretched to also cover `other`, the id follows the new start.
    pub fn cover(&self, other: &Window) -> Window {
        let time_window = self.time_window.cover(&other.time_window);
        Window::new(
            self.partition_key.as_str(),
            self.window_type,
            time_window.start,
            time_window.end,
        )
    }
}

impl TWindow for Window {
    fn max_timestamp(&self) -> u64 {
        self.time_window.max_timestamp()
    }

    fn min_timestamp(&self) -> u64 {
        self.time_window.min_timestamp()
    }
}

impl std::fmt::Display for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}[{}, {})",
            self.window_id, self.time_window.start, self.time_window.end
        )
    }
}

/// Window shape plus lateness. Only obtainable through the validating constructors, so any
/// `WindowConfig` in hand has a consistent combination of size/slide/gap.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "WindowConfigRaw")]
pub struct WindowConfig {
    window_type: WindowType,
    size_ms: u64,
    slide_ms: Option<u64>,
    gap_ms: Option<u64>,
    allowed_lateness_ms: u64,
}

/// Unvalidated wire form of a `WindowConfig`
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WindowConfigRaw {
    pub window_type: WindowType,
    #[serde(default)]
    pub size_ms: u64,
    #[serde(default)]
    pub slide_ms: Option<u64>,
    #[serde(default)]
    pub gap_ms: Option<u64>,
    #[serde(default = "default_allowed_lateness")]
    pub allowed_lateness_ms: u64,
}

fn default_allowed_lateness() -> u64 {
    DEFAULT_ALLOWED_LATENESS_MS
}

impl TryFrom<WindowConfigRaw> for WindowConfig {
    type Error = Error;

    fn try_from(raw: WindowConfigRaw) -> Result<Self> {
        let config = WindowConfig {
            window_type: raw.window_type,
            size_ms: raw.size_ms,
            slide_ms: raw.slide_ms,
            gap_ms: raw.gap_ms,
            allowed_lateness_ms: raw.allowed_lateness_ms,
        };
        config.validate()?;
        Ok(config)
    }
}

impl WindowConfig {
    pub fn tumbling(size: Duration) -> Result<Self> {
        WindowConfig::try_from(WindowConfigRaw {
            window_type: WindowType::Tumbling,
            size_ms: millis(size),
            slide_ms: None,
            gap_ms: None,
            allowed_lateness_ms: DEFAULT_ALLOWED_LATENESS_MS,
        })
    }

    pub fn sliding(size: Duration, slide: Duration) -> Result<Self> {
        WindowConfig::try_from(WindowConfigRaw {
            window_type: WindowType::Sliding,
            size_ms: millis(size),
            slide_ms: Some(millis(slide)),
            gap_ms: None,
            allowed_lateness_ms: DEFAULT_ALLOWED_LATENESS_MS,
        })
    }

    pub fn session(gap: Duration) -> Result<Self> {
        WindowConfig::try_from(WindowConfigRaw {
            window_type: WindowType::Session,
            size_ms: 0,
            slide_ms: None,
            gap_ms: Some(millis(gap)),
            allowed_lateness_ms: DEFAULT_ALLOWED_LATENESS_MS,
        })
    }

    pub fn with_allowed_lateness(mut self, allowed_lateness: Duration) -> Self {
        self.allowed_lateness_ms = millis(allowed_lateness);
        self
    }

    pub fn window_type(&self) -> WindowType {
        self.window_type
    }

    pub fn size_ms(&self) -> u64 {
        self.size_ms
    }

    pub fn slide_ms(&self) -> Option<u64> {
        self.slide_ms
    }

    pub fn gap_ms(&self) -> Option<u64> {
        self.gap_ms
    }

    pub fn allowed_lateness_ms(&self) -> u64 {
        self.allowed_lateness_ms
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(Error::ConfigValidation(format!("{}: {}", self.window_type, msg)));
        let max = MAX_WATERMARK.timestamp();
        let lengths = [Some(self.size_ms), self.slide_ms, self.gap_ms];
        if lengths.iter().flatten().any(|length| *length > max) {
            return fail("size, slide and gap must not exceed the max watermark");
        }
        match self.window_type {
            WindowType::Tumbling => {
                if self.size_ms == 0 {
                    return fail("size must be positive");
                }
                if self.slide_ms.is_some() || self.gap_ms.is_some() {
                    return fail("slide and gap are not applicable");
                }
            }
            WindowType::Sliding => {
                if self.size_ms == 0 {
                    return fail("size must be positive");
                }
                match self.slide_ms {
                    Some(slide) if slide > 0 && slide <= self.size_ms => {}
                    Some(_) => return fail("slide must satisfy 0 < slide <= size"),
                    None => return fail("slide is required"),
                }
                if self.gap_ms.is_some() {
                    return fail("gap is not applicable");
                }
            }
            WindowType::Session => {
                match self.gap_ms {
                    Some(gap) if gap > 0 => {}
                    Some(_) => return fail("gap must be positive"),
                    None => return fail("gap is required"),
                }
                if self.size_ms != 0 || self.slide_ms.is_some() {
                    return fail("size and slide are not applicable");
                }
            }
        }
        Ok(())
    }
}

/// Durations past `u64::MAX` millis clamp to it, validation rejects them.
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Maps an event time to the windows it belongs to.
pub trait WindowAssigner: NamedFunction + Debug + Send + Sync {
    fn assign_windows(&self, partition_key: &str, timestamp: u64) -> Vec<Window>;

    fn window_type(&self) -> WindowType;

    /// Whether assigned windows must be merged with the partition's existing windows.
    fn is_merging(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::core::error::Error;
    use crate::core::watermark::MAX_WATERMARK;
    use crate::core::window::{TimeWindow, Window, WindowConfig, WindowType};

    #[test]
    pub fn window_contains_test() {
        let window = Window::new("k1", WindowType::Tumbling, 0, 10000);
        assert!(window.contains(0));
        assert!(window.contains(9999));
        assert!(!window.contains(10000));
        assert!(!window.is_expired(9999));
        assert!(window.is_expired(10000));
        assert_eq!(window.window_id(), "k1:tumbling:0");
    }

    #[test]
    pub fn window_cover_test() {
        let w1 = Window::new("k1", WindowType::Session, 100, 200);
        let w2 = Window::new("k1", WindowType::Session, 50, 150);
        let merged = w1.cover(&w2);
        assert_eq!(merged.start(), 50);
        assert_eq!(merged.end(), 200);
        assert_eq!(merged.window_id(), "k1:session:50");

        assert!(TimeWindow::new(0, 10).intersects(&TimeWindow::new(10, 20)));
        assert!(!TimeWindow::new(0, 10).intersects(&TimeWindow::new(11, 20)));
    }

    #[test]
    pub fn config_validation_test() {
        assert!(WindowConfig::tumbling(Duration::from_secs(10)).is_ok());
        assert!(WindowConfig::tumbling(Duration::from_secs(0)).is_err());
        assert!(WindowConfig::sliding(Duration::from_secs(10), Duration::from_secs(5)).is_ok());
        assert!(WindowConfig::sliding(Duration::from_secs(10), Duration::from_secs(0)).is_err());
        assert!(WindowConfig::sliding(Duration::from_secs(10), Duration::from_secs(11)).is_err());
        assert!(WindowConfig::session(Duration::from_secs(3)).is_ok());

        match WindowConfig::session(Duration::from_secs(0)) {
            Err(Error::ConfigValidation(_)) => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    pub fn config_length_bound_test() {
        let max = MAX_WATERMARK.timestamp();
        assert!(WindowConfig::tumbling(Duration::from_millis(max)).is_ok());
        assert!(WindowConfig::session(Duration::from_millis(max)).is_ok());

        assert!(WindowConfig::tumbling(Duration::from_millis(u64::MAX)).is_err());
        assert!(WindowConfig::session(Duration::from_millis(max + 1)).is_err());
        assert!(WindowConfig::sliding(
            Duration::from_millis(u64::MAX),
            Duration::from_millis(1000)
        )
        .is_err());
    }

    #[test]
    pub fn config_default_lateness_test() {
        let config = WindowConfig::tumbling(Duration::from_secs(10)).unwrap();
        assert_eq!(config.allowed_lateness_ms(), 5000);

        let config = config.with_allowed_lateness(Duration::from_millis(100));
        assert_eq!(config.allowed_lateness_ms(), 100);
    }

    #[test]
    pub fn config_deserialize_test() {
        let config: WindowConfig = serde_json::from_str(
            r#"{"window_type":"Sliding","size_ms":10000,"slide_ms":5000}"#,
        )
        .unwrap();
        assert_eq!(config.slide_ms(), Some(5000));
        assert_eq!(config.allowed_lateness_ms(), 5000);

        let rt: Result<WindowConfig, _> =
            serde_json::from_str(r#"{"window_type":"Sliding","size_ms":10000}"#);
        assert!(rt.is_err());

        let rt: Result<WindowConfig, _> =
            serde_json::from_str(r#"{"window_type":"Tumbling","size_ms":10000,"gap_ms":1}"#);
        assert!(rt.is_err());
    }
}
