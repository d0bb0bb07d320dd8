pub mod metric;

pub use metric::{Counter, Gauge, MetricRegistry, Tag};

pub const EVENTS_ACCEPTED: &str = "Engine.Events.Accepted";
pub const EVENTS_MALFORMED: &str = "Engine.Events.Malformed";
pub const EVENTS_LATE_DROPPED: &str = "Engine.Events.LateDropped";
pub const EVENTS_DEAD_LETTER: &str = "Engine.Events.DeadLetter";
pub const WINDOWS_OPEN: &str = "Engine.Windows.Open";
pub const WINDOWS_EMITTED: &str = "Engine.Windows.Emitted";
pub const WINDOWS_DISCARDED: &str = "Engine.Windows.Discarded";
pub const DEAD_LETTER_OVERFLOW: &str = "Engine.DeadLetter.Overflow";
pub const SINK_FAILURES: &str = "Engine.Sink.Failures";
