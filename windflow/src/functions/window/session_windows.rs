use crate::core::function::NamedFunction;
use crate::core::window::{Window, WindowAssigner, WindowType};

/// Each event opens a proto session `[t, t + gap)`; overlapping or touching sessions of a
/// partition are merged by the window state.
#[derive(Debug)]
pub struct EventTimeSessionWindows {
    gap: u64,
}

impl EventTimeSessionWindows {
    pub fn new(gap: u64) -> Self {
        EventTimeSessionWindows { gap }
    }

    pub fn gap(&self) -> u64 {
        self.gap
    }
}

impl WindowAssigner for EventTimeSessionWindows {
    fn assign_windows(&self, partition_key: &str, timestamp: u64) -> Vec<Window> {
        vec![Window::new(
            partition_key,
            WindowType::Session,
            timestamp,
            timestamp.saturating_add(self.gap),
        )]
    }

    fn window_type(&self) -> WindowType {
        WindowType::Session
    }

    fn is_merging(&self) -> bool {
        true
    }
}

impl NamedFunction for EventTimeSessionWindows {
    fn name(&self) -> &str {
        "EventTimeSessionWindows"
    }
}
