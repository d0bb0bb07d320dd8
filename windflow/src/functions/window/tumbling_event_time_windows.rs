use crate::core::function::NamedFunction;
use crate::core::window::{TimeWindow, Window, WindowAssigner, WindowType};

#[derive(Debug)]
pub struct TumblingEventTimeWindows {
    size: u64,
}

impl TumblingEventTimeWindows {
    pub fn new(size: u64) -> Self {
        TumblingEventTimeWindows { size }
    }
}

impl WindowAssigner for TumblingEventTimeWindows {
    fn assign_windows(&self, partition_key: &str, timestamp: u64) -> Vec<Window> {
        let start = TimeWindow::get_window_start_with_offset(timestamp, 0, self.size) as u64;
        vec![Window::new(
            partition_key,
            WindowType::Tumbling,
            start,
            start.saturating_add(self.size),
        )]
    }

    fn window_type(&self) -> WindowType {
        WindowType::Tumbling
    }
}

impl NamedFunction for TumblingEventTimeWindows {
    fn name(&self) -> &str {
        "TumblingEventTimeWindows"
    }
}
