use crate::core::function::NamedFunction;
use crate::core::window::{TWindow, TimeWindow, Window, WindowAssigner, WindowType};

/// Windows of length `size` starting at every multiple of `slide`. When `size` is not a multiple
/// of `slide` the count is `size / slide` rounded down plus the boundary window covering the
/// timestamp. Windows that would start before the epoch are not produced.
#[derive(Debug)]
pub struct SlidingEventTimeWindows {
    size: u64,
    slide: u64,
    offset: i64,
}

impl SlidingEventTimeWindows {
    pub fn new(size: u64, slide: u64) -> Self {
        SlidingEventTimeWindows {
            size,
            slide,
            offset: 0,
        }
    }
}

impl WindowAssigner for SlidingEventTimeWindows {
    fn assign_windows(&self, partition_key: &str, timestamp: u64) -> Vec<Window> {
        let mut windows = Vec::with_capacity((self.size / self.slide) as usize + 1);
        let last_start =
            TimeWindow::get_window_start_with_offset(timestamp, self.offset, self.slide);

        let mut start = last_start;
        loop {
            if start > timestamp as i64 - self.size as i64 {
                if start >= 0 {
                    let window = Window::new(
                        partition_key,
                        WindowType::Sliding,
                        start as u64,
                        (start as u64).saturating_add(self.size),
                    );
                    windows.push(window);
                }
                start -= self.slide as i64;
            } else {
                break;
            }
        }

        windows.sort_by_key(|x| x.min_timestamp());
        windows
    }

    fn window_type(&self) -> WindowType {
        WindowType::Sliding
    }
}

impl NamedFunction for SlidingEventTimeWindows {
    fn name(&self) -> &str {
        "SlidingEventTimeWindows"
    }
}

#[cfg(test)]
mod tests {
    use crate::core::window::WindowAssigner;
    use crate::functions::window::SlidingEventTimeWindows;

    #[test]
    pub fn sliding_count_test() {
        let size = 60000;
        let slide = 15000;
        let assigner = SlidingEventTimeWindows::new(size, slide);

        for t in [60000u64, 74999, 75000, 1593586800123] {
            let windows = assigner.assign_windows("k", t);
            assert_eq!(windows.len() as u64, size / slide);
            for window in &windows {
                assert_eq!(window.end() - window.start(), size);
                assert_eq!(window.start() % slide, 0);
                assert!(window.contains(t));
            }
        }
    }

    #[test]
    pub fn sliding_non_integral_test() {
        // 10 / 4 rounds down to 2, plus the boundary window
        let assigner = SlidingEventTimeWindows::new(10, 4);
        let windows = assigner.assign_windows("k", 12);
        let ranges: Vec<(u64, u64)> = windows.iter().map(|w| (w.start(), w.end())).collect();
        assert_eq!(ranges, vec![(4, 14), (8, 18), (12, 22)]);
    }

    #[test]
    pub fn sliding_epoch_edge_test() {
        let assigner = SlidingEventTimeWindows::new(10, 5);
        let windows = assigner.assign_windows("k", 3);
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].start(), 0);
    }
}
