use std::collections::HashMap;
use std::fmt::Debug;

use serde_json::Value;

use crate::core::element::StreamEvent;
use crate::core::error::Result;
use crate::core::window::Window;

pub mod mem_window_state;

pub use mem_window_state::MemoryWindowState;

/// `partition_key -> combined watermark` at the time of a sweep
pub type WatermarkSnapshot = HashMap<String, u64>;

/// Accumulated state of one live window.
#[derive(Clone, Debug, PartialEq)]
pub struct WindowAccumulator {
    pub(crate) window: Window,
    pub(crate) accumulator: Value,
    pub(crate) event_count: u64,
    pub(crate) max_event_time: u64,
    /// emissions done so far
    pub(crate) revision: u32,
    /// folded since the last emission
    pub(crate) dirty: bool,
}

impl WindowAccumulator {
    pub fn new(window: Window, accumulator: Value) -> Self {
        WindowAccumulator {
            window,
            accumulator,
            event_count: 0,
            max_event_time: 0,
            revision: 0,
            dirty: false,
        }
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn accumulator(&self) -> &Value {
        &self.accumulator
    }

    pub fn event_count(&self) -> u64 {
        self.event_count
    }

    pub fn max_event_time(&self) -> u64 {
        self.max_event_time
    }

    pub fn revision(&self) -> u32 {
        self.revision
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

/// Owner of all live window state, keyed by `(partition_key, window_id)`. Every mutation is a
/// complete read-modify-write of the affected windows.
pub trait WindowState: Debug + Send {
    /// Fold `event` into `window` (merging sessions first when the window type requires it).
    /// Returns the window the event ended up in.
    fn accumulate(
        &mut self,
        partition_key: &str,
        window: &Window,
        event: &StreamEvent,
    ) -> Result<Window>;

    fn get(&self, partition_key: &str, window_id: &str) -> Result<&WindowAccumulator>;

    /// Remove the window for good and return its final state.
    fn evict(&mut self, partition_key: &str, window_id: &str) -> Result<WindowAccumulator>;

    /// Windows with `end + allowed_lateness <= watermark`, per partition in ascending end order.
    fn list_expirable(&self, watermarks: &WatermarkSnapshot) -> Vec<(String, String)>;

    /// Windows with `end <= watermark < end + allowed_lateness` that were never emitted or
    /// changed since their last emission, per partition in ascending end order.
    fn list_fireable(&self, watermarks: &WatermarkSnapshot) -> Vec<(String, String)>;

    /// Record an emission of the window: bump its revision and clear the dirty flag. Returns
    /// the state as emitted.
    fn mark_emitted(&mut self, partition_key: &str, window_id: &str) -> Result<WindowAccumulator>;

    /// Remove every window of every partition.
    fn drain(&mut self) -> Vec<WindowAccumulator>;

    fn window_count(&self) -> usize;

    fn partition_window_count(&self, partition_key: &str) -> usize;
}
