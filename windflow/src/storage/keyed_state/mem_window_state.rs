use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::core::element::StreamEvent;
use crate::core::error::{Error, Result};
use crate::core::function::AggregateFunction;
use crate::core::window::{Window, WindowType};
use crate::storage::keyed_state::{WindowAccumulator, WindowState, WatermarkSnapshot};

#[derive(Debug, Default)]
struct PartitionWindows {
    /// window_id -> state
    windows: HashMap<String, WindowAccumulator>,
    /// session start -> window_id, live sessions never overlap or touch
    sessions: BTreeMap<u64, String>,
}

impl PartitionWindows {
    fn insert(&mut self, state: WindowAccumulator) {
        if state.window.window_type() == WindowType::Session {
            self.sessions
                .insert(state.window.start(), state.window.window_id().to_string());
        }
        self.windows
            .insert(state.window.window_id().to_string(), state);
    }

    fn remove(&mut self, window_id: &str) -> Option<WindowAccumulator> {
        let state = self.windows.remove(window_id)?;
        if state.window.window_type() == WindowType::Session {
            self.sessions.remove(&state.window.start());
        }
        Some(state)
    }

    /// Starts of the live sessions that intersect `proto`, in ascending order.
    fn intersecting_sessions(&self, proto: &Window) -> Result<Vec<u64>> {
        let mut starts = Vec::new();
        for (start, window_id) in self.sessions.range(..=proto.end()).rev() {
            let state = self.windows.get(window_id).ok_or_else(|| {
                Error::InternalInvariantViolation(format!(
                    "session index refers to missing window {}",
                    window_id
                ))
            })?;
            if state.window.end() >= proto.start() {
                starts.push(*start);
            } else {
                break;
            }
        }
        starts.reverse();
        Ok(starts)
    }

    fn sorted_by_end<'a, I>(states: I) -> Vec<&'a WindowAccumulator>
    where
        I: Iterator<Item = &'a WindowAccumulator>,
    {
        let mut states: Vec<&WindowAccumulator> = states.collect();
        states.sort_by_key(|s| (s.window.end(), s.window.start()));
        states
    }
}

/// In-memory window state, one `PartitionWindows` per partition key.
#[derive(Debug)]
pub struct MemoryWindowState {
    aggregate: Arc<dyn AggregateFunction>,
    allowed_lateness: u64,
    partitions: HashMap<String, PartitionWindows>,
}

impl MemoryWindowState {
    pub fn new(aggregate: Arc<dyn AggregateFunction>, allowed_lateness: u64) -> Self {
        debug!(
            "create memory window state, aggregate={}, allowed_lateness={}",
            aggregate.name(),
            allowed_lateness
        );
        MemoryWindowState {
            aggregate,
            allowed_lateness,
            partitions: HashMap::new(),
        }
    }

    fn fold(&self, state: &mut WindowAccumulator, event: &StreamEvent) {
        self.aggregate.add(&mut state.accumulator, event);
        state.event_count += 1;
        state.max_event_time = state.max_event_time.max(event.event_time());
        state.dirty = true;
    }

    /// Merge `proto` with every live session it touches. The merged sessions are only removed
    /// once the combined accumulator has been built.
    fn merge_session(
        &mut self,
        partition_key: &str,
        proto: &Window,
        event: &StreamEvent,
    ) -> Result<Window> {
        let aggregate = self.aggregate.clone();
        let partition = self
            .partitions
            .entry(partition_key.to_string())
            .or_insert_with(PartitionWindows::default);

        let starts = partition.intersecting_sessions(proto)?;
        let merged_ids: Vec<String> = starts
            .iter()
            .filter_map(|start| partition.sessions.get(start).cloned())
            .collect();

        let mut merged_window = proto.clone();
        for window_id in &merged_ids {
            if let Some(state) = partition.windows.get(window_id) {
                merged_window = merged_window.cover(&state.window);
            }
        }

        let mut target = if merged_ids.len() == 1
            && partition
                .windows
                .get(&merged_ids[0])
                .map(|s| s.window == merged_window)
                .unwrap_or(false)
        {
            // the event falls inside an existing session
            partition.remove(&merged_ids[0]).ok_or_else(|| {
                Error::InternalInvariantViolation(format!("session {} vanished", merged_ids[0]))
            })?
        } else {
            let mut combined =
                WindowAccumulator::new(merged_window.clone(), aggregate.create_accumulator());
            for window_id in &merged_ids {
                let state = partition.windows.get(window_id).ok_or_else(|| {
                    Error::InternalInvariantViolation(format!(
                        "session {} vanished while merging",
                        window_id
                    ))
                })?;
                aggregate.merge(&mut combined.accumulator, state.accumulator.clone());
                combined.event_count += state.event_count;
                combined.max_event_time = combined.max_event_time.max(state.max_event_time);
                combined.revision = combined.revision.max(state.revision);
            }
            if !merged_ids.is_empty() {
                debug!(
                    "merge sessions {:?} into {}",
                    merged_ids,
                    combined.window
                );
            }
            for window_id in &merged_ids {
                partition.remove(window_id);
            }
            combined
        };

        aggregate.add(&mut target.accumulator, event);
        target.event_count += 1;
        target.max_event_time = target.max_event_time.max(event.event_time());
        target.dirty = true;

        let window = target.window.clone();
        partition.insert(target);
        Ok(window)
    }

    fn sweep<F>(&self, watermarks: &WatermarkSnapshot, filter: F) -> Vec<(String, String)>
    where
        F: Fn(&WindowAccumulator, u64) -> bool,
    {
        let mut partition_keys: Vec<&String> = self.partitions.keys().collect();
        partition_keys.sort();

        let mut windows = Vec::new();
        for partition_key in partition_keys {
            let watermark = match watermarks.get(partition_key.as_str()) {
                Some(watermark) => *watermark,
                None => continue,
            };
            let partition = &self.partitions[partition_key];
            for state in PartitionWindows::sorted_by_end(partition.windows.values()) {
                if filter(state, watermark) {
                    windows.push((partition_key.clone(), state.window.window_id().to_string()));
                }
            }
        }
        windows
    }
}

impl WindowState for MemoryWindowState {
    fn accumulate(
        &mut self,
        partition_key: &str,
        window: &Window,
        event: &StreamEvent,
    ) -> Result<Window> {
        if window.partition_key() != partition_key {
            return Err(Error::InternalInvariantViolation(format!(
                "window {} accumulated under partition {}",
                window, partition_key
            )));
        }

        if window.window_type() == WindowType::Session {
            return self.merge_session(partition_key, window, event);
        }

        let mut state = match self
            .partitions
            .get_mut(partition_key)
            .and_then(|p| p.remove(window.window_id()))
        {
            Some(state) => state,
            None => WindowAccumulator::new(window.clone(), self.aggregate.create_accumulator()),
        };
        self.fold(&mut state, event);

        self.partitions
            .entry(partition_key.to_string())
            .or_insert_with(PartitionWindows::default)
            .insert(state);
        Ok(window.clone())
    }

    fn get(&self, partition_key: &str, window_id: &str) -> Result<&WindowAccumulator> {
        self.partitions
            .get(partition_key)
            .and_then(|p| p.windows.get(window_id))
            .ok_or_else(|| Error::NotFound {
                partition_key: partition_key.to_string(),
                window_id: window_id.to_string(),
            })
    }

    fn evict(&mut self, partition_key: &str, window_id: &str) -> Result<WindowAccumulator> {
        let partition = self.partitions.get_mut(partition_key).ok_or_else(|| {
            Error::InternalInvariantViolation(format!(
                "evict window {} of unknown partition {}",
                window_id, partition_key
            ))
        })?;
        let state = partition.remove(window_id).ok_or_else(|| {
            Error::InternalInvariantViolation(format!(
                "evict unknown window {} of partition {}",
                window_id, partition_key
            ))
        })?;

        if partition.windows.is_empty() {
            self.partitions.remove(partition_key);
        }
        Ok(state)
    }

    fn list_expirable(&self, watermarks: &WatermarkSnapshot) -> Vec<(String, String)> {
        let allowed_lateness = self.allowed_lateness;
        self.sweep(watermarks, |state, watermark| {
            state.window.end().saturating_add(allowed_lateness) <= watermark
        })
    }

    fn list_fireable(&self, watermarks: &WatermarkSnapshot) -> Vec<(String, String)> {
        let allowed_lateness = self.allowed_lateness;
        self.sweep(watermarks, |state, watermark| {
            state.window.end() <= watermark
                && watermark < state.window.end().saturating_add(allowed_lateness)
                && (state.revision == 0 || state.dirty)
        })
    }

    fn mark_emitted(&mut self, partition_key: &str, window_id: &str) -> Result<WindowAccumulator> {
        let state = self
            .partitions
            .get_mut(partition_key)
            .and_then(|p| p.windows.get_mut(window_id))
            .ok_or_else(|| Error::NotFound {
                partition_key: partition_key.to_string(),
                window_id: window_id.to_string(),
            })?;
        state.revision += 1;
        state.dirty = false;
        Ok(state.clone())
    }

    fn drain(&mut self) -> Vec<WindowAccumulator> {
        let mut partition_keys: Vec<String> = self.partitions.keys().cloned().collect();
        partition_keys.sort();

        let mut states = Vec::new();
        for partition_key in partition_keys {
            if let Some(partition) = self.partitions.remove(&partition_key) {
                let mut windows: Vec<WindowAccumulator> =
                    partition.windows.into_iter().map(|(_, s)| s).collect();
                windows.sort_by_key(|s| (s.window.end(), s.window.start()));
                states.extend(windows);
            }
        }
        states
    }

    fn window_count(&self) -> usize {
        self.partitions.values().map(|p| p.windows.len()).sum()
    }

    fn partition_window_count(&self, partition_key: &str) -> usize {
        self.partitions
            .get(partition_key)
            .map(|p| p.windows.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{json, Value};

    use crate::core::element::StreamEvent;
    use crate::core::error::Error;
    use crate::core::window::{Window, WindowType};
    use crate::functions::aggregate::collect::Collect;
    use crate::functions::aggregate::count::Count;
    use crate::storage::keyed_state::{MemoryWindowState, WatermarkSnapshot, WindowState};

    fn event(key: &str, ts: u64) -> StreamEvent {
        StreamEvent::new(key, "s1", ts, json!(ts))
    }

    fn snapshot(entries: &[(&str, u64)]) -> WatermarkSnapshot {
        entries.iter().map(|(k, w)| (k.to_string(), *w)).collect()
    }

    fn session(key: &str, ts: u64) -> Window {
        Window::new(key, WindowType::Session, ts, ts + 5000)
    }

    #[test]
    pub fn accumulate_tumbling_test() {
        let mut state = MemoryWindowState::new(Arc::new(Count::new()), 0);
        let window = Window::new("k1", WindowType::Tumbling, 0, 10000);
        for ts in [1000, 4000, 9500] {
            state.accumulate("k1", &window, &event("k1", ts)).unwrap();
        }

        let acc = state.get("k1", window.window_id()).unwrap();
        assert_eq!(acc.accumulator(), &Value::from(3u64));
        assert_eq!(acc.event_count(), 3);
        assert_eq!(acc.max_event_time(), 9500);
        assert!(acc.is_dirty());
        assert_eq!(state.window_count(), 1);
    }

    #[test]
    pub fn get_missing_window_test() {
        let state = MemoryWindowState::new(Arc::new(Count::new()), 0);
        match state.get("k1", "k1:tumbling:0") {
            Err(Error::NotFound { window_id, .. }) => assert_eq!(window_id, "k1:tumbling:0"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    pub fn evict_test() {
        let mut state = MemoryWindowState::new(Arc::new(Count::new()), 0);
        let window = Window::new("k1", WindowType::Tumbling, 0, 10000);
        state.accumulate("k1", &window, &event("k1", 10)).unwrap();

        let acc = state.evict("k1", window.window_id()).unwrap();
        assert_eq!(acc.event_count(), 1);
        assert_eq!(state.window_count(), 0);

        match state.evict("k1", window.window_id()) {
            Err(Error::InternalInvariantViolation(_)) => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    pub fn accumulate_wrong_partition_test() {
        let mut state = MemoryWindowState::new(Arc::new(Count::new()), 0);
        let window = Window::new("k1", WindowType::Tumbling, 0, 10000);
        assert!(state.accumulate("k2", &window, &event("k2", 10)).is_err());
    }

    #[test]
    pub fn list_expirable_order_test() {
        let mut state = MemoryWindowState::new(Arc::new(Count::new()), 1000);
        let w2 = Window::new("k1", WindowType::Tumbling, 10000, 20000);
        let w1 = Window::new("k1", WindowType::Tumbling, 0, 10000);
        let w3 = Window::new("k2", WindowType::Tumbling, 0, 10000);
        state.accumulate("k1", &w2, &event("k1", 15000)).unwrap();
        state.accumulate("k1", &w1, &event("k1", 5000)).unwrap();
        state.accumulate("k2", &w3, &event("k2", 5000)).unwrap();

        // end + lateness must be <= watermark
        let expirable = state.list_expirable(&snapshot(&[("k1", 10999), ("k2", 11000)]));
        assert_eq!(
            expirable,
            vec![("k2".to_string(), w3.window_id().to_string())]
        );

        let expirable = state.list_expirable(&snapshot(&[("k1", 21000)]));
        assert_eq!(
            expirable,
            vec![
                ("k1".to_string(), w1.window_id().to_string()),
                ("k1".to_string(), w2.window_id().to_string()),
            ]
        );
    }

    #[test]
    pub fn list_fireable_test() {
        let mut state = MemoryWindowState::new(Arc::new(Count::new()), 5000);
        let window = Window::new("k1", WindowType::Tumbling, 0, 10000);
        state.accumulate("k1", &window, &event("k1", 100)).unwrap();

        assert!(state.list_fireable(&snapshot(&[("k1", 9999)])).is_empty());
        assert_eq!(state.list_fireable(&snapshot(&[("k1", 10000)])).len(), 1);

        let emitted = state.mark_emitted("k1", window.window_id()).unwrap();
        assert_eq!(emitted.revision(), 1);
        assert!(state.list_fireable(&snapshot(&[("k1", 12000)])).is_empty());

        state.accumulate("k1", &window, &event("k1", 200)).unwrap();
        assert_eq!(state.list_fireable(&snapshot(&[("k1", 12000)])).len(), 1);
        // past the lateness horizon the window is expirable instead
        assert!(state.list_fireable(&snapshot(&[("k1", 15000)])).is_empty());
    }

    #[test]
    pub fn session_merge_test() {
        let mut state = MemoryWindowState::new(Arc::new(Collect::new()), 0);

        state.accumulate("k1", &session("k1", 1000), &event("k1", 1000)).unwrap();
        state.accumulate("k1", &session("k1", 20000), &event("k1", 20000)).unwrap();
        assert_eq!(state.partition_window_count("k1"), 2);

        // bridges neither: [9000, 14000) stays apart from [1000, 6000) and [20000, 25000)
        state.accumulate("k1", &session("k1", 9000), &event("k1", 9000)).unwrap();
        assert_eq!(state.partition_window_count("k1"), 3);

        // [4000, 9000) touches [1000, 6000) and [9000, 14000)
        let merged = state
            .accumulate("k1", &session("k1", 4000), &event("k1", 4000))
            .unwrap();
        assert_eq!(merged.start(), 1000);
        assert_eq!(merged.end(), 14000);
        assert_eq!(merged.window_id(), "k1:session:1000");
        assert_eq!(state.partition_window_count("k1"), 2);

        let acc = state.get("k1", merged.window_id()).unwrap();
        assert_eq!(acc.event_count(), 3);
        assert_eq!(acc.max_event_time(), 9000);
    }

    #[test]
    pub fn session_inside_existing_test() {
        let mut state = MemoryWindowState::new(Arc::new(Count::new()), 0);
        state.accumulate("k1", &session("k1", 1000), &event("k1", 1000)).unwrap();
        state.accumulate("k1", &session("k1", 3000), &event("k1", 3000)).unwrap();
        let window = state
            .accumulate("k1", &session("k1", 2000), &event("k1", 2000))
            .unwrap();

        assert_eq!(window.start(), 1000);
        assert_eq!(window.end(), 8000);
        assert_eq!(state.partition_window_count("k1"), 1);
        assert_eq!(
            state.get("k1", window.window_id()).unwrap().accumulator(),
            &Value::from(3u64)
        );
    }

    #[test]
    pub fn session_partitions_isolated_test() {
        let mut state = MemoryWindowState::new(Arc::new(Count::new()), 0);
        state.accumulate("k1", &session("k1", 1000), &event("k1", 1000)).unwrap();
        state.accumulate("k2", &session("k2", 2000), &event("k2", 2000)).unwrap();

        assert_eq!(state.partition_window_count("k1"), 1);
        assert_eq!(state.partition_window_count("k2"), 1);
    }

    #[test]
    pub fn drain_test() {
        let mut state = MemoryWindowState::new(Arc::new(Count::new()), 0);
        state
            .accumulate("k2", &Window::new("k2", WindowType::Tumbling, 0, 10), &event("k2", 1))
            .unwrap();
        state
            .accumulate("k1", &Window::new("k1", WindowType::Tumbling, 10, 20), &event("k1", 11))
            .unwrap();
        state
            .accumulate("k1", &Window::new("k1", WindowType::Tumbling, 0, 10), &event("k1", 1))
            .unwrap();

        let drained: Vec<String> = state
            .drain()
            .iter()
            .map(|s| s.window().window_id().to_string())
            .collect();
        assert_eq!(
            drained,
            vec!["k1:tumbling:0", "k1:tumbling:10", "k2:tumbling:0"]
        );
        assert_eq!(state.window_count(), 0);
    }
}
