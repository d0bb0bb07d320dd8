use std::collections::HashMap;
use std::sync::Arc;

use crate::core::config::{EmitMode, EngineConfig};
use crate::core::element::{DeadLetter, ProcessingResult, StreamEvent};
use crate::core::error::{Error, Result};
use crate::core::function::AggregateFunction;
use crate::core::watermark::{WatermarkStrategy, MAX_WATERMARK};
use crate::core::window::{Window, WindowAssigner};
use crate::functions::window::create_window_assigner;
use crate::metrics::{
    Counter, Gauge, MetricRegistry, Tag, EVENTS_ACCEPTED, EVENTS_DEAD_LETTER, EVENTS_LATE_DROPPED,
    EVENTS_MALFORMED, WINDOWS_DISCARDED, WINDOWS_EMITTED, WINDOWS_OPEN,
};
use crate::runtime::late_data::{Admission, LateDataPolicy};
use crate::runtime::watermark_tracker::WatermarkTracker;
use crate::storage::keyed_state::{MemoryWindowState, WindowAccumulator, WindowState};

/// What became of one ingested event.
#[derive(Clone, Debug)]
pub struct Ingested {
    pub admission: Admission,
    /// windows the event was folded into, after session merging
    pub windows: Vec<Window>,
    pub dead_letter: Option<DeadLetter>,
    pub watermark: u64,
}

struct ProcessorMetrics {
    accepted: Counter,
    malformed: Counter,
    late_dropped: Counter,
    dead_letter: Counter,
    open_windows: Gauge,
    emitted: Counter,
    discarded: Counter,
}

impl ProcessorMetrics {
    fn new(registry: &MetricRegistry, tags: Vec<Tag>) -> Self {
        ProcessorMetrics {
            accepted: registry.register_counter(EVENTS_ACCEPTED, tags.clone()),
            malformed: registry.register_counter(EVENTS_MALFORMED, tags.clone()),
            late_dropped: registry.register_counter(EVENTS_LATE_DROPPED, tags.clone()),
            dead_letter: registry.register_counter(EVENTS_DEAD_LETTER, tags.clone()),
            open_windows: registry.register_gauge(WINDOWS_OPEN, tags.clone()),
            emitted: registry.register_counter(WINDOWS_EMITTED, tags.clone()),
            discarded: registry.register_counter(WINDOWS_DISCARDED, tags),
        }
    }
}

/// All window and watermark state of the partitions owned by one worker. Only the owning
/// worker task touches it, so every call here is exclusive for the partitions involved.
pub struct PartitionProcessor {
    worker_id: usize,
    emit_mode: EmitMode,
    assigner: Box<dyn WindowAssigner>,
    aggregate: Arc<dyn AggregateFunction>,
    policy: LateDataPolicy,
    tracker: WatermarkTracker,
    state: Box<dyn WindowState>,
    /// partition_key -> reason
    failed: HashMap<String, String>,
    metrics: ProcessorMetrics,
}

impl PartitionProcessor {
    pub fn new(
        worker_id: usize,
        config: &EngineConfig,
        aggregate: Arc<dyn AggregateFunction>,
        watermark_strategy: Arc<dyn WatermarkStrategy>,
        registry: &MetricRegistry,
    ) -> Result<Self> {
        let assigner = create_window_assigner(config.window())?;
        let policy = LateDataPolicy::from_config(config);
        let state = MemoryWindowState::new(aggregate.clone(), policy.allowed_lateness());

        let tags = vec![Tag::from(("worker_id", worker_id))];
        Ok(PartitionProcessor {
            worker_id,
            emit_mode: config.emit_mode(),
            assigner,
            aggregate,
            policy,
            tracker: WatermarkTracker::new(watermark_strategy),
            state: Box::new(state),
            failed: HashMap::new(),
            metrics: ProcessorMetrics::new(registry, tags),
        })
    }

    #[cfg(test)]
    pub(crate) fn with_state(mut self, state: Box<dyn WindowState>) -> Self {
        self.state = state;
        self
    }

    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    pub fn ingest(&mut self, event: StreamEvent) -> Result<Ingested> {
        if let Err(e) = event.validate() {
            self.metrics.malformed.fetch_add(1);
            return Err(e);
        }

        let partition_key = event.partition_key().to_string();
        if let Some(reason) = self.failed.get(&partition_key) {
            return Err(Error::InternalInvariantViolation(format!(
                "partition {} is failed: {}",
                partition_key, reason
            )));
        }

        let watermark = self.tracker.current_watermark(&partition_key);
        let assigned = self
            .assigner
            .assign_windows(&partition_key, event.event_time());

        let verdicts: Vec<(Window, Admission)> = assigned
            .into_iter()
            .map(|window| {
                let admission = self.policy.admit(&window, watermark);
                (window, admission)
            })
            .collect();

        let mut windows = Vec::new();
        for (window, admission) in &verdicts {
            if *admission != Admission::Admit {
                continue;
            }
            match self.state.accumulate(&partition_key, window, &event) {
                Ok(window) => windows.push(window),
                Err(e) => return Err(self.fail_partition(&partition_key, e)),
            }
        }
        self.metrics
            .open_windows
            .store(self.state.window_count() as i64);

        let admission = LateDataPolicy::resolve(verdicts.iter().map(|(_, a)| *a));
        let mut dead_letter = None;
        match admission {
            Admission::Admit => {
                self.metrics.accepted.fetch_add(1);
            }
            Admission::LateButAllowed => {
                self.metrics.dead_letter.fetch_add(1);
                let window = verdicts
                    .iter()
                    .find(|(_, a)| *a == Admission::LateButAllowed)
                    .map(|(w, _)| w.clone());
                if let Some(window) = window {
                    dead_letter = Some(DeadLetter::LateEvent {
                        event: event.clone(),
                        window,
                    });
                }
            }
            Admission::Dropped => {
                let n = self.metrics.late_dropped.fetch_add(1);
                if n & 1023 == 0 {
                    warn!(
                        "{}, watermark={}, dropped so far={}",
                        Error::LateEventDropped {
                            partition_key: partition_key.clone(),
                            event_time: event.event_time(),
                        },
                        watermark,
                        n + 1
                    );
                }
            }
        }

        let watermark = self.tracker.observe(
            &partition_key,
            event.source(),
            event.event_time(),
            event.processing_time(),
        );

        Ok(Ingested {
            admission,
            windows,
            dead_letter,
            watermark,
        })
    }

    /// Advance watermarks (idle detection at `processing_time`, optionally forced up to
    /// `force_watermark`) and collect the results that became due, in ascending window end
    /// order per partition.
    pub fn tick(
        &mut self,
        processing_time: u64,
        force_watermark: Option<u64>,
    ) -> Vec<ProcessingResult> {
        let advanced = self.tracker.tick(processing_time);
        if !advanced.is_empty() {
            debug!("worker {} watermark advanced: {:?}", self.worker_id, advanced);
        }
        if let Some(watermark) = force_watermark {
            self.tracker.advance_to(watermark);
        }

        let mut snapshot = self.tracker.snapshot();
        snapshot.retain(|partition_key, _| !self.failed.contains_key(partition_key));

        let mut results = Vec::new();

        // expirable windows end before any fireable one of the same partition
        for (partition_key, window_id) in self.state.list_expirable(&snapshot) {
            if self.failed.contains_key(&partition_key) {
                continue;
            }
            match self.state.evict(&partition_key, &window_id) {
                Ok(acc) => {
                    if let Some(result) = self.final_result(acc) {
                        results.push(result);
                    }
                }
                Err(e) => {
                    self.fail_partition(&partition_key, e);
                }
            }
        }

        if self.emit_mode == EmitMode::Update {
            for (partition_key, window_id) in self.state.list_fireable(&snapshot) {
                if self.failed.contains_key(&partition_key) {
                    continue;
                }
                match self.state.mark_emitted(&partition_key, &window_id) {
                    Ok(acc) => {
                        let revision = acc.revision().saturating_sub(1);
                        results.push(self.to_result(&acc, revision));
                    }
                    Err(e) => {
                        self.fail_partition(&partition_key, e);
                    }
                }
            }
        }

        self.metrics
            .open_windows
            .store(self.state.window_count() as i64);
        self.metrics.emitted.fetch_add(results.len() as u64);
        results
    }

    /// Force every partition to `MAX_WATERMARK` and return all outstanding results. Windows of
    /// failed partitions are discarded.
    pub fn flush(&mut self, processing_time: u64) -> Vec<ProcessingResult> {
        let mut results = self.tick(processing_time, Some(MAX_WATERMARK.timestamp()));

        // lateness may reach past MAX_WATERMARK
        let mut leftovers = Vec::new();
        let mut discarded = 0;
        for acc in self.state.drain() {
            if self.failed.contains_key(acc.window().partition_key()) {
                discarded += 1;
            } else if let Some(result) = self.final_result(acc) {
                leftovers.push(result);
            }
        }
        self.metrics.emitted.fetch_add(leftovers.len() as u64);
        self.metrics.discarded.fetch_add(discarded);
        self.metrics.open_windows.store(0);

        results.extend(leftovers);
        results
    }

    /// Discard all open windows without emitting them, returns how many there were.
    pub fn discard(&mut self) -> usize {
        let n = self.state.drain().len();
        self.metrics.discarded.fetch_add(n as u64);
        self.metrics.open_windows.store(0);
        n
    }

    pub fn current_watermark(&self, partition_key: &str) -> u64 {
        self.tracker.current_watermark(partition_key)
    }

    pub fn watermarks(&self) -> HashMap<String, u64> {
        self.tracker.snapshot()
    }

    pub fn open_windows(&self) -> usize {
        self.state.window_count()
    }

    pub fn is_failed(&self, partition_key: &str) -> bool {
        self.failed.contains_key(partition_key)
    }

    fn fail_partition(&mut self, partition_key: &str, e: Error) -> Error {
        match e {
            Error::InternalInvariantViolation(reason) => {
                error!(
                    "worker {} stops processing partition {}: {}",
                    self.worker_id, partition_key, reason
                );
                self.failed
                    .insert(partition_key.to_string(), reason.clone());
                Error::InternalInvariantViolation(reason)
            }
            e => e,
        }
    }

    /// The last result of an evicted window, `None` when everything in it was already reported.
    fn final_result(&self, acc: WindowAccumulator) -> Option<ProcessingResult> {
        if acc.revision() > 0 && !acc.is_dirty() {
            debug!("window {} evicted without changes", acc.window());
            return None;
        }
        Some(self.to_result(&acc, acc.revision()))
    }

    fn to_result(&self, acc: &WindowAccumulator, revision: u32) -> ProcessingResult {
        debug!(
            "emit window {}, events={}, revision={}",
            acc.window(),
            acc.event_count(),
            revision
        );
        ProcessingResult::new(
            acc.window(),
            self.aggregate.get_result(acc.accumulator()),
            acc.event_count(),
            acc.max_event_time(),
            revision,
        )
    }
}

impl std::fmt::Debug for PartitionProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionProcessor")
            .field("worker_id", &self.worker_id)
            .field("emit_mode", &self.emit_mode)
            .field("open_windows", &self.state.window_count())
            .field("failed", &self.failed)
            .finish()
    }
}
