use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use dashmap::DashMap;
use futures::{Stream, StreamExt};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::channel::named_channel;
use crate::channel::receiver::ChannelReceiver;
use crate::channel::sender::ChannelSender;
use crate::core::config::EngineConfig;
use crate::core::element::{DeadLetter, StreamEvent};
use crate::core::error::{Error, Result};
use crate::core::function::{AggregateFunction, Sink};
use crate::core::properties::Properties;
use crate::core::watermark::WatermarkStrategy;
use crate::functions::watermark::DefaultWatermarkStrategy;
use crate::metrics::{MetricRegistry, EVENTS_LATE_DROPPED, WINDOWS_OPEN};
use crate::runtime::late_data::Admission;
use crate::runtime::processor::PartitionProcessor;
use crate::runtime::status::{AtomicEngineStatus, EngineStatus};
use crate::runtime::timer::start_tick_timer;
use crate::runtime::worker::{spawn_worker, WorkerCommand, WorkerContext};
use crate::utils::date_time::current_timestamp_millis;
use crate::utils::hash::partition_slot;

/// An event-time windowing engine instance. Partition keys are spread over a fixed set of
/// workers by hash, each worker exclusively owns the window and watermark state of its keys.
///
/// `Created -> Running -> Draining -> Stopped`, a stopped engine can not be started again.
pub struct StreamEngine {
    config: EngineConfig,
    aggregate: Arc<dyn AggregateFunction>,
    sink: Arc<dyn Sink>,
    watermark_strategy: Arc<dyn WatermarkStrategy>,

    status: AtomicEngineStatus,
    registry: MetricRegistry,
    watermarks: Arc<DashMap<String, u64>>,

    workers: RwLock<Vec<ChannelSender<WorkerCommand>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,

    dead_letter_sender: Mutex<Option<ChannelSender<DeadLetter>>>,
    dead_letter_receiver: Mutex<Option<ChannelReceiver<DeadLetter>>>,

    cancel: CancellationToken,
    timer_cancel: CancellationToken,
}

impl StreamEngine {
    pub fn new(
        config: EngineConfig,
        aggregate: Arc<dyn AggregateFunction>,
        sink: Arc<dyn Sink>,
    ) -> Self {
        let registry = MetricRegistry::new();
        let (dead_letter_sender, dead_letter_receiver) = named_channel(
            "DeadLetter",
            vec![],
            config.channel_capacity(),
            &registry,
        );
        let cancel = CancellationToken::new();
        let timer_cancel = cancel.child_token();

        StreamEngine {
            watermark_strategy: Arc::new(DefaultWatermarkStrategy::from_config(&config)),
            config,
            aggregate,
            sink,
            status: AtomicEngineStatus::new(EngineStatus::Created),
            registry,
            watermarks: Arc::new(DashMap::new()),
            workers: RwLock::new(Vec::new()),
            tasks: Mutex::new(Vec::new()),
            dead_letter_sender: Mutex::new(Some(dead_letter_sender)),
            dead_letter_receiver: Mutex::new(Some(dead_letter_receiver)),
            cancel,
            timer_cancel,
        }
    }

    /// Fails with `ConfigValidation` on unknown keys or an invalid window combination.
    pub fn from_properties(
        properties: &Properties,
        aggregate: Arc<dyn AggregateFunction>,
        sink: Arc<dyn Sink>,
    ) -> Result<Self> {
        let config = EngineConfig::try_from(properties)?;
        Ok(StreamEngine::new(config, aggregate, sink))
    }

    /// Replace the per-source watermark generation, only before `start`.
    pub fn with_watermark_strategy(mut self, strategy: Arc<dyn WatermarkStrategy>) -> Self {
        self.watermark_strategy = strategy;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn status(&self) -> EngineStatus {
        self.status.load(Ordering::SeqCst)
    }

    /// Spawn the workers and the tick timer on the current tokio runtime.
    pub fn start(&self) -> Result<()> {
        let status = self.status();
        if status != EngineStatus::Created {
            return Err(illegal_state(EngineStatus::Created, status));
        }

        let processors = (0..self.config.workers())
            .map(|worker_id| {
                PartitionProcessor::new(
                    worker_id,
                    &self.config,
                    self.aggregate.clone(),
                    self.watermark_strategy.clone(),
                    &self.registry,
                )
            })
            .collect::<Result<Vec<PartitionProcessor>>>()?;

        let dead_letters = lock(&self.dead_letter_sender)
            .clone()
            .ok_or_else(|| Error::msg("dead-letter channel already released"))?;

        self.status
            .compare_exchange(
                EngineStatus::Created,
                EngineStatus::Running,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .map_err(|actual| illegal_state(EngineStatus::Created, actual))?;

        let context = WorkerContext {
            capacity: self.config.channel_capacity(),
            sink: self.sink.clone(),
            dead_letters,
            watermarks: self.watermarks.clone(),
            registry: self.registry.clone(),
            cancel: self.cancel.clone(),
        };

        let mut senders = Vec::with_capacity(processors.len());
        let mut tasks = Vec::new();
        for processor in processors {
            let handle = spawn_worker(processor, &context);
            debug!("worker {} spawned", handle.worker_id);
            senders.push(handle.sender);
            tasks.extend(handle.tasks);
        }

        tasks.push(start_tick_timer(
            self.config.tick_interval(),
            senders.clone(),
            self.registry.clone(),
            self.timer_cancel.clone(),
        ));

        *self.workers.write().unwrap_or_else(|e| e.into_inner()) = senders;
        *lock(&self.tasks) = tasks;

        info!(
            "engine started, window={}, workers={}, emit_mode={}",
            self.config.window().window_type(),
            self.config.workers(),
            self.config.emit_mode()
        );
        Ok(())
    }

    /// Route `event` to the worker owning its partition and wait for the verdict. A late event
    /// that is dropped or dead-lettered is not an error.
    pub async fn ingest(&self, event: StreamEvent, timeout: Duration) -> Result<Admission> {
        self.check_running()?;
        let worker = self.route(event.partition_key())?;
        let partition_key = event.partition_key().to_string();

        let request = async move {
            let (reply, rx) = oneshot::channel();
            worker
                .send(WorkerCommand::Ingest { event, reply })
                .await
                .map_err(|_e| worker_gone(worker.name()))?;
            rx.await.map_err(|_e| worker_gone(worker.name()))?
        };

        match tokio::time::timeout(timeout, request).await {
            Ok(result) => result,
            Err(_elapsed) => Err(Error::OperationCancelled(format!(
                "ingest into partition {} timed out after {}ms",
                partition_key,
                timeout.as_millis()
            ))),
        }
    }

    /// Run a tick on every worker now. Returns the number of results handed to the sink.
    pub async fn tick(&self, timeout: Duration) -> Result<usize> {
        self.broadcast_tick(None, timeout).await
    }

    /// Raise every known partition's watermark to at least `watermark`, then tick.
    pub async fn tick_with_watermark(&self, watermark: u64, timeout: Duration) -> Result<usize> {
        self.broadcast_tick(Some(watermark), timeout).await
    }

    async fn broadcast_tick(&self, force_watermark: Option<u64>, timeout: Duration) -> Result<usize> {
        self.check_running()?;
        let workers = self.workers();
        let processing_time = current_timestamp_millis();

        let request = async move {
            let mut replies = Vec::with_capacity(workers.len());
            for worker in &workers {
                let (reply, rx) = oneshot::channel();
                let command = WorkerCommand::Tick {
                    processing_time,
                    force_watermark,
                    reply: Some(reply),
                };
                worker
                    .send(command)
                    .await
                    .map_err(|_e| worker_gone(worker.name()))?;
                replies.push(rx);
            }

            let mut emitted = 0;
            for reply in futures::future::join_all(replies).await {
                emitted += reply.map_err(|_e| Error::OperationCancelled("tick aborted".to_string()))?;
            }
            Ok::<usize, Error>(emitted)
        };

        match tokio::time::timeout(timeout, request).await {
            Ok(result) => result,
            Err(_elapsed) => Err(Error::OperationCancelled(format!(
                "tick timed out after {}ms",
                timeout.as_millis()
            ))),
        }
    }

    /// Pull events from `source` until it ends or the engine leaves `Running`. Per-event failures
    /// are logged and counted by the workers, they never end the loop. Returns the number of
    /// events the workers accepted for processing.
    pub async fn run_source<S>(&self, source: S, timeout: Duration) -> Result<u64>
    where
        S: Stream<Item = StreamEvent>,
    {
        self.check_running()?;
        tokio::pin!(source);

        let mut ingested = 0u64;
        let mut failures = 0u64;
        loop {
            let event = tokio::select! {
                _ = self.cancel.cancelled() => break,
                event = source.next() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            match self.ingest(event, timeout).await {
                Ok(_admission) => ingested += 1,
                Err(Error::IllegalState { actual, .. }) => {
                    info!("stop pulling source, engine is {}", actual);
                    break;
                }
                Err(e) => {
                    failures += 1;
                    if failures & 1023 == 1 {
                        warn!("source event rejected: {}, rejected so far={}", e, failures);
                    }
                }
            }
        }

        info!(
            "source finished, ingested={}, rejected={}",
            ingested, failures
        );
        Ok(ingested)
    }

    /// Stop accepting events, drain every worker per the shutdown policy, wait for the sink to
    /// receive what was flushed, then release everything.
    pub async fn stop(&self, timeout: Duration) -> Result<()> {
        if let Err(actual) = self.status.compare_exchange(
            EngineStatus::Running,
            EngineStatus::Draining,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            if actual == EngineStatus::Created
                && self
                    .status
                    .compare_exchange(
                        EngineStatus::Created,
                        EngineStatus::Stopped,
                        Ordering::SeqCst,
                        Ordering::SeqCst,
                    )
                    .is_ok()
            {
                lock(&self.dead_letter_sender).take();
                info!("engine stopped before it was started");
                return Ok(());
            }
            return Err(illegal_state(EngineStatus::Running, actual));
        }

        let policy = self.config.shutdown_policy();
        info!("engine draining, shutdown policy={}", policy);

        self.timer_cancel.cancel();
        let workers = std::mem::take(&mut *self.workers.write().unwrap_or_else(|e| e.into_inner()));
        let tasks = std::mem::take(&mut *lock(&self.tasks));
        let dead_letters = lock(&self.dead_letter_sender).take();

        let drain = async move {
            let mut replies = Vec::with_capacity(workers.len());
            for worker in &workers {
                let (reply, rx) = oneshot::channel();
                match worker.send(WorkerCommand::Drain { policy, reply }).await {
                    Ok(_) => replies.push(rx),
                    Err(_e) => error!("{}", worker_gone(worker.name())),
                }
            }

            let mut flushed = 0;
            for reply in futures::future::join_all(replies).await {
                flushed += reply.unwrap_or(0);
            }

            // closing the command channels ends the workers, which ends the emitters
            drop(workers);
            drop(dead_letters);
            for joined in futures::future::join_all(tasks).await {
                if let Err(e) = joined {
                    error!("engine task failed: {}", e);
                }
            }
            flushed
        };

        let result = tokio::time::timeout(timeout, drain).await;

        self.cancel.cancel();
        self.status.store(EngineStatus::Stopped, Ordering::SeqCst);
        self.registry.compute();

        match result {
            Ok(flushed) => {
                info!("engine stopped, {} results flushed", flushed);
                Ok(())
            }
            Err(_elapsed) => {
                error!("engine stop timed out, remaining tasks cancelled");
                Err(Error::OperationCancelled(format!(
                    "stop timed out after {}ms",
                    timeout.as_millis()
                )))
            }
        }
    }

    /// The side channel of late-but-allowed events and failed emissions. Can be taken once.
    pub fn dead_letters(&self) -> Option<ChannelReceiver<DeadLetter>> {
        lock(&self.dead_letter_receiver).take()
    }

    /// `None` for a partition no event has been seen for.
    pub fn current_watermark(&self, partition_key: &str) -> Option<u64> {
        self.watermarks.get(partition_key).map(|watermark| *watermark)
    }

    pub fn watermarks(&self) -> HashMap<String, u64> {
        self.watermarks
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    pub fn open_windows(&self) -> usize {
        self.registry.gauge_value(WINDOWS_OPEN).max(0) as usize
    }

    pub fn late_dropped(&self) -> u64 {
        self.registry.counter_value(EVENTS_LATE_DROPPED)
    }

    pub fn metrics(&self) -> &MetricRegistry {
        &self.registry
    }

    fn check_running(&self) -> Result<()> {
        let status = self.status();
        if status == EngineStatus::Running {
            Ok(())
        } else {
            Err(illegal_state(EngineStatus::Running, status))
        }
    }

    fn workers(&self) -> Vec<ChannelSender<WorkerCommand>> {
        self.workers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn route(&self, partition_key: &str) -> Result<ChannelSender<WorkerCommand>> {
        let workers = self.workers.read().unwrap_or_else(|e| e.into_inner());
        if workers.is_empty() {
            return Err(illegal_state(EngineStatus::Running, self.status()));
        }
        Ok(workers[partition_slot(partition_key, workers.len())].clone())
    }
}

impl Drop for StreamEngine {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn illegal_state(expected: EngineStatus, actual: EngineStatus) -> Error {
    Error::IllegalState {
        expected: expected.to_string(),
        actual: actual.to_string(),
    }
}

fn worker_gone(name: &str) -> Error {
    Error::OperationCancelled(format!("worker channel {} is closed", name))
}
