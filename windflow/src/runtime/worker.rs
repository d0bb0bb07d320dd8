use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::channel::receiver::ChannelReceiver;
use crate::channel::sender::ChannelSender;
use crate::channel::{named_channel, TrySendError};
use crate::core::config::ShutdownPolicy;
use crate::core::element::{DeadLetter, ProcessingResult, StreamEvent};
use crate::core::error::{Error, Result};
use crate::core::function::Sink;
use crate::metrics::{Counter, MetricRegistry, Tag, DEAD_LETTER_OVERFLOW, SINK_FAILURES};
use crate::runtime::late_data::Admission;
use crate::runtime::processor::PartitionProcessor;
use crate::utils::date_time::current_timestamp_millis;

pub(crate) enum WorkerCommand {
    Ingest {
        event: StreamEvent,
        reply: oneshot::Sender<Result<Admission>>,
    },
    Tick {
        processing_time: u64,
        force_watermark: Option<u64>,
        /// `None` for timer ticks nobody waits for
        reply: Option<oneshot::Sender<usize>>,
    },
    Drain {
        policy: ShutdownPolicy,
        reply: oneshot::Sender<usize>,
    },
}

/// The channel into a running worker plus the tasks to join on shutdown.
pub(crate) struct WorkerHandle {
    pub(crate) worker_id: usize,
    pub(crate) sender: ChannelSender<WorkerCommand>,
    pub(crate) tasks: Vec<JoinHandle<()>>,
}

struct Worker {
    worker_id: usize,
    processor: PartitionProcessor,
    receiver: ChannelReceiver<WorkerCommand>,
    results: ChannelSender<ProcessingResult>,
    /// results the emitter has no room for yet, in emission order
    pending: VecDeque<ProcessingResult>,
    dead_letters: ChannelSender<DeadLetter>,
    dead_letter_overflow: Counter,
    watermarks: Arc<DashMap<String, u64>>,
    draining: bool,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(mut self) {
        info!("worker {} started", self.worker_id);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("worker {} cancelled", self.worker_id);
                    break;
                }
                permit = self.results.clone().reserve_owned(), if !self.pending.is_empty() => match permit {
                    Ok(permit) => {
                        if let Some(result) = self.pending.pop_front() {
                            permit.send(result);
                        }
                        self.hand_over();
                    }
                    Err(_e) => self.emitter_gone(),
                },
                command = self.receiver.recv() => match command {
                    Some(command) => self.handle(command),
                    None => {
                        info!("worker {} command channel closed", self.worker_id);
                        self.deliver_pending().await;
                        break;
                    }
                }
            }
        }
        self.receiver.close();
        info!(
            "worker {} stopped, open windows={}",
            self.worker_id,
            self.processor.open_windows()
        );
    }

    fn handle(&mut self, command: WorkerCommand) {
        match command {
            WorkerCommand::Ingest { event, reply } => {
                let result = self.ingest(event);
                // the caller may have given up waiting
                let _ = reply.send(result);
            }
            WorkerCommand::Tick {
                processing_time,
                force_watermark,
                reply,
            } => {
                let results = self.processor.tick(processing_time, force_watermark);
                let n = self.emit(results);
                self.publish_watermarks();
                if let Some(reply) = reply {
                    let _ = reply.send(n);
                }
            }
            WorkerCommand::Drain { policy, reply } => {
                self.draining = true;
                let n = match policy {
                    ShutdownPolicy::Flush => {
                        let results = self.processor.flush(current_timestamp_millis());
                        self.emit(results)
                    }
                    ShutdownPolicy::Drop => {
                        let n = self.processor.discard();
                        info!("worker {} dropped {} open windows", self.worker_id, n);
                        0
                    }
                };
                self.publish_watermarks();
                let _ = reply.send(n);
            }
        }
    }

    fn ingest(&mut self, event: StreamEvent) -> Result<Admission> {
        if self.draining {
            return Err(Error::IllegalState {
                expected: "Running".to_string(),
                actual: "Draining".to_string(),
            });
        }

        let partition_key = event.partition_key().to_string();
        let ingested = self.processor.ingest(event)?;
        self.watermarks.insert(partition_key, ingested.watermark);

        if let Some(dead_letter) = ingested.dead_letter {
            if self.dead_letters.try_send_opt(dead_letter).is_some() {
                let n = self.dead_letter_overflow.fetch_add(1);
                if n & 1023 == 0 {
                    warn!(
                        "worker {} dead-letter channel {} is full or closed, {} lost so far",
                        self.worker_id,
                        self.dead_letters.name(),
                        n + 1
                    );
                }
            }
        }
        Ok(ingested.admission)
    }

    /// Queue results for the emitter in order, returns how many were queued. Never waits for
    /// the sink, a stalled sink only grows the queue.
    fn emit(&mut self, results: Vec<ProcessingResult>) -> usize {
        let n = results.len();
        self.pending.extend(results);
        self.hand_over();
        n
    }

    fn hand_over(&mut self) {
        while let Some(result) = self.pending.pop_front() {
            match self.results.try_send(result) {
                Ok(_) => {}
                Err(TrySendError::Full(result)) => {
                    self.pending.push_front(result);
                    break;
                }
                Err(TrySendError::Closed(result)) => {
                    self.pending.push_front(result);
                    self.emitter_gone();
                    break;
                }
            }
        }
    }

    /// Waits for the emitter to take everything queued, until the worker is cancelled.
    async fn deliver_pending(&mut self) {
        while let Some(result) = self.pending.pop_front() {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    warn!(
                        "worker {} cancelled with {} undelivered results",
                        self.worker_id,
                        self.pending.len() + 1
                    );
                    self.pending.clear();
                    return;
                }
                sent = self.results.send(result) => {
                    if sent.is_err() {
                        self.emitter_gone();
                        return;
                    }
                }
            }
        }
    }

    fn emitter_gone(&mut self) {
        error!(
            "worker {} emitter is gone, {} results lost",
            self.worker_id,
            self.pending.len()
        );
        self.pending.clear();
    }

    fn publish_watermarks(&self) {
        for (partition_key, watermark) in self.processor.watermarks() {
            self.watermarks.insert(partition_key, watermark);
        }
    }
}

/// Calls the sink outside of any partition state. Failed results are counted, logged and
/// forwarded as dead letters.
struct Emitter {
    worker_id: usize,
    sink: Arc<dyn Sink>,
    receiver: ChannelReceiver<ProcessingResult>,
    dead_letters: ChannelSender<DeadLetter>,
    failures: Counter,
}

impl Emitter {
    async fn run(mut self) {
        while let Some(result) = self.receiver.recv().await {
            if let Err(e) = self.sink.emit(&result).await {
                self.failures.fetch_add(1);
                let e = Error::SinkEmission(e.to_string());
                error!(
                    "worker {} sink {} failed on window {}: {}",
                    self.worker_id,
                    self.sink.name(),
                    result.window_id,
                    e
                );
                let dead_letter = DeadLetter::FailedEmission {
                    result,
                    reason: e.to_string(),
                };
                if self.dead_letters.try_send_opt(dead_letter).is_some() {
                    error!(
                        "worker {} dead-letter channel is full or closed, failed result lost",
                        self.worker_id
                    );
                }
            }
        }
        debug!("worker {} emitter stopped", self.worker_id);
    }
}

pub(crate) struct WorkerContext {
    pub(crate) capacity: usize,
    pub(crate) sink: Arc<dyn Sink>,
    pub(crate) dead_letters: ChannelSender<DeadLetter>,
    pub(crate) watermarks: Arc<DashMap<String, u64>>,
    pub(crate) registry: MetricRegistry,
    pub(crate) cancel: CancellationToken,
}

/// Spawn the worker task and its emitter task on the current runtime.
pub(crate) fn spawn_worker(processor: PartitionProcessor, context: &WorkerContext) -> WorkerHandle {
    let worker_id = processor.worker_id();
    let tags = vec![Tag::from(("worker_id", worker_id))];

    let (sender, receiver) = named_channel(
        format!("Worker_{}", worker_id).as_str(),
        tags.clone(),
        context.capacity,
        &context.registry,
    );
    let (results, results_receiver) = named_channel(
        format!("Emitter_{}", worker_id).as_str(),
        tags.clone(),
        context.capacity,
        &context.registry,
    );

    let worker = Worker {
        worker_id,
        processor,
        receiver,
        results,
        pending: VecDeque::new(),
        dead_letters: context.dead_letters.clone(),
        dead_letter_overflow: context
            .registry
            .register_counter(DEAD_LETTER_OVERFLOW, tags.clone()),
        watermarks: context.watermarks.clone(),
        draining: false,
        cancel: context.cancel.clone(),
    };
    let emitter = Emitter {
        worker_id,
        sink: context.sink.clone(),
        receiver: results_receiver,
        dead_letters: context.dead_letters.clone(),
        failures: context.registry.register_counter(SINK_FAILURES, tags),
    };

    let tasks = vec![tokio::spawn(worker.run()), tokio::spawn(emitter.run())];
    WorkerHandle {
        worker_id,
        sender,
        tasks,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use dashmap::DashMap;
    use serde_json::json;
    use tokio::sync::{mpsc, oneshot};
    use tokio_util::sync::CancellationToken;

    use crate::channel::named_channel;
    use crate::channel::sender::ChannelSender;
    use crate::core::config::{EngineConfig, ShutdownPolicy};
    use crate::core::element::{DeadLetter, ProcessingResult, StreamEvent};
    use crate::core::function::{NamedFunction, Sink};
    use crate::core::window::WindowConfig;
    use crate::functions::aggregate::Count;
    use crate::functions::sink::channel_sink;
    use crate::functions::watermark::DefaultWatermarkStrategy;
    use crate::metrics::{MetricRegistry, SINK_FAILURES};
    use crate::runtime::late_data::Admission;
    use crate::runtime::processor::PartitionProcessor;
    use crate::runtime::worker::{spawn_worker, WorkerCommand, WorkerContext};

    struct FailingSink {}

    #[async_trait]
    impl Sink for FailingSink {
        async fn emit(&self, _result: &ProcessingResult) -> anyhow::Result<()> {
            Err(anyhow!("downstream unavailable"))
        }
    }

    impl NamedFunction for FailingSink {
        fn name(&self) -> &str {
            "FailingSink"
        }
    }

    /// Never returns for the `slow` partition.
    struct StallingSink {
        sender: mpsc::Sender<ProcessingResult>,
    }

    #[async_trait]
    impl Sink for StallingSink {
        async fn emit(&self, result: &ProcessingResult) -> anyhow::Result<()> {
            if result.partition_key == "slow" {
                futures::future::pending::<()>().await;
            }
            self.sender
                .send(result.clone())
                .await
                .map_err(|e| anyhow!("{}", e))
        }
    }

    impl NamedFunction for StallingSink {
        fn name(&self) -> &str {
            "StallingSink"
        }
    }

    async fn tick(sender: &ChannelSender<WorkerCommand>, watermark: u64) -> usize {
        let (reply, rx) = oneshot::channel();
        let tick = WorkerCommand::Tick {
            processing_time: 0,
            force_watermark: Some(watermark),
            reply: Some(reply),
        };
        assert!(sender.send(tick).await.is_ok());
        rx.await.unwrap()
    }

    fn processor(registry: &MetricRegistry) -> PartitionProcessor {
        let window = WindowConfig::tumbling(Duration::from_millis(10000)).unwrap();
        let config = EngineConfig::builder(window).workers(1).build().unwrap();
        let strategy = Arc::new(DefaultWatermarkStrategy::from_config(&config));
        PartitionProcessor::new(0, &config, Arc::new(Count::new()), strategy, registry).unwrap()
    }

    async fn ingest(sender: &ChannelSender<WorkerCommand>, key: &str, ts: u64) -> Admission {
        let (reply, rx) = oneshot::channel();
        let event = StreamEvent::new(key, "s1", ts, json!({}));
        assert!(sender.send(WorkerCommand::Ingest { event, reply }).await.is_ok());
        rx.await.unwrap().unwrap()
    }

    #[tokio::test]
    pub async fn worker_flush_test() {
        let registry = MetricRegistry::new();
        let (sink, mut results) = channel_sink(16);
        let (dead_letters, _dead_letter_receiver) =
            named_channel("DeadLetter", vec![], 16, &registry);
        let context = WorkerContext {
            capacity: 16,
            sink: Arc::new(sink),
            dead_letters,
            watermarks: Arc::new(DashMap::new()),
            registry: registry.clone(),
            cancel: CancellationToken::new(),
        };

        let handle = spawn_worker(processor(&registry), &context);
        assert_eq!(ingest(&handle.sender, "k1", 1000).await, Admission::Admit);
        assert_eq!(ingest(&handle.sender, "k1", 12000).await, Admission::Admit);
        assert_eq!(context.watermarks.get("k1").map(|w| *w), Some(12000));

        let (reply, rx) = oneshot::channel();
        let drain = WorkerCommand::Drain {
            policy: ShutdownPolicy::Flush,
            reply,
        };
        assert!(handle.sender.send(drain).await.is_ok());
        assert_eq!(rx.await.unwrap(), 2);

        let first = results.recv().await.unwrap();
        let second = results.recv().await.unwrap();
        assert_eq!(first.window_start, 0);
        assert_eq!(second.window_start, 10000);

        drop(handle.sender);
        for task in handle.tasks {
            task.await.unwrap();
        }
    }

    #[tokio::test]
    pub async fn sink_failure_test() {
        let registry = MetricRegistry::new();
        let (dead_letters, mut dead_letter_receiver) =
            named_channel("DeadLetter", vec![], 16, &registry);
        let context = WorkerContext {
            capacity: 16,
            sink: Arc::new(FailingSink {}),
            dead_letters,
            watermarks: Arc::new(DashMap::new()),
            registry: registry.clone(),
            cancel: CancellationToken::new(),
        };

        let handle = spawn_worker(processor(&registry), &context);
        ingest(&handle.sender, "k1", 1000).await;
        assert_eq!(tick(&handle.sender, 15000).await, 1);

        match dead_letter_receiver.recv().await {
            Some(DeadLetter::FailedEmission { result, reason }) => {
                assert_eq!(result.window_end, 10000);
                assert!(reason.contains("downstream unavailable"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(registry.counter_value(SINK_FAILURES), 1);

        context.cancel.cancel();
        drop(handle.sender);
        for task in handle.tasks {
            task.await.unwrap();
        }
    }

    #[tokio::test]
    pub async fn stalled_sink_test() {
        let registry = MetricRegistry::new();
        let (sender, mut delivered) = mpsc::channel(16);
        let (dead_letters, _dead_letter_receiver) =
            named_channel("DeadLetter", vec![], 16, &registry);
        let context = WorkerContext {
            capacity: 1,
            sink: Arc::new(StallingSink { sender }),
            dead_letters,
            watermarks: Arc::new(DashMap::new()),
            registry: registry.clone(),
            cancel: CancellationToken::new(),
        };
        let handle = spawn_worker(processor(&registry), &context);

        for ts in [1000, 11000, 21000, 31000, 41000] {
            ingest(&handle.sender, "slow", ts).await;
        }
        // more results than the sink and the emitter channel can take
        assert_eq!(tick(&handle.sender, 1_000_000).await, 5);

        // the worker keeps serving other partitions
        let wait = Duration::from_millis(500);
        let admission = tokio::time::timeout(wait, ingest(&handle.sender, "fast", 1000))
            .await
            .unwrap();
        assert_eq!(admission, Admission::Admit);
        let queued = tokio::time::timeout(wait, tick(&handle.sender, 1_000_000))
            .await
            .unwrap();
        assert_eq!(queued, 1);
        assert!(delivered.try_recv().is_err());

        context.cancel.cancel();
        drop(handle.sender);
        for task in handle.tasks {
            task.abort();
        }
    }
}
