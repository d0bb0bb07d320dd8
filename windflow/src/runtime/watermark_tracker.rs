use std::collections::HashMap;
use std::sync::Arc;

use crate::core::watermark::{WatermarkGenerator, WatermarkStrategy, MIN_WATERMARK};
use crate::storage::keyed_state::WatermarkSnapshot;

#[derive(Debug)]
struct SourceWatermark {
    generator: Box<dyn WatermarkGenerator>,
    idle: bool,
}

impl SourceWatermark {
    fn watermark(&self) -> u64 {
        self.generator.current_watermark().timestamp()
    }
}

#[derive(Debug, Default)]
struct PartitionWatermark {
    sources: HashMap<String, SourceWatermark>,
    /// the value handed out, never decreases
    published: u64,
}

impl PartitionWatermark {
    /// min over active sources, or the max of all sources once every one of them is idle
    fn combined(&self) -> u64 {
        let active = self
            .sources
            .values()
            .filter(|s| !s.idle)
            .map(|s| s.watermark())
            .min();
        match active {
            Some(watermark) => watermark,
            None => self
                .sources
                .values()
                .map(|s| s.watermark())
                .max()
                .unwrap_or(MIN_WATERMARK.timestamp()),
        }
    }

    /// Publish the combined watermark if it moves forward, returns whether it did.
    fn publish(&mut self) -> bool {
        let combined = self.combined();
        if combined > self.published {
            self.published = combined;
            true
        } else {
            false
        }
    }
}

/// Event time progress per `(partition_key, source)`, combined per partition.
#[derive(Debug)]
pub struct WatermarkTracker {
    strategy: Arc<dyn WatermarkStrategy>,
    partitions: HashMap<String, PartitionWatermark>,
}

impl WatermarkTracker {
    pub fn new(strategy: Arc<dyn WatermarkStrategy>) -> Self {
        WatermarkTracker {
            strategy,
            partitions: HashMap::new(),
        }
    }

    /// Feed an event time of `source` into `partition_key`, returns the partition's watermark.
    pub fn observe(
        &mut self,
        partition_key: &str,
        source: &str,
        event_time: u64,
        processing_time: u64,
    ) -> u64 {
        let strategy = self.strategy.clone();
        let partition = self
            .partitions
            .entry(partition_key.to_string())
            .or_insert_with(PartitionWatermark::default);

        let source_watermark = partition
            .sources
            .entry(source.to_string())
            .or_insert_with(|| {
                debug!(
                    "register watermark source {} of partition {}",
                    source, partition_key
                );
                SourceWatermark {
                    generator: strategy.create_watermark_generator(),
                    idle: false,
                }
            });
        source_watermark
            .generator
            .on_event(event_time, processing_time);
        if source_watermark.idle {
            debug!(
                "watermark source {} of partition {} is active again",
                source, partition_key
            );
            source_watermark.idle = false;
        }

        partition.publish();
        partition.published
    }

    /// `MIN_WATERMARK` for a partition that has not been seen yet.
    pub fn current_watermark(&self, partition_key: &str) -> u64 {
        self.partitions
            .get(partition_key)
            .map(|p| p.published)
            .unwrap_or(MIN_WATERMARK.timestamp())
    }

    /// Let every generator re-evaluate at `processing_time` (idle detection included).
    /// Returns the partitions whose watermark advanced, sorted.
    pub fn tick(&mut self, processing_time: u64) -> Vec<String> {
        let mut advanced = Vec::new();
        for (partition_key, partition) in self.partitions.iter_mut() {
            for (source, source_watermark) in partition.sources.iter_mut() {
                match source_watermark.generator.on_periodic_emit(processing_time) {
                    Some(watermark) if watermark.is_idle() => {
                        if !source_watermark.idle {
                            debug!(
                                "watermark source {} of partition {} is idle",
                                source, partition_key
                            );
                            source_watermark.idle = true;
                        }
                    }
                    _ => {}
                }
            }

            if partition.publish() {
                advanced.push(partition_key.clone());
            }
        }
        advanced.sort();
        advanced
    }

    /// Raise every partition's watermark to at least `watermark`. Returns the partitions whose
    /// watermark advanced, sorted.
    pub fn advance_to(&mut self, watermark: u64) -> Vec<String> {
        let mut advanced = Vec::new();
        for (partition_key, partition) in self.partitions.iter_mut() {
            if watermark > partition.published {
                partition.published = watermark;
                advanced.push(partition_key.clone());
            }
        }
        advanced.sort();
        advanced
    }

    pub fn snapshot(&self) -> WatermarkSnapshot {
        self.partitions
            .iter()
            .map(|(k, p)| (k.clone(), p.published))
            .collect()
    }
}
