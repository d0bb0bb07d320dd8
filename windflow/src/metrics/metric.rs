use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use ::metrics::{counter, gauge};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tag(String, String);

impl Tag {
    pub fn field(&self) -> &str {
        self.0.as_str()
    }

    pub fn context(&self) -> &str {
        self.1.as_str()
    }
}

impl<F, C> From<(F, C)> for Tag
where
    F: ToString,
    C: ToString,
{
    fn from((field, context): (F, C)) -> Self {
        Tag(field.to_string(), context.to_string())
    }
}

struct CounterMeta {
    name: String,
    tags: Vec<Tag>,
    old_value: AtomicU64,
    value: Arc<AtomicU64>,
}

struct GaugeMeta {
    name: String,
    tags: Vec<Tag>,
    value: Arc<AtomicI64>,
}

#[derive(Clone, Default, Debug)]
pub struct Counter {
    value: Arc<AtomicU64>,
}

impl Counter {
    fn new(value: Arc<AtomicU64>) -> Self {
        Counter { value }
    }

    pub fn fetch_add(&self, v: u64) -> u64 {
        self.value.fetch_add(v, Ordering::Relaxed)
    }

    pub fn load(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

#[derive(Clone, Default, Debug)]
pub struct Gauge {
    value: Arc<AtomicI64>,
}

impl Gauge {
    fn new(value: Arc<AtomicI64>) -> Self {
        Gauge { value }
    }

    pub fn store(&self, v: i64) {
        self.value.store(v, Ordering::Relaxed);
    }

    pub fn fetch_add(&self, v: i64) {
        self.value.fetch_add(v, Ordering::Relaxed);
    }

    pub fn fetch_sub(&self, v: i64) {
        self.value.fetch_sub(v, Ordering::Relaxed);
    }

    pub fn load(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}

#[derive(Default)]
struct Registry {
    counters: Vec<CounterMeta>,
    gauges: Vec<GaugeMeta>,
}

/// Metrics owned by one engine instance. Values live in atomics handed out to the hot path;
/// `compute` publishes them through the `metrics` facade.
#[derive(Clone, Default)]
pub struct MetricRegistry {
    registry: Arc<RwLock<Registry>>,
}

impl MetricRegistry {
    pub fn new() -> Self {
        MetricRegistry::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Registry> {
        self.registry.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Registry> {
        self.registry.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn register_counter<K>(&self, name: K, tags: Vec<Tag>) -> Counter
    where
        K: ToString,
    {
        let value = Arc::new(AtomicU64::new(0));
        let meta = CounterMeta {
            name: name.to_string(),
            tags,
            old_value: AtomicU64::new(0),
            value: value.clone(),
        };
        self.write().counters.push(meta);

        Counter::new(value)
    }

    pub fn register_gauge<K>(&self, name: K, tags: Vec<Tag>) -> Gauge
    where
        K: ToString,
    {
        let value = Arc::new(AtomicI64::new(0));
        let meta = GaugeMeta {
            name: name.to_string(),
            tags,
            value: value.clone(),
        };
        self.write().gauges.push(meta);

        Gauge::new(value)
    }

    /// Sum of every counter registered under `name`, across tags.
    pub fn counter_value(&self, name: &str) -> u64 {
        self.read()
            .counters
            .iter()
            .filter(|meta| meta.name == name)
            .map(|meta| meta.value.load(Ordering::Relaxed))
            .sum()
    }

    /// Sum of every gauge registered under `name`, across tags.
    pub fn gauge_value(&self, name: &str) -> i64 {
        self.read()
            .gauges
            .iter()
            .filter(|meta| meta.name == name)
            .map(|meta| meta.value.load(Ordering::Relaxed))
            .sum()
    }

    pub fn compute(&self) {
        self.compute_counter();
        self.compute_gauge();
    }

    fn compute_counter(&self) {
        let registry = self.read();
        for meta in &registry.counters {
            let name = meta.name.clone();

            let value: u64 = meta.value.load(Ordering::Relaxed);
            let old_value: u64 = meta.old_value.swap(value, Ordering::Relaxed);
            let incr = value.saturating_sub(old_value);

            let labels = to_labels(&meta.tags);
            counter!(name, incr, &labels);
        }
    }

    fn compute_gauge(&self) {
        let registry = self.read();
        for meta in &registry.gauges {
            let name = meta.name.clone();

            let labels = to_labels(&meta.tags);
            let val = meta.value.load(Ordering::Relaxed) as f64;
            gauge!(name, val, &labels);
        }
    }
}

fn to_labels(tags: &[Tag]) -> Vec<(String, String)> {
    tags.iter().map(|tag| (tag.0.clone(), tag.1.clone())).collect()
}

#[cfg(test)]
mod tests {
    use crate::metrics::metric::{MetricRegistry, Tag};

    #[test]
    pub fn counter_sum_test() {
        let registry = MetricRegistry::new();
        let c0 = registry.register_counter("Dropped", vec![Tag::from(("worker", 0))]);
        let c1 = registry.register_counter("Dropped", vec![Tag::from(("worker", 1))]);
        c0.fetch_add(2);
        c1.fetch_add(3);

        assert_eq!(registry.counter_value("Dropped"), 5);
        assert_eq!(registry.counter_value("Unknown"), 0);

        // no recorder installed, the facade calls are no-ops
        registry.compute();
        assert_eq!(registry.counter_value("Dropped"), 5);
    }

    #[test]
    pub fn gauge_test() {
        let registry = MetricRegistry::new();
        let g = registry.register_gauge("Open", vec![]);
        g.fetch_add(3);
        g.fetch_sub(1);
        assert_eq!(registry.gauge_value("Open"), 2);
        g.store(7);
        assert_eq!(g.load(), 7);
    }
}
