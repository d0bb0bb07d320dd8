use futures::Stream;
use rand::Rng;
use serde_json::json;

use windflow::core::element::StreamEvent;
use windflow::utils::date_time::current_timestamp_millis;

/// `n` events over `keys` sensors, one second of event time apart, with a few seconds of
/// disorder and the occasional straggler far behind.
pub fn rand_source(n: usize, keys: usize) -> impl Stream<Item = StreamEvent> {
    let mut rng = rand::thread_rng();
    let base = current_timestamp_millis();

    let events: Vec<StreamEvent> = (0..n)
        .map(|i| {
            let key = format!("sensor-{}", rng.gen_range(0..keys));
            let jitter = rng.gen_range(0..3000u64);
            let delay = if rng.gen_ratio(1, 100) { 70_000 } else { 0 };
            let event_time = (base + i as u64 * 1000).saturating_sub(jitter + delay);

            StreamEvent::new(
                key,
                "rand",
                event_time,
                json!({ "value": rng.gen_range(0..100) }),
            )
        })
        .collect();

    futures::stream::iter(events)
}
