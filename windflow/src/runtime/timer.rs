use std::time::Duration;

use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_stream::wrappers::IntervalStream;
use tokio_util::sync::CancellationToken;

use crate::channel::sender::ChannelSender;
use crate::metrics::MetricRegistry;
use crate::runtime::worker::WorkerCommand;
use crate::utils::date_time::current_timestamp_millis;

/// Fire a `Tick` into every worker each `interval`, independent of event arrival, and push the
/// registry to the metrics facade. A worker whose channel is full skips that tick.
pub(crate) fn start_tick_timer(
    interval: Duration,
    workers: Vec<ChannelSender<WorkerCommand>>,
    registry: MetricRegistry,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "tick timer started, interval={}ms, workers={}",
            interval.as_millis(),
            workers.len()
        );

        // delay first
        let mut timer = interval_at(Instant::now() + interval, interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ticks = IntervalStream::new(timer);

        let mut full_errs = 0u64;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                tick = ticks.next() => {
                    if tick.is_none() {
                        break;
                    }
                }
            }

            let processing_time = current_timestamp_millis();
            for worker in &workers {
                let command = WorkerCommand::Tick {
                    processing_time,
                    force_watermark: None,
                    reply: None,
                };
                match worker.try_send(command) {
                    Ok(_) => {
                        if full_errs > 0 {
                            info!("worker channel {} has resumed to normal", worker.name());
                            full_errs = 0;
                        }
                    }
                    Err(_e) => {
                        if full_errs == 0 {
                            error!("worker channel {} is full, tick skipped", worker.name());
                        }
                        full_errs += 1;
                    }
                }
            }

            registry.compute();
        }

        info!("tick timer stopped");
    })
}
