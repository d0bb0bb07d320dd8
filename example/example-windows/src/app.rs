use std::sync::Arc;
use std::time::Duration;

use windflow::core::element::DeadLetter;
use windflow::core::properties::Properties;
use windflow::functions::aggregate::Sum;
use windflow::functions::sink::print_sink;
use windflow::runtime::StreamEngine;

use crate::rand_source::rand_source;

const DEFAULT_PROPERTIES: &str = r#"
window:
  type: sliding
  size: 60000
  slide: 20000
  allowed_lateness: 5000
watermark:
  out_of_orderness: 2000
  idle_source_timeout: 10000
late:
  dead_letter_window: 30000
engine:
  workers: 2
  tick_interval: 1000
"#;

const EVENTS: usize = 2000;

pub fn load_properties(path: Option<&str>) -> anyhow::Result<Properties> {
    let yaml = match path {
        Some(path) => std::fs::read_to_string(path)?,
        None => DEFAULT_PROPERTIES.to_string(),
    };
    let properties = Properties::from_yaml(yaml.as_str())?;
    Ok(properties)
}

pub async fn run(properties: Properties) -> anyhow::Result<()> {
    let engine = StreamEngine::from_properties(
        &properties,
        Arc::new(Sum::of_field("value")),
        Arc::new(print_sink()),
    )?;

    let dead_letter_task = engine.dead_letters().map(|mut dead_letters| {
        tokio::spawn(async move {
            while let Some(dead_letter) = dead_letters.recv().await {
                match dead_letter {
                    DeadLetter::LateEvent { event, window } => info!(
                        "late event of {} at {} missed {}",
                        event.partition_key(),
                        event.event_time(),
                        window
                    ),
                    DeadLetter::FailedEmission { result, reason } => {
                        error!("result of {} not delivered: {}", result.window_id, reason)
                    }
                }
            }
        })
    });

    engine.start()?;

    let ingested = engine
        .run_source(rand_source(EVENTS, 5), Duration::from_secs(5))
        .await?;
    info!("{} events ingested", ingested);

    let mut watermarks: Vec<(String, u64)> = engine.watermarks().into_iter().collect();
    watermarks.sort();
    for (partition_key, watermark) in watermarks {
        info!("partition {} watermark {}", partition_key, watermark);
    }
    info!(
        "open windows {}, late dropped {}",
        engine.open_windows(),
        engine.late_dropped()
    );

    engine.stop(Duration::from_secs(30)).await?;

    if let Some(task) = dead_letter_task {
        task.await?;
    }
    Ok(())
}
