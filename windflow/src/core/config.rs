use std::convert::TryFrom;
use std::time::Duration;

use crate::core::error::{Error, Result};
use crate::core::properties::Properties;
use crate::core::window::{WindowConfig, WindowConfigRaw, WindowType, DEFAULT_ALLOWED_LATENESS_MS};

pub const WINDOW_TYPE: &str = "window.type";
pub const WINDOW_SIZE: &str = "window.size";
pub const WINDOW_SLIDE: &str = "window.slide";
pub const WINDOW_GAP: &str = "window.gap";
pub const WINDOW_ALLOWED_LATENESS: &str = "window.allowed_lateness";
pub const WATERMARK_OUT_OF_ORDERNESS: &str = "watermark.out_of_orderness";
pub const WATERMARK_IDLE_SOURCE_TIMEOUT: &str = "watermark.idle_source_timeout";
pub const LATE_DEAD_LETTER_WINDOW: &str = "late.dead_letter_window";
pub const ENGINE_EMIT_MODE: &str = "engine.emit_mode";
pub const ENGINE_SHUTDOWN_POLICY: &str = "engine.shutdown_policy";
pub const ENGINE_WORKERS: &str = "engine.workers";
pub const ENGINE_TICK_INTERVAL: &str = "engine.tick_interval";
pub const ENGINE_CHANNEL_CAPACITY: &str = "engine.channel_capacity";

const RECOGNIZED_KEYS: [&str; 13] = [
    WINDOW_TYPE,
    WINDOW_SIZE,
    WINDOW_SLIDE,
    WINDOW_GAP,
    WINDOW_ALLOWED_LATENESS,
    WATERMARK_OUT_OF_ORDERNESS,
    WATERMARK_IDLE_SOURCE_TIMEOUT,
    LATE_DEAD_LETTER_WINDOW,
    ENGINE_EMIT_MODE,
    ENGINE_SHUTDOWN_POLICY,
    ENGINE_WORKERS,
    ENGINE_TICK_INTERVAL,
    ENGINE_CHANNEL_CAPACITY,
];

pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// When window results are handed to the sink.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum EmitMode {
    /// Exactly one result, once the watermark passes `end + allowed_lateness`.
    Final,
    /// A first result once the watermark passes `end`, then a corrected result (next revision)
    /// after every admitted late contribution until `end + allowed_lateness`.
    Update,
}

impl<'a> TryFrom<&'a str> for EmitMode {
    type Error = Error;

    fn try_from(mode_str: &'a str) -> Result<Self> {
        let mode_str = mode_str.to_ascii_lowercase();
        match mode_str.as_str() {
            "final" => Ok(EmitMode::Final),
            "update" => Ok(EmitMode::Update),
            _ => Err(Error::ConfigValidation(format!(
                "unsupported emit mode `{}`",
                mode_str
            ))),
        }
    }
}

impl std::fmt::Display for EmitMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmitMode::Final => write!(f, "Final"),
            EmitMode::Update => write!(f, "Update"),
        }
    }
}

/// What happens to still open windows on stop.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ShutdownPolicy {
    /// force the watermark to the max and emit everything
    Flush,
    /// discard open windows
    Drop,
}

impl<'a> TryFrom<&'a str> for ShutdownPolicy {
    type Error = Error;

    fn try_from(policy_str: &'a str) -> Result<Self> {
        let policy_str = policy_str.to_ascii_lowercase();
        match policy_str.as_str() {
            "flush" => Ok(ShutdownPolicy::Flush),
            "drop" => Ok(ShutdownPolicy::Drop),
            _ => Err(Error::ConfigValidation(format!(
                "unsupported shutdown policy `{}`",
                policy_str
            ))),
        }
    }
}

impl std::fmt::Display for ShutdownPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownPolicy::Flush => write!(f, "Flush"),
            ShutdownPolicy::Drop => write!(f, "Drop"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct EngineConfig {
    window: WindowConfig,
    out_of_orderness_ms: u64,
    idle_source_timeout_ms: u64,
    dead_letter_window_ms: u64,
    emit_mode: EmitMode,
    shutdown_policy: ShutdownPolicy,
    workers: usize,
    tick_interval_ms: u64,
    channel_capacity: usize,
}

impl EngineConfig {
    pub fn builder(window: WindowConfig) -> EngineConfigBuilder {
        EngineConfigBuilder::new(window)
    }

    pub fn window(&self) -> &WindowConfig {
        &self.window
    }

    pub fn out_of_orderness_ms(&self) -> u64 {
        self.out_of_orderness_ms
    }

    /// 0 disables idle source detection
    pub fn idle_source_timeout_ms(&self) -> u64 {
        self.idle_source_timeout_ms
    }

    pub fn dead_letter_window_ms(&self) -> u64 {
        self.dead_letter_window_ms
    }

    pub fn emit_mode(&self) -> EmitMode {
        self.emit_mode
    }

    pub fn shutdown_policy(&self) -> ShutdownPolicy {
        self.shutdown_policy
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity
    }
}

#[derive(Clone, Debug)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    fn new(window: WindowConfig) -> Self {
        EngineConfigBuilder {
            config: EngineConfig {
                window,
                out_of_orderness_ms: 0,
                idle_source_timeout_ms: 0,
                dead_letter_window_ms: 0,
                emit_mode: EmitMode::Final,
                shutdown_policy: ShutdownPolicy::Flush,
                workers: num_cpus::get(),
                tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
                channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            },
        }
    }

    pub fn out_of_orderness(mut self, out_of_orderness: Duration) -> Self {
        self.config.out_of_orderness_ms = out_of_orderness.as_millis() as u64;
        self
    }

    pub fn idle_source_timeout(mut self, idle_timeout: Duration) -> Self {
        self.config.idle_source_timeout_ms = idle_timeout.as_millis() as u64;
        self
    }

    pub fn dead_letter_window(mut self, dead_letter_window: Duration) -> Self {
        self.config.dead_letter_window_ms = dead_letter_window.as_millis() as u64;
        self
    }

    pub fn emit_mode(mut self, emit_mode: EmitMode) -> Self {
        self.config.emit_mode = emit_mode;
        self
    }

    pub fn shutdown_policy(mut self, shutdown_policy: ShutdownPolicy) -> Self {
        self.config.shutdown_policy = shutdown_policy;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    pub fn tick_interval(mut self, tick_interval: Duration) -> Self {
        self.config.tick_interval_ms = tick_interval.as_millis() as u64;
        self
    }

    pub fn channel_capacity(mut self, channel_capacity: usize) -> Self {
        self.config.channel_capacity = channel_capacity;
        self
    }

    pub fn build(self) -> Result<EngineConfig> {
        let config = self.config;
        config.window.validate()?;
        if config.workers == 0 {
            return Err(Error::ConfigValidation("workers must be positive".to_string()));
        }
        if config.tick_interval_ms == 0 {
            return Err(Error::ConfigValidation(
                "tick interval must be positive".to_string(),
            ));
        }
        if config.channel_capacity == 0 {
            return Err(Error::ConfigValidation(
                "channel capacity must be positive".to_string(),
            ));
        }
        Ok(config)
    }
}

impl<'a> TryFrom<&'a Properties> for EngineConfig {
    type Error = Error;

    fn try_from(properties: &'a Properties) -> Result<Self> {
        let mut unknown: Vec<&str> = properties
            .keys()
            .filter(|key| !RECOGNIZED_KEYS.contains(key))
            .collect();
        if !unknown.is_empty() {
            unknown.sort();
            return Err(Error::ConfigValidation(format!(
                "unrecognized options: {}",
                unknown.join(", ")
            )));
        }

        let window_type = WindowType::try_from(properties.get_string(WINDOW_TYPE)?.as_str())?;
        let window = WindowConfig::try_from(WindowConfigRaw {
            window_type,
            size_ms: properties.get_u64_or(WINDOW_SIZE, 0)?,
            slide_ms: properties.get_opt_u64(WINDOW_SLIDE)?,
            gap_ms: properties.get_opt_u64(WINDOW_GAP)?,
            allowed_lateness_ms: properties
                .get_u64_or(WINDOW_ALLOWED_LATENESS, DEFAULT_ALLOWED_LATENESS_MS)?,
        })?;

        let mut builder = EngineConfig::builder(window)
            .out_of_orderness(properties.get_duration_ms(WATERMARK_OUT_OF_ORDERNESS, 0)?)
            .idle_source_timeout(properties.get_duration_ms(WATERMARK_IDLE_SOURCE_TIMEOUT, 0)?)
            .dead_letter_window(properties.get_duration_ms(LATE_DEAD_LETTER_WINDOW, 0)?)
            .tick_interval(properties.get_duration_ms(ENGINE_TICK_INTERVAL, DEFAULT_TICK_INTERVAL_MS)?)
            .channel_capacity(
                properties.get_u64_or(ENGINE_CHANNEL_CAPACITY, DEFAULT_CHANNEL_CAPACITY as u64)?
                    as usize,
            );

        if let Some(workers) = properties.get_opt_u64(ENGINE_WORKERS)? {
            builder = builder.workers(workers as usize);
        }
        if let Some(emit_mode) = properties.get_opt_string(ENGINE_EMIT_MODE) {
            builder = builder.emit_mode(EmitMode::try_from(emit_mode.as_str())?);
        }
        if let Some(policy) = properties.get_opt_string(ENGINE_SHUTDOWN_POLICY) {
            builder = builder.shutdown_policy(ShutdownPolicy::try_from(policy.as_str())?);
        }

        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use std::convert::TryFrom;
    use std::time::Duration;

    use crate::core::config::{EmitMode, EngineConfig, ShutdownPolicy};
    use crate::core::error::Error;
    use crate::core::properties::Properties;
    use crate::core::window::{WindowConfig, WindowType};

    #[test]
    pub fn properties_config_test() {
        let properties = Properties::from_yaml(
            r#"
window:
  type: sliding
  size: 10000
  slide: 5000
  allowed_lateness: 2000
watermark:
  idle_source_timeout: 30000
late.dead_letter_window: 60000
engine:
  emit_mode: update
  shutdown_policy: drop
  workers: 2
"#,
        )
        .unwrap();

        let config = EngineConfig::try_from(&properties).unwrap();
        assert_eq!(config.window().window_type(), WindowType::Sliding);
        assert_eq!(config.window().slide_ms(), Some(5000));
        assert_eq!(config.window().allowed_lateness_ms(), 2000);
        assert_eq!(config.idle_source_timeout_ms(), 30000);
        assert_eq!(config.dead_letter_window_ms(), 60000);
        assert_eq!(config.emit_mode(), EmitMode::Update);
        assert_eq!(config.shutdown_policy(), ShutdownPolicy::Drop);
        assert_eq!(config.workers(), 2);
        assert_eq!(config.tick_interval(), Duration::from_millis(1000));
    }

    #[test]
    pub fn unrecognized_option_test() {
        let properties = Properties::from_yaml(
            r#"
window.type: tumbling
window.size: 1000
window.colour: blue
"#,
        )
        .unwrap();

        match EngineConfig::try_from(&properties) {
            Err(Error::ConfigValidation(msg)) => assert!(msg.contains("window.colour")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    pub fn invalid_combination_test() {
        let properties = Properties::from_yaml("window.type: session\nwindow.size: 1000").unwrap();
        assert!(EngineConfig::try_from(&properties).is_err());

        let properties = Properties::from_yaml("window.type: sliding\nwindow.size: 1000").unwrap();
        assert!(EngineConfig::try_from(&properties).is_err());
    }

    #[test]
    pub fn builder_validation_test() {
        let window = WindowConfig::tumbling(Duration::from_secs(1)).unwrap();
        assert!(EngineConfig::builder(window.clone()).workers(0).build().is_err());
        assert!(EngineConfig::builder(window.clone())
            .tick_interval(Duration::from_millis(0))
            .build()
            .is_err());
        assert!(EngineConfig::builder(window).build().is_ok());
    }
}
