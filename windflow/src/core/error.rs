pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// bad `WindowConfig`/`EngineConfig` combination, fatal at construction
    #[error("config validation error: {0}")]
    ConfigValidation(String),

    /// an assigner was handed a config that never passed validation
    #[error("invalid window config: {0}")]
    InvalidConfig(String),

    #[error("malformed event: {0}")]
    MalformedEvent(String),

    #[error("late event dropped. partition_key={partition_key}, event_time={event_time}")]
    LateEventDropped {
        partition_key: String,
        event_time: u64,
    },

    #[error("sink emission failure: {0}")]
    SinkEmission(String),

    #[error("operation cancelled: {0}")]
    OperationCancelled(String),

    #[error("internal invariant violation: {0}")]
    InternalInvariantViolation(String),

    #[error("window not found. partition_key={partition_key}, window_id={window_id}")]
    NotFound {
        partition_key: String,
        window_id: String,
    },

    #[error("illegal engine state, expected {expected} but {actual}")]
    IllegalState { expected: String, actual: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn msg<T: ToString>(msg: T) -> Self {
        Error::Other(anyhow!(msg.to_string()))
    }

    /// Errors that only concern a single event or window, the engine keeps going.
    pub fn is_isolated(&self) -> bool {
        match self {
            Error::MalformedEvent(_)
            | Error::LateEventDropped { .. }
            | Error::SinkEmission(_)
            | Error::OperationCancelled(_) => true,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::ConfigValidation(e.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::ConfigValidation(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use crate::core::error::Error;

    #[test]
    pub fn isolated_error_test() {
        assert!(Error::MalformedEvent("no event_time".to_string()).is_isolated());
        assert!(Error::OperationCancelled("timeout".to_string()).is_isolated());
        assert!(!Error::ConfigValidation("slide".to_string()).is_isolated());
        assert!(!Error::InternalInvariantViolation("evict".to_string()).is_isolated());
    }

    #[test]
    pub fn anyhow_wrap_test() {
        let e: Error = anyhow!("boom").into();
        assert_eq!(e.to_string(), "boom");
    }
}
