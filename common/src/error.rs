use thiserror::Error;

/// Problems found while wiring a component from its configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("component `{0}` is not registered")]
    UnknownComponent(String),
    #[error("component `{0}` cannot report a temperature")]
    MissingTemperatureCapability(String),
    #[error("component `{0}` is not a switchable actuator")]
    NotAnActuator(String),
    #[error("no modes configured")]
    NoModes,
    #[error("mode `off` could not be instantiated")]
    MissingOffMode,
    #[error("invalid temperature bounds: min {min} must be below max {max}")]
    InvalidBounds { min: f32, max: f32 },
    #[error("interval must be greater than zero")]
    ZeroInterval,
    #[error("invalid voltage bounds: min {min} must be below max {max}")]
    InvalidVoltageBounds { min: f64, max: f64 },
}

/// Rejection of an incoming command. State is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl CommandError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SensorError {
    #[error("no reading within {0} ms")]
    Timeout(u64),
    #[error("last reading is {0} ms old")]
    Stale(u64),
    #[error("sensor unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActuatorError {
    #[error("actuator did not switch: {0}")]
    SwitchFailed(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModeError {
    #[error("no temperature available")]
    NoTemperature,
    #[error(transparent)]
    Actuator(#[from] ActuatorError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    #[error("broker request to `{topic}` timed out after {timeout_ms} ms")]
    Timeout { topic: String, timeout_ms: u64 },
    #[error("broker client error: {0}")]
    Client(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed runtime config: {0}")]
    Parse(#[from] serde_json::Error),
}
