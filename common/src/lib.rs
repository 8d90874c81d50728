pub mod broker;
pub mod config;
pub mod discovery;
pub mod error;
#[cfg(feature = "mqtt")]
pub mod mqtt;
pub mod state;
pub mod store;
pub mod topics;
pub mod types;

pub use broker::Broker;
pub use config::{BatteryConfig, ClimateConfig, NetworkConfig, RuntimeConfig};
pub use error::{
    ActuatorError, BrokerError, CommandError, ConfigError, ModeError, SensorError, StoreError,
};
pub use state::{ClimateState, StateSnapshot};
pub use store::ConfigStore;
pub use topics::*;
pub use types::{
    BatteryTelemetry, ClimateAction, ClimateStatus, MODE_HEAT, MODE_OFF, SUPPORTED_MODES,
};
