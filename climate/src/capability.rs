use std::time::Duration;

use async_trait::async_trait;
use smartnode_common::{ActuatorError, SensorError};

/// Anything that can report the current temperature.
#[async_trait]
pub trait TemperatureSource: Send + Sync {
    /// Reads the temperature, publishing the raw value when `publish` is set.
    async fn temperature(&self, publish: bool, timeout: Duration) -> Result<f32, SensorError>;

    /// Topic consumers read the temperature from.
    fn temperature_topic(&self) -> String;

    fn temperature_template(&self) -> String {
        "{{ value|float }}".to_string()
    }
}

/// A switchable heating actuator.
#[async_trait]
pub trait HeatingUnit: Send + Sync {
    async fn turn_on(&self) -> Result<(), ActuatorError>;

    async fn turn_off(&self) -> Result<(), ActuatorError>;

    fn is_on(&self) -> bool;
}
