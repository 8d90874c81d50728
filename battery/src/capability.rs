use async_trait::async_trait;
use smartnode_common::{ActuatorError, SensorError};

/// Raw ADC input, in volts before the divider multiplier is applied.
#[async_trait]
pub trait VoltageSource: Send + Sync {
    async fn read_voltage(&self) -> Result<f64, SensorError>;
}

/// Output that disconnects the load when engaged.
pub trait CutoffOutput: Send + Sync {
    fn set_engaged(&self, engaged: bool) -> Result<(), ActuatorError>;

    fn is_engaged(&self) -> bool;
}
