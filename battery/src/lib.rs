pub mod capability;
pub mod event;
pub mod host;
pub mod monitor;

pub use capability::{CutoffOutput, VoltageSource};
pub use event::ThresholdEvent;
pub use monitor::{BatteryHandle, Reading, ThresholdMonitor};
