pub mod capability;
pub mod controller;
pub mod devices;
pub mod host;
pub mod modes;
pub mod registry;
pub mod signal;

#[cfg(test)]
mod testing;

pub use capability::{HeatingUnit, TemperatureSource};
pub use controller::ClimateController;
pub use registry::{Component, Components};
pub use signal::ReevaluateSignal;
