use std::{collections::HashMap, sync::Arc};

use smartnode_common::ConfigError;

use crate::capability::{HeatingUnit, TemperatureSource};

/// A named component together with the capability it was registered with.
#[derive(Clone)]
pub enum Component {
    TemperatureSensor(Arc<dyn TemperatureSource>),
    Switch(Arc<dyn HeatingUnit>),
}

/// Components addressable by the name used in the configuration.
#[derive(Clone, Default)]
pub struct Components {
    entries: HashMap<String, Component>,
}

impl Components {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_temperature_sensor(
        &mut self,
        name: impl Into<String>,
        sensor: Arc<dyn TemperatureSource>,
    ) {
        self.entries
            .insert(name.into(), Component::TemperatureSensor(sensor));
    }

    pub fn register_switch(&mut self, name: impl Into<String>, switch: Arc<dyn HeatingUnit>) {
        self.entries.insert(name.into(), Component::Switch(switch));
    }

    pub fn get(&self, name: &str) -> Option<&Component> {
        self.entries.get(name)
    }

    pub fn temperature_source(&self, name: &str) -> Result<Arc<dyn TemperatureSource>, ConfigError> {
        match self.get(name) {
            Some(Component::TemperatureSensor(sensor)) => Ok(sensor.clone()),
            Some(_) => Err(ConfigError::MissingTemperatureCapability(name.to_string())),
            None => Err(ConfigError::UnknownComponent(name.to_string())),
        }
    }

    pub fn heating_unit(&self, name: &str) -> Result<Arc<dyn HeatingUnit>, ConfigError> {
        match self.get(name) {
            Some(Component::Switch(switch)) => Ok(switch.clone()),
            Some(_) => Err(ConfigError::NotAnActuator(name.to_string())),
            None => Err(ConfigError::UnknownComponent(name.to_string())),
        }
    }
}
