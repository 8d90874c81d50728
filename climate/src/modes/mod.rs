//! Mode strategies and the registry that maps mode names to them.
//!
//! A strategy decides what the heating unit does while its mode is active.
//! The controller owns every strategy and lends it the state for the duration
//! of a single call.

mod heat;
mod off;

use std::sync::Arc;

use async_trait::async_trait;
use smartnode_common::{ClimateState, ConfigError, ModeError, MODE_HEAT, MODE_OFF};
use tracing::error;

use crate::capability::HeatingUnit;

#[async_trait]
pub trait Mode: Send + Sync {
    /// Registry name of the mode. Stable for the lifetime of the strategy.
    fn identity(&self) -> &str;

    /// Runs on every evaluation pass while the mode is active.
    async fn trigger(
        &self,
        state: &mut ClimateState,
        current_temp: Option<f32>,
    ) -> Result<(), ModeError>;

    /// Runs when the mode becomes active. `Ok(false)` refuses the switch.
    async fn activate(&self, state: &mut ClimateState) -> Result<bool, ModeError>;

    /// Runs when another mode takes over. `Ok(false)` keeps this mode active.
    async fn deactivate(&self, state: &mut ClimateState) -> Result<bool, ModeError>;
}

pub type ModeFactory = fn(Arc<dyn HeatingUnit>) -> Box<dyn Mode>;

const REGISTRY: &[(&str, ModeFactory)] = &[(MODE_OFF, off::build), (MODE_HEAT, heat::build)];

pub fn lookup(name: &str) -> Option<ModeFactory> {
    REGISTRY
        .iter()
        .find(|(registered, _)| *registered == name)
        .map(|(_, factory)| *factory)
}

/// The strategies a controller can switch between. Always contains `off`.
pub struct ModeSet {
    modes: Vec<Box<dyn Mode>>,
    off: usize,
}

impl ModeSet {
    /// Instantiates the requested modes through the registry. Unknown names are
    /// logged and skipped.
    pub fn build(names: &[String], heater: Arc<dyn HeatingUnit>) -> Result<Self, ConfigError> {
        let mut requested: Vec<&str> = names.iter().map(String::as_str).collect();
        if !requested.contains(&MODE_OFF) {
            requested.push(MODE_OFF);
        }

        let mut modes: Vec<Box<dyn Mode>> = Vec::with_capacity(requested.len());
        for name in requested {
            if modes.iter().any(|mode| mode.identity() == name) {
                continue;
            }
            let Some(factory) = lookup(name) else {
                error!("mode {name} not supported");
                continue;
            };
            modes.push(factory(heater.clone()));
        }

        Self::from_modes(modes)
    }

    /// Wraps already-built strategies, e.g. ones that are not in the registry.
    pub fn from_modes(modes: Vec<Box<dyn Mode>>) -> Result<Self, ConfigError> {
        let off = modes
            .iter()
            .position(|mode| mode.identity() == MODE_OFF)
            .ok_or(ConfigError::MissingOffMode)?;
        Ok(Self { modes, off })
    }

    pub fn get(&self, name: &str) -> Option<&dyn Mode> {
        self.modes
            .iter()
            .find(|mode| mode.identity() == name)
            .map(Box::as_ref)
    }

    /// Like [`ModeSet::get`] but falls back to `off` for unknown names.
    pub fn resolve(&self, name: &str) -> &dyn Mode {
        self.get(name).unwrap_or_else(|| self.off())
    }

    pub fn off(&self) -> &dyn Mode {
        self.modes[self.off].as_ref()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> Vec<String> {
        self.modes
            .iter()
            .map(|mode| mode.identity().to_string())
            .collect()
    }
}
