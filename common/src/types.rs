use serde::{Deserialize, Serialize};

use crate::state::ClimateState;

pub const MODE_OFF: &str = "off";
pub const MODE_HEAT: &str = "heat";

/// Modes that have a strategy in the registry. Cooling, fan and auto are not implemented.
pub const SUPPORTED_MODES: &[&str] = &[MODE_OFF, MODE_HEAT];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClimateAction {
    Off,
    Idle,
    Heating,
}

impl ClimateAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Idle => "idle",
            Self::Heating => "heating",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClimateStatus {
    #[serde(flatten)]
    pub state: ClimateState,
    #[serde(rename = "currentTemp")]
    pub current_temp: Option<f32>,
    pub recovered: bool,
    pub modes: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BatteryTelemetry {
    pub absolute: f64,
    pub relative: f64,
}

impl BatteryTelemetry {
    pub fn new(voltage: f64, voltage_min: f64, voltage_max: f64) -> Self {
        let span = voltage_max - voltage_min;
        let relative = if span > 0.0 {
            ((voltage - voltage_min) / span * 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        };
        Self {
            absolute: voltage,
            relative: (relative * 10.0).round() / 10.0,
        }
    }
}
