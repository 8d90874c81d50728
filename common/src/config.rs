use serde::{Deserialize, Serialize};

use crate::{
    error::ConfigError,
    types::{MODE_HEAT, MODE_OFF},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClimateConfig {
    /// Instance number, appended to the component name (`Climate0`).
    pub instance: usize,
    pub temperature_sensor: String,
    pub heating_unit: String,
    pub modes: Vec<String>,
    pub interval_secs: u64,
    pub temp_step: f32,
    pub precision: f32,
    pub min_temp: f32,
    pub max_temp: f32,
    pub temp_high: f32,
    pub temp_low: f32,
    pub away_temp_high: f32,
    pub away_temp_low: f32,
    pub discover: bool,
    pub friendly_name: Option<String>,
}

impl Default for ClimateConfig {
    fn default() -> Self {
        Self {
            instance: 0,
            temperature_sensor: "remote-temperature".to_string(),
            heating_unit: "heater".to_string(),
            modes: vec![MODE_OFF.to_string(), MODE_HEAT.to_string()],
            interval_secs: 300,
            temp_step: 0.1,
            precision: 0.1,
            min_temp: 16.0,
            max_temp: 28.0,
            temp_high: 22.0,
            temp_low: 20.0,
            away_temp_high: 16.5,
            away_temp_low: 15.5,
            discover: true,
            friendly_name: None,
        }
    }
}

impl ClimateConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.modes.is_empty() {
            return Err(ConfigError::NoModes);
        }
        if !self.min_temp.is_finite() || !self.max_temp.is_finite() || self.min_temp >= self.max_temp
        {
            return Err(ConfigError::InvalidBounds {
                min: self.min_temp,
                max: self.max_temp,
            });
        }
        if self.interval_secs == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        Ok(())
    }

    pub fn name(&self) -> String {
        format!("Climate{}", self.instance)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatteryConfig {
    pub voltage_max: f64,
    pub voltage_min: f64,
    pub multiplier_adc: f64,
    pub precision_voltage: u8,
    pub interval_secs: u64,
    pub watch_interval_ms: u64,
    pub cutoff_cooldown_ms: u64,
    pub cutoff_enabled: bool,
    pub mqtt_topic: Option<String>,
    pub friendly_name: Option<String>,
    pub friendly_name_abs: Option<String>,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            voltage_max: 14.0,
            voltage_min: 10.5,
            multiplier_adc: 2.5,
            precision_voltage: 2,
            interval_secs: 600,
            watch_interval_ms: 1_000,
            cutoff_cooldown_ms: 5_000,
            cutoff_enabled: false,
            mqtt_topic: None,
            friendly_name: None,
            friendly_name_abs: None,
        }
    }
}

impl BatteryConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.voltage_min.is_finite()
            || !self.voltage_max.is_finite()
            || self.voltage_min >= self.voltage_max
        {
            return Err(ConfigError::InvalidVoltageBounds {
                min: self.voltage_min,
                max: self.voltage_max,
            });
        }
        if self.interval_secs == 0 || self.watch_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_user: String,
    pub mqtt_pass: String,
    pub home_topic: String,
    pub device_id: String,
    pub discovery_prefix: String,
    pub payload_on: Vec<String>,
    pub payload_off: Vec<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            mqtt_host: "192.168.1.100".to_string(),
            mqtt_port: 1883,
            mqtt_user: String::new(),
            mqtt_pass: String::new(),
            home_topic: "home".to_string(),
            device_id: "smartnode".to_string(),
            discovery_prefix: "homeassistant".to_string(),
            payload_on: ["ON", "on", "On", "1", "true", "True"]
                .into_iter()
                .map(String::from)
                .collect(),
            payload_off: ["OFF", "off", "Off", "0", "false", "False"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl NetworkConfig {
    /// Applies `MQTT_HOST`, `MQTT_PORT`, `MQTT_USER` and `MQTT_PASS` from the
    /// process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup("MQTT_HOST") {
            self.mqtt_host = host;
        }
        if let Some(port) = lookup("MQTT_PORT").and_then(|value| value.parse::<u16>().ok()) {
            self.mqtt_port = port;
        }
        if let Some(user) = lookup("MQTT_USER") {
            self.mqtt_user = user;
        }
        if let Some(pass) = lookup("MQTT_PASS") {
            self.mqtt_pass = pass;
        }
    }

    /// Maps a boolean-like payload onto the configured vocabulary.
    pub fn parse_switch(&self, payload: &str) -> Option<bool> {
        let payload = payload.trim();
        if self.payload_on.iter().any(|token| token == payload) {
            Some(true)
        } else if self.payload_off.iter().any(|token| token == payload) {
            Some(false)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSensorConfig {
    pub name: String,
    pub topic: String,
    pub template: String,
    pub stale_timeout_secs: u64,
}

impl Default for RemoteSensorConfig {
    fn default() -> Self {
        Self {
            name: "remote-temperature".to_string(),
            topic: "home/sensor/temperature".to_string(),
            template: "{{ value|float }}".to_string(),
            stale_timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaterConfig {
    pub name: String,
}

impl Default for HeaterConfig {
    fn default() -> Self {
        Self {
            name: "heater".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub network: NetworkConfig,
    pub climate: ClimateConfig,
    pub remote_sensor: RemoteSensorConfig,
    pub heater: HeaterConfig,
    pub battery: BatteryConfig,
}
