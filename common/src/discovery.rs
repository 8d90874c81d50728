//! Home-Assistant MQTT discovery descriptors.
//!
//! Only the payload shape lives here; publishing is up to the component.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceInfo {
    #[serde(rename = "ids")]
    pub identifiers: Vec<String>,
    pub name: String,
    #[serde(rename = "sw")]
    pub sw_version: String,
    #[serde(rename = "mdl")]
    pub model: String,
    #[serde(rename = "mf")]
    pub manufacturer: String,
}

impl DeviceInfo {
    pub fn new(device_id: &str, sw_version: &str) -> Self {
        Self {
            identifiers: vec![device_id.to_string()],
            name: device_id.to_string(),
            sw_version: sw_version.to_string(),
            model: "smartnode".to_string(),
            manufacturer: "smartnode".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClimateDiscovery {
    #[serde(rename = "~")]
    pub base_topic: String,
    pub name: String,
    #[serde(rename = "avty_t")]
    pub availability_topic: String,
    #[serde(rename = "uniq_id")]
    pub unique_id: String,
    pub current_temperature_topic: String,
    pub current_temperature_template: String,
    pub mode_state_topic: &'static str,
    pub mode_state_template: &'static str,
    pub mode_command_topic: &'static str,
    pub action_topic: &'static str,
    pub action_template: &'static str,
    pub temperature_low_command_topic: &'static str,
    pub temperature_low_state_topic: &'static str,
    pub temperature_high_command_topic: &'static str,
    pub temperature_high_state_topic: &'static str,
    pub temp_step: f32,
    pub min_temp: f32,
    pub max_temp: f32,
    pub precision: f32,
    pub modes: Vec<String>,
    pub away_mode_command_topic: &'static str,
    pub away_mode_state_topic: &'static str,
    pub away_mode_state_template: &'static str,
    #[serde(rename = "dev")]
    pub device: DeviceInfo,
}

#[derive(Debug, Clone)]
pub struct ClimateDescriptor<'a> {
    pub name: &'a str,
    pub friendly_name: Option<&'a str>,
    pub device_id: &'a str,
    pub base_topic: &'a str,
    pub availability_topic: &'a str,
    pub temperature_topic: String,
    pub temperature_template: String,
    pub temp_step: f32,
    pub min_temp: f32,
    pub max_temp: f32,
    pub precision: f32,
    pub modes: Vec<String>,
    pub device: DeviceInfo,
}

impl ClimateDiscovery {
    pub fn new(descriptor: ClimateDescriptor<'_>) -> Self {
        Self {
            base_topic: descriptor.base_topic.to_string(),
            name: descriptor
                .friendly_name
                .unwrap_or(descriptor.name)
                .to_string(),
            availability_topic: descriptor.availability_topic.to_string(),
            unique_id: format!("{}_{}", descriptor.device_id, descriptor.name),
            current_temperature_topic: descriptor.temperature_topic,
            current_temperature_template: descriptor.temperature_template,
            mode_state_topic: "~/state",
            mode_state_template: "{{ value_json.mode }}",
            mode_command_topic: "~/mode/set",
            action_topic: "~/state",
            action_template: "{{ value_json.action }}",
            temperature_low_command_topic: "~/temp_low/set",
            temperature_low_state_topic: "~/temp_low",
            temperature_high_command_topic: "~/temp_high/set",
            temperature_high_state_topic: "~/temp_high",
            temp_step: descriptor.temp_step,
            min_temp: descriptor.min_temp,
            max_temp: descriptor.max_temp,
            precision: descriptor.precision,
            modes: descriptor.modes,
            away_mode_command_topic: "~/away/set",
            away_mode_state_topic: "~/state",
            away_mode_state_template: "{{ value_json.away }}",
            device: descriptor.device,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorDiscovery {
    pub name: String,
    #[serde(rename = "stat_t")]
    pub state_topic: String,
    #[serde(rename = "avty_t")]
    pub availability_topic: String,
    #[serde(rename = "uniq_id")]
    pub unique_id: String,
    #[serde(rename = "dev_cla", skip_serializing_if = "Option::is_none")]
    pub device_class: Option<&'static str>,
    #[serde(rename = "unit_of_meas")]
    pub unit_of_measurement: &'static str,
    #[serde(rename = "val_tpl")]
    pub value_template: &'static str,
    #[serde(rename = "ic", skip_serializing_if = "Option::is_none")]
    pub icon: Option<&'static str>,
    #[serde(rename = "dev")]
    pub device: DeviceInfo,
}
