//! Battery voltage watch: fast sampling against static bounds, slow telemetry
//! and a protective cutoff below the low bound.

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use smartnode_common::{
    availability_topic, device_topic,
    discovery::{DeviceInfo, SensorDiscovery},
    discovery_topic, BatteryConfig, BatteryTelemetry, Broker, ConfigError, NetworkConfig,
};
use tokio::time::Instant;
use tracing::{error, warn};

use crate::{
    capability::{CutoffOutput, VoltageSource},
    event::ThresholdEvent,
};

const COMPONENT_NAME: &str = "Battery";
const TELEMETRY_PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);
const DISCOVERY_PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);
const CUTOFF_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Outcome of one sampling cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    Normal(f64),
    High(f64),
    Low(f64),
    Unavailable,
}

#[derive(Debug)]
struct Shared {
    voltage_max: f64,
    voltage_min: f64,
    last_voltage: Mutex<Option<f64>>,
    on_high: Mutex<Option<Arc<ThresholdEvent>>>,
    on_low: Mutex<Option<Arc<ThresholdEvent>>>,
}

/// Consumer-side view of a running monitor.
#[derive(Debug, Clone)]
pub struct BatteryHandle {
    shared: Arc<Shared>,
}

impl BatteryHandle {
    /// Replaces any previously registered high-voltage sink.
    pub fn register_high(&self, event: Arc<ThresholdEvent>) {
        *lock(&self.shared.on_high) = Some(event);
    }

    /// Replaces any previously registered low-voltage sink.
    pub fn register_low(&self, event: Arc<ThresholdEvent>) {
        *lock(&self.shared.on_low) = Some(event);
    }

    pub fn last_voltage(&self) -> Option<f64> {
        *lock(&self.shared.last_voltage)
    }

    pub fn voltage_max(&self) -> f64 {
        self.shared.voltage_max
    }

    pub fn voltage_min(&self) -> f64 {
        self.shared.voltage_min
    }

    fn on_high(&self) -> Option<Arc<ThresholdEvent>> {
        lock(&self.shared.on_high).clone()
    }

    fn on_low(&self) -> Option<Arc<ThresholdEvent>> {
        lock(&self.shared.on_low).clone()
    }
}

pub struct ThresholdMonitor {
    config: BatteryConfig,
    network: NetworkConfig,
    topic: String,
    adc: Arc<dyn VoltageSource>,
    cutoff: Option<Arc<dyn CutoffOutput>>,
    broker: Arc<dyn Broker>,
    handle: BatteryHandle,
}

impl ThresholdMonitor {
    pub fn new(
        config: BatteryConfig,
        network: NetworkConfig,
        adc: Arc<dyn VoltageSource>,
        cutoff: Option<Arc<dyn CutoffOutput>>,
        broker: Arc<dyn Broker>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let topic = config.mqtt_topic.clone().unwrap_or_else(|| {
            device_topic(&network.home_topic, &network.device_id, "battery")
        });
        if let Some(cutoff) = &cutoff {
            if let Err(err) = cutoff.set_engaged(false) {
                warn!("failed to reset cutoff output: {err}");
            }
        }

        let handle = BatteryHandle {
            shared: Arc::new(Shared {
                voltage_max: config.voltage_max,
                voltage_min: config.voltage_min,
                last_voltage: Mutex::new(None),
                on_high: Mutex::new(None),
                on_low: Mutex::new(None),
            }),
        };

        Ok(Self {
            config,
            network,
            topic,
            adc,
            cutoff,
            broker,
            handle,
        })
    }

    pub fn handle(&self) -> BatteryHandle {
        self.handle.clone()
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Reads the battery voltage, optionally publishing the telemetry.
    pub async fn voltage(&self, publish: bool) -> Option<f64> {
        let raw = match self.adc.read_voltage().await {
            Ok(raw) => raw,
            Err(err) => {
                error!("error reading battery voltage: {err}");
                return None;
            }
        };
        let voltage = round_to(raw * self.config.multiplier_adc, self.config.precision_voltage);
        *lock(&self.handle.shared.last_voltage) = Some(voltage);

        if publish {
            self.publish_telemetry(voltage).await;
        }
        Some(voltage)
    }

    /// One sampling cycle: release stale arms, sample, compare.
    pub async fn cycle(&self, publish: bool) -> Reading {
        let on_high = self.handle.on_high();
        let on_low = self.handle.on_low();
        for event in [&on_high, &on_low].into_iter().flatten() {
            event.release();
        }

        let Some(voltage) = self.voltage(publish).await else {
            return Reading::Unavailable;
        };

        if voltage > self.config.voltage_max {
            match on_high {
                Some(event) => event.set(voltage),
                None => warn!(
                    "battery voltage of {voltage} exceeds maximum of {}",
                    self.config.voltage_max
                ),
            }
            Reading::High(voltage)
        } else if voltage < self.config.voltage_min {
            match on_low {
                Some(event) => event.set(voltage),
                None => warn!(
                    "battery voltage of {voltage} lower than minimum of {}",
                    self.config.voltage_min
                ),
            }
            if let Some(cutoff) = &self.cutoff {
                self.engage_cutoff(cutoff.as_ref()).await;
            }
            Reading::Low(voltage)
        } else {
            Reading::Normal(voltage)
        }
    }

    /// Samples forever, publishing telemetry every `interval_secs`.
    pub async fn run(&self) {
        let watch_interval = Duration::from_millis(self.config.watch_interval_ms);
        let publish_interval = Duration::from_secs(self.config.interval_secs);
        let mut next_publish = Instant::now();
        loop {
            let now = Instant::now();
            let publish = now >= next_publish;
            if publish {
                next_publish = now + publish_interval;
            }
            self.cycle(publish).await;
            tokio::time::sleep(watch_interval).await;
        }
    }

    /// Discovery topic and descriptor for the relative and absolute sensors.
    pub fn discovery(&self) -> [(String, SensorDiscovery); 2] {
        let device = DeviceInfo::new(&self.network.device_id, env!("CARGO_PKG_VERSION"));
        let availability = availability_topic(&self.network.home_topic, &self.network.device_id);
        let entry = |suffix: &str, name: String| {
            let component = format!("{COMPONENT_NAME}{suffix}");
            let topic = discovery_topic(
                &self.network.discovery_prefix,
                "sensor",
                &self.network.device_id,
                &component,
            );
            let unique_id = format!("{}_{component}", self.network.device_id);
            (topic, name, unique_id)
        };

        let (relative_topic, relative_name, relative_id) = entry(
            "r",
            self.config
                .friendly_name
                .clone()
                .unwrap_or_else(|| "Battery %".to_string()),
        );
        let (absolute_topic, absolute_name, absolute_id) = entry(
            "a",
            self.config
                .friendly_name_abs
                .clone()
                .unwrap_or_else(|| "Battery Volt".to_string()),
        );

        [
            (
                relative_topic,
                SensorDiscovery {
                    name: relative_name,
                    state_topic: self.topic.clone(),
                    availability_topic: availability.clone(),
                    unique_id: relative_id,
                    device_class: Some("battery"),
                    unit_of_measurement: "%",
                    value_template: "{{ value_json.relative }}",
                    icon: None,
                    device: device.clone(),
                },
            ),
            (
                absolute_topic,
                SensorDiscovery {
                    name: absolute_name,
                    state_topic: self.topic.clone(),
                    availability_topic: availability,
                    unique_id: absolute_id,
                    device_class: None,
                    unit_of_measurement: "V",
                    value_template: "{{ value_json.absolute }}",
                    icon: Some("mdi:car-battery"),
                    device,
                },
            ),
        ]
    }

    pub async fn publish_discovery(&self) {
        for (topic, descriptor) in self.discovery() {
            match serde_json::to_vec(&descriptor) {
                Ok(payload) => {
                    if let Err(err) = self
                        .broker
                        .publish(&topic, payload, true, DISCOVERY_PUBLISH_TIMEOUT)
                        .await
                    {
                        warn!("battery discovery publish failed: {err}");
                    }
                }
                Err(err) => warn!("battery discovery serialization failed: {err}"),
            }
        }
    }

    /// Still engaged means the previous drive did not cut the power.
    async fn engage_cutoff(&self, cutoff: &dyn CutoffOutput) {
        if cutoff.is_engaged() {
            error!(severity = "critical", "cutting off power did not work");
            if let Err(err) = cutoff.set_engaged(false) {
                error!(severity = "critical", "failed to release cutoff output: {err}");
            }
            tokio::time::sleep(CUTOFF_RETRY_DELAY).await;
        } else {
            warn!("cutting off power");
        }

        tokio::time::sleep(Duration::from_millis(self.config.cutoff_cooldown_ms)).await;
        if let Err(err) = cutoff.set_engaged(true) {
            error!(severity = "critical", "failed to engage cutoff output: {err}");
        }
    }

    async fn publish_telemetry(&self, voltage: f64) {
        let telemetry =
            BatteryTelemetry::new(voltage, self.config.voltage_min, self.config.voltage_max);
        match serde_json::to_vec(&telemetry) {
            Ok(payload) => {
                if let Err(err) = self
                    .broker
                    .publish(&self.topic, payload, false, TELEMETRY_PUBLISH_TIMEOUT)
                    .await
                {
                    warn!("battery telemetry publish failed: {err}");
                }
            }
            Err(err) => warn!("battery telemetry serialization failed: {err}"),
        }
    }
}

fn round_to(value: f64, decimals: u8) -> f64 {
    let factor = 10f64.powi(i32::from(decimals));
    (value * factor).round() / factor
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
