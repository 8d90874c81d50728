//! Host-side devices: a temperature fed over MQTT and a relay whose state is
//! mirrored to a retained topic.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::Duration,
};

use async_trait::async_trait;
use smartnode_common::{
    config::RemoteSensorConfig, device_topic, ActuatorError, Broker, NetworkConfig, SensorError,
};
use tokio::{sync::Notify, time::Instant};
use tracing::{info, warn};

use crate::capability::{HeatingUnit, TemperatureSource};

const PLAUSIBLE_RANGE: std::ops::RangeInclusive<f32> = -40.0..=125.0;
const SWITCH_PUBLISH_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy)]
struct Reading {
    value: f32,
    at: Instant,
}

/// Temperature published by another node. The runtime feeds every message
/// received on [`RemoteTemperature::topic`] into [`RemoteTemperature::update`].
#[derive(Debug)]
pub struct RemoteTemperature {
    topic: String,
    template: String,
    stale_after: Duration,
    latest: Mutex<Option<Reading>>,
    updated: Notify,
}

impl RemoteTemperature {
    pub fn new(config: &RemoteSensorConfig) -> Self {
        Self {
            topic: config.topic.clone(),
            template: config.template.clone(),
            stale_after: Duration::from_secs(config.stale_timeout_secs),
            latest: Mutex::new(None),
            updated: Notify::new(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Stores a plausible reading. Returns `false` if the payload was dropped.
    pub fn update(&self, payload: &[u8]) -> bool {
        let value = std::str::from_utf8(payload)
            .ok()
            .and_then(|raw| raw.trim().parse::<f32>().ok())
            .filter(|value| value.is_finite() && PLAUSIBLE_RANGE.contains(value));
        let Some(value) = value else {
            warn!(
                "dropping implausible temperature on {}: {}",
                self.topic,
                String::from_utf8_lossy(payload)
            );
            return false;
        };

        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = Some(Reading {
            value,
            at: Instant::now(),
        });
        self.updated.notify_waiters();
        true
    }

    fn latest(&self) -> Option<Reading> {
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl TemperatureSource for RemoteTemperature {
    /// The value already lives on the broker, so `publish` has nothing to do.
    async fn temperature(&self, _publish: bool, timeout: Duration) -> Result<f32, SensorError> {
        let deadline = Instant::now() + timeout;
        loop {
            let updated = self.updated.notified();
            tokio::pin!(updated);
            updated.as_mut().enable();

            if let Some(reading) = self.latest() {
                let age = reading.at.elapsed();
                if age > self.stale_after {
                    return Err(SensorError::Stale(age.as_millis() as u64));
                }
                return Ok(reading.value);
            }
            if tokio::time::timeout_at(deadline, updated).await.is_err() {
                return Err(SensorError::Timeout(timeout.as_millis() as u64));
            }
        }
    }

    fn temperature_topic(&self) -> String {
        self.topic.clone()
    }

    fn temperature_template(&self) -> String {
        self.template.clone()
    }
}

/// Heating relay driven through the broker. Every switch publishes `ON` or
/// `OFF` retained to `<home>/<device_id>/<name>`.
pub struct RelaySwitch {
    topic: String,
    broker: Arc<dyn Broker>,
    on: AtomicBool,
}

impl RelaySwitch {
    pub fn new(network: &NetworkConfig, name: &str, broker: Arc<dyn Broker>) -> Self {
        Self {
            topic: device_topic(&network.home_topic, &network.device_id, name),
            broker,
            on: AtomicBool::new(false),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    async fn switch(&self, on: bool) -> Result<(), ActuatorError> {
        let payload = if on { "ON" } else { "OFF" };
        self.broker
            .publish(&self.topic, payload.into(), true, SWITCH_PUBLISH_TIMEOUT)
            .await
            .map_err(|err| ActuatorError::SwitchFailed(err.to_string()))?;
        if self.on.swap(on, Ordering::AcqRel) != on {
            info!("{} switched {payload}", self.topic);
        }
        Ok(())
    }
}

#[async_trait]
impl HeatingUnit for RelaySwitch {
    async fn turn_on(&self) -> Result<(), ActuatorError> {
        self.switch(true).await
    }

    async fn turn_off(&self) -> Result<(), ActuatorError> {
        self.switch(false).await
    }

    fn is_on(&self) -> bool {
        self.on.load(Ordering::Acquire)
    }
}
