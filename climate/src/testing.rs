//! Test doubles for the device capabilities.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use smartnode_common::{ActuatorError, SensorError};

use crate::capability::{HeatingUnit, TemperatureSource};

#[derive(Debug, Default)]
pub struct FakeHeater {
    on: AtomicBool,
    switches: AtomicUsize,
    fail_next: AtomicBool,
}

impl FakeHeater {
    pub fn on() -> Self {
        let heater = Self::default();
        heater.on.store(true, Ordering::SeqCst);
        heater
    }

    pub fn fail_next_switch(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn switch_count(&self) -> usize {
        self.switches.load(Ordering::SeqCst)
    }

    fn switch(&self, on: bool) -> Result<(), ActuatorError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(ActuatorError::SwitchFailed("injected".to_string()));
        }
        self.on.store(on, Ordering::SeqCst);
        self.switches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl HeatingUnit for FakeHeater {
    async fn turn_on(&self) -> Result<(), ActuatorError> {
        self.switch(true)
    }

    async fn turn_off(&self) -> Result<(), ActuatorError> {
        self.switch(false)
    }

    fn is_on(&self) -> bool {
        self.on.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
pub struct FakeTemperature {
    value: Mutex<Option<f32>>,
    reads: AtomicUsize,
}

impl FakeTemperature {
    pub fn reading(value: f32) -> Self {
        let sensor = Self::default();
        sensor.set(value);
        sensor
    }

    pub fn set(&self, value: f32) {
        *self.value.lock().unwrap() = Some(value);
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TemperatureSource for FakeTemperature {
    async fn temperature(&self, _publish: bool, _timeout: Duration) -> Result<f32, SensorError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let value = *self.value.lock().unwrap();
        value.ok_or_else(|| SensorError::Unavailable("no reading".to_string()))
    }

    fn temperature_topic(&self) -> String {
        "home/test/temperature".to_string()
    }
}
