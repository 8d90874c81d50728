//! The climate controller: setpoint/mode state, its retained-state recovery,
//! the periodic evaluation loop and the command handlers.

use std::{
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc, Mutex as StdMutex, PoisonError,
    },
    time::Duration,
};

use smartnode_common::{
    discovery::{ClimateDescriptor, ClimateDiscovery, DeviceInfo},
    discovery_topic, state_topic_of, Broker, BrokerError, ClimateCommand, ClimateConfig,
    ClimateState, ClimateStatus, ClimateTopics, CommandError, ConfigError, NetworkConfig,
    StateSnapshot, MODE_OFF,
};
use tokio::{sync::Mutex, time::Instant};
use tracing::{debug, error, info, warn};

use crate::{
    capability::{HeatingUnit, TemperatureSource},
    modes::ModeSet,
    registry::Components,
    signal::ReevaluateSignal,
};

const RECOVERY_POLLS: u32 = 16;
const RECOVERY_POLL_INTERVAL: Duration = Duration::from_millis(250);
const RECOVERY_GUARD: Duration = Duration::from_secs(30);
const GUARD_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// temp_low and temp_high usually arrive as a pair; wait for both.
const DEBOUNCE: Duration = Duration::from_secs(1);
const SENSOR_TIMEOUT: Duration = Duration::from_secs(5);
const SETPOINT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(3);
const STATE_PUBLISH_TIMEOUT: Duration = Duration::from_secs(4);
const DISCOVERY_PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);
const MIN_RECOMMENDED_INTERVAL_SECS: u64 = 60;

const RECOVERY_WAITING: u8 = 0;
const RECOVERY_RESTORING: u8 = 1;
const RECOVERY_DONE: u8 = 2;

pub struct ClimateController {
    name: String,
    config: ClimateConfig,
    network: NetworkConfig,
    topics: ClimateTopics,
    temperature: Arc<dyn TemperatureSource>,
    broker: Arc<dyn Broker>,
    modes: ModeSet,
    state: Mutex<ClimateState>,
    signal: ReevaluateSignal,
    recovery: AtomicU8,
    last_temperature: StdMutex<Option<f32>>,
}

impl ClimateController {
    /// Builds a controller from the components named in `config`.
    pub fn new(
        config: ClimateConfig,
        network: NetworkConfig,
        components: &Components,
        broker: Arc<dyn Broker>,
    ) -> Result<Self, ConfigError> {
        let temperature = components.temperature_source(&config.temperature_sensor)?;
        let heater = components.heating_unit(&config.heating_unit)?;
        Self::with_capabilities(config, network, temperature, heater, broker)
    }

    pub fn with_capabilities(
        config: ClimateConfig,
        network: NetworkConfig,
        temperature: Arc<dyn TemperatureSource>,
        heater: Arc<dyn HeatingUnit>,
        broker: Arc<dyn Broker>,
    ) -> Result<Self, ConfigError> {
        let modes = ModeSet::build(&config.modes, heater)?;
        Self::with_modes(config, network, temperature, modes, broker)
    }

    pub fn with_modes(
        config: ClimateConfig,
        network: NetworkConfig,
        temperature: Arc<dyn TemperatureSource>,
        modes: ModeSet,
        broker: Arc<dyn Broker>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let name = config.name();
        if config.interval_secs < MIN_RECOMMENDED_INTERVAL_SECS {
            warn!(
                "{name}: interval of {}s is short for a heating unit, use at least {MIN_RECOMMENDED_INTERVAL_SECS}s",
                config.interval_secs
            );
        }

        let topics = ClimateTopics::new(&network.home_topic, &network.device_id, &name);
        let state = ClimateState::new(&config);

        Ok(Self {
            name,
            config,
            network,
            topics,
            temperature,
            broker,
            modes,
            state: Mutex::new(state),
            signal: ReevaluateSignal::new(),
            recovery: AtomicU8::new(RECOVERY_WAITING),
            last_temperature: StdMutex::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn topics(&self) -> &ClimateTopics {
        &self.topics
    }

    pub async fn state(&self) -> ClimateState {
        self.state.lock().await.clone()
    }

    pub fn is_recovered(&self) -> bool {
        self.recovery.load(Ordering::Acquire) == RECOVERY_DONE
    }

    pub async fn status(&self) -> ClimateStatus {
        let state = self.state().await;
        ClimateStatus {
            state,
            current_temp: self.last_temperature(),
            recovered: self.is_recovered(),
            modes: self.modes.names(),
        }
    }

    /// Subscribes the four command topics.
    pub async fn subscribe_commands(&self) -> Result<(), BrokerError> {
        for topic in self.topics.command_topics() {
            self.broker.subscribe(&topic).await?;
        }
        Ok(())
    }

    /// Waits a bounded time for the retained state snapshot and applies it if
    /// one arrives. Runs once per boot.
    pub async fn recover(&self) {
        if let Err(err) = self.broker.subscribe(&self.topics.state).await {
            warn!("{}: subscribing {} failed: {err}", self.name, self.topics.state);
        }

        let mut polls = 0;
        loop {
            let phase = self.recovery.load(Ordering::Acquire);
            if phase == RECOVERY_DONE {
                break;
            }
            if phase == RECOVERY_WAITING
                && polls >= RECOVERY_POLLS
                && self
                    .recovery
                    .compare_exchange(
                        RECOVERY_WAITING,
                        RECOVERY_DONE,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok()
            {
                info!("{}: no retained state, keeping defaults", self.name);
                self.unsubscribe_state().await;
                break;
            }
            tokio::time::sleep(RECOVERY_POLL_INTERVAL).await;
            polls += 1;
        }

        self.publish_setpoints().await;
    }

    /// Control loop. Never returns.
    pub async fn run(&self) {
        let started = Instant::now();
        while !self.is_recovered() && started.elapsed() < RECOVERY_GUARD {
            tokio::time::sleep(GUARD_POLL_INTERVAL).await;
        }
        if !self.is_recovered() {
            warn!("{}: state recovery still pending, starting control loop", self.name);
        }

        let interval = Duration::from_secs(self.config.interval_secs);
        let mut last_pass: Option<Instant> = None;
        loop {
            if let Some(last_pass) = last_pass {
                tokio::select! {
                    _ = tokio::time::sleep_until(last_pass + interval) => {}
                    _ = self.signal.wait() => {}
                }
                if self.signal.is_set() {
                    tokio::time::sleep(DEBOUNCE).await;
                }
            }
            self.evaluate().await;
            last_pass = Some(Instant::now());
        }
    }

    /// One evaluation pass: read the temperature, trigger the active mode and
    /// publish the resulting state.
    pub async fn evaluate(&self) {
        let mut state = self.state.lock().await;

        let current_temp = match self.temperature.temperature(true, SENSOR_TIMEOUT).await {
            Ok(temp) => Some(temp),
            Err(err) => {
                warn!("{}: temperature unavailable: {err}", self.name);
                None
            }
        };
        *self
            .last_temperature
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = current_temp;

        let mode = self.modes.resolve(&state.current_mode);
        if let Err(err) = mode.trigger(&mut state, current_temp).await {
            error!("{}: error executing mode {}: {err}", self.name, mode.identity());
        }

        self.publish_state(&state).await;
        self.signal.clear();
    }

    /// Runs a command and publishes its echo when the handler asks for one.
    pub async fn execute(&self, command: ClimateCommand, payload: &str) -> Result<(), CommandError> {
        let payload = payload.trim();
        let echo = match command {
            ClimateCommand::Mode => self.change_mode(payload).await?,
            ClimateCommand::TempLow => self.change_temp_low(payload).await?,
            ClimateCommand::TempHigh => self.change_temp_high(payload).await?,
            ClimateCommand::Away => self.change_away_mode(payload).await?,
        };

        if echo {
            let command_topic = self.topics.command(command);
            self.publish(
                state_topic_of(&command_topic),
                payload.as_bytes().to_vec(),
                true,
                SETPOINT_PUBLISH_TIMEOUT,
            )
            .await;
        }
        Ok(())
    }

    /// Routes an incoming broker message. Returns `false` for topics this
    /// controller does not own.
    pub async fn handle_message(&self, topic: &str, payload: &[u8]) -> bool {
        if topic == self.topics.state {
            self.restore(payload).await;
            return true;
        }

        let Some(command) = self.topics.command_for(topic) else {
            return false;
        };
        let Ok(payload) = std::str::from_utf8(payload) else {
            warn!("{}: non utf8 payload on {topic}", self.name);
            return true;
        };
        if let Err(err) = self.execute(command, payload).await {
            warn!("{}: {} command rejected: {err}", self.name, command.as_str());
        }
        true
    }

    pub async fn change_mode(&self, mode: &str) -> Result<bool, CommandError> {
        let Some(target) = self.modes.get(mode) else {
            return Err(CommandError::invalid(format!("mode {mode} not supported")));
        };

        let mut state = self.state.lock().await;
        if state.current_mode == mode {
            return Ok(false);
        }

        let current = self.modes.resolve(&state.current_mode);
        match current.deactivate(&mut state).await {
            Ok(true) => {}
            Ok(false) => {
                warn!("{}: mode {} refused to deactivate", self.name, current.identity());
                return Ok(false);
            }
            Err(err) => {
                error!("{}: error deactivating mode {}: {err}", self.name, current.identity());
                return Ok(false);
            }
        }

        match target.activate(&mut state).await {
            Ok(true) => state.current_mode = mode.to_string(),
            outcome => {
                if let Err(err) = outcome {
                    error!("{}: error activating mode {mode}: {err}", self.name);
                }
                warn!("{}: mode {mode} not activated, falling back to {MODE_OFF}", self.name);
                state.current_mode = MODE_OFF.to_string();
                if let Err(err) = self.modes.off().activate(&mut state).await {
                    error!("{}: error activating mode {MODE_OFF}: {err}", self.name);
                }
            }
        }
        self.signal.set();
        Ok(false)
    }

    pub async fn change_temp_high(&self, payload: &str) -> Result<bool, CommandError> {
        let value = self.parse_setpoint(payload)?;
        self.state.lock().await.set_temp_high(value);
        self.signal.set();
        Ok(true)
    }

    pub async fn change_temp_low(&self, payload: &str) -> Result<bool, CommandError> {
        let value = self.parse_setpoint(payload)?;
        self.state.lock().await.set_temp_low(value);
        self.signal.set();
        Ok(true)
    }

    pub async fn change_away_mode(&self, payload: &str) -> Result<bool, CommandError> {
        let Some(away) = self.network.parse_switch(payload) else {
            return Err(CommandError::invalid(format!("unsupported payload {payload}")));
        };
        if self.state.lock().await.set_away(away) {
            self.signal.set();
        }
        Ok(false)
    }

    pub fn discovery(&self) -> ClimateDiscovery {
        ClimateDiscovery::new(ClimateDescriptor {
            name: &self.name,
            friendly_name: self.config.friendly_name.as_deref(),
            device_id: &self.network.device_id,
            base_topic: &self.topics.base,
            availability_topic: &self.topics.availability,
            temperature_topic: self.temperature.temperature_topic(),
            temperature_template: self.temperature.temperature_template(),
            temp_step: self.config.temp_step,
            min_temp: self.config.min_temp,
            max_temp: self.config.max_temp,
            precision: self.config.precision,
            modes: self.modes.names(),
            device: DeviceInfo::new(&self.network.device_id, env!("CARGO_PKG_VERSION")),
        })
    }

    pub fn discovery_topic(&self) -> String {
        discovery_topic(
            &self.network.discovery_prefix,
            "climate",
            &self.network.device_id,
            &self.name,
        )
    }

    pub async fn publish_discovery(&self) {
        match serde_json::to_vec(&self.discovery()) {
            Ok(payload) => {
                self.publish(
                    &self.discovery_topic(),
                    payload,
                    true,
                    DISCOVERY_PUBLISH_TIMEOUT,
                )
                .await
            }
            Err(err) => warn!("{}: discovery serialization failed: {err}", self.name),
        }
    }

    async fn restore(&self, payload: &[u8]) {
        if self
            .recovery
            .compare_exchange(
                RECOVERY_WAITING,
                RECOVERY_RESTORING,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            debug!("{}: ignoring state snapshot after recovery", self.name);
            return;
        }
        self.unsubscribe_state().await;

        match StateSnapshot::parse(payload) {
            Ok(snapshot) => {
                let mode = self.state.lock().await.merge(
                    snapshot,
                    self.config.min_temp,
                    self.config.max_temp,
                );
                if let Some(mode) = mode {
                    if let Err(err) = self.change_mode(&mode).await {
                        error!("{}: restoring mode failed: {err}", self.name);
                    }
                }
                info!("{}: state restored", self.name);
            }
            Err(err) => warn!("{}: discarding unreadable state snapshot: {err}", self.name),
        }

        self.recovery.store(RECOVERY_DONE, Ordering::Release);
        self.signal.set();
    }

    async fn unsubscribe_state(&self) {
        if let Err(err) = self.broker.unsubscribe(&self.topics.state).await {
            warn!("{}: unsubscribing {} failed: {err}", self.name, self.topics.state);
        }
    }

    fn parse_setpoint(&self, payload: &str) -> Result<f32, CommandError> {
        let value = payload
            .trim()
            .parse::<f32>()
            .map_err(|_| CommandError::invalid(format!("{payload} is not a temperature")))?;
        let (min, max) = (self.config.min_temp, self.config.max_temp);
        if !value.is_finite() || value < min || value > max {
            return Err(CommandError::invalid(format!(
                "can't set temp to {value}, allowed range is {min} to {max}"
            )));
        }
        Ok(value)
    }

    fn last_temperature(&self) -> Option<f32> {
        *self
            .last_temperature
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    async fn publish_setpoints(&self) {
        let (high, low) = {
            let state = self.state.lock().await;
            (state.current_temp_high, state.current_temp_low)
        };
        self.publish_setpoint_values(high, low).await;
    }

    async fn publish_setpoint_values(&self, high: f32, low: f32) {
        self.publish(
            &self.topics.temp_high,
            high.to_string().into_bytes(),
            true,
            SETPOINT_PUBLISH_TIMEOUT,
        )
        .await;
        self.publish(
            &self.topics.temp_low,
            low.to_string().into_bytes(),
            true,
            SETPOINT_PUBLISH_TIMEOUT,
        )
        .await;
    }

    async fn publish_state(&self, state: &ClimateState) {
        self.publish_setpoint_values(state.current_temp_high, state.current_temp_low)
            .await;
        match serde_json::to_vec(state) {
            Ok(payload) => {
                self.publish(&self.topics.state, payload, true, STATE_PUBLISH_TIMEOUT)
                    .await
            }
            Err(err) => warn!("{}: state serialization failed: {err}", self.name),
        }
        self.publish(
            &self.topics.action,
            state.current_action.as_str().as_bytes().to_vec(),
            false,
            SETPOINT_PUBLISH_TIMEOUT,
        )
        .await;
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool, timeout: Duration) {
        if let Err(err) = self.broker.publish(topic, payload, retain, timeout).await {
            warn!("{}: publish to {topic} failed: {err}", self.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use smartnode_common::{broker::MemoryBroker, ClimateAction, ModeError, MODE_HEAT};

    use super::*;
    use crate::{
        modes::{self, Mode},
        testing::{FakeHeater, FakeTemperature},
    };

    const SNAPSHOT: &[u8] = br#"{"mode": "heat", "action": "idle", "away": "OFF", "temp_high": 24, "temp_low": 20, "storage_temp_high": 24, "storage_temp_low": 20, "storage_away_temp_high": 16.5, "storage_away_temp_low": 16}"#;

    struct Fixture {
        controller: Arc<ClimateController>,
        broker: Arc<MemoryBroker>,
        heater: Arc<FakeHeater>,
        sensor: Arc<FakeTemperature>,
    }

    fn network() -> NetworkConfig {
        NetworkConfig {
            device_id: "node1".to_string(),
            ..NetworkConfig::default()
        }
    }

    fn fixture() -> Fixture {
        let broker = Arc::new(MemoryBroker::new());
        let heater = Arc::new(FakeHeater::default());
        let sensor = Arc::new(FakeTemperature::reading(21.0));
        let controller = ClimateController::with_capabilities(
            ClimateConfig::default(),
            network(),
            sensor.clone(),
            heater.clone(),
            broker.clone(),
        )
        .unwrap();

        Fixture {
            controller: Arc::new(controller),
            broker,
            heater,
            sensor,
        }
    }

    fn mark_recovered(controller: &ClimateController) {
        controller.recovery.store(RECOVERY_DONE, Ordering::Release);
    }

    #[tokio::test]
    async fn temp_high_above_max_is_rejected() {
        let Fixture {
            controller, broker, ..
        } = fixture();

        let result = controller.execute(ClimateCommand::TempHigh, "30").await;

        assert!(matches!(result, Err(CommandError::InvalidArgument(_))));
        assert_eq!(controller.state().await.current_temp_high, 22.0);
        assert!(!controller.signal.is_set());
        assert!(broker.published().is_empty());
    }

    #[tokio::test]
    async fn non_numeric_setpoint_is_rejected() {
        let Fixture { controller, .. } = fixture();

        let result = controller.execute(ClimateCommand::TempLow, "warm").await;

        assert!(matches!(result, Err(CommandError::InvalidArgument(_))));
        assert_eq!(controller.state().await.current_temp_low, 20.0);
    }

    #[tokio::test]
    async fn setpoint_change_is_echoed_and_signalled() {
        let Fixture {
            controller, broker, ..
        } = fixture();

        controller
            .execute(ClimateCommand::TempHigh, "23.5")
            .await
            .unwrap();

        let echo = broker.last_message("home/node1/Climate0/temp_high").unwrap();
        assert_eq!(echo.payload, b"23.5".to_vec());
        assert!(echo.retain);
        assert!(controller.signal.is_set());
        let state = controller.state().await;
        assert_eq!(state.current_temp_high, 23.5);
        assert_eq!(state.storage_temp_high, 23.5);
    }

    #[tokio::test]
    async fn repeated_away_command_does_not_signal() {
        let Fixture { controller, .. } = fixture();

        controller.execute(ClimateCommand::Away, "ON").await.unwrap();
        assert!(controller.signal.is_set());
        let state = controller.state().await;
        assert!(state.away_active);
        assert_eq!(
            (state.current_temp_low, state.current_temp_high),
            (16.0, 16.5)
        );

        controller.signal.clear();
        controller.execute(ClimateCommand::Away, "on").await.unwrap();
        assert!(!controller.signal.is_set());
    }

    #[tokio::test]
    async fn unknown_away_payload_is_rejected() {
        let Fixture { controller, .. } = fixture();

        let result = controller.execute(ClimateCommand::Away, "maybe").await;

        assert!(matches!(result, Err(CommandError::InvalidArgument(_))));
        assert!(!controller.state().await.away_active);
    }

    #[tokio::test]
    async fn unsupported_mode_is_rejected() {
        let Fixture { controller, .. } = fixture();

        let result = controller.execute(ClimateCommand::Mode, "cool").await;

        assert!(matches!(result, Err(CommandError::InvalidArgument(_))));
        assert_eq!(controller.state().await.current_mode, MODE_OFF);
        assert!(!controller.signal.is_set());
    }

    #[tokio::test]
    async fn mode_change_activates_without_echo() {
        let Fixture {
            controller, broker, ..
        } = fixture();

        controller.execute(ClimateCommand::Mode, "heat").await.unwrap();

        assert_eq!(controller.state().await.current_mode, MODE_HEAT);
        assert!(controller.signal.is_set());
        assert!(broker.payloads("home/node1/Climate0/mode").is_empty());
    }

    struct Refusing;

    #[async_trait]
    impl Mode for Refusing {
        fn identity(&self) -> &str {
            MODE_HEAT
        }

        async fn trigger(
            &self,
            _state: &mut ClimateState,
            _current_temp: Option<f32>,
        ) -> Result<(), ModeError> {
            Ok(())
        }

        async fn activate(&self, _state: &mut ClimateState) -> Result<bool, ModeError> {
            Ok(false)
        }

        async fn deactivate(&self, _state: &mut ClimateState) -> Result<bool, ModeError> {
            Ok(true)
        }
    }

    struct SlowOff;

    #[async_trait]
    impl Mode for SlowOff {
        fn identity(&self) -> &str {
            MODE_OFF
        }

        async fn trigger(
            &self,
            _state: &mut ClimateState,
            _current_temp: Option<f32>,
        ) -> Result<(), ModeError> {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(())
        }

        async fn activate(&self, _state: &mut ClimateState) -> Result<bool, ModeError> {
            Ok(true)
        }

        async fn deactivate(&self, _state: &mut ClimateState) -> Result<bool, ModeError> {
            Ok(true)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn command_during_evaluation_rearms_signal() {
        let slow: Box<dyn Mode> = Box::new(SlowOff);
        let controller = Arc::new(
            ClimateController::with_modes(
                ClimateConfig::default(),
                network(),
                Arc::new(FakeTemperature::reading(21.0)),
                ModeSet::from_modes(vec![slow]).unwrap(),
                Arc::new(MemoryBroker::new()),
            )
            .unwrap(),
        );

        let evaluation = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.evaluate().await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        let command = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.change_temp_high("23").await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!command.is_finished());

        evaluation.await.unwrap();
        assert!(command.await.unwrap().unwrap());

        assert!(controller.signal.is_set());
        assert_eq!(controller.state().await.current_temp_high, 23.0);
    }

    #[tokio::test]
    async fn failed_activation_falls_back_to_off() {
        let heater = Arc::new(FakeHeater::on());
        let off = modes::lookup(MODE_OFF).unwrap()(heater.clone());
        let refusing: Box<dyn Mode> = Box::new(Refusing);
        let modes = ModeSet::from_modes(vec![refusing, off]).unwrap();
        let controller = ClimateController::with_modes(
            ClimateConfig::default(),
            network(),
            Arc::new(FakeTemperature::reading(21.0)),
            modes,
            Arc::new(MemoryBroker::new()),
        )
        .unwrap();

        let echo = controller.change_mode(MODE_HEAT).await.unwrap();

        assert!(!echo);
        let state = controller.state().await;
        assert_eq!(state.current_mode, MODE_OFF);
        assert_eq!(state.current_action, ClimateAction::Off);
        assert!(!heater.is_on());
        assert!(controller.signal.is_set());
    }

    #[tokio::test(start_paused = true)]
    async fn recovery_applies_retained_snapshot() {
        let Fixture {
            controller, broker, ..
        } = fixture();
        let state_topic = controller.topics().state.clone();

        let recovery = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.recover().await })
        };
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(broker.is_subscribed(&state_topic));

        assert!(controller.handle_message(&state_topic, SNAPSHOT).await);
        recovery.await.unwrap();

        let state = controller.state().await;
        assert_eq!(state.current_mode, MODE_HEAT);
        assert_eq!(state.current_temp_high, 24.0);
        assert!(controller.is_recovered());
        assert!(controller.signal.is_set());
        assert!(broker.was_unsubscribed(&state_topic));
        assert_eq!(
            broker.last_payload("home/node1/Climate0/temp_high").as_deref(),
            Some("24")
        );
        assert_eq!(
            broker.last_payload("home/node1/Climate0/temp_low").as_deref(),
            Some("20")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn recovery_without_snapshot_keeps_defaults() {
        let Fixture {
            controller, broker, ..
        } = fixture();
        let started = Instant::now();

        controller.recover().await;

        assert!(started.elapsed() <= Duration::from_secs(4));
        assert!(controller.is_recovered());
        assert_eq!(controller.state().await.current_mode, MODE_OFF);
        assert!(broker.was_unsubscribed(&controller.topics().state));
        assert_eq!(
            broker.last_payload("home/node1/Climate0/temp_low").as_deref(),
            Some("20")
        );
    }

    #[tokio::test]
    async fn snapshot_after_recovery_is_ignored() {
        let Fixture {
            controller, heater, ..
        } = fixture();
        let state_topic = controller.topics().state.clone();

        controller.handle_message(&state_topic, SNAPSHOT).await;
        let restored = controller.state().await;
        let switches = heater.switch_count();
        controller.signal.clear();

        controller.handle_message(&state_topic, SNAPSHOT).await;
        controller
            .handle_message(&state_topic, br#"{"mode": "off", "temp_high": 26}"#)
            .await;

        assert_eq!(controller.state().await, restored);
        assert_eq!(heater.switch_count(), switches);
        assert!(!controller.signal.is_set());
    }

    #[tokio::test]
    async fn unreadable_snapshot_behaves_like_first_boot() {
        let Fixture { controller, .. } = fixture();
        let state_topic = controller.topics().state.clone();

        controller.handle_message(&state_topic, b"not json").await;

        assert!(controller.is_recovered());
        assert_eq!(controller.state().await.current_mode, MODE_OFF);
    }

    #[tokio::test]
    async fn evaluation_publishes_state_and_clears_signal() {
        let Fixture {
            controller,
            broker,
            heater,
            sensor,
        } = fixture();
        controller.change_mode(MODE_HEAT).await.unwrap();
        sensor.set(19.0);
        assert!(controller.signal.is_set());

        controller.evaluate().await;

        assert!(heater.is_on());
        assert!(!controller.signal.is_set());
        let state: serde_json::Value = serde_json::from_str(
            &broker.last_payload("home/node1/Climate0/state").unwrap(),
        )
        .unwrap();
        assert_eq!(state["action"], "heating");
        assert_eq!(state["mode"], "heat");
        assert_eq!(
            broker.last_payload("home/node1/Climate0/action").as_deref(),
            Some("heating")
        );
        assert_eq!(controller.status().await.current_temp, Some(19.0));
    }

    #[tokio::test]
    async fn strategy_error_does_not_stop_publishing() {
        let broker = Arc::new(MemoryBroker::new());
        let heater = Arc::new(FakeHeater::on());
        let controller = ClimateController::with_capabilities(
            ClimateConfig::default(),
            network(),
            Arc::new(FakeTemperature::default()),
            heater.clone(),
            broker.clone(),
        )
        .unwrap();
        controller.change_mode(MODE_HEAT).await.unwrap();

        controller.evaluate().await;

        assert!(!heater.is_on());
        assert_eq!(
            broker.last_payload("home/node1/Climate0/action").as_deref(),
            Some("idle")
        );
        assert!(broker
            .last_payload("home/node1/Climate0/state")
            .is_some());
    }

    #[tokio::test]
    async fn publish_failures_are_not_fatal() {
        let Fixture {
            controller, broker, ..
        } = fixture();
        broker.set_fail_publish(true);

        controller.evaluate().await;
        controller
            .execute(ClimateCommand::TempLow, "18")
            .await
            .unwrap();

        assert_eq!(controller.state().await.current_temp_low, 18.0);
    }

    #[tokio::test(start_paused = true)]
    async fn paired_setpoints_coalesce_into_one_pass() {
        let Fixture {
            controller, sensor, ..
        } = fixture();
        mark_recovered(&controller);

        let task = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.run().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(sensor.read_count(), 1);

        controller
            .execute(ClimateCommand::TempLow, "18")
            .await
            .unwrap();
        controller
            .execute(ClimateCommand::TempHigh, "19")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(sensor.read_count(), 1);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(sensor.read_count(), 2);
        assert!(!controller.signal.is_set());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(sensor.read_count(), 2);

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(sensor.read_count(), 3);

        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn interval_passes_are_not_debounced() {
        let Fixture {
            controller, sensor, ..
        } = fixture();
        mark_recovered(&controller);

        let task = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.run().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(sensor.read_count(), 1);

        tokio::time::sleep(Duration::from_millis(300_100)).await;
        assert_eq!(sensor.read_count(), 2);

        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn loop_waits_for_recovery_guard() {
        let Fixture {
            controller, sensor, ..
        } = fixture();

        let task = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.run().await })
        };
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(sensor.read_count(), 0);

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(sensor.read_count(), 1);

        task.abort();
    }

    #[tokio::test]
    async fn foreign_topics_are_not_handled() {
        let Fixture { controller, .. } = fixture();

        assert!(!controller.handle_message("home/node1/Climate1/mode/set", b"heat").await);
        assert!(controller.handle_message("home/node1/Climate0/mode/set", b"heat").await);
        assert_eq!(controller.state().await.current_mode, MODE_HEAT);
    }

    #[tokio::test]
    async fn commands_are_subscribed() {
        let Fixture {
            controller, broker, ..
        } = fixture();

        controller.subscribe_commands().await.unwrap();

        for topic in controller.topics().command_topics() {
            assert!(broker.is_subscribed(&topic));
        }
    }

    #[tokio::test]
    async fn discovery_is_published_retained() {
        let Fixture {
            controller, broker, ..
        } = fixture();

        controller.publish_discovery().await;

        let message = broker
            .last_message("homeassistant/climate/node1/Climate0/config")
            .unwrap();
        assert!(message.retain);
        let payload: serde_json::Value = serde_json::from_slice(&message.payload).unwrap();
        assert_eq!(payload["~"], "home/node1/Climate0");
        assert_eq!(payload["current_temperature_topic"], "home/test/temperature");
        assert_eq!(payload["modes"], serde_json::json!(["off", "heat"]));
        assert_eq!(payload["avty_t"], "home/node1/status");
    }

    #[test]
    fn construction_requires_matching_capabilities() {
        let mut components = Components::new();
        components.register_switch("heater", Arc::new(FakeHeater::default()));
        components.register_switch("remote-temperature", Arc::new(FakeHeater::default()));

        let result = ClimateController::new(
            ClimateConfig::default(),
            network(),
            &components,
            Arc::new(MemoryBroker::new()),
        );

        assert!(matches!(
            result,
            Err(ConfigError::MissingTemperatureCapability(_))
        ));
    }
}
