use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::Context;
use async_trait::async_trait;
use rumqttc::{Event, EventLoop, Incoming};
use tracing::{info, warn};

use smartnode_common::{
    availability_topic, mqtt::MqttBroker, ActuatorError, Broker, ConfigStore, RuntimeConfig,
    SensorError, STATUS_ONLINE,
};

use crate::{
    capability::{CutoffOutput, VoltageSource},
    event::ThresholdEvent,
    monitor::ThresholdMonitor,
};

const STATUS_PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

/// Stand-in for the ADC pin on a host build: a slow discharge that wraps
/// around once it has dipped below the usual low bound.
#[derive(Debug, Default)]
struct SimulatedAdc {
    tick: AtomicU64,
}

#[async_trait]
impl VoltageSource for SimulatedAdc {
    async fn read_voltage(&self) -> Result<f64, SensorError> {
        let tick = self.tick.fetch_add(1, Ordering::Relaxed);
        Ok(5.6 - (tick % 600) as f64 * 0.003)
    }
}

/// Cutoff that only reports what a relay would do.
#[derive(Debug, Default)]
struct LoggedCutoff {
    engaged: AtomicBool,
}

impl CutoffOutput for LoggedCutoff {
    fn set_engaged(&self, engaged: bool) -> Result<(), ActuatorError> {
        if self.engaged.swap(engaged, Ordering::AcqRel) != engaged {
            info!("cutoff output {}", if engaged { "engaged" } else { "released" });
        }
        Ok(())
    }

    fn is_engaged(&self) -> bool {
        self.engaged.load(Ordering::Acquire)
    }
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = ConfigStore::from_env();
    let mut runtime = store.load_runtime_config().await.unwrap_or_else(|err| {
        warn!("failed to load runtime config from store: {err:#}");
        RuntimeConfig::default()
    });
    runtime.network.apply_env();

    let client_id = format!("{}-battery", runtime.network.device_id);
    let (broker, eventloop) = MqttBroker::connect(&runtime.network, &client_id);
    let broker: Arc<dyn Broker> = Arc::new(broker);
    spawn_mqtt_loop(eventloop);

    broker
        .publish(
            &availability_topic(&runtime.network.home_topic, &runtime.network.device_id),
            STATUS_ONLINE.into(),
            true,
            STATUS_PUBLISH_TIMEOUT,
        )
        .await
        .context("failed to publish battery online status")?;

    let cutoff: Option<Arc<dyn CutoffOutput>> = if runtime.battery.cutoff_enabled {
        Some(Arc::new(LoggedCutoff::default()))
    } else {
        None
    };
    let monitor = ThresholdMonitor::new(
        runtime.battery.clone(),
        runtime.network.clone(),
        Arc::new(SimulatedAdc::default()),
        cutoff,
        broker,
    )
    .context("failed to build battery monitor")?;

    monitor.publish_discovery().await;
    spawn_low_voltage_log(&monitor);

    info!("battery monitor started on {}", monitor.topic());
    monitor.run().await;
    Ok(())
}

fn spawn_mqtt_loop(mut eventloop: EventLoop) {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => info!("mqtt connected"),
                Ok(_) => {}
                Err(err) => {
                    warn!("battery mqtt poll error: {err}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

fn spawn_low_voltage_log(monitor: &ThresholdMonitor) {
    let handle = monitor.handle();
    let low = Arc::new(ThresholdEvent::new());
    handle.register_low(low.clone());
    tokio::spawn(async move {
        loop {
            let voltage = low.wait().await;
            warn!(
                "battery at {voltage} V, below {} V",
                handle.voltage_min()
            );
        }
    });
}
