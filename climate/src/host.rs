use std::{collections::HashMap, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rumqttc::{Event, EventLoop, Incoming};
use serde::Serialize;
use tokio::{net::TcpListener, sync::mpsc};
use tracing::{debug, info, warn};

use smartnode_common::{
    availability_topic, mqtt::MqttBroker, Broker, ClimateCommand, ConfigStore, RuntimeConfig,
    STATUS_ONLINE,
};

use crate::{
    controller::ClimateController,
    devices::{RelaySwitch, RemoteTemperature},
    registry::Components,
};

const MAX_MQTT_PAYLOAD_BYTES: usize = 1024;
const STATUS_PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_HTTP_PORT: u16 = 8080;
const COMMAND_QUEUE_DEPTH: usize = 64;

#[derive(Clone)]
struct AppState {
    controller: Arc<ClimateController>,
}

#[derive(Debug)]
struct InboundMessage {
    topic: String,
    payload: Vec<u8>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
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

    let client_id = format!("{}-climate", runtime.network.device_id);
    let (broker, eventloop) = MqttBroker::connect(&runtime.network, &client_id);
    let broker: Arc<dyn Broker> = Arc::new(broker);

    let remote = Arc::new(RemoteTemperature::new(&runtime.remote_sensor));
    let relay = Arc::new(RelaySwitch::new(
        &runtime.network,
        &runtime.heater.name,
        broker.clone(),
    ));
    let mut components = Components::new();
    components.register_temperature_sensor(runtime.remote_sensor.name.clone(), remote.clone());
    components.register_switch(runtime.heater.name.clone(), relay);

    let controller = Arc::new(
        ClimateController::new(
            runtime.climate.clone(),
            runtime.network.clone(),
            &components,
            broker.clone(),
        )
        .context("failed to build climate controller")?,
    );

    let commands = spawn_command_task(controller.clone());
    spawn_mqtt_loop(commands, remote.clone(), eventloop);

    broker
        .subscribe(remote.topic())
        .await
        .context("failed to subscribe remote temperature topic")?;
    controller
        .subscribe_commands()
        .await
        .context("failed to subscribe climate command topics")?;
    broker
        .publish(
            &availability_topic(&runtime.network.home_topic, &runtime.network.device_id),
            STATUS_ONLINE.into(),
            true,
            STATUS_PUBLISH_TIMEOUT,
        )
        .await
        .context("failed to publish online status")?;

    spawn_controller(controller.clone(), runtime.climate.discover);

    let app = Router::new()
        .route("/api/status", get(handle_get_status))
        .route("/api/mode", post(handle_set_mode))
        .route("/api/temp_low", post(handle_set_temp_low))
        .route("/api/temp_high", post(handle_set_temp_high))
        .route("/api/away", post(handle_set_away))
        .with_state(AppState { controller });

    let port = std::env::var("CLIMATE_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(DEFAULT_HTTP_PORT);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind climate server at {addr}"))?;

    info!("climate listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

fn spawn_mqtt_loop(
    commands: mpsc::Sender<InboundMessage>,
    remote: Arc<RemoteTemperature>,
    mut eventloop: EventLoop,
) {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    route_message(&commands, &remote, &message.topic, &message.payload);
                }
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("mqtt poll error: {err}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

fn spawn_controller(controller: Arc<ClimateController>, discover: bool) {
    {
        let controller = controller.clone();
        tokio::spawn(async move {
            if discover {
                controller.publish_discovery().await;
            }
            controller.recover().await;
        });
    }
    tokio::spawn(async move { controller.run().await });
}

/// Controller messages are handled off the poll loop: a command may wait on
/// the state lock while an evaluation waits for the next sensor message.
fn spawn_command_task(controller: Arc<ClimateController>) -> mpsc::Sender<InboundMessage> {
    let (sender, mut receiver) = mpsc::channel::<InboundMessage>(COMMAND_QUEUE_DEPTH);
    tokio::spawn(async move {
        while let Some(message) = receiver.recv().await {
            if !controller
                .handle_message(&message.topic, &message.payload)
                .await
            {
                debug!("no handler for mqtt topic {}", message.topic);
            }
        }
    });
    sender
}

fn route_message(
    commands: &mpsc::Sender<InboundMessage>,
    remote: &RemoteTemperature,
    topic: &str,
    payload: &[u8],
) {
    if payload.len() > MAX_MQTT_PAYLOAD_BYTES {
        warn!(
            "dropping oversized MQTT payload on topic {} ({} bytes)",
            topic,
            payload.len()
        );
        return;
    }

    if topic == remote.topic() {
        remote.update(payload);
        return;
    }

    let message = InboundMessage {
        topic: topic.to_string(),
        payload: payload.to_vec(),
    };
    if let Err(err) = commands.try_send(message) {
        warn!("dropping mqtt message on {topic}: {err}");
    }
}

async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.controller.status().await)
}

async fn handle_set_mode(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    run_command(&state, ClimateCommand::Mode, &params).await
}

async fn handle_set_temp_low(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    run_command(&state, ClimateCommand::TempLow, &params).await
}

async fn handle_set_temp_high(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    run_command(&state, ClimateCommand::TempHigh, &params).await
}

async fn handle_set_away(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    run_command(&state, ClimateCommand::Away, &params).await
}

async fn run_command(
    state: &AppState,
    command: ClimateCommand,
    params: &HashMap<String, String>,
) -> Response {
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };

    match state.controller.execute(command, value).await {
        Ok(()) => Json(state.controller.status().await).into_response(),
        Err(err) => error_response(StatusCode::BAD_REQUEST, &err.to_string()),
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}
