use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, EventLoop, LastWill, MqttOptions, QoS};

use crate::{
    broker::Broker,
    config::NetworkConfig,
    error::BrokerError,
    topics::{availability_topic, STATUS_OFFLINE},
};

const REQUEST_CAPACITY: usize = 64;

/// `Broker` backed by a rumqttc client. The caller owns the event loop.
#[derive(Clone)]
pub struct MqttBroker {
    client: AsyncClient,
}

impl MqttBroker {
    pub fn connect(network: &NetworkConfig, client_id: &str) -> (Self, EventLoop) {
        let mut options = MqttOptions::new(client_id, network.mqtt_host.clone(), network.mqtt_port);
        options.set_keep_alive(Duration::from_secs(30));
        if !network.mqtt_user.is_empty() {
            options.set_credentials(network.mqtt_user.clone(), network.mqtt_pass.clone());
        }
        options.set_last_will(LastWill::new(
            availability_topic(&network.home_topic, &network.device_id),
            STATUS_OFFLINE,
            QoS::AtLeastOnce,
            true,
        ));

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        (Self { client }, eventloop)
    }
}

#[async_trait]
impl Broker for MqttBroker {
    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        retain: bool,
        timeout: Duration,
    ) -> Result<(), BrokerError> {
        match tokio::time::timeout(
            timeout,
            self.client
                .publish(topic, QoS::AtLeastOnce, retain, payload),
        )
        .await
        {
            Ok(result) => result.map_err(|err| BrokerError::Client(err.to_string())),
            Err(_) => Err(BrokerError::Timeout {
                topic: topic.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    async fn subscribe(&self, topic: &str) -> Result<(), BrokerError> {
        self.client
            .subscribe(topic, QoS::AtLeastOnce)
            .await
            .map_err(|err| BrokerError::Client(err.to_string()))
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), BrokerError> {
        self.client
            .unsubscribe(topic)
            .await
            .map_err(|err| BrokerError::Client(err.to_string()))
    }
}
