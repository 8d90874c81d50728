use std::time::Duration;

use async_trait::async_trait;

use crate::error::BrokerError;

/// Publish/subscribe surface the components need from the MQTT client.
///
/// Incoming messages are not part of this trait; the runtime that owns the
/// connection routes them to the component that subscribed.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        retain: bool,
        timeout: Duration,
    ) -> Result<(), BrokerError>;

    async fn subscribe(&self, topic: &str) -> Result<(), BrokerError>;

    async fn unsubscribe(&self, topic: &str) -> Result<(), BrokerError>;
}

#[cfg(any(test, feature = "test-util"))]
pub use memory::{MemoryBroker, Published};

#[cfg(any(test, feature = "test-util"))]
mod memory {
    use std::{
        collections::BTreeSet,
        sync::{Mutex, MutexGuard, PoisonError},
        time::Duration,
    };

    use async_trait::async_trait;

    use super::Broker;
    use crate::error::BrokerError;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Published {
        pub topic: String,
        pub payload: Vec<u8>,
        pub retain: bool,
    }

    #[derive(Debug, Default)]
    struct Inner {
        published: Vec<Published>,
        subscriptions: BTreeSet<String>,
        unsubscribed: Vec<String>,
        fail_publish: bool,
    }

    /// Records every request instead of talking to a broker.
    #[derive(Debug, Default)]
    pub struct MemoryBroker {
        inner: Mutex<Inner>,
    }

    impl MemoryBroker {
        pub fn new() -> Self {
            Self::default()
        }

        fn inner(&self) -> MutexGuard<'_, Inner> {
            self.inner.lock().unwrap_or_else(PoisonError::into_inner)
        }

        pub fn published(&self) -> Vec<Published> {
            self.inner().published.clone()
        }

        pub fn payloads(&self, topic: &str) -> Vec<String> {
            self.inner()
                .published
                .iter()
                .filter(|message| message.topic == topic)
                .map(|message| String::from_utf8_lossy(&message.payload).into_owned())
                .collect()
        }

        pub fn last_payload(&self, topic: &str) -> Option<String> {
            self.payloads(topic).pop()
        }

        pub fn last_message(&self, topic: &str) -> Option<Published> {
            self.inner()
                .published
                .iter()
                .rev()
                .find(|message| message.topic == topic)
                .cloned()
        }

        pub fn is_subscribed(&self, topic: &str) -> bool {
            self.inner().subscriptions.contains(topic)
        }

        pub fn was_unsubscribed(&self, topic: &str) -> bool {
            self.inner().unsubscribed.iter().any(|t| t == topic)
        }

        pub fn set_fail_publish(&self, fail: bool) {
            self.inner().fail_publish = fail;
        }
    }

    #[async_trait]
    impl Broker for MemoryBroker {
        async fn publish(
            &self,
            topic: &str,
            payload: Vec<u8>,
            retain: bool,
            timeout: Duration,
        ) -> Result<(), BrokerError> {
            let mut inner = self.inner();
            if inner.fail_publish {
                return Err(BrokerError::Timeout {
                    topic: topic.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            inner.published.push(Published {
                topic: topic.to_string(),
                payload,
                retain,
            });
            Ok(())
        }

        async fn subscribe(&self, topic: &str) -> Result<(), BrokerError> {
            self.inner().subscriptions.insert(topic.to_string());
            Ok(())
        }

        async fn unsubscribe(&self, topic: &str) -> Result<(), BrokerError> {
            let mut inner = self.inner();
            inner.subscriptions.remove(topic);
            inner.unsubscribed.push(topic.to_string());
            Ok(())
        }
    }
}
