use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::flush::FlushController;
use crate::telemetry::Record;

/// Delay after an event-loop error before polling again
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Broker connection settings
#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub topic: String,
    pub client_id: String,
    pub keep_alive: Duration,
}

/// Message-bus ingress: one serialized record per publish
pub struct MqttIngest {
    settings: MqttSettings,
    controller: Arc<FlushController>,
}

impl MqttIngest {
    pub fn new(settings: MqttSettings, controller: Arc<FlushController>) -> Self {
        Self {
            settings,
            controller,
        }
    }

    /// Parse one payload and buffer it. Malformed payloads are logged and
    /// dropped. Returns the buffer length after insertion.
    pub async fn handle_payload(&self, payload: &[u8]) -> Option<usize> {
        let record = match Record::parse(payload) {
            Ok(record) => record,
            Err(e) => {
                warn!("Discarding MQTT message: {}", e);
                return None;
            }
        };

        let entry = match record.to_entry() {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Failed to serialize record from MQTT: {}", e);
                return None;
            }
        };

        match self.controller.insert(entry).await {
            Ok(len) => {
                self.controller.spawn_flush(len);
                Some(len)
            }
            Err(e) => {
                error!("Failed to buffer MQTT record: {}", e);
                None
            }
        }
    }

    /// Poll the broker forever. Connection errors back off and retry;
    /// rumqttc reconnects on the next poll.
    pub async fn run(self) {
        let mut options = MqttOptions::new(
            self.settings.client_id.clone(),
            self.settings.host.clone(),
            self.settings.port,
        );
        options.set_keep_alive(self.settings.keep_alive);

        let (client, mut eventloop) = AsyncClient::new(options, 100);
        info!(
            "MQTT ingest connecting to {}:{} (topic: {})",
            self.settings.host, self.settings.port, self.settings.topic
        );

        loop {
            if let Err(e) = self.poll_once(&client, &mut eventloop).await {
                error!("MQTT connection error: {}; retrying in {:?}", e, RECONNECT_DELAY);
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }

    async fn poll_once(&self, client: &AsyncClient, eventloop: &mut EventLoop) -> anyhow::Result<()> {
        match eventloop.poll().await? {
            Event::Incoming(Packet::ConnAck(_)) => {
                info!("Connected to MQTT broker");
                // Subscriptions do not survive a reconnect with a clean session
                client
                    .subscribe(self.settings.topic.clone(), QoS::AtLeastOnce)
                    .await?;
            }
            Event::Incoming(Packet::Publish(publish)) => {
                debug!(
                    "Received message on {} ({} bytes)",
                    publish.topic,
                    publish.payload.len()
                );
                self.handle_payload(&publish.payload).await;
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{MemoryBuffer, SharedBuffer};
    use crate::flush::FlushConfig;
    use crate::storage::MemoryRecordStore;
    use crate::sync::{BroadcastDispatcher, SubscriptionRegistry};

    fn ingest() -> (MqttIngest, Arc<MemoryBuffer>) {
        let buffer = Arc::new(MemoryBuffer::new());
        let controller = Arc::new(FlushController::new(
            buffer.clone(),
            Arc::new(MemoryRecordStore::new()),
            BroadcastDispatcher::new(SubscriptionRegistry::new()),
            FlushConfig {
                batch_size: 100,
                ..FlushConfig::default()
            },
        ));
        let settings = MqttSettings {
            host: "localhost".to_string(),
            port: 1883,
            topic: "processed_agent_data_topic".to_string(),
            client_id: "test".to_string(),
            keep_alive: Duration::from_secs(30),
        };
        (MqttIngest::new(settings, controller), buffer)
    }

    #[tokio::test]
    async fn test_valid_payload_is_buffered() {
        let (ingest, buffer) = ingest();
        let payload = br#"{"road_state":"bump","agent_data":{"user_id":3,"accelerometer":{"x":1,"y":2,"z":3},"gps":{"latitude":50.1,"longitude":30.2},"timestamp":"2024-02-01T10:00:00"}}"#;

        assert_eq!(ingest.handle_payload(payload).await, Some(1));
        assert_eq!(buffer.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_malformed_payload_leaves_buffer_untouched() {
        let (ingest, buffer) = ingest();

        assert_eq!(ingest.handle_payload(b"not json").await, None);
        assert_eq!(
            ingest
                .handle_payload(br#"{"road_state":"gravel","agent_data":{}}"#)
                .await,
            None
        );
        assert_eq!(buffer.len().await.unwrap(), 0);
    }
}
