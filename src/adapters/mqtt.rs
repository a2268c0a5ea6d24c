//! Broker topics, inbound routing and the MQTT transport.
//!
//! | Topic                    | Direction | Payload                     |
//! |--------------------------|-----------|-----------------------------|
//! | `machines/<id>/init`     | in        | session load                |
//! | `machines/<id>/config`   | in        | `{timestamp}` clock sync    |
//! | `machines/<id>/action`   | out, QoS 1| [`ActionEvent`]             |
//! | `machines/<id>/state`    | out, QoS 0| [`StateReport`]             |
//!
//! Inbound messages are parsed on the MQTT task and handed to the control
//! loop through [`InboundQueue`]; the loop drains it once per cycle.
//!
//! [`ActionEvent`]: crate::app::events::ActionEvent
//! [`StateReport`]: crate::app::events::StateReport

use core::fmt::Write as _;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::{error, warn};

use crate::app::commands::{InboundMessage, SessionLoad};
use crate::error::MessageError;

/// Fully-qualified topic name.
pub type Topic = heapless::String<64>;

/// Topic names for one machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    pub init: Topic,
    pub config: Topic,
    pub action: Topic,
    pub state: Topic,
}

impl Topics {
    pub fn new(machine_id: &str) -> Self {
        Self {
            init: topic(machine_id, "init"),
            config: topic(machine_id, "config"),
            action: topic(machine_id, "action"),
            state: topic(machine_id, "state"),
        }
    }

    /// Topics this machine subscribes to.
    pub fn inbound(&self) -> [&str; 2] {
        [self.init.as_str(), self.config.as_str()]
    }
}

fn topic(machine_id: &str, leaf: &str) -> Topic {
    let mut t = Topic::new();
    // Machine ids are capped well below the topic capacity.
    let _ = write!(t, "machines/{machine_id}/{leaf}");
    t
}

/// Parse an inbound publish into a controller message.
pub fn route(topics: &Topics, topic: &str, payload: &[u8]) -> Result<InboundMessage, MessageError> {
    if topic == topics.init.as_str() {
        SessionLoad::from_json(payload).map(InboundMessage::LoadSession)
    } else if topic == topics.config.as_str() {
        InboundMessage::config_from_json(payload)
    } else {
        Err(MessageError::UnknownTopic)
    }
}

// ── Inbound hand-off ──────────────────────────────────────────

/// Channel depth for inbound messages.
const INBOUND_DEPTH: usize = 8;

/// Bounded queue from the MQTT task to the control loop.
pub struct InboundQueue {
    channel: Channel<CriticalSectionRawMutex, InboundMessage, INBOUND_DEPTH>,
}

impl Default for InboundQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl InboundQueue {
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
        }
    }

    /// Route and enqueue one publish. Bad messages are logged and dropped.
    pub fn accept(&self, topics: &Topics, topic: &str, payload: &[u8]) {
        match route(topics, topic, payload) {
            Ok(msg) => {
                if self.channel.try_send(msg).is_err() {
                    warn!("mqtt: inbound queue full, dropping message on {topic}");
                }
            }
            Err(e) => error!("mqtt: dropping message on {topic}: {e}"),
        }
    }

    pub fn try_pop(&self) -> Option<InboundMessage> {
        self.channel.try_receive().ok()
    }
}

// ── ESP-IDF transport ─────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub use esp::EspMqttTransport;

#[cfg(target_os = "espidf")]
mod esp {
    use std::sync::Arc;

    use esp_idf_svc::mqtt::client::{
        EspMqttClient, EspMqttEvent, EventPayload, MqttClientConfiguration, QoS,
    };
    use log::{info, warn};

    use super::{InboundQueue, Topics};
    use crate::app::ports::{MessageTransport, Qos};
    use crate::error::PublishError;

    /// Publish side of an `EspMqttClient`.
    pub struct EspMqttTransport {
        client: EspMqttClient<'static>,
    }

    impl EspMqttTransport {
        /// Connect to `url`; inbound publishes are routed into `inbound`.
        pub fn connect(
            url: &str,
            client_id: &str,
            topics: Topics,
            inbound: Arc<InboundQueue>,
        ) -> anyhow::Result<Self> {
            let conf = MqttClientConfiguration {
                client_id: Some(client_id),
                ..Default::default()
            };
            let cb_topics = topics.clone();
            let client = EspMqttClient::new_cb(url, &conf, move |event: EspMqttEvent<'_>| {
                if let EventPayload::Received {
                    topic: Some(topic),
                    data,
                    ..
                } = event.payload()
                {
                    inbound.accept(&cb_topics, topic, data);
                }
            })?;
            let mut transport = Self { client };
            for t in topics.inbound() {
                transport.client.subscribe(t, QoS::AtLeastOnce)?;
                info!("mqtt: subscribed to {t}");
            }
            Ok(transport)
        }
    }

    impl MessageTransport for EspMqttTransport {
        fn publish(&mut self, topic: &str, payload: &[u8], qos: Qos) -> Result<(), PublishError> {
            let qos = match qos {
                Qos::AtMostOnce => QoS::AtMostOnce,
                Qos::AtLeastOnce => QoS::AtLeastOnce,
            };
            self.client
                .enqueue(topic, qos, false, payload)
                .map(|_| ())
                .map_err(|e| {
                    warn!("mqtt: enqueue on {topic} failed: {e}");
                    PublishError::Transport
                })
        }
    }
}
