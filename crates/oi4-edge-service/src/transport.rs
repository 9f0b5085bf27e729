//! Message bus transport.
//!
//! The application talks to the bus through the [`Transport`] trait.
//! [`MqttTransport`] is the production implementation over `rumqttc`.

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use url::Url;

/// Callback for inbound messages: `(topic, payload)`.
pub type MessageHandler = Arc<dyn Fn(&str, &[u8]) + Send + Sync>;

/// Publish/subscribe access to the message bus.
///
/// Both calls must return without waiting on the network; they are invoked
/// from trigger paths and from inside message handlers.
pub trait Transport: Send + Sync {
    /// Publish `payload` on `topic`.
    ///
    /// # Errors
    ///
    /// Returns error if the message cannot be queued.
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Subscribe to `filter` and route matching messages to `handler`.
    ///
    /// # Errors
    ///
    /// Returns error if the subscription cannot be queued.
    fn subscribe(&self, filter: &str, qos: QoS, handler: MessageHandler) -> Result<(), TransportError>;

    /// Drop the subscription to `filter` and its handlers.
    ///
    /// # Errors
    ///
    /// Returns error if the request cannot be queued.
    fn unsubscribe(&self, filter: &str) -> Result<(), TransportError>;
}

/// MQTT broker settings.
#[derive(Debug, Clone)]
pub struct MqttConfig {
    /// Broker URL (`tcp://host:port`, `mqtt://host:port` or `host:port`)
    pub broker: String,
    /// Client ID for the MQTT connection
    pub client_id: String,
    /// Username, if the broker requires one
    pub username: Option<String>,
    /// Password for `username`
    pub password: Option<String>,
    /// Keep-alive interval
    pub keep_alive: Duration,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker: "tcp://localhost:1883".to_string(),
            client_id: "oi4-edge".to_string(),
            username: None,
            password: None,
            keep_alive: Duration::from_secs(30),
        }
    }
}

/// [`Transport`] over an MQTT broker.
pub struct MqttTransport {
    client: AsyncClient,
    handlers: RwLock<Vec<(String, MessageHandler)>>,
}

impl MqttTransport {
    /// Create a transport and its event loop.
    ///
    /// Nothing is sent until the event loop is driven, see
    /// [`MqttTransport::spawn_eventloop`].
    ///
    /// # Errors
    ///
    /// Returns error if the broker URL is invalid.
    pub fn new(config: &MqttConfig) -> Result<(Self, EventLoop), TransportError> {
        let (host, port) = parse_mqtt_url(&config.broker)?;

        let mut mqtt_options = MqttOptions::new(&config.client_id, host, port);
        mqtt_options.set_keep_alive(config.keep_alive);
        if let Some(username) = &config.username {
            mqtt_options.set_credentials(username, config.password.as_deref().unwrap_or_default());
        }

        let (client, eventloop) = AsyncClient::new(mqtt_options, 100);

        Ok((
            Self {
                client,
                handlers: RwLock::new(Vec::new()),
            },
            eventloop,
        ))
    }

    /// Drive `eventloop`, dispatching inbound publishes to the handlers.
    pub fn spawn_eventloop(self: &Arc<Self>, mut eventloop: EventLoop) -> JoinHandle<()> {
        let transport = Arc::clone(self);

        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        tracing::debug!(
                            topic = %publish.topic,
                            payload_len = publish.payload.len(),
                            "Received MQTT message"
                        );
                        transport.dispatch(&publish.topic, &publish.payload);
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        tracing::info!("Connected to MQTT broker");
                    }
                    Ok(Event::Incoming(Packet::SubAck(_))) => {
                        tracing::info!("Subscription acknowledged");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!(error = %e, "MQTT error");
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        })
    }

    /// Route one inbound message to every handler whose filter matches.
    pub fn dispatch(&self, topic: &str, payload: &[u8]) {
        let handlers: Vec<MessageHandler> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(filter, _)| topic_matches(filter, topic))
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        for handler in handlers {
            handler(topic, payload);
        }
    }

    /// Queue a disconnect from the broker.
    ///
    /// # Errors
    ///
    /// Returns error if the request cannot be queued.
    pub fn disconnect(&self) -> Result<(), TransportError> {
        self.client
            .try_disconnect()
            .map_err(|e| TransportError::Disconnect(e.to_string()))
    }
}

impl Transport for MqttTransport {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        self.client
            .try_publish(topic, QoS::AtLeastOnce, false, payload)
            .map_err(|e| TransportError::Publish(e.to_string()))
    }

    fn subscribe(&self, filter: &str, qos: QoS, handler: MessageHandler) -> Result<(), TransportError> {
        tracing::info!(topic = filter, "Subscribing to topic");

        self.client
            .try_subscribe(filter, qos)
            .map_err(|e| TransportError::Subscribe(e.to_string()))?;

        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((filter.to_string(), handler));
        Ok(())
    }

    fn unsubscribe(&self, filter: &str) -> Result<(), TransportError> {
        tracing::info!(topic = filter, "Unsubscribing from topic");

        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(current, _)| current != filter);

        self.client
            .try_unsubscribe(filter)
            .map_err(|e| TransportError::Unsubscribe(e.to_string()))
    }
}

/// Whether `topic` matches the MQTT subscription `filter`.
#[must_use]
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut topic_levels = topic.split('/');

    for level in filter.split('/') {
        match level {
            "#" => return true,
            "+" => {
                if topic_levels.next().is_none() {
                    return false;
                }
            }
            literal => {
                if topic_levels.next() != Some(literal) {
                    return false;
                }
            }
        }
    }

    topic_levels.next().is_none()
}

/// Parse MQTT URL into host and port.
pub(crate) fn parse_mqtt_url(input: &str) -> Result<(String, u16), TransportError> {
    if input.contains("://") {
        let url = Url::parse(input)
            .map_err(|e| TransportError::InvalidBrokerUrl(format!("{input}: {e}")))?;

        match url.scheme() {
            "tcp" | "mqtt" => {}
            scheme => {
                return Err(TransportError::InvalidBrokerUrl(format!(
                    "{input}: unsupported scheme '{scheme}'"
                )));
            }
        }

        let host = url
            .host_str()
            .ok_or_else(|| TransportError::InvalidBrokerUrl(format!("{input}: missing host")))?;
        let port = url.port().unwrap_or(1883);

        return Ok((host.to_string(), port));
    }

    let mut parts = input.split(':');
    let host = parts
        .next()
        .filter(|value| !value.is_empty())
        .ok_or_else(|| TransportError::InvalidBrokerUrl(format!("{input}: missing host")))?;
    let port = match parts.next() {
        None => 1883,
        Some(port) => port.parse().map_err(|_| {
            TransportError::InvalidBrokerUrl(format!("{input}: invalid port '{port}'"))
        })?,
    };
    if parts.next().is_some() {
        return Err(TransportError::InvalidBrokerUrl(format!(
            "{input}: too many ':' separators"
        )));
    }

    Ok((host.to_string(), port))
}

/// Errors for transport operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Invalid MQTT broker URL
    #[error("invalid MQTT broker URL: {0}")]
    InvalidBrokerUrl(String),
    /// Publish failed
    #[error("publish error: {0}")]
    Publish(String),
    /// Subscription failed
    #[error("subscription error: {0}")]
    Subscribe(String),
    /// Unsubscribe failed
    #[error("unsubscribe error: {0}")]
    Unsubscribe(String),
    /// Disconnect failed
    #[error("disconnect error: {0}")]
    Disconnect(String),
}
