//! Subscriptions of an application to topics of other applications.
//!
//! Registered subscriptions are subscribed while the application is started
//! and listed in its `SubscriptionList` resource.

use oi4_edge_core::model::{SubscriptionListConfig, SubscriptionListEntry};
use oi4_edge_proto::{NetworkMessage, Topic};
use rumqttc::QoS;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

/// Callback for decoded inbound messages of a subscription.
pub type SubscriptionHandler = Arc<dyn Fn(&Topic, &NetworkMessage) + Send + Sync>;

/// A topic filter with its handler.
#[derive(Clone)]
pub struct Subscription {
    topic: String,
    qos: QoS,
    interval: Duration,
    config: SubscriptionListConfig,
    skip_own_messages: bool,
    handler: SubscriptionHandler,
}

impl Subscription {
    /// Subscribe to `topic` (an MQTT filter, wildcards allowed).
    ///
    /// Defaults: QoS 1, no interval, remotely configurable, own messages
    /// skipped.
    #[must_use]
    pub fn new(topic: impl Into<String>, handler: SubscriptionHandler) -> Self {
        Self {
            topic: topic.into(),
            qos: QoS::AtLeastOnce,
            interval: Duration::ZERO,
            config: SubscriptionListConfig::CONF_1,
            skip_own_messages: true,
            handler,
        }
    }

    /// Set the QoS.
    #[must_use]
    pub fn with_qos(mut self, qos: QoS) -> Self {
        self.qos = qos;
        self
    }

    /// Set the expected message interval.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the configurability.
    #[must_use]
    pub fn with_config(mut self, config: SubscriptionListConfig) -> Self {
        self.config = config;
        self
    }

    /// Also deliver messages published by the application itself.
    #[must_use]
    pub fn with_skip_own_messages(mut self, skip: bool) -> Self {
        self.skip_own_messages = skip;
        self
    }

    /// Topic filter, also the registration key.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// QoS.
    #[must_use]
    pub fn qos(&self) -> QoS {
        self.qos
    }

    /// Whether messages of the application itself are dropped.
    #[must_use]
    pub fn skips_own_messages(&self) -> bool {
        self.skip_own_messages
    }

    /// Handler of decoded messages.
    #[must_use]
    pub fn handler(&self) -> &SubscriptionHandler {
        &self.handler
    }

    /// `SubscriptionList` entry describing this subscription.
    #[must_use]
    pub fn list_entry(&self) -> SubscriptionListEntry {
        SubscriptionListEntry {
            topic_path: self.topic.clone(),
            interval: u32::try_from(self.interval.as_millis()).unwrap_or(u32::MAX),
            config: self.config,
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("qos", &self.qos)
            .field("interval", &self.interval)
            .field("config", &self.config)
            .field("skip_own_messages", &self.skip_own_messages)
            .finish_non_exhaustive()
    }
}

/// Subscriptions keyed by topic filter.
#[derive(Debug, Default)]
pub struct SubscriptionSet {
    by_topic: RwLock<BTreeMap<String, Arc<Subscription>>>,
}

impl SubscriptionSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `subscription`, returning the one with the same topic it
    /// replaces.
    pub fn insert(&self, subscription: Arc<Subscription>) -> Option<Arc<Subscription>> {
        self.by_topic
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(subscription.topic().to_string(), subscription)
    }

    /// Remove the subscription of `topic`.
    pub fn remove(&self, topic: &str) -> Option<Arc<Subscription>> {
        self.by_topic
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(topic)
    }

    /// Subscription of `topic`.
    #[must_use]
    pub fn get(&self, topic: &str) -> Option<Arc<Subscription>> {
        self.by_topic
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic)
            .cloned()
    }

    /// All subscriptions, ordered by topic.
    #[must_use]
    pub fn all(&self) -> Vec<Arc<Subscription>> {
        self.by_topic
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}
