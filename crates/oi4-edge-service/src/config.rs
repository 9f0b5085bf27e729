//! Agent configuration.

use crate::application::ApplicationConfig;
use crate::scheduler::SchedulerConfig;
use crate::transport::MqttConfig;
use anyhow::{Context, Result};
use oi4_edge_core::model::{LocalizedText, MasterAssetModel};
use oi4_edge_core::ServiceType;
use std::time::Duration;

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Service type announced on the bus
    pub service_type: ServiceType,

    /// Manufacturer URI of the application
    pub manufacturer_uri: String,

    /// Model designation
    pub model: String,

    /// Product code
    pub product_code: String,

    /// Serial number
    pub serial_number: String,

    /// MQTT connection
    pub mqtt: MqttConfig,

    /// Interval of health publications
    pub health_interval: Duration,

    /// Interval scheduler tuning
    pub scheduler: SchedulerConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        let serial_number = "0001".to_string();
        Self {
            service_type: ServiceType::Utility,
            manufacturer_uri: "example.com".to_string(),
            model: "oi4-edge".to_string(),
            product_code: "OI4-EDGE".to_string(),
            mqtt: MqttConfig {
                client_id: default_client_id(&serial_number),
                ..MqttConfig::default()
            },
            serial_number,
            health_interval: Duration::from_secs(60),
            scheduler: SchedulerConfig::default(),
        }
    }
}

fn default_client_id(serial_number: &str) -> String {
    format!("oi4-edge-{serial_number}")
}

impl AgentConfig {
    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `OI4_SERVICE_TYPE`: Service type, e.g. `Utility` or `OTConnector`
    /// - `OI4_MANUFACTURER_URI`, `OI4_MODEL`, `OI4_PRODUCT_CODE`,
    ///   `OI4_SERIAL_NUMBER`: Application identity
    /// - `OI4_MQTT_BROKER`: MQTT broker URL
    /// - `OI4_MQTT_USERNAME`, `OI4_MQTT_PASSWORD`: Broker credentials
    /// - `OI4_CLIENT_ID`: MQTT client id (default `oi4-edge-{serial}`)
    /// - `OI4_HEALTH_INTERVAL_SECS`: Health publication interval
    /// - `OI4_SCHEDULER_WORKERS`, `OI4_SCHEDULER_QUEUE_SIZE`: Scheduler pool
    ///
    /// # Errors
    ///
    /// Returns error if a variable holds an invalid value.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns error if a variable holds an invalid value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(service_type) = lookup("OI4_SERVICE_TYPE") {
            config.service_type = service_type
                .parse()
                .context("Invalid OI4_SERVICE_TYPE")?;
        }

        if let Some(uri) = lookup("OI4_MANUFACTURER_URI") {
            config.manufacturer_uri = uri;
        }

        if let Some(model) = lookup("OI4_MODEL") {
            config.model = model;
        }

        if let Some(code) = lookup("OI4_PRODUCT_CODE") {
            config.product_code = code;
        }

        if let Some(serial) = lookup("OI4_SERIAL_NUMBER") {
            config.serial_number = serial;
        }

        config.mqtt.client_id =
            lookup("OI4_CLIENT_ID").unwrap_or_else(|| default_client_id(&config.serial_number));

        if let Some(broker) = lookup("OI4_MQTT_BROKER") {
            config.mqtt.broker = broker;
        }

        config.mqtt.username = lookup("OI4_MQTT_USERNAME");
        config.mqtt.password = lookup("OI4_MQTT_PASSWORD");

        if let Some(secs) = lookup("OI4_HEALTH_INTERVAL_SECS") {
            let secs: u64 = secs.parse().context("Invalid OI4_HEALTH_INTERVAL_SECS")?;
            anyhow::ensure!(secs > 0, "OI4_HEALTH_INTERVAL_SECS must be positive");
            config.health_interval = Duration::from_secs(secs);
        }

        if let Some(workers) = lookup("OI4_SCHEDULER_WORKERS") {
            config.scheduler.workers = workers.parse().context("Invalid OI4_SCHEDULER_WORKERS")?;
        }

        if let Some(size) = lookup("OI4_SCHEDULER_QUEUE_SIZE") {
            config.scheduler.queue_size = size.parse().context("Invalid OI4_SCHEDULER_QUEUE_SIZE")?;
        }

        Ok(config)
    }

    /// Master asset model of the application.
    #[must_use]
    pub fn master_asset_model(&self) -> MasterAssetModel {
        MasterAssetModel {
            manufacturer_uri: self.manufacturer_uri.clone(),
            model: LocalizedText::new("en-US", &self.model),
            product_code: self.product_code.clone(),
            serial_number: self.serial_number.clone(),
            software_revision: env!("CARGO_PKG_VERSION").to_string(),
            ..MasterAssetModel::default()
        }
    }

    /// Application settings derived from this configuration.
    #[must_use]
    pub fn application_config(&self) -> ApplicationConfig {
        ApplicationConfig {
            scheduler: self.scheduler.clone(),
            health_interval: self.health_interval,
        }
    }
}
