//! Resource payloads.
//!
//! Serialized with the PascalCase field names used on the OI4 bus.

use crate::identifier::Oi4Identifier;
use crate::types::{PublicationMode, ResourceType};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Text with a locale, e.g. `{"Locale": "en-US", "Text": "Widget"}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedText {
    /// Locale tag
    #[serde(rename = "Locale")]
    pub locale: String,
    /// Text
    #[serde(rename = "Text")]
    pub text: String,
}

impl LocalizedText {
    /// Create a localized text.
    #[must_use]
    pub fn new(locale: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
            text: text.into(),
        }
    }
}

/// Master asset model: the identity card of an application or asset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MasterAssetModel {
    /// Manufacturer name
    pub manufacturer: LocalizedText,
    /// Manufacturer URI
    pub manufacturer_uri: String,
    /// Model designation
    pub model: LocalizedText,
    /// Product code
    pub product_code: String,
    /// Hardware revision
    pub hardware_revision: String,
    /// Software revision
    pub software_revision: String,
    /// Device revision
    pub device_revision: String,
    /// Link to the device manual
    pub device_manual: String,
    /// Device class
    pub device_class: String,
    /// Serial number
    pub serial_number: String,
    /// Unique product instance URI
    pub product_instance_uri: String,
    /// Revision counter
    pub revision_counter: i32,
    /// Description
    pub description: LocalizedText,
}

impl MasterAssetModel {
    /// Identifier derived from this model.
    #[must_use]
    pub fn identifier(&self) -> Oi4Identifier {
        Oi4Identifier::from(self)
    }
}

/// Health state of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HealthState {
    /// Operating normally
    #[serde(rename = "NORMAL_0")]
    Normal,
    /// Failed
    #[serde(rename = "FAILURE_1")]
    Failure,
    /// Function check in progress
    #[serde(rename = "CHECK_FUNCTION_2")]
    CheckFunction,
    /// Operating outside specification
    #[serde(rename = "OFF_SPEC_3")]
    OffSpec,
    /// Maintenance required
    #[serde(rename = "MAINTENANCE_REQUIRED_4")]
    MaintenanceRequired,
}

/// Health resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    /// State
    #[serde(rename = "Health")]
    pub state: HealthState,
    /// Score 0..=100
    #[serde(rename = "HealthScore")]
    pub score: u8,
}

impl Health {
    /// Create a health value.
    #[must_use]
    pub fn new(state: HealthState, score: u8) -> Self {
        Self { state, score }
    }

    /// Normal state with full score.
    #[must_use]
    pub fn normal() -> Self {
        Self::new(HealthState::Normal, 100)
    }
}

impl Default for Health {
    fn default() -> Self {
        Self::normal()
    }
}

/// One licensed component.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseComponent {
    /// Component name
    #[serde(rename = "Component")]
    pub component: String,
    /// Authors
    #[serde(rename = "LicAuthors", default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    /// Additional text
    #[serde(rename = "LicAddText", default, skip_serializing_if = "String::is_empty")]
    pub additional_text: String,
    /// SPDX license id
    #[serde(rename = "SPDXIdentifier", default, skip_serializing_if = "String::is_empty")]
    pub spdx_identifier: String,
}

/// License resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct License {
    /// Licensed components
    #[serde(rename = "Components")]
    pub components: Vec<LicenseComponent>,
}

/// License text resource, one per license (filter).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseText {
    /// Full text
    #[serde(rename = "LicenseText")]
    pub text: String,
}

/// Runtime license resource.
///
/// The content is vendor specific and passed through as a JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RtLicense(pub Map<String, Value>);

/// Config resource: the configuration groups of a source.
///
/// The content is vendor specific and passed through as a JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublishConfig(pub Map<String, Value>);

/// Profile resource: the resources a source supports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Supported resources
    #[serde(rename = "Resources")]
    pub resources: Vec<ResourceType>,
}

impl Profile {
    /// Profile of an application source.
    #[must_use]
    pub fn application() -> Self {
        Self {
            resources: vec![
                ResourceType::Mam,
                ResourceType::Health,
                ResourceType::License,
                ResourceType::LicenseText,
                ResourceType::PublicationList,
                ResourceType::SubscriptionList,
                ResourceType::Profile,
            ],
        }
    }

    /// Profile of an asset (device) source.
    #[must_use]
    pub fn device() -> Self {
        Self {
            resources: vec![
                ResourceType::Mam,
                ResourceType::Health,
                ResourceType::PublicationList,
                ResourceType::ReferenceDesignation,
                ResourceType::Profile,
            ],
        }
    }

    /// Add `resource` unless it is already listed.
    #[must_use]
    pub fn with(mut self, resource: ResourceType) -> Self {
        if !self.supports(resource) {
            self.resources.push(resource);
        }
        self
    }

    /// Whether `resource` is part of this profile.
    #[must_use]
    pub fn supports(&self, resource: ResourceType) -> bool {
        self.resources.contains(&resource)
    }
}

/// Which publication settings may be changed remotely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(non_camel_case_types)]
pub enum PublicationListConfig {
    /// Nothing
    NONE_0,
    /// Mode only
    MODE_1,
    /// Interval only
    INTERVAL_2,
    /// Mode and interval
    MODE_AND_INTERVAL_3,
}

/// One entry of the `PublicationList` resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicationListEntry {
    /// Published resource
    #[serde(rename = "Resource")]
    pub resource: ResourceType,
    /// Source wire identifier
    #[serde(rename = "Source")]
    pub source: String,
    /// Filter, if any
    #[serde(rename = "Filter", default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    /// Writer id of the stream
    #[serde(rename = "DataSetWriterId")]
    pub data_set_writer_id: u16,
    /// Wire mode
    #[serde(rename = "Mode")]
    pub mode: PublicationMode,
    /// Interval in milliseconds
    #[serde(rename = "Interval", default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<u32>,
    /// Remotely configurable settings
    #[serde(
        rename = "PublicationConfig",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub config: Option<PublicationListConfig>,
}

/// Subscription configurability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(non_camel_case_types)]
pub enum SubscriptionListConfig {
    /// Not configurable
    NONE_0,
    /// Configurable
    CONF_1,
}

/// One entry of the `SubscriptionList` resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionListEntry {
    /// Subscribed topic filter
    #[serde(rename = "TopicPath")]
    pub topic_path: String,
    /// Interval in milliseconds
    #[serde(rename = "Interval")]
    pub interval: u32,
    /// Configurability
    #[serde(rename = "Config")]
    pub config: SubscriptionListConfig,
}

/// Parent of a reference designation element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceDesignationParent {
    /// Designation value
    #[serde(rename = "Value")]
    pub value: String,
    /// Local designation
    #[serde(rename = "Local", default, skip_serializing_if = "String::is_empty")]
    pub local: String,
    /// Identifier of the parent source
    #[serde(rename = "Oi4Identifier", default, skip_serializing_if = "Option::is_none")]
    pub oi4_identifier: Option<String>,
}

/// Product or location aspect of a reference designation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceDesignationAspect {
    /// Designation value
    #[serde(rename = "Value")]
    pub value: String,
    /// Local designation
    #[serde(rename = "Local", default, skip_serializing_if = "String::is_empty")]
    pub local: String,
    /// Parent element
    #[serde(rename = "Parent", default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<ReferenceDesignationParent>,
}

/// Function aspect of a reference designation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceDesignationFunction {
    /// Designation value
    #[serde(rename = "Value")]
    pub value: String,
    /// Local designation
    #[serde(rename = "Local", default, skip_serializing_if = "String::is_empty")]
    pub local: String,
    /// Parent element
    #[serde(rename = "Parent", default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<ReferenceDesignationParent>,
    /// Product aspect
    #[serde(rename = "Product", default, skip_serializing_if = "Option::is_none")]
    pub product: Option<ReferenceDesignationAspect>,
    /// Location aspect
    #[serde(rename = "Location", default, skip_serializing_if = "Option::is_none")]
    pub location: Option<ReferenceDesignationAspect>,
}

/// Reference designation resource of an asset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceDesignation {
    /// Function aspect
    #[serde(rename = "Function", default, skip_serializing_if = "Option::is_none")]
    pub function: Option<ReferenceDesignationFunction>,
}
