//! Closed vocabularies of the OI4 message bus.
//!
//! Service types, methods and resources appear as topic segments and are
//! parsed strictly: an unknown token is an error carrying the raw token.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Service type of an OI4 application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceType {
    /// Registry
    Registry,
    /// OT connector
    #[serde(rename = "OTConnector")]
    OtConnector,
    /// Utility
    Utility,
    /// Persistence
    Persistence,
    /// Aggregation
    Aggregation,
    /// OOC connector
    #[serde(rename = "OOCConnector")]
    OocConnector,
    /// IT connector
    #[serde(rename = "ITConnector")]
    ItConnector,
}

impl ServiceType {
    /// Topic token of this service type.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Registry => "Registry",
            Self::OtConnector => "OTConnector",
            Self::Utility => "Utility",
            Self::Persistence => "Persistence",
            Self::Aggregation => "Aggregation",
            Self::OocConnector => "OOCConnector",
            Self::ItConnector => "ITConnector",
        }
    }
}

impl FromStr for ServiceType {
    type Err = ParseTokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Registry" => Ok(Self::Registry),
            "OTConnector" => Ok(Self::OtConnector),
            "Utility" => Ok(Self::Utility),
            "Persistence" => Ok(Self::Persistence),
            "Aggregation" => Ok(Self::Aggregation),
            "OOCConnector" => Ok(Self::OocConnector),
            "ITConnector" => Ok(Self::ItConnector),
            _ => Err(ParseTokenError::new("ServiceType", s)),
        }
    }
}

/// Method segment of a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MethodType {
    /// Request a resource
    Get,
    /// Publish a resource
    Pub,
    /// Set a resource
    Set,
    /// Delete a resource
    Del,
    /// Call a method
    Call,
    /// Reply to a call
    Reply,
}

impl MethodType {
    /// Topic token of this method.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "Get",
            Self::Pub => "Pub",
            Self::Set => "Set",
            Self::Del => "Del",
            Self::Call => "Call",
            Self::Reply => "Reply",
        }
    }
}

impl FromStr for MethodType {
    type Err = ParseTokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Get" => Ok(Self::Get),
            "Pub" => Ok(Self::Pub),
            "Set" => Ok(Self::Set),
            "Del" => Ok(Self::Del),
            "Call" => Ok(Self::Call),
            "Reply" => Ok(Self::Reply),
            _ => Err(ParseTokenError::new("MethodType", s)),
        }
    }
}

/// Resource published by a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceType {
    /// Master asset model
    #[serde(rename = "MAM")]
    Mam,
    /// Health state
    Health,
    /// Configuration
    Config,
    /// License overview
    License,
    /// License text, filtered by license
    LicenseText,
    /// Runtime license
    RtLicense,
    /// Process data, filtered by tag
    Data,
    /// Metadata of process data
    Metadata,
    /// Event
    Event,
    /// Supported resources
    Profile,
    /// Publications of a source
    PublicationList,
    /// Subscriptions of a source
    SubscriptionList,
    /// Interfaces
    Interfaces,
    /// Reference designation
    ReferenceDesignation,
}

impl ResourceType {
    /// All resource types in declaration order.
    pub const ALL: [Self; 14] = [
        Self::Mam,
        Self::Health,
        Self::Config,
        Self::License,
        Self::LicenseText,
        Self::RtLicense,
        Self::Data,
        Self::Metadata,
        Self::Event,
        Self::Profile,
        Self::PublicationList,
        Self::SubscriptionList,
        Self::Interfaces,
        Self::ReferenceDesignation,
    ];

    /// Topic token of this resource.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mam => "MAM",
            Self::Health => "Health",
            Self::Config => "Config",
            Self::License => "License",
            Self::LicenseText => "LicenseText",
            Self::RtLicense => "RtLicense",
            Self::Data => "Data",
            Self::Metadata => "Metadata",
            Self::Event => "Event",
            Self::Profile => "Profile",
            Self::PublicationList => "PublicationList",
            Self::SubscriptionList => "SubscriptionList",
            Self::Interfaces => "Interfaces",
            Self::ReferenceDesignation => "ReferenceDesignation",
        }
    }

    /// Fixed `DataSetClassId` of this resource.
    ///
    /// Data and Metadata are described per source and have no fixed class.
    #[must_use]
    pub fn data_set_class_id(self) -> Option<&'static str> {
        match self {
            Self::Mam => Some("360ca8f3-5e66-42a2-8f10-9cdf45f4bf58"),
            Self::Health => Some("d8e7b6df-42ba-448a-975a-199f59e8ffeb"),
            Self::Config => Some("9d5983db-440d-4474-9fd7-1cd7a6c8b6c2"),
            Self::License => Some("2ae0505e-2830-4980-b65e-0bbdf08e2d45"),
            Self::LicenseText => Some("a6e6c727-4057-419f-b2ea-3fe9173e71cf"),
            Self::RtLicense => Some("ebd12d4b-da1c-4671-ab86-db102fecc603"),
            Self::Event => Some("543ae05e-b6d9-4161-a0a3-350a0fac5976"),
            Self::Profile => Some("48017c6a-05c8-48d7-9d85-4b08bbb707f3"),
            Self::PublicationList => Some("217434d6-6e1e-4230-b907-f52bc9ffe152"),
            Self::SubscriptionList => Some("e5d68c47-c276-4929-8ab9-4c1090cac785"),
            Self::Interfaces => Some("96d22d73-bce6-42d3-9949-45e0d04e4d54"),
            Self::ReferenceDesignation => Some("27a75019-164a-496d-a38b-90e8a55c2cfa"),
            Self::Data | Self::Metadata => None,
        }
    }
}

impl FromStr for ResourceType {
    type Err = ParseTokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|resource| resource.as_str() == s)
            .ok_or_else(|| ParseTokenError::new("ResourceType", s))
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for MethodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// OPC UA status code attached to a `DataSetMessage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCode(pub u32);

impl StatusCode {
    /// The operation succeeded
    pub const GOOD: Self = Self(0x0000_0000);
    /// The operation was uncertain
    pub const UNCERTAIN: Self = Self(0x4000_0000);
    /// The operation failed
    pub const BAD: Self = Self(0x8000_0000);
    /// An unexpected error occurred
    pub const BAD_UNEXPECTED_ERROR: Self = Self(0x8001_0000);
    /// An internal error occurred
    pub const BAD_INTERNAL_ERROR: Self = Self(0x8002_0000);
    /// Not enough memory to complete the operation
    pub const BAD_OUT_OF_MEMORY: Self = Self(0x8003_0000);
    /// An operating system resource is not available
    pub const BAD_RESOURCE_UNAVAILABLE: Self = Self(0x8004_0000);
    /// A low level communication error occurred
    pub const BAD_COMMUNICATION_ERROR: Self = Self(0x8005_0000);

    /// Severity bits say good.
    #[must_use]
    pub fn is_good(self) -> bool {
        self.0 & 0xC000_0000 == 0
    }

    /// Severity bits say bad.
    #[must_use]
    pub fn is_bad(self) -> bool {
        self.0 & 0x8000_0000 != 0
    }
}

/// Tag distinguishing several instances of one resource on one source.
///
/// Examples: a data tag, a license-text language.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filter(String);

impl Filter {
    /// Create a filter.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Filter value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Filter {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Filter {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Whether and how a publication fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Delivery {
    /// Never published periodically; requested and changed content is
    /// still sent
    Off,
    /// Published only when requested (Get) or on change
    OnRequest,
    /// Additionally published periodically
    Active,
}

/// Which parts address a publication in its topic.
///
/// The application identifier is always part of the topic; these flags
/// decide whether the source identifier and the filter follow it.
///
/// The filter segment can only follow a source segment. With [`Filter`] or
/// [`ApplicationFilter`] the filter is therefore carried in the message
/// payload only.
///
/// [`Filter`]: Addressing::Filter
/// [`ApplicationFilter`]: Addressing::ApplicationFilter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Addressing {
    /// Application only
    Application,
    /// Source only
    Source,
    /// Filter only
    Filter,
    /// Application and source
    ApplicationSource,
    /// Application and filter
    ApplicationFilter,
    /// Source and filter
    SourceFilter,
    /// Application, source and filter
    ApplicationSourceFilter,
}

impl Addressing {
    /// Source identifier is appended to the topic.
    #[must_use]
    pub fn includes_source(self) -> bool {
        matches!(
            self,
            Self::Source | Self::ApplicationSource | Self::SourceFilter | Self::ApplicationSourceFilter
        )
    }

    /// Filter is addressed; it appears in the topic only after a source.
    #[must_use]
    pub fn includes_filter(self) -> bool {
        matches!(
            self,
            Self::Filter | Self::ApplicationFilter | Self::SourceFilter | Self::ApplicationSourceFilter
        )
    }
}

/// OI4 publication mode as exchanged in `PublicationList` entries.
///
/// On the wire the mode is one flat enum; internally it is split into
/// [`Delivery`] and [`Addressing`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(non_camel_case_types)]
pub enum PublicationMode {
    /// Off
    OFF_0,
    /// On request only
    ON_REQUEST_1,
    /// Application addressed
    APPLICATION_2,
    /// Source addressed
    SOURCE_3,
    /// Filter addressed
    FILTER_4,
    /// Application and source addressed
    APPLICATION_SOURCE_5,
    /// Application and filter addressed
    APPLICATION_FILTER_6,
    /// Source and filter addressed
    SOURCE_FILTER_7,
    /// Application, source and filter addressed
    APPLICATION_SOURCE_FILTER_8,
}

impl PublicationMode {
    /// Combine delivery and addressing into the wire mode.
    #[must_use]
    pub fn compose(delivery: Delivery, addressing: Addressing) -> Self {
        match delivery {
            Delivery::Off => Self::OFF_0,
            Delivery::OnRequest => Self::ON_REQUEST_1,
            Delivery::Active => match addressing {
                Addressing::Application => Self::APPLICATION_2,
                Addressing::Source => Self::SOURCE_3,
                Addressing::Filter => Self::FILTER_4,
                Addressing::ApplicationSource => Self::APPLICATION_SOURCE_5,
                Addressing::ApplicationFilter => Self::APPLICATION_FILTER_6,
                Addressing::SourceFilter => Self::SOURCE_FILTER_7,
                Addressing::ApplicationSourceFilter => Self::APPLICATION_SOURCE_FILTER_8,
            },
        }
    }

    /// Split the wire mode.
    ///
    /// `OFF_0` and `ON_REQUEST_1` carry no addressing.
    #[must_use]
    pub fn split(self) -> (Delivery, Option<Addressing>) {
        match self {
            Self::OFF_0 => (Delivery::Off, None),
            Self::ON_REQUEST_1 => (Delivery::OnRequest, None),
            Self::APPLICATION_2 => (Delivery::Active, Some(Addressing::Application)),
            Self::SOURCE_3 => (Delivery::Active, Some(Addressing::Source)),
            Self::FILTER_4 => (Delivery::Active, Some(Addressing::Filter)),
            Self::APPLICATION_SOURCE_5 => (Delivery::Active, Some(Addressing::ApplicationSource)),
            Self::APPLICATION_FILTER_6 => (Delivery::Active, Some(Addressing::ApplicationFilter)),
            Self::SOURCE_FILTER_7 => (Delivery::Active, Some(Addressing::SourceFilter)),
            Self::APPLICATION_SOURCE_FILTER_8 => {
                (Delivery::Active, Some(Addressing::ApplicationSourceFilter))
            }
        }
    }
}

/// Error for an unknown closed-vocabulary token.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot parse:[{value}] as {kind}")]
pub struct ParseTokenError {
    /// Vocabulary name
    pub kind: &'static str,
    /// Offending raw token
    pub value: String,
}

impl ParseTokenError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
