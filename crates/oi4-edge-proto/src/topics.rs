//! OI4 topic scheme.
//!
//! Segment layout (fixed positions):
//!
//! | index | content                         |
//! |-------|---------------------------------|
//! | 0     | namespace `Oi4`                 |
//! | 1     | service type                    |
//! | 2..6  | publisher identifier            |
//! | 6     | method                          |
//! | 7     | resource                        |
//! | 8..12 | source identifier (optional)    |
//! | 12    | category (optional)             |
//! | 13    | filter (optional)               |

use oi4_edge_core::types::ParseTokenError;
use oi4_edge_core::{Filter, IdentifierError, MethodType, Oi4Identifier, ResourceType, ServiceType};
use std::fmt;

/// Topic namespace.
pub const NAMESPACE: &str = "Oi4";

const MIN_SEGMENTS: usize = 8;

/// A parsed or to-be-built OI4 topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    /// Service type of the publisher
    pub service_type: ServiceType,
    /// Publisher (application) identifier
    pub publisher: Oi4Identifier,
    /// Method
    pub method: MethodType,
    /// Resource
    pub resource: ResourceType,
    /// Source identifier
    pub source: Option<Oi4Identifier>,
    /// Category, only written after a source
    pub category: Option<String>,
    /// Filter, only written after a source
    pub filter: Option<Filter>,
}

impl Topic {
    /// Create a topic with the mandatory segments.
    #[must_use]
    pub fn new(
        service_type: ServiceType,
        publisher: Oi4Identifier,
        method: MethodType,
        resource: ResourceType,
    ) -> Self {
        Self {
            service_type,
            publisher,
            method,
            resource,
            source: None,
            category: None,
            filter: None,
        }
    }

    /// Set the source identifier.
    #[must_use]
    pub fn with_source(mut self, source: Oi4Identifier) -> Self {
        self.source = Some(source);
        self
    }

    /// Set the category.
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Set the filter.
    #[must_use]
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Parse a topic string.
    ///
    /// Identifier segments are DNP-decoded; category and filter are taken
    /// verbatim. A topic with exactly 13 segments carries a category.
    ///
    /// # Errors
    ///
    /// Returns a [`TopicError`] naming the first failing segment.
    pub fn parse(topic: &str) -> Result<Self, TopicError> {
        if topic.is_empty() {
            return Err(TopicError::Empty);
        }

        let parts: Vec<&str> = topic.split('/').collect();
        if parts.len() < MIN_SEGMENTS {
            return Err(TopicError::TooFewParts);
        }
        if parts[0] != NAMESPACE {
            return Err(TopicError::WrongNamespace);
        }

        let service_type = parts[1]
            .parse::<ServiceType>()
            .map_err(TopicError::InvalidServiceType)?;
        let publisher =
            Oi4Identifier::parse_parts(&parts[2..6], true).map_err(TopicError::InvalidIdentifier)?;
        let method = parts[6]
            .parse::<MethodType>()
            .map_err(TopicError::InvalidMethod)?;
        let resource = parts[7]
            .parse::<ResourceType>()
            .map_err(TopicError::InvalidResource)?;

        let source = if parts.len() >= 12 {
            Some(Oi4Identifier::parse_parts(&parts[8..12], true).map_err(TopicError::InvalidSource)?)
        } else {
            None
        };

        Ok(Self {
            service_type,
            publisher,
            method,
            resource,
            source,
            category: parts.get(12).map(|s| (*s).to_string()),
            filter: parts.get(13).map(|s| Filter::from(*s)),
        })
    }

    /// Subscription filter for Get requests addressed to `application`.
    #[must_use]
    pub fn get_request_filter(service_type: ServiceType, application: &Oi4Identifier) -> String {
        format!(
            "{NAMESPACE}/{}/{}/{}/#",
            service_type,
            application.to_wire_string(),
            MethodType::Get
        )
    }

    /// Whether this topic belongs to the given application.
    ///
    /// Identifiers are compared in wire form, so the manufacturer URI
    /// compares case-insensitively.
    #[must_use]
    pub fn has_same_application(&self, service_type: ServiceType, application: &Oi4Identifier) -> bool {
        self.service_type == service_type
            && self.publisher.to_wire_string() == application.to_wire_string()
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{NAMESPACE}/{}/{}/{}/{}",
            self.service_type,
            self.publisher.to_wire_string(),
            self.method,
            self.resource
        )?;

        if let Some(source) = &self.source {
            write!(f, "/{}", source.to_wire_string())?;
            if let Some(category) = &self.category {
                write!(f, "/{category}")?;
            }
            if let Some(filter) = &self.filter {
                write!(f, "/{filter}")?;
            }
        }
        Ok(())
    }
}

/// Errors that can occur parsing topics.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopicError {
    /// Empty topic string
    #[error("topic is empty")]
    Empty,
    /// First segment is not `Oi4`
    #[error("invalid topic, wrong namespace")]
    WrongNamespace,
    /// Fewer than eight segments
    #[error("invalid topic, too few parts")]
    TooFewParts,
    /// Unknown service type
    #[error("invalid service type: {0}")]
    InvalidServiceType(#[source] ParseTokenError),
    /// Publisher identifier failed to parse
    #[error("invalid oi4 identifier: {0}")]
    InvalidIdentifier(#[source] IdentifierError),
    /// Unknown method
    #[error("invalid method type: {0}")]
    InvalidMethod(#[source] ParseTokenError),
    /// Unknown resource
    #[error("invalid resource type: {0}")]
    InvalidResource(#[source] ParseTokenError),
    /// Source identifier failed to parse
    #[error("invalid source: {0}")]
    InvalidSource(#[source] IdentifierError),
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = "Oi4/OTConnector/acme.com/FBC/fbc,25183z/FBC,23123/Get/MAM/acme.com/matches/m,2F42-A/F234,23862/Category/Filter";

    fn app_id() -> Oi4Identifier {
        Oi4Identifier::new("acme.com", "FBC", "fbc%183z", "FBC#123")
    }

    fn source_id() -> Oi4Identifier {
        Oi4Identifier::new("acme.com", "matches", "m/42-A", "F234#862")
    }

    fn base() -> Topic {
        Topic::new(
            ServiceType::OtConnector,
            app_id(),
            MethodType::Get,
            ResourceType::Mam,
        )
    }

    #[test]
    fn build_required_only() {
        assert_eq!(
            base().to_string(),
            "Oi4/OTConnector/acme.com/FBC/fbc,25183z/FBC,23123/Get/MAM"
        );
    }

    #[test]
    fn build_with_all_fields() {
        let topic = base()
            .with_source(source_id())
            .with_category("Category")
            .with_filter(Filter::new("Filter"));
        assert_eq!(topic.to_string(), FULL);
    }

    #[test]
    fn category_and_filter_need_a_source() {
        let topic = base()
            .with_category("Category")
            .with_filter(Filter::new("Filter"));
        assert_eq!(
            topic.to_string(),
            "Oi4/OTConnector/acme.com/FBC/fbc,25183z/FBC,23123/Get/MAM"
        );
    }

    #[test]
    fn parse_full_topic() {
        let topic = Topic::parse(FULL).unwrap();
        assert_eq!(topic.service_type, ServiceType::OtConnector);
        assert_eq!(topic.publisher, app_id());
        assert_eq!(topic.method, MethodType::Get);
        assert_eq!(topic.resource, ResourceType::Mam);
        assert_eq!(topic.source, Some(source_id()));
        assert_eq!(topic.category.as_deref(), Some("Category"));
        assert_eq!(topic.filter, Some(Filter::new("Filter")));
    }

    #[test]
    fn parse_build_roundtrip() {
        let topic = base().with_source(source_id());
        assert_eq!(Topic::parse(&topic.to_string()).unwrap(), topic);
    }

    #[test]
    fn parse_errors() {
        assert_eq!(Topic::parse(""), Err(TopicError::Empty));
        assert_eq!(
            Topic::parse("Oi4/OTConnector/acme.com/FBC/fbc%183z/FBC#123"),
            Err(TopicError::TooFewParts)
        );
        assert_eq!(
            Topic::parse(&FULL.replacen("Oi4", "Invalid", 1)),
            Err(TopicError::WrongNamespace)
        );
    }

    #[test]
    fn parse_error_messages_name_segment() {
        let cases = [
            (
                FULL.replace("OTConnector", "InvalidServiceType"),
                "invalid service type: cannot parse:[InvalidServiceType] as ServiceType",
            ),
            (
                "Oi4/OTConnector/invalid/identifier/here/,,/Get/MAM/acme.com/matches/m,2F42-A/F234,23862/Category/Filter".to_string(),
                "invalid oi4 identifier: invalid serial number: invalid DNP escape \",,\"",
            ),
            (
                FULL.replace("/Get/", "/InvalidMethod/"),
                "invalid method type: cannot parse:[InvalidMethod] as MethodType",
            ),
            (
                FULL.replace("/MAM/", "/InvalidResource/"),
                "invalid resource type: cannot parse:[InvalidResource] as ResourceType",
            ),
            (
                "Oi4/OTConnector/acme.com/FBC/fbc,25183z/FBC,23123/Get/MAM/invalid/source/here/,,/Category/Filter".to_string(),
                "invalid source: invalid serial number: invalid DNP escape \",,\"",
            ),
        ];

        for (topic, expected) in cases {
            assert_eq!(Topic::parse(&topic).unwrap_err().to_string(), expected);
        }
    }

    #[test]
    fn get_request_filter_and_own_application() {
        let filter = Topic::get_request_filter(ServiceType::Utility, &app_id());
        assert_eq!(filter, "Oi4/Utility/acme.com/FBC/fbc,25183z/FBC,23123/Get/#");

        let topic = Topic::new(
            ServiceType::Utility,
            Oi4Identifier::new("ACME.com", "FBC", "fbc%183z", "FBC#123"),
            MethodType::Pub,
            ResourceType::Health,
        );
        assert!(topic.has_same_application(ServiceType::Utility, &app_id()));
        assert!(!topic.has_same_application(ServiceType::Registry, &app_id()));
        assert!(!topic.has_same_application(ServiceType::Utility, &source_id()));
    }
}
