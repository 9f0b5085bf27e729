//! Assembly of outbound network messages.

use crate::messages::{DataSetMessage, NetworkMessage, MESSAGE_TYPE_DATA};
use crate::topics::Topic;
use chrono::{SecondsFormat, Utc};
use oi4_edge_core::{
    Addressing, Filter, MessageIdGenerator, Oi4Identifier, ResourceType, ServiceType, StatusCode,
    WriterIdError, WriterIdRegistry,
};
use std::sync::Arc;

/// One payload of a publication with its status.
#[derive(Debug, Clone, PartialEq)]
pub struct PublicationContent {
    /// Status code, if any
    pub status: Option<StatusCode>,
    /// Payload
    pub payload: serde_json::Value,
}

/// Transient result of triggering a publication.
#[derive(Debug, Clone, PartialEq)]
pub struct PublicationMessage {
    /// Published resource
    pub resource: ResourceType,
    /// Source the content belongs to
    pub source: Oi4Identifier,
    /// Filter of the publication
    pub filter: Option<Filter>,
    /// Message id of the request being answered
    pub correlation_id: Option<String>,
    /// Topic addressing of the publication
    pub addressing: Addressing,
    /// Payloads, possibly empty
    pub content: Vec<PublicationContent>,
}

/// Builds [`NetworkMessage`]s from publication messages.
///
/// Holds the writer-id registry and message-id generator of one
/// application instance.
#[derive(Debug, Clone)]
pub struct EnvelopeBuilder {
    writer_ids: Arc<WriterIdRegistry>,
    message_ids: Arc<MessageIdGenerator>,
}

impl EnvelopeBuilder {
    /// Create a builder over shared registries.
    #[must_use]
    pub fn new(writer_ids: Arc<WriterIdRegistry>, message_ids: Arc<MessageIdGenerator>) -> Self {
        Self {
            writer_ids,
            message_ids,
        }
    }

    /// Writer-id registry used by this builder.
    #[must_use]
    pub fn writer_ids(&self) -> &Arc<WriterIdRegistry> {
        &self.writer_ids
    }

    /// `PublisherId` of an application: `{serviceType}/{wire identifier}`.
    #[must_use]
    pub fn publisher_id(service_type: ServiceType, publisher: &Oi4Identifier) -> String {
        format!("{service_type}/{}", publisher.to_wire_string())
    }

    /// Build the envelope for `message`.
    ///
    /// Returns `Ok(None)` when the message has no content.
    ///
    /// # Errors
    ///
    /// Returns error if no writer id can be allocated for the stream.
    pub fn build(
        &self,
        publisher: &Oi4Identifier,
        service_type: ServiceType,
        message: &PublicationMessage,
    ) -> Result<Option<NetworkMessage>, WriterIdError> {
        if message.content.is_empty() {
            return Ok(None);
        }

        let writer_id = self.writer_ids.writer_id(message.resource, &message.source)?;
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let source = message.source.to_wire_string();
        let filter = message.filter.as_ref().map(|f| f.as_str().to_string());

        let messages = message
            .content
            .iter()
            .map(|content| DataSetMessage {
                data_set_writer_id: writer_id,
                timestamp: Some(timestamp.clone()),
                status: content.status,
                filter: filter.clone(),
                source: source.clone(),
                payload: content.payload.clone(),
            })
            .collect();

        let publisher_id = Self::publisher_id(service_type, publisher);
        Ok(Some(NetworkMessage {
            message_id: self.message_ids.generate(&publisher_id),
            message_type: MESSAGE_TYPE_DATA.to_string(),
            publisher_id,
            data_set_class_id: message.resource.data_set_class_id().map(str::to_string),
            correlation_id: message.correlation_id.clone(),
            messages,
        }))
    }

    /// Build a Get request for `topic`.
    ///
    /// The requested filter travels in the only data set message; without a
    /// filter the request carries no messages.
    #[must_use]
    pub fn build_get(
        &self,
        publisher: &Oi4Identifier,
        service_type: ServiceType,
        topic: &Topic,
        filter: Option<&Filter>,
    ) -> NetworkMessage {
        let publisher_id = Self::publisher_id(service_type, publisher);
        let messages = filter
            .map(|filter| DataSetMessage {
                data_set_writer_id: 0,
                timestamp: None,
                status: None,
                filter: Some(filter.as_str().to_string()),
                source: topic
                    .source
                    .as_ref()
                    .map(Oi4Identifier::to_wire_string)
                    .unwrap_or_default(),
                payload: serde_json::Value::Null,
            })
            .into_iter()
            .collect();

        NetworkMessage {
            message_id: self.message_ids.generate(&publisher_id),
            message_type: MESSAGE_TYPE_DATA.to_string(),
            publisher_id,
            data_set_class_id: topic.resource.data_set_class_id().map(str::to_string),
            correlation_id: None,
            messages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use serde_json::json;

    fn builder() -> EnvelopeBuilder {
        EnvelopeBuilder::new(
            Arc::new(WriterIdRegistry::new()),
            Arc::new(MessageIdGenerator::new()),
        )
    }

    fn app() -> Oi4Identifier {
        Oi4Identifier::new("Acme.com", "app", "A 1", "001")
    }

    fn message(resource: ResourceType, content: Vec<PublicationContent>) -> PublicationMessage {
        PublicationMessage {
            resource,
            source: app(),
            filter: None,
            correlation_id: None,
            addressing: Addressing::ApplicationSource,
            content,
        }
    }

    #[test]
    fn empty_content_yields_nothing() {
        let built = builder()
            .build(&app(), ServiceType::Utility, &message(ResourceType::Health, vec![]))
            .unwrap();
        assert!(built.is_none());
    }

    #[test]
    fn envelope_fields() {
        let mut msg = message(
            ResourceType::LicenseText,
            vec![PublicationContent {
                status: Some(StatusCode::GOOD),
                payload: json!({"LicenseText": "MIT"}),
            }],
        );
        msg.filter = Some(Filter::new("en"));
        msg.correlation_id = Some("42-Registry/x/y/z/w".into());

        let built = builder()
            .build(&app(), ServiceType::Utility, &msg)
            .unwrap()
            .unwrap();

        assert_eq!(built.message_type, "ua-data");
        assert_eq!(built.publisher_id, "Utility/acme.com/app/A,201/001");
        assert!(built.message_id.ends_with("-Utility/acme.com/app/A,201/001"));
        assert_eq!(
            built.data_set_class_id.as_deref(),
            Some("a6e6c727-4057-419f-b2ea-3fe9173e71cf")
        );
        assert_eq!(built.correlation_id.as_deref(), Some("42-Registry/x/y/z/w"));

        let dsm = &built.messages[0];
        assert_eq!(dsm.data_set_writer_id, 10);
        assert_eq!(dsm.filter.as_deref(), Some("en"));
        assert_eq!(dsm.source, "acme.com/app/A,201/001");
        assert_eq!(dsm.status, Some(StatusCode::GOOD));
        assert!(DateTime::parse_from_rfc3339(dsm.timestamp.as_deref().unwrap()).is_ok());
    }

    #[test]
    fn one_data_set_message_per_content_sharing_writer_id() {
        let content = (0..3)
            .map(|i| PublicationContent {
                status: None,
                payload: json!({ "value": i }),
            })
            .collect();
        let built = builder()
            .build(&app(), ServiceType::Utility, &message(ResourceType::Data, content))
            .unwrap()
            .unwrap();

        assert_eq!(built.messages.len(), 3);
        assert!(built.data_set_class_id.is_none());
        assert!(built
            .messages
            .iter()
            .all(|m| m.data_set_writer_id == built.messages[0].data_set_writer_id));
    }

    #[test]
    fn message_ids_are_unique() {
        let builder = builder();
        let msg = message(
            ResourceType::Health,
            vec![PublicationContent {
                status: None,
                payload: json!({}),
            }],
        );
        let a = builder.build(&app(), ServiceType::Utility, &msg).unwrap().unwrap();
        let b = builder.build(&app(), ServiceType::Utility, &msg).unwrap().unwrap();
        assert_ne!(a.message_id, b.message_id);
        assert_eq!(a.messages[0].data_set_writer_id, b.messages[0].data_set_writer_id);
    }

    #[test]
    fn get_request_carries_filter() {
        let builder = builder();
        let target = Oi4Identifier::new("acme.com", "registry", "R1", "9");
        let topic = Topic::new(
            ServiceType::Registry,
            target.clone(),
            oi4_edge_core::MethodType::Get,
            ResourceType::LicenseText,
        )
        .with_source(target);

        let request = builder.build_get(&app(), ServiceType::Utility, &topic, Some(&Filter::new("en")));
        assert_eq!(request.publisher_id, "Utility/acme.com/app/A,201/001");
        assert!(request.message_id.ends_with("-Utility/acme.com/app/A,201/001"));
        assert_eq!(request.first_filter(), Some("en"));
        assert_eq!(request.messages[0].source, "acme.com/registry/R1/9");
        assert_eq!(request.messages[0].data_set_writer_id, 0);
        assert_eq!(
            request.data_set_class_id.as_deref(),
            ResourceType::LicenseText.data_set_class_id()
        );

        let plain = builder.build_get(&app(), ServiceType::Utility, &topic, None);
        assert!(plain.messages.is_empty());
        assert_ne!(plain.message_id, request.message_id);
    }
}
