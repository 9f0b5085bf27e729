//! Network message envelopes exchanged on the OI4 bus.

use oi4_edge_core::StatusCode;
use serde::{Deserialize, Serialize};

/// `MessageType` of data messages.
pub const MESSAGE_TYPE_DATA: &str = "ua-data";

/// Envelope of one publication on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkMessage {
    /// Unique message id
    #[serde(rename = "MessageId", default)]
    pub message_id: String,
    /// Message type, `ua-data` for publications
    #[serde(rename = "MessageType", default)]
    pub message_type: String,
    /// `{serviceType}/{publisher wire identifier}`
    #[serde(rename = "PublisherId", default)]
    pub publisher_id: String,
    /// Schema id of the resource
    #[serde(rename = "DataSetClassId", default, skip_serializing_if = "Option::is_none")]
    pub data_set_class_id: Option<String>,
    /// Message id of the request this answers
    #[serde(rename = "CorrelationId", default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Payload messages
    #[serde(rename = "Messages", default)]
    pub messages: Vec<DataSetMessage>,
}

impl NetworkMessage {
    /// Filter of the first data set message, if any.
    ///
    /// Get requests carry the requested filter here.
    #[must_use]
    pub fn first_filter(&self) -> Option<&str> {
        self.messages.first().and_then(|m| m.filter.as_deref())
    }

    /// Serialize to JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails.
    pub fn to_json(&self) -> Result<Vec<u8>, MessageError> {
        serde_json::to_vec(self).map_err(|e| MessageError::Serialize(e.to_string()))
    }

    /// Deserialize from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns error if deserialization fails.
    pub fn from_json(bytes: &[u8]) -> Result<Self, MessageError> {
        serde_json::from_slice(bytes).map_err(|e| MessageError::Deserialize(e.to_string()))
    }
}

/// One payload inside a [`NetworkMessage`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSetMessage {
    /// Writer id of the publication stream
    #[serde(rename = "DataSetWriterId", default)]
    pub data_set_writer_id: u16,
    /// RFC 3339 UTC timestamp
    #[serde(rename = "Timestamp", default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Status code
    #[serde(rename = "Status", default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusCode>,
    /// Filter of the publication
    #[serde(rename = "Filter", default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    /// Wire identifier of the source
    #[serde(rename = "Source", default)]
    pub source: String,
    /// Resource payload
    #[serde(rename = "Payload", default)]
    pub payload: serde_json::Value,
}

/// Errors for message serialization/deserialization.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MessageError {
    /// Serialization failed
    #[error("serialization failed: {0}")]
    Serialize(String),
    /// Deserialization failed
    #[error("deserialization failed: {0}")]
    Deserialize(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn omits_absent_optionals() {
        let message = NetworkMessage {
            message_id: "1-Utility/acme.com/m/p/s".into(),
            message_type: MESSAGE_TYPE_DATA.into(),
            publisher_id: "Utility/acme.com/m/p/s".into(),
            data_set_class_id: None,
            correlation_id: None,
            messages: vec![DataSetMessage {
                data_set_writer_id: 10,
                timestamp: None,
                status: None,
                filter: None,
                source: "acme.com/m/p/s".into(),
                payload: json!({"Health": "NORMAL_0", "HealthScore": 100}),
            }],
        };

        let value: serde_json::Value = serde_json::from_slice(&message.to_json().unwrap()).unwrap();
        assert!(value.get("DataSetClassId").is_none());
        assert!(value.get("CorrelationId").is_none());
        assert_eq!(value["MessageType"], "ua-data");

        let dsm = &value["Messages"][0];
        assert_eq!(dsm["DataSetWriterId"], 10);
        assert!(dsm.get("Filter").is_none());
        assert!(dsm.get("Status").is_none());
        assert_eq!(dsm["Payload"]["HealthScore"], 100);
    }

    #[test]
    fn parses_get_request() {
        let raw = br#"{
            "MessageId": "1700000000000-Registry/acme.com/reg/R1/1",
            "MessageType": "ua-data",
            "PublisherId": "Registry/acme.com/reg/R1/1",
            "Messages": [{"DataSetWriterId": 0, "Source": "", "Filter": "en", "Payload": null}]
        }"#;

        let message = NetworkMessage::from_json(raw).unwrap();
        assert_eq!(message.first_filter(), Some("en"));
        assert_eq!(message.correlation_id, None);
    }

    #[test]
    fn tolerates_minimal_payload() {
        let message = NetworkMessage::from_json(br#"{"MessageId":"123"}"#).unwrap();
        assert_eq!(message.message_id, "123");
        assert!(message.messages.is_empty());
        assert_eq!(message.first_filter(), None);
    }

    #[test]
    fn rejects_garbage() {
        let err = NetworkMessage::from_json(b"not json").unwrap_err();
        assert!(err.to_string().starts_with("deserialization failed"));
    }
}
