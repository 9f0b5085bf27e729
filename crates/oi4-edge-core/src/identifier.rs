//! OI4 identifiers.
//!
//! An identifier names an application or asset by four fields. On the wire
//! (topics, `Source` fields, publisher ids) it is written as
//! `manufacturerUri/model/productCode/serialNumber` with the manufacturer URI
//! lower-cased and the other three parts DNP-encoded.

use crate::dnp::{self, EncodingError};
use crate::model::MasterAssetModel;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of an application or asset.
///
/// Equality compares the stored fields, not the wire form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Oi4Identifier {
    /// Manufacturer URI (domain-like, case-insensitive on the wire)
    #[serde(rename = "ManufacturerUri")]
    pub manufacturer_uri: String,
    /// Model designation
    #[serde(rename = "Model")]
    pub model: String,
    /// Product code
    #[serde(rename = "ProductCode")]
    pub product_code: String,
    /// Serial number
    #[serde(rename = "SerialNumber")]
    pub serial_number: String,
}

impl Oi4Identifier {
    /// Create an identifier from its four parts.
    #[must_use]
    pub fn new(
        manufacturer_uri: impl Into<String>,
        model: impl Into<String>,
        product_code: impl Into<String>,
        serial_number: impl Into<String>,
    ) -> Self {
        Self {
            manufacturer_uri: manufacturer_uri.into(),
            model: model.into(),
            product_code: product_code.into(),
            serial_number: serial_number.into(),
        }
    }

    /// Parse an identifier from a `/`-separated path.
    ///
    /// Parts beyond the fourth are ignored. With `decode`, the model, product
    /// code and serial number are DNP-decoded; the manufacturer URI never is.
    ///
    /// # Errors
    ///
    /// Returns error if fewer than four parts are present or a part fails to
    /// decode. The error names the failing field.
    pub fn parse(path: &str, decode: bool) -> Result<Self, IdentifierError> {
        let parts: Vec<&str> = path.split('/').collect();
        Self::parse_parts(&parts, decode)
            .map_err(|e| match e {
                IdentifierError::TooFewParts(_) => IdentifierError::TooFewParts(path.to_string()),
                other => other,
            })
    }

    /// Parse an identifier from already split segments (e.g. topic parts).
    ///
    /// # Errors
    ///
    /// Same as [`Oi4Identifier::parse`].
    pub fn parse_parts(parts: &[&str], decode: bool) -> Result<Self, IdentifierError> {
        if parts.len() < 4 {
            return Err(IdentifierError::TooFewParts(parts.join("/")));
        }

        let part = |value: &str| -> Result<String, EncodingError> {
            if decode {
                dnp::decode(value)
            } else {
                Ok(value.to_string())
            }
        };

        let model = part(parts[1]).map_err(IdentifierError::InvalidModel)?;
        let product_code = part(parts[2]).map_err(IdentifierError::InvalidProductCode)?;
        let serial_number = part(parts[3]).map_err(IdentifierError::InvalidSerialNumber)?;

        Ok(Self {
            manufacturer_uri: parts[0].to_string(),
            model,
            product_code,
            serial_number,
        })
    }

    /// Wire form: lower-cased manufacturer URI, DNP-encoded remaining parts.
    #[must_use]
    pub fn to_wire_string(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.manufacturer_uri.to_lowercase(),
            dnp::encode(&self.model),
            dnp::encode(&self.product_code),
            dnp::encode(&self.serial_number)
        )
    }

    /// Plain form without any encoding, for display.
    #[must_use]
    pub fn to_plain_string(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.manufacturer_uri, self.model, self.product_code, self.serial_number
        )
    }
}

impl fmt::Display for Oi4Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire_string())
    }
}

impl From<&MasterAssetModel> for Oi4Identifier {
    fn from(mam: &MasterAssetModel) -> Self {
        Self {
            manufacturer_uri: mam.manufacturer_uri.clone(),
            model: mam.model.text.clone(),
            product_code: mam.product_code.clone(),
            serial_number: mam.serial_number.clone(),
        }
    }
}

/// Errors that can occur parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentifierError {
    /// Fewer than four parts
    #[error("invalid identifier: {0}")]
    TooFewParts(String),
    /// Model part failed to decode
    #[error("invalid model: {0}")]
    InvalidModel(#[source] EncodingError),
    /// Product code part failed to decode
    #[error("invalid product code: {0}")]
    InvalidProductCode(#[source] EncodingError),
    /// Serial number part failed to decode
    #[error("invalid serial number: {0}")]
    InvalidSerialNumber(#[source] EncodingError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_decoded() {
        let id = Oi4Identifier::parse("acme.com/model/product,2ACode/FBC,23123", true).unwrap();
        assert_eq!(
            id,
            Oi4Identifier::new("acme.com", "model", "product*Code", "FBC#123")
        );
    }

    #[test]
    fn parse_raw_keeps_escapes() {
        let id = Oi4Identifier::parse("acme.com/model/product,2ACode/FBC,23123", false).unwrap();
        assert_eq!(id.product_code, "product,2ACode");
        assert_eq!(id.serial_number, "FBC,23123");
    }

    #[test]
    fn parse_never_decodes_manufacturer() {
        let id = Oi4Identifier::parse("acme,2Ecom/a/b/c", true).unwrap();
        assert_eq!(id.manufacturer_uri, "acme,2Ecom");
    }

    #[test]
    fn parse_too_few_parts() {
        let err = Oi4Identifier::parse("acme.com/model/code", true).unwrap_err();
        assert_eq!(err, IdentifierError::TooFewParts("acme.com/model/code".to_string()));
    }

    #[test]
    fn parse_names_failing_field() {
        let err = Oi4Identifier::parse("acme.com/bad,Z/code/serial", true).unwrap_err();
        assert!(err.to_string().starts_with("invalid model"));

        let err = Oi4Identifier::parse("acme.com/model/bad,Z/serial", true).unwrap_err();
        assert!(err.to_string().starts_with("invalid product code"));

        let err = Oi4Identifier::parse("acme.com/model/code/bad,", true).unwrap_err();
        assert!(err.to_string().starts_with("invalid serial number"));
    }

    #[test]
    fn wire_string_lowercases_and_encodes() {
        let id = Oi4Identifier::new("Acme.COM", "FBC", "fbc%183z", "FBC#123");
        assert_eq!(id.to_wire_string(), "acme.com/FBC/fbc,25183z/FBC,23123");
        assert_eq!(id.to_plain_string(), "Acme.COM/FBC/fbc%183z/FBC#123");
    }

    #[test]
    fn wire_roundtrip_case_folds_manufacturer() {
        let id = Oi4Identifier::new("Acme.com", "m/42-A", "x y", "F234#862");
        let parsed = Oi4Identifier::parse(&id.to_wire_string(), true).unwrap();

        assert_eq!(parsed.manufacturer_uri, "acme.com");
        assert_eq!(parsed.model, id.model);
        assert_eq!(parsed.product_code, id.product_code);
        assert_eq!(parsed.serial_number, id.serial_number);
        assert_ne!(parsed, id);
    }

    #[test]
    fn equality_uses_stored_fields() {
        let a = Oi4Identifier::new("acme.com", "m", "p", "s");
        let b = Oi4Identifier::new("ACME.com", "m", "p", "s");
        assert_ne!(a, b);
        assert_eq!(a.to_wire_string(), b.to_wire_string());
    }

    #[test]
    fn json_field_names() {
        let id = Oi4Identifier::new("acme.com", "m", "p", "s");
        let json = serde_json::to_value(&id).unwrap();
        assert_eq!(json["ManufacturerUri"], "acme.com");
        assert_eq!(json["SerialNumber"], "s");
    }
}
