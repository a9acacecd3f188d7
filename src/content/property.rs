//! Property values and the encoded payload carried by a version

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::codec::{CodecError, CodecResult};

/// Schema tag of the JSON property payload written by this build.
pub const PAYLOAD_SCHEMA_VERSION: u16 = 1;

/// Typed value of a single property.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropertyData {
    Text(String),
    Integer(i64),
    Decimal(f64),
    Boolean(bool),
    DateTime(DateTime<Utc>),
    Json(serde_json::Value),
}

impl PropertyData {
    /// Returns the text value, if this is a text property.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyData::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// One value of a property for a (culture, segment) pair.
///
/// Empty culture and segment mean invariant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PropertyValue {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub culture: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub segment: String,
    pub data: PropertyData,
}

impl PropertyValue {
    pub fn invariant(data: PropertyData) -> Self {
        Self {
            culture: String::new(),
            segment: String::new(),
            data,
        }
    }

    pub fn for_culture(culture: impl Into<String>, data: PropertyData) -> Self {
        Self {
            culture: culture.into(),
            segment: String::new(),
            data,
        }
    }
}

/// Property values of a version, keyed by property alias.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Properties(BTreeMap<String, Vec<PropertyValue>>);

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a value to the property `alias`.
    pub fn push(&mut self, alias: impl Into<String>, value: PropertyValue) {
        self.0.entry(alias.into()).or_default().push(value);
    }

    /// Builder form of [`Properties::push`] for an invariant value.
    pub fn with(mut self, alias: impl Into<String>, data: PropertyData) -> Self {
        self.push(alias, PropertyValue::invariant(data));
        self
    }

    /// Returns every value of `alias`.
    pub fn values(&self, alias: &str) -> &[PropertyValue] {
        self.0.get(alias).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Returns the value of `alias` for `culture`, falling back to the
    /// invariant value. Segments are not considered.
    pub fn value(&self, alias: &str, culture: &str) -> Option<&PropertyData> {
        let values = self.values(alias);
        values
            .iter()
            .find(|v| v.culture == culture && v.segment.is_empty())
            .or_else(|| {
                values
                    .iter()
                    .find(|v| v.culture.is_empty() && v.segment.is_empty())
            })
            .map(|v| &v.data)
    }

    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Encoded property values plus the schema tag they were written with.
///
/// Versions keep the payload encoded; it is only decoded when a caller asks
/// for the properties.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PropertyPayload {
    schema_version: u16,
    bytes: Vec<u8>,
}

impl PropertyPayload {
    /// Wraps raw payload bytes read from a record.
    pub fn from_raw(schema_version: u16, bytes: Vec<u8>) -> Self {
        Self {
            schema_version,
            bytes,
        }
    }

    /// Encodes properties with the current payload schema.
    pub fn encode(properties: &Properties) -> CodecResult<Self> {
        let bytes = serde_json::to_vec(properties).map_err(|e| CodecError::Payload {
            reason: e.to_string(),
        })?;
        Ok(Self::from_raw(PAYLOAD_SCHEMA_VERSION, bytes))
    }

    /// Decodes the properties.
    ///
    /// Payloads written by a newer payload schema are rejected.
    pub fn decode(&self) -> CodecResult<Properties> {
        if self.schema_version != PAYLOAD_SCHEMA_VERSION {
            return Err(CodecError::SchemaMismatch {
                found: self.schema_version,
                expected: PAYLOAD_SCHEMA_VERSION,
            });
        }
        serde_json::from_slice(&self.bytes).map_err(|e| CodecError::Payload {
            reason: e.to_string(),
        })
    }

    #[inline]
    pub fn schema_version(&self) -> u16 {
        self.schema_version
    }

    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_roundtrip() {
        let props = Properties::new()
            .with("title", PropertyData::Text("Hello".into()))
            .with("count", PropertyData::Integer(3))
            .with("meta", PropertyData::Json(serde_json::json!({"a": [1, 2]})));

        let payload = PropertyPayload::encode(&props).unwrap();
        assert_eq!(payload.schema_version(), PAYLOAD_SCHEMA_VERSION);
        assert_eq!(payload.decode().unwrap(), props);
    }

    #[test]
    fn test_unknown_payload_schema_rejected() {
        let payload = PropertyPayload::from_raw(PAYLOAD_SCHEMA_VERSION + 1, b"{}".to_vec());
        assert!(matches!(
            payload.decode(),
            Err(CodecError::SchemaMismatch { found, .. }) if found == PAYLOAD_SCHEMA_VERSION + 1
        ));
    }

    #[test]
    fn test_garbage_payload_is_error() {
        let payload = PropertyPayload::from_raw(PAYLOAD_SCHEMA_VERSION, b"not json".to_vec());
        assert!(matches!(payload.decode(), Err(CodecError::Payload { .. })));
    }

    #[test]
    fn test_culture_value_falls_back_to_invariant() {
        let mut props = Properties::new();
        props.push("title", PropertyValue::invariant(PropertyData::Text("Hi".into())));
        props.push(
            "title",
            PropertyValue::for_culture("da-DK", PropertyData::Text("Hej".into())),
        );

        assert_eq!(props.value("title", "da-DK").and_then(|d| d.as_text()), Some("Hej"));
        assert_eq!(props.value("title", "en-US").and_then(|d| d.as_text()), Some("Hi"));
        assert!(props.value("missing", "").is_none());
    }
}
