//! Core domain types shared by the exporter crates

use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared type of a tag value as reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Boolean,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float,
    Double,
    String,
    ByteArray,
    Raw,
    #[default]
    #[serde(other)]
    Unknown,
}

impl DataType {
    pub fn is_signed_integer(&self) -> bool {
        matches!(self, Self::Int8 | Self::Int16 | Self::Int32 | Self::Int64)
    }

    pub fn is_unsigned_integer(&self) -> bool {
        matches!(self, Self::Uint8 | Self::Uint16 | Self::Uint32 | Self::Uint64)
    }
}

/// A tag value interpreted according to its declared data type.
///
/// `Invalid` covers unknown data types and values whose JSON shape does not
/// match the declared type.
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    Boolean(bool),
    Signed(i64),
    Unsigned(u64),
    Float(f32),
    Double(f64),
    Text(String),
    Opaque,
    Invalid,
}

impl TagValue {
    pub fn from_json(data_type: DataType, value: &serde_json::Value) -> Self {
        match data_type {
            DataType::Boolean => value.as_bool().map_or(Self::Invalid, Self::Boolean),
            t if t.is_signed_integer() => Self::signed(value),
            t if t.is_unsigned_integer() => Self::unsigned(value),
            DataType::Float => value
                .as_f64()
                .map_or(Self::Invalid, |v| Self::Float(v as f32)),
            DataType::Double => value.as_f64().map_or(Self::Invalid, Self::Double),
            DataType::String => value
                .as_str()
                .map_or(Self::Invalid, |s| Self::Text(s.to_string())),
            DataType::ByteArray | DataType::Raw => Self::Opaque,
            _ => Self::Invalid,
        }
    }

    fn signed(value: &serde_json::Value) -> Self {
        if let Some(v) = value.as_i64() {
            Self::Signed(v)
        } else if let Some(v) = value.as_u64() {
            Self::Unsigned(v)
        } else {
            value
                .as_f64()
                .map_or(Self::Invalid, |v| Self::Signed(v.trunc() as i64))
        }
    }

    fn unsigned(value: &serde_json::Value) -> Self {
        if let Some(v) = value.as_u64() {
            Self::Unsigned(v)
        } else if let Some(v) = value.as_i64() {
            Self::Signed(v)
        } else {
            value
                .as_f64()
                .map_or(Self::Invalid, |v| Self::Signed(v.trunc() as i64))
        }
    }
}

/// A single tag update as streamed by the device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagUpdate {
    #[serde(rename = "prvdName", alias = "providerName", default)]
    pub provider_name: String,
    #[serde(rename = "srcName", alias = "sourceName", default)]
    pub source_name: String,
    #[serde(rename = "tagName")]
    pub tag_name: String,
    #[serde(rename = "dataValue", default)]
    pub value: serde_json::Value,
    #[serde(rename = "ts", default)]
    pub timestamp: u64,
    #[serde(rename = "dataType", default)]
    pub data_type: DataType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "eventSeverity", default, skip_serializing_if = "Option::is_none")]
    pub event_severity: Option<String>,
    #[serde(rename = "eventUser", default, skip_serializing_if = "Option::is_none")]
    pub event_user: Option<String>,
}

impl TagUpdate {
    pub fn typed_value(&self) -> TagValue {
        TagValue::from_json(self.data_type, &self.value)
    }

    /// Decode a frame payload holding a JSON array of tag updates
    pub fn decode_batch(payload: &[u8]) -> crate::Result<Vec<TagUpdate>> {
        Ok(serde_json::from_slice(payload)?)
    }
}

impl fmt::Display for TagUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.provider_name, self.source_name, self.tag_name)
    }
}

/// Descriptive device metadata, fetched best-effort after login
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub model_name: String,
    pub serial_number: String,
    pub firmware_version: String,
    pub wan: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_data_type_wire_names() {
        let types: Vec<DataType> = serde_json::from_value(json!([
            "boolean", "int8", "uint64", "float", "double", "string", "bytearray", "raw", "decimal"
        ]))
        .unwrap();
        assert_eq!(
            types,
            vec![
                DataType::Boolean,
                DataType::Int8,
                DataType::Uint64,
                DataType::Float,
                DataType::Double,
                DataType::String,
                DataType::ByteArray,
                DataType::Raw,
                DataType::Unknown,
            ]
        );
    }

    #[test]
    fn test_decode_batch_accepts_both_field_spellings() {
        let payload = br#"[
            {"prvdName":"$connection_azure1","srcName":"store1","tagName":"count","dataValue":7,"ts":1,"dataType":"uint32"},
            {"providerName":"deviceA","sourceName":"sensor","tagName":"temperature","dataValue":42.5,"dataType":"double"}
        ]"#;
        let tags = TagUpdate::decode_batch(payload).unwrap();
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].provider_name, "$connection_azure1");
        assert_eq!(tags[0].typed_value(), TagValue::Unsigned(7));
        assert_eq!(tags[1].source_name, "sensor");
        assert_eq!(tags[1].timestamp, 0);
        assert_eq!(tags[1].typed_value(), TagValue::Double(42.5));
    }

    #[test]
    fn test_decode_batch_rejects_non_array() {
        assert!(TagUpdate::decode_batch(br#"{"tagName":"x"}"#).is_err());
        assert!(TagUpdate::decode_batch(b"not json").is_err());
    }

    #[test]
    fn test_mismatched_shape_is_invalid() {
        assert_eq!(TagValue::from_json(DataType::Boolean, &json!(1)), TagValue::Invalid);
        assert_eq!(TagValue::from_json(DataType::Int32, &json!("12")), TagValue::Invalid);
        assert_eq!(TagValue::from_json(DataType::Double, &json!(null)), TagValue::Invalid);
        assert_eq!(TagValue::from_json(DataType::Unknown, &json!(3)), TagValue::Invalid);
    }

    #[test]
    fn test_integer_kinds() {
        assert_eq!(TagValue::from_json(DataType::Int16, &json!(-4)), TagValue::Signed(-4));
        assert_eq!(TagValue::from_json(DataType::Uint32, &json!(-4)), TagValue::Signed(-4));
        assert_eq!(TagValue::from_json(DataType::Uint64, &json!(9.9)), TagValue::Signed(9));
        assert_eq!(
            TagValue::from_json(DataType::Int64, &json!(u64::MAX)),
            TagValue::Unsigned(u64::MAX)
        );
    }
}
