//! Numeric coercion of typed tag values

use edgetag_core::{DataType, TagUpdate, TagValue};
use serde_json::Value;

/// Collapse a typed tag value into the single numeric representation
/// exposed on the scrape endpoint. Non-numeric kinds become `0.0`.
///
/// Integers beyond 2^53 lose precision in the conversion.
pub fn coerce(value: &TagValue) -> f64 {
    match value {
        TagValue::Boolean(true) => 1.0,
        TagValue::Boolean(false) => 0.0,
        TagValue::Signed(v) => *v as f64,
        TagValue::Unsigned(v) => *v as f64,
        TagValue::Float(v) => f64::from(*v),
        TagValue::Double(v) => *v,
        TagValue::Text(_) | TagValue::Opaque | TagValue::Invalid => 0.0,
    }
}

/// Coerce a raw wire value under its declared data type
pub fn coerce_json(value: &Value, data_type: DataType) -> f64 {
    coerce(&TagValue::from_json(data_type, value))
}

pub fn coerce_tag(tag: &TagUpdate) -> f64 {
    coerce(&tag.typed_value())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_boolean_is_zero_or_one() {
        assert_eq!(coerce_json(&json!(true), DataType::Boolean), 1.0);
        assert_eq!(coerce_json(&json!(false), DataType::Boolean), 0.0);
    }

    #[test]
    fn test_all_integer_widths() {
        for data_type in [
            DataType::Int8,
            DataType::Int16,
            DataType::Int32,
            DataType::Int64,
            DataType::Uint8,
            DataType::Uint16,
            DataType::Uint32,
            DataType::Uint64,
        ] {
            assert_eq!(coerce_json(&json!(7), data_type), 7.0, "{:?}", data_type);
        }
        assert_eq!(coerce_json(&json!(-12), DataType::Int32), -12.0);
    }

    #[test]
    fn test_large_unsigned_loses_precision_only() {
        let v = coerce_json(&json!(u64::MAX), DataType::Uint64);
        assert_eq!(v, u64::MAX as f64);
    }

    #[test]
    fn test_float_is_widened_from_f32() {
        let v = coerce_json(&json!(0.1), DataType::Float);
        assert_eq!(v, f64::from(0.1f32));
        assert_ne!(v, 0.1);
    }

    #[test]
    fn test_double_passthrough() {
        assert_eq!(coerce_json(&json!(42.5), DataType::Double), 42.5);
        assert_eq!(coerce_json(&json!(3), DataType::Double), 3.0);
    }

    #[test]
    fn test_non_numeric_kinds_are_zero() {
        assert_eq!(coerce_json(&json!("12.5"), DataType::String), 0.0);
        assert_eq!(coerce_json(&json!("AQID"), DataType::ByteArray), 0.0);
        assert_eq!(coerce_json(&json!([1, 2, 3]), DataType::Raw), 0.0);
        assert_eq!(coerce_json(&json!(99), DataType::Unknown), 0.0);
    }

    #[test]
    fn test_mismatched_representation_is_zero() {
        assert_eq!(coerce_json(&json!("true"), DataType::Boolean), 0.0);
        assert_eq!(coerce_json(&json!(true), DataType::Double), 0.0);
        assert_eq!(coerce_json(&json!(null), DataType::Uint16), 0.0);
    }
}
