//! Conversion between serde types and [`Value`].
//!
//! Records go through ciborium's dynamic value model, which covers the whole
//! serde data model, and are then narrowed to the subset agilestore stores.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use ciborium::value::{Integer, Value as CborValue};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Converts a serializable record into a [`Value`].
///
/// # Errors
///
/// - `IntegerOverflow` for integers outside the `i64` range, such as a `u64`
///   above `i64::MAX` or any `u128`/`i128` that does not fit. They are not
///   narrowed to floats, since that would lose precision silently.
/// - `EncodingFailed` if serde fails or the record carries a CBOR tag.
pub fn to_value<T: Serialize + ?Sized>(record: &T) -> CodecResult<Value> {
    let cbor =
        CborValue::serialized(record).map_err(|e| CodecError::encoding_failed(e.to_string()))?;
    from_cbor_value(cbor)
}

/// Converts a [`Value`] back into a record type.
///
/// # Errors
///
/// Returns `DecodingFailed` if the value does not have the shape of `T`.
pub fn from_value<T: DeserializeOwned>(value: Value) -> CodecResult<T> {
    into_cbor_value(value)
        .deserialized()
        .map_err(|e| CodecError::decoding_failed(e.to_string()))
}

fn from_cbor_value(value: CborValue) -> CodecResult<Value> {
    Ok(match value {
        CborValue::Null => Value::Null,
        CborValue::Bool(b) => Value::Bool(b),
        CborValue::Integer(n) => {
            let wide = i128::from(n);
            Value::Integer(i64::try_from(wide).map_err(|_| CodecError::IntegerOverflow)?)
        }
        CborValue::Float(f) => Value::Float(f),
        CborValue::Text(s) => Value::Text(s),
        CborValue::Bytes(b) => Value::Bytes(b),
        CborValue::Array(items) => Value::Array(
            items
                .into_iter()
                .map(from_cbor_value)
                .collect::<CodecResult<_>>()?,
        ),
        CborValue::Map(pairs) => Value::map(
            pairs
                .into_iter()
                .map(|(k, v)| Ok((from_cbor_value(k)?, from_cbor_value(v)?)))
                .collect::<CodecResult<_>>()?,
        ),
        CborValue::Tag(tag, _) => {
            return Err(CodecError::encoding_failed(format!(
                "tagged values are not supported (tag {tag})"
            )))
        }
        other => {
            return Err(CodecError::encoding_failed(format!(
                "unsupported value: {other:?}"
            )))
        }
    })
}

fn into_cbor_value(value: Value) -> CborValue {
    match value {
        Value::Null => CborValue::Null,
        Value::Bool(b) => CborValue::Bool(b),
        Value::Integer(n) => CborValue::Integer(Integer::from(n)),
        Value::Float(f) => CborValue::Float(f),
        Value::Text(s) => CborValue::Text(s),
        Value::Bytes(b) => CborValue::Bytes(b),
        Value::Array(items) => CborValue::Array(items.into_iter().map(into_cbor_value).collect()),
        Value::Map(pairs) => CborValue::Map(
            pairs
                .into_iter()
                .map(|(k, v)| (into_cbor_value(k), into_cbor_value(v)))
                .collect(),
        ),
    }
}
