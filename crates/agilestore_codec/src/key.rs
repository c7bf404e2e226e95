//! Keys for primary and index lookups.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use std::fmt;

/// A value that is valid as a primary key or index key.
///
/// Keys are numbers (integers or non-NaN floats), text, byte strings, or
/// arrays of keys. They order as `number < Text < Bytes < Array`, with
/// numbers compared by value and arrays element by element.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key(Value);

impl Key {
    /// Validates `value` as a key.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` for null, booleans, `NaN`, maps, or arrays
    /// containing any of those.
    pub fn new(value: Value) -> CodecResult<Self> {
        Self::check(&value)?;
        Ok(Key(value))
    }

    fn check(value: &Value) -> CodecResult<()> {
        match value {
            Value::Integer(_) | Value::Text(_) | Value::Bytes(_) => Ok(()),
            Value::Float(f) if f.is_nan() => Err(CodecError::invalid_key("NaN is not a valid key")),
            Value::Float(_) => Ok(()),
            Value::Array(items) => items.iter().try_for_each(Self::check),
            Value::Null => Err(CodecError::invalid_key("null is not a valid key")),
            Value::Bool(_) => Err(CodecError::invalid_key("booleans are not valid keys")),
            Value::Map(_) => Err(CodecError::invalid_key("maps are not valid keys")),
        }
    }

    /// Returns the key as a value.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Unwraps the key into its value.
    pub fn into_value(self) -> Value {
        self.0
    }
}

impl TryFrom<Value> for Key {
    type Error = CodecError;

    fn try_from(value: Value) -> CodecResult<Self> {
        Key::new(value)
    }
}

impl From<Key> for Value {
    fn from(key: Key) -> Self {
        key.0
    }
}

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        Key(Value::Integer(n))
    }
}

impl TryFrom<f64> for Key {
    type Error = CodecError;

    fn try_from(f: f64) -> CodecResult<Self> {
        Key::new(Value::Float(f))
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key(Value::from(s))
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key(Value::Text(s))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Value::Integer(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => write!(f, "{s:?}"),
            other => write!(f, "{other:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn scalar_keys_are_valid() {
        assert!(Key::new(Value::Integer(1)).is_ok());
        assert!(Key::new(Value::from("a")).is_ok());
        assert!(Key::new(Value::Bytes(vec![1])).is_ok());
        assert!(Key::new(Value::Float(21.5)).is_ok());
        assert!(Key::new(Value::Float(f64::NEG_INFINITY)).is_ok());
    }

    #[test]
    fn invalid_keys_are_rejected() {
        assert!(Key::new(Value::Null).is_err());
        assert!(Key::new(Value::Bool(true)).is_err());
        assert!(Key::new(Value::Float(f64::NAN)).is_err());
        assert!(Key::new(Value::Array(vec![Value::Float(f64::NAN)])).is_err());
        assert!(Key::new(Value::empty_map()).is_err());
        assert!(Key::new(Value::Array(vec![Value::Integer(1), Value::Null])).is_err());
    }

    #[test]
    fn type_ordering() {
        let int = Key::from(1000);
        let text = Key::from("0");
        let bytes = Key::new(Value::Bytes(vec![0])).unwrap();
        let array = Key::new(Value::Array(vec![])).unwrap();

        assert!(int < text);
        assert!(text < bytes);
        assert!(bytes < array);
    }

    #[test]
    fn array_ordering_is_elementwise() {
        let a = Key::new(Value::Array(vec![Value::Integer(1), Value::Integer(9)])).unwrap();
        let b = Key::new(Value::Array(vec![Value::Integer(2)])).unwrap();
        let c = Key::new(Value::Array(vec![Value::Integer(2), Value::Integer(0)])).unwrap();

        assert!(a < b);
        assert!(b < c);
    }

    proptest! {
        #[test]
        fn mixed_numeric_keys_order_by_value(a in -1_000_000i64..1_000_000, b in -1.0e6f64..1.0e6) {
            let int = Key::from(a);
            let float = Key::try_from(b).unwrap();
            if (a as f64) < b {
                prop_assert!(int < float);
            } else if (a as f64) > b {
                prop_assert!(int > float);
            } else {
                prop_assert!(int < float);
            }
        }

        #[test]
        fn integer_keys_order_numerically(a in any::<i64>(), b in any::<i64>()) {
            prop_assert_eq!(Key::from(a).cmp(&Key::from(b)), a.cmp(&b));
        }

        #[test]
        fn text_keys_order_lexically(a in "[a-z]{0,8}", b in "[a-z]{0,8}") {
            prop_assert_eq!(Key::from(a.as_str()).cmp(&Key::from(b.as_str())), a.cmp(&b));
        }
    }
}
