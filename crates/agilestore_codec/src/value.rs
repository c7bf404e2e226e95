//! Dynamic record value type.

use crate::error::{CodecError, CodecResult};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

/// A dynamic record value.
///
/// Every record stored through agilestore is turned into a `Value` before it
/// reaches the engine, and back into the caller's type on the way out.
///
/// Values are totally ordered. The order ranks variants first
/// (`Null < Bool < number < Text < Bytes < Array < Map`) and then compares
/// contents, which makes the key subset (numbers, text, bytes, arrays)
/// sort the way an indexed store expects. Integers and floats share one
/// numeric rank and compare by value; an integer sorts just before a float
/// of the same value. Floats follow [`f64::total_cmp`], so equality is
/// bitwise and `NaN` equals itself.
#[derive(Debug, Clone)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer (full i64 range).
    Integer(i64),
    /// Double-precision float.
    Float(f64),
    /// Text string (UTF-8).
    Text(String),
    /// Byte string.
    Bytes(Vec<u8>),
    /// Array of values.
    Array(Vec<Value>),
    /// Map of key-value pairs, kept sorted by key.
    Map(Vec<(Value, Value)>),
}

impl Value {
    /// Create a map value with sorted keys.
    ///
    /// When a key appears twice the last pair wins.
    pub fn map(pairs: Vec<(Value, Value)>) -> Self {
        let mut sorted: Vec<(Value, Value)> = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            match sorted.binary_search_by(|(k, _)| k.cmp(&key)) {
                Ok(pos) => sorted[pos].1 = value,
                Err(pos) => sorted.insert(pos, (key, value)),
            }
        }
        Value::Map(sorted)
    }

    /// Create an empty map.
    pub fn empty_map() -> Self {
        Value::Map(Vec::new())
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Integer(_) | Value::Float(_) => 2,
            Value::Text(_) => 3,
            Value::Bytes(_) => 4,
            Value::Array(_) => 5,
            Value::Map(_) => 6,
        }
    }

    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get this value as a boolean, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get this value as an integer, if it is one.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this value as a float, if it is one.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Get this value as bytes, if it is a byte string.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Get this value as a string, if it is a text string.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get this value as an array, if it is one.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Get this value as a map, if it is one.
    pub fn as_map(&self) -> Option<&[(Value, Value)]> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Look up a field of this map value.
    pub fn get(&self, field: &str) -> Option<&Value> {
        match self {
            Value::Map(pairs) => pairs
                .iter()
                .find(|(k, _)| k.as_text() == Some(field))
                .map(|(_, v)| v),
            _ => None,
        }
    }

    /// Sets a field of this map value, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStructure` if `self` is not a map.
    pub fn set(&mut self, field: &str, value: Value) -> CodecResult<()> {
        let Value::Map(pairs) = self else {
            return Err(CodecError::invalid_structure(format!(
                "cannot set field `{field}` on a non-map value"
            )));
        };
        let key = Value::Text(field.to_string());
        match pairs.binary_search_by(|(k, _)| k.cmp(&key)) {
            Ok(pos) => pairs[pos].1 = value,
            Err(pos) => pairs.insert(pos, (key, value)),
        }
        Ok(())
    }

    /// Overwrites the top-level fields of `self` with those of `patch`.
    ///
    /// Fields absent from `patch` keep their current value. Nested maps are
    /// replaced, not merged.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStructure` unless both values are maps.
    pub fn merge(&mut self, patch: Value) -> CodecResult<()> {
        let Value::Map(patch_pairs) = patch else {
            return Err(CodecError::invalid_structure("patch must be a map"));
        };
        if !matches!(self, Value::Map(_)) {
            return Err(CodecError::invalid_structure("merge target must be a map"));
        }
        for (key, value) in patch_pairs {
            let Value::Text(field) = key else {
                return Err(CodecError::invalid_structure("patch keys must be text"));
            };
            self.set(&field, value)?;
        }
        Ok(())
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Integer(a), Value::Float(b)) => cmp_integer_float(*a, *b),
            (Value::Float(a), Value::Integer(b)) => cmp_integer_float(*b, *a).reverse(),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Bytes(a), Value::Bytes(b)) => a.cmp(b),
            (Value::Array(a), Value::Array(b)) => a.cmp(b),
            (Value::Map(a), Value::Map(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

/// Orders an integer against a float by numeric value; ties put the integer first.
fn cmp_integer_float(int: i64, float: f64) -> Ordering {
    if float.is_nan() {
        return if float.is_sign_negative() {
            Ordering::Greater
        } else {
            Ordering::Less
        };
    }
    // 2^63: every float at or above it exceeds i64::MAX.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    if float >= LIMIT {
        return Ordering::Less;
    }
    if float < -LIMIT {
        return Ordering::Greater;
    }
    let whole = float.trunc();
    // In range and integral, so the cast is exact.
    match int.cmp(&(whole as i64)) {
        Ordering::Equal if float < whole => Ordering::Greater,
        Ordering::Equal => Ordering::Less,
        other => other,
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Integer(n) => n.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::Text(s) => s.hash(state),
            Value::Bytes(b) => b.hash(state),
            Value::Array(items) => items.hash(state),
            Value::Map(pairs) => pairs.hash(state),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<f32> for Value {
    fn from(f: f32) -> Self {
        Value::Float(f64::from(f))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::Text(s.clone())
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Bytes(b.to_vec())
    }
}

impl From<()> for Value {
    fn from((): ()) -> Self {
        Value::Null
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(name: &str, age: i64) -> Value {
        Value::map(vec![
            (Value::from("name"), Value::from(name)),
            (Value::from("age"), Value::Integer(age)),
        ])
    }

    #[test]
    fn map_keys_are_sorted() {
        let map = Value::map(vec![
            (Value::from("z"), Value::Integer(1)),
            (Value::from("a"), Value::Integer(2)),
            (Value::from("m"), Value::Integer(3)),
        ]);

        let pairs = map.as_map().unwrap();
        assert_eq!(pairs[0].0, Value::from("a"));
        assert_eq!(pairs[1].0, Value::from("m"));
        assert_eq!(pairs[2].0, Value::from("z"));
    }

    #[test]
    fn map_last_duplicate_wins() {
        let map = Value::map(vec![
            (Value::from("a"), Value::Integer(1)),
            (Value::from("a"), Value::Integer(2)),
        ]);
        assert_eq!(map.as_map().unwrap().len(), 1);
        assert_eq!(map.get("a"), Some(&Value::Integer(2)));
    }

    #[test]
    fn variant_ordering() {
        let mut values = vec![
            Value::Array(vec![]),
            Value::Bytes(vec![0]),
            Value::from("a"),
            Value::Integer(i64::MAX),
            Value::Integer(-5),
            Value::Null,
        ];
        values.sort();

        assert_eq!(values[0], Value::Null);
        assert_eq!(values[1], Value::Integer(-5));
        assert_eq!(values[2], Value::Integer(i64::MAX));
        assert_eq!(values[3], Value::from("a"));
        assert_eq!(values[4], Value::Bytes(vec![0]));
        assert_eq!(values[5], Value::Array(vec![]));
    }

    #[test]
    fn numbers_order_by_value() {
        let mut values = vec![
            Value::Float(2.5),
            Value::Integer(3),
            Value::Float(-0.5),
            Value::Integer(2),
            Value::Float(2.0),
            Value::Float(f64::INFINITY),
            Value::Integer(i64::MIN),
        ];
        values.sort();

        assert_eq!(
            values,
            vec![
                Value::Integer(i64::MIN),
                Value::Float(-0.5),
                Value::Integer(2),
                Value::Float(2.0),
                Value::Float(2.5),
                Value::Integer(3),
                Value::Float(f64::INFINITY),
            ]
        );
        assert!(Value::Float(f64::INFINITY) < Value::from(""));
    }

    #[test]
    fn float_equality_is_total() {
        assert_eq!(Value::Float(f64::NAN), Value::Float(f64::NAN));
        assert_ne!(Value::Float(0.0), Value::Float(-0.0));
        assert_ne!(Value::Integer(1), Value::Float(1.0));
        assert_eq!(Value::from(1.5f32).as_float(), Some(1.5));
    }

    #[test]
    fn set_inserts_and_replaces() {
        let mut value = person("Alice", 30);
        value.set("age", Value::Integer(31)).unwrap();
        value.set("city", Value::from("Oslo")).unwrap();

        assert_eq!(value.get("age"), Some(&Value::Integer(31)));
        assert_eq!(value.get("city"), Some(&Value::from("Oslo")));
        assert_eq!(value.as_map().unwrap().len(), 3);
    }

    #[test]
    fn set_on_scalar_fails() {
        let mut value = Value::Integer(1);
        assert!(matches!(
            value.set("a", Value::Null),
            Err(CodecError::InvalidStructure { .. })
        ));
    }

    #[test]
    fn merge_overwrites_only_patched_fields() {
        let mut value = person("Alice", 30);
        let patch = Value::map(vec![(Value::from("age"), Value::Integer(40))]);

        value.merge(patch).unwrap();

        assert_eq!(value.get("name"), Some(&Value::from("Alice")));
        assert_eq!(value.get("age"), Some(&Value::Integer(40)));
    }

    #[test]
    fn merge_rejects_non_map_patch() {
        let mut value = person("Alice", 30);
        assert!(value.merge(Value::Integer(3)).is_err());
    }

    #[test]
    fn value_accessors() {
        assert!(Value::Null.is_null());
        assert!(!Value::Bool(true).is_null());
        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::Integer(42).as_integer(), Some(42));
        assert_eq!(Value::from("42").as_integer(), None);
        assert_eq!(Value::from("hello").as_text(), Some("hello"));
        assert_eq!(Value::Bytes(vec![1, 2, 3]).as_bytes(), Some(&[1, 2, 3][..]));
        assert_eq!(person("a", 1).get("missing"), None);
    }
}
