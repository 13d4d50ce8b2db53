//! Self-describing payload value.
//!
//! [`Value`] is what travels as call arguments and reply results. Maps are
//! ordered lists of `(key, value)` pairs, so entry order and key types
//! (string vs integer) survive the wire unchanged.
//!
//! On the wire a [`Value`] goes through [`rmpv::Value`], so every
//! MessagePack type decodes, extension types included. The coercing
//! readers ([`Value::as_i64`], [`Value::loosely_equals`]) sit on top.
//!
//! # Example
//!
//! ```
//! use sidecar_bridge::Value;
//!
//! let doc = Value::map([("foo", Value::from("bar")), ("tid", Value::from("0"))]);
//! assert_eq!(doc.get("foo").and_then(Value::as_str), Some("bar"));
//! assert_eq!(doc.get("tid").and_then(Value::as_i64), Some(0));
//! ```

use std::fmt;

use serde::de;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A dynamically typed payload value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Absent value.
    #[default]
    Nil,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Opaque bytes.
    Binary(Vec<u8>),
    /// MessagePack extension: type tag and raw data.
    Ext(i8, Vec<u8>),
    /// Sequence.
    Array(Vec<Value>),
    /// Ordered map with arbitrary key types.
    Map(Vec<(Value, Value)>),
}

impl Value {
    /// Build a map from `(key, value)` pairs, keeping their order.
    pub fn map<K, V, I>(entries: I) -> Self
    where
        K: Into<Value>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Empty map.
    pub fn empty_map() -> Self {
        Value::Map(Vec::new())
    }

    /// Build an array from anything convertible to values.
    pub fn array<V, I>(items: I) -> Self
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        Value::Array(items.into_iter().map(Into::into).collect())
    }

    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Look up a map entry. Keys compare structurally, so `2` and `"2"` differ.
    pub fn get(&self, key: impl Into<Value>) -> Option<&Value> {
        let key = key.into();
        self.as_map()?
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v)
    }

    /// Mutable map lookup.
    pub fn get_mut(&mut self, key: impl Into<Value>) -> Option<&mut Value> {
        let key = key.into();
        match self {
            Value::Map(entries) => entries.iter_mut().find(|(k, _)| *k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Insert or replace a map entry. Existing keys keep their position.
    ///
    /// Returns `false` if `self` is not a map.
    pub fn insert(&mut self, key: impl Into<Value>, value: impl Into<Value>) -> bool {
        let key = key.into();
        let value = value.into();
        match self {
            Value::Map(entries) => {
                match entries.iter_mut().find(|(k, _)| *k == key) {
                    Some((_, slot)) => *slot = value,
                    None => entries.push((key, value)),
                }
                true
            }
            _ => false,
        }
    }

    /// Integer view of the value.
    ///
    /// Accepts integers, floats without a fractional part, and strings that
    /// parse as decimal integers (`"0"` reads as `0`).
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 && f.is_finite() => {
                // 2^63 itself is out of range; `as` would saturate it.
                if *f >= i64::MIN as f64 && *f < 9_223_372_036_854_775_808.0 {
                    Some(*f as i64)
                } else {
                    None
                }
            }
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Float view of the value, with the same coercions as [`Value::as_i64`].
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&[(Value, Value)]> {
        match self {
            Value::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Number of elements in an array or entries in a map; 0 otherwise.
    pub fn len(&self) -> usize {
        match self {
            Value::Array(items) => items.len(),
            Value::Map(entries) => entries.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Numeric equality across representations (`Int(6)`, `Float(6.0)`, `"6"`).
    pub fn loosely_equals(&self, other: &Value) -> bool {
        if self == other {
            return true;
        }
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) if self.is_numeric_like() && other.is_numeric_like() => a == b,
            _ => false,
        }
    }

    fn is_numeric_like(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_) | Value::String(_))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Binary(b) => write!(f, "<{} bytes>", b.len()),
            Value::Ext(tag, data) => write!(f, "<ext {tag}: {} bytes>", data.len()),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Map(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::Int(i64::from(v))
                }
            }
        )*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(f64::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

impl From<Vec<(Value, Value)>> for Value {
    fn from(v: Vec<(Value, Value)>) -> Self {
        Value::Map(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Nil, Into::into)
    }
}

impl From<&Value> for rmpv::Value {
    fn from(value: &Value) -> Self {
        match value {
            Value::Nil => rmpv::Value::Nil,
            Value::Bool(b) => rmpv::Value::Boolean(*b),
            Value::Int(i) => rmpv::Value::from(*i),
            Value::Float(f) => rmpv::Value::F64(*f),
            Value::String(s) => rmpv::Value::from(s.as_str()),
            Value::Binary(b) => rmpv::Value::Binary(b.clone()),
            Value::Ext(tag, data) => rmpv::Value::Ext(*tag, data.clone()),
            Value::Array(items) => rmpv::Value::Array(items.iter().map(Into::into).collect()),
            Value::Map(entries) => {
                rmpv::Value::Map(entries.iter().map(|(k, v)| (k.into(), v.into())).collect())
            }
        }
    }
}

impl TryFrom<rmpv::Value> for Value {
    type Error = String;

    fn try_from(value: rmpv::Value) -> Result<Self, String> {
        Ok(match value {
            rmpv::Value::Nil => Value::Nil,
            rmpv::Value::Boolean(b) => Value::Bool(b),
            rmpv::Value::Integer(i) => match i.as_i64() {
                Some(i) => Value::Int(i),
                None => return Err("integer exceeds i64 range".to_string()),
            },
            rmpv::Value::F32(f) => Value::Float(f64::from(f)),
            rmpv::Value::F64(f) => Value::Float(f),
            // Strings that are not valid UTF-8 keep their raw bytes.
            rmpv::Value::String(s) if s.is_str() => Value::String(s.into_str().unwrap_or_default()),
            rmpv::Value::String(s) => Value::Binary(s.into_bytes()),
            rmpv::Value::Binary(b) => Value::Binary(b),
            rmpv::Value::Ext(tag, data) => Value::Ext(tag, data),
            rmpv::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::try_from).collect::<Result<_, _>>()?)
            }
            rmpv::Value::Map(entries) => Value::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| Ok((Value::try_from(k)?, Value::try_from(v)?)))
                    .collect::<Result<_, String>>()?,
            ),
        })
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        rmpv::Value::from(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = rmpv::Value::deserialize(deserializer)?;
        Value::try_from(raw).map_err(de::Error::custom)
    }
}
