//! Field values stored on models.

use crate::core::Model;
use crate::sources::KvTree;
use std::collections::BTreeMap;

/// Current value of a model field.
///
/// Unlike a raw [`KvTree`], nested objects with a declared schema are live
/// [`Model`] handles carrying their own subscribers.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// Absent value.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Integer(i64),
    /// Floating point number.
    Float(f64),
    /// String.
    String(String),
    /// Ordered sequence.
    List(Vec<Value>),
    /// String-keyed mapping.
    Map(BTreeMap<String, Value>),
    /// Nested child model.
    Model(Model),
}

impl Value {
    /// Short name of the variant, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Model(_) => "model",
        }
    }

    /// Returns true for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The boolean, if this is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The integer, if this is one.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// The number as a float. Integers are widened.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// The string slice, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// The items, if this is a list.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// The entries, if this is a map.
    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// The nested model handle, if this is one.
    pub fn as_model(&self) -> Option<&Model> {
        match self {
            Self::Model(model) => Some(model),
            _ => None,
        }
    }

    /// Convert to a plain key-value tree, recursing into nested models.
    ///
    /// Non-finite floats have no key-value representation and become `null`.
    pub fn to_kv(&self) -> KvTree {
        match self {
            Self::Null => KvTree::Null,
            Self::Bool(b) => KvTree::Bool(*b),
            Self::Integer(i) => KvTree::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(KvTree::Number)
                .unwrap_or(KvTree::Null),
            Self::String(s) => KvTree::String(s.clone()),
            Self::List(items) => KvTree::Array(items.iter().map(Value::to_kv).collect()),
            Self::Map(entries) => KvTree::Object(
                entries
                    .iter()
                    .map(|(key, value)| (key.clone(), value.to_kv()))
                    .collect(),
            ),
            Self::Model(model) => model.dump(),
        }
    }

    /// Convert a key-value tree without a schema. Objects become maps.
    pub fn from_kv_untyped(raw: &KvTree) -> Self {
        match raw {
            KvTree::Null => Self::Null,
            KvTree::Bool(b) => Self::Bool(*b),
            KvTree::Number(n) => match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            KvTree::String(s) => Self::String(s.clone()),
            KvTree::Array(items) => Self::List(items.iter().map(Self::from_kv_untyped).collect()),
            KvTree::Object(entries) => Self::Map(
                entries
                    .iter()
                    .map(|(key, value)| (key.clone(), Self::from_kv_untyped(value)))
                    .collect(),
            ),
        }
    }
}

/// Nested models compare by deep equality: same schema handle and equal
/// field values. Distinct instances with equal content are equal.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Map(a), Self::Map(b)) => a == b,
            (Self::Model(a), Self::Model(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<u16> for Value {
    fn from(value: u16) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Model> for Value {
    fn from(value: Model) -> Self {
        Self::Model(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}
