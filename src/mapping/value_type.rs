//! Value-type vocabulary of the mapping documents.
//!
//! Mapping files name value types with colon-delimited tags
//! (`string`, `list:long`, `composite:external-reference`,
//! `relation:created-by-ref`, `key-value:hashes`, ...). Tags are parsed once
//! into [`ValueType`] when a document is decoded and rendered back with
//! [`fmt::Display`].

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::error::{MappingError, ValueError};
use crate::transform::timestamp::Timestamp;

/// Separator between a tag's kind and its subtype.
pub const TYPE_SEPARATOR: char = ':';

/// Declared type of a STIX property value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueType {
    /// `boolean`
    Boolean,
    /// `long`
    Long,
    /// `double`
    Double,
    /// `string`
    String,
    /// `datetime`
    Datetime,
    /// `list:<element type>`
    List(Box<ValueType>),
    /// `composite:<composite name>`
    Composite(String),
    /// `relation:<relation type>`
    Relation(String),
    /// `key-value:<pair schema name>`
    KeyValue(String),
    /// `dictionary`
    Dictionary,
    /// `empty`: the property carries no attribute.
    Empty,
    /// `roleplayer`: the property names a role player of the main relation.
    Roleplayer,
}

impl ValueType {
    /// Returns `true` for scalar types that render to a single literal.
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            ValueType::Boolean
                | ValueType::Long
                | ValueType::Double
                | ValueType::String
                | ValueType::Datetime
        )
    }

    /// Strips one `list:` level, returning the element type for lists.
    pub fn element_type(&self) -> &ValueType {
        match self {
            ValueType::List(inner) => inner,
            other => other,
        }
    }
}

impl FromStr for ValueType {
    type Err = MappingError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        let unknown = || MappingError::UnknownValueType {
            tag: tag.to_string(),
        };
        let (kind, subtype) = match tag.split_once(TYPE_SEPARATOR) {
            Some((kind, subtype)) => (kind, Some(subtype)),
            None => (tag, None),
        };
        let value_type = match (kind, subtype) {
            ("boolean", None) => ValueType::Boolean,
            ("long", None) => ValueType::Long,
            ("double", None) => ValueType::Double,
            ("string", None) => ValueType::String,
            ("datetime", None) => ValueType::Datetime,
            ("dictionary", None) => ValueType::Dictionary,
            ("empty", None) => ValueType::Empty,
            ("roleplayer", None) => ValueType::Roleplayer,
            ("list", Some(inner)) => {
                let inner: ValueType = inner.parse().map_err(|_| unknown())?;
                if matches!(inner, ValueType::List(_)) {
                    return Err(unknown());
                }
                ValueType::List(Box::new(inner))
            }
            ("composite", Some(name)) if !name.is_empty() => ValueType::Composite(name.into()),
            ("relation", Some(name)) if !name.is_empty() => ValueType::Relation(name.into()),
            ("key-value", Some(name)) if !name.is_empty() => ValueType::KeyValue(name.into()),
            _ => return Err(unknown()),
        };
        Ok(value_type)
    }
}

impl<'de> serde::Deserialize<'de> for ValueType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let tag = String::deserialize(deserializer)?;
        tag.parse().map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Boolean => f.write_str("boolean"),
            ValueType::Long => f.write_str("long"),
            ValueType::Double => f.write_str("double"),
            ValueType::String => f.write_str("string"),
            ValueType::Datetime => f.write_str("datetime"),
            ValueType::Dictionary => f.write_str("dictionary"),
            ValueType::Empty => f.write_str("empty"),
            ValueType::Roleplayer => f.write_str("roleplayer"),
            ValueType::List(inner) => write!(f, "list{TYPE_SEPARATOR}{inner}"),
            ValueType::Composite(name) => write!(f, "composite{TYPE_SEPARATOR}{name}"),
            ValueType::Relation(name) => write!(f, "relation{TYPE_SEPARATOR}{name}"),
            ValueType::KeyValue(name) => write!(f, "key-value{TYPE_SEPARATOR}{name}"),
        }
    }
}

/// Infers a value type from the runtime shape of `value`.
///
/// Used for values without a declared type, such as dictionary entries.
/// Strings that parse as STIX timestamps become `datetime`; lists take the
/// type of their first element (`string` when empty).
pub fn default_value_type(value: &Value) -> Result<ValueType, ValueError> {
    match value {
        Value::Bool(_) => Ok(ValueType::Boolean),
        Value::Number(number) if number.is_i64() || number.is_u64() => Ok(ValueType::Long),
        Value::Number(_) => Ok(ValueType::Double),
        Value::String(text) if Timestamp::parse(text).is_ok() => Ok(ValueType::Datetime),
        Value::String(_) => Ok(ValueType::String),
        Value::Array(items) => {
            let inner = match items.first() {
                Some(first) => default_value_type(first)?,
                None => ValueType::String,
            };
            if matches!(inner, ValueType::List(_)) {
                return Err(ValueError::new("nested lists are not supported"));
            }
            Ok(ValueType::List(Box::new(inner)))
        }
        Value::Object(_) => Ok(ValueType::Dictionary),
        Value::Null => Err(ValueError::new("cannot infer the type of a null value")),
    }
}
