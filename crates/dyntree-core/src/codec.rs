//! Record codec: converting application values to and from row attributes.
//!
//! The tree never interprets payloads. A value type opts in by implementing
//! [`Storable`]; for any serde type the [`to_item`] and [`from_item`]
//! helpers do the work:
//!
//! ```
//! use dyntree_core::codec::{self, CodecError, Storable};
//! use dyntree_store::Item;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Account {
//!     email: String,
//! }
//!
//! impl Storable for Account {
//!     fn to_item(&self) -> Result<Item, CodecError> {
//!         codec::to_item(self)
//!     }
//!     fn from_item(item: &Item) -> Result<Self, CodecError> {
//!         codec::from_item(item)
//!     }
//! }
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use dyntree_store::{AttributeValue, Item};

/// Errors raised while converting values to or from attributes.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Only values that serialize to a JSON object can become a row.
    #[error("value does not serialize to an object")]
    NotAnObject,

    /// A stored number attribute is not valid decimal text.
    #[error("invalid number attribute: {0:?}")]
    InvalidNumber(String),

    /// serde_json failed in either direction.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error raised by a hand-written [`Storable`] implementation.
    #[error("{0}")]
    Custom(String),
}

impl CodecError {
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }
}

/// A value that can be stored at a tree path.
pub trait Storable: Sized {
    /// Produce the attributes of the object row.
    fn to_item(&self) -> Result<Item, CodecError>;

    /// Rebuild the value from the attributes of an object row.
    fn from_item(item: &Item) -> Result<Self, CodecError>;
}

impl Storable for Item {
    fn to_item(&self) -> Result<Item, CodecError> {
        Ok(self.clone())
    }

    fn from_item(item: &Item) -> Result<Self, CodecError> {
        Ok(item.clone())
    }
}

/// Serialize any serde value into row attributes.
///
/// Objects become `M`, arrays `L`, numbers `N` (decimal text), strings `S`,
/// booleans `Bool` and nulls `Null`. The top-level value must be an object.
pub fn to_item<T: Serialize + ?Sized>(value: &T) -> Result<Item, CodecError> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map
            .into_iter()
            .map(|(name, v)| (name, json_to_attribute(v)))
            .collect()),
        _ => Err(CodecError::NotAnObject),
    }
}

/// Deserialize row attributes into any serde value.
pub fn from_item<T: DeserializeOwned>(item: &Item) -> Result<T, CodecError> {
    let mut map = Map::with_capacity(item.len());
    for (name, attribute) in item {
        map.insert(name.clone(), attribute_to_json(attribute)?);
    }
    Ok(serde_json::from_value(Value::Object(map))?)
}

/// Convert a JSON value into an attribute value.
pub fn json_to_attribute(value: Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null,
        Value::Bool(b) => AttributeValue::Bool(b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s),
        Value::Array(values) => {
            AttributeValue::L(values.into_iter().map(json_to_attribute).collect())
        }
        Value::Object(map) => AttributeValue::M(
            map.into_iter()
                .map(|(name, v)| (name, json_to_attribute(v)))
                .collect(),
        ),
    }
}

/// Convert an attribute value into JSON. Binary becomes an array of bytes.
pub fn attribute_to_json(attribute: &AttributeValue) -> Result<Value, CodecError> {
    Ok(match attribute {
        AttributeValue::Null => Value::Null,
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::N(n) => match serde_json::from_str::<Value>(n) {
            Ok(number @ Value::Number(_)) => number,
            _ => return Err(CodecError::InvalidNumber(n.clone())),
        },
        AttributeValue::B(bytes) => {
            Value::Array(bytes.iter().map(|b| Value::from(*b)).collect())
        }
        AttributeValue::L(values) => Value::Array(
            values
                .iter()
                .map(attribute_to_json)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        AttributeValue::M(map) => {
            let mut out = Map::with_capacity(map.len());
            for (name, v) in map {
                out.insert(name.clone(), attribute_to_json(v)?);
            }
            Value::Object(out)
        }
    })
}
