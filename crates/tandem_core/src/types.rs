//! Core identifier and value types for the replicated document model.
//!
//! Every operation is identified by an [`OpId`] (Lamport counter + actor), every
//! nested object by the [`ObjId`] of the operation that created it, and every
//! list element by the id of the insert that created it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::TandemError;

/// Maximum length of an actor id.
const MAX_ACTOR_LEN: usize = 128;

/// Stable identity of a replica.
///
/// Changes from the same actor are totally ordered by their sequence number.
/// Valid ids are 1-128 characters drawn from ASCII alphanumerics, `-` and `_`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ActorId(String);

impl ActorId {
    /// Create an actor id, validating its format.
    pub fn new(id: impl Into<String>) -> Result<Self, TandemError> {
        let id = id.into();
        if Self::is_valid(&id) {
            Ok(Self(id))
        } else {
            Err(TandemError::InvalidActorId(id))
        }
    }

    /// Generate a fresh random actor id (UUID v4, hex form).
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Check whether a string is a well-formed actor id.
    pub fn is_valid(id: &str) -> bool {
        !id.is_empty()
            && id.len() <= MAX_ACTOR_LEN
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }

    /// Re-check an id that arrived through deserialization.
    pub fn validate(&self) -> Result<(), TandemError> {
        if Self::is_valid(&self.0) {
            Ok(())
        } else {
            Err(TandemError::InvalidActorId(self.0.clone()))
        }
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ActorId {
    type Err = TandemError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Identifier of a single operation: a Lamport counter plus the actor that
/// issued it. Ordered by counter first, then actor, which gives every
/// replica the same total order over operations.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct OpId {
    /// Lamport counter.
    pub counter: u64,
    /// Issuing actor.
    pub actor: ActorId,
}

impl OpId {
    /// Create an operation id.
    pub fn new(counter: u64, actor: ActorId) -> Self {
        Self { counter, actor }
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.counter, self.actor)
    }
}

/// Identifier of a map or list object in the document tree.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "camelCase")]
pub enum ObjId {
    /// The root map of every document.
    Root,
    /// An object created by the operation with this id.
    Id(OpId),
}

impl fmt::Display for ObjId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjId::Root => f.write_str("root"),
            ObjId::Id(id) => id.fmt(f),
        }
    }
}

/// Reference to a position in a list: the head, or an existing element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "camelCase")]
pub enum ElemRef {
    /// Before the first element.
    Head,
    /// The element created by this insert operation.
    Id(OpId),
}

/// The property an operation targets within its object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "camelCase")]
pub enum Key {
    /// A map property.
    Map(String),
    /// A list position.
    Seq(ElemRef),
}

/// A value written by an operation.
///
/// `Map` and `List` do not carry content: they create a new empty object
/// whose id is the id of the operation that wrote them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum Value {
    /// JSON null.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// String.
    Str(String),
    /// A new nested map.
    Map,
    /// A new nested list.
    List,
}

impl Value {
    /// Shallow conversion from JSON: objects and arrays become `Map`/`List`
    /// markers, their contents are written by separate operations.
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Str(s.clone()),
            serde_json::Value::Object(_) => Value::Map,
            serde_json::Value::Array(_) => Value::List,
        }
    }

    /// JSON rendering of a scalar. Objects render as empty containers.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::Map => serde_json::Value::Object(serde_json::Map::new()),
            Value::List => serde_json::Value::Array(Vec::new()),
        }
    }

    /// Whether writing this value creates a nested object.
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Map | Value::List)
    }
}
