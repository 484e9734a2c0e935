// SPDX-License-Identifier: MIT

use serde::{Deserialize, Serialize};

/// A value passed in or out of a function call.
///
/// Arrays are homogeneous by convention only — nothing on the wire enforces
/// element kinds, so consumers must handle mixed arrays defensively.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Value {
    /// Boolean scalar
    Bool { value: bool },

    /// Numeric scalar (all numbers travel as f64)
    Number { value: f64 },

    /// String scalar
    Str { value: String },

    /// Ordered sequence of values, possibly mixed-kind
    Array { values: Vec<Value> },

    /// Opaque handle into a side table owned by the host-automation layer.
    /// The worker never dereferences it, only passes it back.
    ExternalPointer { handle: u64 },

    /// Error marker carried as data (an evaluation error, not a protocol fault)
    Error { message: String },
}

impl Value {
    pub fn bool(value: bool) -> Self {
        Value::Bool { value }
    }

    pub fn number(value: f64) -> Self {
        Value::Number { value }
    }

    pub fn str(value: impl Into<String>) -> Self {
        Value::Str { value: value.into() }
    }

    pub fn array(values: Vec<Value>) -> Self {
        Value::Array { values }
    }

    /// The string payload, if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str { value } => Some(value),
            _ => None,
        }
    }

    /// The boolean payload, if this is a boolean value.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool { value } => Some(*value),
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "value_tests.rs"]
mod tests;
