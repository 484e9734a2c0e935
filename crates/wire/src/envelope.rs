// SPDX-License-Identifier: MIT

use serde::{Deserialize, Serialize};

use crate::Value;

/// One message exchanged over a pipe, in either direction.
///
/// `id` correlates a request with its response: the requester picks it, the
/// responder echoes it. `wait = false` means the sender neither expects nor
/// requires a framed response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    pub id: u32,

    #[serde(default)]
    pub wait: bool,

    pub op: Operation,
}

impl Envelope {
    /// A response shell for a request: echoes the id, carries no result yet.
    pub fn response_to(request: &Envelope) -> Self {
        Envelope {
            id: request.id,
            wait: false,
            op: Operation::Result(CallResult::Value(Value::bool(true))),
        }
    }

    /// A result envelope correlated to `id`.
    pub fn result(id: u32, value: Value) -> Self {
        Envelope { id, wait: false, op: Operation::Result(CallResult::Value(value)) }
    }

    /// An error-result envelope correlated to `id`.
    pub fn error(id: u32, message: impl Into<String>) -> Self {
        Envelope { id, wait: false, op: Operation::Result(CallResult::Error(message.into())) }
    }
}

/// Operation kinds carried by an envelope
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Operation {
    /// Call a named function on the given target
    FunctionCall(FunctionCall),

    /// Raw user command text (not re-entrant; no depth tracking)
    UserCommand { line: String },

    /// Source text to evaluate
    Code { source: String },

    /// One line of shell input for the interactive read-eval loop
    ShellCommand { line: String },

    /// Console traffic (prompt/stdout/stderr), host-display only
    Console(ConsoleMessage),

    /// Response to a prior request
    Result(CallResult),
}

/// Where a function call should be dispatched
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CallTarget {
    /// The embedded language runtime
    Language,
    /// The host automation layer (spreadsheet object model)
    HostAutomation,
    /// The worker's own control plane
    System,
}

/// A named call with ordered arguments
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionCall {
    pub target: CallTarget,
    pub function: String,

    #[serde(default)]
    pub arguments: Vec<Value>,
}

impl FunctionCall {
    pub fn system(function: impl Into<String>) -> Self {
        FunctionCall { target: CallTarget::System, function: function.into(), arguments: vec![] }
    }
}

/// Console-directed text, distinguished by stream
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "stream", content = "text", rename_all = "snake_case")]
pub enum ConsoleMessage {
    /// Prompt text requesting the next line of input
    Prompt(String),
    /// Normal output
    Stdout(String),
    /// Error output
    Stderr(String),
}

/// The payload of a response: a value, or an evaluation error.
///
/// Evaluation errors are data — they travel back to the caller like any
/// other result and never tear down the connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CallResult {
    Value(Value),
    Error(String),
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;
