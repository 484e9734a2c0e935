// SPDX-License-Identifier: MIT

//! Collaborator interfaces consumed by the router, plus the reference
//! runtime used by the standalone binary and the test suite. Real language
//! embeddings (an R or Julia interpreter loop) live outside this crate and
//! implement [`LanguageRuntime`].

use std::path::Path;

use thiserror::Error;
use tracing::debug;

use hl_wire::{CallResult, Envelope, FunctionCall, Operation, Value};

use crate::interrupt::CancelFlag;

/// Function name used to hand the host application pointer to the runtime
/// (the `install-application-pointer` system call re-targets to this).
pub const INSTALL_APPLICATION_POINTER_HOOK: &str = "hostlink.install.application.pointer";

/// Function name a runtime uses to release an external-pointer handle.
pub const RELEASE_POINTER_FUNCTION: &str = "release-pointer";

/// How an evaluation step ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    /// The response envelope is final
    Complete,
    /// The runtime needs another line of shell input before it can finish
    /// (debugger break, continuation line); the router must obtain one and
    /// call [`LanguageRuntime::resume`]
    NeedsInput { prompt: String },
}

/// Embedded-runtime version the worker refuses to run against
#[derive(Debug, Error)]
#[error("unsupported runtime version: {found}")]
pub struct UnsupportedRuntime {
    pub found: String,
}

/// The language-evaluation collaborator. All methods are invoked
/// synchronously from the router thread.
pub trait LanguageRuntime {
    /// Identity tag reported by the `get-language` system call
    fn language_tag(&self) -> String;

    /// Verify the embedded runtime is a supported version; checked once
    /// before any pipe is created.
    fn check_version(&self) -> Result<(), UnsupportedRuntime> {
        Ok(())
    }

    /// Currently registered functions, for the `list-functions` system call
    fn registered_functions(&self) -> Value;

    /// Evaluate a function call, filling in `response`
    fn evaluate(&mut self, call: &FunctionCall, response: &mut Envelope) -> Evaluation;

    /// Evaluate source text, filling in `response`
    fn exec(&mut self, source: &str, response: &mut Envelope) -> Evaluation;

    /// Execute a raw user command (not re-entrant; no depth tracking)
    fn user_command(&mut self, line: &str, response: &mut Envelope);

    /// Feed one top-level line of shell input
    fn shell_input(&mut self, line: &str) -> Evaluation;

    /// Continue an evaluation that reported [`Evaluation::NeedsInput`]
    fn resume(&mut self, line: &str, response: &mut Envelope) -> Evaluation;

    /// Load and evaluate a source file; `notify` requests console feedback
    fn read_source_file(&mut self, path: &Path, notify: bool) -> bool;

    /// Idle hook, fired on reactor ticks; the place to observe the
    /// cooperative cancellation flag
    fn tick(&mut self) {}

    /// Release an external-pointer handle owned by the host side
    fn release_external(&mut self, _handle: u64) {}
}

/// Host-side periodic hook (redraw/idle), fired alongside the runtime tick
pub trait HostHooks {
    fn idle(&mut self) {}
}

/// No-op host hooks for standalone operation
#[derive(Default)]
pub struct NullHostHooks;

impl HostHooks for NullHostHooks {}

/// Reference runtime: evaluates nothing, echoes calls back as results.
/// Lets the full protocol stack run without a language embedding.
pub struct EchoRuntime {
    cancel: CancelFlag,
    functions: Vec<String>,
}

impl EchoRuntime {
    pub fn new(cancel: CancelFlag) -> Self {
        EchoRuntime { cancel, functions: vec!["echo".into()] }
    }
}

impl LanguageRuntime for EchoRuntime {
    fn language_tag(&self) -> String {
        format!("echo::{}", env!("CARGO_PKG_VERSION"))
    }

    fn registered_functions(&self) -> Value {
        Value::array(self.functions.iter().map(Value::str).collect())
    }

    fn evaluate(&mut self, call: &FunctionCall, response: &mut Envelope) -> Evaluation {
        if call.function == RELEASE_POINTER_FUNCTION {
            if let Some(Value::ExternalPointer { handle }) = call.arguments.first() {
                self.release_external(*handle);
            }
            response.op = Operation::Result(CallResult::Value(Value::bool(true)));
            return Evaluation::Complete;
        }
        let mut echoed = vec![Value::str(&call.function)];
        echoed.extend(call.arguments.iter().cloned());
        response.op = Operation::Result(CallResult::Value(Value::array(echoed)));
        Evaluation::Complete
    }

    fn exec(&mut self, source: &str, response: &mut Envelope) -> Evaluation {
        response.op = Operation::Result(CallResult::Value(Value::str(source)));
        Evaluation::Complete
    }

    fn user_command(&mut self, line: &str, response: &mut Envelope) {
        response.op = Operation::Result(CallResult::Value(Value::str(line)));
    }

    fn shell_input(&mut self, line: &str) -> Evaluation {
        debug!(line, "shell input consumed");
        Evaluation::Complete
    }

    fn resume(&mut self, _line: &str, response: &mut Envelope) -> Evaluation {
        response.op = Operation::Result(CallResult::Value(Value::bool(true)));
        Evaluation::Complete
    }

    fn read_source_file(&mut self, path: &Path, _notify: bool) -> bool {
        path.exists()
    }

    fn tick(&mut self) {
        if self.cancel.take() {
            debug!("cancellation flag observed and cleared");
        }
    }

    fn release_external(&mut self, handle: u64) {
        debug!(handle, "external pointer released");
    }
}
