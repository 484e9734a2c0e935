// SPDX-License-Identifier: MIT

//! System-call dispatch: host-directed operations carried as function
//! calls with the `system` target. These act on the session itself
//! (console designation, slot close, shutdown) or answer questions about
//! the runtime, and never re-enter the language evaluator except for the
//! pointer-installation forward.

use std::path::Path;

use tracing::{debug, info, warn};

use hl_wire::{CallTarget, Envelope, FunctionCall, Value};

use crate::config;
use crate::pool::CloseOutcome;
use crate::router::{Session, SessionError};
use crate::runtime::{LanguageRuntime, INSTALL_APPLICATION_POINTER_HOOK};

pub const SYS_INSTALL_POINTER: &str = "install-application-pointer";
pub const SYS_LIST_FUNCTIONS: &str = "list-functions";
pub const SYS_GET_LANGUAGE: &str = "get-language";
pub const SYS_READ_SOURCE_FILE: &str = "read-source-file";
pub const SYS_SHUTDOWN: &str = "shutdown";
pub const SYS_CONSOLE: &str = "console";
pub const SYS_CLOSE: &str = "close";

/// How a system call affects control flow
#[derive(Debug)]
pub enum SystemOutcome {
    /// Carry on; reply to the caller if one was produced and requested
    Response(Option<Envelope>),
    /// Orderly shutdown was requested
    Shutdown,
    /// The call closed the primary slot
    PrimaryClosed,
}

pub fn system_call(
    session: &mut Session,
    runtime: &mut dyn LanguageRuntime,
    envelope: &Envelope,
    call: &FunctionCall,
    slot: usize,
) -> Result<SystemOutcome, SessionError> {
    debug!(function = %call.function, slot, "system call");
    match call.function.as_str() {
        SYS_INSTALL_POINTER => {
            // hand the host application pointer through to the runtime
            // under its registration hook name
            let forward = FunctionCall {
                target: CallTarget::Language,
                function: INSTALL_APPLICATION_POINTER_HOOK.into(),
                arguments: call.arguments.clone(),
            };
            let mut scratch = Envelope::response_to(envelope);
            runtime.evaluate(&forward, &mut scratch);
            Ok(SystemOutcome::Response(Some(Envelope::result(
                envelope.id,
                Value::bool(true),
            ))))
        }
        SYS_LIST_FUNCTIONS => Ok(SystemOutcome::Response(Some(Envelope::result(
            envelope.id,
            runtime.registered_functions(),
        )))),
        SYS_GET_LANGUAGE => Ok(SystemOutcome::Response(Some(Envelope::result(
            envelope.id,
            Value::str(runtime.language_tag()),
        )))),
        SYS_READ_SOURCE_FILE => {
            let path = call.arguments.first().and_then(Value::as_str);
            let notify = call
                .arguments
                .get(1)
                .and_then(Value::as_bool)
                .unwrap_or(false);
            let loaded = match path {
                Some(path) => runtime.read_source_file(Path::new(path), notify),
                None => {
                    warn!("read-source-file called without a path");
                    false
                }
            };
            Ok(SystemOutcome::Response(Some(Envelope::result(
                envelope.id,
                Value::bool(loaded),
            ))))
        }
        SYS_SHUTDOWN => {
            info!("shutdown requested");
            session.console.control(&mut session.pool, SYS_SHUTDOWN)?;
            if !session.flush_writes(config::SHUTDOWN_FLUSH_TIMEOUT) {
                warn!("shutdown broadcast did not fully flush");
            }
            Ok(SystemOutcome::Shutdown)
        }
        SYS_CONSOLE => {
            // first come, first served: a later client must not steal the
            // console designation from the one already attached
            if session.console.attached() {
                warn!(slot, "console client already attached; ignoring");
            } else {
                info!(slot, "console client attached");
                session.console.attach(&mut session.pool, slot);
            }
            Ok(SystemOutcome::Response(None))
        }
        SYS_CLOSE => match session.close_slot(slot) {
            CloseOutcome::FatalPrimary => Ok(SystemOutcome::PrimaryClosed),
            CloseOutcome::CallbackLost | CloseOutcome::Reset => {
                Ok(SystemOutcome::Response(None))
            }
        },
        other => {
            warn!(function = other, "unknown system call");
            Ok(SystemOutcome::Response(Some(Envelope::result(
                envelope.id,
                Value::bool(false),
            ))))
        }
    }
}
