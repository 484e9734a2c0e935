// SPDX-License-Identifier: MIT

//! The management channel: a second, independent pipe whose only job is to
//! deliver out-of-band interrupt signals while the router may be blocked
//! inside an evaluation. It runs on its own thread, owns its own listener,
//! and touches nothing but the shared cancellation flag.

use std::io;
use std::os::unix::net::UnixListener;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{debug, error, info, warn};

use hl_wire::Operation;

use crate::config;
use crate::pipe::{PipeInstance, ReadOutcome};

/// Management command that requests cancellation of the in-progress
/// evaluation
pub const BREAK_FUNCTION: &str = "break";

/// Cooperative cancellation handle. The management thread sets it; the
/// language runtime observes it from its idle tick. Last-write-wins
/// visibility is all that is required.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Read and clear in one step
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}

/// Start the management listener thread.
pub fn spawn(socket_path: PathBuf, flag: CancelFlag) -> io::Result<JoinHandle<()>> {
    let listener = bind(&socket_path)?;
    info!(path = %socket_path.display(), "management channel listening");
    std::thread::Builder::new()
        .name("hl-management".into())
        .spawn(move || management_loop(listener, flag))
}

fn bind(path: &Path) -> io::Result<UnixListener> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    let listener = UnixListener::bind(path)?;
    listener.set_nonblocking(true)?;
    Ok(listener)
}

fn management_loop(listener: UnixListener, flag: CancelFlag) {
    let mut instance = PipeInstance::vacant();
    loop {
        if !instance.connected() {
            match listener.accept() {
                Ok((stream, _)) => {
                    debug!("management client connected");
                    if let Err(e) = instance.attach(stream) {
                        warn!(error = %e, "management attach failed");
                        instance.reset();
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => {
                    error!(error = %e, "management accept failed; channel stopping");
                    return;
                }
            }
        } else {
            match instance.poll_read() {
                Ok(ReadOutcome::Frame(envelope)) => {
                    match &envelope.op {
                        Operation::FunctionCall(call) if call.function == BREAK_FUNCTION => {
                            info!("break requested; setting cancellation flag");
                            flag.set();
                        }
                        other => {
                            warn!(?other, "unexpected command on management pipe");
                        }
                    }
                    // drain any further queued frames before sleeping
                    continue;
                }
                Ok(ReadOutcome::WouldBlock) | Ok(ReadOutcome::Corrupt) => {}
                Ok(ReadOutcome::Disconnected) => {
                    warn!("management pipe closed");
                    instance.reset();
                }
                Err(e) => {
                    warn!(error = %e, "management pipe fault");
                    instance.reset();
                }
            }
        }
        std::thread::sleep(config::MANAGEMENT_POLL);
    }
}

#[cfg(test)]
#[path = "interrupt_tests.rs"]
mod tests;
