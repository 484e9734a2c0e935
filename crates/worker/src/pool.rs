// SPDX-License-Identifier: MIT

//! The pipe pool: a bounded, growable set of instances behind the primary
//! endpoint, plus the dedicated callback instance on its derived endpoint.
//!
//! Slot indices are stable for the life of the pool. Slot 0 is the primary
//! client — its disconnection is fatal to the worker. Slot 1 is the
//! callback channel, reserved for host-initiated re-entry; its loss is
//! logged but survivable. The pool keeps at least one vacant slot while
//! below the cap so a new client never waits for an existing one to free.

use std::io;
use std::os::unix::net::UnixListener;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::pipe::{PipeError, PipeInstance};

/// Slot whose disconnection terminates the worker
pub const PRIMARY_SLOT: usize = 0;

/// Slot reserved for host-initiated callbacks
pub const CALLBACK_SLOT: usize = 1;

/// Fixed cap on concurrent pipe instances
pub const MAX_PIPE_COUNT: usize = 8;

/// Result of applying slot close policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// The primary client went away; the worker must terminate
    FatalPrimary,
    /// The callback channel went away; survivable but degraded
    CallbackLost,
    /// An ordinary slot was reset for reuse
    Reset,
}

pub struct PipePool {
    primary: UnixListener,
    callback: UnixListener,
    primary_path: PathBuf,
    callback_path: PathBuf,
    instances: Vec<PipeInstance>,
}

impl PipePool {
    /// Bind both endpoints nonblocking. Slots 0 and 1 start vacant; the
    /// first primary connection lands in slot 0.
    pub fn bind(primary_path: &Path, callback_path: &Path) -> Result<Self, PipeError> {
        let primary = bind_fresh(primary_path)?;
        let callback = bind_fresh(callback_path)?;
        primary.set_nonblocking(true)?;
        callback.set_nonblocking(true)?;
        Ok(PipePool {
            primary,
            callback,
            primary_path: primary_path.to_path_buf(),
            callback_path: callback_path.to_path_buf(),
            instances: vec![PipeInstance::vacant(), PipeInstance::vacant()],
        })
    }

    /// Block until the first primary client connects (startup handshake:
    /// the runtime must not begin evaluating before anything is attached).
    pub fn accept_primary_blocking(&mut self) -> Result<usize, PipeError> {
        self.primary.set_nonblocking(false)?;
        let (stream, _) = self.primary.accept()?;
        self.primary.set_nonblocking(true)?;
        match self.assign_primary(stream)? {
            Some(slot) => Ok(slot),
            None => Err(PipeError::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "no free slot for first client",
            ))),
        }
    }

    /// Poll both listeners once; returns the slot that connected, if any.
    pub fn accept(&mut self) -> Result<Option<usize>, PipeError> {
        match self.callback.accept() {
            Ok((stream, _)) => {
                if self.instances[CALLBACK_SLOT].connected() {
                    warn!("callback endpoint already connected; dropping extra client");
                } else {
                    self.instances[CALLBACK_SLOT].attach(stream)?;
                    return Ok(Some(CALLBACK_SLOT));
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => return Err(PipeError::Io(e)),
        }
        match self.primary.accept() {
            Ok((stream, _)) => self.assign_primary(stream),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(PipeError::Io(e)),
        }
    }

    /// Add one vacant instance if none is listening and the cap allows —
    /// the standing-listener guarantee.
    pub fn grow(&mut self) {
        let vacant = self
            .instances
            .iter()
            .enumerate()
            .any(|(slot, i)| slot != CALLBACK_SLOT && !i.connected());
        if !vacant && self.instances.len() < MAX_PIPE_COUNT {
            self.instances.push(PipeInstance::vacant());
            debug!(slots = self.instances.len(), "pool grown");
        }
    }

    /// Apply slot close policy. The caller handles the outcome (process
    /// termination for the primary, console detach for ordinary slots).
    pub fn close(&mut self, slot: usize) -> CloseOutcome {
        match slot {
            PRIMARY_SLOT => CloseOutcome::FatalPrimary,
            CALLBACK_SLOT => {
                self.instances[slot].reset();
                CloseOutcome::CallbackLost
            }
            _ => {
                self.instances[slot].reset();
                CloseOutcome::Reset
            }
        }
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Count of vacant (listening-capable) non-callback slots
    pub fn listening_slots(&self) -> usize {
        self.instances
            .iter()
            .enumerate()
            .filter(|(slot, i)| *slot != CALLBACK_SLOT && !i.connected())
            .count()
    }

    pub fn instance(&self, slot: usize) -> &PipeInstance {
        &self.instances[slot]
    }

    pub fn instance_mut(&mut self, slot: usize) -> &mut PipeInstance {
        &mut self.instances[slot]
    }

    fn assign_primary(
        &mut self,
        stream: std::os::unix::net::UnixStream,
    ) -> Result<Option<usize>, PipeError> {
        let slot = self
            .instances
            .iter()
            .enumerate()
            .find(|(slot, i)| *slot != CALLBACK_SLOT && !i.connected())
            .map(|(slot, _)| slot);
        let slot = match slot {
            Some(slot) => slot,
            None if self.instances.len() < MAX_PIPE_COUNT => {
                self.instances.push(PipeInstance::vacant());
                self.instances.len() - 1
            }
            None => {
                warn!("pipe pool at capacity; dropping connection");
                return Ok(None);
            }
        };
        self.instances[slot].attach(stream)?;
        self.grow();
        Ok(Some(slot))
    }
}

impl Drop for PipePool {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.primary_path);
        let _ = std::fs::remove_file(&self.callback_path);
    }
}

fn bind_fresh(path: &Path) -> Result<UnixListener, PipeError> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    Ok(UnixListener::bind(path)?)
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
