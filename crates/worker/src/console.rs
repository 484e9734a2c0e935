// SPDX-License-Identifier: MIT

//! Console session management.
//!
//! At most one connected client is the interactive console. Console-bound
//! envelopes are written straight to that client when one is attached and
//! buffered (already framed, in order) when none is; attaching flushes the
//! buffer atomically with respect to the router. A synchronous
//! send-and-wait primitive covers direct console round-trips made from
//! inside a dispatch, where the reactor cannot be re-entered.

use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::debug;

use hl_wire::{encode, ConsoleMessage, Envelope, FunctionCall, Operation, WireError};

use crate::config;
use crate::pipe::{PipeError, ReadOutcome, WriteProgress};
use crate::pool::PipePool;

/// Console round-trip and delivery errors
#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("no console client attached")]
    NotAttached,

    #[error("console client disconnected mid-exchange")]
    Disconnected,

    #[error("console reply was not parseable")]
    BadReply,

    #[error("timed out waiting on console client")]
    Timeout,

    #[error(transparent)]
    Transport(#[from] PipeError),

    #[error(transparent)]
    Wire(#[from] WireError),
}

/// Console client designation plus the pending-output buffer
#[derive(Default)]
pub struct ConsoleSession {
    client: Option<usize>,
    pending: Vec<Vec<u8>>,
}

impl ConsoleSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn client(&self) -> Option<usize> {
        self.client
    }

    pub fn attached(&self) -> bool {
        self.client.is_some()
    }

    /// Number of buffered frames awaiting a client
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Frame and deliver a console-bound envelope, or buffer it if no
    /// client is attached.
    pub fn push(&mut self, pool: &mut PipePool, envelope: &Envelope) -> Result<(), ConsoleError> {
        let frame = encode(envelope)?;
        match self.client {
            Some(slot) if pool.instance(slot).connected() => {
                pool.instance_mut(slot).push_write(frame);
            }
            _ => self.pending.push(frame),
        }
        Ok(())
    }

    /// Prompt for the next line of input, correlated to `id`.
    pub fn prompt(
        &mut self,
        pool: &mut PipePool,
        text: &str,
        id: u32,
    ) -> Result<(), ConsoleError> {
        let envelope =
            Envelope { id, wait: false, op: Operation::Console(ConsoleMessage::Prompt(text.into())) };
        self.push(pool, &envelope)
    }

    /// Control message addressed to the console UI (e.g. `shutdown`).
    pub fn control(&mut self, pool: &mut PipePool, function: &str) -> Result<(), ConsoleError> {
        let envelope = Envelope {
            id: 0,
            wait: false,
            op: Operation::FunctionCall(FunctionCall::system(function)),
        };
        self.push(pool, &envelope)
    }

    /// Tell the console to discard nested-prompt UI state accumulated
    /// while recursive calls were active.
    pub fn reset_prompt(&mut self, pool: &mut PipePool, id: u32) -> Result<(), ConsoleError> {
        let envelope = Envelope {
            id,
            wait: false,
            op: Operation::FunctionCall(FunctionCall::system("reset-prompt")),
        };
        self.push(pool, &envelope)
    }

    /// Designate `slot` as the console client and flush everything buffered,
    /// in original order.
    pub fn attach(&mut self, pool: &mut PipePool, slot: usize) {
        self.client = Some(slot);
        let instance = pool.instance_mut(slot);
        for frame in self.pending.drain(..) {
            instance.push_write(frame);
        }
    }

    /// Drop the client designation; subsequent pushes buffer again.
    pub fn detach(&mut self) {
        self.client = None;
    }

    /// Send one envelope to the console client and busy-poll for exactly
    /// one reply. Invoked from inside a dispatch, so it spins with a short
    /// sleep instead of re-entering the reactor; a partial frame keeps the
    /// wait alive, anything else fails the exchange.
    pub fn request(
        &mut self,
        pool: &mut PipePool,
        envelope: &Envelope,
        timeout: Duration,
    ) -> Result<Envelope, ConsoleError> {
        let slot = self.client.ok_or(ConsoleError::NotAttached)?;
        if !pool.instance(slot).connected() {
            return Err(ConsoleError::Disconnected);
        }
        pool.instance_mut(slot).push_write(encode(envelope)?);

        let deadline = Instant::now() + timeout;
        while pool.instance(slot).writing() {
            if let WriteProgress::Disconnected = pool.instance_mut(slot).advance_write()? {
                return Err(ConsoleError::Disconnected);
            }
            if Instant::now() > deadline {
                return Err(ConsoleError::Timeout);
            }
            std::thread::sleep(config::WRITE_POLL_SLEEP);
        }
        loop {
            match pool.instance_mut(slot).poll_read()? {
                ReadOutcome::Frame(reply) => {
                    debug!(id = reply.id, "console reply received");
                    return Ok(reply);
                }
                ReadOutcome::WouldBlock => {}
                ReadOutcome::Corrupt => return Err(ConsoleError::BadReply),
                ReadOutcome::Disconnected => return Err(ConsoleError::Disconnected),
            }
            if Instant::now() > deadline {
                return Err(ConsoleError::Timeout);
            }
            std::thread::sleep(config::WRITE_POLL_SLEEP);
        }
    }
}

#[cfg(test)]
#[path = "console_tests.rs"]
mod tests;
