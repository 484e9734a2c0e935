// SPDX-License-Identifier: MIT

//! One pipe instance: a nonblocking stream with an explicit connection
//! state, a FIFO write queue, and incremental frame decoding on the read
//! side. Instances are created vacant, attached to an accepted stream, and
//! reset back to vacant for reuse when the peer goes away.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::os::unix::net::UnixStream;

use thiserror::Error;
use tracing::warn;

use hl_wire::{decode, Decoded, Envelope, WireError};

const READ_CHUNK: usize = 8 * 1024;

/// Transport-level faults. A disconnected peer is NOT an error — it
/// surfaces as [`ReadOutcome::Disconnected`] / [`WriteProgress::Disconnected`]
/// so callers can apply slot close policy instead of failing.
#[derive(Debug, Error)]
pub enum PipeError {
    #[error("pipe i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("unresyncable frame stream: {0}")]
    Frame(#[from] WireError),
}

/// Connection state of an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeState {
    /// Vacant: listening for (or awaiting assignment of) a connection
    Disconnected,
    /// A peer is attached
    Connected,
    /// Broken beyond the normal disconnect path; awaiting reset
    Errored,
}

/// Outcome of one nonblocking read poll
#[derive(Debug)]
pub enum ReadOutcome {
    /// One complete envelope
    Frame(Envelope),
    /// Nothing available right now (possibly a partial frame buffered)
    WouldBlock,
    /// Peer closed the connection
    Disconnected,
    /// A frame arrived but did not parse; it was skipped (already logged)
    Corrupt,
}

/// Outcome of servicing the write queue once
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteProgress {
    /// Queue was empty
    Idle,
    /// At least one byte went out
    Wrote,
    /// Queue non-empty but the stream would block
    Blocked,
    /// Peer closed the connection
    Disconnected,
}

/// One endpoint instance
#[derive(Debug)]
pub struct PipeInstance {
    state: PipeState,
    stream: Option<UnixStream>,
    read_buf: Vec<u8>,
    write_queue: VecDeque<Vec<u8>>,
    /// Bytes of the front frame already written
    write_offset: usize,
}

impl Default for PipeInstance {
    fn default() -> Self {
        Self::vacant()
    }
}

impl PipeInstance {
    pub fn vacant() -> Self {
        PipeInstance {
            state: PipeState::Disconnected,
            stream: None,
            read_buf: Vec::new(),
            write_queue: VecDeque::new(),
            write_offset: 0,
        }
    }

    pub fn state(&self) -> PipeState {
        self.state
    }

    pub fn connected(&self) -> bool {
        self.state == PipeState::Connected
    }

    /// A write is in flight (queued or partially written)
    pub fn writing(&self) -> bool {
        !self.write_queue.is_empty()
    }

    /// A partial frame is buffered awaiting more bytes
    pub fn reading(&self) -> bool {
        !self.read_buf.is_empty()
    }

    /// Attach an accepted stream; switches it to nonblocking mode.
    pub fn attach(&mut self, stream: UnixStream) -> Result<(), PipeError> {
        stream.set_nonblocking(true)?;
        self.read_buf.clear();
        self.write_queue.clear();
        self.write_offset = 0;
        self.stream = Some(stream);
        self.state = PipeState::Connected;
        Ok(())
    }

    /// Enqueue a framed buffer; never blocks.
    pub fn push_write(&mut self, frame: Vec<u8>) {
        self.write_queue.push_back(frame);
    }

    /// Service the write queue without blocking: write until the stream
    /// would block or the queue drains.
    pub fn advance_write(&mut self) -> Result<WriteProgress, PipeError> {
        if self.write_queue.is_empty() {
            return Ok(WriteProgress::Idle);
        }
        let Some(stream) = self.stream.as_mut() else {
            return Ok(WriteProgress::Disconnected);
        };
        let mut wrote = false;
        while let Some(front) = self.write_queue.front() {
            match stream.write(&front[self.write_offset..]) {
                Ok(0) => {
                    self.state = PipeState::Errored;
                    return Ok(WriteProgress::Disconnected);
                }
                Ok(n) => {
                    wrote = true;
                    self.write_offset += n;
                    if self.write_offset == front.len() {
                        self.write_queue.pop_front();
                        self.write_offset = 0;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(if wrote { WriteProgress::Wrote } else { WriteProgress::Blocked });
                }
                Err(e)
                    if e.kind() == io::ErrorKind::BrokenPipe
                        || e.kind() == io::ErrorKind::ConnectionReset =>
                {
                    self.state = PipeState::Errored;
                    return Ok(WriteProgress::Disconnected);
                }
                Err(e) => {
                    self.state = PipeState::Errored;
                    return Err(PipeError::Io(e));
                }
            }
        }
        Ok(WriteProgress::Wrote)
    }

    /// Poll for one envelope without blocking.
    pub fn poll_read(&mut self) -> Result<ReadOutcome, PipeError> {
        if self.state != PipeState::Connected {
            return Ok(ReadOutcome::WouldBlock);
        }
        // A complete frame may already be buffered from an earlier read.
        if let Some(outcome) = self.decode_buffered()? {
            return Ok(outcome);
        }
        let Some(stream) = self.stream.as_mut() else {
            return Ok(ReadOutcome::Disconnected);
        };
        let mut chunk = [0u8; READ_CHUNK];
        match stream.read(&mut chunk) {
            Ok(0) => Ok(ReadOutcome::Disconnected),
            Ok(n) => {
                self.read_buf.extend_from_slice(&chunk[..n]);
                Ok(self.decode_buffered()?.unwrap_or(ReadOutcome::WouldBlock))
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(ReadOutcome::WouldBlock),
            Err(e)
                if e.kind() == io::ErrorKind::BrokenPipe
                    || e.kind() == io::ErrorKind::ConnectionReset =>
            {
                Ok(ReadOutcome::Disconnected)
            }
            Err(e) => {
                self.state = PipeState::Errored;
                Err(PipeError::Io(e))
            }
        }
    }

    /// Force back to `Disconnected`; drops queued writes and buffers.
    pub fn reset(&mut self) {
        self.state = PipeState::Disconnected;
        self.stream = None;
        self.read_buf.clear();
        self.write_queue.clear();
        self.write_offset = 0;
    }

    fn decode_buffered(&mut self) -> Result<Option<ReadOutcome>, PipeError> {
        match decode(&self.read_buf) {
            Ok(Decoded::Frame { envelope, consumed }) => {
                self.read_buf.drain(..consumed);
                Ok(Some(ReadOutcome::Frame(envelope)))
            }
            Ok(Decoded::Incomplete) => Ok(None),
            Ok(Decoded::Corrupt { consumed, reason }) => {
                warn!(error = %reason, "skipping corrupt frame");
                self.read_buf.drain(..consumed);
                Ok(Some(ReadOutcome::Corrupt))
            }
            Err(e) => {
                self.state = PipeState::Errored;
                Err(PipeError::Frame(e))
            }
        }
    }
}

#[cfg(test)]
#[path = "pipe_tests.rs"]
mod tests;
