// SPDX-License-Identifier: MIT

//! Length-prefixed framing: 4-byte big-endian length + JSON envelope.
//!
//! `decode` distinguishes a partial frame (keep buffering) from a corrupt
//! one (log and drop the frame, keep the connection).

use thiserror::Error;

use crate::Envelope;

/// Size of the length prefix on every frame
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Upper bound on a single frame's payload. A corrupt length header must
/// not be able to trigger an unbounded allocation.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Framing and codec errors
#[derive(Debug, Error)]
pub enum WireError {
    #[error("frame length {0} exceeds maximum {MAX_FRAME_LEN}")]
    Oversize(usize),

    #[error("malformed envelope payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Outcome of a decode attempt against a read buffer
#[derive(Debug)]
pub enum Decoded {
    /// One complete envelope; `consumed` bytes may be drained from the buffer
    Frame { envelope: Envelope, consumed: usize },

    /// Not enough bytes for a full frame yet
    Incomplete,

    /// The length header was intact but the payload did not parse. The frame
    /// boundary is still known, so the caller drains `consumed` bytes and
    /// keeps the connection open.
    Corrupt { consumed: usize, reason: serde_json::Error },
}

/// Serialize an envelope into a length-prefixed frame.
pub fn encode(envelope: &Envelope) -> Result<Vec<u8>, WireError> {
    let payload = serde_json::to_vec(envelope)?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(WireError::Oversize(payload.len()));
    }
    let mut frame = Vec::with_capacity(LENGTH_PREFIX_LEN + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Decode one envelope from the front of `buf`.
///
/// Returns `Incomplete` while fewer bytes are available than the declared
/// length — the transport keeps buffering without discarding anything.
/// An unparseable payload is `Corrupt` (skippable). A declared length over
/// [`MAX_FRAME_LEN`] is unresyncable and surfaces as an error; the caller
/// applies its broken-connection policy.
pub fn decode(buf: &[u8]) -> Result<Decoded, WireError> {
    if buf.len() < LENGTH_PREFIX_LEN {
        return Ok(Decoded::Incomplete);
    }
    let declared = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if declared > MAX_FRAME_LEN {
        return Err(WireError::Oversize(declared));
    }
    if buf.len() < LENGTH_PREFIX_LEN + declared {
        return Ok(Decoded::Incomplete);
    }
    let payload = &buf[LENGTH_PREFIX_LEN..LENGTH_PREFIX_LEN + declared];
    match serde_json::from_slice(payload) {
        Ok(envelope) => Ok(Decoded::Frame { envelope, consumed: LENGTH_PREFIX_LEN + declared }),
        Err(reason) => {
            Ok(Decoded::Corrupt { consumed: LENGTH_PREFIX_LEN + declared, reason })
        }
    }
}

#[cfg(test)]
#[path = "frame_tests.rs"]
mod tests;
