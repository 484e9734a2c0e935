// SPDX-License-Identifier: MIT

//! Envelope types and frame codec for host ⇄ worker pipe traffic.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod envelope;
mod frame;
mod value;

pub use envelope::{CallResult, CallTarget, ConsoleMessage, Envelope, FunctionCall, Operation};
pub use frame::{decode, encode, Decoded, WireError, LENGTH_PREFIX_LEN, MAX_FRAME_LEN};
pub use value::Value;
