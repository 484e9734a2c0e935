// SPDX-License-Identifier: MIT

//! Worker-side RPC core for delegated function evaluation.
//!
//! A spreadsheet host hands evaluation off to this worker process over a
//! small pool of local pipes; the worker can call back into the host —
//! including nested, re-entrant callback chains — while still inside the
//! evaluation of an earlier request. The pieces:
//!
//! - [`pipe`] / [`pool`]: nonblocking pipe instances and the bounded,
//!   self-replenishing pool of them sharing one endpoint.
//! - [`router`]: the single-threaded cooperative reactor that decodes
//!   envelopes, tracks call depth, and routes responses and callbacks.
//! - [`console`]: the interactive console session (attach, buffer, flush).
//! - [`interrupt`]: the out-of-band management channel for cancellation.
//! - [`launch`]: host-facing process lifecycle (kill-on-close group).

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod config;
pub mod console;
pub mod interrupt;
pub mod launch;
pub mod pipe;
pub mod pool;
pub mod router;
pub mod runtime;
mod syscall;

pub use config::Config;
pub use console::ConsoleSession;
pub use interrupt::CancelFlag;
pub use launch::WorkerHandle;
pub use pool::{PipePool, CALLBACK_SLOT, MAX_PIPE_COUNT, PRIMARY_SLOT};
pub use router::{Exit, Session, SessionError};
pub use runtime::{EchoRuntime, Evaluation, HostHooks, LanguageRuntime, NullHostHooks};
