// SPDX-License-Identifier: MIT

//! The call router: a single-threaded cooperative reactor over the pipe
//! pool. Exactly one envelope is ever being dispatched at a time;
//! re-entrancy happens by recursion into [`Session::read_line`], never by
//! threads. The session object owns all protocol state — pool, call-depth
//! stack, console designation — so nothing here is ambient or static.

use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use hl_wire::{encode, CallTarget, Envelope, Operation, WireError};

use crate::config;
use crate::console::{ConsoleError, ConsoleSession};
use crate::pipe::{PipeError, ReadOutcome, WriteProgress};
use crate::pool::{CloseOutcome, PipePool, CALLBACK_SLOT};
use crate::runtime::{Evaluation, HostHooks, LanguageRuntime};
use crate::syscall::{self, SystemOutcome};

/// Why the session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// An explicit `shutdown` system call
    Shutdown,
    /// The primary client's connection broke
    PrimaryDisconnect,
}

/// Outcome of one `read_line` invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOutcome {
    /// A shell line was copied into the caller's buffer
    Line,
    /// A shutdown was requested while waiting; unwind
    Shutdown,
    /// The primary client went away while waiting; unwind
    PrimaryDisconnect,
}

/// Router-level failures (transport and codec faults that survived the
/// per-slot close policy)
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Transport(#[from] PipeError),

    #[error(transparent)]
    Wire(#[from] WireError),

    #[error(transparent)]
    Console(#[from] ConsoleError),

    #[error("callback channel is not connected")]
    CallbackUnavailable,

    #[error("timed out waiting for callback reply")]
    CallbackTimeout,
}

/// All mutable protocol state, owned by the router thread.
pub struct Session {
    pub(crate) pool: PipePool,
    pub(crate) console: ConsoleSession,
    call_depth: u32,
    active_pipe: Vec<usize>,
    recursive_calls: bool,
    prompt_transaction_id: u32,
}

impl Session {
    pub fn new(pool: PipePool) -> Self {
        Session {
            pool,
            console: ConsoleSession::new(),
            call_depth: 0,
            active_pipe: Vec::new(),
            recursive_calls: false,
            prompt_transaction_id: 0,
        }
    }

    /// Current call nesting (depth counter, origin-slot stack). The two
    /// move in lockstep; both are zero at idle.
    pub fn depth(&self) -> (u32, usize) {
        (self.call_depth, self.active_pipe.len())
    }

    /// Push normal console output
    pub fn console_out(&mut self, text: &str) -> Result<(), SessionError> {
        let envelope = Envelope {
            id: 0,
            wait: false,
            op: Operation::Console(hl_wire::ConsoleMessage::Stdout(text.into())),
        };
        Ok(self.console.push(&mut self.pool, &envelope)?)
    }

    /// Push console error output
    pub fn console_err(&mut self, text: &str) -> Result<(), SessionError> {
        let envelope = Envelope {
            id: 0,
            wait: false,
            op: Operation::Console(hl_wire::ConsoleMessage::Stderr(text.into())),
        };
        Ok(self.console.push(&mut self.pool, &envelope)?)
    }

    /// Top-level loop: prompt, wait for a shell line, hand it to the
    /// runtime, repeat until shutdown or primary disconnect.
    pub fn run(
        &mut self,
        runtime: &mut dyn LanguageRuntime,
        hooks: &mut dyn HostHooks,
    ) -> Result<Exit, SessionError> {
        let mut prompt = config::DEFAULT_PROMPT.to_string();
        loop {
            let mut line = String::new();
            match self.read_line(runtime, hooks, &prompt, &mut line)? {
                LineOutcome::Line => match runtime.shell_input(&line) {
                    Evaluation::Complete => prompt = config::DEFAULT_PROMPT.to_string(),
                    Evaluation::NeedsInput { prompt: continuation } => prompt = continuation,
                },
                LineOutcome::Shutdown => return Ok(Exit::Shutdown),
                LineOutcome::PrimaryDisconnect => return Ok(Exit::PrimaryDisconnect),
            }
        }
    }

    /// The reactor: emit a prompt, then wait on all instances — accepting
    /// connections, servicing writes, dispatching reads, firing the
    /// periodic hooks on idle — until one `ShellCommand` arrives. Called
    /// at depth 0 for top-level input and recursively from inside a
    /// dispatch when an evaluation requests more input.
    pub fn read_line(
        &mut self,
        runtime: &mut dyn LanguageRuntime,
        hooks: &mut dyn HostHooks,
        prompt: &str,
        buf: &mut String,
    ) -> Result<LineOutcome, SessionError> {
        if self.call_depth > 0 {
            // a nested prompt; the console will need a reset when we
            // return to depth zero
            debug!(depth = self.call_depth, "console prompt at depth");
            self.recursive_calls = true;
        }
        let prompt_id = self.prompt_transaction_id;
        self.console.prompt(&mut self.pool, prompt, prompt_id)?;

        let mut idle = Duration::ZERO;
        loop {
            let mut progress = false;

            while let Some(slot) = self.pool.accept()? {
                info!(slot, "client connected");
                progress = true;
            }

            for slot in 0..self.pool.len() {
                if !self.pool.instance(slot).writing() {
                    continue;
                }
                match self.pool.instance_mut(slot).advance_write()? {
                    WriteProgress::Wrote => progress = true,
                    WriteProgress::Disconnected => {
                        progress = true;
                        if let Some(outcome) = self.handle_disconnect(slot) {
                            return Ok(outcome);
                        }
                    }
                    WriteProgress::Blocked | WriteProgress::Idle => {}
                }
            }

            for slot in 0..self.pool.len() {
                match self.pool.instance_mut(slot).poll_read() {
                    Ok(ReadOutcome::Frame(envelope)) => {
                        progress = true;
                        if let Some(outcome) =
                            self.dispatch(runtime, hooks, envelope, slot, buf)?
                        {
                            return Ok(outcome);
                        }
                    }
                    Ok(ReadOutcome::Corrupt) => progress = true, // logged at the pipe
                    Ok(ReadOutcome::Disconnected) => {
                        progress = true;
                        if let Some(outcome) = self.handle_disconnect(slot) {
                            return Ok(outcome);
                        }
                    }
                    Ok(ReadOutcome::WouldBlock) => {}
                    Err(e) => {
                        warn!(slot, error = %e, "transport fault");
                        progress = true;
                        if let Some(outcome) = self.handle_disconnect(slot) {
                            return Ok(outcome);
                        }
                    }
                }
            }

            if progress {
                idle = Duration::ZERO;
            } else {
                std::thread::sleep(config::POLL_SLEEP);
                idle += config::POLL_SLEEP;
                if idle >= config::idle_tick() {
                    runtime.tick();
                    hooks.idle();
                    idle = Duration::ZERO;
                }
            }
        }
    }

    /// Outbound re-entrant callback into the host. Nested callbacks always
    /// route through the designated callback slot, regardless of which
    /// slot issued the call being evaluated; a mismatched top-of-stack is
    /// only diagnosed. (Deliberate: the callback slot is the re-entry
    /// channel the host watches.)
    pub fn host_callback(
        &mut self,
        call: &Envelope,
        timeout: Duration,
    ) -> Result<Option<Envelope>, SessionError> {
        if let Some(&top) = self.active_pipe.last() {
            if top != CALLBACK_SLOT {
                warn!(top, "callback while active pipe is not the callback slot");
            }
        }
        if !self.pool.instance(CALLBACK_SLOT).connected() {
            return Err(SessionError::CallbackUnavailable);
        }
        let frame = encode(call)?;
        self.pool.instance_mut(CALLBACK_SLOT).push_write(frame);

        let deadline = Instant::now() + timeout;
        while self.pool.instance(CALLBACK_SLOT).writing() {
            if let WriteProgress::Disconnected =
                self.pool.instance_mut(CALLBACK_SLOT).advance_write()?
            {
                return Err(SessionError::CallbackUnavailable);
            }
            if Instant::now() > deadline {
                return Err(SessionError::CallbackTimeout);
            }
            std::thread::sleep(config::WRITE_POLL_SLEEP);
        }
        if !call.wait {
            return Ok(None);
        }
        loop {
            match self.pool.instance_mut(CALLBACK_SLOT).poll_read()? {
                ReadOutcome::Frame(reply) => return Ok(Some(reply)),
                ReadOutcome::Disconnected => return Err(SessionError::CallbackUnavailable),
                ReadOutcome::WouldBlock | ReadOutcome::Corrupt => {}
            }
            if Instant::now() > deadline {
                return Err(SessionError::CallbackTimeout);
            }
            std::thread::sleep(config::WRITE_POLL_SLEEP);
        }
    }

    /// Apply slot close policy and its side effects.
    pub(crate) fn close_slot(&mut self, slot: usize) -> CloseOutcome {
        let outcome = self.pool.close(slot);
        if outcome == CloseOutcome::Reset && self.console.client() == Some(slot) {
            info!(slot, "console client detached");
            self.console.detach();
        }
        outcome
    }

    /// Busy-poll all write queues until drained or `timeout`; returns
    /// whether everything flushed.
    pub(crate) fn flush_writes(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let mut pending = false;
            for slot in 0..self.pool.len() {
                if !self.pool.instance(slot).writing() {
                    continue;
                }
                match self.pool.instance_mut(slot).advance_write() {
                    Ok(WriteProgress::Blocked) => pending = true,
                    Ok(WriteProgress::Wrote) => {
                        pending |= self.pool.instance(slot).writing();
                    }
                    _ => {}
                }
            }
            if !pending {
                return true;
            }
            if Instant::now() > deadline {
                return false;
            }
            std::thread::sleep(config::WRITE_POLL_SLEEP);
        }
    }

    fn handle_disconnect(&mut self, slot: usize) -> Option<LineOutcome> {
        match self.close_slot(slot) {
            CloseOutcome::FatalPrimary => {
                error!("primary client disconnected");
                Some(LineOutcome::PrimaryDisconnect)
            }
            CloseOutcome::CallbackLost => {
                warn!("callback pipe closed");
                None
            }
            CloseOutcome::Reset => {
                debug!(slot, "client disconnected; slot reset");
                None
            }
        }
    }

    fn dispatch(
        &mut self,
        runtime: &mut dyn LanguageRuntime,
        hooks: &mut dyn HostHooks,
        envelope: Envelope,
        slot: usize,
        buf: &mut String,
    ) -> Result<Option<LineOutcome>, SessionError> {
        debug_assert_eq!(self.call_depth as usize, self.active_pipe.len());
        let mut flow = None;
        match &envelope.op {
            Operation::FunctionCall(call) if call.target == CallTarget::System => {
                self.begin_call(slot);
                let outcome = syscall::system_call(self, runtime, &envelope, call, slot);
                self.end_call();
                match outcome? {
                    SystemOutcome::Shutdown => return Ok(Some(LineOutcome::Shutdown)),
                    SystemOutcome::PrimaryClosed => {
                        return Ok(Some(LineOutcome::PrimaryDisconnect))
                    }
                    SystemOutcome::Response(Some(response)) if envelope.wait => {
                        self.enqueue(slot, &response)?;
                    }
                    SystemOutcome::Response(_) => {}
                }
            }
            Operation::FunctionCall(call) => {
                self.begin_call(slot);
                let mut response = Envelope::response_to(&envelope);
                let evaluation = runtime.evaluate(call, &mut response);
                let nested = self.complete_evaluation(runtime, hooks, evaluation, &mut response);
                self.end_call();
                if let Some(outcome) = nested? {
                    return Ok(Some(outcome));
                }
                if envelope.wait {
                    self.enqueue(slot, &response)?;
                }
            }
            Operation::Code { source } => {
                self.begin_call(slot);
                let mut response = Envelope::response_to(&envelope);
                let evaluation = runtime.exec(source, &mut response);
                let nested = self.complete_evaluation(runtime, hooks, evaluation, &mut response);
                self.end_call();
                if let Some(outcome) = nested? {
                    return Ok(Some(outcome));
                }
                if envelope.wait {
                    self.enqueue(slot, &response)?;
                }
            }
            Operation::UserCommand { line } => {
                let mut response = Envelope::response_to(&envelope);
                runtime.user_command(line, &mut response);
                if envelope.wait {
                    self.enqueue(slot, &response)?;
                }
            }
            Operation::ShellCommand { line } => {
                buf.clear();
                buf.push_str(line);
                buf.push('\n');
                self.prompt_transaction_id = envelope.id;
                flow = Some(LineOutcome::Line);
            }
            Operation::Console(_) | Operation::Result(_) => {
                debug!(slot, "ignoring unsolicited envelope");
            }
        }
        if self.call_depth == 0 && self.recursive_calls {
            debug!("unwinding recursive prompt state");
            self.recursive_calls = false;
            let id = self.prompt_transaction_id;
            self.console.reset_prompt(&mut self.pool, id)?;
        }
        Ok(flow)
    }

    /// Drive an evaluation to completion, recursing into the reactor each
    /// time the runtime asks for another line of input.
    fn complete_evaluation(
        &mut self,
        runtime: &mut dyn LanguageRuntime,
        hooks: &mut dyn HostHooks,
        mut evaluation: Evaluation,
        response: &mut Envelope,
    ) -> Result<Option<LineOutcome>, SessionError> {
        loop {
            match evaluation {
                Evaluation::Complete => return Ok(None),
                Evaluation::NeedsInput { prompt } => {
                    let mut line = String::new();
                    match self.read_line(runtime, hooks, &prompt, &mut line)? {
                        LineOutcome::Line => evaluation = runtime.resume(&line, response),
                        other => return Ok(Some(other)),
                    }
                }
            }
        }
    }

    fn enqueue(&mut self, slot: usize, response: &Envelope) -> Result<(), SessionError> {
        if !self.pool.instance(slot).connected() {
            debug!(slot, "dropping response; client gone");
            return Ok(());
        }
        let frame = encode(response)?;
        self.pool.instance_mut(slot).push_write(frame);
        Ok(())
    }

    fn begin_call(&mut self, slot: usize) {
        self.call_depth += 1;
        self.active_pipe.push(slot);
    }

    fn end_call(&mut self) {
        self.active_pipe.pop();
        self.call_depth = self.call_depth.saturating_sub(1);
        debug_assert_eq!(self.call_depth as usize, self.active_pipe.len());
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
