// SPDX-License-Identifier: MIT

//! Worker process lifecycle, host side: spawn the worker in its own
//! process group so the whole tree can be torn down at once, and clean up
//! unconditionally when the handle drops. The worker side arms a
//! parent-death signal so it cannot outlive a crashed host.

use std::io;
use std::os::unix::net::UnixStream;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Child, Command};
use std::time::{Duration, Instant};

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config;

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("failed to spawn worker: {0}")]
    Spawn(#[source] io::Error),

    #[error("worker did not open its endpoint within {0:?}")]
    ConnectTimeout(Duration),
}

/// A spawned worker process. Dropping the handle kills the worker's whole
/// process group — anything the runtime spawned underneath it included.
pub struct WorkerHandle {
    child: Child,
}

impl WorkerHandle {
    /// Spawn `command` as the leader of a fresh process group.
    pub fn spawn(command: &mut Command) -> Result<Self, LaunchError> {
        let child = command.process_group(0).spawn().map_err(LaunchError::Spawn)?;
        debug!(pid = child.id(), "worker spawned");
        Ok(WorkerHandle { child })
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Whether the worker has exited on its own.
    pub fn exited(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(Some(_)))
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        if let Ok(Some(status)) = self.child.try_wait() {
            debug!(%status, "worker already exited");
            return;
        }
        let group = Pid::from_raw(self.child.id() as i32);
        if let Err(e) = killpg(group, Signal::SIGKILL) {
            warn!(error = %e, "failed to kill worker process group");
        }
        let _ = self.child.wait();
    }
}

/// The command line a host uses to start a worker against `endpoint`.
pub fn worker_command(program: &Path, endpoint: &str, runtime_home: &Path) -> Command {
    let mut command = Command::new(program);
    command
        .arg("-p")
        .arg(endpoint)
        .arg("-r")
        .arg(runtime_home);
    command
}

/// Worker side: request SIGTERM if the parent process dies, closing the
/// window where a crashed host leaves the worker orphaned.
pub fn arm_parent_death_signal() {
    if let Err(e) = nix::sys::prctl::set_pdeathsig(Signal::SIGTERM) {
        warn!(error = %e, "could not arm parent-death signal");
    }
}

/// Connect to a worker endpoint, retrying while the worker is still
/// binding its sockets.
pub fn connect_with_retry(path: &Path, timeout: Duration) -> Result<UnixStream, LaunchError> {
    let deadline = Instant::now() + timeout;
    loop {
        match UnixStream::connect(path) {
            Ok(stream) => return Ok(stream),
            Err(_) if Instant::now() < deadline => {
                std::thread::sleep(config::POLL_SLEEP);
            }
            Err(_) => return Err(LaunchError::ConnectTimeout(timeout)),
        }
    }
}

#[cfg(test)]
#[path = "launch_tests.rs"]
mod tests;
