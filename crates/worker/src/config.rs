// SPDX-License-Identifier: MIT

//! Worker configuration and centralized environment access.
//!
//! The host supplies an endpoint name and a runtime root on the command
//! line; everything else (socket directory, poll intervals) has a default
//! with an environment override.

use std::path::PathBuf;
use std::time::Duration;

/// Suffix appended to the primary endpoint for the callback channel
pub const CALLBACK_SUFFIX: &str = "-cb";

/// Suffix appended to the primary endpoint for the management channel
pub const MANAGEMENT_SUFFIX: &str = "-mgmt";

/// Prompt shown for a fresh top-level line of input
pub const DEFAULT_PROMPT: &str = "> ";

/// Sleep between reactor polls when no pipe made progress
pub const POLL_SLEEP: Duration = Duration::from_millis(10);

/// Sleep between iterations of the synchronous write/reply busy-polls
/// (console round-trips and host callbacks run inside a dispatch and must
/// not re-enter the reactor)
pub const WRITE_POLL_SLEEP: Duration = Duration::from_millis(1);

/// Sleep between polls of the management channel's own loop
pub const MANAGEMENT_POLL: Duration = Duration::from_millis(20);

/// How long shutdown waits for queued console frames to drain
pub const SHUTDOWN_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Interval between idle ticks (language-runtime idle hook + host redraw
/// hook), overridable via `HL_IDLE_TICK_MS`.
pub fn idle_tick() -> Duration {
    std::env::var("HL_IDLE_TICK_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_millis(100))
}

/// Default timeout for a blocking host callback round-trip,
/// overridable via `HL_CALLBACK_TIMEOUT_MS`.
pub fn callback_timeout() -> Duration {
    std::env::var("HL_CALLBACK_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(30))
}

/// Resolve socket directory: HL_SOCKET_DIR > XDG_RUNTIME_DIR > temp dir
fn socket_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("HL_SOCKET_DIR") {
        return PathBuf::from(dir);
    }
    if let Ok(dir) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(dir);
    }
    std::env::temp_dir()
}

/// Worker configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Endpoint name shared with the host (not a path)
    pub endpoint: String,
    /// Root of the embedded runtime installation
    pub runtime_home: PathBuf,
    /// Directory holding the endpoint sockets
    pub socket_dir: PathBuf,
}

impl Config {
    pub fn new(endpoint: impl Into<String>, runtime_home: impl Into<PathBuf>) -> Self {
        Config {
            endpoint: endpoint.into(),
            runtime_home: runtime_home.into(),
            socket_dir: socket_dir(),
        }
    }

    /// Same configuration with an explicit socket directory (tests).
    pub fn with_socket_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.socket_dir = dir.into();
        self
    }

    pub fn primary_socket(&self) -> PathBuf {
        self.socket_path(&self.endpoint)
    }

    pub fn callback_socket(&self) -> PathBuf {
        self.socket_path(&format!("{}{}", self.endpoint, CALLBACK_SUFFIX))
    }

    pub fn management_socket(&self) -> PathBuf {
        self.socket_path(&format!("{}{}", self.endpoint, MANAGEMENT_SUFFIX))
    }

    fn socket_path(&self, name: &str) -> PathBuf {
        self.socket_dir.join(format!("{name}.sock"))
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
