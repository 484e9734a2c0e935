// SPDX-License-Identifier: MIT

//! `hlw` — the standalone worker binary.
//!
//! Startup order matters: verify configuration and runtime version before
//! any socket exists, then bring up the management channel, then bind the
//! pipe endpoints, and only then block waiting for the first client. A
//! host that can connect is guaranteed a worker that is ready to evaluate.

use std::path::PathBuf;
use std::process::exit;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use hl_worker::config::Config;
use hl_worker::interrupt::{self, CancelFlag};
use hl_worker::launch;
use hl_worker::pool::PipePool;
use hl_worker::router::{Exit, Session};
use hl_worker::runtime::{EchoRuntime, LanguageRuntime, NullHostHooks};

/// Missing or unusable configuration (endpoint, runtime home)
const EXIT_CONFIGURATION_ERROR: i32 = 2;

/// The embedded runtime is an unsupported version
const EXIT_UNSUPPORTED_VERSION: i32 = 3;

#[derive(Debug, Parser)]
#[command(name = "hlw", version, about = "hostlink evaluation worker")]
struct Args {
    /// Endpoint name shared with the host
    #[arg(short = 'p', long = "pipe")]
    pipe: Option<String>,

    /// Root of the embedded runtime installation
    #[arg(short = 'r', long = "runtime-home")]
    runtime_home: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let (pipe, runtime_home) = match (args.pipe, args.runtime_home) {
        (Some(pipe), Some(home)) => (pipe, home),
        (pipe, _) => {
            let missing = if pipe.is_none() { "pipe endpoint (-p)" } else { "runtime home (-r)" };
            error!(missing, "configuration incomplete");
            exit(EXIT_CONFIGURATION_ERROR);
        }
    };
    let config = Config::new(pipe, runtime_home);

    let cancel = CancelFlag::new();
    let mut runtime = EchoRuntime::new(cancel.clone());
    if let Err(e) = runtime.check_version() {
        error!(error = %e, "refusing to start");
        exit(EXIT_UNSUPPORTED_VERSION);
    }

    launch::arm_parent_death_signal();

    if let Err(e) = interrupt::spawn(config.management_socket(), cancel) {
        error!(error = %e, "management channel failed to start");
        exit(EXIT_CONFIGURATION_ERROR);
    }

    let mut pool = match PipePool::bind(&config.primary_socket(), &config.callback_socket()) {
        Ok(pool) => pool,
        Err(e) => {
            error!(error = %e, "could not bind pipe endpoints");
            exit(EXIT_CONFIGURATION_ERROR);
        }
    };

    info!(endpoint = %config.endpoint, "waiting for first client");
    if let Err(e) = pool.accept_primary_blocking() {
        error!(error = %e, "first client never attached");
        exit(EXIT_CONFIGURATION_ERROR);
    }
    info!("primary client connected");

    let mut session = Session::new(pool);
    let mut hooks = NullHostHooks;
    match session.run(&mut runtime, &mut hooks) {
        Ok(Exit::Shutdown) => info!("orderly shutdown"),
        Ok(Exit::PrimaryDisconnect) => info!("primary client gone; exiting"),
        Err(e) => {
            error!(error = %e, "session failed");
            exit(1);
        }
    }
}
