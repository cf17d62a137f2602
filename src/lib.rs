//! Hand an invocation to a warm resident server and act like it ran here.

pub mod address;
pub mod bootstrap;
pub mod context;
pub mod logging;
pub mod relay;
pub mod session;

use bootstrap::{BOOTSTRAP_PAYLOAD, Backoff, Bootstrapper, InterpreterStarter, UnixConnector};
use context::EnvPolicy;
use prewarm_core::{Config, LaunchError};
use prewarm_ipc::{LaunchRequest, LaunchResult, StdioFds};
use session::Session;
use std::io;
use std::os::fd::AsFd;
use tracing::debug;

/// Run this invocation remotely and return the server's verdict.
pub fn launch(config: &Config) -> Result<LaunchResult, LaunchError> {
    let policy = EnvPolicy::from_allow_list(config.env_allow.as_deref());
    let context = context::capture(&policy)?;

    let socket = address::resolve(config)?;
    debug!(path = %socket.display(), "server address");

    let starter = InterpreterStarter::new(config, BOOTSTRAP_PAYLOAD);
    let mut boot = Bootstrapper::new(UnixConnector, starter, Backoff::default());
    let stream = boot.connect(&socket)?;

    let (stdin, stdout, stderr) = (io::stdin(), io::stdout(), io::stderr());
    let request = LaunchRequest {
        context,
        stdio: StdioFds {
            stdin: stdin.as_fd(),
            stdout: stdout.as_fd(),
            stderr: stderr.as_fd(),
        },
    };
    Session::new(stream).run(&request)
}
