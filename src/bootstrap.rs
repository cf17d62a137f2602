//! Connect to the resident server, starting it on first miss.
//!
//! `connect` loops: try the socket; on ENOENT start the server (at most once
//! per launcher) and sleep a little longer each time; any other connect
//! error is fatal. Running out of attempts is a startup failure.

use prewarm_core::config::{DEBUG_VAR, ENV_ALLOW_VAR, INTERPRETER_VAR, SOCKET_VAR};
use prewarm_core::{Config, LaunchError, StartupError};
use std::ffi::OsString;
use std::io;
use std::os::fd::AsFd;
use std::os::unix::net::UnixStream;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::{debug, trace};

/// The server program fed to the interpreter on stdin.
pub const BOOTSTRAP_PAYLOAD: &[u8] = include_bytes!("../assets/server.py");

pub trait Connector {
    type Stream;
    fn connect(&mut self, path: &Path) -> io::Result<Self::Stream>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct UnixConnector;

impl Connector for UnixConnector {
    type Stream = UnixStream;

    fn connect(&mut self, path: &Path) -> io::Result<UnixStream> {
        UnixStream::connect(path)
    }
}

pub trait ServerStarter {
    fn start(&mut self, socket: &Path) -> Result<(), StartupError>;
}

/// Retry schedule while waiting for a freshly started server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub attempts: u32,
    pub first: Duration,
    pub step: Duration,
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff {
            attempts: 200,
            first: Duration::from_millis(1),
            step: Duration::from_millis(1),
            max: Duration::from_millis(5),
        }
    }
}

impl Backoff {
    /// No sleeping at all; for tests.
    pub fn immediate(attempts: u32) -> Self {
        Backoff {
            attempts,
            first: Duration::ZERO,
            step: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    /// Sleep before retry number `retry` (0-based).
    pub fn delay(&self, retry: u32) -> Duration {
        self.first.saturating_add(self.step.saturating_mul(retry)).min(self.max)
    }
}

pub struct Bootstrapper<C, S> {
    connector: C,
    starter: S,
    backoff: Backoff,
    started: bool,
}

impl<C: Connector, S: ServerStarter> Bootstrapper<C, S> {
    pub fn new(connector: C, starter: S, backoff: Backoff) -> Self {
        Bootstrapper {
            connector,
            starter,
            backoff,
            started: false,
        }
    }

    pub fn started(&self) -> bool {
        self.started
    }

    pub fn starter(&self) -> &S {
        &self.starter
    }

    pub fn connect(&mut self, path: &Path) -> Result<C::Stream, LaunchError> {
        let mut retry = 0;
        for attempt in 1..=self.backoff.attempts {
            match self.connector.connect(path) {
                Ok(stream) => {
                    debug!(attempt, path = %path.display(), "connected");
                    return Ok(stream);
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    if !self.started {
                        debug!(path = %path.display(), "no server listening, starting one");
                        self.started = true;
                        self.starter.start(path)?;
                    }
                    let delay = self.backoff.delay(retry);
                    retry += 1;
                    trace!(attempt, ?delay, "server not up yet");
                    std::thread::sleep(delay);
                }
                Err(source) => {
                    return Err(LaunchError::Connect {
                        path: path.to_path_buf(),
                        source,
                    });
                }
            }
        }
        Err(StartupError::Unreachable {
            path: path.to_path_buf(),
            attempts: self.backoff.attempts,
        }
        .into())
    }
}

/// Starts the server by piping `payload` into a detached interpreter.
#[derive(Debug, Clone)]
pub struct InterpreterStarter<'p> {
    pub interpreter: PathBuf,
    pub args: Vec<OsString>,
    pub payload: &'p [u8],
    pub debug: bool,
    pub env_allow: Option<Vec<String>>,
}

impl<'p> InterpreterStarter<'p> {
    pub fn new(config: &Config, payload: &'p [u8]) -> Self {
        InterpreterStarter {
            interpreter: config.interpreter.clone(),
            args: ["-Ss", "-", "(prewarm server)"]
                .into_iter()
                .map(OsString::from)
                .collect(),
            payload,
            debug: config.debug,
            env_allow: config.env_allow.clone(),
        }
    }

    fn command(&self, socket: &Path) -> io::Result<Command> {
        let mut cmd = Command::new(&self.interpreter);
        cmd.arg0("python")
            .args(&self.args)
            .env_clear()
            .env(INTERPRETER_VAR, &self.interpreter)
            .env(SOCKET_VAR, socket)
            .stdin(Stdio::piped())
            .stdout(discard(self.debug)?)
            .stderr(discard(self.debug)?);
        if self.debug {
            cmd.env(DEBUG_VAR, "1");
        }
        if let Some(names) = &self.env_allow {
            cmd.env(ENV_ALLOW_VAR, names.join(","));
        }

        // Detach from our terminal and session so the server outlives us.
        // SAFETY: setsid is async-signal-safe and the closure does not allocate.
        unsafe {
            cmd.pre_exec(|| {
                nix::unistd::setsid()?;
                Ok(())
            });
        }
        Ok(cmd)
    }
}

/// Where the helper's output goes: nowhere, or our stderr when debugging.
fn discard(debug: bool) -> io::Result<Stdio> {
    if debug {
        Ok(Stdio::from(io::stderr().as_fd().try_clone_to_owned()?))
    } else {
        Ok(Stdio::null())
    }
}

impl ServerStarter for InterpreterStarter<'_> {
    fn start(&mut self, socket: &Path) -> Result<(), StartupError> {
        let spawn_err = |source| StartupError::Spawn {
            interpreter: self.interpreter.clone(),
            source,
        };
        let mut cmd = self.command(socket).map_err(spawn_err)?;
        let mut child = cmd.spawn().map_err(spawn_err)?;
        let stdin = child.stdin.take().ok_or(StartupError::NoPipe)?;
        feed_payload(&stdin, self.payload)?;
        drop(stdin);
        // The server is long-lived and never waited on.
        debug!(pid = child.id(), interpreter = %self.interpreter.display(), "server spawned");
        Ok(())
    }
}

/// Write all of `payload`, resuming after EINTR and partial writes.
pub fn feed_payload<Fd: AsFd>(fd: Fd, payload: &[u8]) -> Result<(), StartupError> {
    let mut written = 0;
    while written < payload.len() {
        match rustix::io::write(&fd, &payload[written..]) {
            Ok(0) => {
                return Err(StartupError::Feed {
                    written,
                    total: payload.len(),
                    source: io::ErrorKind::WriteZero.into(),
                });
            }
            Ok(n) => written += n,
            Err(rustix::io::Errno::INTR) => continue,
            Err(e) => {
                return Err(StartupError::Feed {
                    written,
                    total: payload.len(),
                    source: e.into(),
                });
            }
        }
    }
    Ok(())
}
