use prewarm_ipc::ProtocolError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// The server socket path could not be produced.
#[derive(Error, Debug)]
pub enum AddressError {
    #[error("no passwd entry for uid {uid}")]
    UnknownUser { uid: u32 },
    #[error("passwd lookup for uid {uid} failed")]
    Lookup {
        uid: u32,
        #[source]
        source: io::Error,
    },
    #[error("socket path {} is {len} bytes, longer than the {max}-byte limit", path.display())]
    TooLong { path: PathBuf, len: usize, max: usize },
}

/// Starting the resident server failed, or it never became reachable.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("cannot spawn interpreter {}", interpreter.display())]
    Spawn {
        interpreter: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("interpreter has no stdin pipe")]
    NoPipe,
    #[error("writing bootstrap payload failed after {written} of {total} bytes")]
    Feed {
        written: usize,
        total: usize,
        #[source]
        source: io::Error,
    },
    #[error("server at {} not reachable after {attempts} attempts", path.display())]
    Unreachable { path: PathBuf, attempts: u32 },
}

/// Every way a launch can fail. All of them are fatal to the launcher.
#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("server address")]
    Address(#[from] AddressError),
    #[error("connect() {} failed", path.display())]
    Connect {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("server startup")]
    Startup(#[from] StartupError),
    #[error("protocol")]
    Protocol(#[from] ProtocolError),
    #[error("cannot resolve working directory")]
    Context(#[source] io::Error),
}
