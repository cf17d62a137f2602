use std::io;
use thiserror::Error;

/// Which side of the socket a failed transfer was on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Send,
    Recv,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Send => f.write_str("send"),
            Direction::Recv => f.write_str("recv"),
        }
    }
}

/// Framing failures. The connection is unusable after any of these.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("short {dir} of {what}: expected {expected} bytes, transferred {actual}")]
    Short {
        dir: Direction,
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("{dir} of {what} failed")]
    Io {
        dir: Direction,
        what: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("string of {len} bytes does not fit a 32-bit length prefix")]
    TooLong { len: usize },
    #[error("expected exactly one descriptor, received {count}")]
    Descriptors { count: usize },
}

impl ProtocolError {
    pub(crate) fn io(dir: Direction, what: &'static str, source: io::Error) -> Self {
        ProtocolError::Io { dir, what, source }
    }
}
