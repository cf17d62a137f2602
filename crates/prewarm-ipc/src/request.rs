//! Launch Request / Launch Result messages.
//!
//! Request, in send order:
//!
//! 1. `string` cwd
//! 2. environment, one of
//!    - full: `u32` count, then one `string` per `NAME=value`
//!    - filtered: one `string` of `\n`-joined `NAME=value` entries
//! 3. `u32` argc, then argc `string`s (argv[0] included)
//! 4. three descriptor messages: stdin, stdout, stderr
//!
//! Responses: `u32` worker pid, then `[u32 exit_code][u32 remote_pid]`.

use crate::error::ProtocolError;
use crate::fdpass::DescriptorChannel;
use crate::wire::{self, read_str, read_u32, write_str, write_u32};
use std::io::{Read, Write};
use std::os::fd::{BorrowedFd, OwnedFd};

/// Which environment encoding both ends agreed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnvMode {
    #[default]
    Full,
    Filtered,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    /// Every `NAME=value` entry, in process order.
    Full(Vec<Vec<u8>>),
    /// Allow-listed entries joined with `\n`.
    Filtered(Vec<u8>),
}

impl Environment {
    pub fn mode(&self) -> EnvMode {
        match self {
            Environment::Full(_) => EnvMode::Full,
            Environment::Filtered(_) => EnvMode::Filtered,
        }
    }

    /// True if `entry` (`NAME=value`) is one of the carried entries.
    pub fn contains(&self, entry: &[u8]) -> bool {
        match self {
            Environment::Full(entries) => entries.iter().any(|e| e == entry),
            Environment::Filtered(blob) => blob.split(|b| *b == b'\n').any(|e| e == entry),
        }
    }
}

/// Scalar part of a launch request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchContext {
    pub cwd: Vec<u8>,
    pub env: Environment,
    pub argv: Vec<Vec<u8>>,
}

fn count(len: usize) -> Result<u32, ProtocolError> {
    u32::try_from(len).map_err(|_| ProtocolError::TooLong { len })
}

impl LaunchContext {
    pub fn encode<W: Write>(&self, w: &mut W) -> Result<(), ProtocolError> {
        write_str(w, &self.cwd)?;
        match &self.env {
            Environment::Full(entries) => {
                write_u32(w, count(entries.len())?)?;
                for e in entries {
                    write_str(w, e)?;
                }
            }
            Environment::Filtered(blob) => write_str(w, blob)?,
        }
        write_u32(w, count(self.argv.len())?)?;
        for a in &self.argv {
            write_str(w, a)?;
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut buf = Vec::new();
        self.encode(&mut buf)?;
        Ok(buf)
    }

    /// Server-side decoder. Counts come from the peer, so nothing is
    /// preallocated from them.
    pub fn decode<R: Read>(r: &mut R, mode: EnvMode) -> Result<Self, ProtocolError> {
        let cwd = read_str(r)?;
        let env = match mode {
            EnvMode::Full => {
                let n = read_u32(r)?;
                let mut entries = Vec::new();
                for _ in 0..n {
                    entries.push(read_str(r)?);
                }
                Environment::Full(entries)
            }
            EnvMode::Filtered => Environment::Filtered(read_str(r)?),
        };
        let argc = read_u32(r)?;
        let mut argv = Vec::new();
        for _ in 0..argc {
            argv.push(read_str(r)?);
        }
        Ok(LaunchContext { cwd, env, argv })
    }
}

/// The caller's standard streams, borrowed for the duration of the send.
#[derive(Debug, Clone, Copy)]
pub struct StdioFds<'a> {
    pub stdin: BorrowedFd<'a>,
    pub stdout: BorrowedFd<'a>,
    pub stderr: BorrowedFd<'a>,
}

impl<'a> StdioFds<'a> {
    /// Wire order. The server reads them back in this order.
    pub fn in_order(&self) -> [BorrowedFd<'a>; 3] {
        [self.stdin, self.stdout, self.stderr]
    }
}

#[derive(Debug)]
pub struct ReceivedStdio {
    pub stdin: OwnedFd,
    pub stdout: OwnedFd,
    pub stderr: OwnedFd,
}

impl ReceivedStdio {
    pub fn recv<C: DescriptorChannel + ?Sized>(chan: &mut C) -> Result<Self, ProtocolError> {
        let stdin = chan.recv_fd()?;
        let stdout = chan.recv_fd()?;
        let stderr = chan.recv_fd()?;
        Ok(ReceivedStdio {
            stdin,
            stdout,
            stderr,
        })
    }
}

#[derive(Debug)]
pub struct LaunchRequest<'a> {
    pub context: LaunchContext,
    pub stdio: StdioFds<'a>,
}

impl LaunchRequest<'_> {
    /// Sends every scalar field, then the three descriptors.
    pub fn send<S: Write + DescriptorChannel>(&self, stream: &mut S) -> Result<(), ProtocolError> {
        let bytes = self.context.to_bytes()?;
        wire::send_all(stream, &bytes, "launch context")?;
        for fd in self.stdio.in_order() {
            stream.send_fd(fd)?;
        }
        Ok(())
    }
}

/// Terminal response for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchResult {
    pub exit_code: u32,
    pub remote_pid: u32,
}

impl LaunchResult {
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<(), ProtocolError> {
        let mut buf = [0u8; 8];
        buf[..4].copy_from_slice(&self.exit_code.to_be_bytes());
        buf[4..].copy_from_slice(&self.remote_pid.to_be_bytes());
        wire::send_all(w, &buf, "result tuple")
    }

    pub fn read_from<R: Read>(r: &mut R) -> Result<Self, ProtocolError> {
        let mut buf = [0u8; 8];
        wire::recv_exact(r, &mut buf, "result tuple")?;
        let (code, pid) = buf.split_at(4);
        Ok(LaunchResult {
            exit_code: u32::from_be_bytes([code[0], code[1], code[2], code[3]]),
            remote_pid: u32::from_be_bytes([pid[0], pid[1], pid[2], pid[3]]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fdpass::LoopbackChannel;
    use std::fs::File;
    use std::io::Cursor;
    use std::os::fd::AsFd;
    use std::os::unix::net::UnixStream;

    fn ctx(env: Environment) -> LaunchContext {
        LaunchContext {
            cwd: b"/home/u/proj".to_vec(),
            env,
            argv: vec![b"prog".to_vec(), b"--flag".to_vec(), b"value".to_vec()],
        }
    }

    #[test]
    fn full_env_layout_is_exact() {
        let c = LaunchContext {
            cwd: b"/w".to_vec(),
            env: Environment::Full(vec![b"A=1".to_vec()]),
            argv: vec![b"p".to_vec()],
        };
        let bytes = c.to_bytes().unwrap();
        #[rustfmt::skip]
        let expected: &[u8] = &[
            0, 0, 0, 2, b'/', b'w',
            0, 0, 0, 1,
            0, 0, 0, 3, b'A', b'=', b'1',
            0, 0, 0, 1,
            0, 0, 0, 1, b'p',
        ];
        assert_eq!(bytes, expected);
    }

    #[test]
    fn decodes_back_in_both_env_modes() {
        let full = ctx(Environment::Full(vec![
            b"PYTHONPATH=/x".to_vec(),
            b"HOME=/home/u".to_vec(),
        ]));
        let bytes = full.to_bytes().unwrap();
        let back = LaunchContext::decode(&mut Cursor::new(bytes), EnvMode::Full).unwrap();
        assert_eq!(back, full);
        assert!(back.env.contains(b"PYTHONPATH=/x"));

        let filtered = ctx(Environment::Filtered(b"PYTHONPATH=/x\nHOME=/home/u".to_vec()));
        let bytes = filtered.to_bytes().unwrap();
        let back = LaunchContext::decode(&mut Cursor::new(bytes), EnvMode::Filtered).unwrap();
        assert_eq!(back, filtered);
        assert!(back.env.contains(b"HOME=/home/u"));
        assert!(!back.env.contains(b"HOME"));
    }

    #[test]
    fn bogus_counts_fail_without_allocating() {
        let mut bytes = Vec::new();
        write_str(&mut bytes, b"/").unwrap();
        write_u32(&mut bytes, u32::MAX).unwrap();
        let err = LaunchContext::decode(&mut Cursor::new(bytes), EnvMode::Full).unwrap_err();
        assert!(matches!(err, ProtocolError::Short { .. }));
    }

    #[test]
    fn result_tuple_is_two_network_words() {
        let r = LaunchResult {
            exit_code: 137,
            remote_pid: 4242,
        };
        let mut buf = Vec::new();
        r.write_to(&mut buf).unwrap();
        assert_eq!(buf, [0, 0, 0, 137, 0, 0, 0x10, 0x92]);
        assert_eq!(LaunchResult::read_from(&mut Cursor::new(buf)).unwrap(), r);
    }

    #[test]
    fn half_a_result_is_short() {
        let err = LaunchResult::read_from(&mut Cursor::new(vec![0, 0, 0, 1])).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Short {
                expected: 8,
                actual: 4,
                ..
            }
        ));
    }

    fn read_all(fd: OwnedFd) -> String {
        let mut s = String::new();
        File::from(fd).read_to_string(&mut s).unwrap();
        s
    }

    #[test]
    fn request_over_socket_delivers_streams_in_order() {
        let (r_in, mut w_in) = std::io::pipe().unwrap();
        let (r_out, mut w_out) = std::io::pipe().unwrap();
        let (r_err, mut w_err) = std::io::pipe().unwrap();

        let request = LaunchRequest {
            context: ctx(Environment::Full(vec![b"PYTHONPATH=/x".to_vec()])),
            stdio: StdioFds {
                stdin: r_in.as_fd(),
                stdout: r_out.as_fd(),
                stderr: r_err.as_fd(),
            },
        };

        let (mut client, mut server) = UnixStream::pair().unwrap();
        request.send(&mut client).unwrap();
        drop(request);
        drop((r_in, r_out, r_err));

        let decoded = LaunchContext::decode(&mut server, EnvMode::Full).unwrap();
        assert_eq!(decoded.argv.len(), 3);
        let stdio = ReceivedStdio::recv(&mut server).unwrap();

        w_in.write_all(b"in").unwrap();
        w_out.write_all(b"out").unwrap();
        w_err.write_all(b"err").unwrap();
        drop((w_in, w_out, w_err));

        assert_eq!(read_all(stdio.stdin), "in");
        assert_eq!(read_all(stdio.stdout), "out");
        assert_eq!(read_all(stdio.stderr), "err");
    }

    #[test]
    fn request_over_loopback_keeps_bytes_and_descriptors_apart() {
        let devnull = File::open("/dev/null").unwrap();
        let request = LaunchRequest {
            context: ctx(Environment::Filtered(b"PYTHONPATH=/x".to_vec())),
            stdio: StdioFds {
                stdin: devnull.as_fd(),
                stdout: devnull.as_fd(),
                stderr: devnull.as_fd(),
            },
        };
        let mut chan = LoopbackChannel::new();
        request.send(&mut chan).unwrap();
        assert_eq!(chan.pending_fds(), 3);
        let decoded =
            LaunchContext::decode(&mut Cursor::new(chan.outbound().to_vec()), EnvMode::Filtered)
                .unwrap();
        assert_eq!(decoded, request.context);
    }
}
