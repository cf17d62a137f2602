//! Descriptor channel: move an open fd to the peer process.
//!
//! On a Unix socket each descriptor travels as an `SCM_RIGHTS` control
//! message next to a single zero data byte; the peer gets a duplicate that
//! refers to the same open file description. Each call is one discrete
//! message, so the receiver must read them in the order they were sent.

use crate::error::{Direction, ProtocolError};
use nix::sys::socket::{ControlMessage, ControlMessageOwned, MsgFlags, recvmsg, sendmsg};
use std::collections::VecDeque;
use std::io::{self, IoSlice, IoSliceMut, Read, Write};
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::net::UnixStream;

pub trait DescriptorChannel {
    fn send_fd(&mut self, fd: BorrowedFd<'_>) -> Result<(), ProtocolError>;
    fn recv_fd(&mut self) -> Result<OwnedFd, ProtocolError>;
}

impl DescriptorChannel for UnixStream {
    fn send_fd(&mut self, fd: BorrowedFd<'_>) -> Result<(), ProtocolError> {
        let dummy = [0u8; 1];
        let iov = [IoSlice::new(&dummy)];
        let fds = [fd.as_raw_fd()];
        let cmsg = [ControlMessage::ScmRights(&fds)];
        loop {
            match sendmsg::<()>(self.as_raw_fd(), &iov, &cmsg, MsgFlags::empty(), None) {
                Ok(1) => return Ok(()),
                Ok(n) => {
                    return Err(ProtocolError::Short {
                        dir: Direction::Send,
                        what: "descriptor",
                        expected: 1,
                        actual: n,
                    });
                }
                Err(nix::errno::Errno::EINTR) => continue,
                Err(e) => return Err(ProtocolError::io(Direction::Send, "descriptor", e.into())),
            }
        }
    }

    fn recv_fd(&mut self) -> Result<OwnedFd, ProtocolError> {
        let mut byte = [0u8; 1];
        let mut space = nix::cmsg_space!(RawFd);
        let (bytes, received) = loop {
            let mut iov = [IoSliceMut::new(&mut byte)];
            match recvmsg::<()>(self.as_raw_fd(), &mut iov, Some(&mut space), MsgFlags::empty())
            {
                Ok(msg) => {
                    let mut received: Vec<RawFd> = Vec::new();
                    for cmsg in msg.cmsgs() {
                        if let ControlMessageOwned::ScmRights(fds) = cmsg {
                            received.extend(fds);
                        }
                    }
                    break (msg.bytes, received);
                }
                Err(nix::errno::Errno::EINTR) => continue,
                Err(e) => return Err(ProtocolError::io(Direction::Recv, "descriptor", e.into())),
            }
        };

        // SAFETY: the kernel just installed these descriptors in our table
        // and nothing else holds them.
        let mut owned: Vec<OwnedFd> = received
            .into_iter()
            .map(|fd| unsafe { OwnedFd::from_raw_fd(fd) })
            .collect();

        if bytes != 1 {
            return Err(ProtocolError::Short {
                dir: Direction::Recv,
                what: "descriptor",
                expected: 1,
                actual: bytes,
            });
        }
        if owned.len() != 1 {
            // dropping `owned` closes any surplus descriptors
            return Err(ProtocolError::Descriptors { count: owned.len() });
        }
        Ok(owned.remove(0))
    }
}

/// In-process transport for tests and embedders without a socket.
///
/// Bytes written go to an outbound buffer, reads drain a preloaded inbound
/// buffer, and `send_fd` duplicates the descriptor into a FIFO, so the
/// received fd still refers to the same underlying file just like one passed
/// over `SCM_RIGHTS`.
#[derive(Debug, Default)]
pub struct LoopbackChannel {
    outbound: Vec<u8>,
    inbound: VecDeque<u8>,
    fds: VecDeque<OwnedFd>,
}

impl LoopbackChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes for the local side to read, as if the peer had sent them.
    pub fn with_inbound(mut self, bytes: &[u8]) -> Self {
        self.inbound.extend(bytes);
        self
    }

    pub fn outbound(&self) -> &[u8] {
        &self.outbound
    }

    pub fn pending_fds(&self) -> usize {
        self.fds.len()
    }
}

impl Write for LoopbackChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.outbound.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Read for LoopbackChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(self.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl DescriptorChannel for LoopbackChannel {
    fn send_fd(&mut self, fd: BorrowedFd<'_>) -> Result<(), ProtocolError> {
        let dup = fd
            .try_clone_to_owned()
            .map_err(|e| ProtocolError::io(Direction::Send, "descriptor", e))?;
        self.fds.push_back(dup);
        Ok(())
    }

    fn recv_fd(&mut self) -> Result<OwnedFd, ProtocolError> {
        self.fds
            .pop_front()
            .ok_or(ProtocolError::Descriptors { count: 0 })
    }
}
