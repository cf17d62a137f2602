//! Primitive framing shared by the launcher and the server.
//!
//! Every value is big-endian (network order):
//!
//! - `u32`: 4 bytes
//! - string: `[u32 len][len raw bytes]`, no terminator, any byte allowed
//! - result tuple: `[u32 exit_code][u32 remote_pid]`
//!
//! A frame either moves completely or fails with [`ProtocolError::Short`].

use crate::error::{Direction, ProtocolError};
use std::io::{ErrorKind, Read, Write};

/// Write `buf` completely. A zero-length write is a short transfer.
pub(crate) fn send_all<W: Write>(
    w: &mut W,
    buf: &[u8],
    what: &'static str,
) -> Result<(), ProtocolError> {
    let mut sent = 0;
    while sent < buf.len() {
        match w.write(&buf[sent..]) {
            Ok(0) => {
                return Err(ProtocolError::Short {
                    dir: Direction::Send,
                    what,
                    expected: buf.len(),
                    actual: sent,
                });
            }
            Ok(n) => sent += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(ProtocolError::io(Direction::Send, what, e)),
        }
    }
    Ok(())
}

/// Fill `buf` completely. EOF before the end is a short transfer.
pub(crate) fn recv_exact<R: Read>(
    r: &mut R,
    buf: &mut [u8],
    what: &'static str,
) -> Result<(), ProtocolError> {
    let mut got = 0;
    while got < buf.len() {
        match r.read(&mut buf[got..]) {
            Ok(0) => {
                return Err(ProtocolError::Short {
                    dir: Direction::Recv,
                    what,
                    expected: buf.len(),
                    actual: got,
                });
            }
            Ok(n) => got += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(ProtocolError::io(Direction::Recv, what, e)),
        }
    }
    Ok(())
}

pub fn write_u32<W: Write>(w: &mut W, value: u32) -> Result<(), ProtocolError> {
    send_all(w, &value.to_be_bytes(), "u32")
}

pub fn read_u32<R: Read>(r: &mut R) -> Result<u32, ProtocolError> {
    let mut b = [0u8; 4];
    recv_exact(r, &mut b, "u32")?;
    Ok(u32::from_be_bytes(b))
}

/// Length-prefixed string. Bytes are sent as-is; NUL and non-UTF-8 are fine.
pub fn write_str<W: Write>(w: &mut W, bytes: &[u8]) -> Result<(), ProtocolError> {
    let len = u32::try_from(bytes.len()).map_err(|_| ProtocolError::TooLong { len: bytes.len() })?;
    write_u32(w, len)?;
    send_all(w, bytes, "string body")
}

/// Reads a length-prefixed string.
///
/// The body is pulled through `Read::take` so a bogus length prefix cannot
/// force an up-front allocation larger than what the peer actually sent.
pub fn read_str<R: Read>(r: &mut R) -> Result<Vec<u8>, ProtocolError> {
    let len = read_u32(r)? as usize;
    let mut body = Vec::new();
    loop {
        let want = (len - body.len()) as u64;
        match r.by_ref().take(want).read_to_end(&mut body) {
            Ok(_) => break,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(ProtocolError::io(Direction::Recv, "string body", e)),
        }
    }
    if body.len() != len {
        return Err(ProtocolError::Short {
            dir: Direction::Recv,
            what: "string body",
            expected: len,
            actual: body.len(),
        });
    }
    Ok(body)
}

/// Encoded size of a string frame.
pub fn str_frame_len(bytes: &[u8]) -> usize {
    4 + bytes.len()
}
