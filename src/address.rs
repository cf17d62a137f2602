//! Where the resident server listens.

use nix::libc;
use nix::unistd::{Uid, User};
use prewarm_core::{AddressError, Config};
use std::path::{Path, PathBuf};

pub const TOOL_NAME: &str = "prewarm";

/// Longest path `connect(2)` accepts, leaving room for the terminating NUL.
pub fn max_socket_path_len() -> usize {
    // SAFETY: sockaddr_un is plain old data; all zeroes is a valid value.
    let addr: libc::sockaddr_un = unsafe { std::mem::zeroed() };
    addr.sun_path.len() - 1
}

/// Resolve the socket path: the override if configured, otherwise
/// `<tmp>/prewarm-<user>.sock`. The result is rejected, never truncated,
/// when it does not fit a Unix socket address.
pub fn resolve(config: &Config) -> Result<PathBuf, AddressError> {
    let path = match &config.socket_override {
        Some(p) => p.clone(),
        None => default_path(&std::env::temp_dir(), &current_user()?),
    };
    check_len(&path)?;
    Ok(path)
}

pub fn default_path(tmp: &Path, user: &str) -> PathBuf {
    tmp.join(format!("{TOOL_NAME}-{user}.sock"))
}

pub fn check_len(path: &Path) -> Result<(), AddressError> {
    use std::os::unix::ffi::OsStrExt;
    let len = path.as_os_str().as_bytes().len();
    let max = max_socket_path_len();
    if len > max {
        return Err(AddressError::TooLong {
            path: path.to_path_buf(),
            len,
            max,
        });
    }
    Ok(())
}

fn current_user() -> Result<String, AddressError> {
    let uid = Uid::current();
    match User::from_uid(uid) {
        Ok(Some(user)) => Ok(user.name),
        Ok(None) => Err(AddressError::UnknownUser { uid: uid.as_raw() }),
        Err(e) => Err(AddressError::Lookup {
            uid: uid.as_raw(),
            source: e.into(),
        }),
    }
}
