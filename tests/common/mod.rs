#![allow(dead_code)]

use prewarm_ipc::{EnvMode, LaunchContext, LaunchResult, ReceivedStdio, wire};
use std::os::unix::net::UnixListener;
use std::path::PathBuf;
use std::thread::JoinHandle;

/// Accepts exactly one launch on a socket inside a temp dir.
pub struct FakeServer {
    pub dir: assert_fs::TempDir,
    pub socket: PathBuf,
    handle: JoinHandle<LaunchContext>,
}

impl FakeServer {
    /// `work` runs after the worker pid has been reported and returns the
    /// exit code. The received streams are closed before the result goes
    /// out, so the launcher's pipes reach EOF once it exits.
    pub fn start<F>(mode: EnvMode, worker_pid: u32, work: F) -> Self
    where
        F: FnOnce(&LaunchContext, &ReceivedStdio) -> u32 + Send + 'static,
    {
        let dir = assert_fs::TempDir::new().unwrap();
        let socket = dir.path().join("s.sock");
        let listener = UnixListener::bind(&socket).unwrap();
        let handle = std::thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let ctx = LaunchContext::decode(&mut conn, mode).unwrap();
            let stdio = ReceivedStdio::recv(&mut conn).unwrap();
            wire::write_u32(&mut conn, worker_pid).unwrap();
            let exit_code = work(&ctx, &stdio);
            drop(stdio);
            LaunchResult {
                exit_code,
                remote_pid: worker_pid,
            }
            .write_to(&mut conn)
            .unwrap();
            ctx
        });
        FakeServer {
            dir,
            socket,
            handle,
        }
    }

    pub fn join(self) -> LaunchContext {
        self.handle.join().unwrap()
    }
}
