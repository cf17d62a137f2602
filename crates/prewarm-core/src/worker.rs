use std::sync::atomic::{AtomicI32, Ordering};

/// Remote worker pid, shared between the session and a signal handler.
///
/// Async-signal-safe: reads and writes are single atomic operations. Zero
/// means no worker is known yet.
#[derive(Debug)]
pub struct WorkerHandle {
    pid: AtomicI32,
}

impl WorkerHandle {
    pub const fn new() -> Self {
        WorkerHandle {
            pid: AtomicI32::new(0),
        }
    }

    /// Store the pid reported by the server. Returns false (and stores
    /// nothing) if it is not a valid positive pid.
    pub fn record(&self, remote_pid: u32) -> bool {
        match i32::try_from(remote_pid) {
            Ok(pid) if pid > 0 => {
                self.pid.store(pid, Ordering::SeqCst);
                true
            }
            _ => false,
        }
    }

    pub fn pid(&self) -> Option<i32> {
        let pid = self.pid.load(Ordering::SeqCst);
        (pid > 0).then_some(pid)
    }
}

impl Default for WorkerHandle {
    fn default() -> Self {
        Self::new()
    }
}
