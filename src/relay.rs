//! Forward signals received by the launcher to the remote worker.
//!
//! The handler runs in interrupt context: one atomic load of the worker pid
//! and at most one `kill(2)`. No allocation, no logging, no locks. Signals
//! that arrive while no pid is recorded are dropped. `errno` is preserved.

use nix::errno::Errno;
use nix::libc;
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};
use prewarm_core::WorkerHandle;

/// The worker the installed handlers forward to.
pub static ACTIVE_WORKER: WorkerHandle = WorkerHandle::new();

/// Outbound half of the relay; the real one is `kill(2)`.
pub trait SignalSink {
    fn send(&self, pid: i32, signum: i32);
}

pub struct Kill;

impl SignalSink for Kill {
    fn send(&self, pid: i32, signum: i32) {
        // SAFETY: kill is async-signal-safe; failures (e.g. ESRCH) are ignored.
        unsafe {
            libc::kill(pid, signum);
        }
    }
}

/// Forward `signum` to the recorded worker, if any. Returns whether a
/// signal was sent.
pub fn forward<S: SignalSink>(worker: &WorkerHandle, signum: i32, sink: &S) -> bool {
    match worker.pid() {
        Some(pid) => {
            sink.send(pid, signum);
            true
        }
        None => false,
    }
}

extern "C" fn relay_handler(signum: libc::c_int) {
    let saved = Errno::last_raw();
    forward(&ACTIVE_WORKER, signum, &Kill);
    Errno::set_raw(saved);
}

/// Every signal a process may catch that nix has a name for.
pub fn catchable() -> impl Iterator<Item = Signal> {
    Signal::iterator().filter(|s| !matches!(s, Signal::SIGKILL | Signal::SIGSTOP))
}

/// The realtime signal numbers, which `Signal` cannot represent.
#[cfg(any(target_os = "linux", target_os = "android"))]
pub fn realtime() -> std::ops::RangeInclusive<libc::c_int> {
    libc::SIGRTMIN()..=libc::SIGRTMAX()
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub fn realtime() -> std::ops::RangeInclusive<libc::c_int> {
    #[allow(clippy::reversed_empty_ranges)]
    let empty = 1..=0;
    empty
}

/// Route `signals` to [`ACTIVE_WORKER`].
pub fn install<I>(signals: I) -> nix::Result<()>
where
    I: IntoIterator<Item = Signal>,
{
    let action = SigAction::new(
        SigHandler::Handler(relay_handler),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    for sig in signals {
        // SAFETY: relay_handler only touches an atomic and calls kill(2).
        unsafe { sigaction(sig, &action) }?;
    }
    Ok(())
}

/// Route raw signal numbers to [`ACTIVE_WORKER`].
pub fn install_raw<I>(signums: I) -> nix::Result<()>
where
    I: IntoIterator<Item = libc::c_int>,
{
    // SAFETY: an all-zero sigaction is a valid value to fill in.
    let mut action: libc::sigaction = unsafe { std::mem::zeroed() };
    action.sa_sigaction = relay_handler as extern "C" fn(libc::c_int) as libc::sighandler_t;
    action.sa_flags = libc::SA_RESTART;
    // SAFETY: sa_mask is owned by `action`.
    unsafe { libc::sigemptyset(&mut action.sa_mask) };
    for signum in signums {
        // SAFETY: same handler as `install`; the old action is not read.
        let rc = unsafe { libc::sigaction(signum, &action, std::ptr::null_mut()) };
        Errno::result(rc)?;
    }
    Ok(())
}

pub fn install_all() -> nix::Result<()> {
    install(catchable())?;
    install_raw(realtime())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(i32, i32)>>);

    impl SignalSink for Recorder {
        fn send(&self, pid: i32, signum: i32) {
            self.0.lock().unwrap().push((pid, signum));
        }
    }

    #[test]
    fn dropped_before_worker_is_known() {
        let worker = WorkerHandle::new();
        let sink = Recorder::default();
        assert!(!forward(&worker, libc::SIGINT, &sink));
        assert!(sink.0.lock().unwrap().is_empty());
    }

    #[test]
    fn one_signal_in_one_signal_out() {
        let worker = WorkerHandle::new();
        worker.record(4242);
        let sink = Recorder::default();
        assert!(forward(&worker, libc::SIGINT, &sink));
        assert!(forward(&worker, libc::SIGTERM, &sink));
        assert_eq!(
            *sink.0.lock().unwrap(),
            vec![(4242, libc::SIGINT), (4242, libc::SIGTERM)]
        );
    }

    #[test]
    fn catchable_skips_kill_and_stop() {
        let all: Vec<Signal> = catchable().collect();
        assert!(!all.contains(&Signal::SIGKILL));
        assert!(!all.contains(&Signal::SIGSTOP));
        assert!(all.contains(&Signal::SIGINT));
        assert!(all.contains(&Signal::SIGWINCH));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn realtime_range_is_beyond_the_named_signals() {
        let rt = realtime();
        assert!(!rt.is_empty());
        assert!(catchable().all(|s| !rt.contains(&(s as i32))));
    }
}
