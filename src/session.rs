//! One launch over one connection: request, worker pid, result.

use crate::relay;
use prewarm_core::{LaunchError, WorkerHandle};
use prewarm_ipc::{DescriptorChannel, LaunchRequest, LaunchResult, wire};
use std::io::{Read, Write};
use tracing::{debug, warn};

pub struct Session<S> {
    stream: S,
}

impl<S> Session<S>
where
    S: Read + Write + DescriptorChannel,
{
    pub fn new(stream: S) -> Self {
        Session { stream }
    }

    pub fn send_request(&mut self, request: &LaunchRequest<'_>) -> Result<(), LaunchError> {
        request.send(&mut self.stream)?;
        debug!(
            argc = request.context.argv.len(),
            mode = ?request.context.env.mode(),
            "launch request sent"
        );
        Ok(())
    }

    /// Block for the worker pid and publish it to `worker`.
    pub fn await_worker(&mut self, worker: &WorkerHandle) -> Result<u32, LaunchError> {
        let pid = wire::read_u32(&mut self.stream)?;
        if !worker.record(pid) {
            warn!(pid, "server reported an unusable worker pid; signals will not be relayed");
        }
        debug!(pid, "remote worker started");
        Ok(pid)
    }

    /// Block, without a timeout, until the server reports the exit code.
    pub fn await_result(&mut self) -> Result<LaunchResult, LaunchError> {
        let result = LaunchResult::read_from(&mut self.stream)?;
        debug!(
            exit_code = result.exit_code,
            pid = result.remote_pid,
            "launch result"
        );
        Ok(result)
    }

    /// The whole exchange; installs the signal relay once the worker is known.
    pub fn run(mut self, request: &LaunchRequest<'_>) -> Result<LaunchResult, LaunchError> {
        self.send_request(request)?;
        self.await_worker(&relay::ACTIVE_WORKER)?;
        if let Err(e) = relay::install_all() {
            warn!(error = %e, "could not install signal relay");
        }
        self.await_result()
    }
}
