//! The master-side record of one worker process slot.

use anyhow::{bail, Result};
use divvy_base::{ExitDisposition, WorkerNumber};
use divvy_util::process;
use nix::sys::signal::Signal;
use nix::unistd::{fork, getpid, ForkResult, Pid};
use std::path::PathBuf;

/// One of the N fixed slots a run maintains. A slot's `number` is stable for the
/// life of the run; the OS process occupying it is replaced whenever the previous
/// occupant is reaped.
#[derive(Debug)]
pub struct WorkerHandle {
    pub number: WorkerNumber,
    pub socket_path: PathBuf,
    pub pid: Option<Pid>,
    pub status: Option<ExitDisposition>,
    pub verbose: bool,
}

impl WorkerHandle {
    pub fn new(number: WorkerNumber, socket_path: PathBuf, verbose: bool) -> Self {
        Self {
            number,
            socket_path,
            pid: None,
            status: None,
            verbose,
        }
    }

    /// `pid` set and no exit status recorded yet.
    pub fn running(&self) -> bool {
        self.pid.is_some() && self.status.is_none()
    }

    /// Fork a fresh occupant for this slot. `child_body` runs only in the new child
    /// process, after this handle's `pid` has been updated to the child's own pid;
    /// it never returns (it is expected to end the process itself, per the worker
    /// main loop's `exit 0`/`exit 1` contract).
    ///
    /// Fails if this slot is currently occupied by a running process.
    pub fn spawn(&mut self, child_body: impl FnOnce(&mut WorkerHandle) -> !) -> Result<Pid> {
        if self.running() {
            bail!("worker slot {} is already running", self.number);
        }
        match unsafe { fork()? } {
            ForkResult::Parent { child } => {
                self.pid = Some(child);
                self.status = None;
                Ok(child)
            }
            ForkResult::Child => {
                self.pid = Some(getpid());
                child_body(self)
            }
        }
    }

    /// Non-blocking reap. Idempotent: once a status has been recorded, repeated
    /// calls just return it again rather than re-waiting.
    pub fn reap(&mut self) -> Result<Option<ExitDisposition>> {
        let Some(pid) = self.pid else {
            return Ok(None);
        };
        if let Some(status) = self.status {
            return Ok(Some(status));
        }
        if let Some(status) = process::try_reap(pid)? {
            self.status = Some(status);
            Ok(Some(status))
        } else {
            Ok(None)
        }
    }

    /// Deliver `signal` to this slot's process. Returns `false` if it had already
    /// exited (or raced the signal with its own exit); fails if this slot has never
    /// been spawned at all.
    pub fn kill(&self, signal: Signal) -> Result<bool> {
        let Some(pid) = self.pid else {
            bail!("worker slot {} has never been spawned", self.number);
        };
        if self.status.is_some() {
            return Ok(false);
        }
        Ok(process::signal_if_alive(pid, signal)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_handle_is_not_running() {
        let handle = WorkerHandle::new(WorkerNumber(1), PathBuf::from("/tmp/x.sock"), false);
        assert!(!handle.running());
    }

    #[test]
    fn kill_on_never_spawned_handle_fails() {
        let handle = WorkerHandle::new(WorkerNumber(1), PathBuf::from("/tmp/x.sock"), false);
        assert!(handle.kill(Signal::SIGTERM).is_err());
    }

    #[test]
    fn spawn_then_reap_records_exit_status() {
        let mut handle = WorkerHandle::new(WorkerNumber(1), PathBuf::from("/tmp/x.sock"), false);
        handle
            .spawn(|_| {
                std::process::exit(3);
            })
            .unwrap();
        assert!(handle.pid.is_some());
        let status = loop {
            if let Some(s) = handle.reap().unwrap() {
                break s;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        };
        assert_eq!(status, ExitDisposition::Exited(3));
        assert!(!handle.running());
        // idempotent
        assert_eq!(handle.reap().unwrap(), Some(ExitDisposition::Exited(3)));
    }

    #[test]
    fn spawn_twice_without_reap_fails() {
        let mut handle = WorkerHandle::new(WorkerNumber(1), PathBuf::from("/tmp/x.sock"), false);
        handle
            .spawn(|_| loop {
                std::thread::sleep(std::time::Duration::from_secs(60));
            })
            .unwrap();
        let result = handle.spawn(|_| std::process::exit(0));
        assert!(result.is_err());
        handle.kill(Signal::SIGKILL).ok();
        handle.reap().ok();
    }
}
