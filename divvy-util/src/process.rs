//! Thin wrappers around `nix`'s process primitives, scoped to what the dispatch loop
//! and the worker main loop need: a non-blocking reap of a specific child, and a
//! best-effort signal delivery that treats "no such process" as "already gone"
//! rather than an error.

use divvy_base::ExitDisposition;
use nix::sys::signal::{self, Signal};
use nix::sys::wait::{WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

/// Non-blocking reap of one specific child. Returns `None` if the child is still
/// running; never blocks, since the dispatch loop calls this once per worker slot
/// on every pass through its accept-wait.
pub fn try_reap(pid: Pid) -> nix::Result<Option<ExitDisposition>> {
    match nix::sys::wait::waitpid(pid, Some(WaitPidFlag::WNOHANG))? {
        WaitStatus::StillAlive => Ok(None),
        WaitStatus::Exited(_, code) => Ok(Some(ExitDisposition::Exited(clip_to_u8(code)))),
        WaitStatus::Signaled(_, sig, _) => {
            Ok(Some(ExitDisposition::Signaled(clip_to_u8(sig as i32))))
        }
        // Only WNOHANG is requested (no WUNTRACED/WCONTINUED), so a stopped or
        // continued report should never surface here; treat it as a plain signal
        // death rather than panicking on an unexpected kernel report.
        _ => Ok(Some(ExitDisposition::Signaled(0))),
    }
}

fn clip_to_u8(val: i32) -> u8 {
    if val < 0 || val > u8::MAX as i32 {
        u8::MAX
    } else {
        val as u8
    }
}

/// Send `signal` to `pid`, treating "no such process" as a successful no-op and
/// returning whether the process was actually still around to receive it.
pub fn signal_if_alive(pid: Pid, signal: Signal) -> nix::Result<bool> {
    match signal::kill(pid, signal) {
        Ok(()) => Ok(true),
        Err(nix::errno::Errno::ESRCH) => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::unistd::{fork, ForkResult};

    #[test]
    fn try_reap_reports_exit_status_of_a_real_child() {
        match unsafe { fork() }.unwrap() {
            ForkResult::Child => {
                std::process::exit(7);
            }
            ForkResult::Parent { child } => {
                let disposition = loop {
                    if let Some(d) = try_reap(child).unwrap() {
                        break d;
                    }
                    std::thread::sleep(std::time::Duration::from_millis(5));
                };
                assert_eq!(disposition, ExitDisposition::Exited(7));
            }
        }
    }

    #[test]
    fn signal_if_alive_is_false_for_a_reaped_pid() {
        let pid = match unsafe { fork() }.unwrap() {
            ForkResult::Child => std::process::exit(0),
            ForkResult::Parent { child } => {
                loop {
                    if try_reap(child).unwrap().is_some() {
                        break;
                    }
                    std::thread::sleep(std::time::Duration::from_millis(5));
                }
                child
            }
        };
        assert_eq!(signal_if_alive(pid, Signal::SIGTERM).unwrap(), false);
    }
}
