//! Converts signal delivery into flags the dispatch loop checks at its bounded
//! wait points, per the redesign note that signal handlers in a systems language
//! cannot safely raise: `INT`/`QUIT` set a graceful-shutdown timestamp (and
//! escalate to forceful on a second delivery more than 10s later), `TERM` sets
//! forceful shutdown immediately, `CHLD` sets a reap flag, and `INFO` (mapped to
//! `SIGUSR1`, since Linux has no `SIGINFO`) sets a diagnostics-dump flag.

use signal_hook::consts::{SIGCHLD, SIGINT, SIGQUIT, SIGTERM, SIGUSR1};
use signal_hook::iterator::Signals;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, Arc};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// How long after the first `INT`/`QUIT` a second one must arrive to be treated as
/// "just a duplicate Ctrl+C" rather than "the user really wants to quit now".
pub const DOUBLE_TAP_WINDOW: Duration = Duration::from_secs(10);

/// Shared shutdown/reap/diagnostics state, written by the signal-watching thread
/// and read by the dispatch loop.
#[derive(Default)]
pub struct ShutdownState {
    /// `None` until the first graceful shutdown request; then the instant it
    /// arrived. Modeled as an explicit option-with-instant rather than overloading
    /// a boolean-or-timestamp value.
    requested_at: Mutex<Option<Instant>>,
    forceful: AtomicBool,
    reap: AtomicBool,
    info_dump: AtomicBool,
}

impl ShutdownState {
    pub fn is_shutdown_requested(&self) -> bool {
        self.requested_at.lock().unwrap().is_some()
    }

    pub fn is_forceful(&self) -> bool {
        self.forceful.load(Ordering::SeqCst)
    }

    /// Consume a pending reap notification. Returns whether one was pending.
    pub fn take_reap(&self) -> bool {
        self.reap.swap(false, Ordering::SeqCst)
    }

    /// Consume a pending diagnostics-dump request.
    pub fn take_info_dump(&self) -> bool {
        self.info_dump.swap(false, Ordering::SeqCst)
    }

    fn note_chld(&self) {
        self.reap.store(true, Ordering::SeqCst);
    }

    fn note_info(&self) {
        self.info_dump.store(true, Ordering::SeqCst);
    }

    /// `INT`/`QUIT`: first delivery requests a graceful shutdown; a second
    /// delivery more than [`DOUBLE_TAP_WINDOW`] after the first escalates to
    /// forceful.
    fn note_graceful_or_escalate(&self) {
        let mut requested_at = self.requested_at.lock().unwrap();
        match *requested_at {
            None => *requested_at = Some(Instant::now()),
            Some(first) if first.elapsed() > DOUBLE_TAP_WINDOW => {
                self.forceful.store(true, Ordering::SeqCst);
            }
            Some(_) => {}
        }
    }

    /// `TERM`: immediate forceful shutdown, setting the graceful timestamp too
    /// if it wasn't already set so `is_shutdown_requested` is also true.
    fn note_forceful(&self) {
        let mut requested_at = self.requested_at.lock().unwrap();
        if requested_at.is_none() {
            *requested_at = Some(Instant::now());
        }
        self.forceful.store(true, Ordering::SeqCst);
    }
}

/// Installs signal handling for the lifetime of a run and tears it down on drop
/// (or explicit [`SignalController::uninstall`]).
pub struct SignalController {
    state: Arc<ShutdownState>,
    handle: signal_hook::iterator::Handle,
    thread: Option<JoinHandle<()>>,
}

impl SignalController {
    /// Install handlers for `INT`, `QUIT`, `TERM`, `CHLD`, and `INFO` (`SIGUSR1`).
    /// Refuses to install twice over the same state; each run gets its own
    /// controller.
    pub fn install() -> anyhow::Result<Self> {
        let state = Arc::new(ShutdownState::default());

        let mut signals = Signals::new([SIGINT, SIGQUIT, SIGTERM, SIGCHLD, SIGUSR1])?;
        let handle = signals.handle();

        let thread_state = Arc::clone(&state);
        let thread = std::thread::spawn(move || {
            for signal in &mut signals {
                match signal {
                    SIGINT | SIGQUIT => thread_state.note_graceful_or_escalate(),
                    SIGTERM => thread_state.note_forceful(),
                    SIGCHLD => thread_state.note_chld(),
                    SIGUSR1 => thread_state.note_info(),
                    _ => {}
                }
            }
        });

        Ok(Self {
            state,
            handle,
            thread: Some(thread),
        })
    }

    pub fn state(&self) -> Arc<ShutdownState> {
        Arc::clone(&self.state)
    }

    /// Stop watching signals and join the background thread. Idempotent.
    pub fn uninstall(mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for SignalController {
    fn drop(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    #[test]
    fn first_int_requests_graceful_shutdown_only() {
        let controller = SignalController::install().unwrap();
        let state = controller.state();
        signal::kill(Pid::this(), Signal::SIGINT).unwrap();
        wait_until(|| state.is_shutdown_requested());
        assert!(state.is_shutdown_requested());
        assert!(!state.is_forceful());
    }

    #[test]
    fn term_requests_forceful_shutdown_immediately() {
        let controller = SignalController::install().unwrap();
        let state = controller.state();
        signal::kill(Pid::this(), Signal::SIGTERM).unwrap();
        wait_until(|| state.is_forceful());
        assert!(state.is_shutdown_requested());
        assert!(state.is_forceful());
    }

    #[test]
    fn chld_sets_reap_flag_and_is_consumed_once() {
        let controller = SignalController::install().unwrap();
        let state = controller.state();
        signal::kill(Pid::this(), Signal::SIGCHLD).unwrap();
        wait_until(|| state.take_reap());
        assert!(!state.take_reap());
    }

    #[test]
    fn second_int_within_window_does_not_escalate() {
        let state = ShutdownState::default();
        state.note_graceful_or_escalate();
        state.note_graceful_or_escalate();
        assert!(state.is_shutdown_requested());
        assert!(!state.is_forceful());
    }

    fn wait_until(mut predicate: impl FnMut() -> bool) {
        for _ in 0..500 {
            if predicate() {
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("condition never became true");
    }
}
