//! The body of a worker process: the prelude that runs immediately after fork
//! (signal reset, listener-fd close, stdin close, `after_fork`) and the main
//! loop that connects, receives one item, processes it, and loops.

use crate::task::Task;
use crate::worker::WorkerHandle;
use divvy_base::wire;
use nix::sys::signal::{self, SigHandler, Signal};
use signal_hook::consts::{SIGINT, SIGQUIT, SIGTERM};
use std::os::unix::io::RawFd;
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How long a worker waits for its pending connection to become readable before
/// re-checking its local shutdown flag.
const READ_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Runs the worker main loop to completion and exits the process; never returns.
///
/// `inherited_listener_fd`, if given, is the raw file descriptor of the master's
/// listening socket as inherited across `fork`. It is closed directly by fd
/// number rather than through an owned `Listener` value, since an owned value
/// captured into the spawning closure would also get dropped (and so would close
/// the master's own copy of the descriptor) on the parent's side of the fork if
/// the closure were ever constructed but not invoked.
pub fn run<T: Task>(
    task: &T,
    handle: &WorkerHandle,
    inherited_listener_fd: Option<RawFd>,
    verbose_trace: bool,
) -> ! {
    if let Some(fd) = inherited_listener_fd {
        let _ = nix::unistd::close(fd);
    }

    // The child inherits the master's signal dispositions as live sigactions,
    // including `SignalController`'s handlers for CHLD and INFO (SIGUSR1) —
    // whose backing self-pipe only has a reader thread in the master. Reset
    // every signal the master touches to its default disposition first, then
    // install this worker's own local INT/QUIT/TERM flag on top; CHLD and
    // SIGUSR1 are left at their defaults rather than re-handled here.
    for sig in [Signal::SIGCHLD, Signal::SIGUSR1, Signal::SIGINT, Signal::SIGQUIT, Signal::SIGTERM] {
        let _ = unsafe { signal::signal(sig, SigHandler::SigDfl) };
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGQUIT, SIGTERM] {
        // Best-effort: a worker that can't install its own graceful-exit flag
        // still exits correctly on the connection-closed path when the listener
        // goes away, just without the early drain-then-exit courtesy.
        let _ = signal_hook::flag::register(signal, Arc::clone(&shutdown));
    }

    // `stdin` is meaningless for a worker and the standard "close it on fork" tidy-up.
    drop_stdin();

    task.after_fork(handle);

    loop {
        let mut stream = match UnixStream::connect(&handle.socket_path) {
            Ok(stream) => stream,
            Err(_) => std::process::exit(0),
        };

        if !wait_until_readable(&stream, &shutdown) {
            std::process::exit(0);
        }

        let tuple = match wire::read_tuple(&mut stream) {
            Ok(Some(tuple)) => tuple,
            Ok(None) => std::process::exit(0),
            Err(_) => std::process::exit(0),
        };
        drop(stream);

        if let Err(err) = task.process(tuple) {
            if verbose_trace {
                eprintln!("divvy: worker {} failed: {err:?}", handle.number);
            } else {
                eprintln!("divvy: worker {} failed: {err}", handle.number);
            }
            std::process::exit(1);
        }

        if shutdown.load(Ordering::SeqCst) {
            std::process::exit(0);
        }
    }
}

/// Poll readability of `stream` in short bounded intervals so the local shutdown
/// flag is checked promptly even while nothing has arrived yet. Returns `false`
/// if the connection became unusable (the signal to exit cleanly) before any
/// data showed up.
fn wait_until_readable(stream: &UnixStream, shutdown: &AtomicBool) -> bool {
    // A length-framed payload always begins with at least one byte; peeking with
    // a zero-length buffer isn't meaningful on a stream socket, so readiness is
    // instead inferred by attempting a non-blocking zero-byte peek in a loop.
    let mut probe = [0u8; 1];
    loop {
        if shutdown.load(Ordering::SeqCst) {
            return false;
        }
        match stream.set_read_timeout(Some(READ_POLL_INTERVAL)) {
            Ok(()) => {}
            Err(_) => return false,
        }
        match stream.peek(&mut probe) {
            Ok(_) => return true,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
            Err(_) => return false,
        }
    }
}

fn drop_stdin() {
    use std::os::fd::AsRawFd;
    // Redirecting fd 0 to /dev/null is the standard "close stdin" idiom for a
    // worker that never reads from it; failure here is non-fatal.
    if let Ok(devnull) = std::fs::File::open("/dev/null") {
        let _ = nix::unistd::dup2(devnull.as_raw_fd(), std::io::stdin().as_raw_fd());
    }
}
