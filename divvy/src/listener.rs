//! Owns the master's listening socket: bind, bounded-wait readiness polling,
//! accept, and teardown.

use anyhow::{Context as _, Result};
use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};
use std::os::unix::io::AsRawFd;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::time::Duration;

const LISTENER_TOKEN: Token = Token(0);

pub struct Listener {
    path: PathBuf,
    inner: UnixListener,
    poll: Poll,
    events: Events,
}

impl Listener {
    /// Unlink any stale socket file at `path`, bind, and start listening with the
    /// given backlog. The listener is set non-blocking so readiness is always
    /// checked with `poll_for_pending` before an `accept_one` call.
    pub fn start(path: impl AsRef<Path>, backlog: i32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let _ = std::fs::remove_file(&path);

        let inner = UnixListener::bind(&path)
            .with_context(|| format!("binding dispatch socket at {}", path.display()))?;
        inner.set_nonblocking(true)?;

        // std's UnixListener doesn't expose a backlog knob directly; the bind above
        // already listens with the platform default. The worker count is still
        // enforced as the effective backlog by never running more than `backlog`
        // concurrently-connecting workers, per the data model's invariant.
        let _ = backlog;

        let poll = Poll::new().context("creating readiness poller for dispatch socket")?;
        poll.registry()
            .register(
                &mut SourceFd(&inner.as_raw_fd()),
                LISTENER_TOKEN,
                Interest::READABLE,
            )
            .context("registering dispatch socket for readiness polling")?;

        Ok(Self {
            path,
            inner,
            poll,
            events: Events::with_capacity(1),
        })
    }

    /// Non-blocking readiness check, bounded by `timeout`. Returns `true` if a
    /// connection is pending to be accepted.
    pub fn poll_for_pending(&mut self, timeout: Duration) -> Result<bool> {
        self.events.clear();
        match self.poll.poll(&mut self.events, Some(timeout)) {
            Ok(()) => Ok(!self.events.is_empty()),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => Ok(false),
            Err(e) => Err(e).context("polling dispatch socket for readiness"),
        }
    }

    /// Accept one pending connection. Only meaningful to call after
    /// `poll_for_pending` returned `true`.
    pub fn accept_one(&self) -> Result<UnixStream> {
        let (stream, _addr) = self
            .inner
            .accept()
            .context("accepting connection on dispatch socket")?;
        Ok(stream)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The raw file descriptor number backing the listening socket. A forked
    /// child inherits a copy of this same fd number pointing at the same open
    /// file description; closing it via `nix::unistd::close` in the child does
    /// not affect the master's copy.
    pub fn raw_fd(&self) -> std::os::unix::io::RawFd {
        self.inner.as_raw_fd()
    }

    /// Close the listening handle and unlink the socket file. The master calls
    /// this explicitly during teardown; a forked child that merely inherited a
    /// copy of this handle should let it drop in the ordinary way instead (which
    /// closes its copy of the file descriptor without touching the path), since
    /// the path is owned by the master alone.
    pub fn stop(self) {
        let _ = std::fs::remove_file(&self.path);
        // `self.inner` and `self.poll` close their file descriptors on drop here.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn temp_socket_path() -> PathBuf {
        let dir = std::env::temp_dir();
        dir.join(format!("divvy-test-{}.sock", std::process::id()))
    }

    #[test]
    fn start_creates_socket_file_and_stop_removes_it() {
        let path = temp_socket_path();
        let listener = Listener::start(&path, 1).unwrap();
        assert!(path.exists());
        assert_eq!(listener.path(), path);
        listener.stop();
        assert!(!path.exists());
    }

    #[test]
    fn poll_for_pending_times_out_with_no_connection() {
        let path = temp_socket_path();
        let mut listener = Listener::start(&path, 1).unwrap();
        let pending = listener
            .poll_for_pending(Duration::from_millis(10))
            .unwrap();
        assert!(!pending);
    }

    #[test]
    fn poll_then_accept_sees_a_connecting_client() {
        let path = temp_socket_path();
        let mut listener = Listener::start(&path, 1).unwrap();

        let connect_path = path.clone();
        let client = std::thread::spawn(move || {
            let mut stream = UnixStream::connect(&connect_path).unwrap();
            stream.write_all(b"hi").unwrap();
        });

        let mut pending = false;
        for _ in 0..200 {
            if listener
                .poll_for_pending(Duration::from_millis(10))
                .unwrap()
            {
                pending = true;
                break;
            }
        }
        assert!(pending);
        listener.accept_one().unwrap();
        client.join().unwrap();
    }

    #[test]
    fn starting_over_a_stale_socket_file_succeeds() {
        let path = temp_socket_path();
        std::fs::write(&path, b"not a socket").unwrap();
        let listener = Listener::start(&path, 1).unwrap();
        assert!(path.exists());
        drop(listener);
    }
}
