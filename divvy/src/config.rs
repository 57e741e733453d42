//! Run-level configuration: worker count, socket path, verbosity, and the
//! graceful-shutdown time bound.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// How long teardown waits for workers to finish their current item gracefully
/// before escalating to `SIGKILL` regardless of how the run was stopped.
///
/// The reference design left this unbounded (a noted TODO); this rewrite picks a
/// concrete default rather than risking teardown hanging forever on a worker
/// that never returns from its processor.
pub const DEFAULT_GRACEFUL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub struct RunConfig {
    pub workers: usize,
    pub socket_path: PathBuf,
    pub verbose: bool,
    pub verbose_trace: bool,
    pub graceful_timeout: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            socket_path: default_socket_path(),
            verbose: false,
            verbose_trace: false,
            graceful_timeout: DEFAULT_GRACEFUL_TIMEOUT,
        }
    }
}

impl RunConfig {
    pub fn new(workers: usize) -> Self {
        Self {
            workers,
            ..Self::default()
        }
    }
}

static INSTANCE_COUNTER: AtomicU32 = AtomicU32::new(0);

/// A fresh path under the system temp directory, unique by master pid and an
/// in-process instance counter so that more than one run started by the same
/// process (e.g. across tests) never collides.
pub fn default_socket_path() -> PathBuf {
    let instance = INSTANCE_COUNTER.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!(
        "divvy-{}-{}.sock",
        std::process::id(),
        instance
    ))
}
