use crate::RunSummary;
use thiserror::Error;

/// Errors internal plumbing (socket setup, serialization, fork) propagates on the way
/// up to the dispatch loop, before it gets classified into a [`RunError`].
pub type Error = anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// The typed error taxonomy a `Master::run` call can fail with.
///
/// Graceful shutdown and mid-run worker crashes are deliberately absent from this
/// enum: the former is a normal return from `run` (the loop just stops distributing
/// items), and the latter is counted in `RunSummary::failures` rather than
/// propagated, per the run's error-handling design.
///
/// Variants reached after the dispatch loop has started carry the [`RunSummary`]
/// teardown produced, so a caller can still read `tasks_distributed`/`failures`/
/// `spawn_count` off a failed run instead of losing them with the error.
#[derive(Debug, Error)]
pub enum RunError {
    /// Every forked worker exited before consuming a single item. Retrying would loop
    /// forever, so the run is declared a fatal failure instead.
    #[error("all workers exited before any item was distributed (boot failure)")]
    BootFailure { summary: RunSummary },

    /// `TERM`, or a second `INT`/`QUIT` delivered more than 10s after the first,
    /// unwound the dispatch loop. Workers were killed with `SIGKILL` during teardown.
    #[error("run was forcefully shut down")]
    ForcefulShutdown { summary: RunSummary },

    /// The user-supplied generator raised an error.
    #[error("generator failed: {source}")]
    GeneratorFailed {
        #[source]
        source: anyhow::Error,
        summary: RunSummary,
    },

    /// Installing signal handling failed before any worker was spawned.
    #[error("failed to install signal handling: {0}")]
    SignalSetup(#[source] anyhow::Error),

    /// Binding or listening on the dispatch socket failed before any worker was spawned.
    #[error("failed to bind dispatch socket at {path}: {source}")]
    Bind {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An I/O error occurred against the listener or an accepted connection mid-run.
    #[error("I/O error during dispatch: {source}")]
    Io {
        #[source]
        source: std::io::Error,
        summary: RunSummary,
    },

    /// `run` was invoked in violation of a precondition (already running, or from a
    /// forked child rather than the master process).
    #[error("invalid master state: {0}")]
    InvalidState(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boot_failure_message() {
        let err = RunError::BootFailure {
            summary: RunSummary::default(),
        };
        assert_eq!(
            err.to_string(),
            "all workers exited before any item was distributed (boot failure)"
        );
    }

    #[test]
    fn boot_failure_carries_the_partial_summary() {
        let summary = RunSummary {
            tasks_distributed: 0,
            failures: 1,
            spawn_count: 1,
        };
        let err = RunError::BootFailure { summary };
        let RunError::BootFailure { summary } = err else {
            unreachable!()
        };
        assert_eq!(summary.failures, 1);
    }

    #[test]
    fn bind_error_includes_path() {
        let err = RunError::Bind {
            path: "/tmp/divvy.sock".into(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        };
        assert!(err.to_string().contains("/tmp/divvy.sock"));
    }
}
