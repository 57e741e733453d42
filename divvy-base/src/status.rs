use serde::{Deserialize, Serialize};

/// The disposition a reaped worker process exited with.
///
/// Mirrors the `Exited`/`Signaled` split `nix::sys::wait::WaitStatus` exposes, clipped
/// to a `u8` the way a shell exit code or signal number naturally is.
#[derive(Copy, Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ExitDisposition {
    Exited(u8),
    Signaled(u8),
}

impl ExitDisposition {
    /// Whether this disposition should count against `RunSummary::failures`.
    ///
    /// Per the data model, `failures` increments exactly once per reaped *non-zero*
    /// child disposition: a clean `Exited(0)` is a success, anything else (a signal,
    /// or a non-zero exit code) is a failure.
    pub fn is_failure(&self) -> bool {
        !matches!(self, ExitDisposition::Exited(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exited_zero_is_not_a_failure() {
        assert!(!ExitDisposition::Exited(0).is_failure());
    }

    #[test]
    fn exited_nonzero_is_a_failure() {
        assert!(ExitDisposition::Exited(1).is_failure());
    }

    #[test]
    fn signaled_is_a_failure() {
        assert!(ExitDisposition::Signaled(9).is_failure());
    }
}
