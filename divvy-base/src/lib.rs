//! Data types and wire encoding shared between the divvy master and its workers.

pub mod error;
pub mod status;
pub mod value;
pub mod wire;

pub use error::RunError;
pub use status::ExitDisposition;
pub use value::{Tuple, Value};

/// Stable 1..N slot identifier for a worker. See `WorkerHandle` in `divvy` for the
/// full lifecycle this number anchors.
#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct WorkerNumber(pub u32);

impl std::fmt::Display for WorkerNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Summary counters produced by a completed run, mirroring the master state's
/// `tasks_distributed`, `failures`, and `spawn_count` invariants.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct RunSummary {
    pub tasks_distributed: u64,
    pub failures: u64,
    pub spawn_count: u64,
}
