use crate::worker::WorkerHandle;
use anyhow::Result;
use divvy_base::Tuple;

/// The contract a caller implements to describe one unit of fan-out work.
///
/// `generate` and `process` run in different processes: `generate` only ever runs in
/// the master, `process` only ever runs in a worker child. A `Task` is constructed
/// once in the master and is present (via `fork`'s copy-on-write memory) in every
/// child; there is no cross-process sharing beyond that initial snapshot.
pub trait Task {
    /// Lazily produce tuples by calling `emit` once per item.
    ///
    /// `emit` runs the full per-item dispatch (wait for a worker, hand it the tuple)
    /// synchronously before returning, and its return value tells the generator
    /// whether to keep producing: `true` to continue, `false` when the run is
    /// shutting down and an infinite or long-running generator should stop calling
    /// `emit` and return. A finite generator can ignore the return value and simply
    /// exhaust its source; returning from `generate` at all ends dispatch.
    fn generate(&self, emit: &mut dyn FnMut(Tuple) -> bool) -> Result<()>;

    /// Handle one dispatched item. Runs inside a worker process.
    fn process(&self, args: Tuple) -> Result<()>;

    /// Called in the master immediately before forking a worker. The handle's
    /// `pid` is not yet set; `number` is.
    fn before_fork(&self, _worker: &WorkerHandle) {}

    /// Called in the child immediately after forking, before the worker main loop
    /// starts. The handle's `pid` is the child's own pid.
    fn after_fork(&self, _worker: &WorkerHandle) {}
}
