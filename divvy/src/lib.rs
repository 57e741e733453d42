//! The master/worker dispatch engine: fans a generator's items out to a fixed pool
//! of worker processes over a local Unix-domain socket.
//!
//! Callers implement [`Task`], build a [`RunConfig`], and hand both to [`Master::run`].
//! Everything else in this crate (the listener, worker handles, the signal
//! controller, the worker main loop) is internal machinery the dispatch loop
//! coordinates; only `Task`, `Master`, `RunConfig`, and the re-exported data types
//! from `divvy-base` are part of the public surface.

mod config;
mod listener;
mod master;
mod signal;
mod task;
mod worker;
mod worker_main;

pub use config::{RunConfig, DEFAULT_GRACEFUL_TIMEOUT};
pub use master::Master;
pub use task::Task;
pub use worker::WorkerHandle;

pub use divvy_base::{ExitDisposition, RunError, RunSummary, Tuple, Value, WorkerNumber};
