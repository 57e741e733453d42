//! Loads a user task from a compiled shared library.
//!
//! A compiled Rust binary can't `require` an arbitrary script the way the
//! original Ruby `divvy` does, so the positional argument to this CLI names a
//! `cdylib` built against `divvy::Task` instead. The library exposes exactly one
//! `extern "C" fn divvy_register() -> *mut dyn Task` entry point; this is the
//! explicit-registration replacement for the original's "last class that
//! included the task module" bookkeeping.

use anyhow::{Context as _, Result};
use divvy::{Task, Tuple, WorkerHandle};
use libloading::{Library, Symbol};
use std::path::Path;

/// The symbol every task plugin must export.
pub const REGISTER_SYMBOL: &[u8] = b"divvy_register";

type RegisterFn = unsafe extern "C" fn() -> *mut dyn Task;

/// A loaded task plugin. Keeps the library open for the lifetime of the task
/// box it handed out, since the task's vtable lives inside the mapped library.
pub struct LoadedTask {
    task: Box<dyn Task>,
    _library: Library,
}

impl Task for LoadedTask {
    fn generate(&self, emit: &mut dyn FnMut(Tuple) -> bool) -> anyhow::Result<()> {
        self.task.generate(emit)
    }

    fn process(&self, args: Tuple) -> anyhow::Result<()> {
        self.task.process(args)
    }

    fn before_fork(&self, worker: &WorkerHandle) {
        self.task.before_fork(worker)
    }

    fn after_fork(&self, worker: &WorkerHandle) {
        self.task.after_fork(worker)
    }
}

/// Load `path` as a shared library and call its `divvy_register` entry point.
pub fn load(path: &Path) -> Result<LoadedTask> {
    let library = unsafe { Library::new(path) }
        .with_context(|| format!("loading task library {}", path.display()))?;

    let register: Symbol<RegisterFn> = unsafe { library.get(REGISTER_SYMBOL) }
        .with_context(|| format!("{} does not export `divvy_register`", path.display()))?;

    let raw = unsafe { register() };
    if raw.is_null() {
        anyhow::bail!("{}'s divvy_register returned a null task", path.display());
    }
    let task = unsafe { Box::from_raw(raw) };

    Ok(LoadedTask {
        task,
        _library: library,
    })
}
