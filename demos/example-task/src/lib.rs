//! A sample task plugin for the `divvy` CLI: fans primality checks for the
//! integers in `RANGE` out across the worker pool, logging each worker's
//! lifecycle so a first-time user can see the dispatch loop in action.
//!
//! Build with `cargo build -p example-task` and run with:
//!
//!   divvy -n 4 target/debug/libexample_task.so

use anyhow::Result;
use divvy::{Task, Tuple, Value, WorkerHandle};

const RANGE: std::ops::Range<i64> = 2..5_000;

struct PrimeCheck;

fn is_prime(n: i64) -> bool {
    if n < 2 {
        return false;
    }
    let mut d = 2;
    while d * d <= n {
        if n % d == 0 {
            return false;
        }
        d += 1;
    }
    true
}

impl Task for PrimeCheck {
    fn generate(&self, emit: &mut dyn FnMut(Tuple) -> bool) -> Result<()> {
        for n in RANGE {
            if !emit(vec![Value::Int(n)]) {
                break;
            }
        }
        Ok(())
    }

    fn process(&self, args: Tuple) -> Result<()> {
        let Some(Value::Int(n)) = args.into_iter().next() else {
            anyhow::bail!("expected a single integer tuple");
        };
        if is_prime(n) {
            println!("{n}");
        }
        Ok(())
    }

    fn before_fork(&self, worker: &WorkerHandle) {
        tracing::debug!(worker = %worker.number, "about to fork a prime-checking worker");
    }

    fn after_fork(&self, worker: &WorkerHandle) {
        tracing::debug!(worker = %worker.number, pid = ?worker.pid, "prime-checking worker started");
    }
}

/// Entry point the `divvy` CLI loads via `libloading`. Boxing and leaking the
/// trait object into a raw pointer is what lets it cross the `cdylib` boundary;
/// the host reconstructs the `Box` and owns it from there.
#[no_mangle]
pub extern "C" fn divvy_register() -> *mut dyn Task {
    Box::into_raw(Box::new(PrimeCheck))
}
