//! The master dispatch loop: drives the generator, matches items to accepting
//! workers, and manages booting, reaping, and shutdown escalation.

use crate::config::RunConfig;
use crate::listener::Listener;
use crate::signal::SignalController;
use crate::task::Task;
use crate::worker::WorkerHandle;
use crate::worker_main;
use divvy_base::{wire, RunError, RunSummary, Tuple, WorkerNumber};
use nix::sys::signal::Signal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// How long a single `poll_for_pending` call waits before the inner wait loop
/// re-checks shutdown/reap flags.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Set by a worker process immediately on entering its main loop; guards against
/// `Master::run` being invoked again from inside a forked child (e.g. if a task's
/// `process` mistakenly tried to start a nested run).
static IN_WORKER_PROCESS: AtomicBool = AtomicBool::new(false);

pub(crate) fn mark_worker_process() {
    IN_WORKER_PROCESS.store(true, Ordering::SeqCst);
}

/// Owns the worker pool and drives one dispatch run for a given [`Task`].
pub struct Master<T: Task> {
    task: T,
    config: RunConfig,
    workers: Vec<WorkerHandle>,
    listener: Option<Listener>,
    tasks_distributed: u64,
    failures: u64,
    spawn_count: u64,
    running: bool,
}

impl<T: Task> Master<T> {
    pub fn new(task: T, config: RunConfig) -> Self {
        let workers = (1..=config.workers as u32)
            .map(|n| WorkerHandle::new(WorkerNumber(n), config.socket_path.clone(), config.verbose))
            .collect();
        Self {
            task,
            config,
            workers,
            listener: None,
            tasks_distributed: 0,
            failures: 0,
            spawn_count: 0,
            running: false,
        }
    }

    /// Drive one complete run: bind the listener, install signal handling, drain
    /// the task's generator while dispatching items to workers, then tear
    /// everything down. Refuses to start a second overlapping run, and refuses
    /// to run at all from inside a forked worker process.
    pub fn run(&mut self) -> Result<RunSummary, RunError> {
        if IN_WORKER_PROCESS.load(Ordering::SeqCst) {
            return Err(RunError::InvalidState(
                "run() called from inside a worker process",
            ));
        }
        if self.running || self.listener.is_some() {
            return Err(RunError::InvalidState(
                "run() called while a run is already in progress",
            ));
        }
        self.running = true;
        let result = self.run_once();
        self.running = false;
        result
    }

    fn run_once(&mut self) -> Result<RunSummary, RunError> {
        let backlog = self.config.workers as i32;
        let listener = Listener::start(&self.config.socket_path, backlog).map_err(|source| {
            // Listener::start's error already carries context; downcast back to
            // an io::Error when possible for the typed `Bind` variant, otherwise
            // fall back to treating it as a plain I/O failure.
            match source.downcast::<std::io::Error>() {
                Ok(io_err) => RunError::Bind {
                    path: self.config.socket_path.clone(),
                    source: io_err,
                },
                Err(other) => RunError::Bind {
                    path: self.config.socket_path.clone(),
                    source: std::io::Error::new(std::io::ErrorKind::Other, other.to_string()),
                },
            }
        })?;
        self.listener = Some(listener);

        let signals = SignalController::install().map_err(RunError::SignalSetup)?;
        let shutdown_state = signals.state();

        let mut boot_failure = false;
        let mut io_failure: Option<std::io::Error> = None;

        let Self {
            task,
            workers,
            listener,
            config,
            tasks_distributed,
            failures,
            spawn_count,
            ..
        } = self;
        let task: &T = &*task;

        let generate_result = {
            let mut emit = |tuple: Tuple| -> bool {
                // Step 1: boot gap-fill.
                boot_gap_fill(task, workers, listener, config, spawn_count);

                // Step 2: wait for an accepting worker, watching shutdown/reap.
                loop {
                    if shutdown_state.is_shutdown_requested() {
                        return false;
                    }
                    let listener_ref = listener.as_mut().expect("listener bound for run duration");
                    match listener_ref.poll_for_pending(ACCEPT_POLL_INTERVAL) {
                        Ok(true) => break,
                        Ok(false) => {
                            if shutdown_state.take_reap() {
                                reap_running(workers, failures);
                                let none_running = workers.iter().all(|w| !w.running());
                                if none_running && *tasks_distributed == 0 {
                                    boot_failure = true;
                                    return false;
                                }
                                boot_gap_fill(task, workers, listener, config, spawn_count);
                            }
                            if shutdown_state.take_info_dump() {
                                dump_diagnostics(workers, *tasks_distributed, *failures, *spawn_count);
                            }
                        }
                        Err(e) => {
                            io_failure = Some(io_error_from_anyhow(e));
                            return false;
                        }
                    }
                }

                // Step 3: dispatch one item. An accept or write failure here is a
                // socket bind/IO error per the error-handling design ("Surfaced"),
                // not a dropped item to shrug off: abort the run the same way a
                // poll_for_pending failure above does.
                let listener_ref = listener.as_ref().expect("listener bound for run duration");
                match listener_ref.accept_one() {
                    Ok(mut stream) => match wire::write_tuple(&mut stream, &tuple) {
                        Ok(()) => {
                            *tasks_distributed += 1;
                        }
                        Err(e) => {
                            io_failure = Some(io_error_from_wire(e));
                            return false;
                        }
                    },
                    Err(e) => {
                        io_failure = Some(io_error_from_anyhow(e));
                        return false;
                    }
                }

                // Step 4: post-item checkpoint.
                if shutdown_state.is_shutdown_requested() {
                    return false;
                }
                if shutdown_state.take_reap() {
                    reap_running(workers, failures);
                }
                true
            };
            task.generate(&mut emit)
        };

        let forceful = shutdown_state.is_forceful();
        teardown(
            workers,
            listener,
            failures,
            forceful,
            config.graceful_timeout,
        );
        signals.uninstall();

        let summary = RunSummary {
            tasks_distributed: *tasks_distributed,
            failures: *failures,
            spawn_count: *spawn_count,
        };

        if let Some(source) = io_failure {
            return Err(RunError::Io { source, summary });
        }
        if boot_failure {
            return Err(RunError::BootFailure { summary });
        }
        if let Err(source) = generate_result {
            return Err(RunError::GeneratorFailed { source, summary });
        }
        if forceful {
            return Err(RunError::ForcefulShutdown { summary });
        }
        Ok(summary)
    }
}

/// Downcast an `anyhow::Error` from the listener back to the `io::Error` that
/// caused it where possible, falling back to a synthesized one that preserves
/// the message when the original type isn't recoverable through the chain.
fn io_error_from_anyhow(e: anyhow::Error) -> std::io::Error {
    e.downcast::<std::io::Error>()
        .unwrap_or_else(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
}

/// Same idea for a `wire::WireError`: recover the underlying `io::Error` when
/// the failure was one, otherwise synthesize one carrying the wire error's message.
fn io_error_from_wire(e: wire::WireError) -> std::io::Error {
    match e {
        wire::WireError::Io(io_err) => io_err,
        other => std::io::Error::new(std::io::ErrorKind::Other, other.to_string()),
    }
}

/// Boot every slot that isn't currently running a worker.
fn boot_gap_fill<T: Task>(
    task: &T,
    workers: &mut [WorkerHandle],
    listener: &mut Option<Listener>,
    config: &RunConfig,
    spawn_count: &mut u64,
) {
    let listener_fd = listener.as_ref().map(|l| l.raw_fd());
    let verbose_trace = config.verbose_trace;

    for handle in workers.iter_mut() {
        if handle.running() {
            continue;
        }
        task.before_fork(handle);
        // `after_fork` runs inside `worker_main::run`, as the last prelude step
        // (after signal reset, listener-fd close, and stdin close) rather than
        // here as the first thing the child does.
        let spawn_result = handle.spawn(|child_handle| {
            mark_worker_process();
            worker_main::run(task, child_handle, listener_fd, verbose_trace)
        });
        match spawn_result {
            Ok(_) => *spawn_count += 1,
            Err(e) => tracing::error!(error = %e, worker = %handle.number, "failed to fork worker"),
        }
    }
}

/// Reap every slot that's still marked running, counting non-zero dispositions
/// as failures exactly once each.
fn reap_running(workers: &mut [WorkerHandle], failures: &mut u64) {
    for handle in workers.iter_mut() {
        if !handle.running() {
            continue;
        }
        match handle.reap() {
            Ok(Some(status)) => {
                if status.is_failure() {
                    *failures += 1;
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, worker = %handle.number, "error reaping worker"),
        }
    }
}

/// Always runs on the way out of a run: stop the listener, drain/kill workers,
/// and leave the signal controller ready to be uninstalled by the caller.
fn teardown(
    workers: &mut [WorkerHandle],
    listener: &mut Option<Listener>,
    failures: &mut u64,
    forceful: bool,
    graceful_timeout: Duration,
) {
    if let Some(l) = listener.take() {
        l.stop();
    }

    let deadline = Instant::now() + graceful_timeout;
    loop {
        reap_running(workers, failures);
        if workers.iter().all(|w| !w.running()) {
            break;
        }
        if forceful || Instant::now() >= deadline {
            for handle in workers.iter() {
                if handle.running() {
                    let _ = handle.kill(Signal::SIGKILL);
                }
            }
        }
        std::thread::sleep(ACCEPT_POLL_INTERVAL);
    }
}

fn dump_diagnostics(workers: &[WorkerHandle], tasks_distributed: u64, failures: u64, spawn_count: u64) {
    tracing::error!(
        tasks_distributed,
        failures,
        spawn_count,
        "divvy diagnostics dump requested"
    );
    for handle in workers {
        tracing::error!(
            worker = %handle.number,
            pid = ?handle.pid,
            running = handle.running(),
            status = ?handle.status,
            "worker slot state"
        );
    }
}
