//! `divvy`: load a task plugin and drive the master/worker dispatch loop to
//! completion, translating its outcome into a process exit code.

mod plugin;

use anyhow::Result;
use clap::{Arg, ArgAction, Command};
use divvy::{Master, RunConfig, RunError};
use divvy_util::ConfigBag;
use std::path::PathBuf;
use std::process::ExitCode;

fn cli() -> Command {
    Command::new("divvy")
        .about("Fan a generator's items out to a pool of worker processes over a local socket")
        .arg(
            Arg::new("task_lib")
                .help("Path to a compiled task plugin exporting `divvy_register`")
                .required(true),
        )
        .arg(
            Arg::new("workers")
                .short('n')
                .long("workers")
                .value_name("N")
                .help("Number of worker processes to run [env: DIVVY_WORKERS]"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Verbose stderr logging [env: DIVVY_VERBOSE]"),
        )
        .arg(
            Arg::new("socket_path")
                .long("socket-path")
                .value_name("PATH")
                .help("Override the dispatch socket path [env: DIVVY_SOCKET_PATH]"),
        )
}

fn verbose_trace_forced() -> bool {
    std::env::var("DIVVY_VERBOSE_TRACE")
        .map(|v| !v.is_empty())
        .unwrap_or(false)
}

fn run() -> Result<Result<divvy::RunSummary, RunError>> {
    let matches = cli().get_matches();
    let task_lib = PathBuf::from(
        matches
            .get_one::<String>("task_lib")
            .expect("task_lib is required"),
    );

    let bag = ConfigBag::load(matches, "DIVVY", "divvy")?;
    let workers: usize = bag.get_or("workers", 1)?;
    let verbose = bag.get_flag("verbose")?.unwrap_or(false);
    let socket_path: Option<PathBuf> = bag.get("socket_path")?;
    let verbose_trace = verbose_trace_forced();

    divvy_util::log::init(verbose || verbose_trace);

    let mut config = RunConfig::new(workers);
    config.verbose = verbose;
    config.verbose_trace = verbose_trace;
    if let Some(path) = socket_path {
        config.socket_path = path;
    }

    tracing::info!(workers, socket_path = %config.socket_path.display(), "starting divvy run");

    let loaded = plugin::load(&task_lib)?;
    let mut master = Master::new(loaded, config);
    Ok(master.run())
}

fn main() -> ExitCode {
    match run() {
        Ok(Ok(summary)) => {
            tracing::info!(
                tasks_distributed = summary.tasks_distributed,
                failures = summary.failures,
                spawn_count = summary.spawn_count,
                "run completed"
            );
            ExitCode::SUCCESS
        }
        Ok(Err(run_error)) => {
            eprintln!("divvy: {run_error}");
            match run_error {
                RunError::BootFailure { summary } => {
                    tracing::error!(
                        tasks_distributed = summary.tasks_distributed,
                        failures = summary.failures,
                        spawn_count = summary.spawn_count,
                        "run ended in boot failure"
                    );
                    ExitCode::from(2)
                }
                RunError::ForcefulShutdown { summary } => {
                    tracing::warn!(
                        tasks_distributed = summary.tasks_distributed,
                        failures = summary.failures,
                        spawn_count = summary.spawn_count,
                        "run ended via forceful shutdown"
                    );
                    ExitCode::from(3)
                }
                RunError::GeneratorFailed { summary, .. } => {
                    tracing::error!(
                        tasks_distributed = summary.tasks_distributed,
                        failures = summary.failures,
                        spawn_count = summary.spawn_count,
                        "run ended after the generator failed"
                    );
                    ExitCode::from(4)
                }
                _ => ExitCode::from(1),
            }
        }
        Err(setup_error) => {
            eprintln!("divvy: {setup_error:?}");
            ExitCode::from(1)
        }
    }
}
