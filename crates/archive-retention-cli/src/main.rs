mod commands;
mod logging;
mod progress;
mod signals;

use std::num::NonZeroUsize;
use std::process;

use anyhow::{bail, Context};
use archive_retention_core::config::load_configuration;
use archive_retention_core::{
    AppConfig, ConcurrencyOverride, Error, ExecutionMode, LockManager, LockMode, LockState,
    RetentionEngine, RunOptions, RunReport, Target,
};
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands, RunArgs};
use dotenv::dotenv;
use progress::CliReporter;
use tracing::{error, info, warn};

const EXIT_FATAL: i32 = 1;
const EXIT_LOCK_HELD: i32 = 2;
const EXIT_THRESHOLD_EXCEEDED: i32 = 3;
const EXIT_CANCELLED: i32 = 130;

fn main() {
    dotenv().ok();

    // clap's own usage-error status would collide with EXIT_LOCK_HELD.
    let args = match Cli::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let _ = err.print();
            process::exit(if err.use_stderr() { EXIT_FATAL } else { 0 });
        }
    };
    let _guard = logging::init_logger(args.quiet);

    let config = match load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(EXIT_FATAL);
        }
    };

    let code = match args.command {
        Some(Commands::Run(run_args)) => match run(&config, &run_args) {
            Ok(code) => code,
            Err(err) => {
                error!("Error: {:#}", err);
                exit_code_for(&err)
            }
        },
        Some(Commands::LockStatus) => match lock_status(&config) {
            Ok(()) => 0,
            Err(err) => {
                error!("Error: {:#}", err);
                EXIT_FATAL
            }
        },
        Some(Commands::PrintConfig) => {
            println!("Configuration: {:?}", config);
            0
        }
        None => {
            let _ = Cli::command().print_long_help();
            0
        }
    };

    if code != 0 {
        // `process::exit` skips destructors; flush the log writer first.
        drop(_guard);
        process::exit(code);
    }
}

fn run(config: &AppConfig, args: &RunArgs) -> anyhow::Result<i32> {
    let options = build_options(config, args)?;
    let lock_path = options.lock_path.clone();
    let engine = RetentionEngine::new(options);
    signals::install(engine.cancel_token(), lock_path, EXIT_CANCELLED)?;

    let interval = args
        .progress_interval
        .unwrap_or(config.progress_interval_secs);
    let reporter = CliReporter::new(args.show_progress, interval);

    let report = engine.run(&reporter)?;
    print_summary(&report);

    if let Some(path) = &args.error_report {
        report
            .write_csv(path)
            .with_context(|| format!("writing error report to {}", path.display()))?;
        info!("Error report written to {}", path.display());
    }

    let threshold = args.failure_threshold.or(config.failure_threshold);
    Ok(if report.cancelled {
        EXIT_CANCELLED
    } else if report.exceeds_threshold(threshold) {
        warn!(
            "{} errors exceed the failure threshold of {}",
            report.error_count(),
            threshold.unwrap_or_default()
        );
        EXIT_THRESHOLD_EXCEEDED
    } else {
        0
    })
}

fn build_options(config: &AppConfig, args: &RunArgs) -> anyhow::Result<RunOptions> {
    let target = match (&args.path, &args.credential_target) {
        (Some(path), None) => Target::Path(path.clone()),
        (None, Some(name)) => Target::Share {
            name: name.clone(),
            path: config.resolve_share(name)?,
        },
        _ => bail!("exactly one of --path or --credential-target is required"),
    };

    let mode = if args.execute {
        ExecutionMode::Execute
    } else {
        ExecutionMode::DryRun
    };

    let lock_mode = if args.force {
        LockMode::Force
    } else if args.force_clear_lock {
        LockMode::ForceClearLock
    } else {
        LockMode::Normal
    };

    let concurrency = if args.sequential {
        Some(ConcurrencyOverride::Sequential)
    } else if let Some(threads) = args.threads {
        let threads = NonZeroUsize::new(threads).context("--threads must be at least 1")?;
        Some(ConcurrencyOverride::Parallel(Some(threads)))
    } else if args.parallel {
        Some(ConcurrencyOverride::Parallel(None))
    } else {
        None
    };

    Ok(RunOptions::new(config, target, args.retention_days)
        .with_mode(mode)
        .with_lock_mode(lock_mode)
        .with_concurrency(concurrency))
}

fn lock_status(config: &AppConfig) -> anyhow::Result<()> {
    let manager = LockManager::new(config.lock_path());
    let state = manager.inspect()?;
    let path = manager.path().display();
    match state {
        LockState::Free => println!("{} {}", "free".green(), path),
        LockState::Live(record) => println!(
            "{} {} (pid {}{})",
            "held".red(),
            path,
            record.owner_pid,
            record
                .acquired_at
                .map(|at| format!(", since {}", at.format("%Y-%m-%d %H:%M:%S")))
                .unwrap_or_default()
        ),
        LockState::Stale(record) => println!(
            "{} {} (pid {} is gone; the next run will clear it)",
            "stale".yellow(),
            path,
            record.owner_pid
        ),
        LockState::Unknown => println!(
            "{} {} (unreadable; use --force-clear-lock if no run is active)",
            "unknown".yellow(),
            path
        ),
    }
    Ok(())
}

fn print_summary(report: &RunReport) {
    let verb = if report.mode.is_dry_run() {
        "would be deleted"
    } else {
        "deleted"
    };
    println!();
    info!(
        "Mode: {}, {}, cutoff {}",
        report.mode.to_string().cyan(),
        report.concurrency.to_string().cyan(),
        report.cutoff
    );
    info!(
        "{} files scanned, {} expired, {} {}, {} skipped",
        format!("{}", report.files_scanned).green(),
        format!("{}", report.files_expired).yellow(),
        format!("{}", report.files_deleted).red(),
        verb,
        format!("{}", report.files_skipped).cyan(),
    );
    info!(
        "{} bytes {}, {} empty directories removed, {}",
        format!("{}", report.bytes_deleted).red(),
        verb,
        format!("{}", report.directories_removed).red(),
        format!("{:.2}s", report.elapsed.as_secs_f64()).green(),
    );
    for advisory in &report.advisories {
        warn!("{}", advisory.to_string().yellow());
    }
    if !report.errors.is_empty() {
        warn!("{} errors:", format!("{}", report.errors.len()).red());
        for item in report.errors.iter().take(20) {
            warn!("  [{}] {}: {}", item.phase, item.path.display(), item.cause);
        }
        if report.errors.len() > 20 {
            warn!("  ... and {} more (use --error-report)", report.errors.len() - 20);
        }
    }
    if report.cancelled {
        warn!("{}", "Run was cancelled before completion".yellow());
    }
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<Error>() {
        Some(core) if core.is_lock_held() => EXIT_LOCK_HELD,
        _ => EXIT_FATAL,
    }
}
