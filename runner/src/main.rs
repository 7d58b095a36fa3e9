mod action;
mod arguments;
mod cli;
mod config;
mod descriptor;
mod error;
mod executors;
mod integrate;
mod merge;
mod partition;
mod sanity;
mod submit;
mod sync;
mod trex;
mod triage;
mod work;

use crate::{
    cli::{Cli, Command, CountArgs, ExtractArgs, MergeArgs, RetryArgs, SubmitArgs, SyncArgs},
    config::RunnerConfig,
    error::RunnerError,
    merge::{MergeSpec, Merger},
    sync::Syncer,
    triage::Triage,
};
use clap::Parser;
use std::{error::Error, process::ExitCode};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

// wrapped errors repeat their source in the message, only print what is new
fn report(e: &RunnerError) {
    let mut message = e.to_string();
    let mut source = e.source();

    while let Some(cause) = source {
        let cause_message = cause.to_string();
        if !message.contains(&cause_message) {
            message.push_str(&format!("\n  caused by: {cause_message}"));
        }
        source = cause.source();
    }

    error!("{message}");
}

fn run(cli: Cli) -> Result<ExitCode, RunnerError> {
    let settings = RunnerConfig::load(cli.settings.as_deref())?;
    debug!(settings = ?settings, "Loaded settings");

    match cli.command {
        Command::Submit(args) => run_submit(args, &settings),
        Command::Retry(args) => run_retry(&args, &settings),
        Command::Merge(args) => run_merge(&args, &settings),
        Command::Sync(args) => run_sync(&args, &settings),
        Command::Count(args) => run_count(&args),
        Command::Extract(args) => run_extract(&args),
    }
}

fn run_submit(args: SubmitArgs, settings: &RunnerConfig) -> Result<ExitCode, RunnerError> {
    let descriptors = submit::submit(&args.request(), settings)?;
    debug!("{} jobs handled", descriptors.len());

    Ok(ExitCode::SUCCESS)
}

fn run_retry(args: &RetryArgs, settings: &RunnerConfig) -> Result<ExitCode, RunnerError> {
    let triage = Triage::new(&settings.triage, &args.errors);
    let report = triage.run(&args.request())?;
    debug!(total = report.total, failed = report.failed, "Triage done");

    Ok(ExitCode::SUCCESS)
}

fn run_merge(args: &MergeArgs, settings: &RunnerConfig) -> Result<ExitCode, RunnerError> {
    let spec = args.spec.as_deref().map(MergeSpec::load).transpose()?;

    let groups = match (&spec, &args.discover) {
        (Some(spec), _) => spec.groups(&args.systematics, args.directory.as_deref())?,
        (None, Some(dir)) => merge::discover(dir)?,
        (None, None) => Vec::new(),
    };

    if groups.is_empty() {
        warn!("Nothing to merge");
        return Ok(ExitCode::SUCCESS);
    }

    let executable = merge::resolve_executable(
        args.executable.as_deref(),
        spec.as_ref(),
        &settings.merge,
        args.trex_path.as_deref(),
    );
    info!(executable = ?executable, "Merging {} groups", groups.len());

    Merger::new(executable, args.dry_run).run(&groups)?;

    Ok(ExitCode::SUCCESS)
}

fn run_sync(args: &SyncArgs, settings: &RunnerConfig) -> Result<ExitCode, RunnerError> {
    let mut directories = args.directories.clone();
    if let Some(ref file) = args.directories_file {
        directories.extend(sync::read_directories(file)?);
    }

    let syncer = Syncer::new(
        args.apply(settings.sync.clone()),
        args.exclude.clone(),
        Some(&args.log_file),
    )?;
    let summary = syncer.run(&sync::transfers(
        &args.source,
        &args.destination,
        &directories,
    ))?;

    if summary.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn run_count(args: &CountArgs) -> Result<ExitCode, RunnerError> {
    let report = sanity::count(&args.directory, &args.glob)?;
    println!("{report}");

    Ok(ExitCode::SUCCESS)
}

fn run_extract(args: &ExtractArgs) -> Result<ExitCode, RunnerError> {
    for name in sanity::extract(&args.file)? {
        println!("{name}");
    }

    Ok(ExitCode::SUCCESS)
}
