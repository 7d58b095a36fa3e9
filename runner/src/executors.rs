mod condor;

use crate::{config::SchedulerConfig, descriptor::JobDescriptor};
use std::{
    ffi::OsStr,
    io::{self, Read},
    process::{Command, ExitStatus, Output, Stdio},
    thread::{self, JoinHandle},
    time::Duration,
};
use thiserror::Error;
use tracing::{debug, info, trace, warn};
use wait_timeout::ChildExt;


#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Failed to start {program}: {source}")]
    Spawn { program: String, source: io::Error },
    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },
    #[error("{program} timed out after {seconds}s")]
    Timeout { program: String, seconds: u64 },
    #[error("Empty command")]
    EmptyCommand,
    #[error("Failed to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Run an external tool to completion, a non-zero exit status is an error
pub fn run_tool(command: &mut Command) -> Result<Output, ExecutorError> {
    let program = program_name(command);
    trace!(command = ?command, "Running external tool");

    let output = command.output().map_err(|source| ExecutorError::Spawn {
        program: program.clone(),
        source,
    })?;

    if output.status.success() {
        Ok(output)
    } else {
        Err(ExecutorError::Failed {
            program,
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

/// Like [`run_tool`], but the child is killed once `timeout` has passed
pub fn run_with_timeout(
    command: &mut Command,
    timeout: Option<Duration>,
) -> Result<Output, ExecutorError> {
    let Some(timeout) = timeout else {
        return run_tool(command);
    };

    let program = program_name(command);
    trace!(command = ?command, "Running external tool with timeout {timeout:?}");

    let spawn_error = |source| ExecutorError::Spawn {
        program: program.clone(),
        source,
    };

    let mut child = command
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(spawn_error)?;

    // drain both pipes so a chatty child cannot block on a full buffer
    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let Some(status) = child.wait_timeout(timeout).map_err(spawn_error)? else {
        if let Err(e) = child.kill().and_then(|_| child.wait()) {
            warn!(error = ?e, "Failed to kill {program} after timeout");
        }
        return Err(ExecutorError::Timeout {
            program,
            seconds: timeout.as_secs(),
        });
    };

    let output = Output {
        status,
        stdout: collect(stdout),
        stderr: collect(stderr),
    };

    if output.status.success() {
        Ok(output)
    } else {
        Err(ExecutorError::Failed {
            program,
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

fn drain(mut reader: impl Read + Send + 'static) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        let _ = reader.read_to_end(&mut buffer);
        buffer
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle
        .map(|handle| handle.join().unwrap_or_default())
        .unwrap_or_default()
}

pub fn program_name(command: &Command) -> String {
    command.get_program().to_string_lossy().into_owned()
}

/// Build a command from a whitespace separated command line, e.g. `condor_submit -verbose`
pub fn command_line(line: &str) -> Result<Command, ExecutorError> {
    let mut parts = line.split_whitespace();
    let program = parts.next().ok_or(ExecutorError::EmptyCommand)?;

    let mut command = Command::new(program);
    command.args(parts.map(OsStr::new));

    Ok(command)
}

/// Backends able to enqueue generated descriptors
#[derive(Clone, Debug)]
pub enum Executors {
    Condor(condor::CondorExecutor),
    /// only log what would have been submitted
    DryRun,
}

impl Executors {
    pub fn load(config: &SchedulerConfig, dry_run: bool) -> Self {
        if dry_run {
            Self::DryRun
        } else {
            Self::Condor(condor::CondorExecutor::load(config))
        }
    }

    /// Enqueue all descriptors in order, the first failure aborts
    pub fn submit(&self, descriptors: &[JobDescriptor]) -> Result<(), ExecutorError> {
        match self {
            Self::Condor(executor) => executor.submit(descriptors),
            Self::DryRun => {
                for descriptor in descriptors {
                    debug!(job = %descriptor.name, "Dry run, not submitting {:?}", descriptor.submit_path);
                }
                info!("Dry run, {} jobs not submitted", descriptors.len());

                Ok(())
            }
        }
    }
}
