//! Parallel `rsync` of dataset sub-directories.
//!
//! Every directory is an independent transfer with its own retry loop, run on a bounded
//! rayon pool. Output of all transfers is appended to a shared log file.

use crate::{
    config::SyncConfig,
    error::RunnerError,
    executors::{run_with_timeout, ExecutorError},
};
use parking_lot::Mutex;
use rayon::{prelude::*, ThreadPoolBuilder};
use std::{
    fs::{self, File, OpenOptions},
    io::Write,
    path::Path,
    process::Command,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};
use tracing::{debug, error, info, instrument, warn};

#[cfg(test)]
mod sync_test;

/// One directory to copy from `source` to `destination`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transfer {
    pub directory: String,
    pub source: String,
    pub destination: String,
}

impl Transfer {
    pub fn new(source: &str, destination: &str, directory: &str) -> Self {
        let join = |base: &str| {
            if directory.is_empty() {
                base.to_string()
            } else {
                format!("{}/{}", base.trim_end_matches('/'), directory)
            }
        };

        Self {
            directory: directory.to_string(),
            source: join(source),
            destination: join(destination),
        }
    }

    /// rsync does not create missing parents of a local destination
    fn local_parent(&self) -> Option<&Path> {
        if self.destination.contains(':') {
            return None;
        }

        Path::new(self.destination.trim_end_matches('/'))
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
    }
}

/// Directories listed in a text file, one per line, `#` starts a comment
pub fn read_directories(path: &Path) -> Result<Vec<String>, RunnerError> {
    let contents = fs::read_to_string(path).map_err(|e| RunnerError::io(path, e))?;

    Ok(contents
        .lines()
        .map(|line| line.split('#').next().unwrap_or_default().trim())
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

#[derive(Debug)]
pub struct TransferOutcome {
    pub directory: String,
    pub attempts: u32,
    pub result: Result<(), ExecutorError>,
}

#[derive(Debug, Default)]
pub struct SyncSummary {
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, ExecutorError)>,
}

impl SyncSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug)]
pub struct Syncer {
    config: SyncConfig,
    excludes: Vec<String>,
    log: Option<Mutex<File>>,
}

impl Syncer {
    pub fn new(
        config: SyncConfig,
        excludes: Vec<String>,
        log_file: Option<&Path>,
    ) -> Result<Self, RunnerError> {
        let log = match log_file {
            Some(path) => Some(Mutex::new(
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|e| RunnerError::io(path, e))?,
            )),
            None => None,
        };

        Ok(Self {
            config,
            excludes,
            log,
        })
    }

    pub fn command(&self, transfer: &Transfer) -> Command {
        let mut command = Command::new(&self.config.rsync);
        command
            .args(self.config.flags.split_whitespace())
            .arg("-e")
            .arg(&self.config.remote_shell)
            .arg(format!("--bwlimit={}", self.config.bwlimit));

        for pattern in &self.excludes {
            command.arg("--exclude").arg(pattern);
        }

        command.arg(&transfer.source).arg(&transfer.destination);
        command
    }

    fn append_log(&self, transfer: &Transfer, attempt: u32, text: &str) {
        if let Some(ref log) = self.log {
            let mut file = log.lock();
            if let Err(e) = writeln!(
                file,
                "== {} (attempt {attempt}) ==\n{}",
                transfer.directory,
                text.trim_end()
            ) {
                warn!(error = ?e, "Failed to write transfer log");
            }
        }
    }

    /// Run a single transfer, retrying up to the configured number of attempts
    pub fn transfer(&self, transfer: &Transfer) -> TransferOutcome {
        let timeout = self.config.timeout.map(Duration::from_secs);
        let mut attempt = 0;

        loop {
            attempt += 1;

            if let Some(parent) = transfer.local_parent() {
                if let Err(e) = fs::create_dir_all(parent) {
                    warn!(error = ?e, "Failed to create {parent:?}");
                }
            }

            let mut command = self.command(transfer);
            debug!(command = ?command, attempt, "Running rsync");

            let result = run_with_timeout(&mut command, timeout).map(|output| {
                let text = format!(
                    "{}{}",
                    String::from_utf8_lossy(&output.stdout),
                    String::from_utf8_lossy(&output.stderr)
                );
                self.append_log(transfer, attempt, &text);
            });

            match result {
                Ok(()) => {
                    return TransferOutcome {
                        directory: transfer.directory.clone(),
                        attempts: attempt,
                        result: Ok(()),
                    }
                }
                Err(e) if attempt < self.config.attempts => {
                    warn!(directory = %transfer.directory, error = %e, "Transfer failed, retrying");
                    self.append_log(transfer, attempt, &e.to_string());
                }
                Err(e) => {
                    error!(directory = %transfer.directory, error = %e, "Transfer failed");
                    self.append_log(transfer, attempt, &e.to_string());
                    return TransferOutcome {
                        directory: transfer.directory.clone(),
                        attempts: attempt,
                        result: Err(e),
                    };
                }
            }
        }
    }

    /// Run all transfers on a pool of `min(threads, cpus)` workers
    #[instrument(skip_all, level = "info")]
    pub fn run(&self, transfers: &[Transfer]) -> Result<SyncSummary, ExecutorError> {
        let threads = self.config.threads.min(num_cpus::get()).max(1);
        debug!("Starting thread pool with {threads} threads");

        let pool = ThreadPoolBuilder::new().num_threads(threads).build()?;
        let processed = AtomicUsize::new(0);

        let outcomes: Vec<TransferOutcome> = pool.install(|| {
            transfers
                .par_iter()
                .map(|transfer| {
                    let outcome = self.transfer(transfer);
                    info!(
                        "Done with {}/{}",
                        processed.fetch_add(1, Ordering::SeqCst) + 1,
                        transfers.len()
                    );
                    outcome
                })
                .collect()
        });

        let mut summary = SyncSummary::default();
        for outcome in outcomes {
            match outcome.result {
                Ok(()) => summary.succeeded.push(outcome.directory),
                Err(e) => summary.failed.push((outcome.directory, e)),
            }
        }

        info!(
            "Total transfers: {}, succeeded: {}, failed: {}",
            transfers.len(),
            summary.succeeded.len(),
            summary.failed.len()
        );
        for (directory, e) in &summary.failed {
            error!(directory = %directory, error = %e, "Not synchronised");
        }

        Ok(summary)
    }
}

/// Shorthand to build transfers for `directories`, or one transfer of `source` itself
pub fn transfers(source: &str, destination: &str, directories: &[String]) -> Vec<Transfer> {
    if directories.is_empty() {
        vec![Transfer::new(source, destination, "")]
    } else {
        directories
            .iter()
            .map(|directory| Transfer::new(source, destination, directory))
            .collect()
    }
}
